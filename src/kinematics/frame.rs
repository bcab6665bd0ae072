use crate::dimensions::{Matrix3, Vector3};
use crate::errors::KinError;
use crate::kinematics::{AngleUnit, DEFAULT_FRAME_STATE};
use crate::utils::{dcm_from_eulers, euler_rate_map, euler_rate_map_dot, eulers_from_dcm};
use std::collections::HashMap;
use std::fmt;

/// Whether an update time is an absolute time or a delta with respect to the
/// current reference time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeReference {
    Absolute,
    Delta,
}

/// Discriminates how a frame state propagates its rotational quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStateKind {
    /// Euler rates are projected directly onto the body axes
    Projective,
    /// Body rates derive from the full Euler kinematic relation
    Kinematic,
}

impl Default for FrameStateKind {
    fn default() -> Self {
        Self::Projective
    }
}

/// The parametric definition of a reference frame relative to its parent at a
/// reference time: origin position, velocity, acceleration, and Euler
/// orientation with its first and second time derivatives.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameState {
    pub t_ref: f64,
    pub origin: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    /// Euler angles in roll, pitch, yaw order
    pub eulers: Vector3<f64>,
    pub euler_rates: Vector3<f64>,
    pub euler_accels: Vector3<f64>,
    pub angle_units: AngleUnit,
    pub kind: FrameStateKind,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            t_ref: 0.0,
            origin: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            eulers: Vector3::zeros(),
            euler_rates: Vector3::zeros(),
            euler_accels: Vector3::zeros(),
            angle_units: AngleUnit::Radians,
            kind: FrameStateKind::default(),
        }
    }
}

impl FrameState {
    pub fn at_time(t_ref: f64) -> Self {
        Self {
            t_ref,
            ..Self::default()
        }
    }

    /// Euler angles, rates and accelerations in radians.
    pub fn eulers_rad(&self) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let factor = self.angle_units.to_radians_factor();
        (
            self.eulers * factor,
            self.euler_rates * factor,
            self.euler_accels * factor,
        )
    }

    /// Direction cosine matrix rotating frame coordinates into parent
    /// coordinates.
    pub fn rotation(&self) -> Matrix3<f64> {
        let (eulers, _, _) = self.eulers_rad();
        dcm_from_eulers(eulers[0], eulers[1], eulers[2])
    }

    /// Angular velocity of this frame with respect to its parent, expressed
    /// in parent coordinates (rad/s).
    pub fn angular_velocity(&self) -> Vector3<f64> {
        let (eulers, rates, _) = self.eulers_rad();
        let omega_body = match self.kind {
            FrameStateKind::Projective => rates,
            FrameStateKind::Kinematic => euler_rate_map(eulers[0], eulers[1]) * rates,
        };
        self.rotation() * omega_body
    }

    /// Angular acceleration of this frame with respect to its parent,
    /// expressed in parent coordinates (rad/s^2).
    pub fn angular_acceleration(&self) -> Vector3<f64> {
        let (eulers, rates, accels) = self.eulers_rad();
        let alpha_body = match self.kind {
            FrameStateKind::Projective => accels,
            FrameStateKind::Kinematic => {
                euler_rate_map(eulers[0], eulers[1]) * accels
                    + euler_rate_map_dot(eulers[0], eulers[1], rates[0], rates[1]) * rates
            }
        };
        self.rotation() * alpha_body
    }

    /// Whether this frame state carries any angular motion.
    pub fn is_rotating(&self) -> bool {
        self.euler_rates != Vector3::zeros() || self.euler_accels != Vector3::zeros()
    }

    /// Projects this state to the given time under constant acceleration and
    /// constant Euler angular acceleration.
    pub fn projected(&self, t: f64, time_reference: TimeReference) -> Self {
        let dt = match time_reference {
            TimeReference::Absolute => t - self.t_ref,
            TimeReference::Delta => t,
        };
        let mut projected = self.clone();
        projected.origin += self.velocity * dt + self.acceleration * (0.5 * dt * dt);
        projected.velocity += self.acceleration * dt;
        projected.eulers += self.euler_rates * dt + self.euler_accels * (0.5 * dt * dt);
        projected.euler_rates += self.euler_accels * dt;
        projected.t_ref += dt;
        projected
    }

    /// Converts the Euler quantities to the requested angle unit.
    pub fn convert_angle_units(&mut self, units: AngleUnit) {
        if self.angle_units != units {
            let factor = self.angle_units.to_radians_factor() / units.to_radians_factor();
            self.eulers *= factor;
            self.euler_rates *= factor;
            self.euler_accels *= factor;
            self.angle_units = units;
        }
    }

    /// Composes two non-rotating frame states: the result maps coordinates of
    /// `inner`'s frame directly into the parent of `outer`'s frame.
    fn compose(outer: &Self, inner: &Self) -> Self {
        let rotation = outer.rotation();
        let (outer_e, _, _) = outer.eulers_rad();
        let (inner_e, _, _) = inner.eulers_rad();
        let composed_dcm = dcm_from_eulers(outer_e[0], outer_e[1], outer_e[2])
            * dcm_from_eulers(inner_e[0], inner_e[1], inner_e[2]);
        Self {
            t_ref: outer.t_ref,
            origin: outer.origin + rotation * inner.origin,
            velocity: outer.velocity + rotation * inner.velocity,
            acceleration: outer.acceleration + rotation * inner.acceleration,
            eulers: eulers_from_dcm(&composed_dcm) / outer.angle_units.to_radians_factor(),
            euler_rates: Vector3::zeros(),
            euler_accels: Vector3::zeros(),
            angle_units: outer.angle_units,
            kind: outer.kind,
        }
    }
}

/// A weak handle onto a frame of a [FrameTree]. Handles survive arbitrary
/// tree mutation and report staleness instead of dangling: deleting a subtree
/// invalidates the handles of every frame it contained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle {
    index: usize,
    generation: u32,
}

#[derive(Debug)]
struct FrameNode {
    generation: u32,
    live: bool,
    name: String,
    parent: Option<FrameHandle>,
    children: Vec<FrameHandle>,
    states: HashMap<String, FrameState>,
}

/// A hierarchical tree of reference frames.
///
/// The tree exclusively owns its frames: a frame and its subtree are
/// destroyed together. All reads take `&self` and all mutations take
/// `&mut self`, which yields concurrent readers with an exclusive writer when
/// the tree is shared behind a lock. Every mutation bumps a stamp consulted
/// by motion state transformation caches.
#[derive(Debug)]
pub struct FrameTree {
    nodes: Vec<FrameNode>,
    free: Vec<usize>,
    root: FrameHandle,
    stamp: u64,
}

impl FrameTree {
    /// Creates a tree holding a single root frame with a default frame state.
    pub fn new(name: &str) -> Self {
        let mut states = HashMap::new();
        states.insert(DEFAULT_FRAME_STATE.to_string(), FrameState::default());
        let root_node = FrameNode {
            generation: 0,
            live: true,
            name: name.to_string(),
            parent: None,
            children: Vec::new(),
            states,
        };
        Self {
            nodes: vec![root_node],
            free: Vec::new(),
            root: FrameHandle {
                index: 0,
                generation: 0,
            },
            stamp: 0,
        }
    }

    pub fn root(&self) -> FrameHandle {
        self.root
    }

    /// The tree-wide mutation stamp. Any mutating call increments it.
    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    fn bump(&mut self) {
        self.stamp += 1;
    }

    fn node(&self, handle: FrameHandle) -> Option<&FrameNode> {
        match self.nodes.get(handle.index) {
            Some(node) if node.live && node.generation == handle.generation => Some(node),
            _ => None,
        }
    }

    fn node_mut(&mut self, handle: FrameHandle) -> Option<&mut FrameNode> {
        match self.nodes.get_mut(handle.index) {
            Some(node) if node.live && node.generation == handle.generation => Some(node),
            _ => None,
        }
    }

    /// Whether the handle still points at a live frame.
    pub fn is_valid(&self, handle: FrameHandle) -> bool {
        self.node(handle).is_some()
    }

    pub fn name(&self, handle: FrameHandle) -> Option<&str> {
        self.node(handle).map(|node| node.name.as_str())
    }

    pub fn parent(&self, handle: FrameHandle) -> Option<FrameHandle> {
        self.node(handle).and_then(|node| node.parent)
    }

    pub fn children(&self, handle: FrameHandle) -> Vec<FrameHandle> {
        self.node(handle)
            .map(|node| node.children.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|node| node.live).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn alloc(&mut self, name: String, parent: Option<FrameHandle>) -> FrameHandle {
        let states: HashMap<String, FrameState> = {
            let mut map = HashMap::new();
            map.insert(DEFAULT_FRAME_STATE.to_string(), FrameState::default());
            map
        };
        match self.free.pop() {
            Some(index) => {
                let generation = self.nodes[index].generation;
                self.nodes[index] = FrameNode {
                    generation,
                    live: true,
                    name,
                    parent,
                    children: Vec::new(),
                    states,
                };
                FrameHandle { index, generation }
            }
            None => {
                let index = self.nodes.len();
                self.nodes.push(FrameNode {
                    generation: 0,
                    live: true,
                    name,
                    parent,
                    children: Vec::new(),
                    states,
                });
                FrameHandle {
                    index,
                    generation: 0,
                }
            }
        }
    }

    /// Creates a child of the given frame. The name must be unique within the
    /// tree.
    pub fn create_child(&mut self, parent: FrameHandle, name: &str) -> Result<FrameHandle, KinError> {
        if self.node(parent).is_none() {
            return Err(KinError::ObjectNotFound(format!("frame #{}", parent.index)));
        }
        if self.find(self.root, name).is_some() {
            return Err(KinError::InvalidConfig(format!(
                "frame name `{}` already exists in this tree",
                name
            )));
        }
        let child = self.alloc(name.to_string(), Some(parent));
        self.node_mut(parent).unwrap().children.push(child);
        self.bump();
        Ok(child)
    }

    /// Creates a sibling of the given frame (a new child of its parent).
    pub fn create_sibling(&mut self, handle: FrameHandle, name: &str) -> Result<FrameHandle, KinError> {
        let parent = self
            .parent(handle)
            .ok_or_else(|| KinError::ObjectNotFound("parent frame".to_string()))?;
        self.create_child(parent, name)
    }

    /// Attaches `child` (and its subtree) as the last child of `parent`,
    /// updating membership and the child's parent pointer together. Fails if
    /// this would create a cycle.
    pub fn add_child(&mut self, parent: FrameHandle, child: FrameHandle) -> Result<(), KinError> {
        if self.node(parent).is_none() || self.node(child).is_none() {
            return Err(KinError::ObjectNotFound("frame".to_string()));
        }
        // walking up from the parent must not encounter the child
        let mut cursor = Some(parent);
        while let Some(handle) = cursor {
            if handle == child {
                return Err(KinError::Unsupported(
                    "cannot reparent a frame below its own subtree".to_string(),
                ));
            }
            cursor = self.parent(handle);
        }
        if let Some(old_parent) = self.parent(child) {
            let node = self.node_mut(old_parent).unwrap();
            node.children.retain(|&existing| existing != child);
        }
        self.node_mut(child).unwrap().parent = Some(parent);
        self.node_mut(parent).unwrap().children.push(child);
        self.bump();
        Ok(())
    }

    /// Detaches `child` from `parent`, leaving it (and its subtree) parentless
    /// but alive within this tree.
    pub fn remove_child(&mut self, parent: FrameHandle, child: FrameHandle) -> Result<(), KinError> {
        let belongs = self
            .node(parent)
            .map(|node| node.children.contains(&child))
            .unwrap_or(false);
        if !belongs {
            return Err(KinError::ObjectNotFound("child frame".to_string()));
        }
        self.node_mut(parent)
            .unwrap()
            .children
            .retain(|&existing| existing != child);
        self.node_mut(child).unwrap().parent = None;
        self.bump();
        Ok(())
    }

    /// Destroys the frame and its entire subtree. Handles onto any destroyed
    /// frame become stale.
    pub fn delete_subtree(&mut self, handle: FrameHandle) -> Result<(), KinError> {
        if self.node(handle).is_none() {
            return Err(KinError::ObjectNotFound(format!("frame #{}", handle.index)));
        }
        if let Some(parent) = self.parent(handle) {
            self.node_mut(parent)
                .unwrap()
                .children
                .retain(|&existing| existing != handle);
        }
        let mut stack = vec![handle];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.node(current) {
                stack.extend(node.children.iter().copied());
            }
            let node = &mut self.nodes[current.index];
            node.live = false;
            node.generation = node.generation.wrapping_add(1);
            node.children.clear();
            node.parent = None;
            self.free.push(current.index);
        }
        self.bump();
        Ok(())
    }

    /// Searches the subtree rooted at `from` for a frame by name, in
    /// pre-order. Returns None when undefined.
    pub fn find(&self, from: FrameHandle, name: &str) -> Option<FrameHandle> {
        for handle in self.iter(from) {
            if self.node(handle).map(|node| node.name == name).unwrap_or(false) {
                return Some(handle);
            }
        }
        None
    }

    /// Pre-order iterator over the subtree rooted at `from`. The iterator is
    /// finite and restartable.
    pub fn iter(&self, from: FrameHandle) -> PreOrderIter {
        PreOrderIter {
            tree: self,
            start: from,
            stack: if self.node(from).is_some() {
                vec![from]
            } else {
                Vec::new()
            },
        }
    }

    fn ancestors(&self, handle: FrameHandle) -> Vec<FrameHandle> {
        let mut chain = Vec::new();
        let mut cursor = Some(handle);
        while let Some(current) = cursor {
            chain.push(current);
            cursor = self.parent(current);
        }
        chain
    }

    /// Least common ancestor of two frames of this tree, or None when they
    /// are disjoint (e.g. one side was detached).
    pub fn common_ancestor(&self, a: FrameHandle, b: FrameHandle) -> Option<FrameHandle> {
        let chain_a = self.ancestors(a);
        let mut cursor = Some(b);
        while let Some(current) = cursor {
            if chain_a.contains(&current) {
                return Some(current);
            }
            cursor = self.parent(current);
        }
        None
    }

    /// Cross-tree ancestor resolution: walks the ancestors of `frame` inside
    /// `other` and locates the first equivalently named frame of this tree,
    /// in pre-order. Returns the pair of equivalent handles (self, other).
    pub fn common_root_by_name(
        &self,
        other: &FrameTree,
        frame: FrameHandle,
    ) -> Option<(FrameHandle, FrameHandle)> {
        for ancestor in other.ancestors(frame) {
            let name = other.name(ancestor)?;
            if let Some(local) = self.find(self.root, name) {
                return Some((local, ancestor));
            }
        }
        None
    }

    /// Retrieves the frame state for the given perturbation state tag. An
    /// unknown tag falls back to the default state.
    pub fn state(&self, handle: FrameHandle, tag: &str) -> Option<&FrameState> {
        let node = self.node(handle)?;
        node.states
            .get(tag)
            .or_else(|| node.states.get(DEFAULT_FRAME_STATE))
    }

    /// Replaces the frame state under the given tag, creating the tag if
    /// necessary.
    pub fn set_state(
        &mut self,
        handle: FrameHandle,
        tag: &str,
        state: FrameState,
    ) -> Result<(), KinError> {
        let node = self
            .node_mut(handle)
            .ok_or_else(|| KinError::ObjectNotFound(format!("frame #{}", handle.index)))?;
        node.states.insert(tag.to_string(), state);
        self.bump();
        Ok(())
    }

    /// Deletes a named frame state; the default state cannot be deleted.
    pub fn delete_state(&mut self, handle: FrameHandle, tag: &str) -> Result<(), KinError> {
        if tag == DEFAULT_FRAME_STATE {
            return Err(KinError::Unsupported(
                "the default frame state cannot be deleted".to_string(),
            ));
        }
        let node = self
            .node_mut(handle)
            .ok_or_else(|| KinError::ObjectNotFound(format!("frame #{}", handle.index)))?;
        if node.states.remove(tag).is_none() {
            return Err(KinError::UnknownState(tag.to_string()));
        }
        self.bump();
        Ok(())
    }

    /// The state tags defined on this frame.
    pub fn state_tags(&self, handle: FrameHandle) -> Vec<String> {
        self.node(handle)
            .map(|node| {
                let mut tags: Vec<String> = node.states.keys().cloned().collect();
                tags.sort();
                tags
            })
            .unwrap_or_default()
    }

    /// Updates the parametric state of the frame to the specified time,
    /// propagating position, velocity and orientation under constant
    /// acceleration and constant Euler angular acceleration.
    pub fn update(
        &mut self,
        handle: FrameHandle,
        t: f64,
        tag: &str,
        time_reference: TimeReference,
    ) -> Result<(), KinError> {
        let projected = self
            .state(handle, tag)
            .ok_or_else(|| KinError::ObjectNotFound(format!("frame #{}", handle.index)))?
            .projected(t, time_reference);
        let tag = if self.node(handle).unwrap().states.contains_key(tag) {
            tag
        } else {
            DEFAULT_FRAME_STATE
        };
        self.node_mut(handle).unwrap().states.insert(tag.to_string(), projected);
        self.bump();
        Ok(())
    }

    /// Clones a single frame (with its states, without its children) into a
    /// new single-frame tree.
    pub fn clone_frame(&self, handle: FrameHandle) -> Result<FrameTree, KinError> {
        let node = self
            .node(handle)
            .ok_or_else(|| KinError::ObjectNotFound(format!("frame #{}", handle.index)))?;
        let mut cloned = FrameTree::new(&node.name);
        cloned.nodes[0].states = node.states.clone();
        Ok(cloned)
    }

    /// Clones the ancestor-to-descendant chain into a new tree whose root is
    /// the clone of `ancestor` and whose single leaf is the clone of
    /// `descendant`.
    pub fn clone_branch(
        &self,
        ancestor: FrameHandle,
        descendant: FrameHandle,
    ) -> Result<FrameTree, KinError> {
        let chain = self.chain(ancestor, descendant)?;
        let mut cloned = self.clone_frame(ancestor)?;
        let mut parent = cloned.root();
        for &link in chain.iter().skip(1) {
            let node = self.node(link).unwrap();
            let child = cloned.create_child(parent, &node.name)?;
            cloned.node_mut(child).unwrap().states = node.states.clone();
            parent = child;
        }
        Ok(cloned)
    }

    /// Clones the entire subtree rooted at the given frame into a new tree.
    pub fn clone_subtree(&self, handle: FrameHandle) -> Result<FrameTree, KinError> {
        let mut cloned = self.clone_frame(handle)?;
        let cloned_root = cloned.root();
        self.clone_children_into(handle, &mut cloned, cloned_root)?;
        Ok(cloned)
    }

    fn clone_children_into(
        &self,
        source: FrameHandle,
        target: &mut FrameTree,
        target_parent: FrameHandle,
    ) -> Result<(), KinError> {
        for child in self.children(source) {
            let node = self.node(child).unwrap();
            let cloned_child = target.create_child(target_parent, &node.name)?;
            target.node_mut(cloned_child).unwrap().states = node.states.clone();
            self.clone_children_into(child, target, cloned_child)?;
        }
        Ok(())
    }

    /// Replaces the contents of this tree with a structure-preserving copy of
    /// the other tree. The mutation stamp stays monotonic so caches keyed to
    /// the previous contents cannot revalidate.
    pub fn copy_from(&mut self, other: &FrameTree) -> Result<(), KinError> {
        let copied = other.clone_subtree(other.root())?;
        let stamp = self.stamp.max(copied.stamp) + 1;
        *self = copied;
        self.stamp = stamp;
        Ok(())
    }

    fn chain(
        &self,
        ancestor: FrameHandle,
        descendant: FrameHandle,
    ) -> Result<Vec<FrameHandle>, KinError> {
        let mut chain = Vec::new();
        let mut cursor = Some(descendant);
        while let Some(current) = cursor {
            chain.push(current);
            if current == ancestor {
                chain.reverse();
                return Ok(chain);
            }
            cursor = self.parent(current);
        }
        Err(KinError::TreeMismatch(
            self.name(ancestor).unwrap_or("?").to_string(),
            self.name(descendant).unwrap_or("?").to_string(),
        ))
    }

    /// Merges the ancestor-to-descendant chain into a single new frame whose
    /// parametric state composes every transform along the chain. Requires
    /// every frame of the chain to be non-rotating. The descendant's children
    /// are reparented under the merged frame; when `prune` is set, the
    /// bypassed chain is deleted if nothing else hangs from it.
    pub fn merge(
        &mut self,
        ancestor: FrameHandle,
        descendant: FrameHandle,
        prune: bool,
    ) -> Result<FrameHandle, KinError> {
        let chain = self.chain(ancestor, descendant)?;
        for &link in &chain {
            let state = self.state(link, DEFAULT_FRAME_STATE).unwrap();
            if state.is_rotating() {
                return Err(KinError::Unsupported(format!(
                    "cannot merge rotating frame `{}`",
                    self.name(link).unwrap_or("?")
                )));
            }
        }

        let mut composed = self.state(chain[0], DEFAULT_FRAME_STATE).unwrap().clone();
        for &link in chain.iter().skip(1) {
            let inner = self.state(link, DEFAULT_FRAME_STATE).unwrap().clone();
            composed = FrameState::compose(&composed, &inner);
        }

        let merged_name = format!(
            "{}+{}",
            self.name(ancestor).unwrap_or("?"),
            self.name(descendant).unwrap_or("?")
        );
        let merged = match self.parent(ancestor) {
            Some(parent) => self.create_child(parent, &merged_name)?,
            None => {
                let handle = self.alloc(merged_name, None);
                self.bump();
                handle
            }
        };
        self.set_state(merged, DEFAULT_FRAME_STATE, composed)?;

        for child in self.children(descendant) {
            self.add_child(merged, child)?;
        }
        let chain_is_bare = chain
            .iter()
            .all(|&link| link == descendant || self.children(link).len() <= 1);
        if prune && chain_is_bare && self.parent(ancestor).is_some() {
            self.delete_subtree(ancestor)?;
        }
        Ok(merged)
    }
}

impl fmt::Display for FrameTree {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FrameTree rooted at `{}` with {} frames",
            self.name(self.root).unwrap_or("?"),
            self.len()
        )
    }
}

/// A finite, restartable pre-order iterator over a subtree.
pub struct PreOrderIter<'a> {
    tree: &'a FrameTree,
    start: FrameHandle,
    stack: Vec<FrameHandle>,
}

impl<'a> PreOrderIter<'a> {
    /// Restarts the traversal from the original subtree root.
    pub fn restart(&mut self) {
        self.stack.clear();
        if self.tree.node(self.start).is_some() {
            self.stack.push(self.start);
        }
    }
}

impl<'a> Iterator for PreOrderIter<'a> {
    type Item = FrameHandle;

    fn next(&mut self) -> Option<FrameHandle> {
        let current = self.stack.pop()?;
        if let Some(node) = self.tree.node(current) {
            // children pushed in reverse so the leftmost child pops first
            for &child in node.children.iter().rev() {
                self.stack.push(child);
            }
        }
        Some(current)
    }
}
