use crate::dimensions::{Matrix3, Vector3};
use crate::errors::KinError;
use crate::kinematics::frame::{FrameHandle, FrameState, FrameTree};
use crate::kinematics::{
    cartesian_to_spherical, spherical_to_cartesian, CoordinateSystem, KinematicState,
    SphericalConvention, SphericalTriples,
};
use crate::polynomial::LowOrderPolynomialSolver;
use crate::utils::{dcm_from_eulers, eulers_from_dcm};
use bytes::{Buf, BufMut};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::f64::consts::FRAC_PI_2;

/// Kinematics configuration threaded through motion state construction; in
/// particular whether transformation caching is enabled by default.
#[derive(Debug, Clone)]
pub struct KinematicsConfig {
    pub cache_transforms: bool,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            cache_transforms: true,
        }
    }
}

/// The rigid+transport operator accumulated while walking the frame tree: it
/// carries a rotation, a translation and its first two derivatives, and the
/// angular velocity and acceleration of the source frame with respect to the
/// target frame.
#[derive(Debug, Clone)]
struct Transport {
    rotation: Matrix3<f64>,
    origin: Vector3<f64>,
    velocity: Vector3<f64>,
    acceleration: Vector3<f64>,
    omega: Vector3<f64>,
    alpha: Vector3<f64>,
}

impl Transport {
    fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            origin: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            omega: Vector3::zeros(),
            alpha: Vector3::zeros(),
        }
    }

    /// The child-to-parent operator of a frame state.
    fn from_frame_state(state: &FrameState) -> Self {
        Self {
            rotation: state.rotation(),
            origin: state.origin,
            velocity: state.velocity,
            acceleration: state.acceleration,
            omega: state.angular_velocity(),
            alpha: state.angular_acceleration(),
        }
    }

    /// Composes `outer` after `self`: the result maps through `self` first.
    fn then(&self, outer: &Self) -> Self {
        let rp = outer.rotation * self.origin;
        let rv = outer.rotation * self.velocity;
        let romega = outer.rotation * self.omega;
        Self {
            rotation: outer.rotation * self.rotation,
            origin: outer.origin + rp,
            velocity: outer.velocity + rv + outer.omega.cross(&rp),
            acceleration: outer.acceleration
                + outer.rotation * self.acceleration
                + outer.alpha.cross(&rp)
                + 2.0 * outer.omega.cross(&rv)
                + outer.omega.cross(&outer.omega.cross(&rp)),
            omega: outer.omega + romega,
            alpha: outer.alpha + outer.rotation * self.alpha + outer.omega.cross(&romega),
        }
    }

    /// The parent-to-child operator undoing this transport.
    fn inverse(&self) -> Self {
        let rt = self.rotation.transpose();
        Self {
            rotation: rt,
            origin: -(rt * self.origin),
            velocity: rt * (self.omega.cross(&self.origin) - self.velocity),
            acceleration: rt
                * (self.alpha.cross(&self.origin) + 2.0 * self.omega.cross(&self.velocity)
                    - self.omega.cross(&self.omega.cross(&self.origin))
                    - self.acceleration),
            omega: -(rt * self.omega),
            alpha: -(rt * self.alpha),
        }
    }

    /// Applies the transport theorem to a Cartesian kinematic payload:
    /// velocity gains `omega x r` and acceleration gains
    /// `alpha x r + 2 omega x v + omega x (omega x r)`. The orientation
    /// quantities rotate along.
    fn apply(&self, state: &KinematicState) -> KinematicState {
        let rp = self.rotation * state.position;
        let rv = self.rotation * state.velocity;

        let factor = state.angle_units.to_radians_factor();
        let (eulers, rates, accels) = state.eulers_rad();
        let body_dcm = dcm_from_eulers(eulers[0], eulers[1], eulers[2]);
        let body_omega = body_dcm * rates;
        let body_alpha = body_dcm * accels;

        let new_dcm = self.rotation * body_dcm;
        let new_omega = self.rotation * body_omega + self.omega;
        let new_alpha =
            self.rotation * body_alpha + self.alpha + self.omega.cross(&(self.rotation * body_omega));

        KinematicState {
            position: self.origin + rp,
            velocity: self.velocity + rv + self.omega.cross(&rp),
            acceleration: self.acceleration
                + self.rotation * state.acceleration
                + self.alpha.cross(&rp)
                + 2.0 * self.omega.cross(&rv)
                + self.omega.cross(&self.omega.cross(&rp)),
            eulers: eulers_from_dcm(&new_dcm) / factor,
            euler_rates: (new_dcm.transpose() * new_omega) / factor,
            euler_accels: (new_dcm.transpose() * new_alpha) / factor,
            angle_units: state.angle_units,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    frame: FrameHandle,
    tag: String,
    coord: CoordinateSystem,
    /// Bit pattern of the target time for temporal transforms
    epoch_bits: Option<u64>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    stamp: u64,
    source_t: f64,
    source: KinematicState,
    relative: Transport,
    target: KinematicState,
}

/// A body's instantaneous kinematics defined in a specific frame and
/// perturbation state of a [FrameTree].
///
/// A motion state holds at most a weak back-reference onto its frame: when
/// the frame (or an ancestor subtree) is destroyed, the reference goes stale
/// and frame-dependent operations report `DetachedFrame` instead of reading
/// freed frames.
#[derive(Debug, Clone)]
pub struct MotionState {
    t: f64,
    state: KinematicState,
    coord: CoordinateSystem,
    convention: SphericalConvention,
    frame: Option<(FrameHandle, String)>,
    cache_enabled: bool,
    cache: RefCell<HashMap<CacheKey, CacheEntry>>,
}

impl Default for MotionState {
    fn default() -> Self {
        Self::new(&KinematicsConfig::default())
    }
}

impl MotionState {
    /// Constructs an empty, detached motion state. Whether transformations
    /// are cached is taken from the provided configuration.
    pub fn new(config: &KinematicsConfig) -> Self {
        Self {
            t: 0.0,
            state: KinematicState::default(),
            coord: CoordinateSystem::Cartesian,
            convention: SphericalConvention::default(),
            frame: None,
            cache_enabled: config.cache_transforms,
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Constructs a motion state attached to the given frame and state tag.
    pub fn in_frame(config: &KinematicsConfig, frame: FrameHandle, tag: &str) -> Self {
        let mut state = Self::new(config);
        state.frame = Some((frame, tag.to_string()));
        state
    }

    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn set_t(&mut self, t: f64) {
        self.t = t;
        self.cache.borrow_mut().clear();
    }

    pub fn state(&self) -> &KinematicState {
        &self.state
    }

    /// Mutable access to the kinematic payload. Any mutation invalidates this
    /// motion state's transformation cache.
    pub fn state_mut(&mut self) -> &mut KinematicState {
        self.cache.borrow_mut().clear();
        &mut self.state
    }

    pub fn coordinate_system(&self) -> CoordinateSystem {
        self.coord
    }

    pub fn spherical_convention(&self) -> SphericalConvention {
        self.convention
    }

    pub fn set_spherical_convention(&mut self, convention: SphericalConvention) {
        if self.coord == CoordinateSystem::Spherical && convention != self.convention {
            // re-express the polar components under the new convention
            self.state.position[1] = FRAC_PI_2 - self.state.position[1];
            self.state.velocity[1] = -self.state.velocity[1];
            self.state.acceleration[1] = -self.state.acceleration[1];
            self.cache.borrow_mut().clear();
        }
        self.convention = convention;
    }

    pub fn frame(&self) -> Option<(FrameHandle, &str)> {
        self.frame.as_ref().map(|(handle, tag)| (*handle, tag.as_str()))
    }

    /// Attaches this motion state to a frame and state tag.
    pub fn attach(&mut self, frame: FrameHandle, tag: &str) {
        self.frame = Some((frame, tag.to_string()));
        self.cache.borrow_mut().clear();
    }

    /// Clears the frame back-reference, leaving the payload untouched.
    pub fn detach(&mut self) {
        self.frame = None;
        self.cache.borrow_mut().clear();
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    pub fn set_cache_enabled(&mut self, enabled: bool) {
        self.cache_enabled = enabled;
        if !enabled {
            self.cache.borrow_mut().clear();
        }
    }

    pub fn clear_transformation_cache(&mut self) {
        self.cache.borrow_mut().clear();
    }

    /// Projects the payload to the given absolute time under constant
    /// acceleration (spherical states are projected component-wise).
    pub fn update(&mut self, t: f64) {
        let dt = t - self.t;
        self.state = self.state.project(dt);
        self.t = t;
        self.cache.borrow_mut().clear();
    }

    /// Explicitly converts this motion state to the requested coordinate
    /// system, re-deriving the positional and derivative components.
    pub fn to_coordinate_system(&mut self, coord: CoordinateSystem) {
        if self.coord == coord {
            return;
        }
        match coord {
            CoordinateSystem::Cartesian => {
                let (p, v, a) = spherical_to_cartesian(&self.zenith_triples());
                self.state.position = p;
                self.state.velocity = v;
                self.state.acceleration = a;
            }
            CoordinateSystem::Spherical => {
                let triples = cartesian_to_spherical(
                    &self.state.position,
                    &self.state.velocity,
                    &self.state.acceleration,
                );
                let (angles, rates, accels) = self.from_zenith_triples(&triples);
                self.state.position = angles;
                self.state.velocity = rates;
                self.state.acceleration = accels;
            }
        }
        self.coord = coord;
        self.cache.borrow_mut().clear();
    }

    /// The spherical payload as zenith-convention triples.
    fn zenith_triples(&self) -> SphericalTriples {
        let mut angles = self.state.position;
        let mut rates = self.state.velocity;
        let mut accels = self.state.acceleration;
        if self.convention == SphericalConvention::ElevationFromXY {
            angles[1] = FRAC_PI_2 - angles[1];
            rates[1] = -rates[1];
            accels[1] = -accels[1];
        }
        SphericalTriples {
            angles,
            rates,
            accels,
        }
    }

    fn from_zenith_triples(
        &self,
        triples: &SphericalTriples,
    ) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let mut angles = triples.angles;
        let mut rates = triples.rates;
        let mut accels = triples.accels;
        if self.convention == SphericalConvention::ElevationFromXY {
            angles[1] = FRAC_PI_2 - angles[1];
            rates[1] = -rates[1];
            accels[1] = -accels[1];
        }
        (angles, rates, accels)
    }

    /// The Cartesian payload of this motion state, converting from spherical
    /// when necessary.
    fn cartesian_state(&self) -> KinematicState {
        match self.coord {
            CoordinateSystem::Cartesian => self.state.clone(),
            CoordinateSystem::Spherical => {
                let (p, v, a) = spherical_to_cartesian(&self.zenith_triples());
                let mut cart = self.state.clone();
                cart.position = p;
                cart.velocity = v;
                cart.acceleration = a;
                cart
            }
        }
    }

    fn restore_coordinate_system(&self, mut cart: KinematicState) -> KinematicState {
        if self.coord == CoordinateSystem::Spherical {
            let triples = cartesian_to_spherical(&cart.position, &cart.velocity, &cart.acceleration);
            let (angles, rates, accels) = self.from_zenith_triples(&triples);
            cart.position = angles;
            cart.velocity = rates;
            cart.acceleration = accels;
        }
        cart
    }

    /// Spatially transforms this motion state to the target frame and state
    /// tag of the same tree: the time tag is preserved and the world
    /// trajectory of the body is unchanged.
    pub fn transform_to_frame(
        &mut self,
        tree: &FrameTree,
        target: FrameHandle,
        tag: &str,
    ) -> Result<(), KinError> {
        let transformed = self.transformed(tree, target, tag, None)?;
        *self = transformed;
        Ok(())
    }

    /// Temporally transforms this motion state: the payload and every
    /// intermediate frame state are projected to `t_target` before the
    /// spatial composition.
    pub fn transform_to_frame_at(
        &mut self,
        tree: &FrameTree,
        target: FrameHandle,
        tag: &str,
        t_target: f64,
    ) -> Result<(), KinError> {
        let transformed = self.transformed(tree, target, tag, Some(t_target))?;
        *self = transformed;
        Ok(())
    }

    /// Clone-and-transform; the current object is left untouched (its cache
    /// cannot be populated through this call).
    pub fn transform_clone_to_frame(
        &self,
        tree: &FrameTree,
        target: FrameHandle,
        tag: &str,
    ) -> Result<MotionState, KinError> {
        self.transformed(tree, target, tag, None)
    }

    /// The work horse for both spatial (`epoch == None`) and temporal
    /// transforms within a single tree.
    fn transformed(
        &self,
        tree: &FrameTree,
        target: FrameHandle,
        tag: &str,
        epoch: Option<f64>,
    ) -> Result<MotionState, KinError> {
        let (source, source_tag) = self
            .frame
            .as_ref()
            .map(|(handle, tag)| (*handle, tag.clone()))
            .ok_or(KinError::DetachedFrame)?;
        if !tree.is_valid(source) {
            return Err(KinError::DetachedFrame);
        }
        if !tree.is_valid(target) {
            return Err(KinError::ObjectNotFound("target frame".to_string()));
        }

        let t_target = epoch.unwrap_or(self.t);
        if source == target && source_tag == tag && (epoch.is_none() || self.t == t_target) {
            return Ok(self.clone());
        }

        let key = CacheKey {
            frame: target,
            tag: tag.to_string(),
            coord: self.coord,
            epoch_bits: epoch.map(f64::to_bits),
        };
        if self.cache_enabled {
            if let Some(entry) = self.cache.borrow().get(&key) {
                if entry.stamp == tree.stamp() {
                    return Ok(self.from_cache(entry, target, tag, t_target));
                }
            }
        }

        let transport = Self::route_transport(tree, source, &source_tag, target, tag, t_target)?;

        let mut cart = self.cartesian_state();
        if epoch.is_some() {
            cart = cart.project(t_target - self.t);
        }
        let transformed_cart = transport.apply(&cart);
        let payload = self.restore_coordinate_system(transformed_cart.clone());

        let mut result = self.clone();
        result.t = t_target;
        result.state = payload;
        result.frame = Some((target, tag.to_string()));
        result.cache.borrow_mut().clear();
        if self.cache_enabled {
            self.cache.borrow_mut().insert(
                key,
                CacheEntry {
                    stamp: tree.stamp(),
                    source_t: self.t,
                    source: self.state.clone(),
                    relative: transport,
                    target: result.state.clone(),
                },
            );
        }
        Ok(result)
    }

    /// Rebuilds a transform result from a cache entry. An unmodified source
    /// pose short-circuits to the stored target state; otherwise the stored
    /// relative transport is applied to the current pose.
    fn from_cache(&self, entry: &CacheEntry, target: FrameHandle, tag: &str, t_target: f64) -> MotionState {
        let mut result = self.clone();
        result.t = t_target;
        result.frame = Some((target, tag.to_string()));
        if self.t == entry.source_t && self.state == entry.source {
            result.state = entry.target.clone();
        } else {
            let mut cart = self.cartesian_state();
            if t_target != self.t {
                cart = cart.project(t_target - self.t);
            }
            result.state = self.restore_coordinate_system(entry.relative.apply(&cart));
        }
        result
    }

    /// Composes the source-to-target transport by walking up to the least
    /// common ancestor and back down, with every frame state evaluated at the
    /// given time.
    fn route_transport(
        tree: &FrameTree,
        source: FrameHandle,
        source_tag: &str,
        target: FrameHandle,
        target_tag: &str,
        t: f64,
    ) -> Result<Transport, KinError> {
        let ancestor = tree.common_ancestor(source, target).ok_or_else(|| {
            KinError::TreeMismatch(
                tree.name(source).unwrap_or("?").to_string(),
                tree.name(target).unwrap_or("?").to_string(),
            )
        })?;

        let mut transport = Transport::identity();
        // upward leg: source -> ancestor
        let mut cursor = source;
        while cursor != ancestor {
            let state = Self::frame_state_at(tree, cursor, source_tag, t)?;
            transport = transport.then(&Transport::from_frame_state(&state));
            cursor = tree
                .parent(cursor)
                .ok_or_else(|| KinError::ObjectNotFound("parent frame".to_string()))?;
        }
        // downward leg: ancestor -> target, applied in inverse
        let mut downward = Vec::new();
        let mut cursor = target;
        while cursor != ancestor {
            downward.push(cursor);
            cursor = tree
                .parent(cursor)
                .ok_or_else(|| KinError::ObjectNotFound("parent frame".to_string()))?;
        }
        for handle in downward.into_iter().rev() {
            let state = Self::frame_state_at(tree, handle, target_tag, t)?;
            transport = transport.then(&Transport::from_frame_state(&state).inverse());
        }
        Ok(transport)
    }

    fn frame_state_at(
        tree: &FrameTree,
        frame: FrameHandle,
        tag: &str,
        t: f64,
    ) -> Result<FrameState, KinError> {
        let state = tree
            .state(frame, tag)
            .ok_or_else(|| KinError::ObjectNotFound("frame state".to_string()))?;
        Ok(state.projected(t, crate::kinematics::frame::TimeReference::Absolute))
    }

    /// Transforms this motion state into a frame belonging to a *different*
    /// tree, resolving the junction by frame name (first pre-order match in
    /// the destination tree is authoritative).
    pub fn transform_between_trees(
        &self,
        source_tree: &FrameTree,
        target_tree: &FrameTree,
        target: FrameHandle,
        tag: &str,
    ) -> Result<MotionState, KinError> {
        let (source, source_tag) = self
            .frame
            .as_ref()
            .map(|(handle, tag)| (*handle, tag.clone()))
            .ok_or(KinError::DetachedFrame)?;
        if !source_tree.is_valid(source) {
            return Err(KinError::DetachedFrame);
        }
        let (junction_local, junction_remote) = target_tree
            .common_root_by_name(source_tree, source)
            .ok_or_else(|| {
                KinError::TreeMismatch(
                    source_tree.name(source).unwrap_or("?").to_string(),
                    target_tree.name(target).unwrap_or("?").to_string(),
                )
            })?;

        // hop 1: up to the equivalently named ancestor within the source tree
        let up = Self::route_transport(
            source_tree,
            source,
            &source_tag,
            junction_remote,
            &source_tag,
            self.t,
        )?;
        // hop 2: from that ancestor down to the target within its own tree
        let down = Self::route_transport(target_tree, junction_local, tag, target, tag, self.t)?;
        let transport = up.then(&down);

        let cart = self.cartesian_state();
        let payload = self.restore_coordinate_system(transport.apply(&cart));
        let mut result = self.clone();
        result.state = payload;
        result.frame = Some((target, tag.to_string()));
        result.cache.borrow_mut().clear();
        Ok(result)
    }

    // ---- kinematic utilities --------------------------------------------

    /// Relative Cartesian differences `(dp, dv, da)` with respect to another
    /// motion state, both payloads taken in Cartesian coordinates.
    fn deltas(&self, other: &MotionState) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
        let own = self.cartesian_state();
        let their = other.cartesian_state().project(self.t - other.t);
        (
            own.position - their.position,
            own.velocity - their.velocity,
            own.acceleration - their.acceleration,
        )
    }

    /// Scalar speed at the motion state's own time.
    pub fn speed(&self) -> f64 {
        self.cartesian_state().velocity.norm()
    }

    /// Scalar speed at an arbitrary time under constant acceleration.
    pub fn speed_at(&self, t: f64) -> f64 {
        self.cartesian_state().project(t - self.t).velocity.norm()
    }

    /// Scalar acceleration magnitude.
    pub fn acceleration_norm(&self) -> f64 {
        self.cartesian_state().acceleration.norm()
    }

    /// Range to the frame origin.
    pub fn range(&self) -> f64 {
        self.cartesian_state().position.norm()
    }

    pub fn range_at(&self, t: f64) -> f64 {
        self.cartesian_state().project(t - self.t).position.norm()
    }

    /// Range to another motion state expressed in the same frame.
    pub fn range_to(&self, other: &MotionState) -> f64 {
        let (dp, _, _) = self.deltas(other);
        dp.norm()
    }

    /// First time-derivative of the range to the frame origin.
    pub fn range_rate(&self) -> f64 {
        let cart = self.cartesian_state();
        range_rate_of(&cart.position, &cart.velocity)
    }

    /// First time-derivative of the range to another motion state.
    pub fn range_rate_to(&self, other: &MotionState) -> f64 {
        let (dp, dv, _) = self.deltas(other);
        range_rate_of(&dp, &dv)
    }

    /// Second time-derivative of the range to the frame origin.
    pub fn range_acceleration(&self) -> f64 {
        let cart = self.cartesian_state();
        range_acceleration_of(&cart.position, &cart.velocity, &cart.acceleration)
    }

    /// Second time-derivative of the range to another motion state.
    pub fn range_acceleration_to(&self, other: &MotionState) -> f64 {
        let (dp, dv, da) = self.deltas(other);
        range_acceleration_of(&dp, &dv, &da)
    }

    /// Minimum approach distance with respect to another motion state, along
    /// with the time at which it is achieved. Obtained by zeroing the time
    /// derivative of the squared range under the constant-acceleration
    /// propagator; among the stationary points the smallest non-negative real
    /// root is preferred, else the smallest real root in magnitude.
    pub fn minimum_approach(&self, other: &MotionState) -> (f64, f64) {
        let (dp, dv, da) = self.deltas(other);
        let half_da = da * 0.5;
        let coeff = [
            2.0 * half_da.dot(&half_da),
            3.0 * dv.dot(&half_da),
            2.0 * dp.dot(&half_da) + dv.dot(&dv),
            dp.dot(&dv),
        ];
        let solver = LowOrderPolynomialSolver::default();
        let (_, roots) = solver.solve(&coeff);
        let tau = LowOrderPolynomialSolver::preferred_real_root(&roots).unwrap_or(0.0);
        let miss = dp + dv * tau + half_da * (tau * tau);
        (miss.norm(), self.t + tau)
    }

    /// The time at which the range to another motion state first reaches the
    /// provided value, from the quartic in the squared-range polynomial.
    /// Returns None when the range is never achieved.
    pub fn approach_time(&self, range: f64, other: &MotionState) -> Option<f64> {
        let (dp, dv, da) = self.deltas(other);
        let half_da = da * 0.5;
        let coeff = [
            half_da.dot(&half_da),
            2.0 * dv.dot(&half_da),
            dv.dot(&dv) + 2.0 * dp.dot(&half_da),
            2.0 * dp.dot(&dv),
            dp.dot(&dp) - range * range,
        ];
        let solver = LowOrderPolynomialSolver::default();
        let (_, roots) = solver.solve(&coeff);
        LowOrderPolynomialSolver::preferred_real_root(&roots).map(|tau| self.t + tau)
    }

    /// Line of sight distance with respect to another motion state (the
    /// closest approach of the relative straight-line trajectory), along with
    /// the time at which it is projected to occur.
    pub fn line_of_sight(&self, other: &MotionState) -> (f64, f64) {
        let (dp, dv, _) = self.deltas(other);
        let speed_sq = dv.dot(&dv);
        let tau = if speed_sq > 0.0 {
            -dp.dot(&dv) / speed_sq
        } else {
            0.0
        };
        ((dp + dv * tau).norm(), self.t + tau)
    }

    /// Signed distance to the plane through the other motion state's position
    /// and normal to its direction of travel.
    pub fn distance_to_plane(&self, other: &MotionState) -> f64 {
        let own = self.cartesian_state();
        let their = other.cartesian_state();
        let speed = their.velocity.norm();
        if speed == 0.0 {
            return 0.0;
        }
        let normal = their.velocity / speed;
        (own.position - their.position).dot(&normal)
    }

    /// Distance to the plane normal to the other motion state's direction of
    /// travel along with the time at which this object's trajectory
    /// penetrates that plane (None when it never does).
    pub fn plane_intersection(&self, other: &MotionState) -> (f64, Option<f64>) {
        let own = self.cartesian_state();
        let their = other.cartesian_state();
        let speed = their.velocity.norm();
        if speed == 0.0 {
            return (0.0, None);
        }
        let normal = their.velocity / speed;
        let distance = (own.position - their.position).dot(&normal);
        let coeff = [
            0.5 * own.acceleration.dot(&normal),
            own.velocity.dot(&normal),
            distance,
        ];
        let solver = LowOrderPolynomialSolver::default();
        let (_, roots) = solver.solve(&coeff);
        (
            distance,
            LowOrderPolynomialSolver::preferred_real_root(&roots).map(|tau| self.t + tau),
        )
    }

    /// Serializes the time tag, the kinematic payload in schema order and the
    /// coordinate system tag as a small integer.
    pub fn serialize<B: BufMut>(&self, buf: &mut B) {
        buf.put_f64_le(self.t);
        self.state.serialize(buf);
        buf.put_u8(match self.coord {
            CoordinateSystem::Cartesian => 0,
            CoordinateSystem::Spherical => 1,
        });
        buf.put_u8(match self.convention {
            SphericalConvention::ZenithFromZ => 0,
            SphericalConvention::ElevationFromXY => 1,
        });
    }

    /// Deserializes a motion state written by [MotionState::serialize]. The
    /// result is detached.
    pub fn deserialize<B: Buf>(buf: &mut B) -> Result<Self, KinError> {
        if buf.remaining() < 8 {
            return Err(KinError::LoadingError("truncated motion state".to_string()));
        }
        let t = buf.get_f64_le();
        let state = KinematicState::deserialize(buf)?;
        if buf.remaining() < 2 {
            return Err(KinError::LoadingError("truncated motion state".to_string()));
        }
        let coord = match buf.get_u8() {
            1 => CoordinateSystem::Spherical,
            _ => CoordinateSystem::Cartesian,
        };
        let convention = match buf.get_u8() {
            1 => SphericalConvention::ElevationFromXY,
            _ => SphericalConvention::ZenithFromZ,
        };
        Ok(Self {
            t,
            state,
            coord,
            convention,
            frame: None,
            cache_enabled: KinematicsConfig::default().cache_transforms,
            cache: RefCell::new(HashMap::new()),
        })
    }
}

fn range_rate_of(dp: &Vector3<f64>, dv: &Vector3<f64>) -> f64 {
    let range = dp.norm();
    if range == 0.0 {
        0.0
    } else {
        dp.dot(dv) / range
    }
}

fn range_acceleration_of(dp: &Vector3<f64>, dv: &Vector3<f64>, da: &Vector3<f64>) -> f64 {
    let range = dp.norm();
    if range == 0.0 {
        0.0
    } else {
        let radial = dp.dot(dv) / range;
        (dv.dot(dv) + dp.dot(da)) / range - radial * radial / range
    }
}

/// A mapped container of named motion states.
#[derive(Debug, Default)]
pub struct MotionStateMap {
    states: BTreeMap<String, MotionState>,
}

impl MotionStateMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a motion state under the given name, replacing any previous one.
    pub fn add(&mut self, name: &str, state: MotionState) {
        self.states.insert(name.to_string(), state);
    }

    pub fn get(&self, name: &str) -> Option<&MotionState> {
        self.states.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut MotionState> {
        self.states.get_mut(name)
    }

    pub fn delete(&mut self, name: &str) -> Option<MotionState> {
        self.states.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.states.keys()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state_at(position: Vector3<f64>, velocity: Vector3<f64>) -> MotionState {
        let mut ms = MotionState::new(&KinematicsConfig::default());
        {
            let payload = ms.state_mut();
            payload.position = position;
            payload.velocity = velocity;
        }
        ms
    }

    #[test]
    fn range_and_range_rate() {
        let own = state_at(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let other = state_at(Vector3::new(4.0, 3.0, 0.0), Vector3::zeros());
        assert_relative_eq!(own.range_to(&other), 5.0, epsilon = 1e-12);
        assert_relative_eq!(own.range_rate_to(&other), -4.0 / 5.0, epsilon = 1e-12);
    }

    #[test]
    fn minimum_approach_of_crossing_trajectories() {
        let own = state_at(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let other = state_at(Vector3::new(4.0, 3.0, 0.0), Vector3::zeros());
        let (distance, t_approach) = own.minimum_approach(&other);
        assert_relative_eq!(distance, 3.0, epsilon = 1e-9);
        assert_relative_eq!(t_approach, 4.0, epsilon = 1e-9);
    }

    #[test]
    fn approach_time_prefers_smallest_non_negative_root() {
        let own = state_at(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let other = state_at(Vector3::new(4.0, 3.0, 0.0), Vector3::zeros());
        // range 5 holds at tau = 0 and tau = 8
        let t = own.approach_time(5.0, &other).unwrap();
        assert_relative_eq!(t, 0.0, epsilon = 1e-9);
        // an unreachable range has no real solution
        assert!(own.approach_time(1.0, &other).is_none());
    }

    #[test]
    fn line_of_sight_matches_straight_line_geometry() {
        let own = state_at(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let other = state_at(Vector3::new(4.0, 3.0, 0.0), Vector3::zeros());
        let (distance, t_approach) = own.line_of_sight(&other);
        assert_relative_eq!(distance, 3.0, epsilon = 1e-12);
        assert_relative_eq!(t_approach, 4.0, epsilon = 1e-12);
    }

    #[test]
    fn plane_intersection_times() {
        let other = state_at(Vector3::new(4.0, 3.0, 0.0), Vector3::new(0.0, 1.0, 0.0));

        let crossing = state_at(Vector3::zeros(), Vector3::new(0.0, 1.0, 0.0));
        let (distance, time) = crossing.plane_intersection(&other);
        assert_relative_eq!(distance, -3.0, epsilon = 1e-12);
        assert_relative_eq!(time.unwrap(), 3.0, epsilon = 1e-9);

        let parallel = state_at(Vector3::zeros(), Vector3::new(1.0, 0.0, 0.0));
        let (distance, time) = parallel.plane_intersection(&other);
        assert_relative_eq!(distance, -3.0, epsilon = 1e-12);
        assert!(time.is_none());
    }

    #[test]
    fn coordinate_conversion_round_trip() {
        let mut ms = state_at(Vector3::new(300.0, 400.0, 120.0), Vector3::new(-5.0, 2.0, 1.0));
        let original = ms.state().clone();
        ms.to_coordinate_system(CoordinateSystem::Spherical);
        assert_eq!(ms.coordinate_system(), CoordinateSystem::Spherical);
        ms.to_coordinate_system(CoordinateSystem::Cartesian);
        for i in 0..3 {
            assert_relative_eq!(ms.state().position[i], original.position[i], max_relative = 1e-9);
            assert_relative_eq!(ms.state().velocity[i], original.velocity[i], max_relative = 1e-9);
        }
    }

    #[test]
    fn elevation_convention_flips_polar_components() {
        let mut ms = state_at(Vector3::new(100.0, 0.0, 0.0), Vector3::zeros());
        ms.to_coordinate_system(CoordinateSystem::Spherical);
        let zenith = ms.state().position[1];
        ms.set_spherical_convention(SphericalConvention::ElevationFromXY);
        assert_relative_eq!(ms.state().position[1], FRAC_PI_2 - zenith, epsilon = 1e-12);
    }

    #[test]
    fn motion_state_map_round_trip() {
        let mut map = MotionStateMap::new();
        map.add("ownship", state_at(Vector3::new(1.0, 0.0, 0.0), Vector3::zeros()));
        map.add("bogey", state_at(Vector3::new(0.0, 1.0, 0.0), Vector3::zeros()));
        assert_eq!(map.len(), 2);
        assert!(map.get("ownship").is_some());
        assert!(map.delete("bogey").is_some());
        assert!(map.get("bogey").is_none());
        assert_eq!(map.names().count(), 1);
    }
}
