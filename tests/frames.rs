extern crate kintrack;

use kintrack::dimensions::Vector3;
use kintrack::errors::KinError;
use kintrack::kinematics::{
    AngleUnit, FrameState, FrameTree, KinematicsConfig, MotionState, DEFAULT_FRAME_STATE,
};

use approx::assert_relative_eq;

/// world -> platform (translated, moving) -> sensor (rotated, offset)
fn rigid_test_tree() -> (FrameTree, kintrack::kinematics::FrameHandle) {
    let mut tree = FrameTree::new("world");
    let platform = tree.create_child(tree.root(), "platform").unwrap();
    let sensor = tree.create_child(platform, "sensor").unwrap();

    let mut platform_state = FrameState::default();
    platform_state.origin = Vector3::new(100.0, -50.0, 20.0);
    platform_state.velocity = Vector3::new(5.0, 1.0, 0.0);
    platform_state.acceleration = Vector3::new(0.1, 0.0, -0.05);
    platform_state.eulers = Vector3::new(0.1, -0.2, 0.7);
    tree.set_state(platform, DEFAULT_FRAME_STATE, platform_state)
        .unwrap();

    let mut sensor_state = FrameState::default();
    sensor_state.origin = Vector3::new(1.0, 2.0, 0.5);
    sensor_state.eulers = Vector3::new(0.0, 0.3, -1.1);
    tree.set_state(sensor, DEFAULT_FRAME_STATE, sensor_state)
        .unwrap();

    (tree, sensor)
}

fn payload_state(config: &KinematicsConfig, frame: kintrack::kinematics::FrameHandle) -> MotionState {
    let mut ms = MotionState::in_frame(config, frame, DEFAULT_FRAME_STATE);
    {
        let payload = ms.state_mut();
        payload.position = Vector3::new(10.0, -3.0, 4.0);
        payload.velocity = Vector3::new(0.5, 0.25, -1.0);
        payload.acceleration = Vector3::new(0.0, 0.01, 0.02);
        payload.eulers = Vector3::new(0.05, 0.1, -0.2);
        payload.euler_rates = Vector3::new(0.01, 0.0, 0.02);
    }
    ms
}

#[test]
fn tree_parent_child_invariants() {
    let (tree, _) = rigid_test_tree();
    for frame in tree.iter(tree.root()) {
        for child in tree.children(frame) {
            assert_eq!(tree.parent(child), Some(frame));
        }
        if let Some(parent) = tree.parent(frame) {
            assert!(tree.children(parent).contains(&frame));
        }
    }
}

#[test]
fn transform_identity() {
    let tree = FrameTree::new("frame");
    let frame = tree.root();
    let config = KinematicsConfig::default();
    let mut ms = MotionState::in_frame(&config, frame, DEFAULT_FRAME_STATE);
    ms.state_mut().position = Vector3::new(1.0, 2.0, 3.0);

    let result = ms
        .transform_clone_to_frame(&tree, frame, DEFAULT_FRAME_STATE)
        .unwrap();
    assert_eq!(result.state().position, Vector3::new(1.0, 2.0, 3.0));
    assert_eq!(result.state().velocity, Vector3::zeros());
}

#[test]
fn child_to_parent_with_yaw_rotation() {
    let mut tree = FrameTree::new("parent");
    let child = tree.create_child(tree.root(), "child").unwrap();
    let mut rotated = FrameState::default();
    rotated.angle_units = AngleUnit::Degrees;
    rotated.eulers = Vector3::new(0.0, 0.0, 90.0);
    tree.set_state(child, DEFAULT_FRAME_STATE, rotated).unwrap();

    let config = KinematicsConfig::default();
    let mut ms = MotionState::in_frame(&config, child, DEFAULT_FRAME_STATE);
    ms.state_mut().position = Vector3::new(1.0, 0.0, 0.0);

    let result = ms
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();
    assert_relative_eq!(result.state().position[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(result.state().position[1], 1.0, epsilon = 1e-12);
    assert_relative_eq!(result.state().position[2], 0.0, epsilon = 1e-12);
}

#[test]
fn rotating_frame_velocity_transport() {
    let mut tree = FrameTree::new("parent");
    let child = tree.create_child(tree.root(), "child").unwrap();
    let mut spinning = FrameState::default();
    spinning.euler_rates = Vector3::new(0.0, 0.0, 1.0);
    tree.set_state(child, DEFAULT_FRAME_STATE, spinning).unwrap();

    let config = KinematicsConfig::default();
    let mut ms = MotionState::in_frame(&config, child, DEFAULT_FRAME_STATE);
    ms.state_mut().position = Vector3::new(1.0, 0.0, 0.0);

    let result = ms
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();
    assert_relative_eq!(result.state().velocity[0], 0.0, epsilon = 1e-12);
    assert_relative_eq!(result.state().velocity[1], 1.0, epsilon = 1e-12);
    assert_relative_eq!(result.state().velocity[2], 0.0, epsilon = 1e-12);
}

#[test]
fn rigid_transform_round_trip() {
    let (tree, sensor) = rigid_test_tree();
    let config = KinematicsConfig::default();
    let ms = payload_state(&config, sensor);

    let in_world = ms
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();
    let back = in_world
        .transform_clone_to_frame(&tree, sensor, DEFAULT_FRAME_STATE)
        .unwrap();

    for i in 0..3 {
        assert_relative_eq!(
            back.state().position[i],
            ms.state().position[i],
            epsilon = 1e-9,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            back.state().velocity[i],
            ms.state().velocity[i],
            epsilon = 1e-9,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            back.state().acceleration[i],
            ms.state().acceleration[i],
            epsilon = 1e-9,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            back.state().eulers[i],
            ms.state().eulers[i],
            epsilon = 1e-9,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            back.state().euler_rates[i],
            ms.state().euler_rates[i],
            epsilon = 1e-9,
            max_relative = 1e-9
        );
    }
}

#[test]
fn temporal_transform_round_trip() {
    // translating, accelerating, non-rotating chain
    let mut tree = FrameTree::new("world");
    let platform = tree.create_child(tree.root(), "platform").unwrap();
    let mut moving = FrameState::default();
    moving.origin = Vector3::new(10.0, 0.0, 0.0);
    moving.velocity = Vector3::new(1.0, -2.0, 0.5);
    moving.acceleration = Vector3::new(0.0, 0.1, 0.0);
    tree.set_state(platform, DEFAULT_FRAME_STATE, moving).unwrap();

    let config = KinematicsConfig::default();
    let ms = payload_state(&config, platform);

    let mut forward = ms.clone();
    forward
        .transform_to_frame_at(&tree, tree.root(), DEFAULT_FRAME_STATE, 1.0)
        .unwrap();
    assert_relative_eq!(forward.t(), 1.0);

    let mut back = forward.clone();
    back.transform_to_frame_at(&tree, platform, DEFAULT_FRAME_STATE, 0.0)
        .unwrap();

    for i in 0..3 {
        assert_relative_eq!(
            back.state().position[i],
            ms.state().position[i],
            epsilon = 1e-6,
            max_relative = 1e-6
        );
        assert_relative_eq!(
            back.state().velocity[i],
            ms.state().velocity[i],
            epsilon = 1e-6,
            max_relative = 1e-6
        );
    }
}

#[test]
fn cached_transform_is_bit_identical() {
    let (tree, sensor) = rigid_test_tree();

    let cached_config = KinematicsConfig {
        cache_transforms: true,
    };
    let uncached_config = KinematicsConfig {
        cache_transforms: false,
    };

    let cached = payload_state(&cached_config, sensor);
    let uncached = payload_state(&uncached_config, sensor);

    let first = cached
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();
    // second call is served from the cache
    let second = cached
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();
    let reference = uncached
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();

    // bitwise equality, i.e. zero ULP apart
    assert_eq!(first.state(), second.state());
    assert_eq!(second.state(), reference.state());
}

#[test]
fn ancestor_mutation_invalidates_cache() {
    let (mut tree, sensor) = rigid_test_tree();
    let platform = tree.parent(sensor).unwrap();

    let config = KinematicsConfig::default();
    let ms = payload_state(&config, sensor);
    let before = ms
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();

    // move the ancestor; the cached entry must no longer be consulted
    let mut relocated = tree.state(platform, DEFAULT_FRAME_STATE).unwrap().clone();
    relocated.origin += Vector3::new(0.0, 0.0, 500.0);
    tree.set_state(platform, DEFAULT_FRAME_STATE, relocated)
        .unwrap();

    let after = ms
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();
    let fresh = payload_state(
        &KinematicsConfig {
            cache_transforms: false,
        },
        sensor,
    )
    .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
    .unwrap();

    assert_ne!(before.state().position, after.state().position);
    assert_eq!(after.state(), fresh.state());
}

#[test]
fn deleted_subtree_detaches_motion_states() {
    let (mut tree, sensor) = rigid_test_tree();
    let platform = tree.parent(sensor).unwrap();
    let config = KinematicsConfig::default();
    let ms = payload_state(&config, sensor);

    tree.delete_subtree(platform).unwrap();
    match ms.transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE) {
        Err(KinError::DetachedFrame) => (),
        other => panic!("expected a detached frame error, got {:?}", other),
    }
}

#[test]
fn cross_tree_transform_by_name() {
    let (tree_a, sensor) = rigid_test_tree();

    // an equivalent "platform" lives in another tree with a different child
    let mut tree_b = FrameTree::new("base");
    let platform_b = tree_b.create_child(tree_b.root(), "platform").unwrap();
    let antenna = tree_b.create_child(platform_b, "antenna").unwrap();
    let mut antenna_state = FrameState::default();
    antenna_state.origin = Vector3::new(0.0, 0.0, 3.0);
    tree_b
        .set_state(antenna, DEFAULT_FRAME_STATE, antenna_state)
        .unwrap();

    let config = KinematicsConfig::default();
    let ms = payload_state(&config, sensor);
    let result = ms
        .transform_between_trees(&tree_a, &tree_b, antenna, DEFAULT_FRAME_STATE)
        .unwrap();
    assert_eq!(result.frame().unwrap().0, antenna);

    // the junction is the shared "platform": the result must match composing
    // sensor->platform in tree a with platform->antenna in tree b
    let in_platform = ms
        .transform_clone_to_frame(&tree_a, tree_a.parent(sensor).unwrap(), DEFAULT_FRAME_STATE)
        .unwrap();
    for i in 0..3 {
        assert_relative_eq!(
            result.state().position[i],
            in_platform.state().position[i] - antenna_state_origin()[i],
            epsilon = 1e-12
        );
    }
}

fn antenna_state_origin() -> Vector3<f64> {
    Vector3::new(0.0, 0.0, 3.0)
}

#[test]
fn disjoint_trees_report_mismatch() {
    let (tree_a, sensor) = rigid_test_tree();
    let tree_b = FrameTree::new("unrelated");

    let config = KinematicsConfig::default();
    let ms = payload_state(&config, sensor);
    match ms.transform_between_trees(&tree_a, &tree_b, tree_b.root(), DEFAULT_FRAME_STATE) {
        Err(KinError::TreeMismatch(_, _)) => (),
        other => panic!("expected a tree mismatch, got {:?}", other),
    }
}

#[test]
fn concurrent_readers_agree() {
    use rayon::prelude::*;
    use std::sync::Arc;

    let (tree, sensor) = rigid_test_tree();
    let tree = Arc::new(tree);
    let config = KinematicsConfig::default();

    let reference = payload_state(&config, sensor)
        .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
        .unwrap();

    let all_equal = (0..64).into_par_iter().all(|_| {
        let ms = payload_state(&config, sensor);
        let result = ms
            .transform_clone_to_frame(&tree, tree.root(), DEFAULT_FRAME_STATE)
            .unwrap();
        result.state() == reference.state()
    });
    assert!(all_equal);
}

#[test]
fn motion_state_binary_round_trip() {
    let (_, sensor) = rigid_test_tree();
    let config = KinematicsConfig::default();
    let mut ms = payload_state(&config, sensor);
    ms.set_t(42.5);

    let mut buf = bytes::BytesMut::new();
    ms.serialize(&mut buf);
    let back = MotionState::deserialize(&mut buf.freeze()).unwrap();
    assert_eq!(back.t(), 42.5);
    assert_eq!(back.state(), ms.state());
    assert!(back.frame().is_none());
}
