use std::sync::Arc;

use armature::{
    animation::ArrayNodeAnimation, Error, NodeAnimation, NodeId, NodeKind, Scene, TrackId,
    DEFAULT_TRACK,
};
use nalgebra::Vector3;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

fn hold(location: Vector3<f32>) -> Arc<dyn NodeAnimation> {
    Arc::new(ArrayNodeAnimation::new(1).with_locations(vec![location]))
}

fn line() -> Arc<dyn NodeAnimation> {
    Arc::new(ArrayNodeAnimation::new(3).with_locations(vec![
        Vector3::zeros(),
        Vector3::new(10.0, 0.0, 0.0),
        Vector3::new(20.0, 0.0, 0.0),
    ]))
}

fn close(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
    (a - b).abs().max() <= 1.0e-4 * (1.0 + b.abs().max())
}

/// One weighted track holding a single location.
#[derive(Debug, Clone)]
struct Layer {
    weight: f32,
    location: Vector3<f32>,
}

impl Arbitrary for Layer {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut coord = || (i16::arbitrary(g) % 200) as f32 / 8.0;
        let location = Vector3::new(coord(), coord(), coord());
        Self {
            weight: *g.choose(&[0.25f32, 0.5, 1.0, 2.0, 4.0]).unwrap_or(&1.0),
            location,
        }
    }
}

/// Play each layer on its own track, in order, and return the blended location.
fn blend(layers: &[&Layer]) -> Result<Vector3<f32>, Error> {
    let mut scene = Scene::new();
    let n = scene.create_node("n", NodeKind::Plain);
    for (i, layer) in layers.iter().enumerate() {
        let track: TrackId = if i == 0 {
            DEFAULT_TRACK
        } else {
            scene.generate_track_id()
        };
        scene.add_animation(n, hold(layer.location), track)?;
        scene.set_animation_blending_weight(n, layer.weight, track)?;
        scene.establish_animation_frame_at(n, 0.0, track)?;
    }
    scene.update(n)?;
    scene.location(n)
}

#[quickcheck]
fn blend_is_the_weighted_mean(a: Layer, b: Layer) -> bool {
    let expected = (a.location * a.weight + b.location * b.weight) / (a.weight + b.weight);
    match (blend(&[&a, &b]), blend(&[&b, &a])) {
        (Ok(ab), Ok(ba)) => close(&ab, &expected) && close(&ba, &expected),
        _ => false,
    }
}

#[test]
fn equal_weights_meet_halfway() {
    let mut scene = Scene::new();
    let n = scene.create_node("n", NodeKind::Plain);
    let second = scene.generate_track_id();
    scene.add_animation(n, hold(Vector3::zeros()), DEFAULT_TRACK).unwrap();
    scene.add_animation(n, hold(Vector3::new(10.0, 0.0, 0.0)), second).unwrap();
    scene.establish_animation_frame_at(n, 0.0, DEFAULT_TRACK).unwrap();
    scene.establish_animation_frame_at(n, 0.0, second).unwrap();
    scene.update(n).unwrap();
    assert_eq!(scene.location(n).unwrap(), Vector3::new(5.0, 0.0, 0.0));

    scene.disable_animation_on_track(n, second).unwrap();
    scene.update(n).unwrap();
    assert_eq!(scene.location(n).unwrap(), Vector3::zeros());
}

#[test]
fn unanimated_channels_are_left_alone() {
    let mut scene = Scene::new();
    let n = scene.create_node("n", NodeKind::Plain);
    scene.set_scale(n, Vector3::repeat(2.0)).unwrap();
    scene.add_animation(n, line(), DEFAULT_TRACK).unwrap();
    scene.establish_animation_frame_at(n, 0.25, DEFAULT_TRACK).unwrap();
    scene.update(n).unwrap();
    assert!(close(&scene.location(n).unwrap(), &Vector3::new(5.0, 0.0, 0.0)));
    assert_eq!(scene.scale(n).unwrap(), Vector3::repeat(2.0));
}

#[test]
fn animation_moves_descendants() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let child = scene.create_node("child", NodeKind::Plain);
    scene.add_child(root, child).unwrap();
    scene.set_location(child, Vector3::new(0.0, 1.0, 0.0)).unwrap();
    scene.add_animation(root, line(), DEFAULT_TRACK).unwrap();
    scene.establish_animation_frame_at(root, 1.0, DEFAULT_TRACK).unwrap();
    scene.update(root).unwrap();
    assert_eq!(
        scene.global_location(child).unwrap(),
        Vector3::new(20.0, 1.0, 0.0)
    );
}

#[test]
fn segments_replay_part_of_a_track() {
    let mut scene = Scene::new();
    let n = scene.create_node("n", NodeKind::Plain);
    scene.add_animation(n, line(), DEFAULT_TRACK).unwrap();
    let tail = scene.add_animation_from(n, 0.5, 1.0, DEFAULT_TRACK).unwrap();
    assert_ne!(tail, DEFAULT_TRACK);
    assert!(scene.contains_animation_on_track(n, tail).unwrap());
    scene.disable_animation_on_track(n, DEFAULT_TRACK).unwrap();

    scene.establish_animation_frame_at(n, 0.0, tail).unwrap();
    scene.update(n).unwrap();
    assert_eq!(scene.location(n).unwrap(), Vector3::new(10.0, 0.0, 0.0));

    scene.establish_animation_frame_at(n, 1.0, tail).unwrap();
    scene.update(n).unwrap();
    assert_eq!(scene.location(n).unwrap(), Vector3::new(20.0, 0.0, 0.0));
}

#[test]
fn times_outside_the_unit_interval_are_rejected() {
    let mut scene = Scene::new();
    let n = scene.create_node("n", NodeKind::Plain);
    scene.add_animation(n, line(), DEFAULT_TRACK).unwrap();
    assert_eq!(
        scene.establish_animation_frame_at(n, 1.5, DEFAULT_TRACK),
        Err(Error::AnimationTimeOutOfRange(1.5))
    );
    assert_eq!(
        scene.establish_animation_frame_at(n, -0.1, DEFAULT_TRACK),
        Err(Error::AnimationTimeOutOfRange(-0.1))
    );
}

#[test]
fn frozen_tracks_hold_the_rest_of_the_tree() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let still: NodeId = scene.create_node("still", NodeKind::Plain);
    scene.add_child(root, still).unwrap();
    scene.set_location(still, Vector3::new(3.0, 0.0, 0.0)).unwrap();
    scene.add_animation(root, line(), DEFAULT_TRACK).unwrap();

    scene.freeze_all_inanimates_on_track(root, DEFAULT_TRACK).unwrap();
    assert!(!scene.animation(root, DEFAULT_TRACK).unwrap().unwrap().is_frozen());
    assert!(scene.animation(still, DEFAULT_TRACK).unwrap().unwrap().is_frozen());

    scene.set_location(still, Vector3::new(9.0, 0.0, 0.0)).unwrap();
    scene.establish_animation_frame_at(root, 0.5, DEFAULT_TRACK).unwrap();
    scene.update(root).unwrap();
    assert_eq!(scene.location(still).unwrap(), Vector3::new(3.0, 0.0, 0.0));
    assert_eq!(scene.location(root).unwrap(), Vector3::new(10.0, 0.0, 0.0));
}

#[test]
fn removing_a_track_stops_it() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let child = scene.create_node("child", NodeKind::Plain);
    scene.add_child(root, child).unwrap();
    scene.add_animation(child, line(), DEFAULT_TRACK).unwrap();
    assert!(scene.contains_animation(root).unwrap());
    scene.remove_animation_track(root, DEFAULT_TRACK).unwrap();
    assert!(!scene.contains_animation(root).unwrap());
    assert!(scene.animation(child, DEFAULT_TRACK).unwrap().is_none());
}
