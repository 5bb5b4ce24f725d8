use std::{cell::RefCell, rc::Rc};

use armature::{Error, HierarchyObserver, NodeId, NodeKind, Scene, SceneConfig};
use nalgebra::Vector3;

#[derive(Debug, Default, Clone)]
struct Log(Rc<RefCell<Vec<String>>>);

impl HierarchyObserver for Log {
    fn did_add_descendant(&mut self, ancestor: NodeId, descendant: NodeId) {
        self.0.borrow_mut().push(format!("+{ancestor}/{descendant}"));
    }

    fn did_remove_descendant(&mut self, ancestor: NodeId, descendant: NodeId) {
        self.0.borrow_mut().push(format!("-{ancestor}/{descendant}"));
    }
}

fn chain(scene: &mut Scene, names: &[&str]) -> Vec<NodeId> {
    let ids: Vec<NodeId> = names
        .iter()
        .map(|n| scene.create_node(*n, NodeKind::Plain))
        .collect();
    for pair in ids.windows(2) {
        scene.add_child(pair[0], pair[1]).unwrap();
    }
    ids
}

#[test]
fn ancestors_hear_about_changes_below_them() {
    let mut scene = Scene::new();
    let ids = chain(&mut scene, &["a", "b", "c"]);
    let log = Log::default();
    scene.set_observer(Box::new(log.clone()));

    let d = scene.create_node("d", NodeKind::Plain);
    scene.add_child(ids[2], d).unwrap();
    scene.remove_child(ids[2], d).unwrap();
    let expected: Vec<String> = [ids[2], ids[1], ids[0]]
        .iter()
        .map(|a| format!("+{a}/{d}"))
        .chain([ids[2], ids[1], ids[0]].iter().map(|a| format!("-{a}/{d}")))
        .collect();
    assert_eq!(*log.0.borrow(), expected);
    assert!(scene.take_observer().is_some());
}

#[test]
fn traversal_is_depth_first() {
    let mut scene = Scene::new();
    let ids = chain(&mut scene, &["root", "left", "left.leaf"]);
    let right = scene.create_node("right", NodeKind::Plain);
    scene.add_child(ids[0], right).unwrap();
    assert_eq!(
        scene.flatten(ids[0]).unwrap(),
        vec![ids[0], ids[1], ids[2], right]
    );
    assert_eq!(scene.root_ancestor(ids[2]).unwrap(), ids[0]);
    assert!(scene.is_descendant_of(ids[2], ids[0]).unwrap());
    assert!(!scene.is_descendant_of(right, ids[1]).unwrap());
    assert_eq!(scene.node_named(ids[0], "right").unwrap(), Some(right));
    assert_eq!(scene.node_named(ids[1], "right").unwrap(), None);
}

#[test]
fn tags_come_from_the_scene() {
    let mut scene = Scene::with_config(SceneConfig {
        first_tag: 100,
        ..SceneConfig::default()
    });
    let a = scene.create_node("a", NodeKind::Plain);
    let b = scene.create_node("b", NodeKind::Plain);
    assert_eq!(scene.node(a).unwrap().tag(), 100);
    assert_eq!(scene.node(b).unwrap().tag(), 101);
    scene.add_child(a, b).unwrap();
    assert_eq!(scene.node_tagged(a, 101).unwrap(), Some(b));

    scene.reset_tag_allocation();
    let c = scene.create_node("c", NodeKind::Plain);
    assert_eq!(scene.node(c).unwrap().tag(), 100);
}

#[test]
fn destroying_a_branch_keeps_the_rest() {
    let mut scene = Scene::new();
    let ids = chain(&mut scene, &["root", "branch", "twig"]);
    let other = scene.create_node("other", NodeKind::Plain);
    scene.add_child(ids[0], other).unwrap();
    assert_eq!(scene.len(), 4);

    scene.destroy(ids[1]).unwrap();
    assert_eq!(scene.len(), 2);
    assert!(!scene.contains(ids[1]));
    assert!(!scene.contains(ids[2]));
    assert_eq!(scene.children(ids[0]).unwrap(), &[other]);
    assert_eq!(scene.parent(ids[2]), Err(Error::InvalidNode(ids[2])));
}

#[test]
fn copied_trackers_keep_tracking() {
    let mut scene = Scene::new();
    let eye = scene.create_node("eye", NodeKind::Plain);
    let target = scene.create_node("target", NodeKind::Plain);
    scene.set_location(target, Vector3::new(0.0, 0.0, 5.0)).unwrap();
    scene.set_target(eye, Some(target)).unwrap();
    scene.set_should_track_target(eye, true).unwrap();

    let copy = scene.copy_node(eye).unwrap();
    assert_eq!(scene.node(copy).unwrap().name(), "eye");
    assert_eq!(scene.target(copy).unwrap(), Some(target));
    scene.global_transform_matrix(copy).unwrap();

    scene.set_location(target, Vector3::new(5.0, 0.0, 0.0)).unwrap();
    let fwd = scene.global_forward_direction(copy).unwrap();
    assert!((fwd - Vector3::x()).abs().max() < 1.0e-4);
}

#[test]
fn running_and_visibility_flow_down() {
    let mut scene = Scene::new();
    let ids = chain(&mut scene, &["a", "b"]);
    scene.set_is_running(ids[0], true).unwrap();
    let c = scene.create_node("c", NodeKind::Plain);
    scene.add_child(ids[1], c).unwrap();
    assert!(scene.node(c).unwrap().is_running());

    scene.set_visible(ids[0], false).unwrap();
    assert!(scene.node(c).unwrap().is_visible_locally());
    assert!(!scene.is_visible(c).unwrap());
}
