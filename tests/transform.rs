use armature::{Error, NodeId, NodeKind, Scene};
use nalgebra::{Matrix4, Vector3};
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

#[derive(Debug, Clone)]
enum Mutation {
    Move(usize, Vector3<f32>),
    Rotate(usize, Vector3<f32>),
    Scale(usize, Vector3<f32>),
    Reparent(usize, usize),
    Read(usize),
}

/// A random tree plus a random series of edits and reads against it.
#[derive(Debug, Clone)]
struct Script {
    parents: Vec<Option<usize>>,
    mutations: Vec<Mutation>,
}

fn small(g: &mut Gen) -> f32 {
    (i16::arbitrary(g) % 40) as f32 / 4.0
}

fn angle(g: &mut Gen) -> f32 {
    (i16::arbitrary(g) % 180) as f32
}

fn factor(g: &mut Gen) -> f32 {
    *g.choose(&[0.5f32, 1.0, 2.0]).unwrap_or(&1.0)
}

impl Arbitrary for Script {
    fn arbitrary(g: &mut Gen) -> Self {
        let count = 2 + usize::arbitrary(g) % 7;
        let parents = (0..count)
            .map(|i| {
                if i == 0 || u8::arbitrary(g) % 5 == 0 {
                    None
                } else {
                    Some(usize::arbitrary(g) % i)
                }
            })
            .collect();
        let steps = usize::arbitrary(g) % 16;
        let mutations = (0..steps)
            .map(|_| {
                let n = usize::arbitrary(g) % count;
                match u8::arbitrary(g) % 5 {
                    0 => Mutation::Move(n, Vector3::new(small(g), small(g), small(g))),
                    1 => Mutation::Rotate(n, Vector3::new(angle(g), angle(g), angle(g))),
                    2 => Mutation::Scale(n, Vector3::new(factor(g), factor(g), factor(g))),
                    3 => Mutation::Reparent(n, usize::arbitrary(g) % count),
                    _ => Mutation::Read(n),
                }
            })
            .collect();
        Self { parents, mutations }
    }
}

/// `parent.global · local`, recomputed from the root without touching global caches.
fn recomputed(scene: &mut Scene, id: NodeId) -> Result<Matrix4<f32>, Error> {
    let local = *scene.local_transform_matrix(id)?.contents();
    match scene.parent(id)? {
        Some(p) => Ok(recomputed(scene, p)? * local),
        None => Ok(local),
    }
}

fn close(a: &Matrix4<f32>, b: &Matrix4<f32>) -> bool {
    (a - b).abs().max() <= 1.0e-3 * (1.0 + a.abs().max())
}

fn run_script(script: &Script) -> Result<bool, Error> {
    let mut scene = Scene::new();
    let ids: Vec<NodeId> = (0..script.parents.len())
        .map(|i| scene.create_node(format!("n{i}"), NodeKind::Plain))
        .collect();
    for (i, parent) in script.parents.iter().enumerate() {
        if let Some(p) = parent {
            scene.add_child(ids[*p], ids[i])?;
        }
    }

    for m in &script.mutations {
        match m {
            Mutation::Move(n, v) => scene.set_location(ids[*n], *v)?,
            Mutation::Rotate(n, r) => scene.rotate_by(ids[*n], *r)?,
            Mutation::Scale(n, s) => scene.set_scale(ids[*n], *s)?,
            Mutation::Reparent(n, p) => match scene.add_child(ids[*p], ids[*n]) {
                Ok(()) | Err(Error::SelfParent(_)) | Err(Error::CyclicParent(..)) => {}
                Err(e) => return Err(e),
            },
            Mutation::Read(n) => {
                scene.global_transform_matrix(ids[*n])?;
            }
        }
    }

    for id in &ids {
        let global = *scene.global_transform_matrix(*id)?.contents();
        if !close(&global, &recomputed(&mut scene, *id)?) {
            return Ok(false);
        }
    }
    Ok(true)
}

#[quickcheck]
fn globals_match_recomputation(script: Script) -> bool {
    run_script(&script).unwrap_or(false)
}

#[quickcheck]
fn repeated_reads_do_not_rebuild(script: Script) -> bool {
    let check = || -> Result<bool, Error> {
        let mut scene = Scene::new();
        let ids: Vec<NodeId> = (0..script.parents.len())
            .map(|i| scene.create_node(format!("n{i}"), NodeKind::Plain))
            .collect();
        for (i, parent) in script.parents.iter().enumerate() {
            if let Some(p) = parent {
                scene.add_child(ids[*p], ids[i])?;
            }
        }
        for (i, id) in ids.iter().enumerate() {
            scene.set_location(*id, Vector3::new(i as f32, 0.0, 1.0))?;
        }
        for id in &ids {
            let first = *scene.global_transform_matrix(*id)?;
            let count = scene.node(*id)?.global_rebuild_count();
            let second = *scene.global_transform_matrix(*id)?;
            if first.contents() != second.contents()
                || scene.node(*id)?.global_rebuild_count() != count
            {
                return Ok(false);
            }
        }
        Ok(true)
    };
    check().unwrap_or(false)
}

#[test]
fn moving_the_root_moves_the_child() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let child = scene.create_node("child", NodeKind::Plain);
    scene.add_child(root, child).unwrap();
    scene.set_location(child, Vector3::new(1.0, 0.0, 0.0)).unwrap();
    assert_eq!(scene.global_location(child).unwrap(), Vector3::new(1.0, 0.0, 0.0));

    scene.set_location(root, Vector3::new(5.0, 0.0, 0.0)).unwrap();
    assert_eq!(scene.global_location(child).unwrap(), Vector3::new(6.0, 0.0, 0.0));
}

#[test]
fn siblings_are_not_rebuilt() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let a = scene.create_node("a", NodeKind::Plain);
    let b = scene.create_node("b", NodeKind::Plain);
    scene.add_child(root, a).unwrap();
    scene.add_child(root, b).unwrap();
    scene.global_transform_matrix(a).unwrap();
    scene.global_transform_matrix(b).unwrap();
    let a_count = scene.node(a).unwrap().global_rebuild_count();
    let b_count = scene.node(b).unwrap().global_rebuild_count();

    scene.translate_by(b, Vector3::new(0.0, 1.0, 0.0)).unwrap();
    scene.global_transform_matrix(a).unwrap();
    scene.global_transform_matrix(b).unwrap();
    assert_eq!(scene.node(a).unwrap().global_rebuild_count(), a_count);
    assert_eq!(scene.node(b).unwrap().global_rebuild_count(), b_count + 1);

    scene.rotate_by(root, Vector3::new(0.0, 90.0, 0.0)).unwrap();
    assert!(scene.node(a).unwrap().is_transform_dirty());
    assert!(scene.node(b).unwrap().is_transform_dirty());
}

#[test]
fn rotation_carries_children_around() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let child = scene.create_node("child", NodeKind::Plain);
    scene.add_child(root, child).unwrap();
    scene.set_location(child, Vector3::new(1.0, 0.0, 0.0)).unwrap();
    scene.rotate_by(root, Vector3::new(0.0, 90.0, 0.0)).unwrap();
    let loc = scene.global_location(child).unwrap();
    assert!((loc - Vector3::new(0.0, 0.0, -1.0)).abs().max() < 1.0e-5);
}

#[test]
fn global_scale_multiplies_down_the_tree() {
    let mut scene = Scene::new();
    let root = scene.create_node("root", NodeKind::Plain);
    let child = scene.create_node("child", NodeKind::Plain);
    scene.add_child(root, child).unwrap();
    scene.set_scale(root, Vector3::new(2.0, 1.0, 1.0)).unwrap();
    scene.set_uniform_scale(child, 3.0).unwrap();
    assert_eq!(scene.global_scale(child).unwrap(), Vector3::new(6.0, 3.0, 3.0));
    assert!(!scene.is_uniformly_scaled_globally(child).unwrap());
    assert!(!scene.is_transform_rigid(child).unwrap());
}

#[test]
fn stale_ids_are_rejected() {
    let mut scene = Scene::new();
    let gone = scene.create_node("gone", NodeKind::Plain);
    scene.destroy(gone).unwrap();
    assert_eq!(
        scene.set_location(gone, Vector3::zeros()),
        Err(Error::InvalidNode(gone))
    );
    assert!(scene.global_transform_matrix(gone).is_err());
}
