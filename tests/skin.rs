use std::sync::Arc;

use armature::{Error, NodeId, NodeKind, Scene, SkinSection, VertexSkin};
use nalgebra::Vector3;
use quickcheck::{Arbitrary, Gen};
use quickcheck_macros::quickcheck;

fn close(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
    (a - b).abs().max() <= 1.0e-3 * (1.0 + b.abs().max())
}

#[derive(Debug, Clone)]
struct Placement {
    location: Vector3<f32>,
    rotation: Vector3<f32>,
    scale: f32,
}

impl Arbitrary for Placement {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut coord = || (i16::arbitrary(g) % 64) as f32 / 8.0;
        let location = Vector3::new(coord(), coord(), coord());
        let mut degrees = || (i16::arbitrary(g) % 180) as f32;
        let rotation = Vector3::new(degrees(), degrees(), degrees());
        Self {
            location,
            rotation,
            scale: *g.choose(&[0.5f32, 1.0, 2.0]).unwrap_or(&1.0),
        }
    }
}

/// A soft body with a randomly posed tree of bones and a skin whose vertices are shared
/// between pairs of those bones.
#[derive(Debug, Clone)]
struct Rig {
    body: Placement,
    skin: Placement,
    /// Each bone's parent: `None` for the soft body, otherwise an earlier bone.
    bones: Vec<(Option<usize>, Placement)>,
    /// Rest location, and two influences as `(bone, weight)` with weights summing to 1.
    vertices: Vec<(Vector3<f32>, [(u32, f32); 2])>,
}

impl Arbitrary for Rig {
    fn arbitrary(g: &mut Gen) -> Self {
        let bone_count = 1 + usize::arbitrary(g) % 4;
        let bones = (0..bone_count)
            .map(|i| {
                let parent = match i {
                    0 => None,
                    _ if bool::arbitrary(g) => Some(usize::arbitrary(g) % i),
                    _ => None,
                };
                (parent, Placement::arbitrary(g))
            })
            .collect();
        let vertex_count = 1 + usize::arbitrary(g) % 6;
        let vertices = (0..vertex_count)
            .map(|_| {
                let rest = Placement::arbitrary(g).location;
                let w = *g.choose(&[0.25f32, 0.5, 0.75, 1.0]).unwrap_or(&1.0);
                let a = (usize::arbitrary(g) % bone_count) as u32;
                let b = (usize::arbitrary(g) % bone_count) as u32;
                (rest, [(a, w), (b, 1.0 - w)])
            })
            .collect();
        Self {
            body: Placement::arbitrary(g),
            skin: Placement::arbitrary(g),
            bones,
            vertices,
        }
    }
}

fn place(scene: &mut Scene, id: NodeId, p: &Placement) -> Result<(), Error> {
    scene.set_location(id, p.location)?;
    scene.set_rotation(id, p.rotation)?;
    scene.set_uniform_scale(id, p.scale)
}

fn build(scene: &mut Scene, rig: &Rig) -> Result<NodeId, Error> {
    let body = scene.create_node("body", NodeKind::SoftBody);
    place(scene, body, &rig.body)?;

    let mut bones = Vec::with_capacity(rig.bones.len());
    for (i, (parent, placement)) in rig.bones.iter().enumerate() {
        let bone = scene.create_node(format!("bone{i}"), NodeKind::bone());
        place(scene, bone, placement)?;
        let parent = parent.map(|p| bones[p]).unwrap_or(body);
        scene.add_child(parent, bone)?;
        bones.push(bone);
    }

    let mut mesh = VertexSkin::new(2);
    for (rest, influences) in &rig.vertices {
        mesh.push_vertex(*rest, influences);
    }
    let skin = scene.create_node("skin", NodeKind::skin_mesh(Arc::new(mesh)));
    place(scene, skin, &rig.skin)?;
    scene.add_child(body, skin)?;
    let section = bones
        .iter()
        .fold(SkinSection::new(0, rig.vertices.len()), |s, b| s.with_bone(*b));
    scene.add_skin_section(skin, section)?;
    scene.bind_rest_pose(body)?;
    Ok(skin)
}

#[quickcheck]
fn rest_pose_leaves_vertices_in_place(rig: Rig) -> bool {
    let check = || -> Result<bool, Error> {
        let mut scene = Scene::new();
        let skin = build(&mut scene, &rig)?;
        for (v, (rest, _)) in rig.vertices.iter().enumerate() {
            if !close(&scene.deformed_vertex_location_at(skin, v)?, rest) {
                return Ok(false);
            }
        }
        Ok(true)
    };
    check().unwrap_or(false)
}

struct Arm {
    body: NodeId,
    upper: NodeId,
    fore: NodeId,
    skin: NodeId,
}

/// Two bones in a line along X, with one vertex on each and one shared between them.
fn arm(scene: &mut Scene) -> Arm {
    let body = scene.create_node("body", NodeKind::SoftBody);
    let upper = scene.create_node("upper", NodeKind::bone());
    let fore = scene.create_node("fore", NodeKind::bone());
    scene.add_child(body, upper).unwrap();
    scene.add_child(upper, fore).unwrap();
    scene.set_location(fore, Vector3::new(2.0, 0.0, 0.0)).unwrap();

    let mesh = VertexSkin::new(2)
        .with_vertex(Vector3::new(1.0, 0.0, 0.0), &[(0, 1.0)])
        .with_vertex(Vector3::new(2.0, 0.0, 0.0), &[(0, 0.5), (1, 0.5)])
        .with_vertex(Vector3::new(3.0, 0.0, 0.0), &[(1, 1.0)]);
    let skin = scene.create_node("skin", NodeKind::skin_mesh(Arc::new(mesh)));
    scene.add_child(body, skin).unwrap();
    let section = scene.add_skin_section(skin, SkinSection::new(0, 3)).unwrap();
    scene.add_bone_to_section(skin, section, upper).unwrap();
    scene.add_bone_to_section(skin, section, fore).unwrap();
    scene.bind_rest_pose(body).unwrap();
    Arm {
        body,
        upper,
        fore,
        skin,
    }
}

#[test]
fn bones_drag_their_vertices() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 2).unwrap(),
        &Vector3::new(3.0, 0.0, 0.0)
    ));

    scene.translate_by(arm.fore, Vector3::new(0.0, 2.0, 0.0)).unwrap();
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 0).unwrap(),
        &Vector3::new(1.0, 0.0, 0.0)
    ));
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 1).unwrap(),
        &Vector3::new(2.0, 1.0, 0.0)
    ));
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 2).unwrap(),
        &Vector3::new(3.0, 2.0, 0.0)
    ));
}

#[test]
fn bending_at_the_shoulder_swings_the_whole_arm() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    scene.rotate_by_angle(arm.upper, 90.0, Vector3::z()).unwrap();
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 2).unwrap(),
        &Vector3::new(0.0, 3.0, 0.0)
    ));
}

#[test]
fn moving_the_soft_body_does_not_deform() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    scene.deformed_vertex_location_at(arm.skin, 2).unwrap();
    scene.set_location(arm.body, Vector3::new(5.0, -3.0, 1.0)).unwrap();
    scene.rotate_by(arm.body, Vector3::new(0.0, 30.0, 0.0)).unwrap();
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 2).unwrap(),
        &Vector3::new(3.0, 0.0, 0.0)
    ));
}

#[test]
fn rebinding_accepts_the_current_pose() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    scene.translate_by(arm.upper, Vector3::new(0.0, 0.0, 4.0)).unwrap();
    scene.bind_rest_pose(arm.body).unwrap();
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 1).unwrap(),
        &Vector3::new(2.0, 0.0, 0.0)
    ));
}

#[test]
fn copies_are_bound_to_their_own_bones() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    let copy = scene.copy_node_named(arm.body, "body copy").unwrap();
    let copy_skin = scene.node_named(copy, "skin").unwrap().unwrap();
    let copy_fore = scene.node_named(copy, "fore").unwrap().unwrap();
    assert_ne!(copy_fore, arm.fore);
    let bound: Vec<NodeId> = scene.skin_section(copy_skin, 0).unwrap().bones().collect();
    assert!(!bound.contains(&arm.upper));
    assert!(bound.contains(&copy_fore));

    scene.translate_by(arm.fore, Vector3::new(0.0, 2.0, 0.0)).unwrap();
    assert!(close(
        &scene.deformed_vertex_location_at(copy_skin, 2).unwrap(),
        &Vector3::new(3.0, 0.0, 0.0)
    ));
    scene.translate_by(copy_fore, Vector3::new(0.0, -1.0, 0.0)).unwrap();
    assert!(close(
        &scene.deformed_vertex_location_at(copy_skin, 2).unwrap(),
        &Vector3::new(3.0, -1.0, 0.0)
    ));
    assert!(close(
        &scene.deformed_vertex_location_at(arm.skin, 2).unwrap(),
        &Vector3::new(3.0, 2.0, 0.0)
    ));
}

#[test]
fn rigid_skeletons_drop_bone_scale() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    scene.set_uniform_scale(arm.fore, 2.0).unwrap();
    assert!(!scene.section_has_rigid_skeleton(arm.skin, 0).unwrap());
    scene.ensure_rigid_skeleton(arm.body).unwrap();
    assert_eq!(scene.scale(arm.fore).unwrap(), Vector3::repeat(1.0));
    assert!(scene.section_has_rigid_skeleton(arm.skin, 0).unwrap());
    assert!(scene
        .node(arm.skin)
        .unwrap()
        .skin_mesh_data()
        .unwrap()
        .has_rigid_skeleton());
}

#[test]
fn misuse_is_reported() {
    let mut scene = Scene::new();
    let arm = arm(&mut scene);
    let stray = scene.create_node("stray", NodeKind::bone());
    assert_eq!(
        scene.bone_skeletal_transform_matrix(stray),
        Err(Error::NoSoftBody(stray))
    );
    assert_eq!(
        scene.add_bone_to_section(arm.skin, 0, arm.body),
        Err(Error::NotABone(arm.body))
    );
    assert_eq!(
        scene.add_bone_to_section(arm.skin, 3, arm.fore),
        Err(Error::SkinSectionOutOfRange { index: 3, count: 1 })
    );
    assert_eq!(
        scene.deformed_vertex_location_at(arm.skin, 7),
        Err(Error::VertexOutOfRange(7))
    );
    assert_eq!(
        scene.transform_matrix_for_bone_at(arm.skin, 0, 2),
        Err(Error::BoneIndexOutOfRange { index: 2, count: 2 })
    );
    assert_eq!(scene.soft_body_node(arm.fore), Ok(arm.body));
}
