use std::sync::Arc;

use armature::{
    animation::ArrayNodeAnimation, matrix::quaternion_from_axis_angle, Error, NodeAnimation,
    NodeId, NodeKind, Scene, SkinSection, VertexSkin, DEFAULT_TRACK,
};
use clap::Parser;
use nalgebra::{Quaternion, Vector3, Vector4};

mod cli;

/// Two-bone arm with a four-vertex skin.
struct Arm {
    body: NodeId,
    upper: NodeId,
    fore: NodeId,
    skin: NodeId,
}

fn about_z(deg: f32) -> Quaternion<f32> {
    quaternion_from_axis_angle(&Vector4::new(0.0, 0.0, 1.0, deg))
}

fn build_arm(scene: &mut Scene) -> Result<Arm, Error> {
    let body = scene.create_node("body", NodeKind::SoftBody);
    let upper = scene.create_node("upper", NodeKind::bone());
    let fore = scene.create_node("fore", NodeKind::bone());
    scene.add_child(body, upper)?;
    scene.add_child(upper, fore)?;
    scene.set_location(fore, Vector3::new(2.0, 0.0, 0.0))?;

    let mesh = VertexSkin::new(2)
        .with_vertex(Vector3::new(0.5, 0.0, 0.0), &[(0, 1.0)])
        .with_vertex(Vector3::new(1.5, 0.0, 0.0), &[(0, 1.0)])
        .with_vertex(Vector3::new(2.0, 0.0, 0.0), &[(0, 0.5), (1, 0.5)])
        .with_vertex(Vector3::new(3.5, 0.0, 0.0), &[(1, 1.0)]);
    let skin = scene.create_node("skin", NodeKind::skin_mesh(Arc::new(mesh)));
    scene.add_child(body, skin)?;
    let section = scene.add_skin_section(skin, SkinSection::new(0, 4))?;
    scene.add_bone_to_section(skin, section, upper)?;
    scene.add_bone_to_section(skin, section, fore)?;

    scene.bind_rest_pose(body)?;
    Ok(Arm {
        body,
        upper,
        fore,
        skin,
    })
}

fn run(cli: &cli::Cli) -> Result<(), Error> {
    let mut scene = Scene::new();
    let arm = build_arm(&mut scene)?;
    scene.set_location(arm.body, cli.origin.0)?;

    let swing: Arc<dyn NodeAnimation> = Arc::new(
        ArrayNodeAnimation::new(3).with_quaternions(vec![about_z(0.0), about_z(45.0), about_z(90.0)]),
    );
    let lean: Arc<dyn NodeAnimation> = Arc::new(
        ArrayNodeAnimation::new(2).with_quaternions(vec![about_z(0.0), about_z(-30.0)]),
    );
    scene.add_animation(arm.fore, swing, DEFAULT_TRACK)?;
    let lean_track = scene.generate_track_id();
    scene.add_animation(arm.upper, lean, lean_track)?;
    // nodes a track does not animate hold their current pose on it
    scene.freeze_all_inanimates_on_track(arm.body, DEFAULT_TRACK)?;
    scene.freeze_all_inanimates_on_track(arm.body, lean_track)?;
    scene.set_animation_blending_weight(arm.body, cli.blend, lean_track)?;

    let count = cli.frames.max(1);
    for i in 0..count {
        let t = if count > 1 {
            i as f32 / (count - 1) as f32
        } else {
            0.0
        };
        scene.establish_animation_frame_at(arm.body, t, DEFAULT_TRACK)?;
        scene.establish_animation_frame_at(arm.body, t, lean_track)?;
        scene.update(arm.body)?;

        println!("t = {t:.3}");
        for v in 0..4 {
            let loc = scene.deformed_vertex_location_at(arm.skin, v)?;
            println!("\tv{v}: ({:.3}, {:.3}, {:.3})", loc.x, loc.y, loc.z);
        }
        let tip = scene.global_location(arm.fore)?;
        tracing::info!(t, tip = ?tip.as_slice(), "forearm");
    }

    println!(
        "{}",
        scene.describe_animation_state_for_frames(arm.fore, count, 0.0, 1.0, DEFAULT_TRACK)?
    );
    Ok(())
}

pub fn main() {
    let cli = cli::Cli::parse();
    cli.log.install();
    if let Err(e) = run(&cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
