//! Facing other nodes and locations.

use nalgebra::Vector3;
use tracing::debug;

use crate::{
    error::Error,
    matrix::Matrix,
    node::TransformListener,
    rotator::{TargettingConstraint, TargettingRotation},
    NodeId, Scene,
};

impl Scene {
    fn targetting_mut(&mut self, id: NodeId) -> Result<&mut TargettingRotation, Error> {
        let node = self.node_mut(id)?;
        let reverse = node.reverses_forward_direction();
        Ok(node.rotator.upgrade_to_targetting(reverse))
    }

    /// The node `id` is facing, if any.
    pub fn target(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        Ok(self.node(id)?.rotator.target())
    }

    pub fn has_target(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.target(id)?.is_some())
    }

    /// Face `target` (or stop facing anything). The rotation is updated from the target's
    /// location on the next transform rebuild, and on every later one while tracking.
    pub fn set_target(&mut self, id: NodeId, target: Option<NodeId>) -> Result<(), Error> {
        if let Some(t) = target {
            self.node(t)?;
        }
        let old = self.node(id)?.rotator.target();
        if old == target {
            return Ok(());
        }
        if let Some(o) = old {
            if let Some(n) = self.nodes.get_mut(o) {
                n.remove_listener(TransformListener::Tracker(id));
            }
        }
        self.targetting_mut(id)?.set_target(target);
        if let Some(t) = target {
            self.node_mut(t)?.add_listener(TransformListener::Tracker(id));
        }
        debug!(node = %id, target = ?target, "set rotation target");
        self.mark_transform_dirty(id)
    }

    /// The location being faced: the cached target location, or else a point one unit ahead
    /// of the node's global location.
    pub fn target_location(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        if self.node(id)?.rotator.should_rotate_to_target_location() {
            self.local_transform_matrix(id)?;
        }
        self.current_target_location(id)
    }

    fn current_target_location(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        if let Some(loc) = self.node(id)?.rotator.target_location() {
            return Ok(loc);
        }
        let fwd = self.local_forward_direction(id)?;
        Ok(self.global_location(id)? + fwd)
    }

    /// Face a fixed global location.
    pub fn set_target_location(&mut self, id: NodeId, location: Vector3<f32>) -> Result<(), Error> {
        self.targetting_mut(id)?.set_target_location(&location);
        self.mark_transform_dirty(id)
    }

    pub fn should_track_target(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.node(id)?.rotator.should_track_target())
    }

    /// Keep facing the target as either node moves.
    pub fn set_should_track_target(&mut self, id: NodeId, track: bool) -> Result<(), Error> {
        let was = self.should_track_target(id)?;
        self.targetting_mut(id)?.set_should_track_target(track);
        if track && !was {
            self.mark_transform_dirty(id)?;
        }
        Ok(())
    }

    pub fn should_autotarget_camera(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.node(id)?.rotator.should_autotarget_camera())
    }

    /// Target and track the scene's active camera once one is available.
    pub fn set_should_autotarget_camera(&mut self, id: NodeId, autotarget: bool) -> Result<(), Error> {
        self.targetting_mut(id)?.set_should_autotarget_camera(autotarget);
        self.set_should_track_target(id, autotarget)
    }

    pub fn target_constraint(&self, id: NodeId) -> Result<TargettingConstraint, Error> {
        Ok(self.node(id)?.rotator.target_constraint())
    }

    pub fn set_target_constraint(
        &mut self,
        id: NodeId,
        constraint: TargettingConstraint,
    ) -> Result<(), Error> {
        self.targetting_mut(id)?.set_target_constraint(constraint);
        self.mark_transform_dirty(id)
    }

    pub fn is_tracking_for_bump_mapping(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.node(id)?.rotator.is_tracking_for_bump_mapping())
    }

    /// While set, the target is tracked for lighting purposes only and never rotates the node.
    pub fn set_is_tracking_for_bump_mapping(&mut self, id: NodeId, bump: bool) -> Result<(), Error> {
        self.targetting_mut(id)?.set_is_tracking_for_bump_mapping(bump);
        self.mark_transform_dirty(id)
    }

    /// Whether direct rotation of `id` is ignored because it is tracking a target.
    pub fn is_tracking_target_direction(&self, id: NodeId) -> Result<bool, Error> {
        Ok(self.node(id)?.rotator.is_tracking_target_direction())
    }

    /// Start facing the active camera if this node is waiting to do so.
    pub fn check_camera_target(&mut self, id: NodeId) -> Result<(), Error> {
        if !self.should_autotarget_camera(id)? {
            return Ok(());
        }
        if let Some(cam) = self.active_camera {
            if self.target(id)? != Some(cam) {
                self.set_target(id, Some(cam))?;
                self.targetting_mut(id)?.set_should_autotarget_camera(false);
            }
        }
        Ok(())
    }

    /// Rotate `matrix` by the node's rotation, first re-aiming at its target if needed.
    pub(crate) fn apply_rotation_to(&mut self, id: NodeId, matrix: &mut Matrix) -> Result<(), Error> {
        self.update_target_location(id)?;
        if self.node(id)?.rotator.should_rotate_to_target_location() {
            self.apply_target_location(id)?;
        }
        self.node_mut(id)?.rotator.apply_rotation_to(matrix)
    }

    /// Refresh the cached target location from the live target node. Does not mark the
    /// transform dirty; this runs during a rebuild.
    fn update_target_location(&mut self, id: NodeId) -> Result<(), Error> {
        let target = {
            let r = &self.node(id)?.rotator;
            match r.target() {
                Some(t) if r.should_update_to_target() && !r.is_tracking_for_bump_mapping() => t,
                _ => return Ok(()),
            }
        };
        // a target within this node's own subtree is placed relative to the transform being
        // rebuilt, so it keeps its last known location
        if !self.nodes.contains(target) || target == id || self.is_descendant_of(target, id)? {
            return Ok(());
        }
        let location = self.global_location(target)?;
        self.targetting_mut(id)?.set_target_location(&location);
        Ok(())
    }

    fn apply_target_location(&mut self, id: NodeId) -> Result<(), Error> {
        let (constraint, up, parent, location) = {
            let node = self.node(id)?;
            (
                node.rotator.target_constraint(),
                node.rotator.reference_up_direction(),
                node.parent,
                node.location,
            )
        };
        let target = self.current_target_location(id)?;
        if constraint.is_global() {
            let eye = self.global_location(id)?;
            let target = constraint.restrict(&target, &eye);
            if target == eye {
                return Ok(());
            }
            let turned = self
                .targetting_mut(id)?
                .directional_mut()
                .rotate_to_target_location(&target, &eye, &up);
            if let (true, Some(p)) = (turned, parent) {
                // bring the global orientation back into the parent's frame
                let mut to_local = *self.global_rotation_matrix(p)?;
                to_local.invert();
                if let Some(m) = self.node_mut(id)?.rotator.mutable_mut() {
                    m.left_multiply_matrix_by(&to_local);
                }
            }
        } else {
            let target = match parent {
                Some(p) => self
                    .global_transform_matrix_inverted(p)?
                    .transform_location(&target),
                None => target,
            };
            let target = constraint.restrict(&target, &location);
            self.targetting_mut(id)?
                .directional_mut()
                .rotate_to_target_location(&target, &location, &up);
        }
        Ok(())
    }
}
