//! Local properties, cached matrices and dirty propagation.

use nalgebra::{Quaternion, Vector3};
use tracing::trace;

use crate::{
    error::Error,
    matrix::{Matrix, MatrixKind},
    node::{NodeKind, TransformListener},
    rotator::Rotator,
    NodeId, Scene,
};

/// Keep every component of `scale` at least `min` away from zero, preserving sign.
fn ensure_min_scale(scale: &Vector3<f32>, min: f32) -> Vector3<f32> {
    scale.map(|c| if c.abs() < min { min.copysign(c) } else { c })
}

impl Scene {
    /// Mark the global transform of `id` and of all its descendants as stale, and notify
    /// transform listeners.
    ///
    /// Subtrees which are already stale are not walked again.
    pub fn mark_transform_dirty(&mut self, id: NodeId) -> Result<(), Error> {
        self.node(id)?;
        let mut stack = vec![id];
        let mut listeners = Vec::new();
        while let Some(current) = stack.pop() {
            let node = match self.nodes.get_mut(current) {
                Some(n) => n,
                None => continue,
            };
            if !node.invalidate_transform() {
                continue;
            }
            stack.extend(node.children.iter().rev().copied());
            listeners.extend_from_slice(&node.listeners);
            for listener in listeners.drain(..) {
                self.notify_transformed(current, listener, &mut stack);
            }
        }
        Ok(())
    }

    fn notify_transformed(
        &mut self,
        source: NodeId,
        listener: TransformListener,
        stack: &mut Vec<NodeId>,
    ) {
        match listener {
            TransformListener::Tracker(tracker) => {
                if let Some(t) = self.nodes.get(tracker) {
                    if t.rotator.target() == Some(source) && t.rotator.should_update_to_target() {
                        stack.push(tracker);
                    }
                }
            }
            TransformListener::SkinnedBone(skin) => {
                if let Some(NodeKind::SkinMesh(s)) = self.nodes.get_mut(skin).map(|n| &mut n.kind) {
                    s.mark_bone_dirty(source);
                }
            }
        }
    }

    pub fn location(&self, id: NodeId) -> Result<Vector3<f32>, Error> {
        Ok(self.node(id)?.location)
    }

    pub fn set_location(&mut self, id: NodeId, location: Vector3<f32>) -> Result<(), Error> {
        self.node_mut(id)?.location = location;
        self.mark_transform_dirty(id)
    }

    /// Move by `delta` in the parent's coordinate system.
    pub fn translate_by(&mut self, id: NodeId, delta: Vector3<f32>) -> Result<(), Error> {
        self.node_mut(id)?.location += delta;
        self.mark_transform_dirty(id)
    }

    pub fn scale(&self, id: NodeId) -> Result<Vector3<f32>, Error> {
        Ok(self.node(id)?.scale)
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vector3<f32>) -> Result<(), Error> {
        self.node_mut(id)?.scale = scale;
        self.mark_transform_dirty(id)
    }

    /// See [Node::uniform_scale](crate::Node::uniform_scale).
    pub fn uniform_scale(&self, id: NodeId) -> Result<f32, Error> {
        Ok(self.node(id)?.uniform_scale())
    }

    pub fn set_uniform_scale(&mut self, id: NodeId, scale: f32) -> Result<(), Error> {
        self.set_scale(id, Vector3::repeat(scale))
    }

    /// Whether this node and all its ancestors are uniformly scaled.
    pub fn is_uniformly_scaled_globally(&self, id: NodeId) -> Result<bool, Error> {
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.node(c)?;
            if !node.is_uniformly_scaled_locally() {
                return Ok(false);
            }
            current = node.parent;
        }
        Ok(true)
    }

    /// Run `f` against the rotator of `id` and mark the transform dirty, unless the node's
    /// orientation is wholly determined by a tracked target.
    fn rotate_with(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut Rotator, bool) -> Result<(), Error>,
    ) -> Result<(), Error> {
        let count = self.config.auto_orthonormalize_count;
        let node = self.node_mut(id)?;
        if node.rotator.is_tracking_target_direction() {
            return Ok(());
        }
        let reverse = node.reverses_forward_direction();
        node.rotator
            .upgrade_to_mutable()
            .set_auto_orthonormalize_count(count);
        f(&mut node.rotator, reverse)?;
        self.mark_transform_dirty(id)
    }

    /// Bring a pending target-location rotation into the rotator before it is read directly.
    fn settle_rotator(&mut self, id: NodeId) -> Result<&mut Rotator, Error> {
        if self.node(id)?.rotator.should_rotate_to_target_location() {
            self.local_transform_matrix(id)?;
        }
        Ok(&mut self.node_mut(id)?.rotator)
    }

    /// Euler angles in degrees.
    pub fn rotation(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        self.settle_rotator(id)?.rotation()
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Vector3<f32>) -> Result<(), Error> {
        self.rotate_with(id, |r, _| {
            r.set_rotation(&rotation);
            Ok(())
        })
    }

    pub fn quaternion(&mut self, id: NodeId) -> Result<Quaternion<f32>, Error> {
        self.settle_rotator(id)?.quaternion()
    }

    pub fn set_quaternion(&mut self, id: NodeId, q: Quaternion<f32>) -> Result<(), Error> {
        self.rotate_with(id, |r, _| {
            r.set_quaternion(&q);
            Ok(())
        })
    }

    pub fn rotation_axis(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        self.settle_rotator(id)?.rotation_axis()
    }

    pub fn set_rotation_axis(&mut self, id: NodeId, axis: Vector3<f32>) -> Result<(), Error> {
        self.rotate_with(id, |r, _| r.set_rotation_axis(&axis))
    }

    /// Degrees.
    pub fn rotation_angle(&mut self, id: NodeId) -> Result<f32, Error> {
        self.settle_rotator(id)?.rotation_angle()
    }

    pub fn set_rotation_angle(&mut self, id: NodeId, angle: f32) -> Result<(), Error> {
        self.rotate_with(id, |r, _| r.set_rotation_angle(angle))
    }

    /// Rotate by Euler angles (degrees) relative to the current rotation.
    pub fn rotate_by(&mut self, id: NodeId, rotation: Vector3<f32>) -> Result<(), Error> {
        self.rotate_with(id, |r, _| r.rotate_by(&rotation))
    }

    pub fn rotate_by_quaternion(&mut self, id: NodeId, q: Quaternion<f32>) -> Result<(), Error> {
        self.rotate_with(id, |r, _| r.rotate_by_quaternion(&q))
    }

    /// Rotate by `angle` degrees about `axis`, in the node's own coordinate system.
    pub fn rotate_by_angle(
        &mut self,
        id: NodeId,
        angle: f32,
        axis: Vector3<f32>,
    ) -> Result<(), Error> {
        self.rotate_with(id, |r, _| r.rotate_by_angle(angle, &axis))
    }

    /// Rotate by `angle` degrees about `axis` passing through `pivot` (in the node's own
    /// coordinate system), moving the node so that the pivot stays put.
    pub fn rotate_by_angle_around(
        &mut self,
        id: NodeId,
        angle: f32,
        axis: Vector3<f32>,
        pivot: Vector3<f32>,
    ) -> Result<(), Error> {
        let before = self.local_transform_matrix(id)?.transform_location(&pivot);
        self.rotate_by_angle(id, angle, axis)?;
        let after = self.local_transform_matrix(id)?.transform_location(&pivot);
        self.translate_by(id, before - after)
    }

    /// The direction the node faces, in its parent's coordinate system.
    pub fn forward_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        self.settle_rotator(id)?;
        self.local_forward_direction(id)
    }

    pub(crate) fn local_forward_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let node = self.node_mut(id)?;
        let reverse = node.reverses_forward_direction();
        node.rotator.forward_direction(reverse)
    }

    /// Point the node along `direction`.
    ///
    /// # Errors
    /// * `direction` is zero-length
    pub fn set_forward_direction(
        &mut self,
        id: NodeId,
        direction: Vector3<f32>,
    ) -> Result<(), Error> {
        self.rotate_with(id, |r, reverse| r.set_forward_direction(&direction, reverse))
    }

    pub fn up_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        self.settle_rotator(id)?.up_direction()
    }

    pub fn right_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let reverse = self.node(id)?.reverses_forward_direction();
        self.settle_rotator(id)?.right_direction(reverse)
    }

    /// The direction considered "up" when pointing the node. Defaults to `+Y`.
    pub fn reference_up_direction(&self, id: NodeId) -> Result<Vector3<f32>, Error> {
        Ok(self.node(id)?.rotator.reference_up_direction())
    }

    /// # Errors
    /// * `up` is zero-length
    pub fn set_reference_up_direction(
        &mut self,
        id: NodeId,
        up: Vector3<f32>,
    ) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        let reverse = node.reverses_forward_direction();
        node.rotator
            .upgrade_to_directional(reverse)
            .set_reference_up_direction(&up)?;
        self.mark_transform_dirty(id)
    }

    /// The transform relative to the parent, rebuilt if stale.
    pub fn local_transform_matrix(&mut self, id: NodeId) -> Result<&Matrix, Error> {
        let stale = self.node(id)?.local.map_or(true, |m| m.is_dirty());
        let rebuilt = if stale {
            Some(self.build_local_transform_matrix(id)?)
        } else {
            None
        };
        let node = self.node_mut(id)?;
        if let Some(m) = rebuilt {
            node.local = Some(m);
        }
        Ok(&*node.local.get_or_insert_with(Matrix::identity))
    }

    /// Replace the local transform outright. It stays in effect until the next change to the
    /// node's location, rotation or scale.
    pub fn set_local_transform_matrix(&mut self, id: NodeId, matrix: Matrix) -> Result<(), Error> {
        self.mark_transform_dirty(id)?;
        let mut m = matrix;
        m.set_is_dirty(false);
        self.node_mut(id)?.local = Some(m);
        Ok(())
    }

    fn build_local_transform_matrix(&mut self, id: NodeId) -> Result<Matrix, Error> {
        let (location, scale, is_camera) = {
            let node = self.node(id)?;
            (node.location, node.scale, node.kind.is_camera())
        };
        let mut m = Matrix::identity();
        m.translate_by(&location);
        self.apply_rotation_to(id, &mut m)?;
        if !is_camera {
            m.scale_by(&ensure_min_scale(&scale, self.config.min_scale));
        }
        m.set_is_dirty(false);
        Ok(m)
    }

    /// The transform relative to the scene root, rebuilt if stale.
    pub fn global_transform_matrix(&mut self, id: NodeId) -> Result<&Matrix, Error> {
        if self.node(id)?.global.is_dirty() {
            self.build_global_transform_matrix(id)?;
        }
        Ok(&self.node(id)?.global)
    }

    fn build_global_transform_matrix(&mut self, id: NodeId) -> Result<(), Error> {
        let parent_global = match self.node(id)?.parent {
            Some(p) => Some(*self.global_transform_matrix(p)?),
            None => None,
        };
        let local = *self.local_transform_matrix(id)?;
        let node = self.node_mut(id)?;
        match parent_global {
            Some(pg) => node.global.populate_from(&pg),
            None => node.global.populate_identity(),
        }
        node.global.multiply_by(&local);
        node.global.set_is_dirty(false);
        node.global_rebuilds += 1;
        trace!(node = %id, rebuilds = node.global_rebuilds, "rebuilt global transform");
        Ok(())
    }

    /// The inverse of [Scene::global_transform_matrix], rebuilt if stale.
    pub fn global_transform_matrix_inverted(&mut self, id: NodeId) -> Result<&Matrix, Error> {
        let stale = self.node(id)?.global_inverted.map_or(true, |m| m.is_dirty())
            || self.node(id)?.global.is_dirty();
        let rebuilt = if stale {
            let mut inv = *self.global_transform_matrix(id)?;
            inv.invert();
            inv.set_is_dirty(false);
            Some(inv)
        } else {
            None
        };
        let node = self.node_mut(id)?;
        if let Some(m) = rebuilt {
            node.global_inverted = Some(m);
        }
        Ok(&*node.global_inverted.get_or_insert_with(Matrix::identity))
    }

    /// The rotational part of [Scene::global_transform_matrix], without translation or scale.
    pub fn global_rotation_matrix(&mut self, id: NodeId) -> Result<&Matrix, Error> {
        let stale = self.node(id)?.global_rotation.map_or(true, |m| m.is_dirty())
            || self.node(id)?.global.is_dirty();
        let rebuilt = if stale {
            self.global_transform_matrix(id)?;
            let parent_rotation = match self.node(id)?.parent {
                Some(p) => Some(*self.global_rotation_matrix(p)?),
                None => None,
            };
            let own = self.node_mut(id)?.rotator.rotation_matrix()?;
            let mut m = Matrix::linear();
            if let Some(pr) = parent_rotation {
                m.populate_from(&pr);
            }
            m.multiply_by(&own);
            m.set_is_dirty(false);
            Some(m)
        } else {
            None
        };
        let node = self.node_mut(id)?;
        if let Some(m) = rebuilt {
            node.global_rotation = Some(m);
        }
        Ok(&*node.global_rotation.get_or_insert_with(|| Matrix::new(MatrixKind::Linear)))
    }

    /// Whether the global transform is free of scale and shear.
    pub fn is_transform_rigid(&mut self, id: NodeId) -> Result<bool, Error> {
        Ok(self.global_transform_matrix(id)?.is_rigid())
    }

    /// Location in the scene root's coordinate system.
    pub fn global_location(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let (parent, location) = {
            let node = self.node(id)?;
            (node.parent, node.location)
        };
        match parent {
            Some(p) => Ok(self.global_transform_matrix(p)?.transform_location(&location)),
            None => Ok(location),
        }
    }

    /// Euler angles (degrees) of [Scene::global_rotation_matrix].
    pub fn global_rotation(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        Ok(self.global_rotation_matrix(id)?.extract_rotation())
    }

    pub fn global_quaternion(&mut self, id: NodeId) -> Result<Quaternion<f32>, Error> {
        Ok(self.global_rotation_matrix(id)?.extract_quaternion())
    }

    /// Component-wise product of the scales of this node and its ancestors. A camera's own
    /// scale is not included.
    pub fn global_scale(&self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let node = self.node(id)?;
        let own = if node.kind.is_camera() {
            Vector3::repeat(1.0)
        } else {
            node.scale
        };
        match node.parent {
            Some(p) => Ok(self.global_scale(p)?.component_mul(&own)),
            None => Ok(own),
        }
    }

    fn reverses_globally(&self, id: NodeId) -> Result<bool, Error> {
        let node = self.node(id)?;
        Ok(node
            .rotator
            .directional()
            .map(|d| d.should_reverse_forward_direction())
            .unwrap_or_else(|| node.reverses_forward_direction()))
    }

    pub fn global_forward_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let reverse = self.reverses_globally(id)?;
        let fwd = self.global_rotation_matrix(id)?.extract_forward_direction();
        Ok(if reverse { -fwd } else { fwd })
    }

    pub fn global_up_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        Ok(self.global_rotation_matrix(id)?.extract_up_direction())
    }

    pub fn global_right_direction(&mut self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let reverse = self.reverses_globally(id)?;
        let right = self.global_rotation_matrix(id)?.extract_right_direction();
        Ok(if reverse { -right } else { right })
    }
}
