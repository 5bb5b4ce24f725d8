use nalgebra::{Quaternion, Vector3};

use super::{NodeAnimation, Pose};

/// A single-frame animation holding a snapshot of a node's own pose.
///
/// Used to give a node a track that holds it still, so that it contributes its current pose
/// to a blend instead of dropping out. Channels left as `None` are not animated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrozenNodeAnimation {
    pub location: Option<Vector3<f32>>,
    pub quaternion: Option<Quaternion<f32>>,
    pub scale: Option<Vector3<f32>>,
}

impl FrozenNodeAnimation {
    pub fn new(
        location: Option<Vector3<f32>>,
        quaternion: Option<Quaternion<f32>>,
        scale: Option<Vector3<f32>>,
    ) -> Self {
        Self {
            location,
            quaternion,
            scale,
        }
    }

    /// Freeze every channel of `pose`.
    pub fn from_pose(pose: &Pose) -> Self {
        Self::new(Some(pose.location), Some(pose.quaternion), Some(pose.scale))
    }
}

impl NodeAnimation for FrozenNodeAnimation {
    fn frame_count(&self) -> usize {
        1
    }

    fn should_interpolate(&self) -> bool {
        false
    }

    fn is_animating_location(&self) -> bool {
        self.location.is_some()
    }

    fn is_animating_quaternion(&self) -> bool {
        self.quaternion.is_some()
    }

    fn is_animating_scale(&self) -> bool {
        self.scale.is_some()
    }

    fn is_frozen(&self) -> bool {
        true
    }

    fn time_at_frame(&self, _frame: usize) -> f32 {
        0.0
    }

    fn frame_index_at(&self, _t: f32) -> usize {
        0
    }

    fn location_at_frame(&self, _frame: usize) -> Vector3<f32> {
        self.location.unwrap_or_else(Vector3::zeros)
    }

    fn quaternion_at_frame(&self, _frame: usize) -> Quaternion<f32> {
        self.quaternion.unwrap_or_else(Quaternion::identity)
    }

    fn scale_at_frame(&self, _frame: usize) -> Vector3<f32> {
        self.scale.unwrap_or_else(|| Vector3::repeat(1.0))
    }
}
