//! Keyframe animation of node location, rotation and scale.
//!
//! A [NodeAnimation] is a shared, read-only pose source. Each node holds one
//! [NodeAnimationState] per track, which keeps its own playback time, blending weight and
//! cached [Pose].

mod array;
mod frozen;
mod segment;
mod state;

pub use array::*;
pub use frozen::*;
pub use segment::*;
pub use state::*;

use std::fmt::Debug;

use nalgebra::{Quaternion, Vector3};

use crate::error::Error;

/// Identifies an animation track on a node. Track 0 is the default track.
pub type TrackId = u32;

/// The track used when none is specified.
pub const DEFAULT_TRACK: TrackId = 0;

/// Fraction of a frame within which interpolation snaps to the nearer frame.
pub const DEFAULT_INTERPOLATION_EPSILON: f32 = 0.1;

/// Cosine of the angle between quaternions above which [slerp] blends linearly.
const SLERP_LINEAR_EPSILON: f32 = 0.01;

/// Hands out fresh track ids, starting at 1.
#[derive(Debug, Default, Clone)]
pub struct TrackAllocator {
    last: TrackId,
}

impl TrackAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an id never before returned by this allocator (since the last reset).
    pub fn next(&mut self) -> TrackId {
        self.last += 1;
        self.last
    }

    pub fn reset(&mut self) {
        self.last = DEFAULT_TRACK;
    }
}

/// A node's location, rotation and scale at an instant.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Pose {
    pub location: Vector3<f32>,
    pub quaternion: Quaternion<f32>,
    pub scale: Vector3<f32>,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            location: Vector3::zeros(),
            quaternion: Quaternion::identity(),
            scale: Vector3::repeat(1.0),
        }
    }
}

/// Which pose components a consumer wants animated.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Channels {
    pub location: bool,
    pub quaternion: bool,
    pub scale: bool,
}

impl Channels {
    pub const ALL: Self = Self {
        location: true,
        quaternion: true,
        scale: true,
    };
    pub const NONE: Self = Self {
        location: false,
        quaternion: false,
        scale: false,
    };

    #[inline]
    pub fn any(&self) -> bool {
        self.location || self.quaternion || self.scale
    }
}

/// Spherical linear interpolation between two quaternions, taking the short path.
///
/// Nearly-parallel inputs are blended linearly. The result is normalized.
pub fn slerp(a: &Quaternion<f32>, b: &Quaternion<f32>, blend: f32) -> Quaternion<f32> {
    if blend == 0.0 {
        return *a;
    }
    if blend == 1.0 {
        return *b;
    }
    let lengths = a.norm() * b.norm();
    let mut cos_theta = if lengths > 0.0 {
        a.coords.dot(&b.coords) / lengths
    } else {
        1.0
    };
    // q and -q are the same rotation; go the short way around
    let b = if cos_theta < 0.0 {
        cos_theta = -cos_theta;
        -*b
    } else {
        *b
    };
    let (wa, wb) = if 1.0 - cos_theta < SLERP_LINEAR_EPSILON {
        (1.0 - blend, blend)
    } else {
        let theta = cos_theta.min(1.0).acos();
        let inv_sin = 1.0 / theta.sin();
        (
            (theta * (1.0 - blend)).sin() * inv_sin,
            (theta * blend).sin() * inv_sin,
        )
    };
    let res = *a * wa + b * wb;
    match res.norm() {
        n if n > 0.0 => res / n,
        _ => res,
    }
}

/// A source of keyframed poses.
///
/// Frame indices beyond the last frame resolve to the last frame. Times are normalized to
/// `[0, 1]` over the whole animation.
pub trait NodeAnimation: Debug + Send + Sync {
    fn frame_count(&self) -> usize;

    fn should_interpolate(&self) -> bool {
        true
    }

    /// See [DEFAULT_INTERPOLATION_EPSILON].
    fn interpolation_epsilon(&self) -> f32 {
        DEFAULT_INTERPOLATION_EPSILON
    }

    fn is_animating_location(&self) -> bool {
        false
    }

    fn is_animating_quaternion(&self) -> bool {
        false
    }

    fn is_animating_scale(&self) -> bool {
        false
    }

    fn is_animating(&self) -> bool {
        self.is_animating_location() || self.is_animating_quaternion() || self.is_animating_scale()
    }

    fn has_variable_frame_timing(&self) -> bool {
        false
    }

    /// Whether this is a single-frame snapshot of a node's own pose.
    fn is_frozen(&self) -> bool {
        false
    }

    /// The normalized time at which a frame occurs.
    fn time_at_frame(&self, frame: usize) -> f32 {
        let last = self.frame_count().saturating_sub(1).max(1) as f32;
        (frame as f32 / last).clamp(0.0, 1.0)
    }

    /// The index of the frame within which `t` falls.
    fn frame_index_at(&self, t: f32) -> usize {
        (self.frame_count().saturating_sub(1) as f32 * t) as usize
    }

    fn location_at_frame(&self, _frame: usize) -> Vector3<f32> {
        Vector3::zeros()
    }

    fn quaternion_at_frame(&self, _frame: usize) -> Quaternion<f32> {
        Quaternion::identity()
    }

    fn scale_at_frame(&self, _frame: usize) -> Vector3<f32> {
        Vector3::repeat(1.0)
    }

    /// Write the pose at time `t` into the requested channels of `pose`, interpolating
    /// between the surrounding frames.
    ///
    /// # Errors
    /// * `t` ∉ [0, 1]
    /// * the animation has no frames
    fn establish_frame_at(&self, t: f32, channels: Channels, pose: &mut Pose) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::AnimationTimeOutOfRange(t));
        }
        let count = self.frame_count();
        if count == 0 {
            return Err(Error::EmptyAnimation);
        }
        let mut frame = self.frame_index_at(t).min(count - 1);
        let mut frac = 0.0;
        if self.should_interpolate() && frame < count - 1 {
            let frame_time = self.time_at_frame(frame);
            let duration = self.time_at_frame(frame + 1) - frame_time;
            if duration != 0.0 {
                frac = (t - frame_time) / duration;
            }
            let epsilon = self.interpolation_epsilon();
            if frac < epsilon {
                frac = 0.0;
            } else if 1.0 - frac < epsilon {
                frac = 0.0;
                frame += 1;
            }
        }
        if channels.location {
            pose.location = self
                .location_at_frame(frame)
                .lerp(&self.location_at_frame(frame + 1), frac);
        }
        if channels.quaternion {
            pose.quaternion = slerp(
                &self.quaternion_at_frame(frame),
                &self.quaternion_at_frame(frame + 1),
                frac,
            );
        }
        if channels.scale {
            pose.scale = self
                .scale_at_frame(frame)
                .lerp(&self.scale_at_frame(frame + 1), frac);
        }
        Ok(())
    }
}
