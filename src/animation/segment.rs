use std::sync::Arc;

use nalgebra::{Quaternion, Vector3};

use super::{Channels, NodeAnimation, Pose};
use crate::error::Error;

/// A time window onto another [NodeAnimation], played back as if it were a whole animation.
///
/// Normalized time `t` within the segment maps to `start + (end - start) * t` within the base
/// animation. Frame data is shared with the base, never copied.
#[derive(Debug, Clone)]
pub struct NodeAnimationSegment {
    base: Arc<dyn NodeAnimation>,
    start_time: f32,
    end_time: f32,
}

impl NodeAnimationSegment {
    /// A segment spanning the whole of `base`.
    pub fn new(base: Arc<dyn NodeAnimation>) -> Self {
        Self::from_times(base, 0.0, 1.0)
    }

    /// A segment between two normalized times of `base`. Times are clamped to `[0, 1]`.
    pub fn from_times(base: Arc<dyn NodeAnimation>, start_time: f32, end_time: f32) -> Self {
        Self {
            base,
            start_time: start_time.clamp(0.0, 1.0),
            end_time: end_time.clamp(0.0, 1.0),
        }
    }

    /// A segment between two frames of `base`, inclusive.
    pub fn from_frames(base: Arc<dyn NodeAnimation>, start_frame: usize, end_frame: usize) -> Self {
        let start_time = base.time_at_frame(start_frame);
        let end_time = base.time_at_frame(end_frame);
        Self::from_times(base, start_time, end_time)
    }

    pub fn base(&self) -> &Arc<dyn NodeAnimation> {
        &self.base
    }

    pub fn start_time(&self) -> f32 {
        self.start_time
    }

    pub fn set_start_time(&mut self, t: f32) {
        self.start_time = t.clamp(0.0, 1.0);
    }

    pub fn end_time(&self) -> f32 {
        self.end_time
    }

    pub fn set_end_time(&mut self, t: f32) {
        self.end_time = t.clamp(0.0, 1.0);
    }

    /// The base frame in which the segment starts.
    pub fn start_frame_index(&self) -> usize {
        self.base.frame_index_at(self.start_time)
    }

    pub fn set_start_frame_index(&mut self, frame: usize) {
        self.set_start_time(self.base.time_at_frame(frame));
    }

    /// The base frame in which the segment ends.
    pub fn end_frame_index(&self) -> usize {
        self.base.frame_index_at(self.end_time)
    }

    pub fn set_end_frame_index(&mut self, frame: usize) {
        self.set_end_time(self.base.time_at_frame(frame));
    }

    /// Map a segment time onto the base animation's timeline.
    #[inline]
    pub fn base_time(&self, t: f32) -> f32 {
        self.start_time + (self.end_time - self.start_time) * t
    }
}

impl NodeAnimation for NodeAnimationSegment {
    fn frame_count(&self) -> usize {
        self.base.frame_count()
    }

    fn should_interpolate(&self) -> bool {
        self.base.should_interpolate()
    }

    fn interpolation_epsilon(&self) -> f32 {
        self.base.interpolation_epsilon()
    }

    fn is_animating_location(&self) -> bool {
        self.base.is_animating_location()
    }

    fn is_animating_quaternion(&self) -> bool {
        self.base.is_animating_quaternion()
    }

    fn is_animating_scale(&self) -> bool {
        self.base.is_animating_scale()
    }

    fn has_variable_frame_timing(&self) -> bool {
        self.base.has_variable_frame_timing()
    }

    fn is_frozen(&self) -> bool {
        self.base.is_frozen()
    }

    fn time_at_frame(&self, frame: usize) -> f32 {
        self.base.time_at_frame(frame)
    }

    fn frame_index_at(&self, t: f32) -> usize {
        self.base.frame_index_at(self.base_time(t))
    }

    fn location_at_frame(&self, frame: usize) -> Vector3<f32> {
        self.base.location_at_frame(frame)
    }

    fn quaternion_at_frame(&self, frame: usize) -> Quaternion<f32> {
        self.base.quaternion_at_frame(frame)
    }

    fn scale_at_frame(&self, frame: usize) -> Vector3<f32> {
        self.base.scale_at_frame(frame)
    }

    fn establish_frame_at(&self, t: f32, channels: Channels, pose: &mut Pose) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::AnimationTimeOutOfRange(t));
        }
        self.base.establish_frame_at(self.base_time(t), channels, pose)
    }
}
