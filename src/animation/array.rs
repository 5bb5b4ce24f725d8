use nalgebra::{Quaternion, Vector3};

use super::{NodeAnimation, DEFAULT_INTERPOLATION_EPSILON};

/// A [NodeAnimation] backed by per-frame arrays. Any channel without an array is not animated.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayNodeAnimation {
    frame_count: usize,
    should_interpolate: bool,
    interpolation_epsilon: f32,
    frame_times: Option<Vec<f32>>,
    locations: Option<Vec<Vector3<f32>>>,
    quaternions: Option<Vec<Quaternion<f32>>>,
    scales: Option<Vec<Vector3<f32>>>,
}

/// Index into `v`, clamped to its last element.
#[inline]
fn clamped<T: Copy>(v: &[T], frame: usize) -> Option<T> {
    v.get(frame.min(v.len().checked_sub(1)?)).copied()
}

impl ArrayNodeAnimation {
    /// An animation of `frame_count` evenly spaced frames with no animated channels.
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            should_interpolate: true,
            interpolation_epsilon: DEFAULT_INTERPOLATION_EPSILON,
            frame_times: None,
            locations: None,
            quaternions: None,
            scales: None,
        }
    }

    /// Set explicit, ascending frame times in `[0, 1]`, making frame timing variable.
    pub fn with_frame_times(mut self, times: Vec<f32>) -> Self {
        self.frame_times = Some(times);
        self
    }

    pub fn with_locations(mut self, locations: Vec<Vector3<f32>>) -> Self {
        self.locations = Some(locations);
        self
    }

    pub fn with_quaternions(mut self, quaternions: Vec<Quaternion<f32>>) -> Self {
        self.quaternions = Some(quaternions);
        self
    }

    pub fn with_scales(mut self, scales: Vec<Vector3<f32>>) -> Self {
        self.scales = Some(scales);
        self
    }

    pub fn with_interpolation(mut self, should_interpolate: bool) -> Self {
        self.should_interpolate = should_interpolate;
        self
    }

    pub fn with_interpolation_epsilon(mut self, epsilon: f32) -> Self {
        self.interpolation_epsilon = epsilon;
        self
    }

    pub fn frame_times(&self) -> Option<&[f32]> {
        self.frame_times.as_deref()
    }
}

impl NodeAnimation for ArrayNodeAnimation {
    fn frame_count(&self) -> usize {
        self.frame_count
    }

    fn should_interpolate(&self) -> bool {
        self.should_interpolate
    }

    fn interpolation_epsilon(&self) -> f32 {
        self.interpolation_epsilon
    }

    fn is_animating_location(&self) -> bool {
        self.locations.as_ref().is_some_and(|v| !v.is_empty())
    }

    fn is_animating_quaternion(&self) -> bool {
        self.quaternions.as_ref().is_some_and(|v| !v.is_empty())
    }

    fn is_animating_scale(&self) -> bool {
        self.scales.as_ref().is_some_and(|v| !v.is_empty())
    }

    fn has_variable_frame_timing(&self) -> bool {
        self.frame_times.as_ref().is_some_and(|v| !v.is_empty())
    }

    fn time_at_frame(&self, frame: usize) -> f32 {
        match self.frame_times.as_deref().and_then(|t| clamped(t, frame)) {
            Some(t) => t,
            None => {
                let last = self.frame_count.saturating_sub(1).max(1) as f32;
                (frame as f32 / last).clamp(0.0, 1.0)
            }
        }
    }

    fn frame_index_at(&self, t: f32) -> usize {
        match self.frame_times.as_deref() {
            Some(times) if !times.is_empty() => times
                .iter()
                .take(self.frame_count)
                .rposition(|ft| *ft <= t)
                .unwrap_or(0),
            _ => (self.frame_count.saturating_sub(1) as f32 * t) as usize,
        }
    }

    fn location_at_frame(&self, frame: usize) -> Vector3<f32> {
        self.locations
            .as_deref()
            .and_then(|v| clamped(v, frame.min(self.frame_count.saturating_sub(1))))
            .unwrap_or_else(Vector3::zeros)
    }

    fn quaternion_at_frame(&self, frame: usize) -> Quaternion<f32> {
        self.quaternions
            .as_deref()
            .and_then(|v| clamped(v, frame.min(self.frame_count.saturating_sub(1))))
            .unwrap_or_else(Quaternion::identity)
    }

    fn scale_at_frame(&self, frame: usize) -> Vector3<f32> {
        self.scales
            .as_deref()
            .and_then(|v| clamped(v, frame.min(self.frame_count.saturating_sub(1))))
            .unwrap_or_else(|| Vector3::repeat(1.0))
    }
}
