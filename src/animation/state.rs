use std::{fmt::Write, sync::Arc};

use nalgebra::{Quaternion, Vector3};

use super::{Channels, NodeAnimation, Pose, TrackId};
use crate::error::Error;

/// One node's playback cursor into a shared [NodeAnimation] on a single track.
///
/// The state never refers back to its node; the [Scene](crate::Scene) marks the owning node's
/// animation dirty whenever it mutates a state.
#[derive(Debug, Clone)]
pub struct NodeAnimationState {
    animation: Arc<dyn NodeAnimation>,
    track: TrackId,
    blending_weight: f32,
    animation_time: f32,
    pose: Pose,
    is_enabled: bool,
    enabled_channels: Channels,
}

fn fmt_vec(v: &Vector3<f32>) -> String {
    format!("({:.3}, {:.3}, {:.3})", v.x, v.y, v.z)
}

fn fmt_quat(q: &Quaternion<f32>) -> String {
    format!("({:.3}, {:.3}, {:.3}, {:.3})", q.i, q.j, q.k, q.w)
}

impl NodeAnimationState {
    /// Start playback of `animation` on `track`, positioned at its first frame.
    pub fn new(animation: Arc<dyn NodeAnimation>, track: TrackId) -> Self {
        let mut res = Self {
            animation,
            track,
            blending_weight: 1.0,
            animation_time: 0.0,
            pose: Pose::default(),
            is_enabled: true,
            enabled_channels: Channels::ALL,
        };
        // an empty animation simply leaves the default pose in place
        let _ = res.establish_frame_at(0.0);
        res
    }

    #[inline]
    pub fn animation(&self) -> &Arc<dyn NodeAnimation> {
        &self.animation
    }

    /// Swap the underlying animation, keeping track, weight, time and channel flags.
    pub fn replace_animation(&mut self, animation: Arc<dyn NodeAnimation>) {
        self.animation = animation;
        if let Err(e) = self.establish_frame_at(self.animation_time) {
            tracing::warn!(track = self.track, error = %e, "keeping the previous pose");
        }
    }

    #[inline]
    pub fn track(&self) -> TrackId {
        self.track
    }

    #[inline]
    pub fn blending_weight(&self) -> f32 {
        self.blending_weight
    }

    /// Set the blending weight, clamped to `[0, 1]`.
    pub fn set_blending_weight(&mut self, weight: f32) {
        self.blending_weight = weight.clamp(0.0, 1.0);
    }

    #[inline]
    pub fn animation_time(&self) -> f32 {
        self.animation_time
    }

    #[inline]
    pub fn pose(&self) -> &Pose {
        &self.pose
    }

    #[inline]
    pub fn location(&self) -> Vector3<f32> {
        self.pose.location
    }

    pub fn set_location(&mut self, location: Vector3<f32>) {
        self.pose.location = location;
    }

    #[inline]
    pub fn quaternion(&self) -> Quaternion<f32> {
        self.pose.quaternion
    }

    pub fn set_quaternion(&mut self, quaternion: Quaternion<f32>) {
        self.pose.quaternion = quaternion;
    }

    #[inline]
    pub fn scale(&self) -> Vector3<f32> {
        self.pose.scale
    }

    pub fn set_scale(&mut self, scale: Vector3<f32>) {
        self.pose.scale = scale;
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.is_enabled
    }

    pub fn set_is_enabled(&mut self, enabled: bool) {
        self.is_enabled = enabled;
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.animation.frame_count()
    }

    #[inline]
    pub fn has_variable_frame_timing(&self) -> bool {
        self.animation.has_variable_frame_timing()
    }

    #[inline]
    pub fn enabled_channels(&self) -> Channels {
        self.enabled_channels
    }

    pub fn set_is_location_animation_enabled(&mut self, enabled: bool) {
        self.enabled_channels.location = enabled;
    }

    pub fn set_is_quaternion_animation_enabled(&mut self, enabled: bool) {
        self.enabled_channels.quaternion = enabled;
    }

    pub fn set_is_scale_animation_enabled(&mut self, enabled: bool) {
        self.enabled_channels.scale = enabled;
    }

    /// The channels both enabled here and driven by the animation.
    pub fn channels(&self) -> Channels {
        Channels {
            location: self.is_animating_location(),
            quaternion: self.is_animating_quaternion(),
            scale: self.is_animating_scale(),
        }
    }

    pub fn is_animating_location(&self) -> bool {
        self.enabled_channels.location && self.animation.is_animating_location()
    }

    pub fn is_animating_quaternion(&self) -> bool {
        self.enabled_channels.quaternion && self.animation.is_animating_quaternion()
    }

    pub fn is_animating_scale(&self) -> bool {
        self.enabled_channels.scale && self.animation.is_animating_scale()
    }

    /// Whether this state is enabled and drives at least one channel.
    pub fn is_animating(&self) -> bool {
        self.is_enabled && self.channels().any()
    }

    /// Move the cursor to `t` and, if enabled, cache the animation's pose there.
    ///
    /// # Errors
    /// * `t` ∉ [0, 1]
    /// * the animation has no frames
    pub fn establish_frame_at(&mut self, t: f32) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::AnimationTimeOutOfRange(t));
        }
        self.animation_time = t;
        if self.is_enabled {
            let channels = self.channels();
            self.animation
                .establish_frame_at(t, channels, &mut self.pose)?;
        }
        Ok(())
    }

    /// One line describing the cursor time and every animated channel of the cached pose.
    pub fn describe_current_state(&self) -> String {
        let mut desc = format!("Time: {:.4}", self.animation_time);
        if self.is_animating_location() {
            let _ = write!(desc, " Loc: {}", fmt_vec(&self.pose.location));
        }
        if self.is_animating_quaternion() {
            let _ = write!(desc, " Quat: {}", fmt_quat(&self.pose.quaternion));
        }
        if self.is_animating_scale() {
            let _ = write!(desc, " Scale: {}", fmt_vec(&self.pose.scale));
        }
        if !self.is_animating() {
            desc.push_str(" No animation enabled.");
        }
        desc
    }

    /// Describe the pose at `frame_count` evenly spaced times between `start` and `end`.
    ///
    /// The cursor time and enabled flag are restored afterwards.
    pub fn describe_state_for_frames(
        &mut self,
        node_name: &str,
        frame_count: usize,
        start: f32,
        end: f32,
    ) -> String {
        let start = start.clamp(0.0, 1.0);
        let end = end.clamp(0.0, 1.0);
        let prev_time = self.animation_time;
        let prev_pose = self.pose;
        let was_enabled = self.is_enabled;
        self.is_enabled = true;

        let frame_dur = if frame_count > 1 {
            (end - start) / (frame_count - 1) as f32
        } else {
            0.0
        };
        let mut desc = format!(
            "{node_name} animated state on track {} over {frame_count} frames from {start:.4} to {end:.4}:",
            self.track
        );
        if self.is_animating() && frame_count > 0 {
            for i in 0..frame_count {
                let t = (start + frame_dur * i as f32).clamp(0.0, 1.0);
                let _ = self.establish_frame_at(t);
                let _ = write!(desc, "\n\t{}", self.describe_current_state());
            }
        } else {
            desc.push_str(" No animation enabled.");
        }

        self.animation_time = prev_time;
        self.pose = prev_pose;
        self.is_enabled = was_enabled;
        desc
    }
}
