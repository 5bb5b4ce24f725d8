//! Animation tracks and blending.

use std::sync::Arc;

use nalgebra::{Quaternion, Vector3};
use tracing::{debug, trace};

use crate::{
    animation::{
        slerp, FrozenNodeAnimation, NodeAnimation, NodeAnimationSegment, NodeAnimationState,
        TrackId,
    },
    error::Error,
    NodeId, Scene,
};

impl Scene {
    /// Play `animation` on `track` of node `id`, replacing whatever was there.
    ///
    /// Does nothing if `animation` is already on that track.
    pub fn add_animation(
        &mut self,
        id: NodeId,
        animation: Arc<dyn NodeAnimation>,
        track: TrackId,
    ) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        if let Some(existing) = node.animation_state(track) {
            if Arc::ptr_eq(existing.animation(), &animation) {
                return Ok(());
            }
        }
        node.animation_states.retain(|s| s.track() != track);
        node.animation_states
            .push(NodeAnimationState::new(animation, track));
        node.is_animation_dirty = true;
        debug!(node = %id, track = %track, "added animation");
        Ok(())
    }

    /// Stop playing `animation` on node `id`, on whichever track it is.
    pub fn remove_animation(
        &mut self,
        id: NodeId,
        animation: &Arc<dyn NodeAnimation>,
    ) -> Result<(), Error> {
        let node = self.node_mut(id)?;
        let before = node.animation_states.len();
        node.animation_states
            .retain(|s| !Arc::ptr_eq(s.animation(), animation));
        if node.animation_states.len() != before {
            node.is_animation_dirty = true;
        }
        Ok(())
    }

    /// Remove `track` from `id` and all its descendants.
    pub fn remove_animation_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        for n in self.flatten(id)? {
            let node = self.node_mut(n)?;
            let before = node.animation_states.len();
            node.animation_states.retain(|s| s.track() != track);
            if node.animation_states.len() != before {
                node.is_animation_dirty = true;
            }
        }
        debug!(node = %id, track = %track, "removed animation track");
        Ok(())
    }

    /// The animation on `track` of node `id` itself.
    pub fn animation(&self, id: NodeId, track: TrackId) -> Result<Option<Arc<dyn NodeAnimation>>, Error> {
        Ok(self
            .node(id)?
            .animation_state(track)
            .map(|s| s.animation().clone()))
    }

    /// Whether `id` or any descendant has an animation on any track.
    pub fn contains_animation(&self, id: NodeId) -> Result<bool, Error> {
        for n in self.flatten(id)? {
            if !self.node(n)?.animation_states.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Whether `id` or any descendant has an animation on `track`.
    pub fn contains_animation_on_track(&self, id: NodeId, track: TrackId) -> Result<bool, Error> {
        for n in self.flatten(id)? {
            if self.node(n)?.animation_state(track).is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Play the part of the animation on `base_track` between `start_time` and `end_time` as a
    /// new track, on `id` and every descendant with an animation on `base_track`.
    ///
    /// Returns the new track.
    pub fn add_animation_from(
        &mut self,
        id: NodeId,
        start_time: f32,
        end_time: f32,
        base_track: TrackId,
    ) -> Result<TrackId, Error> {
        let track = self.generate_track_id();
        self.add_animation_from_on_track(id, start_time, end_time, base_track, track)?;
        Ok(track)
    }

    pub fn add_animation_from_on_track(
        &mut self,
        id: NodeId,
        start_time: f32,
        end_time: f32,
        base_track: TrackId,
        track: TrackId,
    ) -> Result<(), Error> {
        self.add_segments(id, base_track, track, |base| {
            NodeAnimationSegment::from_times(base, start_time, end_time)
        })
    }

    /// As [Scene::add_animation_from], with the segment bounded by frame indices.
    pub fn add_animation_from_frames(
        &mut self,
        id: NodeId,
        start_frame: usize,
        end_frame: usize,
        base_track: TrackId,
    ) -> Result<TrackId, Error> {
        let track = self.generate_track_id();
        self.add_animation_from_frames_on_track(id, start_frame, end_frame, base_track, track)?;
        Ok(track)
    }

    pub fn add_animation_from_frames_on_track(
        &mut self,
        id: NodeId,
        start_frame: usize,
        end_frame: usize,
        base_track: TrackId,
        track: TrackId,
    ) -> Result<(), Error> {
        self.add_segments(id, base_track, track, |base| {
            NodeAnimationSegment::from_frames(base, start_frame, end_frame)
        })
    }

    fn add_segments(
        &mut self,
        id: NodeId,
        base_track: TrackId,
        track: TrackId,
        make: impl Fn(Arc<dyn NodeAnimation>) -> NodeAnimationSegment,
    ) -> Result<(), Error> {
        for n in self.flatten(id)? {
            if let Some(base) = self.animation(n, base_track)? {
                self.add_animation(n, Arc::new(make(base)), track)?;
            }
        }
        Ok(())
    }

    /// The animation time on `track` of `id`, or else of the first descendant with a nonzero
    /// time.
    pub fn animation_time_on_track(&self, id: NodeId, track: TrackId) -> Result<f32, Error> {
        self.first_on_track(id, track, NodeAnimationState::animation_time)
    }

    /// The blending weight on `track` of `id`, or else of the first descendant with a
    /// nonzero weight.
    pub fn animation_blending_weight_on_track(
        &self,
        id: NodeId,
        track: TrackId,
    ) -> Result<f32, Error> {
        self.first_on_track(id, track, NodeAnimationState::blending_weight)
    }

    fn first_on_track(
        &self,
        id: NodeId,
        track: TrackId,
        get: fn(&NodeAnimationState) -> f32,
    ) -> Result<f32, Error> {
        let node = self.node(id)?;
        if let Some(s) = node.animation_state(track) {
            return Ok(get(s));
        }
        for &c in &node.children {
            let v = self.first_on_track(c, track, get)?;
            if v > 0.0 {
                return Ok(v);
            }
        }
        Ok(0.0)
    }

    /// Set the weight of `track` on `id` and every descendant.
    pub fn set_animation_blending_weight(
        &mut self,
        id: NodeId,
        weight: f32,
        track: TrackId,
    ) -> Result<(), Error> {
        self.for_each_state(id, track, true, |s| s.set_blending_weight(weight))
    }

    /// Apply `f` to the state on `track` of `id` (and, if `recurse`, of every descendant),
    /// marking each touched node's animation dirty.
    fn for_each_state(
        &mut self,
        id: NodeId,
        track: TrackId,
        recurse: bool,
        mut f: impl FnMut(&mut NodeAnimationState),
    ) -> Result<(), Error> {
        let targets = match recurse {
            true => self.flatten(id)?,
            false => vec![id],
        };
        for n in targets {
            let node = self.node_mut(n)?;
            if let Some(s) = node.animation_state_mut(track) {
                f(s);
                node.is_animation_dirty = true;
            }
        }
        Ok(())
    }

    pub fn is_animation_enabled_on_track(&self, id: NodeId, track: TrackId) -> Result<bool, Error> {
        Ok(self
            .node(id)?
            .animation_state(track)
            .map(NodeAnimationState::is_enabled)
            .unwrap_or(false))
    }

    pub fn enable_animation_on_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        self.for_each_state(id, track, false, |s| s.set_is_enabled(true))
    }

    pub fn disable_animation_on_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        self.for_each_state(id, track, false, |s| s.set_is_enabled(false))
    }

    /// Enable `track` on `id` and every descendant.
    pub fn enable_all_animation_on_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        self.for_each_state(id, track, true, |s| s.set_is_enabled(true))
    }

    pub fn disable_all_animation_on_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        self.for_each_state(id, track, true, |s| s.set_is_enabled(false))
    }

    fn set_every_track_enabled(&mut self, id: NodeId, recurse: bool, enabled: bool) -> Result<(), Error> {
        let targets = match recurse {
            true => self.flatten(id)?,
            false => vec![id],
        };
        for n in targets {
            let node = self.node_mut(n)?;
            for s in &mut node.animation_states {
                s.set_is_enabled(enabled);
            }
            node.is_animation_dirty = true;
        }
        Ok(())
    }

    /// Enable every track on `id` itself.
    pub fn enable_animation(&mut self, id: NodeId) -> Result<(), Error> {
        self.set_every_track_enabled(id, false, true)
    }

    pub fn disable_animation(&mut self, id: NodeId) -> Result<(), Error> {
        self.set_every_track_enabled(id, false, false)
    }

    /// Enable every track on `id` and every descendant.
    pub fn enable_all_animation(&mut self, id: NodeId) -> Result<(), Error> {
        self.set_every_track_enabled(id, true, true)
    }

    pub fn disable_all_animation(&mut self, id: NodeId) -> Result<(), Error> {
        self.set_every_track_enabled(id, true, false)
    }

    pub fn set_is_location_animation_enabled(
        &mut self,
        id: NodeId,
        track: TrackId,
        enabled: bool,
    ) -> Result<(), Error> {
        self.for_each_state(id, track, false, |s| s.set_is_location_animation_enabled(enabled))
    }

    pub fn set_is_quaternion_animation_enabled(
        &mut self,
        id: NodeId,
        track: TrackId,
        enabled: bool,
    ) -> Result<(), Error> {
        self.for_each_state(id, track, false, |s| {
            s.set_is_quaternion_animation_enabled(enabled)
        })
    }

    pub fn set_is_scale_animation_enabled(
        &mut self,
        id: NodeId,
        track: TrackId,
        enabled: bool,
    ) -> Result<(), Error> {
        self.for_each_state(id, track, false, |s| s.set_is_scale_animation_enabled(enabled))
    }

    /// Move `track` to time `t` on `id` and every descendant.
    ///
    /// # Errors
    /// * `t` ∉ [0, 1]
    pub fn establish_animation_frame_at(
        &mut self,
        id: NodeId,
        t: f32,
        track: TrackId,
    ) -> Result<(), Error> {
        if !(0.0..=1.0).contains(&t) {
            return Err(Error::AnimationTimeOutOfRange(t));
        }
        for n in self.flatten(id)? {
            let node = self.node_mut(n)?;
            if let Some(s) = node.animation_state_mut(track) {
                s.establish_frame_at(t)?;
                node.is_animation_dirty = true;
            }
        }
        trace!(node = %id, track = %track, t, "established animation frame");
        Ok(())
    }

    /// Hold `id` in its current pose on `track`, unless something else animates it there.
    ///
    /// A track with no animation gets a [FrozenNodeAnimation] of the current pose; a track
    /// which already holds one gets a fresh snapshot.
    pub fn freeze_if_inanimate_on_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        let frozen = match self.node(id)?.animation_state(track) {
            Some(s) if !s.animation().is_frozen() => return Ok(()),
            Some(_) => true,
            None => false,
        };
        let snapshot: Arc<dyn NodeAnimation> = Arc::new(FrozenNodeAnimation::new(
            Some(self.location(id)?),
            Some(self.quaternion(id)?),
            Some(self.scale(id)?),
        ));
        if frozen {
            self.for_each_state(id, track, false, |s| s.replace_animation(snapshot.clone()))
        } else {
            self.add_animation(id, snapshot, track)
        }
    }

    /// [Scene::freeze_if_inanimate_on_track] for `id` and every descendant.
    pub fn freeze_all_inanimates_on_track(&mut self, id: NodeId, track: TrackId) -> Result<(), Error> {
        for n in self.flatten(id)? {
            self.freeze_if_inanimate_on_track(n, track)?;
        }
        Ok(())
    }

    /// Set location, rotation and scale from a weighted blend of every enabled track.
    ///
    /// Each channel is blended as a running average in track order; a channel no track
    /// animates keeps its current value.
    pub fn update_from_animation_state(&mut self, id: NodeId) -> Result<(), Error> {
        let node = self.node(id)?;
        if !node.is_animation_dirty {
            return Ok(());
        }

        let mut location = Vector3::zeros();
        let mut quaternion = Quaternion::identity();
        let mut scale = Vector3::repeat(1.0);
        let (mut total_l, mut total_q, mut total_s) = (0.0f32, 0.0f32, 0.0f32);

        for s in &node.animation_states {
            let weight = s.blending_weight();
            if weight == 0.0 || !s.is_enabled() {
                continue;
            }
            if s.is_animating_location() {
                total_l += weight;
                location = location.lerp(&s.location(), weight / total_l);
            }
            if s.is_animating_quaternion() {
                total_q += weight;
                quaternion = slerp(&quaternion, &s.quaternion(), weight / total_q);
            }
            if s.is_animating_scale() {
                total_s += weight;
                scale = scale.lerp(&s.scale(), weight / total_s);
            }
        }

        if total_l > 0.0 {
            self.set_location(id, location)?;
        }
        if total_q > 0.0 {
            self.set_quaternion(id, quaternion)?;
        }
        if total_s > 0.0 {
            self.set_scale(id, scale)?;
        }
        self.node_mut(id)?.is_animation_dirty = false;
        Ok(())
    }

    /// Bring `id` and its descendants up to date before their transforms are read: face the
    /// active camera where requested, then apply animation.
    pub fn update(&mut self, id: NodeId) -> Result<(), Error> {
        for n in self.flatten(id)? {
            self.check_camera_target(n)?;
            self.update_from_animation_state(n)?;
        }
        Ok(())
    }

    pub fn describe_current_animation_state(&self, id: NodeId, track: TrackId) -> Result<String, Error> {
        let node = self.node(id)?;
        Ok(match node.animation_state(track) {
            Some(s) => format!("{} on track {}: {}", node.name, track, s.describe_current_state()),
            None => format!("{} has no animation on track {}", node.name, track),
        })
    }

    /// Describe the pose of `track` at `frame_count` evenly spaced times in `[start, end]`,
    /// leaving the track where it was.
    pub fn describe_animation_state_for_frames(
        &mut self,
        id: NodeId,
        frame_count: usize,
        start: f32,
        end: f32,
        track: TrackId,
    ) -> Result<String, Error> {
        let node = self.node_mut(id)?;
        let name = node.name.clone();
        Ok(match node.animation_state_mut(track) {
            Some(s) => s.describe_state_for_frames(&name, frame_count, start, end),
            None => format!("{name} has no animation on track {track}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::{ArrayNodeAnimation, DEFAULT_TRACK},
        node::NodeKind,
    };

    fn slide(to: Vector3<f32>) -> Arc<dyn NodeAnimation> {
        Arc::new(ArrayNodeAnimation::new(2).with_locations(vec![Vector3::zeros(), to]))
    }

    #[test]
    fn same_animation_is_not_restarted() {
        let mut scene = Scene::new();
        let n = scene.create_node("n", NodeKind::Plain);
        let anim = slide(Vector3::x());
        scene.add_animation(n, anim.clone(), DEFAULT_TRACK).unwrap();
        scene.establish_animation_frame_at(n, 0.5, DEFAULT_TRACK).unwrap();
        scene.add_animation(n, anim, DEFAULT_TRACK).unwrap();
        assert_eq!(scene.animation_time_on_track(n, DEFAULT_TRACK).unwrap(), 0.5);
        scene.add_animation(n, slide(Vector3::y()), DEFAULT_TRACK).unwrap();
        assert_eq!(scene.animation_time_on_track(n, DEFAULT_TRACK).unwrap(), 0.0);
        assert_eq!(scene.node(n).unwrap().animation_states().len(), 1);
    }

    #[test]
    fn disabled_and_weightless_tracks_do_not_blend() {
        let mut scene = Scene::new();
        let n = scene.create_node("n", NodeKind::Plain);
        scene.set_location(n, Vector3::new(0.0, 0.0, 9.0)).unwrap();
        scene.add_animation(n, slide(Vector3::x()), 1).unwrap();
        scene.add_animation(n, slide(Vector3::y()), 2).unwrap();
        scene.establish_animation_frame_at(n, 1.0, 1).unwrap();
        scene.establish_animation_frame_at(n, 1.0, 2).unwrap();
        scene.set_animation_blending_weight(n, 0.0, 1).unwrap();
        scene.disable_animation_on_track(n, 2).unwrap();
        scene.update(n).unwrap();
        // nothing animated location, so it stays put
        assert_eq!(scene.location(n).unwrap(), Vector3::new(0.0, 0.0, 9.0));
        assert!(!scene.node(n).unwrap().is_animation_dirty());
    }

    #[test]
    fn segments_are_added_through_the_subtree() {
        let mut scene = Scene::new();
        let root = scene.create_node("root", NodeKind::Plain);
        let child = scene.create_node("child", NodeKind::Plain);
        scene.add_child(root, child).unwrap();
        scene
            .add_animation(child, slide(Vector3::new(8.0, 0.0, 0.0)), DEFAULT_TRACK)
            .unwrap();
        let track = scene.add_animation_from(root, 0.5, 1.0, DEFAULT_TRACK).unwrap();
        assert_ne!(track, DEFAULT_TRACK);
        assert!(scene.animation(root, track).unwrap().is_none());
        assert!(scene.contains_animation_on_track(root, track).unwrap());

        scene.establish_animation_frame_at(root, 0.0, track).unwrap();
        let state = scene.node(child).unwrap().animation_state(track).unwrap();
        assert!((state.location().x - 4.0).abs() < 1.0e-4);

        scene.remove_animation_track(root, track).unwrap();
        assert!(!scene.contains_animation_on_track(root, track).unwrap());
    }

    #[test]
    fn fallback_getters_search_children() {
        let mut scene = Scene::new();
        let root = scene.create_node("root", NodeKind::Plain);
        let child = scene.create_node("child", NodeKind::Plain);
        scene.add_child(root, child).unwrap();
        scene.add_animation(child, slide(Vector3::x()), 3).unwrap();
        scene.set_animation_blending_weight(root, 0.25, 3).unwrap();
        scene.establish_animation_frame_at(root, 0.75, 3).unwrap();
        assert_eq!(scene.animation_blending_weight_on_track(root, 3).unwrap(), 0.25);
        assert_eq!(scene.animation_time_on_track(root, 3).unwrap(), 0.75);
        assert_eq!(scene.animation_time_on_track(root, 4).unwrap(), 0.0);
    }

    #[test]
    fn freezing_snapshots_the_pose() {
        let mut scene = Scene::new();
        let n = scene.create_node("n", NodeKind::Plain);
        scene.set_location(n, Vector3::new(1.0, 2.0, 3.0)).unwrap();
        scene.freeze_if_inanimate_on_track(n, 5).unwrap();
        let anim = scene.animation(n, 5).unwrap().unwrap();
        assert!(anim.is_frozen());
        assert_eq!(anim.location_at_frame(0), Vector3::new(1.0, 2.0, 3.0));

        scene.set_location(n, Vector3::new(4.0, 5.0, 6.0)).unwrap();
        scene.freeze_if_inanimate_on_track(n, 5).unwrap();
        let anim = scene.animation(n, 5).unwrap().unwrap();
        assert_eq!(anim.location_at_frame(0), Vector3::new(4.0, 5.0, 6.0));

        // a real animation is left alone
        scene.add_animation(n, slide(Vector3::x()), 6).unwrap();
        scene.freeze_if_inanimate_on_track(n, 6).unwrap();
        assert!(!scene.animation(n, 6).unwrap().unwrap().is_frozen());
    }

    #[test]
    fn descriptions_name_the_node() {
        let mut scene = Scene::new();
        let n = scene.create_node("arm", NodeKind::Plain);
        assert_eq!(
            scene.describe_current_animation_state(n, 0).unwrap(),
            "arm has no animation on track 0"
        );
        scene.add_animation(n, slide(Vector3::x()), 0).unwrap();
        let desc = scene.describe_animation_state_for_frames(n, 3, 0.0, 1.0, 0).unwrap();
        assert!(desc.starts_with("arm animated state on track 0 over 3 frames"));
        assert_eq!(desc.lines().count(), 4);
    }
}
