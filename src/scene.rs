//! The scene graph: an arena of [Nodes](Node) addressed by [NodeId].
//!
//! Nodes refer to each other (parent, children, rotation targets, skin bones) only by id, so
//! every operation that has to look beyond a single node lives on [Scene]. Handles to destroyed
//! nodes never resolve again; using one yields [Error::InvalidNode].

mod animate;
mod hierarchy;
mod skeleton;
mod target;
mod transform;

pub use hierarchy::HierarchyObserver;

use stablevec::StableVec;
use tracing::debug;

use crate::{
    animation::{TrackAllocator, TrackId},
    error::Error,
    node::{Node, NodeKind},
};

/// Handle to a node within a [Scene].
pub type NodeId = stablevec::Key<u32>;

/// Scene-wide settings.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SceneConfig {
    /// Number of incremental rotations after which a rotation matrix is re-orthonormalized.
    /// Zero disables re-orthonormalization.
    pub auto_orthonormalize_count: u8,
    /// The first tag handed out to new nodes.
    pub first_tag: u32,
    /// Smallest absolute scale component applied to a transform.
    pub min_scale: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            auto_orthonormalize_count: 0,
            first_tag: 1,
            min_scale: 1.0e-9,
        }
    }
}

/// Hands out node tags in sequence.
#[derive(Debug, Clone)]
pub struct TagAllocator {
    first: u32,
    next: u32,
}

impl TagAllocator {
    pub fn new(first: u32) -> Self {
        Self { first, next: first }
    }

    pub fn next(&mut self) -> u32 {
        let res = self.next;
        self.next = self.next.wrapping_add(1);
        res
    }

    /// Start again from the first tag.
    pub fn reset(&mut self) {
        self.next = self.first;
    }
}

/// Owner of every node in a scene graph.
#[derive(Debug)]
pub struct Scene {
    nodes: StableVec<Node>,
    config: SceneConfig,
    tags: TagAllocator,
    tracks: TrackAllocator,
    active_camera: Option<NodeId>,
    observer: Option<Box<dyn HierarchyObserver>>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::with_config(SceneConfig::default())
    }

    pub fn with_config(config: SceneConfig) -> Self {
        Self {
            nodes: StableVec::new(),
            config,
            tags: TagAllocator::new(config.first_tag),
            tracks: TrackAllocator::new(),
            active_camera: None,
            observer: None,
        }
    }

    #[inline]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Create a detached node and return its handle.
    pub fn create_node(&mut self, name: impl Into<String>, kind: NodeKind) -> NodeId {
        let tag = self.tags.next();
        let id = self.nodes.insert(Node::new(name, tag, kind));
        debug!(node = %id, tag, "created node");
        id
    }

    /// Get the node at `id`.
    ///
    /// # Errors
    /// * `id` does not refer to a live node
    #[inline]
    pub fn node(&self, id: NodeId) -> Result<&Node, Error> {
        self.nodes.get(id).ok_or(Error::InvalidNode(id))
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, Error> {
        self.nodes.get_mut(id).ok_or(Error::InvalidNode(id))
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every live node, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> + '_ {
        self.nodes.iter()
    }

    pub fn set_name(&mut self, id: NodeId, name: impl Into<String>) -> Result<(), Error> {
        self.node_mut(id)?.name = name.into();
        Ok(())
    }

    pub fn set_tag(&mut self, id: NodeId, tag: u32) -> Result<(), Error> {
        self.node_mut(id)?.tag = tag;
        Ok(())
    }

    /// The allocator new node tags are drawn from.
    #[inline]
    pub fn tags_mut(&mut self) -> &mut TagAllocator {
        &mut self.tags
    }

    /// Restart tag allocation from [SceneConfig::first_tag].
    pub fn reset_tag_allocation(&mut self) {
        self.tags.reset();
    }

    /// A track id not yet handed out by this scene.
    pub fn generate_track_id(&mut self) -> TrackId {
        self.tracks.next()
    }

    pub fn reset_track_allocation(&mut self) {
        self.tracks.reset();
    }

    #[inline]
    pub fn active_camera(&self) -> Option<NodeId> {
        self.active_camera
    }

    /// Set the camera that nodes configured to auto-target the camera will face.
    pub fn set_active_camera(&mut self, camera: Option<NodeId>) -> Result<(), Error> {
        if let Some(c) = camera {
            self.node(c)?;
        }
        self.active_camera = camera;
        Ok(())
    }

    pub fn set_observer(&mut self, observer: Box<dyn HierarchyObserver>) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn HierarchyObserver>> {
        self.observer.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_follow_config() {
        let mut scene = Scene::with_config(SceneConfig {
            first_tag: 10,
            ..Default::default()
        });
        let a = scene.create_node("a", NodeKind::Plain);
        let b = scene.create_node("b", NodeKind::Plain);
        assert_eq!(scene.node(a).unwrap().tag(), 10);
        assert_eq!(scene.node(b).unwrap().tag(), 11);
        scene.reset_tag_allocation();
        let c = scene.create_node("c", NodeKind::Plain);
        assert_eq!(scene.node(c).unwrap().tag(), 10);
    }

    #[test]
    fn separate_scenes_do_not_share_tags() {
        let mut s1 = Scene::new();
        let mut s2 = Scene::new();
        let a = s1.create_node("a", NodeKind::Plain);
        let b = s2.create_node("b", NodeKind::Plain);
        assert_eq!(s1.node(a).unwrap().tag(), s2.node(b).unwrap().tag());
    }

    #[test]
    fn active_camera_must_exist() {
        let mut scene = Scene::new();
        let cam = scene.create_node("cam", NodeKind::Camera);
        scene.set_active_camera(Some(cam)).unwrap();
        assert_eq!(scene.active_camera(), Some(cam));
        scene.destroy(cam).unwrap();
        assert_eq!(scene.active_camera(), None);
        assert_eq!(
            scene.set_active_camera(Some(cam)),
            Err(Error::InvalidNode(cam))
        );
    }
}
