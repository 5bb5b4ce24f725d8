//! The per-node record stored within a [Scene](crate::Scene).
//!
//! A [Node] only holds state. Anything that must look at other nodes (transform rebuilds,
//! hierarchy changes, dirty propagation) is an operation of the scene, keyed by [NodeId].

use nalgebra::Vector3;

use crate::{
    animation::NodeAnimationState,
    matrix::{Matrix, MatrixKind},
    rotator::Rotator,
    skin::SkinMeshData,
    NodeId,
};

/// A party interested in changes to a node's global transform.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TransformListener {
    /// A node whose rotation target is the transformed node.
    Tracker(NodeId),
    /// A skin mesh node with a skin section bound to the transformed bone.
    SkinnedBone(NodeId),
}

/// State specific to bone nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct BoneData {
    /// Global transform relative to the enclosing soft body. Dirty with the bone's transform.
    pub(crate) skeletal: Matrix,
    /// Inverse of `skeletal` as captured when the rest pose was last bound.
    pub(crate) rest_pose_inverted: Matrix,
}

impl Default for BoneData {
    fn default() -> Self {
        let mut skeletal = Matrix::identity();
        skeletal.set_is_dirty(true);
        Self {
            skeletal,
            rest_pose_inverted: Matrix::identity(),
        }
    }
}

impl BoneData {
    #[inline]
    pub fn rest_pose_skeletal_transform_matrix_inverted(&self) -> &Matrix {
        &self.rest_pose_inverted
    }
}

/// What a node is, beyond a plain transform.
#[derive(Debug, Clone, Default)]
pub enum NodeKind {
    #[default]
    Plain,
    /// Scale is reserved for field-of-view and never applied to the transform, and the forward
    /// direction is not reversed.
    Camera,
    /// The root of a skeleton; bone and skin transforms are measured relative to it.
    SoftBody,
    Bone(BoneData),
    SkinMesh(SkinMeshData),
}

impl NodeKind {
    /// A new bone.
    pub fn bone() -> Self {
        Self::Bone(BoneData::default())
    }

    /// A new skin mesh node over `mesh`, with no skin sections.
    pub fn skin_mesh(mesh: std::sync::Arc<dyn crate::skin::SkinMesh>) -> Self {
        Self::SkinMesh(SkinMeshData::new(mesh))
    }

    #[inline]
    pub fn is_camera(&self) -> bool {
        matches!(self, Self::Camera)
    }

    #[inline]
    pub fn is_soft_body(&self) -> bool {
        matches!(self, Self::SoftBody)
    }

    #[inline]
    pub fn is_bone(&self) -> bool {
        matches!(self, Self::Bone(_))
    }

    #[inline]
    pub fn is_skin_mesh(&self) -> bool {
        matches!(self, Self::SkinMesh(_))
    }
}

/// A transformable member of a scene graph.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) tag: u32,
    pub(crate) kind: NodeKind,

    pub(crate) location: Vector3<f32>,
    pub(crate) scale: Vector3<f32>,
    pub(crate) rotator: Rotator,

    /// Created on first use; an explicitly set local matrix is kept clean until the next
    /// transform change.
    pub(crate) local: Option<Matrix>,
    pub(crate) global: Matrix,
    pub(crate) global_inverted: Option<Matrix>,
    pub(crate) global_rotation: Option<Matrix>,
    pub(crate) global_rebuilds: u64,

    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,

    pub(crate) is_visible: bool,
    pub(crate) is_running: bool,
    pub(crate) should_autoremove_when_empty: bool,
    pub(crate) z_order: i32,

    pub(crate) animation_states: Vec<NodeAnimationState>,
    pub(crate) is_animation_dirty: bool,

    pub(crate) listeners: Vec<TransformListener>,
}

impl Node {
    pub(crate) fn new(name: impl Into<String>, tag: u32, kind: NodeKind) -> Self {
        let mut global = Matrix::new(MatrixKind::Affine);
        global.set_is_dirty(true);
        Self {
            name: name.into(),
            tag,
            kind,
            location: Vector3::zeros(),
            scale: Vector3::repeat(1.0),
            rotator: Rotator::default(),
            local: None,
            global,
            global_inverted: None,
            global_rotation: None,
            global_rebuilds: 0,
            parent: None,
            children: Vec::new(),
            is_visible: true,
            is_running: false,
            should_autoremove_when_empty: false,
            z_order: 0,
            animation_states: Vec::new(),
            is_animation_dirty: false,
            listeners: Vec::new(),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn tag(&self) -> u32 {
        self.tag
    }

    #[inline]
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    #[inline]
    pub fn location(&self) -> &Vector3<f32> {
        &self.location
    }

    #[inline]
    pub fn scale(&self) -> &Vector3<f32> {
        &self.scale
    }

    #[inline]
    pub fn rotator(&self) -> &Rotator {
        &self.rotator
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Whether this node itself is flagged visible, regardless of its ancestors.
    #[inline]
    pub fn is_visible_locally(&self) -> bool {
        self.is_visible
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.is_running
    }

    #[inline]
    pub fn should_autoremove_when_empty(&self) -> bool {
        self.should_autoremove_when_empty
    }

    #[inline]
    pub fn is_uniformly_scaled_locally(&self) -> bool {
        self.scale.x == self.scale.y && self.scale.x == self.scale.z
    }

    /// The scale as a single value: the common component if uniform, or the ratio of the
    /// scale's length to that of the unit scale.
    pub fn uniform_scale(&self) -> f32 {
        if self.is_uniformly_scaled_locally() {
            self.scale.x
        } else {
            self.scale.norm() / 3.0f32.sqrt()
        }
    }

    /// Whether the global transform must be rebuilt before it is next read.
    #[inline]
    pub fn is_transform_dirty(&self) -> bool {
        self.global.is_dirty()
    }

    /// The number of times the global transform has been rebuilt.
    #[inline]
    pub fn global_rebuild_count(&self) -> u64 {
        self.global_rebuilds
    }

    #[inline]
    pub fn animation_states(&self) -> &[NodeAnimationState] {
        &self.animation_states
    }

    /// The animation state on `track`, if any.
    pub fn animation_state(&self, track: u32) -> Option<&NodeAnimationState> {
        self.animation_states.iter().find(|s| s.track() == track)
    }

    pub(crate) fn animation_state_mut(&mut self, track: u32) -> Option<&mut NodeAnimationState> {
        self.animation_states.iter_mut().find(|s| s.track() == track)
    }

    #[inline]
    pub fn is_animation_dirty(&self) -> bool {
        self.is_animation_dirty
    }

    #[inline]
    pub fn transform_listeners(&self) -> &[TransformListener] {
        &self.listeners
    }

    pub(crate) fn add_listener(&mut self, listener: TransformListener) {
        if !self.listeners.contains(&listener) {
            self.listeners.push(listener);
        }
    }

    pub(crate) fn remove_listener(&mut self, listener: TransformListener) {
        self.listeners.retain(|l| *l != listener);
    }

    /// Whether the forward direction of an undirected rotator points along `+Z` instead of `-Z`.
    #[inline]
    pub(crate) fn reverses_forward_direction(&self) -> bool {
        !self.kind.is_camera()
    }

    pub fn bone_data(&self) -> Option<&BoneData> {
        match &self.kind {
            NodeKind::Bone(b) => Some(b),
            _ => None,
        }
    }

    pub fn skin_mesh_data(&self) -> Option<&SkinMeshData> {
        match &self.kind {
            NodeKind::SkinMesh(s) => Some(s),
            _ => None,
        }
    }

    /// Mark every cached matrix derived from this node's transform as stale.
    ///
    /// Returns `false` if the global transform was already stale, in which case nothing
    /// downstream of it needs visiting.
    pub(crate) fn invalidate_transform(&mut self) -> bool {
        if let Some(local) = &mut self.local {
            local.set_is_dirty(true);
        }
        match &mut self.kind {
            NodeKind::Bone(b) => b.skeletal.set_is_dirty(true),
            NodeKind::SkinMesh(s) => s.invalidate(),
            NodeKind::Plain | NodeKind::Camera | NodeKind::SoftBody => (),
        }
        if self.global.is_dirty() {
            return false;
        }
        self.global.set_is_dirty(true);
        if let Some(m) = &mut self.global_inverted {
            m.set_is_dirty(true);
        }
        if let Some(m) = &mut self.global_rotation {
            m.set_is_dirty(true);
        }
        true
    }
}
