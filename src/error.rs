use crate::NodeId;

/// Errors related to [Scenes](crate::Scene) and the nodes within them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("Attempted to access node {0}, which does not exist.")]
    InvalidNode(NodeId),
    #[error("Attempted to perform a bone-specific operation on non-bone node {0}.")]
    NotABone(NodeId),
    #[error("Attempted to perform a skin-specific operation on non-skin node {0}.")]
    NotASkinMesh(NodeId),
    #[error("Neither node {0} nor any of its ancestors is a soft body.")]
    NoSoftBody(NodeId),
    #[error("Animation time out of range: [0, 1] ∌ {0}")]
    AnimationTimeOutOfRange(f32),
    #[error("Attempted to point along a zero-length direction")]
    ZeroDirection,
    #[error("Attempted to point along a direction parallel to the reference up direction")]
    ParallelToUp,
    #[error("Attempted to make node {0} a child of itself")]
    SelfParent(NodeId),
    #[error("Attempted to add node {1} as a child of its own descendant {0}")]
    CyclicParent(NodeId, NodeId),
    #[error("Bone index out of range: 0..{count} ∌ {index}")]
    BoneIndexOutOfRange { index: usize, count: usize },
    #[error("Skin section index out of range: 0..{count} ∌ {index}")]
    SkinSectionOutOfRange { index: usize, count: usize },
    #[error("Vertex index out of range: {0}")]
    VertexOutOfRange(usize),
    #[error("Attempted to use an animation with no frames")]
    EmptyAnimation,
}
