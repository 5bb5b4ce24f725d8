//! Scene-graph transform core: nodes with cached local and global transforms, lazily upgraded
//! rotators that can face other nodes, blended keyframe animation tracks, and skeletal skinning
//! relative to a soft-body root.
//!
//! Every node lives in a [Scene] and is addressed by a [NodeId]. Getters which may have to
//! rebuild a cached matrix take `&mut Scene`.
#![cfg_attr(not(debug_assertions), warn(missing_docs))]

pub mod animation;
pub mod error;
pub mod matrix;
pub mod node;
pub mod rotator;
pub mod scene;
pub mod skin;

pub use animation::{NodeAnimation, NodeAnimationState, Pose, TrackId, DEFAULT_TRACK};
pub use error::Error;
pub use matrix::{Matrix, MatrixKind, Ray};
pub use node::{Node, NodeKind, TransformListener};
pub use rotator::{Rotator, TargettingConstraint};
pub use scene::{HierarchyObserver, NodeId, Scene, SceneConfig, TagAllocator};
pub use skin::{SkinMesh, SkinSection, VertexSkin};
