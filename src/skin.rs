//! Skeletal deformation of skinned meshes.
//!
//! A skin mesh node holds a [SkinMesh] (the rest-pose vertices and their bone influences) and
//! a list of [SkinSections](SkinSection), each binding a contiguous run of vertices to an
//! ordered palette of bones. The matrices are evaluated by the [Scene](crate::Scene).

use std::{fmt::Debug, sync::Arc};

use nalgebra::Vector3;

use crate::{error::Error, matrix::Matrix, NodeId};

/// Read access to the rest-pose vertex data of a skinned mesh.
///
/// Each vertex has the same number of bone influences; an influence with zero weight
/// contributes nothing. Bone indices refer to the palette of the [SkinSection] containing the
/// vertex.
pub trait SkinMesh: Debug + Send + Sync {
    fn vertex_count(&self) -> usize;

    fn vertex_location_at(&self, vertex: usize) -> Vector3<f32>;

    /// The number of bone influences per vertex.
    fn vertex_bone_count(&self) -> usize;

    fn vertex_weight_for_bone_influence(&self, influence: usize, vertex: usize) -> f32;

    fn vertex_bone_index_for_bone_influence(&self, influence: usize, vertex: usize) -> usize;
}

/// An in-memory [SkinMesh].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VertexSkin {
    influences: usize,
    locations: Vec<Vector3<f32>>,
    weights: Vec<f32>,
    bone_indices: Vec<u32>,
}

impl VertexSkin {
    /// An empty mesh whose vertices each have `influences` bone influences.
    pub fn new(influences: usize) -> Self {
        Self {
            influences,
            ..Default::default()
        }
    }

    /// Append a vertex influenced by `(bone index, weight)` pairs, returning its index.
    ///
    /// Missing influences are padded with zero weight; extra influences are dropped.
    pub fn push_vertex(&mut self, location: Vector3<f32>, influences: &[(u32, f32)]) -> usize {
        self.locations.push(location);
        for i in 0..self.influences {
            let (bone, weight) = influences.get(i).copied().unwrap_or((0, 0.0));
            self.bone_indices.push(bone);
            self.weights.push(weight);
        }
        self.locations.len() - 1
    }

    pub fn with_vertex(mut self, location: Vector3<f32>, influences: &[(u32, f32)]) -> Self {
        self.push_vertex(location, influences);
        self
    }

    #[inline]
    fn slot(&self, influence: usize, vertex: usize) -> usize {
        vertex * self.influences + influence
    }
}

impl SkinMesh for VertexSkin {
    fn vertex_count(&self) -> usize {
        self.locations.len()
    }

    fn vertex_location_at(&self, vertex: usize) -> Vector3<f32> {
        self.locations.get(vertex).copied().unwrap_or_else(Vector3::zeros)
    }

    fn vertex_bone_count(&self) -> usize {
        self.influences
    }

    fn vertex_weight_for_bone_influence(&self, influence: usize, vertex: usize) -> f32 {
        self.weights
            .get(self.slot(influence, vertex))
            .copied()
            .unwrap_or(0.0)
    }

    fn vertex_bone_index_for_bone_influence(&self, influence: usize, vertex: usize) -> usize {
        self.bone_indices
            .get(self.slot(influence, vertex))
            .map(|i| *i as usize)
            .unwrap_or(0)
    }
}

/// A bone as used by one skin section, with its cached deformation matrix.
///
/// The matrix maps rest-pose vertices (in the skin node's frame) to their current deformed
/// location: `skinSkeletal⁻¹ · boneSkeletal · boneRestPose⁻¹ · skinSkeletal`.
#[derive(Debug, Clone, PartialEq)]
pub struct SkinnedBone {
    pub(crate) bone: NodeId,
    pub(crate) transform: Matrix,
}

impl SkinnedBone {
    pub fn new(bone: NodeId) -> Self {
        let mut transform = Matrix::identity();
        transform.set_is_dirty(true);
        Self { bone, transform }
    }

    #[inline]
    pub fn bone(&self) -> NodeId {
        self.bone
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.transform.is_dirty()
    }

    #[inline]
    pub fn mark_transform_dirty(&mut self) {
        self.transform.set_is_dirty(true);
    }
}

/// A contiguous run of vertices deformed by the same palette of bones.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SkinSection {
    vertex_start: usize,
    vertex_count: usize,
    pub(crate) skinned_bones: Vec<SkinnedBone>,
}

impl SkinSection {
    pub fn new(vertex_start: usize, vertex_count: usize) -> Self {
        Self {
            vertex_start,
            vertex_count,
            skinned_bones: Vec::new(),
        }
    }

    /// Append `bone` to the palette. Bones are checked when the section is added to a skin.
    pub fn with_bone(mut self, bone: NodeId) -> Self {
        self.push_bone(bone);
        self
    }

    #[inline]
    pub fn vertex_start(&self) -> usize {
        self.vertex_start
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    #[inline]
    pub fn contains_vertex_index(&self, vertex: usize) -> bool {
        vertex >= self.vertex_start && vertex < self.vertex_start + self.vertex_count
    }

    #[inline]
    pub fn bone_count(&self) -> usize {
        self.skinned_bones.len()
    }

    #[inline]
    pub fn has_skeleton(&self) -> bool {
        !self.skinned_bones.is_empty()
    }

    /// The bones of the palette, in palette order.
    pub fn bones(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.skinned_bones.iter().map(SkinnedBone::bone)
    }

    pub fn bone_at(&self, index: usize) -> Result<NodeId, Error> {
        self.skinned_bones
            .get(index)
            .map(SkinnedBone::bone)
            .ok_or(Error::BoneIndexOutOfRange {
                index,
                count: self.skinned_bones.len(),
            })
    }

    #[inline]
    pub fn skinned_bones(&self) -> &[SkinnedBone] {
        &self.skinned_bones
    }

    pub(crate) fn push_bone(&mut self, bone: NodeId) {
        self.skinned_bones.push(SkinnedBone::new(bone));
    }

    /// Mark the deformation of every palette entry for `bone` stale.
    pub(crate) fn mark_bone_dirty(&mut self, bone: NodeId) {
        for sb in self.skinned_bones.iter_mut().filter(|sb| sb.bone == bone) {
            sb.mark_transform_dirty();
        }
    }

    pub(crate) fn mark_all_dirty(&mut self) {
        self.skinned_bones
            .iter_mut()
            .for_each(SkinnedBone::mark_transform_dirty);
    }
}

/// Deform one rest-pose vertex: `Σ weightᵢ · transformᵢ(rest)`.
///
/// Weights are summed as given, without normalization.
pub fn deform_location<'m>(
    rest: &Vector3<f32>,
    influences: impl IntoIterator<Item = (f32, &'m Matrix)>,
) -> Vector3<f32> {
    influences
        .into_iter()
        .fold(Vector3::zeros(), |acc, (weight, transform)| {
            acc + transform.transform_location(rest) * weight
        })
}

/// State specific to skin mesh nodes.
#[derive(Debug, Clone)]
pub struct SkinMeshData {
    pub(crate) mesh: Arc<dyn SkinMesh>,
    pub(crate) sections: Vec<SkinSection>,
    /// Global transform relative to the enclosing soft body.
    pub(crate) skeletal: Matrix,
    pub(crate) skeletal_inverted: Matrix,
    pub(crate) has_rigid_skeleton: bool,
}

impl SkinMeshData {
    pub fn new(mesh: Arc<dyn SkinMesh>) -> Self {
        let mut skeletal = Matrix::identity();
        skeletal.set_is_dirty(true);
        Self {
            mesh,
            sections: Vec::new(),
            skeletal,
            skeletal_inverted: skeletal,
            has_rigid_skeleton: false,
        }
    }

    #[inline]
    pub fn mesh(&self) -> &Arc<dyn SkinMesh> {
        &self.mesh
    }

    #[inline]
    pub fn skin_sections(&self) -> &[SkinSection] {
        &self.sections
    }

    /// The index of the section containing `vertex`, if any.
    pub fn skin_section_for_vertex(&self, vertex: usize) -> Option<usize> {
        self.sections
            .iter()
            .position(|ss| ss.contains_vertex_index(vertex))
    }

    /// Whether any section is bound to at least one bone.
    pub fn has_skeleton(&self) -> bool {
        self.sections.iter().any(SkinSection::has_skeleton)
    }

    /// Whether [ensure_rigid_skeleton](crate::Scene::ensure_rigid_skeleton) found a skeleton.
    #[inline]
    pub fn has_rigid_skeleton(&self) -> bool {
        self.has_rigid_skeleton
    }

    pub(crate) fn invalidate(&mut self) {
        self.skeletal.set_is_dirty(true);
        self.skeletal_inverted.set_is_dirty(true);
        self.sections.iter_mut().for_each(SkinSection::mark_all_dirty);
    }

    pub(crate) fn mark_bone_dirty(&mut self, bone: NodeId) {
        for ss in &mut self.sections {
            ss.mark_bone_dirty(bone);
        }
    }

    pub(crate) fn references_bone(&self, bone: NodeId) -> bool {
        self.sections.iter().any(|ss| ss.bones().any(|b| b == bone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::Matrix;

    #[test]
    fn vertex_skin_pads_influences() {
        let mut skin = VertexSkin::new(2);
        let v = skin.push_vertex(Vector3::x(), &[(1, 0.75)]);
        assert_eq!(v, 0);
        assert_eq!(skin.vertex_bone_count(), 2);
        assert_eq!(skin.vertex_bone_index_for_bone_influence(0, 0), 1);
        assert_eq!(skin.vertex_weight_for_bone_influence(0, 0), 0.75);
        assert_eq!(skin.vertex_weight_for_bone_influence(1, 0), 0.0);
    }

    #[test]
    fn section_vertex_range() {
        let ss = SkinSection::new(4, 3);
        assert!(!ss.contains_vertex_index(3));
        assert!(ss.contains_vertex_index(4));
        assert!(ss.contains_vertex_index(6));
        assert!(!ss.contains_vertex_index(7));
        assert!(!ss.has_skeleton());
        assert_eq!(
            ss.bone_at(0),
            Err(Error::BoneIndexOutOfRange { index: 0, count: 0 })
        );
    }

    #[test]
    fn deformation_sums_weights() {
        let mut shift = Matrix::identity();
        shift.translate_by(&Vector3::new(2.0, 0.0, 0.0));
        let id = Matrix::identity();
        let rest = Vector3::new(1.0, 1.0, 0.0);
        let res = deform_location(&rest, [(0.5, &shift), (0.5, &id)]);
        assert_eq!(res, Vector3::new(2.0, 1.0, 0.0));
        // unnormalized weights are not corrected
        let res = deform_location(&rest, [(1.0, &id), (1.0, &id)]);
        assert_eq!(res, rest * 2.0);
    }
}
