//! Bones, soft bodies and skin deformation.

use nalgebra::Vector3;
use tracing::{debug, trace, warn};

use crate::{
    error::Error,
    matrix::Matrix,
    node::{NodeKind, TransformListener},
    skin::{deform_location, SkinMeshData, SkinSection},
    NodeId, Scene,
};

impl Scene {
    fn skin_data(&self, id: NodeId) -> Result<&SkinMeshData, Error> {
        self.node(id)?
            .skin_mesh_data()
            .ok_or(Error::NotASkinMesh(id))
    }

    fn skin_data_mut(&mut self, id: NodeId) -> Result<&mut SkinMeshData, Error> {
        match &mut self.node_mut(id)?.kind {
            NodeKind::SkinMesh(s) => Ok(s),
            _ => Err(Error::NotASkinMesh(id)),
        }
    }

    /// The skin section at `index` of skin mesh node `skin`.
    pub fn skin_section(&self, skin: NodeId, index: usize) -> Result<&SkinSection, Error> {
        let data = self.skin_data(skin)?;
        data.sections
            .get(index)
            .ok_or(Error::SkinSectionOutOfRange {
                index,
                count: data.sections.len(),
            })
    }

    /// The nearest soft body at or above `id`.
    pub fn soft_body_node(&self, id: NodeId) -> Result<NodeId, Error> {
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.node(c)?;
            if node.kind.is_soft_body() {
                return Ok(c);
            }
            current = node.parent;
        }
        Err(Error::NoSoftBody(id))
    }

    /// The global transform relative to the enclosing soft body.
    fn skeletal_matrix_of(&mut self, id: NodeId) -> Result<Matrix, Error> {
        let soft_body = self.soft_body_node(id)?;
        let mut m = *self.global_transform_matrix(id)?;
        let inv = *self.global_transform_matrix_inverted(soft_body)?;
        m.left_multiply_by(&inv);
        m.set_is_dirty(false);
        trace!(node = %id, soft_body = %soft_body, "rebuilt skeletal transform");
        Ok(m)
    }

    /// The transform of bone `id` relative to its soft body, rebuilt if stale.
    ///
    /// # Errors
    /// * `id` is not a bone
    /// * `id` has no soft body
    pub fn bone_skeletal_transform_matrix(&mut self, id: NodeId) -> Result<Matrix, Error> {
        let stale = match &self.node(id)?.kind {
            NodeKind::Bone(b) => b.skeletal.is_dirty(),
            _ => return Err(Error::NotABone(id)),
        };
        if !stale {
            if let NodeKind::Bone(b) = &self.node(id)?.kind {
                return Ok(b.skeletal);
            }
        }
        let m = self.skeletal_matrix_of(id)?;
        if let NodeKind::Bone(b) = &mut self.node_mut(id)?.kind {
            b.skeletal = m;
        }
        Ok(m)
    }

    /// Record the current skeletal transform of every bone in the subtree at `id` as its rest
    /// pose.
    pub fn bind_rest_pose(&mut self, id: NodeId) -> Result<(), Error> {
        for n in self.flatten(id)? {
            if !self.node(n)?.kind.is_bone() {
                continue;
            }
            let rest = self.bone_skeletal_transform_matrix(n)?.inverse();
            if let NodeKind::Bone(b) = &mut self.node_mut(n)?.kind {
                b.rest_pose_inverted = rest;
            }
            // deformations against the old rest pose are stale
            self.mark_skins_dirty_for_bone(n)?;
        }
        debug!(node = %id, "bound rest pose");
        Ok(())
    }

    fn mark_skins_dirty_for_bone(&mut self, bone: NodeId) -> Result<(), Error> {
        let skins: Vec<NodeId> = self
            .node(bone)?
            .listeners
            .iter()
            .filter_map(|l| match l {
                TransformListener::SkinnedBone(s) => Some(*s),
                TransformListener::Tracker(_) => None,
            })
            .collect();
        for skin in skins {
            if let Ok(data) = self.skin_data_mut(skin) {
                data.mark_bone_dirty(bone);
            }
        }
        Ok(())
    }

    /// The transform of skin mesh `id` relative to its soft body, rebuilt if stale.
    pub fn skin_skeletal_transform_matrix(&mut self, id: NodeId) -> Result<Matrix, Error> {
        if !self.skin_data(id)?.skeletal.is_dirty() {
            return Ok(self.skin_data(id)?.skeletal);
        }
        let m = self.skeletal_matrix_of(id)?;
        let data = self.skin_data_mut(id)?;
        data.skeletal = m;
        data.skeletal_inverted.set_is_dirty(true);
        Ok(m)
    }

    pub fn skin_skeletal_transform_matrix_inverted(&mut self, id: NodeId) -> Result<Matrix, Error> {
        let skeletal = self.skin_skeletal_transform_matrix(id)?;
        let data = self.skin_data_mut(id)?;
        if data.skeletal_inverted.is_dirty() {
            let mut inv = skeletal.inverse();
            inv.set_is_dirty(false);
            data.skeletal_inverted = inv;
        }
        Ok(data.skeletal_inverted)
    }

    /// Append `section` to skin mesh `skin`, returning its index.
    pub fn add_skin_section(&mut self, skin: NodeId, section: SkinSection) -> Result<usize, Error> {
        for bone in section.bones() {
            if !self.node(bone)?.kind.is_bone() {
                return Err(Error::NotABone(bone));
            }
        }
        let bones: Vec<NodeId> = section.bones().collect();
        let data = self.skin_data_mut(skin)?;
        data.sections.push(section);
        let index = data.sections.len() - 1;
        data.sections[index].mark_all_dirty();
        for bone in bones {
            self.node_mut(bone)?
                .add_listener(TransformListener::SkinnedBone(skin));
        }
        Ok(index)
    }

    /// Append `bone` to the palette of a skin section.
    pub fn add_bone_to_section(
        &mut self,
        skin: NodeId,
        section: usize,
        bone: NodeId,
    ) -> Result<(), Error> {
        if !self.node(bone)?.kind.is_bone() {
            return Err(Error::NotABone(bone));
        }
        self.skin_section(skin, section)?;
        self.skin_data_mut(skin)?.sections[section].push_bone(bone);
        self.node_mut(bone)?
            .add_listener(TransformListener::SkinnedBone(skin));
        Ok(())
    }

    /// The deformation applied to vertices by bone `bone_index` of a skin section:
    /// `skinSkeletal⁻¹ · boneSkeletal · boneRestPose⁻¹ · skinSkeletal`.
    pub fn transform_matrix_for_bone_at(
        &mut self,
        skin: NodeId,
        section: usize,
        bone_index: usize,
    ) -> Result<Matrix, Error> {
        let sb = self
            .skin_section(skin, section)?
            .skinned_bones()
            .get(bone_index)
            .cloned();
        let sb = match sb {
            Some(sb) => sb,
            None => {
                return Err(Error::BoneIndexOutOfRange {
                    index: bone_index,
                    count: self.skin_section(skin, section)?.bone_count(),
                })
            }
        };
        if !sb.is_dirty() {
            return Ok(sb.transform);
        }

        let bone_skeletal = self.bone_skeletal_transform_matrix(sb.bone)?;
        let rest_inv = match self.node(sb.bone)?.bone_data() {
            Some(b) => b.rest_pose_inverted,
            None => return Err(Error::NotABone(sb.bone)),
        };
        let skin_skeletal = self.skin_skeletal_transform_matrix(skin)?;
        let mut m = self.skin_skeletal_transform_matrix_inverted(skin)?;
        m.multiply_by(&bone_skeletal);
        m.multiply_by(&rest_inv);
        m.multiply_by(&skin_skeletal);
        m.set_is_dirty(false);

        self.skin_data_mut(skin)?.sections[section].skinned_bones[bone_index].transform = m;
        Ok(m)
    }

    /// The current location of a vertex of a skin section, in the skin node's frame.
    ///
    /// # Errors
    /// * `vertex` is not within the section
    /// * the vertex refers to a bone beyond the section's palette
    pub fn section_deformed_vertex_location_at(
        &mut self,
        skin: NodeId,
        section: usize,
        vertex: usize,
    ) -> Result<Vector3<f32>, Error> {
        if !self.skin_section(skin, section)?.contains_vertex_index(vertex) {
            return Err(Error::VertexOutOfRange(vertex));
        }
        let mesh = self.skin_data(skin)?.mesh.clone();
        if vertex >= mesh.vertex_count() {
            return Err(Error::VertexOutOfRange(vertex));
        }
        let mut influences = Vec::with_capacity(mesh.vertex_bone_count());
        for influence in 0..mesh.vertex_bone_count() {
            let weight = mesh.vertex_weight_for_bone_influence(influence, vertex);
            if weight == 0.0 {
                continue;
            }
            let bone_index = mesh.vertex_bone_index_for_bone_influence(influence, vertex);
            let m = self.transform_matrix_for_bone_at(skin, section, bone_index)?;
            influences.push((weight, m));
        }
        Ok(deform_location(
            &mesh.vertex_location_at(vertex),
            influences.iter().map(|(w, m)| (*w, m)),
        ))
    }

    /// The current location of a vertex of skin mesh `skin`, in the skin node's frame.
    pub fn deformed_vertex_location_at(
        &mut self,
        skin: NodeId,
        vertex: usize,
    ) -> Result<Vector3<f32>, Error> {
        let section = self
            .skin_data(skin)?
            .skin_section_for_vertex(vertex)
            .ok_or(Error::VertexOutOfRange(vertex))?;
        self.section_deformed_vertex_location_at(skin, section, vertex)
    }

    /// Whether every bone of a skin section has a rigid skeletal transform. A section with no
    /// bones is not rigid.
    pub fn section_has_rigid_skeleton(&mut self, skin: NodeId, section: usize) -> Result<bool, Error> {
        let bones: Vec<NodeId> = self.skin_section(skin, section)?.bones().collect();
        if bones.is_empty() {
            return Ok(false);
        }
        for bone in bones {
            if !self.bone_skeletal_transform_matrix(bone)?.is_rigid() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Give every bone in the subtree unit uniform scale and stop its scale from being
    /// animated, and let skin meshes with a skeleton rely on that.
    pub fn ensure_rigid_skeleton(&mut self, id: NodeId) -> Result<(), Error> {
        for n in self.flatten(id)? {
            let (is_bone, is_skin) = {
                let kind = &self.node(n)?.kind;
                (kind.is_bone(), kind.is_skin_mesh())
            };
            if is_bone {
                let tracks: Vec<_> = self
                    .node(n)?
                    .animation_states
                    .iter()
                    .map(|s| s.track())
                    .collect();
                for track in tracks {
                    self.set_is_scale_animation_enabled(n, track, false)?;
                }
                self.set_uniform_scale(n, 1.0)?;
            } else if is_skin {
                let data = self.skin_data_mut(n)?;
                data.has_rigid_skeleton = data.has_skeleton();
            }
        }
        Ok(())
    }

    /// The scale of `id` relative to its soft body.
    pub fn skeletal_scale(&self, id: NodeId) -> Result<Vector3<f32>, Error> {
        let node = self.node(id)?;
        if node.kind.is_soft_body() {
            return Ok(Vector3::repeat(1.0));
        }
        match node.parent {
            Some(p) => Ok(self.skeletal_scale(p)?.component_mul(&node.scale)),
            None => Ok(node.scale),
        }
    }

    /// Whether the subtree at `id` contains any bone or skin mesh.
    pub fn has_soft_body_content(&self, id: NodeId) -> Result<bool, Error> {
        for n in self.flatten(id)? {
            let kind = &self.node(n)?.kind;
            if kind.is_bone() || kind.is_skin_mesh() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Rebind every skin section in the subtree at `id` to the bones of the same names found
    /// under `root`.
    ///
    /// Bones with no namesake under `root` are left bound as they were.
    pub fn reattach_bones_from(&mut self, id: NodeId, root: NodeId) -> Result<(), Error> {
        self.node(root)?;
        for skin in self.flatten(id)? {
            let old: Vec<Vec<NodeId>> = match &self.node(skin)?.kind {
                NodeKind::SkinMesh(s) => s.sections.iter().map(|ss| ss.bones().collect()).collect(),
                _ => continue,
            };
            let mut new = Vec::with_capacity(old.len());
            for bones in &old {
                let mut section = Vec::with_capacity(bones.len());
                for &bone in bones {
                    let name = match self.node(bone) {
                        Ok(b) => b.name.clone(),
                        Err(_) => {
                            warn!(skin = %skin, bone = %bone, "skin section refers to a missing bone");
                            section.push(bone);
                            continue;
                        }
                    };
                    match self.node_named(root, &name)? {
                        Some(found) => section.push(found),
                        None => {
                            warn!(skin = %skin, bone = %name, "no bone of that name to reattach to");
                            section.push(bone);
                        }
                    }
                }
                new.push(section);
            }

            for &bone in old.iter().flatten() {
                if let Some(b) = self.nodes.get_mut(bone) {
                    b.remove_listener(TransformListener::SkinnedBone(skin));
                }
            }
            let data = self.skin_data_mut(skin)?;
            for (ss, bones) in data.sections.iter_mut().zip(&new) {
                for (sb, &bone) in ss.skinned_bones.iter_mut().zip(bones) {
                    sb.bone = bone;
                    sb.mark_transform_dirty();
                }
            }
            for &bone in new.iter().flatten() {
                if let Some(b) = self.nodes.get_mut(bone) {
                    b.add_listener(TransformListener::SkinnedBone(skin));
                }
            }
            debug!(skin = %skin, root = %root, "reattached bones");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::skin::VertexSkin;

    #[test]
    fn soft_body_is_found_above() {
        let mut scene = Scene::new();
        let body = scene.create_node("body", NodeKind::SoftBody);
        let bone = scene.create_node("bone", NodeKind::bone());
        let loose = scene.create_node("loose", NodeKind::bone());
        scene.add_child(body, bone).unwrap();
        assert_eq!(scene.soft_body_node(bone).unwrap(), body);
        assert_eq!(scene.soft_body_node(body).unwrap(), body);
        assert_eq!(scene.soft_body_node(loose), Err(Error::NoSoftBody(loose)));
        assert_eq!(
            scene.bone_skeletal_transform_matrix(body),
            Err(Error::NotABone(body))
        );
    }

    #[test]
    fn sections_only_take_bones() {
        let mut scene = Scene::new();
        let plain = scene.create_node("plain", NodeKind::Plain);
        let mesh = Arc::new(VertexSkin::new(1).with_vertex(Vector3::zeros(), &[(0, 1.0)]));
        let skin = scene.create_node("skin", NodeKind::skin_mesh(mesh));
        let ss = scene.add_skin_section(skin, SkinSection::new(0, 1)).unwrap();
        assert_eq!(
            scene.add_bone_to_section(skin, ss, plain),
            Err(Error::NotABone(plain))
        );
        assert_eq!(
            scene.skin_section(skin, 3).err(),
            Some(Error::SkinSectionOutOfRange { index: 3, count: 1 })
        );
        assert_eq!(
            scene.transform_matrix_for_bone_at(skin, ss, 0),
            Err(Error::BoneIndexOutOfRange { index: 0, count: 0 })
        );
        assert!(!scene.section_has_rigid_skeleton(skin, ss).unwrap());
    }

    #[test]
    fn skeletal_scale_stops_at_the_soft_body() {
        let mut scene = Scene::new();
        let top = scene.create_node("top", NodeKind::Plain);
        let body = scene.create_node("body", NodeKind::SoftBody);
        let bone = scene.create_node("bone", NodeKind::bone());
        scene.add_child(top, body).unwrap();
        scene.add_child(body, bone).unwrap();
        scene.set_uniform_scale(top, 4.0).unwrap();
        scene.set_uniform_scale(bone, 2.0).unwrap();
        assert_eq!(scene.skeletal_scale(bone).unwrap(), Vector3::repeat(2.0));
        assert!(scene.has_soft_body_content(top).unwrap());
        assert!(scene.has_soft_body_content(bone).unwrap());
        let empty = scene.create_node("empty", NodeKind::Plain);
        assert!(!scene.has_soft_body_content(empty).unwrap());
    }
}
