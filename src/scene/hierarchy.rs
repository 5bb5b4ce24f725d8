//! Parent/child structure, traversal, destruction and deep copies.

use std::fmt::Debug;

use nalgebra::Vector3;
use tracing::debug;

use crate::{
    animation::NodeAnimationState,
    error::Error,
    node::{NodeKind, TransformListener},
    NodeId, Scene,
};

/// Receives notice of structural changes below a node.
///
/// Each hook is called once for the new parent (or former parent) and once for every ancestor
/// above it.
pub trait HierarchyObserver: Debug {
    fn did_add_descendant(&mut self, _ancestor: NodeId, _descendant: NodeId) {}

    fn did_remove_descendant(&mut self, _ancestor: NodeId, _descendant: NodeId) {}
}

impl Scene {
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>, Error> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], Error> {
        Ok(&self.node(id)?.children)
    }

    /// The topmost ancestor of `id`, or `id` itself if it has no parent.
    pub fn root_ancestor(&self, id: NodeId) -> Result<NodeId, Error> {
        let mut current = id;
        while let Some(p) = self.node(current)?.parent {
            current = p;
        }
        Ok(current)
    }

    /// Whether `ancestor` lies strictly above `id`.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> Result<bool, Error> {
        let mut current = self.node(id)?.parent;
        while let Some(p) = current {
            if p == ancestor {
                return Ok(true);
            }
            current = self.node(p)?.parent;
        }
        Ok(false)
    }

    /// `id` followed by all its descendants, depth-first.
    pub fn flatten(&self, id: NodeId) -> Result<Vec<NodeId>, Error> {
        let mut res = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = self.node(current)?;
            res.push(current);
            stack.extend(node.children.iter().rev().copied());
        }
        Ok(res)
    }

    /// The first node in the subtree at `root` (including `root`) with the given name.
    pub fn node_named(&self, root: NodeId, name: &str) -> Result<Option<NodeId>, Error> {
        self.find_in_subtree(root, |id| Ok(self.node(id)?.name == name))
    }

    /// The first node in the subtree at `root` (including `root`) with the given tag.
    pub fn node_tagged(&self, root: NodeId, tag: u32) -> Result<Option<NodeId>, Error> {
        self.find_in_subtree(root, |id| Ok(self.node(id)?.tag == tag))
    }

    fn find_in_subtree(
        &self,
        root: NodeId,
        pred: impl Fn(NodeId) -> Result<bool, Error>,
    ) -> Result<Option<NodeId>, Error> {
        for id in self.flatten(root)? {
            if pred(id)? {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Make `child` the last child of `parent`, detaching it from any previous parent.
    ///
    /// Does nothing if `child` is already a child of `parent`.
    ///
    /// # Errors
    /// * `child == parent`
    /// * `parent` is a descendant of `child`
    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        if parent == child {
            return Err(Error::SelfParent(child));
        }
        self.node(parent)?;
        let old_parent = self.node(child)?.parent;
        if old_parent == Some(parent) {
            return Ok(());
        }
        if self.is_descendant_of(parent, child)? {
            return Err(Error::CyclicParent(parent, child));
        }
        if let Some(old) = old_parent {
            self.remove_child(old, child)?;
        }

        let running = {
            let p = self.node_mut(parent)?;
            p.children.push(child);
            p.is_running
        };
        self.node_mut(child)?.parent = Some(parent);
        self.set_is_running(child, running)?;
        self.mark_transform_dirty(child)?;
        debug!(parent = %parent, child = %child, "added child");
        self.notify_ancestors(parent, child, true)
    }

    /// Make `child` a child of `parent` without moving it: its local location, rotation and
    /// scale are rewritten so that its global pose is unchanged.
    pub fn add_and_localize_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        if parent == child {
            return Err(Error::SelfParent(child));
        }
        if self.is_descendant_of(parent, child)? {
            return Err(Error::CyclicParent(parent, child));
        }
        let child_global = *self.global_transform_matrix(child)?;
        let child_rotation = *self.global_rotation_matrix(child)?;
        let child_scale = self.global_scale(child)?;

        let mut relative = *self.global_transform_matrix_inverted(parent)?;
        relative.multiply_by(&child_global);
        // rotation-only matrices keep scale from leaking into the extracted rotation
        let mut relative_rotation = *self.global_rotation_matrix(parent)?;
        relative_rotation.transpose();
        relative_rotation.multiply_by(&child_rotation);
        let scale = child_scale.component_div(&self.global_scale(parent)?);

        self.set_location(child, relative.transform_location(&Vector3::zeros()))?;
        self.set_quaternion(child, relative_rotation.extract_quaternion())?;
        self.set_scale(child, scale)?;
        self.add_child(parent, child)
    }

    /// Detach `child` from `parent`. Does nothing if it is not a child of `parent`.
    ///
    /// If this leaves `parent` empty and it is set to autoremove, `parent` is itself removed
    /// from its own parent.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), Error> {
        let p = self.node_mut(parent)?;
        let pos = match p.children.iter().position(|c| *c == child) {
            Some(pos) => pos,
            None => return Ok(()),
        };
        p.children.remove(pos);
        let now_empty = p.children.is_empty() && p.should_autoremove_when_empty;

        if let Some(c) = self.nodes.get_mut(child) {
            c.parent = None;
            self.set_is_running(child, false)?;
            self.mark_transform_dirty(child)?;
        }
        debug!(parent = %parent, child = %child, "removed child");
        self.notify_ancestors(parent, child, false)?;

        if now_empty {
            debug!(node = %parent, "removing empty node");
            self.remove(parent)?;
        }
        Ok(())
    }

    pub fn remove_all_children(&mut self, parent: NodeId) -> Result<(), Error> {
        let children = self.node(parent)?.children.clone();
        for child in children {
            self.remove_child(parent, child)?;
        }
        Ok(())
    }

    /// Detach `id` from its parent, if it has one.
    pub fn remove(&mut self, id: NodeId) -> Result<(), Error> {
        match self.node(id)?.parent {
            Some(p) => self.remove_child(p, id),
            None => Ok(()),
        }
    }

    fn notify_ancestors(&mut self, parent: NodeId, node: NodeId, added: bool) -> Result<(), Error> {
        if self.observer.is_none() {
            return Ok(());
        }
        let mut ancestors = vec![parent];
        let mut current = parent;
        while let Some(p) = self.node(current)?.parent {
            ancestors.push(p);
            current = p;
        }
        if let Some(observer) = &mut self.observer {
            for ancestor in ancestors {
                match added {
                    true => observer.did_add_descendant(ancestor, node),
                    false => observer.did_remove_descendant(ancestor, node),
                }
            }
        }
        Ok(())
    }

    /// Detach `id`, then drop it and all its descendants from the scene.
    ///
    /// Nodes facing a destroyed node lose their target.
    pub fn destroy(&mut self, id: NodeId) -> Result<(), Error> {
        self.remove(id)?;
        let subtree = self.flatten(id)?;
        for &n in &subtree {
            let node = match self.nodes.remove(n) {
                Some(node) => node,
                None => continue,
            };
            if let Some(t) = node.rotator.target() {
                if let Some(tn) = self.nodes.get_mut(t) {
                    tn.remove_listener(TransformListener::Tracker(n));
                }
            }
            if let NodeKind::SkinMesh(skin) = &node.kind {
                for bone in skin.sections.iter().flat_map(|ss| ss.bones()) {
                    if let Some(b) = self.nodes.get_mut(bone) {
                        b.remove_listener(TransformListener::SkinnedBone(n));
                    }
                }
            }
            for listener in node.listeners {
                if let TransformListener::Tracker(tracker) = listener {
                    if let Some(t) = self.nodes.get_mut(tracker) {
                        if t.rotator.clear_if_target(n) {
                            debug!(node = %tracker, target = %n, "cleared destroyed target");
                        }
                    }
                }
            }
            if self.active_camera == Some(n) {
                self.active_camera = None;
            }
        }
        debug!(node = %id, count = subtree.len(), "destroyed subtree");
        Ok(())
    }

    /// Whether `id` and all its ancestors are visible.
    pub fn is_visible(&self, id: NodeId) -> Result<bool, Error> {
        let mut current = Some(id);
        while let Some(c) = current {
            let node = self.node(c)?;
            if !node.is_visible {
                return Ok(false);
            }
            current = node.parent;
        }
        Ok(true)
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) -> Result<(), Error> {
        self.node_mut(id)?.is_visible = visible;
        Ok(())
    }

    /// Set whether `id` and its whole subtree are running.
    pub fn set_is_running(&mut self, id: NodeId, running: bool) -> Result<(), Error> {
        for n in self.flatten(id)? {
            self.node_mut(n)?.is_running = running;
        }
        Ok(())
    }

    pub fn set_should_autoremove_when_empty(
        &mut self,
        id: NodeId,
        autoremove: bool,
    ) -> Result<(), Error> {
        self.node_mut(id)?.should_autoremove_when_empty = autoremove;
        Ok(())
    }

    /// The node's own drawing order if it is a leaf, otherwise the integer average over its
    /// children.
    pub fn z_order(&self, id: NodeId) -> Result<i32, Error> {
        let node = self.node(id)?;
        if node.children.is_empty() {
            return Ok(node.z_order);
        }
        let mut sum = 0i64;
        for &c in &node.children {
            sum += i64::from(self.z_order(c)?);
        }
        Ok((sum / node.children.len() as i64) as i32)
    }

    /// Set the drawing order of every leaf in the subtree.
    pub fn set_z_order(&mut self, id: NodeId, z_order: i32) -> Result<(), Error> {
        let children = self.node(id)?.children.clone();
        if children.is_empty() {
            self.node_mut(id)?.z_order = z_order;
        }
        for c in children {
            self.set_z_order(c, z_order)?;
        }
        Ok(())
    }

    /// Deep-copy the subtree at `id`. The copy is not attached to any parent.
    ///
    /// Skin sections within a copied soft body are relinked to the copied bones.
    pub fn copy_node(&mut self, id: NodeId) -> Result<NodeId, Error> {
        let name = self.node(id)?.name.clone();
        self.copy_node_named(id, name)
    }

    pub fn copy_node_named(&mut self, id: NodeId, name: impl Into<String>) -> Result<NodeId, Error> {
        let src = self.node(id)?;
        let mut kind = src.kind.clone();
        match &mut kind {
            NodeKind::Bone(b) => b.skeletal.set_is_dirty(true),
            NodeKind::SkinMesh(s) => s.invalidate(),
            NodeKind::Plain | NodeKind::Camera | NodeKind::SoftBody => (),
        }
        let rotator = src.rotator.clone();
        let states: Vec<NodeAnimationState> = src
            .animation_states
            .iter()
            .map(|s| {
                let mut copy = NodeAnimationState::new(s.animation().clone(), s.track());
                copy.set_blending_weight(s.blending_weight());
                copy.set_is_enabled(s.is_enabled());
                copy
            })
            .collect();
        let (location, scale, visible, running, autoremove, z_order) = (
            src.location,
            src.scale,
            src.is_visible,
            src.is_running,
            src.should_autoremove_when_empty,
            src.z_order,
        );
        let children = src.children.clone();

        let copy = self.create_node(name, kind);
        {
            let node = self.node_mut(copy)?;
            node.location = location;
            node.scale = scale;
            node.rotator = rotator;
            node.is_animation_dirty = !states.is_empty();
            node.animation_states = states;
            node.is_visible = visible;
            node.is_running = running;
            node.should_autoremove_when_empty = autoremove;
            node.z_order = z_order;
        }
        if let Some(t) = self.node(copy)?.rotator.target() {
            if let Some(tn) = self.nodes.get_mut(t) {
                tn.add_listener(TransformListener::Tracker(copy));
            }
        }
        let bones: Vec<NodeId> = match &self.node(copy)?.kind {
            NodeKind::SkinMesh(s) => s.sections.iter().flat_map(|ss| ss.bones()).collect(),
            _ => Vec::new(),
        };
        for bone in bones {
            if let Some(b) = self.nodes.get_mut(bone) {
                b.add_listener(TransformListener::SkinnedBone(copy));
            }
        }

        for child in children {
            let c = self.copy_node(child)?;
            self.add_child(copy, c)?;
        }
        if self.node(copy)?.kind.is_soft_body() {
            self.reattach_bones_from(copy, copy)?;
        }
        Ok(copy)
    }
}
