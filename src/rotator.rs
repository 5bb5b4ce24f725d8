//! Node orientation.
//!
//! A [Rotator] starts out as [Rotator::NoRotation] and is upgraded in place, carrying all prior
//! state forward, the first time a richer capability is requested:
//!
//! `NoRotation` → `Mutable` → `Directional` → `Targetting`

use nalgebra::{Quaternion, Vector3, Vector4};

use crate::{
    error::Error,
    matrix::{
        axis_angle_from_quaternion, quaternion_from_axis_angle, Matrix, MatrixKind,
    },
    NodeId,
};

/// How the current rotation of a [MutableRotation] was last specified.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RotationType {
    /// Rotated incrementally, or populated from a matrix; only the matrix is authoritative.
    #[default]
    Unknown,
    Euler,
    Quaternion,
    AxisAngle,
    Direction,
    Location,
}

/// Restricts the axes about which a node may turn to face its target.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TargettingConstraint {
    LocalUnconstrained,
    LocalXAxis,
    LocalYAxis,
    LocalZAxis,
    #[default]
    GlobalUnconstrained,
    GlobalXAxis,
    GlobalYAxis,
    GlobalZAxis,
}

impl TargettingConstraint {
    /// Whether targetting happens in the global coordinate system.
    #[inline]
    pub fn is_global(self) -> bool {
        matches!(
            self,
            Self::GlobalUnconstrained | Self::GlobalXAxis | Self::GlobalYAxis | Self::GlobalZAxis
        )
    }

    /// The axis rotation is restricted to, if any: 0, 1 or 2 for X, Y or Z.
    #[inline]
    pub fn axis(self) -> Option<usize> {
        match self {
            Self::LocalXAxis | Self::GlobalXAxis => Some(0),
            Self::LocalYAxis | Self::GlobalYAxis => Some(1),
            Self::LocalZAxis | Self::GlobalZAxis => Some(2),
            Self::LocalUnconstrained | Self::GlobalUnconstrained => None,
        }
    }

    /// Replace the coordinate of `target` along the constrained axis (if any) with that of
    /// `eye`, so that turning towards the result only rotates about that axis.
    pub fn restrict(self, target: &Vector3<f32>, eye: &Vector3<f32>) -> Vector3<f32> {
        let mut res = *target;
        if let Some(axis) = self.axis() {
            res[axis] = eye[axis];
        }
        res
    }
}

/// Rotation state that can be set by Euler angles, quaternion or axis/angle, and incrementally
/// rotated.
#[derive(Debug, Clone, PartialEq)]
pub struct MutableRotation {
    /// Meaning depends on `rotation_type`: Euler angles (xyz), a quaternion (xyzw), an axis and
    /// angle (xyz, w), a forward direction (xyz) or a target location (xyz).
    rotation_vector: Vector4<f32>,
    rotation_type: RotationType,
    matrix: Matrix,
    ortho_start_column: u8,
    incremental_rotation_count: u8,
    auto_orthonormalize_count: u8,
}

impl Default for MutableRotation {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MutableRotation {
    /// `auto_orthonormalize_count` is the number of incremental rotations after which the
    /// rotation matrix is re-orthonormalized; 0 disables this.
    pub fn new(auto_orthonormalize_count: u8) -> Self {
        Self {
            rotation_vector: Vector4::zeros(),
            rotation_type: RotationType::Unknown,
            matrix: Matrix::new(MatrixKind::Linear),
            ortho_start_column: 1,
            incremental_rotation_count: 0,
            auto_orthonormalize_count,
        }
    }

    #[inline]
    pub fn rotation_type(&self) -> RotationType {
        self.rotation_type
    }

    #[inline]
    pub fn rotation_vector(&self) -> &Vector4<f32> {
        &self.rotation_vector
    }

    /// Whether the rotation matrix is stale relative to the stored rotation.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.matrix.is_dirty()
    }

    #[inline]
    pub fn mark_dirty(&mut self) {
        self.matrix.set_is_dirty(true);
    }

    #[inline]
    pub fn mark_clean(&mut self) {
        self.matrix.set_is_dirty(false);
    }

    #[inline]
    pub fn auto_orthonormalize_count(&self) -> u8 {
        self.auto_orthonormalize_count
    }

    #[inline]
    pub fn set_auto_orthonormalize_count(&mut self, count: u8) {
        self.auto_orthonormalize_count = count;
    }

    /// Set Euler angles in degrees; each component is reduced modulo 360.
    pub fn set_rotation(&mut self, rotation: &Vector3<f32>) {
        let r = rotation.map(|c| c % 360.0);
        self.rotation_vector = Vector4::new(r.x, r.y, r.z, 0.0);
        self.rotation_type = RotationType::Euler;
        self.mark_dirty();
    }

    pub fn set_quaternion(&mut self, q: &Quaternion<f32>) {
        self.rotation_vector = q.coords;
        self.rotation_type = RotationType::Quaternion;
        self.mark_dirty();
    }

    /// Set an axis and an angle in degrees.
    pub fn set_axis_angle(&mut self, axis: &Vector3<f32>, angle: f32) {
        self.rotation_vector = Vector4::new(axis.x, axis.y, axis.z, angle);
        self.rotation_type = RotationType::AxisAngle;
        self.mark_dirty();
    }

    /// Replace the rotation matrix outright.
    pub fn set_rotation_matrix(&mut self, matrix: &Matrix) {
        self.matrix.populate_from(matrix);
        self.rotation_type = RotationType::Unknown;
        self.mark_clean();
    }

    /// The rotation matrix, without bringing it up to date.
    #[inline]
    pub fn raw_matrix(&self) -> &Matrix {
        &self.matrix
    }

    /// Left-multiply the rotation matrix by `other`, leaving the rotation type untouched.
    ///
    /// Used to re-express a rotation computed in the global frame in a parent's local frame.
    pub fn left_multiply_matrix_by(&mut self, other: &Matrix) {
        self.matrix.left_multiply_by(other);
    }

    /// Rebuild the matrix from the stored rotation, for the rotation types that need nothing
    /// beyond the stored vector.
    fn apply_own_rotation(&mut self) {
        match self.rotation_type {
            RotationType::Euler => self.matrix.populate_from_rotation(&self.rotation_vector.xyz()),
            RotationType::Quaternion => {
                let q = Quaternion::from(self.rotation_vector);
                self.matrix.populate_from_quaternion(&q);
            }
            RotationType::AxisAngle => {
                let q = quaternion_from_axis_angle(&self.rotation_vector);
                self.matrix.populate_from_quaternion(&q);
            }
            RotationType::Direction | RotationType::Location | RotationType::Unknown => (),
        }
    }

    /// Apply an incremental change to an up-to-date matrix.
    fn rotate_matrix(&mut self, f: impl FnOnce(&mut Matrix)) {
        f(&mut self.matrix);
        self.auto_orthonormalize();
        self.rotation_type = RotationType::Unknown;
        self.mark_clean();
    }

    fn auto_orthonormalize(&mut self) {
        if self.auto_orthonormalize_count > 0 {
            self.incremental_rotation_count += 1;
            if self.incremental_rotation_count >= self.auto_orthonormalize_count {
                self.orthonormalize();
            }
        }
    }

    /// Remove accumulated numerical drift from the rotation matrix. Successive calls start from
    /// successive columns, so that no single axis is always favoured.
    pub fn orthonormalize(&mut self) {
        self.matrix
            .orthonormalize_rotation_starting_with(self.ortho_start_column);
        self.ortho_start_column = if self.ortho_start_column < 3 {
            self.ortho_start_column + 1
        } else {
            1
        };
        self.incremental_rotation_count = 0;
    }
}

/// Rotation state which can additionally point along a forward direction.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionalRotation {
    base: MutableRotation,
    reference_up_direction: Vector3<f32>,
    should_reverse_forward_direction: bool,
}

impl DirectionalRotation {
    pub fn new(base: MutableRotation, should_reverse_forward_direction: bool) -> Self {
        Self {
            base,
            reference_up_direction: Vector3::y(),
            should_reverse_forward_direction,
        }
    }

    #[inline]
    pub fn base(&self) -> &MutableRotation {
        &self.base
    }

    #[inline]
    pub fn base_mut(&mut self) -> &mut MutableRotation {
        &mut self.base
    }

    #[inline]
    pub fn reference_up_direction(&self) -> &Vector3<f32> {
        &self.reference_up_direction
    }

    /// # Errors
    /// * `up` is zero-length
    pub fn set_reference_up_direction(&mut self, up: &Vector3<f32>) -> Result<(), Error> {
        self.reference_up_direction = up.try_normalize(0.0).ok_or(Error::ZeroDirection)?;
        self.base.mark_dirty();
        Ok(())
    }

    #[inline]
    pub fn should_reverse_forward_direction(&self) -> bool {
        self.should_reverse_forward_direction
    }

    #[inline]
    pub fn set_should_reverse_forward_direction(&mut self, reverse: bool) {
        self.should_reverse_forward_direction = reverse;
    }

    /// # Errors
    /// * `direction` is zero-length
    pub fn set_forward_direction(&mut self, direction: &Vector3<f32>) -> Result<(), Error> {
        let d = direction.try_normalize(0.0).ok_or(Error::ZeroDirection)?;
        self.base.rotation_vector = Vector4::new(d.x, d.y, d.z, 0.0);
        self.base.rotation_type = RotationType::Direction;
        self.base.mark_dirty();
        Ok(())
    }

    /// The location being looked at, if the rotation was last set that way.
    pub fn target_location(&self) -> Option<Vector3<f32>> {
        match self.base.rotation_type {
            RotationType::Location => Some(self.base.rotation_vector.xyz()),
            _ => None,
        }
    }

    pub fn set_target_location(&mut self, location: &Vector3<f32>) {
        self.base.rotation_vector = Vector4::new(location.x, location.y, location.z, 1.0);
        self.base.rotation_type = RotationType::Location;
        self.base.mark_dirty();
    }

    /// Point from `eye` towards `target` (away from it if reversing), using `up` as the
    /// reference up direction.
    ///
    /// Returns `false`, keeping the previous orientation, if `target == eye` or if the
    /// direction to the target is parallel to `up`.
    pub fn rotate_to_target_location(
        &mut self,
        target: &Vector3<f32>,
        eye: &Vector3<f32>,
        up: &Vector3<f32>,
    ) -> bool {
        let fwd = if self.should_reverse_forward_direction {
            eye - target
        } else {
            target - eye
        };
        if fwd.cross(up).norm() <= armature_common::EPSILON {
            tracing::debug!(?target, ?eye, "target lies along the up axis; keeping orientation");
            self.base.mark_clean();
            return false;
        }
        self.base.matrix.populate_to_point_towards(&fwd, up);
        self.base.mark_clean();
        true
    }

    fn apply_rotation(&mut self) -> Result<(), Error> {
        match self.base.rotation_type {
            RotationType::Direction => {
                let fwd = self.base.rotation_vector.xyz();
                if fwd.cross(&self.reference_up_direction).norm() <= armature_common::EPSILON {
                    return Err(Error::ParallelToUp);
                }
                let fwd = if self.should_reverse_forward_direction {
                    -fwd
                } else {
                    fwd
                };
                self.base
                    .matrix
                    .populate_to_point_towards(&fwd, &self.reference_up_direction);
            }
            _ => self.base.apply_own_rotation(),
        }
        Ok(())
    }
}

/// Rotation state which can additionally turn to face another node.
#[derive(Debug, Clone, PartialEq)]
pub struct TargettingRotation {
    directional: DirectionalRotation,
    target: Option<NodeId>,
    target_constraint: TargettingConstraint,
    is_new_target: bool,
    should_track_target: bool,
    should_autotarget_camera: bool,
    is_tracking_for_bump_mapping: bool,
}

impl TargettingRotation {
    pub fn new(directional: DirectionalRotation) -> Self {
        Self {
            directional,
            target: None,
            target_constraint: TargettingConstraint::default(),
            is_new_target: false,
            should_track_target: false,
            should_autotarget_camera: false,
            is_tracking_for_bump_mapping: false,
        }
    }

    #[inline]
    pub fn directional(&self) -> &DirectionalRotation {
        &self.directional
    }

    #[inline]
    pub fn directional_mut(&mut self) -> &mut DirectionalRotation {
        &mut self.directional
    }

    #[inline]
    pub fn target(&self) -> Option<NodeId> {
        self.target
    }

    /// Set the node to face. Returns whether the target changed.
    pub fn set_target(&mut self, target: Option<NodeId>) -> bool {
        if self.target == target {
            return false;
        }
        self.target = target;
        self.is_new_target = target.is_some();
        true
    }

    /// Forget `node` if it is the current target. Returns whether it was.
    pub fn clear_if_target(&mut self, node: NodeId) -> bool {
        if self.target == Some(node) {
            self.target = None;
            self.is_new_target = false;
            true
        } else {
            false
        }
    }

    pub fn set_target_location(&mut self, location: &Vector3<f32>) {
        self.directional.set_target_location(location);
        self.is_new_target = false;
    }

    #[inline]
    pub fn target_constraint(&self) -> TargettingConstraint {
        self.target_constraint
    }

    #[inline]
    pub fn set_target_constraint(&mut self, constraint: TargettingConstraint) {
        self.target_constraint = constraint;
    }

    #[inline]
    pub fn should_track_target(&self) -> bool {
        self.should_track_target
    }

    #[inline]
    pub fn set_should_track_target(&mut self, track: bool) {
        self.should_track_target = track;
    }

    #[inline]
    pub fn should_autotarget_camera(&self) -> bool {
        self.should_autotarget_camera
    }

    #[inline]
    pub fn set_should_autotarget_camera(&mut self, autotarget: bool) {
        self.should_autotarget_camera = autotarget;
    }

    #[inline]
    pub fn is_tracking_for_bump_mapping(&self) -> bool {
        self.is_tracking_for_bump_mapping
    }

    #[inline]
    pub fn set_is_tracking_for_bump_mapping(&mut self, bump: bool) {
        self.is_tracking_for_bump_mapping = bump;
    }

    /// Whether the cached target location must be refreshed from the target node.
    #[inline]
    pub fn should_update_to_target(&self) -> bool {
        self.target.is_some() && (self.is_new_target || self.should_track_target)
    }

    /// Whether the rotation must be recomputed from the target location.
    #[inline]
    pub fn should_rotate_to_target_location(&self) -> bool {
        let base = &self.directional.base;
        ((base.is_dirty() && base.rotation_type == RotationType::Location)
            || self.should_track_target)
            && !self.is_tracking_for_bump_mapping
    }

    /// Whether orientation is wholly determined by the target, so that direct rotation is
    /// ignored.
    #[inline]
    pub fn is_tracking_target_direction(&self) -> bool {
        self.should_track_target && !self.is_tracking_for_bump_mapping && self.target.is_some()
    }
}

/// The orientation component of a node.
#[derive(Debug, Default, Clone, PartialEq)]
pub enum Rotator {
    /// Always the identity rotation.
    #[default]
    NoRotation,
    Mutable(MutableRotation),
    Directional(DirectionalRotation),
    Targetting(TargettingRotation),
}

impl Rotator {
    #[inline]
    pub fn is_mutable(&self) -> bool {
        !matches!(self, Self::NoRotation)
    }

    #[inline]
    pub fn is_directional(&self) -> bool {
        matches!(self, Self::Directional(_) | Self::Targetting(_))
    }

    #[inline]
    pub fn is_targettable(&self) -> bool {
        matches!(self, Self::Targetting(_))
    }

    pub fn mutable(&self) -> Option<&MutableRotation> {
        match self {
            Self::NoRotation => None,
            Self::Mutable(m) => Some(m),
            Self::Directional(d) => Some(&d.base),
            Self::Targetting(t) => Some(&t.directional.base),
        }
    }

    pub fn mutable_mut(&mut self) -> Option<&mut MutableRotation> {
        match self {
            Self::NoRotation => None,
            Self::Mutable(m) => Some(m),
            Self::Directional(d) => Some(&mut d.base),
            Self::Targetting(t) => Some(&mut t.directional.base),
        }
    }

    pub fn directional(&self) -> Option<&DirectionalRotation> {
        match self {
            Self::Directional(d) => Some(d),
            Self::Targetting(t) => Some(&t.directional),
            Self::NoRotation | Self::Mutable(_) => None,
        }
    }

    pub fn directional_mut(&mut self) -> Option<&mut DirectionalRotation> {
        match self {
            Self::Directional(d) => Some(d),
            Self::Targetting(t) => Some(&mut t.directional),
            Self::NoRotation | Self::Mutable(_) => None,
        }
    }

    pub fn targetting(&self) -> Option<&TargettingRotation> {
        match self {
            Self::Targetting(t) => Some(t),
            _ => None,
        }
    }

    pub fn targetting_mut(&mut self) -> Option<&mut TargettingRotation> {
        match self {
            Self::Targetting(t) => Some(t),
            _ => None,
        }
    }

    /// Ensure at least mutable capability.
    pub fn upgrade_to_mutable(&mut self) -> &mut MutableRotation {
        if let Self::NoRotation = self {
            tracing::trace!("upgrading rotator to mutable");
            *self = Self::Mutable(MutableRotation::default());
        }
        match self {
            Self::Mutable(m) => m,
            Self::Directional(d) => &mut d.base,
            Self::Targetting(t) => &mut t.directional.base,
            Self::NoRotation => unreachable!(),
        }
    }

    /// Ensure at least directional capability. `reverse` only applies if a new directional
    /// rotation is created.
    pub fn upgrade_to_directional(&mut self, reverse: bool) -> &mut DirectionalRotation {
        match std::mem::take(self) {
            Self::NoRotation => {
                tracing::trace!(reverse, "upgrading rotator to directional");
                *self = Self::Directional(DirectionalRotation::new(
                    MutableRotation::default(),
                    reverse,
                ));
            }
            Self::Mutable(m) => {
                tracing::trace!(reverse, "upgrading rotator to directional");
                *self = Self::Directional(DirectionalRotation::new(m, reverse));
            }
            other => *self = other,
        }
        match self {
            Self::Directional(d) => d,
            Self::Targetting(t) => &mut t.directional,
            Self::NoRotation | Self::Mutable(_) => unreachable!(),
        }
    }

    /// Ensure targetting capability. `reverse` only applies if a new directional rotation is
    /// created.
    pub fn upgrade_to_targetting(&mut self, reverse: bool) -> &mut TargettingRotation {
        if !self.is_targettable() {
            let directional = self.upgrade_to_directional(reverse).clone();
            tracing::trace!("upgrading rotator to targetting");
            *self = Self::Targetting(TargettingRotation::new(directional));
        }
        match self {
            Self::Targetting(t) => t,
            _ => unreachable!(),
        }
    }

    /// Bring the rotation matrix up to date with the stored rotation.
    ///
    /// # Errors
    /// * A forward direction is parallel to the reference up direction.
    pub fn apply_rotation(&mut self) -> Result<(), Error> {
        match self {
            Self::NoRotation => return Ok(()),
            Self::Mutable(m) => {
                if m.is_dirty() {
                    m.apply_own_rotation();
                }
            }
            Self::Directional(d) => {
                if d.base.is_dirty() {
                    d.apply_rotation()?;
                }
            }
            Self::Targetting(t) => {
                if t.directional.base.is_dirty() {
                    t.directional.apply_rotation()?;
                }
            }
        }
        if let Some(m) = self.mutable_mut() {
            m.mark_clean();
        }
        Ok(())
    }

    /// The up-to-date rotation matrix.
    pub fn rotation_matrix(&mut self) -> Result<Matrix, Error> {
        self.apply_rotation()?;
        Ok(match self.mutable() {
            Some(m) => m.matrix,
            None => Matrix::linear(),
        })
    }

    /// Post-multiply `matrix` by this rotation.
    pub fn apply_rotation_to(&mut self, matrix: &mut Matrix) -> Result<(), Error> {
        if self.is_mutable() {
            let r = self.rotation_matrix()?;
            matrix.multiply_by(&r);
        }
        Ok(())
    }

    /// Rotate `direction` by this rotation.
    pub fn transform_direction(&mut self, direction: &Vector3<f32>) -> Result<Vector3<f32>, Error> {
        Ok(self.rotation_matrix()?.transform_direction(direction))
    }

    fn stored(&self) -> Option<(RotationType, Vector4<f32>)> {
        self.mutable().map(|m| (m.rotation_type, m.rotation_vector))
    }

    /// Euler angles in degrees.
    pub fn rotation(&mut self) -> Result<Vector3<f32>, Error> {
        match self.stored() {
            None => Ok(Vector3::zeros()),
            Some((RotationType::Euler, v)) => Ok(v.xyz()),
            Some(_) => Ok(self.rotation_matrix()?.extract_rotation()),
        }
    }

    pub fn quaternion(&mut self) -> Result<Quaternion<f32>, Error> {
        match self.stored() {
            None => Ok(Quaternion::identity()),
            Some((RotationType::Quaternion, v)) => Ok(Quaternion::from(v)),
            Some((RotationType::AxisAngle, v)) => Ok(quaternion_from_axis_angle(&v)),
            Some(_) => Ok(self.rotation_matrix()?.extract_quaternion()),
        }
    }

    /// Axis and angle (degrees), packed as `(axis.x, axis.y, axis.z, angle)`.
    pub fn rotation_axis_angle(&mut self) -> Result<Vector4<f32>, Error> {
        match self.stored() {
            Some((RotationType::AxisAngle, v)) => Ok(v),
            _ => Ok(axis_angle_from_quaternion(&self.quaternion()?)),
        }
    }

    pub fn rotation_axis(&mut self) -> Result<Vector3<f32>, Error> {
        Ok(self.rotation_axis_angle()?.xyz())
    }

    pub fn rotation_angle(&mut self) -> Result<f32, Error> {
        Ok(self.rotation_axis_angle()?.w)
    }

    pub fn set_rotation(&mut self, rotation: &Vector3<f32>) {
        self.upgrade_to_mutable().set_rotation(rotation);
    }

    pub fn set_quaternion(&mut self, q: &Quaternion<f32>) {
        self.upgrade_to_mutable().set_quaternion(q);
    }

    /// Set the rotation axis, keeping the current angle.
    pub fn set_rotation_axis(&mut self, axis: &Vector3<f32>) -> Result<(), Error> {
        let angle = self.rotation_angle()?;
        self.upgrade_to_mutable().set_axis_angle(axis, angle);
        Ok(())
    }

    /// Set the rotation angle in degrees (modulo 360), keeping the current axis.
    pub fn set_rotation_angle(&mut self, angle: f32) -> Result<(), Error> {
        let axis = self.rotation_axis()?;
        self.upgrade_to_mutable().set_axis_angle(&axis, angle % 360.0);
        Ok(())
    }

    /// Rotate by Euler angles in degrees, relative to the current rotation.
    pub fn rotate_by(&mut self, rotation: &Vector3<f32>) -> Result<(), Error> {
        self.upgrade_to_mutable();
        self.apply_rotation()?;
        if let Some(m) = self.mutable_mut() {
            m.rotate_matrix(|mtx| mtx.rotate_by(rotation));
        }
        Ok(())
    }

    pub fn rotate_by_quaternion(&mut self, q: &Quaternion<f32>) -> Result<(), Error> {
        self.upgrade_to_mutable();
        self.apply_rotation()?;
        if let Some(m) = self.mutable_mut() {
            m.rotate_matrix(|mtx| mtx.rotate_by_quaternion(q));
        }
        Ok(())
    }

    /// Rotate by `angle` degrees about `axis`.
    pub fn rotate_by_angle(&mut self, angle: f32, axis: &Vector3<f32>) -> Result<(), Error> {
        let q = quaternion_from_axis_angle(&Vector4::new(axis.x, axis.y, axis.z, angle));
        self.rotate_by_quaternion(&q)
    }

    /// Direction in which the local `-Z` axis (or `+Z` when reversing) points.
    ///
    /// `reverse` is used when this rotator is not directional.
    pub fn forward_direction(&mut self, reverse: bool) -> Result<Vector3<f32>, Error> {
        if let Some((RotationType::Direction, v)) = self.stored() {
            return Ok(v.xyz());
        }
        let reverse = self.reverses_forward_direction(reverse);
        let fwd = self.rotation_matrix()?.extract_forward_direction();
        Ok(if reverse { -fwd } else { fwd })
    }

    /// Point along `direction` (normalized).
    ///
    /// # Errors
    /// * `direction` is zero-length
    pub fn set_forward_direction(
        &mut self,
        direction: &Vector3<f32>,
        reverse: bool,
    ) -> Result<(), Error> {
        if *direction == Vector3::zeros() {
            return Err(Error::ZeroDirection);
        }
        self.upgrade_to_directional(reverse)
            .set_forward_direction(direction)
    }

    pub fn up_direction(&mut self) -> Result<Vector3<f32>, Error> {
        Ok(self.rotation_matrix()?.extract_up_direction())
    }

    /// `reverse` is used when this rotator is not directional.
    pub fn right_direction(&mut self, reverse: bool) -> Result<Vector3<f32>, Error> {
        let reverse = self.reverses_forward_direction(reverse);
        let right = self.rotation_matrix()?.extract_right_direction();
        Ok(if reverse { -right } else { right })
    }

    fn reverses_forward_direction(&self, default: bool) -> bool {
        self.directional()
            .map(DirectionalRotation::should_reverse_forward_direction)
            .unwrap_or(default)
    }

    pub fn reference_up_direction(&self) -> Vector3<f32> {
        self.directional()
            .map(|d| d.reference_up_direction)
            .unwrap_or_else(Vector3::y)
    }

    pub fn target_location(&self) -> Option<Vector3<f32>> {
        self.directional().and_then(DirectionalRotation::target_location)
    }

    #[inline]
    pub fn target(&self) -> Option<NodeId> {
        self.targetting().and_then(TargettingRotation::target)
    }

    #[inline]
    pub fn target_constraint(&self) -> TargettingConstraint {
        self.targetting()
            .map(TargettingRotation::target_constraint)
            .unwrap_or_default()
    }

    #[inline]
    pub fn should_track_target(&self) -> bool {
        self.targetting()
            .map(TargettingRotation::should_track_target)
            .unwrap_or(false)
    }

    #[inline]
    pub fn should_autotarget_camera(&self) -> bool {
        self.targetting()
            .map(TargettingRotation::should_autotarget_camera)
            .unwrap_or(false)
    }

    #[inline]
    pub fn is_tracking_for_bump_mapping(&self) -> bool {
        self.targetting()
            .map(TargettingRotation::is_tracking_for_bump_mapping)
            .unwrap_or(false)
    }

    #[inline]
    pub fn should_update_to_target(&self) -> bool {
        self.targetting()
            .map(TargettingRotation::should_update_to_target)
            .unwrap_or(false)
    }

    #[inline]
    pub fn should_rotate_to_target_location(&self) -> bool {
        self.targetting()
            .map(TargettingRotation::should_rotate_to_target_location)
            .unwrap_or(false)
    }

    #[inline]
    pub fn is_tracking_target_direction(&self) -> bool {
        self.targetting()
            .map(TargettingRotation::is_tracking_target_direction)
            .unwrap_or(false)
    }

    pub fn clear_if_target(&mut self, node: NodeId) -> bool {
        self.targetting_mut()
            .map(|t| t.clear_if_target(node))
            .unwrap_or(false)
    }

    /// Short description of the rotator variant and its state.
    pub fn describe(&self) -> String {
        match self {
            Self::NoRotation => "NoRotation".to_owned(),
            Self::Mutable(m) => format!(
                "Mutable {:?} {:?}",
                m.rotation_type,
                m.rotation_vector.as_slice()
            ),
            Self::Directional(d) => format!(
                "Directional {:?} {:?} up {:?}",
                d.base.rotation_type,
                d.base.rotation_vector.as_slice(),
                d.reference_up_direction.as_slice()
            ),
            Self::Targetting(t) => format!(
                "Targetting {:?} {:?} target {:?} {:?}{}",
                t.directional.base.rotation_type,
                t.directional.base.rotation_vector.as_slice(),
                t.target,
                t.target_constraint,
                if t.should_track_target { " tracking" } else { "" }
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &Vector3<f32>, b: &Vector3<f32>) -> bool {
        (a - b).abs().max() < 1.0e-4
    }

    #[test]
    fn euler_is_reduced_modulo_360() {
        let mut r = Rotator::default();
        r.set_rotation(&Vector3::new(370.0, -400.0, 720.0));
        assert_eq!(r.rotation().unwrap(), Vector3::new(10.0, -40.0, 0.0));
    }

    #[test]
    fn upgrades_carry_state_forward() {
        let mut r = Rotator::default();
        r.set_rotation(&Vector3::new(0.0, 45.0, 0.0));
        let before = r.rotation_matrix().unwrap();
        r.upgrade_to_directional(true)
            .set_reference_up_direction(&Vector3::new(0.0, 2.0, 0.0))
            .unwrap();
        r.upgrade_to_targetting(false);
        assert!(r.is_targettable());
        let d = r.directional().unwrap();
        assert!(d.should_reverse_forward_direction());
        assert_eq!(*d.reference_up_direction(), Vector3::y());
        assert!(close(&r.rotation().unwrap(), &Vector3::new(0.0, 45.0, 0.0)));
        assert_eq!(r.rotation_matrix().unwrap(), before);
    }

    #[test]
    fn rotate_by_accumulates() {
        let mut r = Rotator::default();
        r.rotate_by(&Vector3::new(0.0, 30.0, 0.0)).unwrap();
        r.rotate_by(&Vector3::new(0.0, 60.0, 0.0)).unwrap();
        assert_eq!(r.mutable().unwrap().rotation_type(), RotationType::Unknown);
        assert!(close(&r.rotation().unwrap(), &Vector3::new(0.0, 90.0, 0.0)));
    }

    #[test]
    fn auto_orthonormalization_cycles_columns() {
        let mut r = Rotator::default();
        r.upgrade_to_mutable().set_auto_orthonormalize_count(2);
        for _ in 0..4 {
            r.rotate_by(&Vector3::new(1.0, 2.0, 3.0)).unwrap();
        }
        let m = r.mutable().unwrap();
        assert_eq!(m.ortho_start_column, 3);
        assert_eq!(m.incremental_rotation_count, 0);
    }

    #[test]
    fn forward_direction_is_normalized() {
        let mut r = Rotator::default();
        r.set_forward_direction(&Vector3::new(3.0, 0.0, 4.0), true)
            .unwrap();
        assert!(r.is_directional());
        assert!(close(
            &r.forward_direction(true).unwrap(),
            &Vector3::new(0.6, 0.0, 0.8)
        ));
        assert_eq!(
            r.set_forward_direction(&Vector3::zeros(), true),
            Err(Error::ZeroDirection)
        );
    }

    #[test]
    fn facing_straight_up_keeps_the_orientation() {
        let mut r = Rotator::default();
        r.set_rotation(&Vector3::new(0.0, 30.0, 0.0));
        let before = r.rotation_matrix().unwrap();
        let d = r.upgrade_to_directional(false);
        assert!(!d.rotate_to_target_location(
            &Vector3::new(0.0, 5.0, 0.0),
            &Vector3::zeros(),
            &Vector3::y()
        ));
        assert_eq!(r.rotation_matrix().unwrap(), before);
    }

    #[test]
    fn forward_parallel_to_up_is_rejected_on_apply() {
        let mut r = Rotator::default();
        r.set_forward_direction(&Vector3::y(), false).unwrap();
        assert_eq!(r.rotation_matrix(), Err(Error::ParallelToUp));
    }

    #[test]
    fn axis_angle_setters_keep_the_other_half() {
        let mut r = Rotator::default();
        r.set_rotation_angle(30.0).unwrap();
        r.set_rotation_axis(&Vector3::z()).unwrap();
        let aa = r.rotation_axis_angle().unwrap();
        assert_eq!(aa, Vector4::new(0.0, 0.0, 1.0, 30.0));
        r.set_rotation_angle(390.0).unwrap();
        assert_eq!(r.rotation_angle().unwrap(), 30.0);
        assert_eq!(r.rotation_axis().unwrap(), Vector3::z());
    }

    #[test]
    fn constraint_restricts_one_axis() {
        let eye = Vector3::new(1.0, 2.0, 3.0);
        let targ = Vector3::new(7.0, 8.0, 9.0);
        assert_eq!(
            TargettingConstraint::GlobalYAxis.restrict(&targ, &eye),
            Vector3::new(7.0, 2.0, 9.0)
        );
        assert_eq!(TargettingConstraint::LocalUnconstrained.restrict(&targ, &eye), targ);
        assert!(!TargettingConstraint::LocalZAxis.is_global());
    }
}
