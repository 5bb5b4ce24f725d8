//! Homogeneous transform matrices with cached identity/rigidity classification.
//!
//! Composition short-circuits on identity operands, and inversion of rigid matrices uses the
//! cheap transpose-and-negate path. Angles are in degrees at this boundary; Euler rotations are
//! composed in Y-X-Z order (`M = Ry · Rx · Rz`).

use std::ops::{Mul, MulAssign};

use armature_common::{impl_mul, EPSILON};
use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3, Vector4};

/// The flavour of transform a [Matrix] holds.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MatrixKind {
    /// Rotation, scale and translation.
    #[default]
    Affine,
    /// Rotation and scale only; the translation column is always zero.
    Linear,
}

/// A line in 3D space.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct Ray {
    pub start_location: Vector3<f32>,
    pub direction: Vector3<f32>,
}

impl Ray {
    #[inline]
    pub fn new(start_location: Vector3<f32>, direction: Vector3<f32>) -> Self {
        Self {
            start_location,
            direction,
        }
    }
}

/// A 4×4 homogeneous transform, tagged with whether it is known to be the identity or rigid
/// (rotation and translation only).
///
/// # Invariants
///
/// * `is_identity` ⇒ `is_rigid`
/// * `kind == Linear` ⇒ the translation column is zero
/// * the bottom row is always `[0, 0, 0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    kind: MatrixKind,
    contents: Matrix4<f32>,
    is_identity: bool,
    is_rigid: bool,
    is_dirty: bool,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::new(MatrixKind::Affine)
    }
}

impl_mul!(self: Matrix, rhs: Matrix; Matrix::product(&self, &rhs); self.multiply_by(&rhs));

/// Rotation matrix for Euler angles in degrees, in Y-X-Z order.
pub fn rotation_yxz(rotation: &Vector3<f32>) -> Matrix3<f32> {
    let rads = rotation.map(f32::to_radians);
    let (sx, cx) = rads.x.sin_cos();
    let (sy, cy) = rads.y.sin_cos();
    let (sz, cz) = rads.z.sin_cos();
    #[rustfmt::skip]
    let res = Matrix3::new(
        cy * cz + sx * sy * sz, cz * sx * sy - cy * sz, cx * sy,
        cx * sz,                cx * cz,                -sx,
        cy * sx * sz - cz * sy, cy * cz * sx + sy * sz, cx * cy,
    );
    res
}

/// Euler angles in degrees, Y-X-Z order, of the rotation held in the upper-left 3×3 of `m`.
pub fn extract_rotation_yxz(m: &Matrix3<f32>) -> Vector3<f32> {
    let rad_x = (-m[(1, 2)]).clamp(-1.0, 1.0).asin();
    let (rad_y, rad_z) = if rad_x.cos() > 0.01 {
        (m[(0, 2)].atan2(m[(2, 2)]), m[(1, 0)].atan2(m[(1, 1)]))
    } else {
        // gimbal lock; fold all of the remaining rotation into Y
        ((-m[(2, 0)]).atan2(m[(0, 0)]), 0.0)
    };
    Vector3::new(rad_x, rad_y, rad_z).map(f32::to_degrees)
}

/// Quaternion for the rotation in the upper-left 3×3 of `m`. Any scale is normalized away first.
pub fn extract_quaternion(m: &Matrix3<f32>) -> Quaternion<f32> {
    let mut cols = *m;
    for mut c in cols.column_iter_mut() {
        let n = c.norm();
        if n > 0.0 {
            c /= n;
        }
    }
    let mut q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(cols));
    q.renormalize();
    q.into_inner()
}

/// Rotation matrix of a (not necessarily normalized) quaternion.
///
/// A zero quaternion yields the identity.
pub fn quaternion_rotation(q: &Quaternion<f32>) -> Matrix3<f32> {
    match UnitQuaternion::try_new(*q, f32::EPSILON) {
        Some(u) => u.to_rotation_matrix().into_inner(),
        None => Matrix3::identity(),
    }
}

/// Convert Euler angles (degrees, Y-X-Z) to a quaternion.
pub fn quaternion_from_rotation(rotation: &Vector3<f32>) -> Quaternion<f32> {
    extract_quaternion(&rotation_yxz(rotation))
}

/// Convert a quaternion to Euler angles (degrees, Y-X-Z).
pub fn rotation_from_quaternion(q: &Quaternion<f32>) -> Vector3<f32> {
    extract_rotation_yxz(&quaternion_rotation(q))
}

/// Convert an axis/angle pair, packed as `(axis.x, axis.y, axis.z, degrees)`, to a quaternion.
pub fn quaternion_from_axis_angle(axis_angle: &Vector4<f32>) -> Quaternion<f32> {
    let axis = axis_angle.xyz();
    let n = axis.norm();
    if n == 0.0 {
        return Quaternion::identity();
    }
    let half = axis_angle.w.to_radians() / 2.0;
    let v = axis * (half.sin() / n);
    Quaternion::new(half.cos(), v.x, v.y, v.z)
}

/// Convert a quaternion to an axis/angle pair, packed as `(axis.x, axis.y, axis.z, degrees)`.
///
/// Rotations too small to have a meaningful axis yield all zeroes.
pub fn axis_angle_from_quaternion(q: &Quaternion<f32>) -> Vector4<f32> {
    let n = q.norm();
    if n == 0.0 {
        return Vector4::zeros();
    }
    let q = *q / n;
    let half = q.w.clamp(-1.0, 1.0).acos();
    let scale = half.sin();
    if scale < 1.0e-4 {
        return Vector4::zeros();
    }
    let axis = q.imag() / scale;
    Vector4::new(axis.x, axis.y, axis.z, (half * 2.0).to_degrees())
}

fn is_rotation_block_orthonormal(m: &Matrix4<f32>) -> bool {
    let r = m.fixed_view::<3, 3>(0, 0).into_owned();
    let rtr = r.transpose() * r;
    (rtr - Matrix3::identity()).abs().max() <= EPSILON && (r.determinant() - 1.0).abs() <= EPSILON
}

impl Matrix {
    /// An identity matrix of the given kind.
    pub fn new(kind: MatrixKind) -> Self {
        Self {
            kind,
            contents: Matrix4::identity(),
            is_identity: true,
            is_rigid: true,
            is_dirty: false,
        }
    }

    /// An affine identity matrix.
    #[inline]
    pub fn identity() -> Self {
        Self::new(MatrixKind::Affine)
    }

    /// A linear identity matrix.
    #[inline]
    pub fn linear() -> Self {
        Self::new(MatrixKind::Linear)
    }

    /// Wrap arbitrary contents, classifying them.
    ///
    /// Rigidity is detected to within [EPSILON]. A `Linear` matrix discards any translation.
    pub fn from_contents(kind: MatrixKind, contents: Matrix4<f32>) -> Self {
        let mut res = Self::new(kind);
        res.populate_from_contents(contents);
        res
    }

    #[inline]
    pub fn kind(&self) -> MatrixKind {
        self.kind
    }

    #[inline]
    pub fn contents(&self) -> &Matrix4<f32> {
        &self.contents
    }

    /// The upper-left 3×3 (rotation and scale) block.
    #[inline]
    pub fn linear_block(&self) -> Matrix3<f32> {
        self.contents.fixed_view::<3, 3>(0, 0).into_owned()
    }

    #[inline]
    pub fn is_identity(&self) -> bool {
        self.is_identity
    }

    #[inline]
    pub fn is_rigid(&self) -> bool {
        self.is_rigid
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    #[inline]
    pub fn set_is_dirty(&mut self, dirty: bool) {
        self.is_dirty = dirty;
    }

    fn clear_translation(&mut self) {
        if self.kind == MatrixKind::Linear {
            self.contents[(0, 3)] = 0.0;
            self.contents[(1, 3)] = 0.0;
            self.contents[(2, 3)] = 0.0;
        }
    }

    fn set_linear_block(&mut self, m: &Matrix3<f32>) {
        self.contents.fixed_view_mut::<3, 3>(0, 0).copy_from(m);
    }

    pub fn populate_zero(&mut self) {
        self.contents = Matrix4::zeros();
        self.contents[(3, 3)] = 1.0;
        self.is_identity = false;
        self.is_rigid = false;
    }

    pub fn populate_identity(&mut self) {
        if !self.is_identity {
            self.contents = Matrix4::identity();
            self.is_identity = true;
            self.is_rigid = true;
        }
    }

    /// Copy the contents and classification of `other`.
    pub fn populate_from(&mut self, other: &Matrix) {
        if other.is_identity {
            self.populate_identity();
        } else {
            self.contents = other.contents;
            self.clear_translation();
            self.is_identity = false;
            self.is_rigid = other.is_rigid;
        }
    }

    pub fn populate_from_contents(&mut self, contents: Matrix4<f32>) {
        self.contents = contents;
        self.contents.set_row(3, &nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0));
        self.clear_translation();
        self.is_identity = self.contents == Matrix4::identity();
        self.is_rigid = self.is_identity || is_rotation_block_orthonormal(&self.contents);
    }

    /// Populate from Euler angles in degrees.
    pub fn populate_from_rotation(&mut self, rotation: &Vector3<f32>) {
        if *rotation == Vector3::zeros() {
            self.populate_identity();
        } else {
            self.contents = Matrix4::identity();
            self.set_linear_block(&rotation_yxz(rotation));
            self.is_identity = false;
            self.is_rigid = true;
        }
    }

    pub fn populate_from_quaternion(&mut self, q: &Quaternion<f32>) {
        if *q == Quaternion::identity() {
            self.populate_identity();
        } else {
            self.contents = Matrix4::identity();
            self.set_linear_block(&quaternion_rotation(q));
            self.is_identity = false;
            self.is_rigid = true;
        }
    }

    pub fn populate_from_scale(&mut self, scale: &Vector3<f32>) {
        if *scale == Vector3::repeat(1.0) {
            self.populate_identity();
        } else {
            self.contents = Matrix4::new_nonuniform_scaling(scale);
            self.is_identity = false;
            self.is_rigid = false;
        }
    }

    /// Populate as a pure translation. A `Linear` matrix becomes the identity.
    pub fn populate_from_translation(&mut self, translation: &Vector3<f32>) {
        if *translation == Vector3::zeros() || self.kind == MatrixKind::Linear {
            self.populate_identity();
        } else {
            self.contents = Matrix4::new_translation(translation);
            self.is_identity = false;
            self.is_rigid = true;
        }
    }

    /// Populate as a rotation which maps `-Z` onto `fwd` and `+Y` onto the component of `up`
    /// orthogonal to `fwd`.
    ///
    /// `fwd` must be non-zero and not parallel to `up`.
    pub fn populate_to_point_towards(&mut self, fwd: &Vector3<f32>, up: &Vector3<f32>) {
        let f = fwd.normalize();
        let right = f.cross(up).normalize();
        let u = right.cross(&f);
        self.contents = Matrix4::identity();
        self.set_linear_block(&Matrix3::from_columns(&[right, u, -f]));
        self.is_identity = false;
        self.is_rigid = true;
    }

    /// Populate as a view matrix looking from `eye` at `target`.
    pub fn populate_to_look_at(
        &mut self,
        target: &Vector3<f32>,
        eye: &Vector3<f32>,
        up: &Vector3<f32>,
    ) {
        self.populate_to_point_towards(&(target - eye), up);
        self.transpose();
        self.translate_by(&-eye);
        self.is_identity = false;
        self.is_rigid = true;
    }

    /// Euler angles in degrees, Y-X-Z order.
    pub fn extract_rotation(&self) -> Vector3<f32> {
        if self.is_identity {
            return Vector3::zeros();
        }
        extract_rotation_yxz(&self.linear_block())
    }

    pub fn extract_quaternion(&self) -> Quaternion<f32> {
        if self.is_identity {
            return Quaternion::identity();
        }
        extract_quaternion(&self.linear_block())
    }

    /// The direction `-Z` is carried to.
    #[inline]
    pub fn extract_forward_direction(&self) -> Vector3<f32> {
        -self.contents.fixed_view::<3, 1>(0, 2).into_owned()
    }

    /// The direction `+Y` is carried to.
    #[inline]
    pub fn extract_up_direction(&self) -> Vector3<f32> {
        self.contents.fixed_view::<3, 1>(0, 1).into_owned()
    }

    /// The direction `+X` is carried to.
    #[inline]
    pub fn extract_right_direction(&self) -> Vector3<f32> {
        self.contents.fixed_view::<3, 1>(0, 0).into_owned()
    }

    #[inline]
    pub fn extract_translation(&self) -> Vector3<f32> {
        self.contents.fixed_view::<3, 1>(0, 3).into_owned()
    }

    /// Post-multiply by the rotation for Euler angles in degrees.
    pub fn rotate_by(&mut self, rotation: &Vector3<f32>) {
        if *rotation != Vector3::zeros() {
            let r = self.linear_block() * rotation_yxz(rotation);
            self.set_linear_block(&r);
            self.is_identity = false;
        }
    }

    pub fn rotate_by_quaternion(&mut self, q: &Quaternion<f32>) {
        if *q != Quaternion::identity() {
            let r = self.linear_block() * quaternion_rotation(q);
            self.set_linear_block(&r);
            self.is_identity = false;
        }
    }

    /// Re-orthonormalize the rotation block, beginning with column `start_column` (1, 2 or 3)
    /// and continuing cyclically through the other two.
    pub fn orthonormalize_rotation_starting_with(&mut self, start_column: u8) {
        if self.is_identity {
            return;
        }
        let first = (start_column.clamp(1, 3) - 1) as usize;
        let order = [first, (first + 1) % 3, (first + 2) % 3];
        let block = self.linear_block();
        let mut done: Vec<Vector3<f32>> = Vec::with_capacity(3);
        let mut out = Matrix3::zeros();
        for &c in &order {
            let v: Vector3<f32> = block.column(c).into_owned();
            let mut cleaned = v;
            for prev in &done {
                cleaned -= prev * v.dot(prev);
            }
            let cleaned = cleaned.try_normalize(0.0).unwrap_or(cleaned);
            out.set_column(c, &cleaned);
            done.push(cleaned);
        }
        self.set_linear_block(&out);
    }

    /// Post-multiply by a scale.
    pub fn scale_by(&mut self, scale: &Vector3<f32>) {
        if *scale != Vector3::repeat(1.0) {
            for (i, s) in scale.iter().enumerate() {
                let mut col = self.contents.fixed_view_mut::<3, 1>(0, i);
                col *= *s;
            }
            self.is_identity = false;
            self.is_rigid = false;
        }
    }

    /// Post-multiply by a translation. No-op for `Linear` matrices.
    pub fn translate_by(&mut self, translation: &Vector3<f32>) {
        if *translation != Vector3::zeros() && self.kind == MatrixKind::Affine {
            let t = self.linear_block() * translation;
            let mut col = self.contents.fixed_view_mut::<3, 1>(0, 3);
            col += t;
            self.is_identity = false;
        }
    }

    /// `self = self · other`
    pub fn multiply_by(&mut self, other: &Matrix) {
        if other.is_identity {
            return;
        }
        if self.is_identity {
            self.populate_from(other);
            return;
        }
        self.contents *= other.contents;
        self.clear_translation();
        self.is_identity = false;
        if !other.is_rigid {
            self.is_rigid = false;
        }
    }

    /// `self = other · self`
    pub fn left_multiply_by(&mut self, other: &Matrix) {
        if other.is_identity {
            return;
        }
        if self.is_identity {
            self.populate_from(other);
            return;
        }
        self.contents = other.contents * self.contents;
        self.clear_translation();
        self.is_identity = false;
        if !other.is_rigid {
            self.is_rigid = false;
        }
    }

    /// `lhs · rhs`, as a new matrix of `lhs`'s kind.
    pub fn product(lhs: &Matrix, rhs: &Matrix) -> Matrix {
        let mut res = *lhs;
        res.multiply_by(rhs);
        res
    }

    pub fn transform_location(&self, location: &Vector3<f32>) -> Vector3<f32> {
        if self.is_identity {
            return *location;
        }
        self.contents.transform_point(&(*location).into()).coords
    }

    /// Transform a direction, ignoring translation.
    pub fn transform_direction(&self, direction: &Vector3<f32>) -> Vector3<f32> {
        if self.is_identity {
            return *direction;
        }
        self.contents.transform_vector(direction)
    }

    pub fn transform_homogeneous_vector(&self, v: &Vector4<f32>) -> Vector4<f32> {
        if self.is_identity {
            return *v;
        }
        self.contents * v
    }

    pub fn transform_ray(&self, ray: &Ray) -> Ray {
        if self.is_identity {
            return *ray;
        }
        Ray {
            start_location: self.transform_location(&ray.start_location),
            direction: self.transform_direction(&ray.direction),
        }
    }

    pub fn transpose(&mut self) {
        if self.is_identity {
            return;
        }
        let r = self.linear_block().transpose();
        self.set_linear_block(&r);
    }

    /// Invert in place, choosing the cheapest valid method.
    ///
    /// Returns `false`, leaving `self` untouched, if the matrix is singular.
    pub fn invert(&mut self) -> bool {
        if self.is_identity {
            return true;
        }
        if self.is_rigid {
            self.invert_rigid();
            return true;
        }
        self.invert_adjoint()
    }

    /// Invert in place by the general method.
    ///
    /// Returns `false`, leaving `self` untouched, if the matrix is singular.
    pub fn invert_adjoint(&mut self) -> bool {
        if self.is_identity {
            return true;
        }
        let inverse = match self.kind {
            MatrixKind::Affine => self.contents.try_inverse(),
            MatrixKind::Linear => self.linear_block().try_inverse().map(|m| m.to_homogeneous()),
        };
        match inverse {
            Some(m) => {
                self.contents = m;
                self.contents.set_row(3, &nalgebra::RowVector4::new(0.0, 0.0, 0.0, 1.0));
                true
            }
            None => {
                tracing::warn!(matrix = ?self.contents, "attempted to invert a singular matrix");
                false
            }
        }
    }

    /// Invert in place, assuming `self` is rigid: transpose the rotation and rotate the negated
    /// translation into the new frame.
    pub fn invert_rigid(&mut self) {
        if self.is_identity {
            return;
        }
        let rt = self.linear_block().transpose();
        let t = -(rt * self.extract_translation());
        self.set_linear_block(&rt);
        self.contents.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);
        self.clear_translation();
    }

    /// An inverted copy. See [Matrix::invert].
    pub fn inverse(&self) -> Matrix {
        let mut res = *self;
        res.invert();
        res
    }
}
