//! Small pieces shared between `armature` and its helper crates.

use num_traits::{AsPrimitive, NumCast, PrimInt};

pub mod macros;

/// Trait for integer types which can address a slot within an arena (or any array-like
/// structure).
pub trait ArrayIndex: PrimInt + AsPrimitive<usize> + std::hash::Hash + std::fmt::Debug + 'static {
    /// Convert a `usize` position into this index type.
    ///
    /// Returns `None` if `pos` does not fit.
    #[inline]
    fn from_usize(pos: usize) -> Option<Self> {
        <Self as NumCast>::from(pos)
    }
}
impl<P> ArrayIndex for P where P: PrimInt + AsPrimitive<usize> + std::hash::Hash + std::fmt::Debug + 'static
{}

/// Absolute tolerance used when comparing floating-point transform components.
pub const EPSILON: f32 = 1.0e-5;

/// Whether `a` and `b` differ by no more than `tolerance`.
#[inline]
pub fn approx_eq(a: f32, b: f32, tolerance: f32) -> bool {
    (a - b).abs() <= tolerance
}
