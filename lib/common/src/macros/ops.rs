/// Implement `Mul` (for owned and borrowed operands on both sides) and `MulAssign` (for owned
/// and borrowed right-hand operands) of `$Rhs` onto `$Lhs`, yielding `$Lhs`.
///
/// Inside `$mul` and `$mul_asn`, the operands named by `$lhs` and `$rhs` may be owned or
/// borrowed; write them in terms of methods taking references.
///
/// Callers must have `std::ops::{Mul, MulAssign}` in scope.
#[macro_export]
macro_rules! impl_mul {
    ($lhs:ident: $Lhs:ty, $rhs:ident: $Rhs:ty; $mul:expr; $mul_asn:expr) => {
        $crate::impl_mul!(@mul $Lhs; $Lhs, $Rhs; $lhs, $rhs; $mul);
        $crate::impl_mul!(@mul $Lhs; &$Lhs, $Rhs; $lhs, $rhs; $mul);
        $crate::impl_mul!(@mul $Lhs; $Lhs, &$Rhs; $lhs, $rhs; $mul);
        $crate::impl_mul!(@mul $Lhs; &$Lhs, &$Rhs; $lhs, $rhs; $mul);
        impl MulAssign<$Rhs> for $Lhs {
            #[inline]
            fn mul_assign(&mut $lhs, $rhs: $Rhs) {
                $mul_asn
            }
        }
        impl MulAssign<&$Rhs> for $Lhs {
            #[inline]
            fn mul_assign(&mut $lhs, $rhs: &$Rhs) {
                $mul_asn
            }
        }
    };
    (@mul $Out:ty; $L:ty, $R:ty; $lhs:ident, $rhs:ident; $mul:expr) => {
        impl Mul<$R> for $L {
            type Output = $Out;
            #[inline]
            fn mul($lhs, $rhs: $R) -> Self::Output {
                $mul
            }
        }
    };
}
