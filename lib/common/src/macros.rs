//! Macros for implementing operator traits without repeating every owned/borrowed permutation.
//!
//! All macros are exported at the crate root.

mod ops;
