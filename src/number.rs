//! The `Number` trait used throughout the crate for generic scalar values.
//!
//! A single bound that lets cluster-tree, ANN and linear-algebra code stay
//! generic over `f32`/`f64` (and, in principle, other numeric coordinate
//! types) without re-deriving `NumCast`/`Sum`/`PartialOrd` bounds at every
//! call site.

use num_traits::{Float, FromPrimitive, NumCast, ToPrimitive};

/// A floating-point scalar usable as a matrix entry, coordinate or distance.
pub trait Number:
    Float + FromPrimitive + NumCast + ToPrimitive + std::iter::Sum + Send + Sync + std::fmt::Debug + 'static
{
    /// Convenience accessor used pervasively for printing, tolerances and
    /// mixed-precision arithmetic.
    fn as_f64(&self) -> f64 {
        ToPrimitive::to_f64(self).unwrap()
    }

    fn from_f64(value: f64) -> Self {
        FromPrimitive::from_f64(value).unwrap()
    }
}

impl Number for f32 {}
impl Number for f64 {}
