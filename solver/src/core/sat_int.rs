//! Saturated integer arithmetic for edge weights.
//!
//! All kernel arithmetic goes through [`SatInt`]: a signed integer with three
//! sentinels (`NULL` for an absent value, plus the two infinities). Kernels
//! never apply a bare `+` to weights; [`SatInt::sum`] is the only addition.

use std::cmp::Ordering;
use std::fmt::{Debug, Display, Formatter};

/// Type representing a finite integer weight.
pub type IntCst = i32;

/// Largest magnitude a finite weight may take. The margin below `i32::MAX`
/// leaves room for one saturating addition without wrapping.
pub const INT_CST_MAX: IntCst = i32::MAX / 4 - 1;

/// Smallest finite weight.
pub const INT_CST_MIN: IntCst = -INT_CST_MAX;

const RAW_NULL: i32 = i32::MIN;
const RAW_NEG_INF: i32 = i32::MIN + 1;
const RAW_POS_INF: i32 = i32::MAX;

/// A weight: either a finite integer in `[INT_CST_MIN, INT_CST_MAX]`, one of
/// the two infinities, or `NULL` (no value).
///
/// The ordering is the numeric one with `-INF` below every finite value and
/// `+INF` above. `NULL` compares below `-INF`; comparing it is only meaningful
/// for equality tests and callers are expected to filter it out first.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SatInt(i32);

impl SatInt {
    pub const NULL: SatInt = SatInt(RAW_NULL);
    pub const NEG_INF: SatInt = SatInt(RAW_NEG_INF);
    pub const POS_INF: SatInt = SatInt(RAW_POS_INF);
    pub const ZERO: SatInt = SatInt(0);

    /// Wraps a finite value.
    ///
    /// # Panics
    /// Panics in debug builds if `v` lies outside the finite band.
    pub fn new(v: IntCst) -> SatInt {
        debug_assert!((INT_CST_MIN..=INT_CST_MAX).contains(&v), "weight out of band: {v}");
        SatInt(v)
    }

    pub fn is_null(self) -> bool {
        self.0 == RAW_NULL
    }

    pub fn is_finite(self) -> bool {
        !matches!(self.0, RAW_NULL | RAW_NEG_INF | RAW_POS_INF)
    }

    pub fn is_pos_inf(self) -> bool {
        self.0 == RAW_POS_INF
    }

    pub fn is_neg_inf(self) -> bool {
        self.0 == RAW_NEG_INF
    }

    /// The finite value, or `None` for any sentinel.
    pub fn finite(self) -> Option<IntCst> {
        if self.is_finite() {
            Some(self.0)
        } else {
            None
        }
    }

    /// The finite value.
    ///
    /// # Panics
    /// Panics if the value is a sentinel.
    pub fn unwrap(self) -> IntCst {
        match self.finite() {
            Some(v) => v,
            None => panic!("not a finite weight: {self}"),
        }
    }

    /// Saturating sum `self ⊕ rhs`:
    /// `NULL` absorbs everything; `+INF ⊕ x = +INF` unless `x = -INF` (and
    /// symmetrically); the opposite-infinities sum has no meaning and yields
    /// `NULL`. A finite sum escaping the representable band saturates to the
    /// corresponding infinity (init-time horizon checks make this unreachable
    /// on validated networks).
    pub fn sum(self, rhs: SatInt) -> SatInt {
        if self.is_null() || rhs.is_null() {
            return SatInt::NULL;
        }
        match (self.0, rhs.0) {
            (RAW_POS_INF, RAW_NEG_INF) | (RAW_NEG_INF, RAW_POS_INF) => {
                debug_assert!(false, "+INF ⊕ -INF");
                SatInt::NULL
            }
            (RAW_POS_INF, _) | (_, RAW_POS_INF) => SatInt::POS_INF,
            (RAW_NEG_INF, _) | (_, RAW_NEG_INF) => SatInt::NEG_INF,
            (a, b) => {
                let s = a as i64 + b as i64;
                if s > INT_CST_MAX as i64 {
                    debug_assert!(false, "saturated sum overflow: {a} + {b}");
                    SatInt::POS_INF
                } else if s < INT_CST_MIN as i64 {
                    SatInt::NEG_INF
                } else {
                    SatInt(s as i32)
                }
            }
        }
    }

    /// Negation; maps each infinity to the other and keeps `NULL`.
    pub fn neg(self) -> SatInt {
        match self.0 {
            RAW_NULL => SatInt::NULL,
            RAW_NEG_INF => SatInt::POS_INF,
            RAW_POS_INF => SatInt::NEG_INF,
            v => SatInt(-v),
        }
    }

    /// Minimum of two weights, ignoring `NULL` operands.
    pub fn min_ignoring_null(self, rhs: SatInt) -> SatInt {
        if self.is_null() {
            rhs
        } else if rhs.is_null() {
            self
        } else {
            self.min(rhs)
        }
    }
}

impl From<IntCst> for SatInt {
    fn from(v: IntCst) -> Self {
        SatInt::new(v)
    }
}

impl Display for SatInt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.0 {
            RAW_NULL => write!(f, "NULL"),
            RAW_NEG_INF => write!(f, "-INF"),
            RAW_POS_INF => write!(f, "INF"),
            v => write!(f, "{v}"),
        }
    }
}

impl Debug for SatInt {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

/// `max_abs_edge_weight × (|V| − 1)`, an overestimate of any finite node time.
///
/// Returns `None` when the product escapes the finite band, in which case the
/// network must be rejected (`Overflow`).
pub fn horizon(max_abs_weight: IntCst, num_nodes: usize) -> Option<IntCst> {
    let h = (max_abs_weight as i64) * (num_nodes.saturating_sub(1) as i64);
    if h > INT_CST_MAX as i64 {
        None
    } else {
        Some(h as IntCst)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sentinel_ordering() {
        assert!(SatInt::NEG_INF < SatInt::new(-1000));
        assert!(SatInt::new(1000) < SatInt::POS_INF);
        assert!(SatInt::new(-3) < SatInt::new(2));
    }

    #[test]
    fn saturating_sums() {
        let f = SatInt::new(5);
        assert_eq!(SatInt::POS_INF.sum(f), SatInt::POS_INF);
        assert_eq!(SatInt::NEG_INF.sum(f), SatInt::NEG_INF);
        assert_eq!(SatInt::NULL.sum(f), SatInt::NULL);
        assert_eq!(f.sum(SatInt::NULL), SatInt::NULL);
        assert_eq!(f.sum(SatInt::new(-7)), SatInt::new(-2));
    }

    #[test]
    fn negation() {
        assert_eq!(SatInt::POS_INF.neg(), SatInt::NEG_INF);
        assert_eq!(SatInt::NEG_INF.neg(), SatInt::POS_INF);
        assert_eq!(SatInt::new(4).neg(), SatInt::new(-4));
        assert_eq!(SatInt::NULL.neg(), SatInt::NULL);
    }

    #[test]
    fn horizon_overflow_is_detected() {
        assert_eq!(horizon(10, 4), Some(30));
        assert_eq!(horizon(INT_CST_MAX, 3), None);
        assert_eq!(horizon(100, 1), Some(0));
    }
}
