//! Edges of a temporal network.
//!
//! One edge may combine several weight shapes: an ordinary integer value, a
//! labeled-value map (conditional networks), an upper-case map and a
//! lower-case value (networks with uncertainty). STNU waits are upper-case
//! values with the empty label on an edge ending at the activation.

use crate::core::{ALabelIntMap, ALetter, IntCst, Label, LabeledIntMap, SatInt};

/// Provenance of a constraint.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum ConstraintType {
    /// Plain user constraint.
    #[default]
    Normal,
    /// One side of a contingent link.
    Contingent,
    /// Inserted by initialization (e.g. the `v → Z` closure edges).
    Internal,
    /// Requirement constraint of the source problem.
    Requirement,
    /// Produced by a propagation rule.
    Derived,
}

/// A lower-case value `c:x` on an activation→contingent edge, guarded by a
/// label in conditional networks (empty for plain STNU).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LowerCase {
    pub letter: ALetter,
    pub label: Label,
    pub value: IntCst,
}

/// A directed edge `source → target` with its weight shapes.
#[derive(Clone, Debug)]
pub struct Edge {
    name: String,
    pub kind: ConstraintType,
    /// Ordinary weight; `NULL` when absent.
    pub value: SatInt,
    /// Labeled weights (CSTN / CSTNU).
    pub labeled: LabeledIntMap,
    /// Upper-case weights, including STNU waits (empty-label entries).
    pub upper_case: ALabelIntMap,
    /// Lower-case value; at most one per edge.
    pub lower_case: Option<LowerCase>,
}

impl Edge {
    pub fn new(name: impl Into<String>) -> Edge {
        Edge {
            name: name.into(),
            kind: ConstraintType::default(),
            value: SatInt::NULL,
            labeled: LabeledIntMap::new(),
            upper_case: ALabelIntMap::new(),
            lower_case: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the edge carries no constraint at all.
    pub fn is_empty(&self) -> bool {
        self.value.is_null() && self.labeled.is_empty() && self.upper_case.is_empty() && self.lower_case.is_none()
    }

    pub fn has_ordinary(&self) -> bool {
        !self.value.is_null()
    }

    /// Tightens the ordinary value; returns true iff the edge changed.
    pub fn tighten_value(&mut self, v: SatInt) -> bool {
        debug_assert!(!v.is_null());
        if self.value.is_null() || v < self.value {
            self.value = v;
            true
        } else {
            false
        }
    }

    /// The STNU wait or upper-case value for `letter` (empty label).
    pub fn uc_value(&self, letter: ALetter) -> Option<IntCst> {
        self.upper_case.get(letter, Label::empty())
    }

    /// Tightens the upper-case value for `letter` under the empty label.
    pub fn tighten_uc(&mut self, letter: ALetter, v: IntCst) -> bool {
        self.upper_case.merge(letter, Label::empty(), v)
    }

    /// The single wait on this edge, when exactly one upper-case entry exists.
    pub fn wait(&self) -> Option<(ALetter, IntCst)> {
        let mut it = self.upper_case.iter();
        match (it.next(), it.next()) {
            (Some((a, l, v)), None) if l.is_empty() => Some((a, v)),
            _ => None,
        }
    }

    /// Smallest weight this edge contributes in any scenario, used for
    /// priority ordering; `None` on an empty edge.
    pub fn min_weight(&self) -> Option<IntCst> {
        let mut min: Option<IntCst> = self.value.finite();
        for v in self
            .labeled
            .min_value()
            .into_iter()
            .chain(self.upper_case.iter().map(|(_, _, v)| v))
            .chain(self.lower_case.iter().map(|lc| lc.value))
        {
            min = Some(min.map_or(v, |m| m.min(v)));
        }
        min
    }
}

impl std::fmt::Display for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:", self.name)?;
        if let Some(v) = self.value.finite() {
            write!(f, " {v}")?;
        }
        if !self.labeled.is_empty() {
            write!(f, " {}", self.labeled)?;
        }
        if !self.upper_case.is_empty() {
            write!(f, " UC{}", self.upper_case)?;
        }
        if let Some(lc) = &self.lower_case {
            write!(f, " LC({}:{}:{})", lc.letter, lc.label, lc.value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tightening_only_decreases() {
        let mut e = Edge::new("e");
        assert!(e.is_empty());
        assert!(e.tighten_value(SatInt::new(5)));
        assert!(!e.tighten_value(SatInt::new(7)));
        assert!(e.tighten_value(SatInt::new(-2)));
        assert_eq!(e.value.unwrap(), -2);
    }

    #[test]
    fn wait_reads_single_empty_label_entry() {
        let mut e = Edge::new("e");
        let c = ALetter('C');
        assert!(e.tighten_uc(c, -3));
        assert_eq!(e.wait(), Some((c, -3)));
        assert_eq!(e.uc_value(c), Some(-3));
        assert!(!e.tighten_uc(c, -1));
        assert!(e.tighten_uc(c, -4));
        assert_eq!(e.wait(), Some((c, -4)));
    }
}
