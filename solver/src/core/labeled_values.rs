//! Maps from labels to integer values with the domination invariant.
//!
//! An entry `(α, v)` reads "in every scenario consistent with α, the
//! constraint is at most v". A pair is redundant as soon as a more general
//! label carries an equal-or-smaller value: `(β, w)` dominates `(α, v)` iff
//! α subsumes β and `w ≤ v`. The maps below never store a dominated pair.

use crate::core::{ALetter, IntCst, Label};
use crate::utils::{disp_iter, Fmt};
use smallvec::SmallVec;

/// Labeled integer map used by conditional edges.
///
/// Entries are kept in a small vector ordered by `(label size, label bits)`:
/// the number of distinct labels per edge is bounded by the propositions
/// actually mentioned on that edge and is small in practice.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct LabeledIntMap {
    entries: SmallVec<[(Label, IntCst); 4]>,
    /// Best value ever stored for a label that has since been removed or
    /// superseded. Propagation consults it to avoid re-deriving a value that
    /// a stronger one already retired.
    removed: hashbrown::HashMap<Label, IntCst>,
}

impl LabeledIntMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Singleton map.
    pub fn with(label: Label, value: IntCst) -> Self {
        let mut m = Self::new();
        m.merge(label, value);
        m
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Label, IntCst)> + '_ {
        self.entries.iter().copied()
    }

    /// Value stored under exactly `label`.
    pub fn get(&self, label: Label) -> Option<IntCst> {
        self.entries.iter().find(|(l, _)| *l == label).map(|(_, v)| *v)
    }

    /// Inserts `(label, value)` unless it is dominated; removes every entry it
    /// dominates. Returns true iff the map changed.
    pub fn merge(&mut self, label: Label, value: IntCst) -> bool {
        // a stronger-or-equal label already retired an equal-or-better value
        if let Some(&best) = self.removed.get(&label) {
            if best <= value {
                return false;
            }
        }
        if self
            .entries
            .iter()
            .any(|&(l, v)| label.subsumes(l) && v <= value)
        {
            return false;
        }
        self.entries.retain(|&mut (l, v)| {
            let dominated = l.subsumes(label) && value <= v;
            if dominated {
                let best = self.removed.get(&l).copied().unwrap_or(IntCst::MAX);
                if v < best {
                    self.removed.insert(l, v);
                }
            }
            !dominated
        });
        let pos = self
            .entries
            .partition_point(|&(l, _)| (l.size(), l) < (label.size(), label));
        self.entries.insert(pos, (label, value));
        true
    }

    /// Removes the entry stored under exactly `label`, recording it in the
    /// removed shadow.
    pub fn remove(&mut self, label: Label) -> Option<IntCst> {
        let i = self.entries.iter().position(|(l, _)| *l == label)?;
        let (l, v) = self.entries.remove(i);
        let best = self.removed.get(&l).copied().unwrap_or(IntCst::MAX);
        if v < best {
            self.removed.insert(l, v);
        }
        Some(v)
    }

    /// Minimum stored value, over all labels.
    pub fn min_value(&self) -> Option<IntCst> {
        self.entries.iter().map(|(_, v)| *v).min()
    }

    /// Minimum value among entries whose label is consistent with `label`.
    pub fn min_value_consistent_with(&self, label: Label) -> Option<IntCst> {
        self.entries
            .iter()
            .filter(|(l, _)| l.is_consistent_with(label))
            .map(|(_, v)| *v)
            .min()
    }

    /// Minimum value among entries whose label is subsumed by `label`
    /// (the entries applicable in every scenario where `label` holds).
    pub fn min_value_subsumed_by(&self, label: Label) -> Option<IntCst> {
        self.entries
            .iter()
            .filter(|(l, _)| label.subsumes(*l))
            .map(|(_, v)| *v)
            .min()
    }

    /// Entry under the empty label, if any.
    pub fn unlabeled_value(&self) -> Option<IntCst> {
        self.get(Label::empty())
    }

    /// Checks the domination invariant; test support.
    pub fn holds_invariant(&self) -> bool {
        for (i, &(a, va)) in self.entries.iter().enumerate() {
            for (j, &(b, vb)) in self.entries.iter().enumerate() {
                if i != j && a.subsumes(b) && vb <= va {
                    return false;
                }
            }
        }
        true
    }
}

impl std::fmt::Display for LabeledIntMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        disp_iter(f, self.iter().map(|(l, v)| Fmt(move |f| write!(f, "{l}:{v}"))), "; ")?;
        write!(f, "}}")
    }
}

impl std::fmt::Debug for LabeledIntMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

/// Upper-case labeled values: entries `(C, α, v)` meaning "if contingent C
/// takes its upper bound, then in scenarios consistent with α the constraint
/// is at most v". Domination only applies between entries of the same letter.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ALabelIntMap {
    entries: SmallVec<[(ALetter, Label, IntCst); 2]>,
}

impl ALabelIntMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ALetter, Label, IntCst)> + '_ {
        self.entries.iter().copied()
    }

    pub fn get(&self, letter: ALetter, label: Label) -> Option<IntCst> {
        self.entries
            .iter()
            .find(|(a, l, _)| *a == letter && *l == label)
            .map(|(_, _, v)| *v)
    }

    pub fn merge(&mut self, letter: ALetter, label: Label, value: IntCst) -> bool {
        if self
            .entries
            .iter()
            .any(|&(a, l, v)| a == letter && label.subsumes(l) && v <= value)
        {
            return false;
        }
        self.entries
            .retain(|&mut (a, l, v)| !(a == letter && l.subsumes(label) && value <= v));
        self.entries.push((letter, label, value));
        true
    }

    pub fn remove(&mut self, letter: ALetter, label: Label) -> Option<IntCst> {
        let i = self
            .entries
            .iter()
            .position(|(a, l, _)| *a == letter && *l == label)?;
        Some(self.entries.remove(i).2)
    }

    /// Minimum value over all letters, among labels consistent with `label`.
    pub fn min_value_consistent_with(&self, label: Label) -> Option<IntCst> {
        self.entries
            .iter()
            .filter(|(_, l, _)| l.is_consistent_with(label))
            .map(|(_, _, v)| *v)
            .min()
    }

    pub fn letters(&self) -> impl Iterator<Item = ALetter> + '_ {
        self.entries.iter().map(|(a, _, _)| *a)
    }
}

impl std::fmt::Display for ALabelIntMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        disp_iter(f, self.iter().map(|(a, l, v)| Fmt(move |f| write!(f, "{a}:{l}:{v}"))), "; ")?;
        write!(f, "}}")
    }
}

impl std::fmt::Debug for ALabelIntMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{LitState, Prop};

    fn p(c: char) -> Prop {
        Prop::from_char(c).unwrap()
    }

    fn straight(c: char) -> Label {
        Label::empty().set(p(c), LitState::Straight)
    }

    fn negated(c: char) -> Label {
        Label::empty().set(p(c), LitState::Negated)
    }

    #[test]
    fn general_smaller_value_dominates() {
        let mut m = LabeledIntMap::new();
        assert!(m.merge(straight('a'), 5));
        // the empty label is more general: with a smaller value it retires (a, 5)
        assert!(m.merge(Label::empty(), 3));
        assert_eq!(m.len(), 1);
        assert_eq!(m.unlabeled_value(), Some(3));
        // a specific label with a larger value is dominated
        assert!(!m.merge(straight('a'), 4));
        // a specific label with a smaller value coexists
        assert!(m.merge(straight('a'), 1));
        assert_eq!(m.len(), 2);
        assert!(m.holds_invariant());
    }

    #[test]
    fn removed_shadow_blocks_reinsertion() {
        let mut m = LabeledIntMap::new();
        m.merge(straight('a'), 5);
        m.merge(Label::empty(), 3); // retires (a, 5)
        assert!(!m.merge(straight('a'), 5));
        assert!(!m.merge(straight('a'), 7));
        assert!(m.merge(straight('a'), 2));
    }

    #[test]
    fn min_queries() {
        let mut m = LabeledIntMap::new();
        m.merge(straight('a'), 5);
        m.merge(negated('a'), 7);
        m.merge(straight('b'), 6);
        assert_eq!(m.min_value(), Some(5));
        assert_eq!(m.min_value_consistent_with(straight('a')), Some(5));
        assert_eq!(m.min_value_consistent_with(negated('a')), Some(6));
        let ab = straight('a').conjunction(straight('b')).unwrap();
        assert_eq!(m.min_value_subsumed_by(ab), Some(5));
        assert_eq!(m.min_value_subsumed_by(negated('a')), Some(7));
        assert_eq!(m.min_value_subsumed_by(Label::empty()), None);
    }

    #[test]
    fn upper_case_entries_dominate_per_letter() {
        let mut m = ALabelIntMap::new();
        let c = ALetter('C');
        let d = ALetter('D');
        assert!(m.merge(c, straight('a'), -5));
        assert!(m.merge(d, straight('a'), -5));
        // same letter, more general label, better value: dominates
        assert!(m.merge(c, Label::empty(), -6));
        assert_eq!(m.get(c, straight('a')), None);
        // the D entry is untouched
        assert_eq!(m.get(d, straight('a')), Some(-5));
    }
}
