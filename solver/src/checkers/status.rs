//! Status records maintained by the checking kernels.

use crate::checkers::stnu::SemiReducibleCycle;
use crate::core::IntCst;
use crate::graph::{NodeId, TNGraph};
use crate::utils::disp_field;
use std::fmt::{Display, Error, Formatter};
use std::time::Duration;

/// Width of the left column in the status reports.
const FIELD_WIDTH: usize = 22;

/// A negative cycle witnessing STN inconsistency: the node sequence (first
/// node repeated last) and the total weight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegativeCycle {
    pub nodes: Vec<NodeId>,
    pub total: IntCst,
}

/// Number of applications of each propagation rule during one check.
#[derive(Clone, Debug, Default)]
pub struct RuleStats {
    pub no_case: u64,
    pub upper_case: u64,
    pub lower_case: u64,
    pub cross_case: u64,
    pub letter_removal: u64,
    pub labeled_prop: u64,
    pub r0: u64,
    pub r3: u64,
    /// Only incremented by the potential-based (to-Z) conditional algorithm;
    /// stays 0 under Std semantics.
    pub potential_update: u64,
}

impl RuleStats {
    pub fn total(&self) -> u64 {
        self.no_case
            + self.upper_case
            + self.lower_case
            + self.cross_case
            + self.letter_removal
            + self.labeled_prop
            + self.r0
            + self.r3
            + self.potential_update
    }
}

/// Outcome and accounting of one check.
#[derive(Clone, Debug, Default)]
pub struct CheckStatus {
    /// `init_and_check` completed.
    pub initialized: bool,
    /// The propagation loop reached its fixpoint (not a timeout).
    pub finished: bool,
    /// Consistency (STN/CSTN) or controllability (STNU/CSTNU) verdict;
    /// `None` until a check ran to completion.
    pub consistent: Option<bool>,
    /// The wall-clock budget ran out; the graph may be partially mutated.
    pub timeout: bool,
    pub execution_time: Duration,
    /// Standard deviation over repeated runs; filled by benchmark drivers,
    /// never by the kernels themselves.
    pub std_dev_execution_time: Option<Duration>,
    /// Outer propagation cycles.
    pub cycles: u64,
    pub rules: RuleStats,
    pub negative_cycle: Option<NegativeCycle>,
    pub srnc: Option<SemiReducibleCycle>,
    /// Largest constraint that dispatchability minimization could not remove.
    pub max_min_constraint: Option<IntCst>,
}

impl CheckStatus {
    pub fn reset(&mut self) {
        *self = CheckStatus::default();
    }

    /// True iff the check finished and the verdict is positive.
    pub fn is_positive(&self) -> bool {
        self.finished && self.consistent == Some(true)
    }
}

impl Display for CheckStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        disp_field(f, "initialized", FIELD_WIDTH)?;
        writeln!(f, "{}", self.initialized)?;
        disp_field(f, "finished", FIELD_WIDTH)?;
        writeln!(f, "{}", self.finished)?;
        disp_field(f, "verdict", FIELD_WIDTH)?;
        match self.consistent {
            Some(v) => writeln!(f, "{v}")?,
            None => writeln!(f, "-")?,
        }
        disp_field(f, "timeout", FIELD_WIDTH)?;
        writeln!(f, "{}", self.timeout)?;
        disp_field(f, "execution time", FIELD_WIDTH)?;
        writeln!(f, "{:?}", self.execution_time)?;
        disp_field(f, "cycles", FIELD_WIDTH)?;
        writeln!(f, "{}", self.cycles)?;
        disp_field(f, "rule applications", FIELD_WIDTH)?;
        writeln!(f, "{}", self.rules.total())?;
        if let Some(c) = &self.negative_cycle {
            disp_field(f, "negative cycle", FIELD_WIDTH)?;
            writeln!(f, "{} nodes, total {}", c.nodes.len(), c.total)?;
        }
        if let Some(s) = &self.srnc {
            disp_field(f, "srnc", FIELD_WIDTH)?;
            writeln!(f, "{} edges, sum {}", s.cycle.len(), s.sum)?;
        }
        Ok(())
    }
}

/// Exit codes of the PSTN approximation loop.
pub mod exit_flag {
    /// The approximating STNU is dynamically controllable.
    pub const OK: i32 = 1;
    /// The outer loop exhausted its iteration bound.
    pub const ITERATION_LIMIT: i32 = -1;
    /// The optimizer returned an infeasible bound assignment.
    pub const INFEASIBLE: i32 = -2;
    /// The semi-reducible negative cycle contains no contingent edge:
    /// nothing can be shrunk.
    pub const NO_FREE_VARIABLE: i32 = -10;
}

/// Status of a PSTN approximation: the base record plus the probabilistic
/// outcome.
#[derive(Clone, Debug, Default)]
pub struct PstnCheckStatus {
    pub base: CheckStatus,
    /// Product over contingent links of the captured probability mass.
    pub probability_mass: f64,
    /// `≥ 1` on success; negative codes from [`exit_flag`] otherwise.
    pub exit_flag: i32,
    /// The DC STNU approximation produced by the loop, when successful.
    pub approximating_stnu: Option<TNGraph>,
}

impl Display for PstnCheckStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", self.base)?;
        disp_field(f, "probability mass", FIELD_WIDTH)?;
        writeln!(f, "{}", self.probability_mass)?;
        disp_field(f, "exit flag", FIELD_WIDTH)?;
        writeln!(f, "{}", self.exit_flag)
    }
}
