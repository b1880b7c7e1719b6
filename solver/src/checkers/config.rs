//! Configuration value structs and algorithm selectors.
//!
//! Defaults can be overridden through `TEMPNET_*` environment variables, read
//! once on first access.

use crate::core::IntCst;
use env_param::EnvParam;
use std::str::FromStr;
use std::time::Duration;

pub static STN_ALG: EnvParam<StnAlg> = EnvParam::new("TEMPNET_STN_ALG", "bellman-ford");
pub static STNU_ALG: EnvParam<StnuAlg> = EnvParam::new("TEMPNET_STNU_ALG", "rul2021");
pub static CSTN_ALG: EnvParam<CstnAlg> = EnvParam::new("TEMPNET_CSTN_ALG", "hp19");
pub static CSTN_SEMANTICS: EnvParam<Semantics> = EnvParam::new("TEMPNET_CSTN_SEMANTICS", "ir");

/// STN consistency algorithms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StnAlg {
    /// Single-source Bellman-Ford with a virtual source.
    BellmanFord,
    /// Single-source Dijkstra; refuses graphs with negative weights.
    Dijkstra,
    /// Johnson all-pairs shortest paths; replaces the graph by its minimal
    /// distance form.
    Johnson,
    /// Floyd-Warshall all-pairs shortest paths.
    FloydWarshall,
}

impl FromStr for StnAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bellman-ford" => Ok(StnAlg::BellmanFord),
            "dijkstra" => Ok(StnAlg::Dijkstra),
            "johnson" => Ok(StnAlg::Johnson),
            "floyd-warshall" => Ok(StnAlg::FloydWarshall),
            x => Err(format!(
                "Unknown STN algorithm: {x}. Valid options: bellman-ford, dijkstra, johnson, floyd-warshall"
            )),
        }
    }
}

/// STNU dynamic-controllability algorithms.
///
/// `Rul2021` and `Rul2020` share the rule engine; the latter restricts
/// propagation to edges ending at Z. The remaining historical names are
/// recognized but rejected at check time.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StnuAlg {
    Morris2014,
    Morris2014Dispatchable,
    Rul2018,
    Rul2020,
    Rul2021,
    FdStnu,
    FdStnuImproved,
    FastStnuDispatch,
    SrncFinder,
}

impl StnuAlg {
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            StnuAlg::Rul2020 | StnuAlg::Rul2021 | StnuAlg::FastStnuDispatch | StnuAlg::SrncFinder
        )
    }

    /// True when propagation is restricted to edges terminating at Z.
    pub fn only_to_z(self) -> bool {
        matches!(self, StnuAlg::Rul2020)
    }
}

impl FromStr for StnuAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "morris2014" => Ok(StnuAlg::Morris2014),
            "morris2014-dispatchable" => Ok(StnuAlg::Morris2014Dispatchable),
            "rul2018" => Ok(StnuAlg::Rul2018),
            "rul2020" => Ok(StnuAlg::Rul2020),
            "rul2021" => Ok(StnuAlg::Rul2021),
            "fd-stnu" => Ok(StnuAlg::FdStnu),
            "fd-stnu-improved" => Ok(StnuAlg::FdStnuImproved),
            "fast-dispatch" => Ok(StnuAlg::FastStnuDispatch),
            "srnc-finder" => Ok(StnuAlg::SrncFinder),
            x => Err(format!("Unknown STNU algorithm: {x}")),
        }
    }
}

/// CSTN dynamic-consistency algorithms.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CstnAlg {
    /// Full propagation over all edge pairs.
    HunsbergerPosenato18,
    /// Full propagation with unknown-literal (q-rule) handling.
    HunsbergerPosenato19,
    /// Potential-based propagation restricted to edges ending at Z.
    HunsbergerPosenato20,
}

impl CstnAlg {
    pub fn only_to_z(self) -> bool {
        matches!(self, CstnAlg::HunsbergerPosenato20)
    }

    pub fn uses_unknowns(self) -> bool {
        matches!(self, CstnAlg::HunsbergerPosenato19 | CstnAlg::HunsbergerPosenato20)
    }
}

impl FromStr for CstnAlg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hp18" => Ok(CstnAlg::HunsbergerPosenato18),
            "hp19" => Ok(CstnAlg::HunsbergerPosenato19),
            "hp20" => Ok(CstnAlg::HunsbergerPosenato20),
            x => Err(format!("Unknown CSTN algorithm: {x}. Valid options: hp18, hp19, hp20")),
        }
    }
}

/// Reaction-time semantics of conditional dynamic consistency.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Semantics {
    /// The responder schedules strictly after the observation.
    Std,
    /// Instantaneous reaction: scheduling at the observation instant is allowed.
    Ir,
    /// Reaction delayed by a fixed positive ε.
    Eps(IntCst),
}

impl Semantics {
    /// Threshold below which a value cannot depend on an observation outcome:
    /// a rule consuming an observed proposition fires on values `< guard`.
    /// IR: 0 (strictly-negative values only); Std: 1 (the one-tick guard);
    /// ε: the reaction delay itself.
    pub fn reaction_guard(self) -> IntCst {
        match self {
            Semantics::Ir => 0,
            Semantics::Std => 1,
            Semantics::Eps(e) => e,
        }
    }
}

impl FromStr for Semantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "std" => Ok(Semantics::Std),
            "ir" => Ok(Semantics::Ir),
            _ => match s.strip_prefix("eps:").map(IntCst::from_str) {
                Some(Ok(e)) if e > 0 => Ok(Semantics::Eps(e)),
                _ => Err(format!("Unknown semantics: {s}. Valid options: std, ir, eps:<n>")),
            },
        }
    }
}

impl std::fmt::Display for Semantics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Semantics::Std => write!(f, "Std"),
            Semantics::Ir => write!(f, "IR"),
            Semantics::Eps(e) => write!(f, "ε({e})"),
        }
    }
}

/// Options of the STN checker.
#[derive(Clone, Debug)]
pub struct StnConfig {
    pub alg: StnAlg,
    pub time_budget: Option<Duration>,
}

impl Default for StnConfig {
    fn default() -> Self {
        StnConfig {
            alg: STN_ALG.get(),
            time_budget: None,
        }
    }
}

/// Options of the STNU checker.
#[derive(Clone, Debug)]
pub struct StnuConfig {
    pub alg: StnuAlg,
    pub time_budget: Option<Duration>,
    /// Replace the checked graph with the cleaned (minimized) form on success.
    pub output_cleaned: bool,
}

impl Default for StnuConfig {
    fn default() -> Self {
        StnuConfig {
            alg: STNU_ALG.get(),
            time_budget: None,
            output_cleaned: false,
        }
    }
}

/// Options of the CSTN / CSTNU checkers.
#[derive(Clone, Debug)]
pub struct CstnConfig {
    pub alg: CstnAlg,
    pub semantics: Semantics,
    /// Drop node labels, compensating on edge labels (streamlining).
    pub wo_node_labels: bool,
    pub time_budget: Option<Duration>,
}

impl Default for CstnConfig {
    fn default() -> Self {
        CstnConfig {
            alg: CSTN_ALG.get(),
            semantics: CSTN_SEMANTICS.get(),
            wo_node_labels: false,
            time_budget: None,
        }
    }
}

impl CstnConfig {
    /// Std semantics cannot be combined with to-Z-only propagation.
    pub fn validate(&self) -> Result<(), super::CheckError> {
        if self.semantics == Semantics::Std && self.alg.only_to_z() {
            return Err(super::CheckError::UnsupportedConfiguration(
                "Std semantics is incompatible with propagation restricted to Z".to_string(),
            ));
        }
        if let Semantics::Eps(e) = self.semantics {
            if e <= 0 {
                return Err(super::CheckError::UnsupportedConfiguration(format!(
                    "ε semantics requires a positive reaction time, got {e}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn semantics_parse_and_guards() {
        assert_eq!(Semantics::from_str("ir"), Ok(Semantics::Ir));
        assert_eq!(Semantics::from_str("eps:5"), Ok(Semantics::Eps(5)));
        assert!(Semantics::from_str("eps:0").is_err());
        assert_eq!(Semantics::Ir.reaction_guard(), 0);
        assert_eq!(Semantics::Std.reaction_guard(), 1);
        assert_eq!(Semantics::Eps(3).reaction_guard(), 3);
    }

    #[test]
    fn std_to_z_is_rejected() {
        let cfg = CstnConfig {
            alg: CstnAlg::HunsbergerPosenato20,
            semantics: Semantics::Std,
            wo_node_labels: false,
            time_budget: None,
        };
        assert!(cfg.validate().is_err());
    }
}
