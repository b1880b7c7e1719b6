//! STNU dynamic controllability checking.

pub(crate) mod dispatch;
pub(crate) mod rul;
pub mod srnc;

pub use srnc::{CaseKind, SemiReducibleCycle, SrncEdge, SrncEdgeType};

use crate::checkers::init::{init_and_check, InitInfo};
use crate::checkers::stnu::rul::{RulEngine, StnuOutcome};
use crate::checkers::{stn, CheckError, CheckStatus, Deadline, StnuAlg, StnuConfig};
use crate::graph::TNGraph;
use crate::io::luke::{write_file, NetworkKind};
use std::path::Path;
use std::time::Duration;

/// STNU algorithm object: owns a graph, a configuration and the status of
/// the last check.
pub struct Stnu {
    g: TNGraph,
    pub config: StnuConfig,
    status: CheckStatus,
    info: Option<InitInfo>,
}

impl Stnu {
    pub fn new(g: TNGraph) -> Stnu {
        Stnu::with_config(g, StnuConfig::default())
    }

    pub fn with_timeout(g: TNGraph, seconds: u64) -> Stnu {
        let config = StnuConfig {
            time_budget: Some(Duration::from_secs(seconds)),
            ..StnuConfig::default()
        };
        Stnu::with_config(g, config)
    }

    pub fn with_config(g: TNGraph, config: StnuConfig) -> Stnu {
        Stnu {
            g,
            config,
            status: CheckStatus::default(),
            info: None,
        }
    }

    pub fn set_default_controllability_check_alg(&mut self, alg: StnuAlg) {
        self.config.alg = alg;
    }

    pub fn set_output_cleaned(&mut self, cleaned: bool) {
        self.config.output_cleaned = cleaned;
    }

    /// Normalizes the owned graph and validates its contingent links.
    pub fn init_and_check(&mut self) -> Result<&CheckStatus, CheckError> {
        self.info = Some(init_and_check(&mut self.g, &mut self.status, true)?);
        Ok(&self.status)
    }

    /// Runs the configured dynamic-controllability algorithm.
    pub fn dynamic_controllability_check(&mut self) -> Result<&CheckStatus, CheckError> {
        let alg = self.config.alg;
        self.dynamic_controllability_check_with(alg)
    }

    /// Runs a specific algorithm, overriding the configured one.
    pub fn dynamic_controllability_check_with(&mut self, alg: StnuAlg) -> Result<&CheckStatus, CheckError> {
        if !alg.is_supported() {
            return Err(CheckError::UnsupportedConfiguration(format!(
                "{alg:?} is not available; use Rul2021, Rul2020, FastStnuDispatch or SrncFinder"
            )));
        }
        if !self.status.initialized {
            self.init_and_check()?;
        }
        let info = self.info.expect("initialized");
        let deadline = Deadline::start(self.config.time_budget);
        let outcome = RulEngine::new(&mut self.g, &mut self.status, info, alg.only_to_z()).check(&deadline);
        self.status.execution_time = deadline.elapsed();
        match outcome {
            StnuOutcome::Controllable => {
                self.status.finished = true;
                self.status.consistent = Some(true);
                if self.config.output_cleaned {
                    self.minimize()?;
                }
            }
            StnuOutcome::NotControllable(srnc) => {
                self.status.finished = true;
                self.status.consistent = Some(false);
                self.status.srnc = Some(srnc);
            }
            StnuOutcome::Timeout => {
                self.status.finished = false;
                self.status.timeout = true;
            }
        }
        Ok(&self.status)
    }

    /// Minimizes the checked network into dispatchable form, preserving the
    /// contingent links and the derived waits. Returns false when the network
    /// is not (or not yet known to be) controllable.
    pub fn apply_min_dispatchable_estnu(&mut self) -> Result<bool, CheckError> {
        if self.status.consistent.is_none() {
            self.dynamic_controllability_check()?;
        }
        if self.status.consistent != Some(true) {
            return Ok(false);
        }
        self.minimize()?;
        Ok(true)
    }

    fn minimize(&mut self) -> Result<(), CheckError> {
        let deadline = Deadline::start(self.config.time_budget);
        match stn::apsp::johnson(&self.g, &deadline) {
            Ok(matrix) => {
                self.status.max_min_constraint = dispatch::minimize_estnu(&mut self.g, &matrix);
                Ok(())
            }
            Err(_) => {
                // a controllable network is consistent; reaching this means
                // the owned graph was changed behind our back
                self.status.consistent = Some(false);
                Ok(())
            }
        }
    }

    pub fn graph(&self) -> &TNGraph {
        &self.g
    }

    /// Replaces the owned graph, clearing the status and every cache.
    pub fn set_graph(&mut self, g: TNGraph) {
        self.g = g;
        self.reset();
    }

    /// A copy of the owned graph in its current (possibly checked) form.
    pub fn checked_graph(&self) -> TNGraph {
        self.g.clone()
    }

    pub fn into_graph(self) -> TNGraph {
        self.g
    }

    pub fn check_status(&self) -> &CheckStatus {
        &self.status
    }

    pub fn reset(&mut self) {
        self.status.reset();
        self.info = None;
    }

    pub fn save_graph_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        write_file(path, &self.g, NetworkKind::Stnu)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::ConstraintType;

    fn squeezed() -> TNGraph {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 1, 10, c);
        g.add_ordinary_edge(c, a, -2);
        g
    }

    #[test]
    fn verdicts_agree_across_rul_variants() {
        for alg in [StnuAlg::Rul2021, StnuAlg::Rul2020] {
            let mut stnu = Stnu::new(squeezed());
            let status = stnu.dynamic_controllability_check_with(alg).unwrap();
            assert_eq!(status.consistent, Some(false), "{alg:?}");
            assert!(status.srnc.is_some(), "{alg:?}");
        }
    }

    #[test]
    fn unsupported_algorithms_are_rejected() {
        let mut stnu = Stnu::new(squeezed());
        assert!(matches!(
            stnu.dynamic_controllability_check_with(StnuAlg::Morris2014),
            Err(CheckError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn minimized_network_keeps_its_contingent_link() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        let x = g.add_named("X").unwrap();
        g.add_contingent_link(a, 2, 5, c);
        g.add_ordinary_edge(x, a, 10);
        g.add_ordinary_edge(a, x, 0);
        let mut stnu = Stnu::new(g);
        let status = stnu.dynamic_controllability_check().unwrap();
        assert_eq!(status.consistent, Some(true));
        assert!(stnu.apply_min_dispatchable_estnu().unwrap());
        let g = stnu.graph();
        let a = g.node_id("A").unwrap();
        let c = g.node_id("C").unwrap();
        let ac = g.edge_between(a, c).unwrap();
        assert_eq!(g.edge(ac).kind, ConstraintType::Contingent);
        assert_eq!(g.edge(ac).value.unwrap(), 5);
        assert!(g.edge(ac).lower_case.is_some());
    }
}
