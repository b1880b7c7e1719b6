//! PSTN approximation: finding a dynamically controllable STNU that captures
//! the maximum probability mass of log-normal contingent durations.

pub mod optimizer;

pub use optimizer::{log_normal_mass, normal_cdf, OptimizationEngine, OptimizationResult, ProjectedGradient};

use crate::checkers::status::exit_flag;
use crate::checkers::stnu::{SrncEdgeType, Stnu};
use crate::checkers::{CheckError, Deadline, PstnCheckStatus, StnuAlg, StnuConfig};
use crate::core::{ALetter, IntCst};
use crate::graph::TNGraph;
use crate::io::luke::{write_file, NetworkKind};
use env_param::EnvParam;
use std::path::Path;
use std::time::Duration;

pub static RANGE_FACTOR: EnvParam<f64> = EnvParam::new("TEMPNET_PSTN_RANGE_FACTOR", "3.3");
pub static MAX_ITERATIONS: EnvParam<u32> = EnvParam::new("TEMPNET_PSTN_MAX_ITERATIONS", "20");

/// Options of the PSTN approximation loop.
#[derive(Clone, Debug)]
pub struct PstnConfig {
    /// `f` in the initial ranges `[⌈exp(μ−f·σ)⌉, ⌊exp(μ+f·σ)⌋]`.
    pub range_factor: f64,
    /// Outer-loop bound; each iteration runs one DC check plus one
    /// optimization.
    pub max_iterations: u32,
    pub time_budget: Option<Duration>,
}

impl Default for PstnConfig {
    fn default() -> Self {
        PstnConfig {
            range_factor: RANGE_FACTOR.get(),
            max_iterations: MAX_ITERATIONS.get(),
            time_budget: None,
        }
    }
}

/// PSTN algorithm object: an STNU whose contingent durations carry log-normal
/// distributions, approximated by iteratively shrinking ranges until the
/// network becomes dynamically controllable.
pub struct Pstn {
    g: TNGraph,
    pub config: PstnConfig,
    status: PstnCheckStatus,
    engine: Box<dyn OptimizationEngine>,
}

impl Pstn {
    pub fn new(g: TNGraph) -> Pstn {
        Pstn::with_config(g, PstnConfig::default())
    }

    pub fn with_timeout(g: TNGraph, seconds: u64) -> Pstn {
        let config = PstnConfig {
            time_budget: Some(Duration::from_secs(seconds)),
            ..PstnConfig::default()
        };
        Pstn::with_config(g, config)
    }

    pub fn with_config(g: TNGraph, config: PstnConfig) -> Pstn {
        Pstn {
            g,
            config,
            status: PstnCheckStatus::default(),
            engine: Box::new(ProjectedGradient::default()),
        }
    }

    /// Replaces the optimization engine (an external solver, a test stub).
    pub fn set_optimization_engine(&mut self, engine: Box<dyn OptimizationEngine>) {
        self.engine = engine;
    }

    /// Sets every contingent range of `stnu` from its distribution and the
    /// configured range factor.
    pub fn update_contingent_bounds(&self, stnu: &mut TNGraph) -> Result<(), CheckError> {
        let f = self.config.range_factor;
        for link in stnu.links().to_vec() {
            let Some(dist) = stnu.node(link.contingent).log_normal else {
                return Err(CheckError::NotWellDefined(format!(
                    "contingent node {} has no distribution",
                    stnu.node(link.contingent).name()
                )));
            };
            let lower = (dist.mu - f * dist.sigma).exp().ceil().max(1.0) as IntCst;
            let upper = (dist.mu + f * dist.sigma).exp().floor() as IntCst;
            if lower >= upper {
                return Err(CheckError::NotWellDefined(format!(
                    "distribution of {} yields the empty range [{lower}, {upper}]",
                    stnu.node(link.contingent).name()
                )));
            }
            stnu.set_link_bounds(link.contingent, lower, upper);
        }
        Ok(())
    }

    /// The approximation loop: seed ranges from the distributions, then
    /// alternate DC checks and range shrinking until the approximating STNU
    /// is controllable or nothing can improve.
    pub fn build_approx_stnu(&mut self) -> Result<&PstnCheckStatus, CheckError> {
        self.status = PstnCheckStatus::default();
        let deadline = Deadline::start(self.config.time_budget);
        let mut working = self.g.clone();
        self.update_contingent_bounds(&mut working)?;
        self.status.base.initialized = true;

        for iteration in 1..=self.config.max_iterations {
            self.status.base.cycles = iteration as u64;
            if deadline.expired() {
                self.status.base.timeout = true;
                self.status.base.execution_time = deadline.elapsed();
                return Ok(&self.status);
            }

            let mut stnu = Stnu::with_config(
                working.clone(),
                StnuConfig {
                    alg: StnuAlg::Rul2021,
                    time_budget: self.config.time_budget,
                    output_cleaned: false,
                },
            );
            let check = stnu.dynamic_controllability_check()?.clone();
            self.status.base.rules = check.rules.clone();
            if check.timeout {
                self.status.base.timeout = true;
                self.status.base.execution_time = deadline.elapsed();
                return Ok(&self.status);
            }
            if check.consistent == Some(true) {
                self.status.probability_mass = self.total_mass(&working)?;
                self.status.exit_flag = exit_flag::OK;
                self.status.base.finished = true;
                self.status.base.consistent = Some(true);
                self.status.base.execution_time = deadline.elapsed();
                self.status.approximating_stnu = Some(working);
                return Ok(&self.status);
            }

            let srnc = check.srnc.clone().expect("witness of a failed check");
            self.status.base.srnc = Some(srnc.clone());
            if srnc.edge_type == SrncEdgeType::Ordinary {
                // no contingent participates: nothing to shrink
                self.status.exit_flag = exit_flag::NO_FREE_VARIABLE;
                self.finish_failed(&deadline);
                return Ok(&self.status);
            }

            // participating links, in letter order
            let mut letters: Vec<ALetter> = srnc
                .lower_case_counts
                .iter()
                .chain(srnc.upper_case_counts.iter())
                .map(|&(a, _)| a)
                .collect();
            letters.sort();
            letters.dedup();
            let count_of = |counts: &[(ALetter, u32)], a: ALetter| {
                counts.iter().find(|&&(l, _)| l == a).map_or(0.0, |&(_, n)| n as f64)
            };

            // the cycle value as a function of the bounds: each lower-case
            // traversal contributes +x, each upper-case one −y, the ordinary
            // edges a constant; the cycle must become non-negative
            let constant: f64 = srnc
                .expanded
                .iter()
                .filter(|e| matches!(e.kind, crate::checkers::stnu::CaseKind::Ordinary))
                .map(|e| e.value as f64)
                .sum();
            let mut row = Vec::with_capacity(2 * letters.len());
            let mut x0 = Vec::with_capacity(2 * letters.len());
            let mut mu = Vec::with_capacity(letters.len());
            let mut sigma = Vec::with_capacity(letters.len());
            for &a in &letters {
                let link = working
                    .link_of_letter(a)
                    .copied()
                    .ok_or_else(|| CheckError::NotWellDefined(format!("unknown a-letter {a} in witness")))?;
                row.push(-count_of(&srnc.lower_case_counts, a));
                row.push(count_of(&srnc.upper_case_counts, a));
                x0.push(link.lower as f64);
                x0.push(link.upper as f64);
                let dist = working.node(link.contingent).log_normal.expect("validated distribution");
                mu.push(dist.mu);
                sigma.push(dist.sigma);
            }

            let result = self
                .engine
                .non_linear_optimization(&x0, &[row], &[constant], &mu, &sigma);
            tracing::debug!(
                "iteration {iteration}: optimizer exit {} objective {}",
                result.exit_flag,
                result.optimum_value
            );
            if result.exit_flag < 1 {
                self.status.exit_flag = result.exit_flag.min(-1);
                self.finish_failed(&deadline);
                return Ok(&self.status);
            }

            // apply the solution, ceiling lowers and flooring uppers, never
            // widening a range
            for (j, &a) in letters.iter().enumerate() {
                let link = working.link_of_letter(a).copied().expect("validated link");
                let lower = (result.solution[2 * j].ceil() as IntCst).max(link.lower);
                let upper = (result.solution[2 * j + 1].floor() as IntCst).min(link.upper);
                if !(0 < lower && lower < upper) {
                    self.status.exit_flag = exit_flag::INFEASIBLE;
                    self.finish_failed(&deadline);
                    return Ok(&self.status);
                }
                working.set_link_bounds(link.contingent, lower, upper);
            }
        }

        // the iteration budget ran out without reaching controllability
        self.status.exit_flag = exit_flag::ITERATION_LIMIT;
        self.finish_failed(&deadline);
        Ok(&self.status)
    }

    fn finish_failed(&mut self, deadline: &Deadline) {
        self.status.base.finished = true;
        self.status.base.consistent = Some(false);
        self.status.base.execution_time = deadline.elapsed();
    }

    /// Product of the captured probability masses over every contingent link.
    fn total_mass(&self, g: &TNGraph) -> Result<f64, CheckError> {
        let mut mass = 1.0;
        for link in g.links() {
            let dist = g.node(link.contingent).log_normal.ok_or_else(|| {
                CheckError::NotWellDefined(format!(
                    "contingent node {} has no distribution",
                    g.node(link.contingent).name()
                ))
            })?;
            mass *= log_normal_mass(link.lower as f64, link.upper as f64, dist.mu, dist.sigma);
        }
        Ok(mass)
    }

    pub fn graph(&self) -> &TNGraph {
        &self.g
    }

    pub fn set_graph(&mut self, g: TNGraph) {
        self.g = g;
        self.status = PstnCheckStatus::default();
    }

    pub fn check_status(&self) -> &PstnCheckStatus {
        &self.status
    }

    pub fn reset(&mut self) {
        self.status = PstnCheckStatus::default();
    }

    pub fn save_graph_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        write_file(path, &self.g, NetworkKind::Pstn)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::graph::LogNormal;

    /// Two log-normal links chained into a cycle that is tight when both
    /// upper bounds sit at the extreme quantile.
    fn two_link_pstn() -> TNGraph {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a1 = g.add_named("A1").unwrap();
        let c1 = g.add_named("C1").unwrap();
        let a2 = g.add_named("A2").unwrap();
        let c2 = g.add_named("C2").unwrap();
        g.add_contingent_link(a1, 3, 19, c1);
        g.add_contingent_link(a2, 3, 19, c2);
        g.node_mut(c1).log_normal = Some(LogNormal { mu: 2.0, sigma: 0.3 });
        g.node_mut(c2).log_normal = Some(LogNormal { mu: 2.0, sigma: 0.3 });
        // C1 and A2 coincide; the whole chain must fit in 30
        g.add_ordinary_edge(c1, a2, 0);
        g.add_ordinary_edge(a2, c1, 0);
        g.add_ordinary_edge(a1, c2, 30);
        g
    }

    #[test]
    fn ranges_seed_from_the_distribution() {
        let pstn = Pstn::new(two_link_pstn());
        let mut g = pstn.graph().clone();
        pstn.update_contingent_bounds(&mut g).unwrap();
        // exp(2 − 3.3·0.3) ≈ 2.72 and exp(2 + 3.3·0.3) ≈ 19.9
        for link in g.links() {
            assert_eq!((link.lower, link.upper), (3, 19));
        }
    }

    #[test]
    fn loop_tightens_until_controllable() {
        let mut pstn = Pstn::new(two_link_pstn());
        let status = pstn.build_approx_stnu().unwrap().clone();
        assert!(status.exit_flag >= 1, "exit flag {}", status.exit_flag);
        assert!(status.base.cycles >= 2, "expected at least two iterations");
        assert!(status.probability_mass > 0.5 && status.probability_mass < 1.0);
        let approx = status.approximating_stnu.expect("approximating STNU");
        // the ranges shrank into subsets and the chain now fits
        let mut upper_sum = 0;
        for link in approx.links() {
            assert!(link.lower >= 3 && link.upper <= 19);
            upper_sum += link.upper;
        }
        assert!(upper_sum <= 30);
    }

    #[test]
    fn missing_distribution_is_rejected() {
        let mut g = TNGraph::new();
        g.add_named("Z").unwrap();
        let a = g.add_named("A").unwrap();
        let c = g.add_named("C").unwrap();
        g.add_contingent_link(a, 2, 5, c);
        let mut pstn = Pstn::new(g);
        assert!(matches!(
            pstn.build_approx_stnu(),
            Err(CheckError::NotWellDefined(_))
        ));
    }
}
