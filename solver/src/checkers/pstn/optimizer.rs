//! The optimization seam of the PSTN approximation loop.
//!
//! The loop hands the optimizer a small constrained problem over the bounds
//! of the contingent links participating in a negative cycle. The engine is a
//! trait so that an external solver can be plugged in; the default is a
//! projected gradient ascent on the summed log-masses, which is enough for
//! the shallow, single-constraint problems the loop produces.

use std::f64::consts::SQRT_2;

/// Outcome of one optimization call. `exit_flag ≥ 1` means success.
#[derive(Clone, Debug)]
pub struct OptimizationResult {
    pub solution: Vec<f64>,
    pub optimum_value: f64,
    pub exit_flag: i32,
}

/// Solves
/// ```text
/// minimize   Σⱼ −probMassⱼ(x₂ⱼ, x₂ⱼ₊₁; μⱼ, σⱼ)
/// subject to A·x ≤ b,  xᵢ > 0,  x₂ⱼ₊₁ > x₂ⱼ
/// ```
/// where variables come in (lower, upper) pairs, one pair per contingent
/// link.
pub trait OptimizationEngine {
    fn non_linear_optimization(
        &self,
        x0: &[f64],
        a: &[Vec<f64>],
        b: &[f64],
        mu: &[f64],
        sigma: &[f64],
    ) -> OptimizationResult;
}

/// Default engine: projected gradient ascent on `Σ log massⱼ` (the same
/// argmax as the product of masses), alternating gradient steps with
/// projections onto the half-spaces and the box.
pub struct ProjectedGradient {
    pub iterations: u32,
    pub step: f64,
}

impl Default for ProjectedGradient {
    fn default() -> Self {
        ProjectedGradient {
            iterations: 200,
            step: 0.5,
        }
    }
}

const FEASIBILITY_TOL: f64 = 1e-6;
/// Lower bounds may not collapse to 0 and uppers must stay above lowers.
const MIN_GAP: f64 = 1.0;

impl ProjectedGradient {
    fn project(&self, x: &mut [f64], a: &[Vec<f64>], b: &[f64]) {
        for _ in 0..32 {
            let mut violated = false;
            for j in 0..x.len() / 2 {
                x[2 * j] = x[2 * j].max(MIN_GAP);
                if x[2 * j + 1] < x[2 * j] + MIN_GAP {
                    x[2 * j + 1] = x[2 * j] + MIN_GAP;
                }
            }
            for (row, &bound) in a.iter().zip(b) {
                let dot: f64 = row.iter().zip(x.iter()).map(|(r, v)| r * v).sum();
                if dot > bound + FEASIBILITY_TOL {
                    let norm2: f64 = row.iter().map(|r| r * r).sum();
                    if norm2 == 0.0 {
                        continue;
                    }
                    let scale = (dot - bound) / norm2;
                    for (v, r) in x.iter_mut().zip(row) {
                        *v -= scale * r;
                    }
                    violated = true;
                }
            }
            if !violated {
                return;
            }
        }
    }

    fn feasible(x: &[f64], a: &[Vec<f64>], b: &[f64]) -> bool {
        let boxes = (0..x.len() / 2).all(|j| x[2 * j] > 0.0 && x[2 * j + 1] > x[2 * j]);
        let rows = a
            .iter()
            .zip(b)
            .all(|(row, &bound)| row.iter().zip(x).map(|(r, v)| r * v).sum::<f64>() <= bound + 1e-3);
        boxes && rows
    }
}

impl OptimizationEngine for ProjectedGradient {
    fn non_linear_optimization(
        &self,
        x0: &[f64],
        a: &[Vec<f64>],
        b: &[f64],
        mu: &[f64],
        sigma: &[f64],
    ) -> OptimizationResult {
        debug_assert_eq!(x0.len(), 2 * mu.len());
        let mut x = x0.to_vec();
        self.project(&mut x, a, b);

        for _ in 0..self.iterations {
            for (j, (&m, &s)) in mu.iter().zip(sigma).enumerate() {
                let (l, u) = (x[2 * j], x[2 * j + 1]);
                let mass = log_normal_mass(l, u, m, s).max(1e-12);
                // d log(mass)/d bound, pushing the interval wider
                let dl = -log_normal_density(l, m, s) / mass;
                let du = log_normal_density(u, m, s) / mass;
                x[2 * j] += self.step * dl;
                x[2 * j + 1] += self.step * du;
            }
            self.project(&mut x, a, b);
        }

        let objective: f64 = mu
            .iter()
            .zip(sigma)
            .enumerate()
            .map(|(j, (&m, &s))| -log_normal_mass(x[2 * j], x[2 * j + 1], m, s))
            .sum();
        let exit_flag = if Self::feasible(&x, a, b) { 1 } else { -1 };
        OptimizationResult {
            solution: x,
            optimum_value: objective,
            exit_flag,
        }
    }
}

/// Probability that a log-normal `(μ, σ)` duration falls in `[lower, upper]`.
pub fn log_normal_mass(lower: f64, upper: f64, mu: f64, sigma: f64) -> f64 {
    if upper <= 0.0 || upper <= lower {
        return 0.0;
    }
    let lo = if lower <= 0.0 {
        0.0
    } else {
        normal_cdf((lower.ln() - mu) / sigma)
    };
    let hi = normal_cdf((upper.ln() - mu) / sigma);
    (hi - lo).max(0.0)
}

/// Density of the log-normal distribution at `v > 0`.
pub fn log_normal_density(v: f64, mu: f64, sigma: f64) -> f64 {
    if v <= 0.0 {
        return 0.0;
    }
    let z = (v.ln() - mu) / sigma;
    (-0.5 * z * z).exp() / (v * sigma * (2.0 * std::f64::consts::PI).sqrt())
}

/// Standard normal cumulative distribution, via the Abramowitz-Stegun
/// rational approximation of erf (7.1.26, |error| < 1.5e-7).
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((normal_cdf(1.0) - 0.841_344_7).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158_655_3).abs() < 1e-6);
        assert!((normal_cdf(3.0) - 0.998_650_1).abs() < 1e-6);
    }

    #[test]
    fn mass_covers_almost_everything_at_wide_bounds() {
        let m = log_normal_mass(1.0, 10_000.0, 2.0, 0.3);
        assert!(m > 0.999, "{m}");
        assert_eq!(log_normal_mass(5.0, 5.0, 2.0, 0.3), 0.0);
        assert_eq!(log_normal_mass(-1.0, 0.0, 2.0, 0.3), 0.0);
    }

    #[test]
    fn gradient_respects_the_linear_constraint() {
        // two links, uppers capped by u₁ + u₂ ≤ 30
        let engine = ProjectedGradient::default();
        let a = vec![vec![0.0, 1.0, 0.0, 1.0]];
        let b = vec![30.0];
        let out = engine.non_linear_optimization(
            &[3.0, 19.0, 3.0, 19.0],
            &a,
            &b,
            &[2.0, 2.0],
            &[0.3, 0.3],
        );
        assert_eq!(out.exit_flag, 1);
        let sum = out.solution[1] + out.solution[3];
        assert!(sum <= 30.0 + 1e-3, "{sum}");
        assert!(out.solution[0] > 0.0 && out.solution[2] > 0.0);
        // the captured mass stays substantial
        assert!(out.optimum_value < -1.5, "{}", out.optimum_value);
    }
}
