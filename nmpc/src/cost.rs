//! Weighted tracking, actuation and smoothness objective.

use nalgebra::DMatrix;

use crate::params::{Desired, Params, Weights};
use crate::trajectory::{Dim, Layout, Trajectory};

#[derive(Debug, Clone, Copy)]
pub struct TrackingCost {
    weights: Weights,
    desired: Desired,
}

impl TrackingCost {
    pub fn new(params: &Params) -> Self {
        Self {
            weights: params.weights,
            desired: params.desired,
        }
    }

    /// (dimension, weight, target) of the tracking terms
    fn tracking_terms(&self) -> [(Dim, f64, f64); 3] {
        [
            (Dim::Cte, self.weights.cte, self.desired.cte),
            (Dim::Etheta, self.weights.etheta, self.desired.etheta),
            (Dim::V, self.weights.vel, self.desired.vel),
        ]
    }

    /// Cost attributed to each knot: tracking at the knot, the control leaving
    /// it and its change from the previous control. Sums to `value`.
    pub fn stage_costs(&self, layout: &Layout, z: &[f64]) -> Vec<f64> {
        let w = &self.weights;
        (0..layout.timesteps())
            .map(|t| {
                let mut stage: f64 = self
                    .tracking_terms()
                    .iter()
                    .map(|&(dim, weight, target)| {
                        let error = z[layout.state(dim, t)] - target;
                        weight * error * error
                    })
                    .sum();
                if t < layout.controls() {
                    let omega = z[layout.omega(t)];
                    let throttle = z[layout.throttle(t)];
                    stage += w.omega * omega * omega + w.acc * throttle * throttle;
                    if t > 0 {
                        let d_omega = omega - z[layout.omega(t - 1)];
                        let d_throttle = throttle - z[layout.throttle(t - 1)];
                        stage += w.omega_d * d_omega * d_omega + w.acc_d * d_throttle * d_throttle;
                    }
                }
                stage
            })
            .collect()
    }

    pub fn value(&self, layout: &Layout, z: &[f64]) -> f64 {
        self.stage_costs(layout, z).iter().sum()
    }

    pub fn trajectory_cost(&self, trajectory: &Trajectory) -> f64 {
        let layout = Layout::new(trajectory.timesteps());
        self.value(&layout, &layout.pack(trajectory))
    }

    pub fn gradient(&self, layout: &Layout, z: &[f64]) -> Vec<f64> {
        let w = &self.weights;
        let mut grad = vec![0.0; layout.n_vars()];
        for t in 0..layout.timesteps() {
            for (dim, weight, target) in self.tracking_terms() {
                let i = layout.state(dim, t);
                grad[i] += 2.0 * weight * (z[i] - target);
            }
        }
        for (index, weight, rate_weight) in [
            (Layout::omega as fn(&Layout, usize) -> usize, w.omega, w.omega_d),
            (Layout::throttle, w.acc, w.acc_d),
        ] {
            for t in 0..layout.controls() {
                let i = index(layout, t);
                grad[i] += 2.0 * weight * z[i];
                if t > 0 {
                    let prev = index(layout, t - 1);
                    let diff = 2.0 * rate_weight * (z[i] - z[prev]);
                    grad[i] += diff;
                    grad[prev] -= diff;
                }
            }
        }
        grad
    }

    /// The objective is quadratic so its Hessian does not depend on `z`.
    pub fn hessian(&self, layout: &Layout) -> DMatrix<f64> {
        let w = &self.weights;
        let n = layout.n_vars();
        let mut hessian = DMatrix::zeros(n, n);
        for t in 0..layout.timesteps() {
            for (dim, weight, _) in self.tracking_terms() {
                let i = layout.state(dim, t);
                hessian[(i, i)] += 2.0 * weight;
            }
        }
        for (index, weight, rate_weight) in [
            (Layout::omega as fn(&Layout, usize) -> usize, w.omega, w.omega_d),
            (Layout::throttle, w.acc, w.acc_d),
        ] {
            for t in 0..layout.controls() {
                let i = index(layout, t);
                hessian[(i, i)] += 2.0 * weight;
                if t > 0 {
                    let prev = index(layout, t - 1);
                    hessian[(i, i)] += 2.0 * rate_weight;
                    hessian[(prev, prev)] += 2.0 * rate_weight;
                    hessian[(i, prev)] -= 2.0 * rate_weight;
                    hessian[(prev, i)] -= 2.0 * rate_weight;
                }
            }
        }
        hessian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Bounds, Forward, Limits};
    use crate::state::{Control, State};
    use finitediff::FiniteDiff;

    fn params(timesteps: usize) -> Params {
        Params {
            forward: Forward { timesteps, dt: 0.1 },
            desired: Desired {
                vel: 0.5,
                ..Default::default()
            },
            limits: Limits {
                omega: Bounds::symmetric(2.0),
                throttle: Bounds::symmetric(1.0),
            },
            weights: Weights {
                cte: 87.859183,
                etheta: 99.532785,
                vel: 54.116644,
                omega: 47.430096,
                acc: 2.185306,
                omega_d: 4.6115,
                acc_d: 66.870729,
            },
        }
    }

    fn sample(layout: &Layout) -> Vec<f64> {
        (0..layout.n_vars())
            .map(|i| ((i as f64) * 0.37).sin())
            .collect()
    }

    #[test]
    fn hand_computed_cost() {
        let p = params(3);
        let cost = TrackingCost::new(&p);
        let trajectory = Trajectory {
            states: vec![
                State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0),
                State::new(0.0, 0.0, 0.0, 0.5, 0.0, 0.0, 0.0, 0.5),
                State::new(0.0, 0.0, 0.0, 1.5, 0.0, 0.0, 0.0, 0.0),
            ],
            controls: vec![Control::new(1.0, 0.0), Control::new(0.0, 2.0)],
        };
        let w = p.weights;
        let tracking = w.cte + w.vel * 0.25 + w.etheta * 0.25 + w.vel;
        let actuation = w.omega + w.acc * 4.0;
        // only the second control has a predecessor
        let rate = w.omega_d + w.acc_d * 4.0;
        let expected = tracking + actuation + rate;
        assert!((cost.trajectory_cost(&trajectory) - expected).abs() < 1e-9);
    }

    #[test]
    fn stage_costs_sum_to_total() {
        let p = params(6);
        let layout = Layout::new(6);
        let cost = TrackingCost::new(&p);
        let z = sample(&layout);
        let stages = cost.stage_costs(&layout, &z);
        assert_eq!(stages.len(), 6);
        assert!(stages.iter().all(|c| *c >= 0.0));
        assert!((stages.iter().sum::<f64>() - cost.value(&layout, &z)).abs() < 1e-12);
    }

    #[test]
    fn minimum_horizon_has_no_rate_terms() {
        let mut p = params(2);
        p.weights = Weights {
            omega_d: 1.0e6,
            acc_d: 1.0e6,
            ..Default::default()
        };
        let layout = Layout::new(2);
        let z = sample(&layout);
        assert_eq!(TrackingCost::new(&p).value(&layout, &z), 0.0);
    }

    #[test]
    fn gradient_matches_finite_differences() {
        let p = params(5);
        let layout = Layout::new(5);
        let cost = TrackingCost::new(&p);
        let z = sample(&layout);
        let numeric = z.central_diff(&|x: &Vec<f64>| cost.value(&layout, x));
        let analytic = cost.gradient(&layout, &z);
        for (a, n) in analytic.iter().zip(numeric.iter()) {
            assert!((a - n).abs() < 1e-4 * (1.0 + a.abs()), "{a} vs {n}");
        }
    }

    #[test]
    fn hessian_matches_gradient_differences() {
        let p = params(4);
        let layout = Layout::new(4);
        let cost = TrackingCost::new(&p);
        let z = sample(&layout);
        let hessian = cost.hessian(&layout);
        for i in 0..layout.n_vars() {
            let column = z.central_diff(&|x: &Vec<f64>| cost.gradient(&layout, x)[i]);
            for (j, value) in column.iter().enumerate() {
                assert!((hessian[(i, j)] - value).abs() < 1e-4, "{i} {j}");
            }
        }
    }
}
