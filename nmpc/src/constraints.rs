//! Equality constraints tying the predicted states to the vehicle model, and
//! the box bounds on the controls.

use nalgebra::DMatrix;

use crate::model;
use crate::params::Limits;
use crate::polynomial::Polynomial;
use crate::state::State;
use crate::trajectory::{Dim, Layout};

/// Residuals `c(z) = 0`: knot 0 equals the measured state, each later knot
/// equals the model step from the knot before.
#[derive(Debug, Clone)]
pub struct Dynamics {
    layout: Layout,
    dt: f64,
    path: Polynomial,
    initial: [f64; Dim::COUNT],
}

fn add_symmetric(hessian: &mut DMatrix<f64>, i: usize, j: usize, value: f64) {
    hessian[(i, j)] += value;
    if i != j {
        hessian[(j, i)] += value;
    }
}

impl Dynamics {
    pub fn new(layout: Layout, dt: f64, path: Polynomial, initial: &State) -> Self {
        Self {
            layout,
            dt,
            path,
            initial: Dim::ALL.map(|dim| dim.of(initial)),
        }
    }

    pub fn residuals(&self, z: &[f64]) -> Vec<f64> {
        let layout = &self.layout;
        let mut residuals = vec![0.0; layout.n_constraints()];
        for dim in Dim::ALL {
            let i = layout.state(dim, 0);
            residuals[i] = z[i] - self.initial[dim as usize];
        }
        for t in 0..layout.controls() {
            let next = model::step(
                &layout.knot(z, t),
                &layout.control(z, t),
                self.dt,
                &self.path,
            );
            for dim in Dim::ALL {
                let i = layout.state(dim, t + 1);
                residuals[i] = z[i] - dim.of(&next);
            }
        }
        residuals
    }

    pub fn jacobian(&self, z: &[f64]) -> DMatrix<f64> {
        let layout = &self.layout;
        let dt = self.dt;
        let mut jacobian = DMatrix::zeros(layout.n_constraints(), layout.n_vars());
        for row in 0..layout.n_constraints() {
            jacobian[(row, row)] = 1.0;
        }
        for t in 0..layout.controls() {
            let x = layout.state(Dim::X, t);
            let y = layout.state(Dim::Y, t);
            let th = layout.state(Dim::Theta, t);
            let v = layout.state(Dim::V, t);
            let e = layout.state(Dim::Etheta, t);
            let omega = layout.omega(t);
            let throttle = layout.throttle(t);
            let (sin_th, cos_th) = z[th].sin_cos();
            let (sin_e, cos_e) = z[e].sin_cos();
            let slope = self.path.slope(z[x]);
            let curvature = self.path.second_derivative(z[x]);

            let row = layout.state(Dim::X, t + 1);
            jacobian[(row, x)] = -1.0;
            jacobian[(row, v)] = -cos_th * dt;
            jacobian[(row, th)] = z[v] * sin_th * dt;

            let row = layout.state(Dim::Y, t + 1);
            jacobian[(row, y)] = -1.0;
            jacobian[(row, v)] = -sin_th * dt;
            jacobian[(row, th)] = -z[v] * cos_th * dt;

            let row = layout.state(Dim::Theta, t + 1);
            jacobian[(row, th)] = -1.0;
            jacobian[(row, omega)] = -dt;

            let row = layout.state(Dim::V, t + 1);
            jacobian[(row, v)] = -1.0;
            jacobian[(row, throttle)] = -dt;

            let row = layout.state(Dim::Cte, t + 1);
            jacobian[(row, x)] = -slope;
            jacobian[(row, y)] = 1.0;
            jacobian[(row, v)] = -sin_e * dt;
            jacobian[(row, e)] = -z[v] * cos_e * dt;

            let row = layout.state(Dim::Etheta, t + 1);
            jacobian[(row, th)] = -1.0;
            jacobian[(row, x)] = curvature / (1.0 + slope * slope);
            jacobian[(row, omega)] = -dt;
        }
        jacobian
    }

    /// Add `-sum_k multipliers[k] * hess c_k(z)` to `hessian`, the constraint
    /// part of the Lagrangian Hessian for `L = f - multipliers . c`.
    pub fn add_curvature(&self, z: &[f64], multipliers: &[f64], hessian: &mut DMatrix<f64>) {
        let layout = &self.layout;
        let dt = self.dt;
        for t in 0..layout.controls() {
            let x = layout.state(Dim::X, t);
            let th = layout.state(Dim::Theta, t);
            let v = layout.state(Dim::V, t);
            let e = layout.state(Dim::Etheta, t);
            let (sin_th, cos_th) = z[th].sin_cos();
            let (sin_e, cos_e) = z[e].sin_cos();
            let slope = self.path.slope(z[x]);
            let curvature = self.path.second_derivative(z[x]);
            let jerk = self.path.third_derivative();

            let l = multipliers[layout.state(Dim::X, t + 1)];
            add_symmetric(hessian, v, th, -l * sin_th * dt);
            add_symmetric(hessian, th, th, -l * z[v] * cos_th * dt);

            let l = multipliers[layout.state(Dim::Y, t + 1)];
            add_symmetric(hessian, v, th, l * cos_th * dt);
            add_symmetric(hessian, th, th, -l * z[v] * sin_th * dt);

            let l = multipliers[layout.state(Dim::Cte, t + 1)];
            add_symmetric(hessian, x, x, l * curvature);
            add_symmetric(hessian, v, e, l * cos_e * dt);
            add_symmetric(hessian, e, e, -l * z[v] * sin_e * dt);

            // d/dx of curvature / (1 + slope^2)
            let l = multipliers[layout.state(Dim::Etheta, t + 1)];
            let s = 1.0 + slope * slope;
            let d_atan = (jerk * s - 2.0 * slope * curvature * curvature) / (s * s);
            add_symmetric(hessian, x, x, -l * d_atan);
        }
    }
}

/// Bounds on every decision variable, infinite for the states.
pub fn bounds(layout: &Layout, limits: &Limits) -> (Vec<f64>, Vec<f64>) {
    let mut lower = vec![f64::NEG_INFINITY; layout.n_vars()];
    let mut upper = vec![f64::INFINITY; layout.n_vars()];
    for t in 0..layout.controls() {
        lower[layout.omega(t)] = limits.omega.min;
        upper[layout.omega(t)] = limits.omega.max;
        lower[layout.throttle(t)] = limits.throttle.min;
        upper[layout.throttle(t)] = limits.throttle.max;
    }
    (lower, upper)
}

pub fn max_violation(residuals: &[f64]) -> f64 {
    residuals.iter().fold(0.0, |acc, r| acc.max(r.abs()))
}
