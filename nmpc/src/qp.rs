//! Active-set solver for the SQP subproblem
//!
//! ```text
//! min  1/2 d'Bd + g'd
//! s.t. A d + c = 0
//!      lower <= z + d <= upper
//! ```
//!
//! Each working set is solved through the dense KKT system of the free
//! variables.

use log::trace;
use nalgebra::{DMatrix, DVector};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum QpError {
    #[error("KKT system is singular")]
    Singular,
    #[error("working set did not settle within {0} iterations")]
    IterationLimit(usize),
}

#[derive(Debug, Clone)]
pub struct QpStep {
    pub step: Vec<f64>,
    /// equality multipliers at the step, `B d + g - A' multipliers` vanishes on the free variables
    pub multipliers: Vec<f64>,
    pub iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Lower,
    Upper,
}

// bound multipliers more wrong than this get released
const RELEASE_TOL: f64 = 1e-12;

pub struct BoxQp<'a> {
    pub hessian: &'a DMatrix<f64>,
    pub gradient: &'a [f64],
    pub jacobian: &'a DMatrix<f64>,
    pub residuals: &'a [f64],
    pub point: &'a [f64],
    pub lower: &'a [f64],
    pub upper: &'a [f64],
}

impl BoxQp<'_> {
    fn bound(&self, i: usize, side: Side) -> f64 {
        match side {
            Side::Lower => self.lower[i],
            Side::Upper => self.upper[i],
        }
    }

    /// variables sitting on a bound start in the working set
    fn initial_working_set(&self) -> Vec<Option<Side>> {
        (0..self.point.len())
            .map(|i| {
                if self.point[i] <= self.lower[i] {
                    Some(Side::Lower)
                } else if self.point[i] >= self.upper[i] {
                    Some(Side::Upper)
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn solve(&self) -> Result<QpStep, QpError> {
        let n = self.point.len();
        let bounded = (0..n)
            .filter(|&i| self.lower[i].is_finite() || self.upper[i].is_finite())
            .count();
        let max_iters = 4 * bounded + 20;

        let mut working = self.initial_working_set();
        let mut step = vec![0.0; n];
        for iteration in 1..=max_iters {
            let free: Vec<usize> = (0..n).filter(|&i| working[i].is_none()).collect();
            let (p, multipliers) = self.solve_kkt(&free, &step)?;

            // ratio test against the bounds of the free variables
            let mut alpha = 1.0;
            let mut blocking = None;
            for (a, &i) in free.iter().enumerate() {
                let (room, side) = if p[a] < 0.0 && self.lower[i].is_finite() {
                    (self.lower[i] - self.point[i] - step[i], Side::Lower)
                } else if p[a] > 0.0 && self.upper[i].is_finite() {
                    (self.upper[i] - self.point[i] - step[i], Side::Upper)
                } else {
                    continue;
                };
                let ratio = (room / p[a]).max(0.0);
                if ratio < alpha {
                    alpha = ratio;
                    blocking = Some((i, side));
                }
            }
            for (a, &i) in free.iter().enumerate() {
                step[i] += alpha * p[a];
            }

            if let Some((i, side)) = blocking {
                trace!("qp iteration {iteration}: variable {i} blocked at {side:?} bound");
                step[i] = self.bound(i, side) - self.point[i];
                working[i] = Some(side);
                continue;
            }

            // full step taken, check the signs of the bound multipliers
            let d = DVector::from_column_slice(&step);
            let r = self.hessian * &d + DVector::from_column_slice(self.gradient);
            let at = self.jacobian.tr_mul(&DVector::from_column_slice(&multipliers));
            let mut release = None;
            let mut worst = RELEASE_TOL;
            for (i, side) in working.iter().enumerate() {
                let Some(side) = side else {
                    continue;
                };
                let mu = r[i] - at[i];
                let wrong = match side {
                    Side::Lower => -mu,
                    Side::Upper => mu,
                };
                if wrong > worst {
                    worst = wrong;
                    release = Some(i);
                }
            }
            match release {
                Some(i) => {
                    trace!("qp iteration {iteration}: releasing variable {i}");
                    working[i] = None;
                }
                None => {
                    return Ok(QpStep {
                        step,
                        multipliers,
                        iterations: iteration,
                    })
                }
            }
        }
        Err(QpError::IterationLimit(max_iters))
    }

    /// Solve for the increment `p` of the free variables and the equality
    /// multipliers, the fixed variables stay where they are.
    fn solve_kkt(&self, free: &[usize], step: &[f64]) -> Result<(Vec<f64>, Vec<f64>), QpError> {
        let nf = free.len();
        let m = self.residuals.len();
        let d = DVector::from_column_slice(step);
        let r = self.hessian * &d + DVector::from_column_slice(self.gradient);
        let linear = self.jacobian * &d + DVector::from_column_slice(self.residuals);

        let mut kkt = DMatrix::zeros(nf + m, nf + m);
        let mut rhs = DVector::zeros(nf + m);
        for (a, &i) in free.iter().enumerate() {
            for (b, &j) in free.iter().enumerate() {
                kkt[(a, b)] = self.hessian[(i, j)];
            }
            for k in 0..m {
                let a_ki = self.jacobian[(k, i)];
                kkt[(a, nf + k)] = -a_ki;
                kkt[(nf + k, a)] = a_ki;
            }
            rhs[a] = -r[i];
        }
        for k in 0..m {
            rhs[nf + k] = -linear[k];
        }

        let solution = kkt.lu().solve(&rhs).ok_or(QpError::Singular)?;
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(QpError::Singular);
        }
        let p = solution.rows(0, nf).iter().copied().collect();
        let multipliers = solution.rows(nf, m).iter().copied().collect();
        Ok((p, multipliers))
    }
}
