//! Line search SQP on an l1 merit function, as an argmin `Solver`.

use std::fmt;

use argmin::core::{
    CostFunction, Error, Gradient, Hessian, IterState, Jacobian, Operator, Problem, Solver,
    TerminationReason, TerminationStatus, KV,
};
use argmin_math::{ArgminDot, ArgminScaledAdd};
use log::{debug, warn};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::constraints::max_violation;
use crate::problem::ConstraintCurvature;
use crate::qp::{BoxQp, QpStep};

pub type SqpState = IterState<Vec<f64>, Vec<f64>, (), (), (), f64>;

const ARMIJO: f64 = 1e-4;
const MIN_STEP: f64 = 1e-10;
// keeps the QP Hessian nonsingular when some weights are zero
const REGULARIZATION: f64 = 1e-8;
const CURVATURE_TOL: f64 = 1e-12;

/// which Hessian the QP subproblem is built on
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HessianMode {
    /// Lagrangian Hessian, falls back to `GaussNewton` for steps without positive curvature
    #[default]
    Exact,
    /// cost Hessian only
    GaussNewton,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveStatus {
    Converged,
    IterationLimit,
    Timeout,
    /// line search could not decrease the merit function
    Stalled,
    /// no usable step, or a non-finite value turned up
    Degenerate,
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            SolveStatus::Converged => "converged",
            SolveStatus::IterationLimit => "iteration limit reached",
            SolveStatus::Timeout => "timed out",
            SolveStatus::Stalled => "stalled",
            SolveStatus::Degenerate => "numerically degenerate",
        };
        write!(f, "{text}")
    }
}

/// an accepted point and how good it is
#[derive(Debug, Clone)]
pub struct Iterate {
    pub param: Vec<f64>,
    pub cost: f64,
    pub violation: f64,
    /// stationarity residual at `param`
    pub kkt_residual: f64,
}

impl Iterate {
    /// Feasible beats infeasible. Among feasible points the lower cost wins
    /// unless the costs tie, then the smaller violation does. Among infeasible
    /// points the smaller violation wins.
    fn better_than(&self, other: &Iterate, constraint_tol: f64) -> bool {
        let feasible = self.violation <= constraint_tol;
        let other_feasible = other.violation <= constraint_tol;
        match (feasible, other_feasible) {
            (true, false) => true,
            (false, true) => false,
            (true, true) => {
                if (self.cost - other.cost).abs() <= 1e-9 * (1.0 + other.cost.abs()) {
                    self.violation < other.violation
                } else {
                    self.cost < other.cost
                }
            }
            (false, false) => self.violation < other.violation,
        }
    }
}

pub struct Sqp {
    lower: Vec<f64>,
    upper: Vec<f64>,
    hessian: HessianMode,
    constraint_tol: f64,
    kkt_tol: f64,
    penalty: f64,
    multipliers: Vec<f64>,
    violation: f64,
    kkt_residual: f64,
    outcome: Option<SolveStatus>,
    best: Option<Iterate>,
}

impl Sqp {
    pub fn new(lower: Vec<f64>, upper: Vec<f64>) -> Self {
        Self {
            lower,
            upper,
            hessian: HessianMode::Exact,
            constraint_tol: 1e-9,
            kkt_tol: 1e-6,
            penalty: 1.0,
            multipliers: Vec::new(),
            violation: f64::INFINITY,
            kkt_residual: f64::INFINITY,
            outcome: None,
            best: None,
        }
    }

    pub fn with_hessian(mut self, hessian: HessianMode) -> Self {
        self.hessian = hessian;
        self
    }

    pub fn with_tolerances(mut self, constraint_tol: f64, kkt_tol: f64) -> Self {
        self.constraint_tol = constraint_tol;
        self.kkt_tol = kkt_tol;
        self
    }

    /// set when the solver stopped itself
    pub fn outcome(&self) -> Option<SolveStatus> {
        self.outcome
    }

    pub fn best(&self) -> Option<&Iterate> {
        self.best.as_ref()
    }

    pub fn violation(&self) -> f64 {
        self.violation
    }

    pub fn kkt_residual(&self) -> f64 {
        self.kkt_residual
    }

    /// clamp to the bounds and snap values within roundoff of a bound onto it
    fn project(&self, param: &mut [f64]) {
        for (i, value) in param.iter_mut().enumerate() {
            let (lower, upper) = (self.lower[i], self.upper[i]);
            *value = value.max(lower).min(upper);
            if lower.is_finite() && (*value - lower).abs() <= 1e-12 * (1.0 + lower.abs()) {
                *value = lower;
            } else if upper.is_finite() && (*value - upper).abs() <= 1e-12 * (1.0 + upper.abs()) {
                *value = upper;
            }
        }
    }

    fn remember(&mut self, param: &[f64], cost: f64) {
        if !cost.is_finite() || param.iter().any(|v| !v.is_finite()) {
            return;
        }
        let candidate = Iterate {
            param: param.to_vec(),
            cost,
            violation: self.violation,
            kkt_residual: self.kkt_residual,
        };
        let keep = match &self.best {
            Some(best) => candidate.better_than(best, self.constraint_tol),
            None => true,
        };
        if keep {
            self.best = Some(candidate);
        }
    }

    /// Stationarity of the Lagrangian with the bound multipliers chosen by sign:
    /// a variable on its lower bound may have a positive reduced gradient, on
    /// its upper bound a negative one.
    fn stationarity(&self, param: &[f64], gradient: &[f64], jacobian: &DMatrix<f64>) -> f64 {
        let lambda = nalgebra::DVector::from_column_slice(&self.multipliers);
        let at = jacobian.tr_mul(&lambda);
        let mut residual: f64 = 0.0;
        for (i, g) in gradient.iter().enumerate() {
            let r = g - at[i];
            let r = if param[i] <= self.lower[i] {
                r.min(0.0)
            } else if param[i] >= self.upper[i] {
                r.max(0.0)
            } else {
                r
            };
            residual = residual.max(r.abs());
        }
        residual
    }

    fn qp<'a>(
        &'a self,
        hessian: &'a DMatrix<f64>,
        gradient: &'a [f64],
        jacobian: &'a DMatrix<f64>,
        residuals: &'a [f64],
        param: &'a [f64],
    ) -> BoxQp<'a> {
        BoxQp {
            hessian,
            gradient,
            jacobian,
            residuals,
            point: param,
            lower: &self.lower,
            upper: &self.upper,
        }
    }

    /// Search direction from the exact Hessian when it gives positive
    /// curvature, the Gauss-Newton Hessian otherwise.
    fn direction<O>(
        &self,
        problem: &mut Problem<O>,
        param: &Vec<f64>,
        gradient: &[f64],
        jacobian: &DMatrix<f64>,
        residuals: &[f64],
    ) -> Result<Option<QpStep>, Error>
    where
        O: Hessian<Param = Vec<f64>, Hessian = DMatrix<f64>> + ConstraintCurvature,
    {
        let mut cost_hessian = problem.hessian(param)?;
        if self.hessian == HessianMode::Exact {
            let mut lagrangian = cost_hessian.clone();
            problem.problem("constraint_curvature_count", |p| {
                p.add_constraint_curvature(param, &self.multipliers, &mut lagrangian)
            })?;
            regularize(&mut lagrangian);
            match self
                .qp(&lagrangian, gradient, jacobian, residuals, param)
                .solve()
            {
                Ok(step) => {
                    let d = nalgebra::DVector::from_column_slice(&step.step);
                    let curvature = d.dot(&(&lagrangian * &d));
                    if curvature > CURVATURE_TOL * d.norm_squared() || d.norm() == 0.0 {
                        return Ok(Some(step));
                    }
                    debug!("exact Hessian step has curvature {curvature:.3e}, using Gauss-Newton");
                }
                Err(e) => debug!("exact Hessian QP failed ({e}), using Gauss-Newton"),
            }
        }
        regularize(&mut cost_hessian);
        match self
            .qp(&cost_hessian, gradient, jacobian, residuals, param)
            .solve()
        {
            Ok(step) => Ok(Some(step)),
            Err(e) => {
                warn!("Gauss-Newton QP failed: {e}");
                Ok(None)
            }
        }
    }
}

fn regularize(hessian: &mut DMatrix<f64>) {
    for i in 0..hessian.nrows() {
        hessian[(i, i)] += REGULARIZATION;
    }
}

fn l1_norm(values: &[f64]) -> f64 {
    values.iter().map(|v| v.abs()).sum()
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc, v| acc.max(v.abs()))
}

impl<O> Solver<O, SqpState> for Sqp
where
    O: CostFunction<Param = Vec<f64>, Output = f64>
        + Gradient<Param = Vec<f64>, Gradient = Vec<f64>>
        + Hessian<Param = Vec<f64>, Hessian = DMatrix<f64>>
        + Operator<Param = Vec<f64>, Output = Vec<f64>>
        + Jacobian<Param = Vec<f64>, Jacobian = DMatrix<f64>>
        + ConstraintCurvature,
{
    const NAME: &'static str = "SQP";

    fn init(
        &mut self,
        problem: &mut Problem<O>,
        mut state: SqpState,
    ) -> Result<(SqpState, Option<KV>), Error> {
        let mut param = state
            .take_param()
            .ok_or_else(|| Error::msg("SQP needs an initial decision vector"))?;
        self.project(&mut param);
        let cost = problem.cost(&param)?;
        let residuals = problem.apply(&param)?;
        self.violation = max_violation(&residuals);
        self.multipliers = vec![0.0; residuals.len()];
        let gradient = problem.gradient(&param)?;
        let jacobian = problem.jacobian(&param)?;
        self.kkt_residual = self.stationarity(&param, &gradient, &jacobian);
        self.penalty = 1.0;
        self.outcome = None;
        self.best = None;
        self.remember(&param, cost);
        Ok((state.param(param).cost(cost), None))
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<O>,
        mut state: SqpState,
    ) -> Result<(SqpState, Option<KV>), Error> {
        let param = state
            .take_param()
            .ok_or_else(|| Error::msg("SQP lost its decision vector"))?;
        let cost = problem.cost(&param)?;
        let gradient = problem.gradient(&param)?;
        let residuals = problem.apply(&param)?;
        let jacobian = problem.jacobian(&param)?;

        let Some(qp_step) = self.direction(problem, &param, &gradient, &jacobian, &residuals)?
        else {
            self.outcome = Some(SolveStatus::Degenerate);
            return Ok((state.param(param).cost(cost), None));
        };
        let QpStep {
            step: direction,
            multipliers,
            iterations: qp_iterations,
        } = qp_step;

        self.penalty = self.penalty.max(1.1 * max_abs(&multipliers) + 1e-3);
        let infeasibility = l1_norm(&residuals);
        let merit = cost + self.penalty * infeasibility;
        let descent: f64 = gradient.dot(&direction);
        let slope = descent - self.penalty * infeasibility;

        let mut alpha: f64 = 1.0;
        let accepted = loop {
            let mut trial: Vec<f64> = param.scaled_add(&alpha, &direction);
            self.project(&mut trial);
            let trial_cost = problem.cost(&trial)?;
            let trial_residuals = problem.apply(&trial)?;
            let trial_merit = trial_cost + self.penalty * l1_norm(&trial_residuals);
            if trial_merit.is_finite() && trial_merit <= merit + ARMIJO * alpha * slope {
                break Some((trial, trial_cost, trial_residuals));
            }
            alpha *= 0.5;
            if alpha < MIN_STEP {
                break None;
            }
        };

        self.multipliers = multipliers;
        let Some((next, next_cost, next_residuals)) = accepted else {
            // roundoff can block the line search at a point that is already optimal
            self.kkt_residual = self.stationarity(&param, &gradient, &jacobian);
            self.outcome = Some(
                if self.violation <= self.constraint_tol && self.kkt_residual <= self.kkt_tol {
                    SolveStatus::Converged
                } else {
                    warn!("line search stalled, merit {merit:.6e} slope {slope:.3e}");
                    SolveStatus::Stalled
                },
            );
            return Ok((state.param(param).cost(cost), None));
        };

        if !next_cost.is_finite() || next.iter().any(|v| !v.is_finite()) {
            warn!("non-finite iterate");
            self.outcome = Some(SolveStatus::Degenerate);
            return Ok((state.param(param).cost(cost), None));
        }

        self.violation = max_violation(&next_residuals);
        let next_gradient = problem.gradient(&next)?;
        let next_jacobian = problem.jacobian(&next)?;
        self.kkt_residual = self.stationarity(&next, &next_gradient, &next_jacobian);
        self.remember(&next, next_cost);
        debug!(
            "sqp: cost {next_cost:.6e} violation {:.3e} stationarity {:.3e} step {alpha} qp iterations {qp_iterations}",
            self.violation, self.kkt_residual
        );
        if self.violation <= self.constraint_tol && self.kkt_residual <= self.kkt_tol {
            self.outcome = Some(SolveStatus::Converged);
        }
        Ok((state.param(next).cost(next_cost), None))
    }

    fn terminate(&mut self, _state: &SqpState) -> TerminationStatus {
        match self.outcome {
            None => TerminationStatus::NotTerminated,
            Some(SolveStatus::Converged) => {
                TerminationStatus::Terminated(TerminationReason::SolverConverged)
            }
            Some(status) => {
                TerminationStatus::Terminated(TerminationReason::SolverExit(status.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argmin::core::{Executor, State};

    /// `f = z0^2 + z1^2` with `z1 = 0`, but the gradient has its `z0` sign
    /// flipped so every step climbs
    #[derive(Clone)]
    struct Uphill;

    impl CostFunction for Uphill {
        type Param = Vec<f64>;
        type Output = f64;

        fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
            Ok(p[0] * p[0] + p[1] * p[1])
        }
    }

    impl Gradient for Uphill {
        type Param = Vec<f64>;
        type Gradient = Vec<f64>;

        fn gradient(&self, p: &Self::Param) -> Result<Self::Gradient, Error> {
            Ok(vec![-2.0 * p[0], 2.0 * p[1]])
        }
    }

    impl Hessian for Uphill {
        type Param = Vec<f64>;
        type Hessian = DMatrix<f64>;

        fn hessian(&self, _p: &Self::Param) -> Result<Self::Hessian, Error> {
            Ok(DMatrix::from_diagonal_element(2, 2, 2.0))
        }
    }

    impl Operator for Uphill {
        type Param = Vec<f64>;
        type Output = Vec<f64>;

        fn apply(&self, p: &Self::Param) -> Result<Self::Output, Error> {
            Ok(vec![p[1]])
        }
    }

    impl Jacobian for Uphill {
        type Param = Vec<f64>;
        type Jacobian = DMatrix<f64>;

        fn jacobian(&self, _p: &Self::Param) -> Result<Self::Jacobian, Error> {
            Ok(DMatrix::from_row_slice(1, 2, &[0.0, 1.0]))
        }
    }

    impl ConstraintCurvature for Uphill {
        fn add_constraint_curvature(
            &self,
            _param: &[f64],
            _multipliers: &[f64],
            _hessian: &mut DMatrix<f64>,
        ) -> Result<(), Error> {
            Ok(())
        }
    }

    #[test]
    fn line_search_stalls_on_ascent_direction() {
        let inf = f64::INFINITY;
        let solver = Sqp::new(vec![-inf; 2], vec![inf; 2]);
        let res = Executor::new(Uphill, solver)
            .configure(|state| state.param(vec![1.0, 0.0]).max_iters(10))
            .run()
            .unwrap();
        assert_eq!(res.solver.outcome(), Some(SolveStatus::Stalled));
        assert_eq!(res.state.get_param(), Some(&vec![1.0, 0.0]));
        // the point never moved, so the best iterate is the start
        let best = res.solver.best().unwrap();
        assert_eq!(best.param, vec![1.0, 0.0]);
        assert_eq!(best.violation, 0.0);
        assert_eq!(best.kkt_residual, 2.0);
    }

    #[test]
    fn best_iterate_keeps_its_own_residual() {
        let mut sqp = Sqp::new(vec![0.0], vec![1.0]);
        sqp.violation = 5e-10;
        sqp.kkt_residual = 0.5;
        sqp.remember(&[0.2], 1.0);
        // lower cost but infeasible, loses
        sqp.violation = 1.0;
        sqp.kkt_residual = 1e-9;
        sqp.remember(&[0.4], 0.5);
        let best = sqp.best().unwrap();
        assert_eq!(best.param, vec![0.2]);
        assert_eq!(best.kkt_residual, 0.5);
        assert_eq!(sqp.kkt_residual(), 1e-9);

        // same cost, smaller violation wins
        sqp.violation = 0.0;
        sqp.kkt_residual = 0.25;
        sqp.remember(&[0.3], 1.0);
        assert_eq!(sqp.best().unwrap().param, vec![0.3]);
        assert_eq!(sqp.best().unwrap().kkt_residual, 0.25);
    }

    #[test]
    fn non_finite_points_are_not_remembered() {
        let mut sqp = Sqp::new(vec![0.0], vec![1.0]);
        sqp.violation = 0.0;
        sqp.remember(&[0.5], f64::INFINITY);
        sqp.remember(&[f64::NAN], 1.0);
        assert!(sqp.best().is_none());
    }
}
