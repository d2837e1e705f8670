//! The tracking problem in the shape the argmin executor expects.

use argmin::core::{CostFunction, Error, Gradient, Hessian, Jacobian, Operator};
use nalgebra::DMatrix;

use crate::constraints::{max_violation, Dynamics};
use crate::cost::TrackingCost;
use crate::params::Params;
use crate::polynomial::Polynomial;
use crate::state::State;
use crate::trajectory::Layout;

/// Curvature of the equality constraints weighted by their multipliers, needed
/// on top of `Hessian` to form the Lagrangian Hessian.
pub trait ConstraintCurvature {
    fn add_constraint_curvature(
        &self,
        param: &[f64],
        multipliers: &[f64],
        hessian: &mut DMatrix<f64>,
    ) -> Result<(), Error>;
}

/// `min f(z)  s.t.  c(z) = 0` over the decision vector of one solve.
/// `Operator` evaluates the constraint residuals `c`.
#[derive(Clone)]
pub struct TrackingProblem {
    layout: Layout,
    cost: TrackingCost,
    dynamics: Dynamics,
}

impl TrackingProblem {
    pub fn new(params: &Params, path: Polynomial, initial: &State) -> Self {
        let layout = Layout::new(params.forward.timesteps);
        Self {
            layout,
            cost: TrackingCost::new(params),
            dynamics: Dynamics::new(layout, params.forward.dt, path, initial),
        }
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn stage_costs(&self, z: &[f64]) -> Vec<f64> {
        self.cost.stage_costs(&self.layout, z)
    }

    /// largest absolute constraint residual at `z`
    pub fn violation(&self, z: &[f64]) -> f64 {
        max_violation(&self.dynamics.residuals(z))
    }
}

impl CostFunction for TrackingProblem {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.cost.value(&self.layout, p))
    }
}

impl Gradient for TrackingProblem {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, p: &Self::Param) -> Result<Self::Gradient, Error> {
        Ok(self.cost.gradient(&self.layout, p))
    }
}

impl Hessian for TrackingProblem {
    type Param = Vec<f64>;
    type Hessian = DMatrix<f64>;

    fn hessian(&self, _p: &Self::Param) -> Result<Self::Hessian, Error> {
        Ok(self.cost.hessian(&self.layout))
    }
}

impl Operator for TrackingProblem {
    type Param = Vec<f64>;
    type Output = Vec<f64>;

    fn apply(&self, p: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.dynamics.residuals(p))
    }
}

impl Jacobian for TrackingProblem {
    type Param = Vec<f64>;
    type Jacobian = DMatrix<f64>;

    fn jacobian(&self, p: &Self::Param) -> Result<Self::Jacobian, Error> {
        Ok(self.dynamics.jacobian(p))
    }
}

impl ConstraintCurvature for TrackingProblem {
    fn add_constraint_curvature(
        &self,
        param: &[f64],
        multipliers: &[f64],
        hessian: &mut DMatrix<f64>,
    ) -> Result<(), Error> {
        if multipliers.len() != self.layout.n_constraints() {
            return Err(Error::msg(format!(
                "expected {} multipliers, got {}",
                self.layout.n_constraints(),
                multipliers.len()
            )));
        }
        self.dynamics.add_curvature(param, multipliers, hessian);
        Ok(())
    }
}
