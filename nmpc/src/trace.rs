//! Structured record of predicted or driven trajectories for external plotting.

use serde::{Deserialize, Serialize};

use crate::params::Weights;
use crate::solver::Solution;
use crate::state::State;

/// `vel` holds the speed error against the desired speed.
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub cte: Vec<f64>,
    pub etheta: Vec<f64>,
    pub vel: Vec<f64>,
    pub costs: Vec<f64>,
    pub weights: Weights,
}

impl Trace {
    pub fn new(weights: Weights) -> Self {
        Self {
            weights,
            ..Default::default()
        }
    }

    /// the predicted horizon of one solve, one sample per knot
    pub fn from_solution(solution: &Solution, weights: Weights, desired_vel: f64) -> Self {
        let mut trace = Self::new(weights);
        for (state, cost) in solution
            .trajectory
            .states
            .iter()
            .zip(solution.stage_costs.iter())
        {
            trace.record(state, desired_vel, *cost);
        }
        trace
    }

    pub fn record(&mut self, state: &State, desired_vel: f64, cost: f64) {
        self.x.push(state.x);
        self.y.push(state.y);
        self.cte.push(state.cte);
        self.etheta.push(state.etheta);
        self.vel.push(state.v - desired_vel);
        self.costs.push(cost);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}
