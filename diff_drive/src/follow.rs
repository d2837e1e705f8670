//! Closed loop: the controller drives the simulated robot onto the world x axis.

use log::{debug, info};
use nmpc::{ConfigError, InputError, Nmpc, Params, SolverSettings, State, Trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame;
use crate::plant::DifferentialDrive;

/// how close to the reference counts as settled
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tolerance {
    pub cte: f64,
    pub vel: f64,
    pub etheta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TerminateOn {
    /// stop once settled, or give up after `max_steps`
    Tolerance { tolerance: Tolerance, max_steps: usize },
    /// run a fixed number of control cycles
    Steps(usize),
}

/// per cycle response data
#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub vel_err: Vec<f64>,
    pub cte: Vec<f64>,
    pub etheta: Vec<f64>,
    /// change of squared speed between cycles
    pub translational_effort: Vec<f64>,
    /// change of squared omega between cycles
    pub rotational_effort: Vec<f64>,
    pub costs: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Run {
    pub steps: usize,
    pub settled: bool,
    /// solves that ended short of convergence
    pub unconverged: usize,
    pub trace: Trace,
    pub performance: Performance,
}

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("Invalid controller configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Solver rejected its input at step {step}: {source}")]
    Input { step: usize, source: InputError },
}

/// Follow the world line `y = 0` starting from the plant's current state.
pub fn follow_line(
    params: Params,
    settings: SolverSettings,
    plant: &mut DifferentialDrive,
    term: TerminateOn,
) -> Result<Run, FollowError> {
    let dt = params.forward.dt;
    let desired_vel = params.desired.vel;
    plant.set_sample_time(dt);
    let mut nmpc = Nmpc::with_settings(params, vec![0.0; 4], settings)?;

    let mut trace = Trace::new(params.weights);
    let mut performance = Performance::default();
    let mut prev_speed: f64 = 0.0;
    let mut prev_omega: f64 = 0.0;
    let mut unconverged = 0;
    let mut steps = 0;
    loop {
        let current = *plant.state();
        let coeffs = frame::line_coefficients(current.y, current.theta);
        let state = frame::latency_compensated(&current, &coeffs, dt);
        if state.cte.abs() > 10.0 {
            debug!("cte out of bounds: {}", state.cte);
        }

        nmpc.set_coeffs(coeffs.to_vec());
        let solution = nmpc
            .solve(&state)
            .map_err(|source| FollowError::Input { step: steps, source })?;
        if !solution.converged() {
            unconverged += 1;
        }
        let speed = state.v + solution.throttle * dt;
        plant.step(speed, solution.omega);
        steps += 1;

        // positions in the world frame, errors as seen by the solver
        let sample = State {
            x: current.x,
            y: current.y,
            ..state
        };
        trace.record(&sample, desired_vel, solution.cost);
        performance.vel_err.push(desired_vel - state.v);
        performance.cte.push(state.cte);
        performance.etheta.push(state.etheta);
        performance
            .translational_effort
            .push(speed.powi(2) - prev_speed.powi(2));
        performance
            .rotational_effort
            .push(solution.omega.powi(2) - prev_omega.powi(2));
        performance.costs.push(solution.cost);
        prev_speed = speed;
        prev_omega = solution.omega;
        debug!(
            "step {steps}: cte {:.5} v {:.5} etheta {:.5} iterations {}",
            state.cte, state.v, state.etheta, solution.report.iterations
        );

        let (done, settled) = match term {
            TerminateOn::Tolerance {
                tolerance,
                max_steps,
            } => {
                let settled = state.cte.abs() < tolerance.cte
                    && (state.v - desired_vel).abs() < tolerance.vel
                    && state.etheta.abs() < tolerance.etheta;
                (settled || steps >= max_steps, settled)
            }
            TerminateOn::Steps(count) => (steps >= count, false),
        };
        if done {
            info!("run complete after {steps} steps, settled: {settled}");
            return Ok(Run {
                steps,
                settled,
                unconverged,
                trace,
                performance,
            });
        }
    }
}
