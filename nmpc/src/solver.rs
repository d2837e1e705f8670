//! Receding horizon entry point.

use std::time::Duration;

use argmin::core::{
    observers::ObserverMode, Executor, State as ArgminState, TerminationReason, TerminationStatus,
};
use argmin_observer_slog::SlogLogger;
use log::{debug, warn};

use crate::constraints;
use crate::error::{ConfigError, InputError};
use crate::params::Params;
use crate::polynomial::Polynomial;
use crate::problem::TrackingProblem;
use crate::sqp::{HessianMode, SolveStatus, Sqp};
use crate::state::{Control, State};
use crate::trajectory::{Dim, Trajectory};

#[derive(Debug, Clone, PartialEq)]
pub struct SolverSettings {
    pub max_iters: u64,
    /// wall clock budget per solve
    pub timeout: Option<Duration>,
    /// max absolute dynamics residual accepted as converged
    pub constraint_tol: f64,
    /// max stationarity residual accepted as converged
    pub kkt_tol: f64,
    pub hessian: HessianMode,
    /// seed each solve from the previous trajectory shifted by one sample
    pub warm_start: bool,
    /// print every iteration through the argmin slog observer
    pub verbose: bool,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iters: 100,
            timeout: None,
            constraint_tol: 1e-9,
            kkt_tol: 1e-6,
            hessian: HessianMode::Exact,
            warm_start: true,
            verbose: false,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iters == 0 {
            return Err(ConfigError::Settings("max_iters must be at least 1"));
        }
        if !(self.constraint_tol.is_finite() && self.constraint_tol > 0.0) {
            return Err(ConfigError::Settings("constraint_tol must be finite and positive"));
        }
        if !(self.kkt_tol.is_finite() && self.kkt_tol > 0.0) {
            return Err(ConfigError::Settings("kkt_tol must be finite and positive"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Settings("timeout must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveReport {
    pub status: SolveStatus,
    pub iterations: u64,
    pub constraint_violation: f64,
    pub kkt_residual: f64,
}

/// First control of the optimized horizon plus diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub omega: f64,
    pub throttle: f64,
    /// objective value of `trajectory`, infinite when the prediction overflows
    pub cost: f64,
    /// objective split per knot
    pub stage_costs: Vec<f64>,
    pub trajectory: Trajectory,
    pub report: SolveReport,
}

impl Solution {
    pub fn control(&self) -> Control {
        Control::new(self.omega, self.throttle)
    }

    pub fn converged(&self) -> bool {
        self.report.status == SolveStatus::Converged
    }
}

/// Nonlinear MPC for a robot tracking a cubic path in its own frame.
///
/// `solve` carries the last trajectory over as a warm start, so one instance
/// must not be shared between threads without synchronization. `solve_cold`
/// and `solve_from` leave the instance untouched.
#[derive(Debug, Clone)]
pub struct Nmpc {
    params: Params,
    coeffs: Vec<f64>,
    settings: SolverSettings,
    previous: Option<Trajectory>,
}

impl Nmpc {
    pub fn new(params: Params, coeffs: impl Into<Vec<f64>>) -> Result<Self, ConfigError> {
        Self::with_settings(params, coeffs, SolverSettings::default())
    }

    pub fn with_settings(
        params: Params,
        coeffs: impl Into<Vec<f64>>,
        settings: SolverSettings,
    ) -> Result<Self, ConfigError> {
        params.validate()?;
        settings.validate()?;
        Ok(Self {
            params,
            coeffs: coeffs.into(),
            settings,
            previous: None,
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// New reference path, checked on the next solve. The warm start is kept.
    pub fn set_coeffs(&mut self, coeffs: impl Into<Vec<f64>>) {
        self.coeffs = coeffs.into();
    }

    pub fn reset_warm_start(&mut self) {
        self.previous = None;
    }

    pub fn previous_trajectory(&self) -> Option<&Trajectory> {
        self.previous.as_ref()
    }

    fn check_inputs(&self, state: &State) -> Result<Polynomial, InputError> {
        let path = Polynomial::from_slice(&self.coeffs)?;
        if let Some(field) = state.non_finite_field() {
            return Err(InputError::NonFiniteState(field));
        }
        Ok(path)
    }

    /// One receding horizon step, warm started from the previous call when enabled.
    pub fn solve(&mut self, state: &State) -> Result<Solution, InputError> {
        let path = self.check_inputs(state)?;
        let forward = self.params.forward;
        let guess = match &self.previous {
            Some(previous) if self.settings.warm_start && previous.timesteps() == forward.timesteps => {
                previous.shifted(state, forward.dt, &path)
            }
            _ => Trajectory::cold(state, forward.timesteps),
        };
        let solution = self.run(state, path, &guess);
        if self.settings.warm_start {
            self.previous = Some(solution.trajectory.clone());
        }
        Ok(solution)
    }

    /// Solve from the zero guess without touching the warm start.
    pub fn solve_cold(&self, state: &State) -> Result<Solution, InputError> {
        let path = self.check_inputs(state)?;
        let guess = Trajectory::cold(state, self.params.forward.timesteps);
        Ok(self.run(state, path, &guess))
    }

    /// Solve from a caller supplied guess, re-anchored on `state`.
    pub fn solve_from(&self, state: &State, guess: &Trajectory) -> Result<Solution, InputError> {
        let path = self.check_inputs(state)?;
        let expected = self.params.forward.timesteps;
        if guess.timesteps() != expected || guess.controls.len() + 1 != expected {
            return Err(InputError::GuessHorizon {
                expected,
                found: guess.timesteps(),
            });
        }
        Ok(self.run(state, path, guess))
    }

    fn run(&self, state: &State, path: Polynomial, guess: &Trajectory) -> Solution {
        let problem = TrackingProblem::new(&self.params, path, state);
        let layout = *problem.layout();
        let mut init_param = layout.pack(guess);
        for dim in Dim::ALL {
            init_param[layout.state(dim, 0)] = dim.of(state);
        }

        let (lower, upper) = constraints::bounds(&layout, &self.params.limits);
        let solver = Sqp::new(lower, upper)
            .with_hessian(self.settings.hessian)
            .with_tolerances(self.settings.constraint_tol, self.settings.kkt_tol);

        let mut executor = Executor::new(problem.clone(), solver).configure(|config| {
            config
                .param(init_param)
                .max_iters(self.settings.max_iters)
        });
        if let Some(timeout) = self.settings.timeout {
            executor = executor.timeout(timeout);
        }
        if self.settings.verbose {
            executor = executor.add_observer(SlogLogger::term(), ObserverMode::Always);
        }

        let res = match executor.run() {
            Ok(res) => res,
            Err(e) => {
                warn!("solver failed: {e}, commanding neutral control");
                return self.neutral(&problem, state, path);
            }
        };

        let sqp = &res.solver;
        let status = match sqp.outcome() {
            Some(status) => status,
            None => match res.state.get_termination_status() {
                TerminationStatus::Terminated(TerminationReason::Timeout) => SolveStatus::Timeout,
                _ => SolveStatus::IterationLimit,
            },
        };
        // anything short of convergence falls back to the best point seen
        let (param, kkt_residual) = match (status, res.state.get_param(), sqp.best()) {
            (SolveStatus::Converged, Some(param), _) => (param.clone(), sqp.kkt_residual()),
            (_, _, Some(best)) => (best.param.clone(), best.kkt_residual),
            (_, Some(param), None) if param.iter().all(|v| v.is_finite()) => {
                (param.clone(), sqp.kkt_residual())
            }
            _ => {
                warn!("solver {status} without a usable iterate, commanding neutral control");
                return self.neutral(&problem, state, path);
            }
        };
        if status != SolveStatus::Converged {
            warn!(
                "solver {status} after {} iterations, violation {:.3e}",
                res.state.get_iter(),
                problem.violation(&param)
            );
        }
        let report = SolveReport {
            status,
            iterations: res.state.get_iter(),
            constraint_violation: problem.violation(&param),
            kkt_residual,
        };
        let solution = self.extract(&problem, state, &param, report);
        debug!(
            "omega {:.6} throttle {:.6} cost {:.6e} ({})",
            solution.omega, solution.throttle, solution.cost, solution.report.status
        );
        solution
    }

    /// zero control clamped into the limits, rolled out over the horizon
    fn neutral(&self, problem: &TrackingProblem, state: &State, path: Polynomial) -> Solution {
        let limits = &self.params.limits;
        let control = Control::new(limits.omega.clamp(0.0), limits.throttle.clamp(0.0));
        let layout = problem.layout();
        let trajectory = Trajectory::rollout(
            state,
            vec![control; layout.controls()],
            self.params.forward.dt,
            &path,
        );
        let param = layout.pack(&trajectory);
        let report = SolveReport {
            status: SolveStatus::Degenerate,
            iterations: 0,
            constraint_violation: problem.violation(&param),
            kkt_residual: f64::INFINITY,
        };
        self.extract(problem, state, &param, report)
    }

    fn extract(
        &self,
        problem: &TrackingProblem,
        state: &State,
        param: &[f64],
        report: SolveReport,
    ) -> Solution {
        let trajectory = problem.layout().unpack(param, state);
        let stage_costs = problem.stage_costs(param);
        let first = trajectory.controls.first().copied().unwrap_or_default();
        let limits = &self.params.limits;
        Solution {
            omega: limits.omega.clamp(first.omega),
            throttle: limits.throttle.clamp(first.throttle),
            cost: stage_costs.iter().sum(),
            stage_costs,
            trajectory,
            report,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Bounds, Desired, Forward, Limits, Weights};

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
                cte: 10.0,
                etheta: 10.0,
                vel: 10.0,
                omega: 1.0,
                acc: 1.0,
                omega_d: 1.0,
                acc_d: 1.0,
            },
        }
    }

    #[test]
    fn settings_validation() {
        let settings = SolverSettings {
            max_iters: 0,
            ..Default::default()
        };
        assert!(matches!(
            Nmpc::with_settings(params(5), vec![0.0; 4], settings),
            Err(ConfigError::Settings(_))
        ));
        let settings = SolverSettings {
            kkt_tol: -1.0,
            ..Default::default()
        };
        assert!(Nmpc::with_settings(params(5), vec![0.0; 4], settings).is_err());
    }

    #[test]
    fn bad_params_rejected() {
        let mut p = params(5);
        p.forward.timesteps = 0;
        assert_eq!(
            Nmpc::new(p, vec![0.0; 4]).err(),
            Some(ConfigError::Horizon(0))
        );
    }

    #[test]
    fn input_error_keeps_warm_start() {
        let mut nmpc = Nmpc::new(params(5), vec![0.2, 0.0, 0.0, 0.0]).unwrap();
        let state = State::new(0.0, 0.0, 0.0, 0.3, 0.0, 0.0, 0.2, 0.0);
        nmpc.solve(&state).unwrap();
        let stored = nmpc.previous_trajectory().cloned();
        assert!(stored.is_some());

        let mut bad = state;
        bad.cte = f64::NAN;
        assert_eq!(
            nmpc.solve(&bad).err(),
            Some(InputError::NonFiniteState("cte"))
        );
        nmpc.set_coeffs(vec![0.2, 0.0, 0.0]);
        assert_eq!(
            nmpc.solve(&state).err(),
            Some(InputError::CoefficientCount {
                expected: 4,
                found: 3
            })
        );
        assert_eq!(nmpc.previous_trajectory().cloned(), stored);
    }

    #[test]
    fn iteration_limit_returns_bounded_best_effort() {
        let settings = SolverSettings {
            max_iters: 1,
            ..Default::default()
        };
        let nmpc = Nmpc::with_settings(params(8), vec![3.0, 0.4, 0.0, 0.0], settings).unwrap();
        let state = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 3.0, -0.4);
        let solution = nmpc.solve_cold(&state).unwrap();
        assert_eq!(solution.report.status, SolveStatus::IterationLimit);
        assert_eq!(solution.report.iterations, 1);
        assert!(nmpc.params().limits.omega.contains(solution.omega));
        assert!(nmpc.params().limits.throttle.contains(solution.throttle));
        assert!(solution.cost.is_finite());
        assert!(solution.report.kkt_residual.is_finite());
    }

    #[test]
    fn guess_horizon_checked() {
        let nmpc = Nmpc::new(params(5), vec![0.0; 4]).unwrap();
        let state = State::default();
        let guess = Trajectory::cold(&state, 4);
        assert_eq!(
            nmpc.solve_from(&state, &guess).err(),
            Some(InputError::GuessHorizon {
                expected: 5,
                found: 4
            })
        );
        let guess = Trajectory::cold(&state, 5);
        assert!(nmpc.solve_from(&state, &guess).unwrap().converged());
    }
}
