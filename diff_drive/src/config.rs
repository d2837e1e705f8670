//! TOML configuration of a closed loop run.

use std::fs::read_to_string;
use std::path::Path;
use std::time::Duration;

use nmpc::{Bounds, Desired, Forward, HessianMode, Limits, Params, SolverSettings, Weights};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::follow::{TerminateOn, Tolerance};
use crate::plant::PlantState;
use crate::tune::{ClosedLoop, GaSettings, WeightBounds};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot load the config file: {0}")]
    FileLoadError(std::io::Error),

    #[error("Cannot read the config file: {0}")]
    DeserialiseError(toml::de::Error),
}

fn load_toml<T: DeserializeOwned, P: AsRef<Path>>(path: P) -> Result<T, LoadError> {
    let text = read_to_string(path).map_err(LoadError::FileLoadError)?;
    toml::from_str(&text).map_err(LoadError::DeserialiseError)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct General {
    pub timesteps: usize,
    pub sample_time: f64,
    /// give up if the robot has not settled after this many cycles
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_max_steps() -> usize {
    2000
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialState {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    #[serde(default)]
    pub linear_velocity: f64,
    #[serde(default)]
    pub angular_velocity: f64,
    #[serde(default)]
    pub throttle: f64,
}

impl InitialState {
    pub fn plant_state(&self) -> PlantState {
        PlantState {
            x: self.x,
            y: self.y,
            theta: self.theta,
            lin_vel: self.linear_velocity,
            ang_vel: self.angular_velocity,
            throttle: self.throttle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredSection {
    pub velocity: f64,
    #[serde(default)]
    pub cross_track_error: f64,
    #[serde(default)]
    pub orientation_error: f64,
}

/// symmetric actuator limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaxBounds {
    pub omega: f64,
    pub throttle: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSection {
    pub max_iters: u64,
    pub timeout_ms: Option<u64>,
    pub hessian: HessianMode,
    pub warm_start: bool,
    pub verbose: bool,
}

impl Default for SolverSection {
    fn default() -> Self {
        let settings = SolverSettings::default();
        Self {
            max_iters: settings.max_iters,
            timeout_ms: None,
            hessian: settings.hessian,
            warm_start: settings.warm_start,
            verbose: settings.verbose,
        }
    }
}

impl SolverSection {
    pub fn settings(&self) -> SolverSettings {
        SolverSettings {
            max_iters: self.max_iters,
            timeout: self.timeout_ms.map(Duration::from_millis),
            hessian: self.hessian,
            warm_start: self.warm_start,
            verbose: self.verbose,
            ..Default::default()
        }
    }
}

/// Controller parameters. They are validated when the controller is built.
fn controller_params(
    general: &General,
    desired: &DesiredSection,
    max_bounds: &MaxBounds,
    weights: Weights,
) -> Params {
    Params {
        forward: Forward {
            timesteps: general.timesteps,
            dt: general.sample_time,
        },
        desired: Desired {
            vel: desired.velocity,
            cte: desired.cross_track_error,
            etheta: desired.orientation_error,
        },
        limits: Limits {
            omega: Bounds::symmetric(max_bounds.omega),
            throttle: Bounds::symmetric(max_bounds.throttle),
        },
        weights,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub general: General,
    pub initial_state: InitialState,
    pub desired: DesiredSection,
    pub max_bounds: MaxBounds,
    pub weights: Weights,
    pub teardown_tolerance: Tolerance,
    #[serde(default)]
    pub solver: SolverSection,
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        load_toml(path)
    }

    pub fn from_toml(text: &str) -> Result<Self, LoadError> {
        toml::from_str(text).map_err(LoadError::DeserialiseError)
    }

    pub fn params(&self) -> Params {
        controller_params(&self.general, &self.desired, &self.max_bounds, self.weights)
    }

    pub fn settings(&self) -> SolverSettings {
        self.solver.settings()
    }

    pub fn initial_state(&self) -> PlantState {
        self.initial_state.plant_state()
    }

    pub fn terminate_on(&self) -> TerminateOn {
        TerminateOn::Tolerance {
            tolerance: self.teardown_tolerance,
            max_steps: self.general.max_steps,
        }
    }
}

/// Weight search: the controller setup of a run plus the genetic algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuneConfig {
    pub general: General,
    pub initial_state: InitialState,
    pub desired: DesiredSection,
    pub max_bounds: MaxBounds,
    pub weight_bounds: WeightBounds,
    pub genetic_algorithm: GaSettings,
    #[serde(default)]
    pub solver: SolverSection,
}

impl TuneConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        load_toml(path)
    }

    pub fn from_toml(text: &str) -> Result<Self, LoadError> {
        toml::from_str(text).map_err(LoadError::DeserialiseError)
    }

    /// Scoring setup, every candidate runs `steps_per_genome` cycles from the
    /// initial state.
    pub fn closed_loop(&self) -> ClosedLoop {
        ClosedLoop {
            params: controller_params(
                &self.general,
                &self.desired,
                &self.max_bounds,
                Weights::default(),
            ),
            settings: self.solver.settings(),
            initial: self.initial_state.plant_state(),
            steps: self.genetic_algorithm.steps_per_genome,
        }
    }
}
