//! Nonlinear model predictive control of a differential drive robot tracking
//! a cubic reference path fitted in the robot's own frame.
//!
//! Each [`Nmpc::solve`] optimizes the controls over a short horizon with an
//! SQP driven by argmin, and returns the first control to apply.

pub mod constraints;
pub mod cost;
pub mod error;
pub mod model;
pub mod params;
pub mod polynomial;
pub mod problem;
pub mod qp;
pub mod solver;
pub mod sqp;
pub mod state;
pub mod trace;
pub mod trajectory;

pub use error::{ConfigError, InputError};
pub use params::{Bounds, Desired, Forward, Limits, Params, Weights};
pub use polynomial::Polynomial;
pub use solver::{Nmpc, Solution, SolveReport, SolverSettings};
pub use sqp::{HessianMode, SolveStatus};
pub use state::{Control, State};
pub use trace::Trace;
pub use trajectory::{Layout, Trajectory};
