//! Closed loop simulation of a differential drive robot steered by the
//! `nmpc` controller onto a straight reference line, and a genetic search
//! for the controller's cost weights.

pub mod config;
pub mod follow;
pub mod frame;
pub mod plant;
pub mod tune;

pub use config::{LoadError, RunConfig, TuneConfig};
pub use follow::{follow_line, FollowError, Performance, Run, TerminateOn, Tolerance};
pub use plant::{DifferentialDrive, PlantState};
pub use tune::{fitness, Champion, ClosedLoop, Evolution, GaSettings, TuneError, WeightBounds};
