use thiserror::Error;

/// Rejected solver configuration, raised when an `Nmpc` is built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("horizon needs at least 2 state knots, got {0}")]
    Horizon(usize),

    #[error("sample time must be finite and positive, got {0}")]
    SampleTime(f64),

    #[error("weight {name} must be finite and non-negative, got {value}")]
    Weight { name: &'static str, value: f64 },

    #[error("desired {name} must be finite, got {value}")]
    Desired { name: &'static str, value: f64 },

    #[error("{name} limits are inverted: min {min} > max {max}")]
    InvertedLimits { name: &'static str, min: f64, max: f64 },

    #[error("{name} limits must be finite, got [{min}, {max}]")]
    DegenerateLimits { name: &'static str, min: f64, max: f64 },

    #[error("invalid solver setting: {0}")]
    Settings(&'static str),
}

/// Rejected solve input. The solver keeps its warm start untouched.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("expected {expected} polynomial coefficients, got {found}")]
    CoefficientCount { expected: usize, found: usize },

    #[error("polynomial coefficient {index} is not finite")]
    NonFiniteCoefficient { index: usize },

    #[error("state field {0} is not finite")]
    NonFiniteState(&'static str),

    #[error("initial guess spans {found} state knots, the horizon has {expected}")]
    GuessHorizon { expected: usize, found: usize },
}
