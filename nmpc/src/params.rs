use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// prediction horizon
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Forward {
    /// number of predicted state knots, one more than the number of control moves
    pub timesteps: usize,
    /// integration step in seconds
    pub dt: f64,
}

/// tracking targets
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Desired {
    pub vel: f64,
    #[serde(default)]
    pub cte: f64,
    #[serde(default)]
    pub etheta: f64,
}

/// closed interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn symmetric(limit: f64) -> Self {
        Self {
            min: -limit,
            max: limit,
        }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    fn validate(&self, name: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() {
            return Err(ConfigError::DegenerateLimits {
                name,
                min: self.min,
                max: self.max,
            });
        }
        if self.min > self.max {
            return Err(ConfigError::InvertedLimits {
                name,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub omega: Bounds,
    pub throttle: Bounds,
}

/// cost weights, one per objective term
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weights {
    pub cte: f64,
    pub etheta: f64,
    pub vel: f64,
    pub omega: f64,
    pub acc: f64,
    /// omega rate of change
    pub omega_d: f64,
    /// throttle rate of change
    pub acc_d: f64,
}

impl Weights {
    /// names in the order of `to_array`
    pub const NAMES: [&'static str; 7] = ["vel", "cte", "etheta", "omega", "acc", "omega_d", "acc_d"];

    pub fn to_array(&self) -> [f64; 7] {
        [
            self.vel,
            self.cte,
            self.etheta,
            self.omega,
            self.acc,
            self.omega_d,
            self.acc_d,
        ]
    }

    pub fn from_array(values: [f64; 7]) -> Self {
        let [vel, cte, etheta, omega, acc, omega_d, acc_d] = values;
        Self {
            cte,
            etheta,
            vel,
            omega,
            acc,
            omega_d,
            acc_d,
        }
    }
}

impl fmt::Display for Weights {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let named = Self::NAMES.iter().zip(self.to_array());
        for (i, (name, value)) in named.enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "w_{name}: {value}")?;
        }
        Ok(())
    }
}

/// Solver configuration. Checked once by `validate` and read-only afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub forward: Forward,
    pub desired: Desired,
    pub limits: Limits,
    pub weights: Weights,
}

impl Params {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.forward.timesteps < 2 {
            return Err(ConfigError::Horizon(self.forward.timesteps));
        }
        if !(self.forward.dt.is_finite() && self.forward.dt > 0.0) {
            return Err(ConfigError::SampleTime(self.forward.dt));
        }
        for (name, value) in [
            ("vel", self.desired.vel),
            ("cte", self.desired.cte),
            ("etheta", self.desired.etheta),
        ] {
            if !value.is_finite() {
                return Err(ConfigError::Desired { name, value });
            }
        }
        for (name, value) in Weights::NAMES.into_iter().zip(self.weights.to_array()) {
            // also catches nan
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::Weight { name, value });
            }
        }
        self.limits.omega.validate("omega")?;
        self.limits.throttle.validate("throttle")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> Params {
        Params {
            forward: Forward {
                timesteps: 12,
                dt: 0.1,
            },
            desired: Desired {
                vel: 0.5,
                ..Default::default()
            },
            limits: Limits {
                omega: Bounds::symmetric(2.0),
                throttle: Bounds::symmetric(1.0),
            },
            weights: Weights {
                cte: 1.0,
                etheta: 1.0,
                vel: 1.0,
                omega: 1.0,
                acc: 1.0,
                omega_d: 1.0,
                acc_d: 1.0,
            },
        }
    }

    #[test]
    fn valid_params() {
        assert_eq!(params().validate(), Ok(()));
        let mut fixed = params();
        fixed.limits.throttle = Bounds::new(0.3, 0.3);
        assert_eq!(fixed.validate(), Ok(()));
    }

    #[test]
    fn horizon_and_sample_time() {
        let mut p = params();
        p.forward.timesteps = 1;
        assert_eq!(p.validate(), Err(ConfigError::Horizon(1)));
        let mut p = params();
        p.forward.dt = 0.0;
        assert_eq!(p.validate(), Err(ConfigError::SampleTime(0.0)));
        p.forward.dt = -0.1;
        assert!(p.validate().is_err());
    }

    #[test]
    fn negative_weight() {
        let mut p = params();
        p.weights.acc_d = -1.0;
        assert_eq!(
            p.validate(),
            Err(ConfigError::Weight {
                name: "acc_d",
                value: -1.0
            })
        );
        p.weights.acc_d = f64::NAN;
        assert!(matches!(
            p.validate(),
            Err(ConfigError::Weight { name: "acc_d", .. })
        ));
    }

    #[test]
    fn limits() {
        let mut p = params();
        p.limits.omega = Bounds::new(1.0, -1.0);
        assert!(matches!(
            p.validate(),
            Err(ConfigError::InvertedLimits { name: "omega", .. })
        ));
        let mut p = params();
        p.limits.throttle = Bounds::new(f64::NEG_INFINITY, 1.0);
        assert!(matches!(
            p.validate(),
            Err(ConfigError::DegenerateLimits {
                name: "throttle",
                ..
            })
        ));
    }

    #[test]
    fn weights_display() {
        let text = params().weights.to_string();
        assert!(text.starts_with("w_vel: 1, w_cte: 1"));
        assert!(text.ends_with("w_acc_d: 1"));
    }

    #[test]
    fn bounds_clamp() {
        let b = Bounds::symmetric(2.0);
        assert_eq!(b.clamp(3.0), 2.0);
        assert_eq!(b.clamp(-7.0), -2.0);
        assert_eq!(b.clamp(0.5), 0.5);
        assert!(b.contains(2.0));
        assert!(!b.contains(2.0001));
    }
}
