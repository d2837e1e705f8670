use serde::{Deserialize, Serialize};

/// Snapshot of the robot in the path-relative frame.
///
/// `omega` and `throttle` hold the actuation that produced this state, the
/// rate of change cost terms compare against them.
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub v: f64,
    pub omega: f64,
    pub throttle: f64,
    pub cte: f64,
    pub etheta: f64,
}

impl State {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        x: f64,
        y: f64,
        theta: f64,
        v: f64,
        omega: f64,
        throttle: f64,
        cte: f64,
        etheta: f64,
    ) -> Self {
        Self {
            x,
            y,
            theta,
            v,
            omega,
            throttle,
            cte,
            etheta,
        }
    }

    fn fields(&self) -> [(&'static str, f64); 8] {
        [
            ("x", self.x),
            ("y", self.y),
            ("theta", self.theta),
            ("v", self.v),
            ("omega", self.omega),
            ("throttle", self.throttle),
            ("cte", self.cte),
            ("etheta", self.etheta),
        ]
    }

    /// name of the first field that is nan or infinite
    pub fn non_finite_field(&self) -> Option<&'static str> {
        self.fields()
            .into_iter()
            .find(|(_, value)| !value.is_finite())
            .map(|(name, _)| name)
    }
}

/// angular velocity and throttle commanded for one sample
#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Control {
    pub omega: f64,
    pub throttle: f64,
}

impl Control {
    pub fn new(omega: f64, throttle: f64) -> Self {
        Self { omega, throttle }
    }
}
