//! Simulated differential drive robot the controller closes the loop on.

use serde::{Deserialize, Serialize};

#[derive(Default, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlantState {
    pub x: f64,
    pub y: f64,
    pub theta: f64,
    pub lin_vel: f64,
    pub ang_vel: f64,
    /// linear acceleration implied by the last speed command
    pub throttle: f64,
}

impl PlantState {
    /// at rest at the given pose
    pub fn pose(x: f64, y: f64, theta: f64) -> Self {
        Self {
            x,
            y,
            theta,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct DifferentialDrive {
    dt: f64,
    state: PlantState,
    initial: PlantState,
}

impl DifferentialDrive {
    pub fn new(dt: f64, initial: PlantState) -> Self {
        Self {
            dt,
            state: initial,
            initial,
        }
    }

    pub fn set_sample_time(&mut self, dt: f64) {
        self.dt = dt;
    }

    pub fn sample_time(&self) -> f64 {
        self.dt
    }

    /// becomes both the current state and the one `reset` returns to
    pub fn set_initial_state(&mut self, state: PlantState) {
        self.state = state;
        self.initial = state;
    }

    pub fn state(&self) -> &PlantState {
        &self.state
    }

    pub fn reset(&mut self) {
        self.state = self.initial;
    }

    /// Drive one sample with the commanded `speed` and `omega`. The position
    /// moves with the speed held over the previous sample.
    pub fn step(&mut self, speed: f64, omega: f64) {
        let state = &mut self.state;
        state.x += state.lin_vel * state.theta.cos() * self.dt;
        state.y += state.lin_vel * state.theta.sin() * self.dt;
        state.theta += omega * self.dt;
        state.throttle = (speed - state.lin_vel) / self.dt;
        state.lin_vel = speed;
        state.ang_vel = omega;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn step_from_rest() {
        let initial = PlantState::pose(-8.0, 1.5, -0.6);
        let mut plant = DifferentialDrive::new(0.1, initial);
        plant.step(1.0, 2.5);
        let state = plant.state();
        assert_abs_diff_eq!(state.x, -8.0);
        assert_abs_diff_eq!(state.y, 1.5);
        assert_abs_diff_eq!(state.theta, -0.35, epsilon = 1e-12);
        assert_abs_diff_eq!(state.lin_vel, 1.0);
        assert_abs_diff_eq!(state.ang_vel, 2.5);
        assert_abs_diff_eq!(state.throttle, 10.0, epsilon = 1e-12);

        plant.step(1.0, 0.0);
        let state = plant.state();
        assert_abs_diff_eq!(state.x, -8.0 + 0.1 * (-0.35f64).cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(state.y, 1.5 + 0.1 * (-0.35f64).sin(), epsilon = 1e-12);
        assert_abs_diff_eq!(state.throttle, 0.0);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut plant = DifferentialDrive::new(0.1, PlantState::default());
        let initial = PlantState::pose(-8.0, 1.5, -0.6);
        plant.set_initial_state(initial);
        plant.step(1.0, 2.5);
        plant.step(0.5, -1.0);
        assert_ne!(*plant.state(), initial);
        plant.reset();
        assert_eq!(*plant.state(), initial);
    }
}
