//! Decision trajectory and its flat decision vector layout.

use serde::{Deserialize, Serialize};

use crate::model;
use crate::polynomial::Polynomial;
use crate::state::{Control, State};

/// state dimensions carried in the decision vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    X = 0,
    Y,
    Theta,
    V,
    Cte,
    Etheta,
}

impl Dim {
    pub const COUNT: usize = 6;
    pub const ALL: [Dim; Dim::COUNT] = [Dim::X, Dim::Y, Dim::Theta, Dim::V, Dim::Cte, Dim::Etheta];

    pub fn of(self, state: &State) -> f64 {
        match self {
            Dim::X => state.x,
            Dim::Y => state.y,
            Dim::Theta => state.theta,
            Dim::V => state.v,
            Dim::Cte => state.cte,
            Dim::Etheta => state.etheta,
        }
    }

    fn set(self, state: &mut State, value: f64) {
        match self {
            Dim::X => state.x = value,
            Dim::Y => state.y = value,
            Dim::Theta => state.theta = value,
            Dim::V => state.v = value,
            Dim::Cte => state.cte = value,
            Dim::Etheta => state.etheta = value,
        }
    }
}

/// Index map of the decision vector.
///
/// Each state dimension owns one contiguous block covering every knot, then
/// come the omega block and the throttle block. Constraint rows use the same
/// indexing as the state blocks: row `state(dim, 0)` pins the initial state
/// and row `state(dim, t + 1)` links knot `t` to knot `t + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    timesteps: usize,
}

impl Layout {
    pub fn new(timesteps: usize) -> Self {
        Self { timesteps }
    }

    pub fn timesteps(&self) -> usize {
        self.timesteps
    }

    pub fn controls(&self) -> usize {
        self.timesteps.saturating_sub(1)
    }

    pub fn state(&self, dim: Dim, t: usize) -> usize {
        dim as usize * self.timesteps + t
    }

    pub fn omega(&self, t: usize) -> usize {
        Dim::COUNT * self.timesteps + t
    }

    pub fn throttle(&self, t: usize) -> usize {
        Dim::COUNT * self.timesteps + self.controls() + t
    }

    pub fn n_vars(&self) -> usize {
        Dim::COUNT * self.timesteps + 2 * self.controls()
    }

    pub fn n_constraints(&self) -> usize {
        Dim::COUNT * self.timesteps
    }

    /// state at knot `t`, `omega` and `throttle` taken from the control before it
    pub fn knot(&self, z: &[f64], t: usize) -> State {
        let mut state = State::default();
        for dim in Dim::ALL {
            dim.set(&mut state, z[self.state(dim, t)]);
        }
        if t > 0 {
            state.omega = z[self.omega(t - 1)];
            state.throttle = z[self.throttle(t - 1)];
        }
        state
    }

    pub fn control(&self, z: &[f64], t: usize) -> Control {
        Control::new(z[self.omega(t)], z[self.throttle(t)])
    }

    pub fn pack(&self, trajectory: &Trajectory) -> Vec<f64> {
        let mut z = vec![0.0; self.n_vars()];
        for (t, state) in trajectory.states.iter().enumerate().take(self.timesteps) {
            for dim in Dim::ALL {
                z[self.state(dim, t)] = dim.of(state);
            }
        }
        for (t, control) in trajectory.controls.iter().enumerate().take(self.controls()) {
            z[self.omega(t)] = control.omega;
            z[self.throttle(t)] = control.throttle;
        }
        z
    }

    /// Typed view of `z`. Knot 0 keeps the actuation recorded in `initial`.
    pub fn unpack(&self, z: &[f64], initial: &State) -> Trajectory {
        let mut states: Vec<State> = (0..self.timesteps).map(|t| self.knot(z, t)).collect();
        states[0].omega = initial.omega;
        states[0].throttle = initial.throttle;
        let controls = (0..self.controls()).map(|t| self.control(z, t)).collect();
        Trajectory { states, controls }
    }
}

/// predicted states and the controls between them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub states: Vec<State>,
    pub controls: Vec<Control>,
}

impl Trajectory {
    /// initial state followed by zeros
    pub fn cold(initial: &State, timesteps: usize) -> Self {
        let mut states = vec![State::default(); timesteps];
        states[0] = *initial;
        Self {
            states,
            controls: vec![Control::default(); timesteps.saturating_sub(1)],
        }
    }

    pub fn rollout(initial: &State, controls: Vec<Control>, dt: f64, path: &Polynomial) -> Self {
        Self {
            states: model::rollout(initial, &controls, dt, path),
            controls,
        }
    }

    /// Receding horizon warm start: drop the first control, repeat the last one
    /// and roll the states out again from `initial`.
    pub fn shifted(&self, initial: &State, dt: f64, path: &Polynomial) -> Self {
        let mut controls: Vec<Control> = self.controls.iter().skip(1).copied().collect();
        if let Some(last) = self.controls.last() {
            controls.push(*last);
        }
        Self::rollout(initial, controls, dt, path)
    }

    pub fn timesteps(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_indices() {
        let layout = Layout::new(12);
        assert_eq!(layout.n_vars(), 6 * 12 + 2 * 11);
        assert_eq!(layout.n_constraints(), 72);
        assert_eq!(layout.state(Dim::X, 0), 0);
        assert_eq!(layout.state(Dim::Etheta, 11), 71);
        assert_eq!(layout.omega(0), 72);
        assert_eq!(layout.throttle(0), 83);
        assert_eq!(layout.throttle(10), layout.n_vars() - 1);
    }

    #[test]
    fn pack_unpack() {
        let path = Polynomial::new([0.5, 0.1, 0.0, 0.0]);
        let initial = State::new(0.0, 0.0, 0.1, 0.3, 0.2, -0.4, 0.5, -0.1);
        let controls = vec![
            Control::new(0.1, 0.2),
            Control::new(-0.3, 0.4),
            Control::new(0.5, -0.6),
        ];
        let trajectory = Trajectory::rollout(&initial, controls, 0.1, &path);
        let layout = Layout::new(trajectory.timesteps());
        let z = layout.pack(&trajectory);
        assert_eq!(layout.unpack(&z, &initial), trajectory);
    }

    #[test]
    fn shifted_warm_start() {
        let path = Polynomial::new([0.0; 4]);
        let initial = State::default();
        let controls = vec![
            Control::new(0.1, 0.2),
            Control::new(0.3, 0.4),
            Control::new(0.5, 0.6),
        ];
        let trajectory = Trajectory::rollout(&initial, controls, 0.1, &path);
        let next = State::new(0.01, 0.0, 0.0, 0.02, 0.1, 0.2, 0.0, 0.0);
        let shifted = trajectory.shifted(&next, 0.1, &path);
        assert_eq!(shifted.timesteps(), 4);
        assert_eq!(shifted.states[0], next);
        assert_eq!(
            shifted.controls,
            vec![
                Control::new(0.3, 0.4),
                Control::new(0.5, 0.6),
                Control::new(0.5, 0.6)
            ]
        );
    }

    #[test]
    fn cold_guess() {
        let initial = State::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0);
        let guess = Trajectory::cold(&initial, 2);
        assert_eq!(guess.states, vec![initial, State::default()]);
        assert_eq!(guess.controls.len(), 1);
    }
}
