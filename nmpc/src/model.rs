//! Discretized kinematics of a differential drive robot tracking a cubic path.

use crate::polynomial::Polynomial;
use crate::state::{Control, State};

/// Propagate `state` one sample of length `dt` under `control`.
///
/// The tracking errors of the next state are taken against the path at the
/// current `x`, not the propagated one.
pub fn step(state: &State, control: &Control, dt: f64, path: &Polynomial) -> State {
    State {
        x: state.x + state.v * state.theta.cos() * dt,
        y: state.y + state.v * state.theta.sin() * dt,
        theta: state.theta + control.omega * dt,
        v: state.v + control.throttle * dt,
        omega: control.omega,
        throttle: control.throttle,
        cte: path.value(state.x) - state.y + state.v * state.etheta.sin() * dt,
        etheta: state.theta - path.slope(state.x).atan() + control.omega * dt,
    }
}

/// `initial` followed by every state reached by applying `controls` in order
pub fn rollout(initial: &State, controls: &[Control], dt: f64, path: &Polynomial) -> Vec<State> {
    let mut states = Vec::with_capacity(controls.len() + 1);
    states.push(*initial);
    let mut current = *initial;
    for control in controls {
        current = step(&current, control, dt, path);
        states.push(current);
    }
    states
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_step() {
        let path = Polynomial::new([0.0; 4]);
        let state = State::new(1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 0.0);
        let next = step(&state, &Control::new(0.5, -1.0), 0.1, &path);
        assert!((next.x - 1.2).abs() < 1e-12);
        assert!(next.y.abs() < 1e-12);
        assert!((next.theta - 0.05).abs() < 1e-12);
        assert!((next.v - 1.9).abs() < 1e-12);
        assert_eq!(next.omega, 0.5);
        assert_eq!(next.throttle, -1.0);
        assert!(next.cte.abs() < 1e-12);
        assert!((next.etheta - 0.05).abs() < 1e-12);
    }

    #[test]
    fn errors_use_current_position() {
        let path = Polynomial::new([1.0, 0.5, 0.0, 0.0]);
        let state = State::new(2.0, 0.5, 0.3, 1.0, 0.0, 0.0, 0.0, -0.2);
        let dt = 0.1;
        let next = step(&state, &Control::new(1.0, 0.0), dt, &path);
        // path height and slope at x = 2, not at the propagated x
        let cte = 2.0 - 0.5 + (-0.2f64).sin() * dt;
        let etheta = 0.3 - 0.5f64.atan() + 0.1;
        assert!((next.cte - cte).abs() < 1e-12);
        assert!((next.etheta - etheta).abs() < 1e-12);
    }

    #[test]
    fn rollout_length() {
        let path = Polynomial::new([0.0; 4]);
        let controls = vec![Control::new(0.0, 1.0); 5];
        let states = rollout(&State::default(), &controls, 0.1, &path);
        assert_eq!(states.len(), 6);
        assert!((states[5].v - 0.5).abs() < 1e-12);
        // x lags v by one sample
        assert!((states[5].x - 0.1).abs() < 1e-12);
    }
}
