//! Reference and solver input in the robot's own frame.

use nmpc::State;

use crate::plant::PlantState;

/// The world line `y = 0` as cubic coefficients in the frame of a robot at
/// height `y` with heading `theta`.
pub fn line_coefficients(y: f64, theta: f64) -> [f64; 4] {
    [-y / theta.cos(), -theta.tan(), 0.0, 0.0]
}

/// Solver input one sample ahead of `plant`, assuming the last command is held
/// while the solve runs. The robot frame is the one of the current pose.
pub fn latency_compensated(plant: &PlantState, coeffs: &[f64; 4], dt: f64) -> State {
    let cte = coeffs[0];
    let etheta = -coeffs[1].atan();
    let theta = plant.ang_vel * dt;
    State {
        x: plant.lin_vel * dt,
        y: 0.0,
        theta,
        v: plant.lin_vel + plant.throttle * dt,
        omega: plant.ang_vel,
        throttle: plant.throttle,
        cte: cte + plant.lin_vel * etheta.sin() * dt,
        etheta: etheta - theta,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nmpc::Polynomial;

    fn to_robot_frame(px: f64, py: f64, theta: f64, x: f64, y: f64) -> (f64, f64) {
        let (dx, dy) = (x - px, y - py);
        (
            dx * theta.cos() + dy * theta.sin(),
            -dx * theta.sin() + dy * theta.cos(),
        )
    }

    #[test]
    fn line_passes_through_transformed_points() {
        let (px, py, theta) = (-8.0, 1.5, -0.6);
        let path = Polynomial::new(line_coefficients(py, theta));
        for s in [-8.0, -5.0, 0.0, 3.5] {
            let (lx, ly) = to_robot_frame(px, py, theta, s, 0.0);
            assert_abs_diff_eq!(path.value(lx), ly, epsilon = 1e-12);
        }
    }

    #[test]
    fn errors_at_rest() {
        let plant = PlantState::pose(-8.0, 1.5, -0.6);
        let coeffs = line_coefficients(plant.y, plant.theta);
        let state = latency_compensated(&plant, &coeffs, 0.1);
        assert_abs_diff_eq!(state.cte, -1.5 / 0.6f64.cos(), epsilon = 1e-12);
        assert_abs_diff_eq!(state.etheta, -0.6, epsilon = 1e-12);
        assert_eq!(state.x, 0.0);
        assert_eq!(state.v, 0.0);
    }

    #[test]
    fn moving_robot_is_propagated() {
        let plant = PlantState {
            lin_vel: 0.4,
            ang_vel: 0.2,
            throttle: 1.0,
            ..PlantState::pose(0.0, 0.0, 0.0)
        };
        let state = latency_compensated(&plant, &[0.0; 4], 0.1);
        assert_abs_diff_eq!(state.x, 0.04, epsilon = 1e-12);
        assert_abs_diff_eq!(state.theta, 0.02, epsilon = 1e-12);
        assert_abs_diff_eq!(state.v, 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(state.etheta, -0.02, epsilon = 1e-12);
    }
}
