//! Solve the reference scenario once and print the result.
//!
//! usage: solve_fixture [timesteps] [--verbose] [--gauss-newton]

use nmpc::{
    Bounds, Desired, Forward, HessianMode, Limits, Nmpc, Params, SolverSettings, State, Trace,
    Weights,
};

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let timesteps = match args.iter().find(|a| !a.starts_with("--")) {
        Some(arg) => arg.parse()?,
        None => 12,
    };
    let settings = SolverSettings {
        verbose: args.iter().any(|a| a == "--verbose"),
        hessian: if args.iter().any(|a| a == "--gauss-newton") {
            HessianMode::GaussNewton
        } else {
            HessianMode::Exact
        },
        ..Default::default()
    };

    let params = Params {
        forward: Forward {
            timesteps,
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
            cte: 87.859183,
            etheta: 99.532785,
            vel: 54.116644,
            omega: 47.430096,
            acc: 2.185306,
            omega_d: 4.6115,
            acc_d: 66.870729,
        },
    };
    // world line y = 0 from a robot at y = 1.5 heading -0.6
    let coeffs = vec![-1.5 / 0.6f64.cos(), 0.6f64.tan(), 0.0, 0.0];
    let state = State::new(0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -1.81744, -0.6);

    let mut nmpc = Nmpc::with_settings(params, coeffs, settings)?;
    println!("{}", params.weights);
    let solution = nmpc.solve(&state)?;
    println!(
        "omega {:.6} throttle {:.6} cost {:.6}",
        solution.omega, solution.throttle, solution.cost
    );
    println!("{:?}", solution.report);
    let trace = Trace::from_solution(&solution, params.weights, params.desired.vel);
    println!("{trace:?}");
    Ok(())
}

fn main() {
    env_logger::init(); // Log to stderr (if you run with RUST_LOG=debug)
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
