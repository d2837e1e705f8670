//! Time repeated cold solves from the configured start pose.
//!
//! usage: bench_solver [config.toml] [repetitions]

use std::time::{Duration, Instant};

use diff_drive::{frame, RunConfig};
use nmpc::Nmpc;

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/config/mono.toml"));
    let repetitions: usize = match args.get(2) {
        Some(arg) => arg.parse()?,
        None => 100,
    };

    let config = RunConfig::load(config_path)?;
    let params = config.params();
    let plant = config.initial_state();
    let coeffs = frame::line_coefficients(plant.y, plant.theta);
    let state = frame::latency_compensated(&plant, &coeffs, params.forward.dt);
    let nmpc = Nmpc::with_settings(params, coeffs.to_vec(), config.settings())?;

    let mut times = Vec::with_capacity(repetitions);
    let mut iterations = 0;
    for _ in 0..repetitions {
        let start = Instant::now();
        let solution = nmpc.solve_cold(&state)?;
        times.push(start.elapsed());
        iterations = solution.report.iterations;
    }
    let total: Duration = times.iter().sum();
    let (Some(min), Some(max)) = (times.iter().min(), times.iter().max()) else {
        return Err("need at least one repetition".into());
    };
    println!(
        "{repetitions} solves, {iterations} iterations each: mean {:.3} ms min {:.3} ms max {:.3} ms",
        total.as_secs_f64() * 1e3 / repetitions as f64,
        min.as_secs_f64() * 1e3,
        max.as_secs_f64() * 1e3
    );
    Ok(())
}

fn main() {
    env_logger::init(); // Log to stderr (if you run with RUST_LOG=debug)
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
