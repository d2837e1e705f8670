//! Run the closed loop described by a config file and dump the trace as json.
//!
//! usage: follow_line [config.toml] [trace.json]

use std::fs::File;
use std::io::BufWriter;

use diff_drive::{follow_line, DifferentialDrive, RunConfig};

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/config/mono.toml"));
    let trace_path = args.get(2).map(String::as_str).unwrap_or("trace.json");

    let config = RunConfig::load(config_path)?;
    let params = config.params();
    println!("{}", params.weights);

    let mut plant = DifferentialDrive::new(params.forward.dt, config.initial_state());
    let run = follow_line(params, config.settings(), &mut plant, config.terminate_on())?;
    println!(
        "run complete, took {} iterations ({} not converged), settled: {}",
        run.steps, run.unconverged, run.settled
    );

    let writer = BufWriter::new(File::create(trace_path)?);
    serde_json::to_writer_pretty(writer, &run.trace)?;
    println!("data saved to {trace_path}");
    Ok(())
}

fn main() {
    env_logger::init(); // Log to stderr (if you run with RUST_LOG=debug)
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
