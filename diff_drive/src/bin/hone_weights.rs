//! Search the cost weights with the genetic algorithm and write the champion
//! of every generation as json.
//!
//! usage: hone_weights [ga.toml] [champions.json]

use std::fs::File;
use std::io::BufWriter;

use diff_drive::{Evolution, TuneConfig};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let config_path = args
        .get(1)
        .map(String::as_str)
        .unwrap_or(concat!(env!("CARGO_MANIFEST_DIR"), "/config/ga.toml"));
    let output_path = args.get(2).map(String::as_str).unwrap_or("champions.json");

    let config = TuneConfig::load(config_path)?;
    let ga = config.genetic_algorithm;
    let seed = ga.seed.unwrap_or_else(rand::random);
    println!(
        "{} generations of {} organisms, mating pool {}, seed {seed}",
        ga.generations, ga.population_size, ga.mating_pool_size
    );

    let closed_loop = config.closed_loop();
    // bad controller settings would zero every score, fail early instead
    closed_loop.params.validate()?;
    let mut evolution = Evolution::new(ga, config.weight_bounds, ChaCha8Rng::seed_from_u64(seed))?;
    let champions = evolution.run(|weights| closed_loop.score(weights));
    for champion in &champions {
        println!(
            "generation {}: fitness {:.4}",
            champion.generation, champion.fitness
        );
    }
    if let Some(best) = champions.last() {
        println!("optimum weights found:\n{}", best.weights);
    }

    let writer = BufWriter::new(File::create(output_path)?);
    serde_json::to_writer_pretty(writer, &champions)?;
    println!("champions saved to {output_path}");
    Ok(())
}

fn main() {
    env_logger::init(); // Log to stderr (if you run with RUST_LOG=info)
    if let Err(e) = run() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
