//! Genetic search over the controller's cost weights.
//!
//! Every candidate weight set drives the plant for a fixed number of cycles
//! and is scored on how fast the tracking errors decay and how much actuation
//! it spends. Weights are binary encoded, `GENE_BITS` per weight, so that
//! crossover and mutation act on bits.

use log::{debug, info, warn};
use nmpc::{Bounds, Params, SolverSettings, Weights};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::follow::{follow_line, Performance, TerminateOn};
use crate::plant::{DifferentialDrive, PlantState};

pub const GENE_BITS: u32 = 20;
const GENE_MAX: u32 = (1 << GENE_BITS) - 1;

/// relative weight of the cte, etheta, speed, translational and rotational terms
const METRIC_WEIGHTS: [f64; 5] = [0.2; 5];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TuneError {
    #[error("Invalid genetic algorithm setting: {0}")]
    Setting(&'static str),

    #[error("Invalid search bounds for w_{name}: [{min}, {max}]")]
    WeightBounds { name: &'static str, min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GaSettings {
    pub generations: usize,
    pub population_size: usize,
    /// fittest organisms kept as parents every generation
    pub mating_pool_size: usize,
    /// closed loop cycles each candidate is scored on
    pub steps_per_genome: usize,
    /// per bit
    pub mutation_probability: f64,
    /// chance a bit comes from the first parent
    #[serde(default = "default_crossover_bias")]
    pub crossover_bias: f64,
    /// fixed seed for a reproducible search
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_crossover_bias() -> f64 {
    0.5
}

impl GaSettings {
    pub fn validate(&self) -> Result<(), TuneError> {
        if self.generations == 0 {
            return Err(TuneError::Setting("generations must be at least 1"));
        }
        if self.steps_per_genome == 0 {
            return Err(TuneError::Setting("steps_per_genome must be at least 1"));
        }
        if self.mating_pool_size == 0 || self.mating_pool_size > self.population_size {
            return Err(TuneError::Setting(
                "mating_pool_size must be between 1 and population_size",
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_probability) {
            return Err(TuneError::Setting("mutation_probability must lie in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.crossover_bias) {
            return Err(TuneError::Setting("crossover_bias must lie in [0, 1]"));
        }
        Ok(())
    }
}

/// search interval of every weight
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub cte: Bounds,
    pub etheta: Bounds,
    pub vel: Bounds,
    pub omega: Bounds,
    pub acc: Bounds,
    pub omega_d: Bounds,
    pub acc_d: Bounds,
}

impl WeightBounds {
    /// same bounds for every weight
    pub fn uniform(bounds: Bounds) -> Self {
        Self {
            cte: bounds,
            etheta: bounds,
            vel: bounds,
            omega: bounds,
            acc: bounds,
            omega_d: bounds,
            acc_d: bounds,
        }
    }

    /// in the order of `Weights::to_array`
    fn to_array(&self) -> [Bounds; 7] {
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

    pub fn validate(&self) -> Result<(), TuneError> {
        for (name, b) in Weights::NAMES.into_iter().zip(self.to_array()) {
            if !(b.min.is_finite() && b.max.is_finite() && 0.0 <= b.min && b.min <= b.max) {
                return Err(TuneError::WeightBounds {
                    name,
                    min: b.min,
                    max: b.max,
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, weights: &Weights) -> bool {
        self.to_array()
            .iter()
            .zip(weights.to_array())
            .all(|(b, w)| b.contains(w))
    }

    fn sample<R: Rng>(&self, rng: &mut R) -> Weights {
        Weights::from_array(self.to_array().map(|b| rng.gen_range(b.min..=b.max)))
    }
}

/// Min-max scaling onto `[0, 1]`. A constant series maps to zeros.
fn normalized(series: &[f64]) -> Vec<f64> {
    let (min, max) = series
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !(range > 0.0 && range.is_finite()) {
        return vec![0.0; series.len()];
    }
    series.iter().map(|v| (v - min) / range).collect()
}

/// integral of time weighted absolute error, time counted in cycles from 1
fn itae(series: &[f64]) -> f64 {
    series
        .iter()
        .enumerate()
        .map(|(i, v)| (i + 1) as f64 * v.abs())
        .sum()
}

/// integral of absolute error
fn iae(series: &[f64]) -> f64 {
    series.iter().map(|v| v.abs()).sum()
}

/// Fitness of a closed loop response, higher is better.
///
/// Each series is normalized first, the errors are integrated time weighted
/// and the actuation changes plain. A response without any measurable
/// variation scores 0.
pub fn fitness(performance: &Performance) -> f64 {
    let metrics = [
        itae(&normalized(&performance.cte)),
        itae(&normalized(&performance.etheta)),
        itae(&normalized(&performance.vel_err)),
        iae(&normalized(&performance.translational_effort)),
        iae(&normalized(&performance.rotational_effort)),
    ];
    let metric: f64 = METRIC_WEIGHTS
        .iter()
        .zip(metrics)
        .map(|(w, m)| w * m)
        .sum();
    if !(metric > 0.0 && metric.is_finite()) {
        return 0.0;
    }
    10000.0 * METRIC_WEIGHTS.iter().sum::<f64>() / metric
}

/// The seven weights, each quantized onto `GENE_BITS` bits of its search interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Genome([u32; 7]);

impl Genome {
    pub fn encode(weights: &Weights, bounds: &WeightBounds) -> Self {
        let mut genes = [0; 7];
        for ((gene, b), w) in genes.iter_mut().zip(bounds.to_array()).zip(weights.to_array()) {
            let range = b.max - b.min;
            if range > 0.0 {
                let scaled = ((w - b.min) / range * GENE_MAX as f64).clamp(0.0, GENE_MAX as f64);
                *gene = scaled as u32;
            }
        }
        Self(genes)
    }

    pub fn decode(&self, bounds: &WeightBounds) -> Weights {
        let b = bounds.to_array();
        Weights::from_array(std::array::from_fn(|i| {
            b[i].min + self.0[i] as f64 * (b[i].max - b[i].min) / GENE_MAX as f64
        }))
    }

    /// Uniform crossover: every bit is drawn from `self` with probability
    /// `bias`, from `other` otherwise.
    pub fn crossover<R: Rng>(&self, other: &Genome, bias: f64, rng: &mut R) -> Genome {
        let mut genes = [0; 7];
        for (i, gene) in genes.iter_mut().enumerate() {
            for bit in 0..GENE_BITS {
                let source = if rng.gen_bool(bias) {
                    self.0[i]
                } else {
                    other.0[i]
                };
                *gene |= source & (1 << bit);
            }
        }
        Genome(genes)
    }

    /// flip every bit with the given probability
    pub fn mutate<R: Rng>(&mut self, probability: f64, rng: &mut R) {
        for gene in self.0.iter_mut() {
            for bit in 0..GENE_BITS {
                if rng.gen_bool(probability) {
                    *gene ^= 1 << bit;
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Organism {
    genome: Genome,
    /// `None` until scored
    fitness: Option<f64>,
}

impl Organism {
    fn new(genome: Genome) -> Self {
        Self {
            genome,
            fitness: None,
        }
    }

    fn rank(&self) -> f64 {
        self.fitness.unwrap_or(f64::NEG_INFINITY)
    }
}

/// Fittest weights of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Champion {
    pub generation: usize,
    pub fitness: f64,
    pub weights: Weights,
}

pub struct Evolution<R> {
    settings: GaSettings,
    bounds: WeightBounds,
    organisms: Vec<Organism>,
    generation: usize,
    rng: R,
}

impl<R: Rng> Evolution<R> {
    /// Population drawn uniformly from the weight bounds.
    pub fn new(settings: GaSettings, bounds: WeightBounds, mut rng: R) -> Result<Self, TuneError> {
        settings.validate()?;
        bounds.validate()?;
        let organisms = (0..settings.population_size)
            .map(|_| Organism::new(Genome::encode(&bounds.sample(&mut rng), &bounds)))
            .collect();
        Ok(Self {
            settings,
            bounds,
            organisms,
            generation: 1,
            rng,
        })
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    /// Score the organisms not scored yet and sort the population, fittest
    /// first. Parents kept from the last generation keep their score.
    pub fn evaluate<F: FnMut(&Weights) -> f64>(&mut self, mut score: F) {
        for (i, organism) in self.organisms.iter_mut().enumerate() {
            if organism.fitness.is_some() {
                continue;
            }
            let weights = organism.genome.decode(&self.bounds);
            let fitness = score(&weights);
            debug!("generation {} organism {i}: fitness {fitness}", self.generation);
            organism.fitness = Some(if fitness.is_nan() { 0.0 } else { fitness });
        }
        self.organisms.sort_by(|a, b| b.rank().total_cmp(&a.rank()));
    }

    pub fn best(&self) -> Option<Champion> {
        let best = self.organisms.first()?;
        Some(Champion {
            generation: self.generation,
            fitness: best.fitness?,
            weights: best.genome.decode(&self.bounds),
        })
    }

    /// Keep the mating pool and replace the rest of the population by
    /// mutated offspring of neighbouring pool members.
    pub fn breed(&mut self) {
        let pool = self.settings.mating_pool_size;
        for k in pool..self.organisms.len() {
            let first = self.organisms[k % pool].genome;
            let second = self.organisms[(k + 1) % pool].genome;
            let mut child = first.crossover(&second, self.settings.crossover_bias, &mut self.rng);
            child.mutate(self.settings.mutation_probability, &mut self.rng);
            self.organisms[k] = Organism::new(child);
        }
        self.generation += 1;
    }

    /// Evolve for the configured number of generations and return the
    /// champion of each.
    pub fn run<F: FnMut(&Weights) -> f64>(&mut self, mut score: F) -> Vec<Champion> {
        let mut champions = Vec::with_capacity(self.settings.generations);
        for remaining in (0..self.settings.generations).rev() {
            self.evaluate(&mut score);
            if let Some(champion) = self.best() {
                info!(
                    "generation {}: best fitness {:.4} ({})",
                    champion.generation, champion.fitness, champion.weights
                );
                champions.push(champion);
            }
            if remaining > 0 {
                self.breed();
            }
        }
        champions
    }
}

/// Scores weights on a fixed length closed loop run from `initial`.
#[derive(Debug, Clone)]
pub struct ClosedLoop {
    /// every field except the weights
    pub params: Params,
    pub settings: SolverSettings,
    pub initial: PlantState,
    pub steps: usize,
}

impl ClosedLoop {
    pub fn score(&self, weights: &Weights) -> f64 {
        let params = Params {
            weights: *weights,
            ..self.params
        };
        let mut plant = DifferentialDrive::new(params.forward.dt, self.initial);
        match follow_line(
            params,
            self.settings.clone(),
            &mut plant,
            TerminateOn::Steps(self.steps),
        ) {
            Ok(run) => fitness(&run.performance),
            Err(e) => {
                warn!("closed loop failed with {weights}: {e}");
                0.0
            }
        }
    }
}
