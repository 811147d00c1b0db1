//! Sequential model-based search with a Gaussian-process surrogate

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::gp::{expected_improvement, GaussianProcess};
use super::random::sample_unseen;
use super::{Candidate, Observation, ParameterSpace, SearchStrategy};
use crate::error::Result;

/// Tuning knobs of the Bayesian search
#[derive(Debug, Clone, PartialEq)]
pub struct BayesianSettings {
    /// Seeded random proposals before the surrogate takes over
    pub initial_points: usize,
    /// Kernel length scale on the unit hypercube
    pub length_scale: f64,
    /// Observation noise added to the kernel diagonal
    pub noise: f64,
    /// Exploration margin of expected improvement
    pub xi: f64,
    /// Spaces up to this size are scored exhaustively
    pub exhaustive_limit: u64,
    /// Random candidates scored per proposal in larger spaces
    pub pool_size: usize,
}

impl Default for BayesianSettings {
    fn default() -> Self {
        Self {
            initial_points: crate::defaults::DEFAULT_INITIAL_POINTS as usize,
            length_scale: 0.3,
            noise: 1e-4,
            xi: 0.01,
            exhaustive_limit: 4096,
            pool_size: 512,
        }
    }
}

/// Gaussian process + expected improvement, deterministic for a given seed
#[derive(Debug, Clone)]
pub struct BayesianSearch {
    space: ParameterSpace,
    rng: StdRng,
    settings: BayesianSettings,
}

impl BayesianSearch {
    pub fn new(space: ParameterSpace, seed: u64, settings: BayesianSettings) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
            settings,
        }
    }

    fn candidate_pool(&mut self) -> Vec<Candidate> {
        if self.space.cardinality() <= self.settings.exhaustive_limit {
            self.space.enumerate()
        } else {
            (0..self.settings.pool_size)
                .map(|_| self.space.sample(&mut self.rng))
                .collect()
        }
    }

    fn propose_from_model(&mut self, history: &[Observation]) -> Result<Candidate> {
        let points = history
            .iter()
            .map(|o| self.space.encode(&o.candidate))
            .collect::<Result<Vec<_>>>()?;
        let targets: Vec<f64> = history.iter().map(|o| o.score).collect();
        let model = GaussianProcess::fit(&points, &targets, self.settings.length_scale, self.settings.noise)?;
        let best = targets.iter().copied().fold(f64::INFINITY, f64::min);

        let pool = self.candidate_pool();
        let mut unseen: Vec<&Candidate> = pool
            .iter()
            .filter(|c| !history.iter().any(|o| &o.candidate == *c))
            .collect();
        if unseen.is_empty() {
            unseen = pool.iter().collect();
        }

        let mut chosen: Option<(&Candidate, f64)> = None;
        for candidate in unseen {
            let encoded = self.space.encode(candidate)?;
            let (mean, std_dev) = model.predict(&encoded);
            let ei = expected_improvement(mean, std_dev, best, self.settings.xi);
            // Strict comparison keeps the first maximum, so ties are deterministic
            if chosen.map_or(true, |(_, best_ei)| ei > best_ei) {
                chosen = Some((candidate, ei));
            }
        }

        match chosen {
            Some((candidate, _)) => Ok(candidate.clone()),
            None => Ok(sample_unseen(&self.space, &mut self.rng, history)),
        }
    }
}

impl SearchStrategy for BayesianSearch {
    fn name(&self) -> &'static str {
        "bayesian"
    }

    fn propose(&mut self, history: &[Observation]) -> Result<Candidate> {
        if history.len() < self.settings.initial_points.max(1) {
            return Ok(sample_unseen(&self.space, &mut self.rng, history));
        }
        self.propose_from_model(history)
    }
}
