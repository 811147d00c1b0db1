//! Seeded random search

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::{Candidate, Observation, ParameterSpace, SearchStrategy};
use crate::error::Result;

/// Draws to try before accepting a repeated candidate
const MAX_REDRAWS: usize = 64;

/// Uniform sampling that avoids re-proposing evaluated points while it can
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: ParameterSpace,
    rng: StdRng,
}

impl RandomSearch {
    pub fn new(space: ParameterSpace, seed: u64) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

/// Sample `space` until a candidate not in `history` shows up, or give up and
/// return the last draw
pub(crate) fn sample_unseen(space: &ParameterSpace, rng: &mut StdRng, history: &[Observation]) -> Candidate {
    let mut candidate = space.sample(rng);
    if (history.len() as u64) >= space.cardinality() {
        return candidate;
    }
    for _ in 0..MAX_REDRAWS {
        if !history.iter().any(|o| o.candidate == candidate) {
            break;
        }
        candidate = space.sample(rng);
    }
    candidate
}

impl SearchStrategy for RandomSearch {
    fn name(&self) -> &'static str {
        "random"
    }

    fn propose(&mut self, history: &[Observation]) -> Result<Candidate> {
        Ok(sample_unseen(&self.space, &mut self.rng, history))
    }
}
