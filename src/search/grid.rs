//! Grid search over the parameter space

use super::{Candidate, Observation, ParameterSpace, SearchStrategy};
use crate::error::{AppError, Result};

/// Walks the cartesian grid in order, wrapping around when the budget exceeds it
#[derive(Debug, Clone)]
pub struct GridSearch {
    grid: Vec<Candidate>,
    cursor: usize,
}

impl GridSearch {
    /// `integer_points` grid points per integer range (both bounds always included)
    pub fn new(space: ParameterSpace, integer_points: usize) -> Self {
        Self {
            grid: space.grid(integer_points),
            cursor: 0,
        }
    }

    /// Number of points in one sweep
    pub fn size(&self) -> usize {
        self.grid.len()
    }
}

impl SearchStrategy for GridSearch {
    fn name(&self) -> &'static str {
        "grid"
    }

    fn propose(&mut self, _history: &[Observation]) -> Result<Candidate> {
        if self.grid.is_empty() {
            return Err(AppError::search("Grid is empty"));
        }
        let candidate = self.grid[self.cursor % self.grid.len()].clone();
        self.cursor += 1;
        Ok(candidate)
    }
}
