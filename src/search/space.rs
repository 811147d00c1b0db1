//! Parameter space, values and candidates

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// A concrete value for one dimension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParameterValue {
    Categorical(String),
    Integer(i64),
}

impl ParameterValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParameterValue::Categorical(s) => Some(s),
            ParameterValue::Integer(_) => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParameterValue::Integer(v) => Some(*v),
            ParameterValue::Categorical(_) => None,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParameterValue::Categorical(s) => write!(f, "{}", s),
            ParameterValue::Integer(v) => write!(f, "{}", v),
        }
    }
}

/// One axis of the search space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Dimension {
    /// Ordered set of allowed discrete values
    Categorical { name: String, choices: Vec<String> },
    /// Inclusive integer range
    IntegerRange { name: String, low: i64, high: i64 },
}

impl Dimension {
    pub fn categorical<S: Into<String>>(name: S, choices: &[&str]) -> Self {
        Dimension::Categorical {
            name: name.into(),
            choices: choices.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn integer<S: Into<String>>(name: S, low: i64, high: i64) -> Self {
        Dimension::IntegerRange { name: name.into(), low, high }
    }

    pub fn name(&self) -> &str {
        match self {
            Dimension::Categorical { name, .. } | Dimension::IntegerRange { name, .. } => name,
        }
    }

    /// Number of distinct values
    pub fn cardinality(&self) -> u64 {
        match self {
            Dimension::Categorical { choices, .. } => choices.len() as u64,
            Dimension::IntegerRange { low, high, .. } => (high - low) as u64 + 1,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Dimension::Categorical { name, choices } => {
                if choices.is_empty() {
                    return Err(AppError::validation(format!("Dimension '{}' has no choices", name)));
                }
                for (i, choice) in choices.iter().enumerate() {
                    if choice.trim().is_empty() {
                        return Err(AppError::validation(format!("Dimension '{}' has an empty choice", name)));
                    }
                    if choices[..i].contains(choice) {
                        return Err(AppError::validation(format!("Dimension '{}' lists '{}' twice", name, choice)));
                    }
                }
            }
            Dimension::IntegerRange { name, low, high } => {
                if low > high {
                    return Err(AppError::validation(format!(
                        "Dimension '{}' has lower bound {} above upper bound {}", name, low, high
                    )));
                }
            }
        }
        Ok(())
    }

    /// Whether `value` belongs to this dimension
    pub fn contains(&self, value: &ParameterValue) -> bool {
        match (self, value) {
            (Dimension::Categorical { choices, .. }, ParameterValue::Categorical(s)) => choices.contains(s),
            (Dimension::IntegerRange { low, high, .. }, ParameterValue::Integer(v)) => v >= low && v <= high,
            _ => false,
        }
    }

    /// Draw a uniformly random value
    pub fn sample<R: Rng>(&self, rng: &mut R) -> ParameterValue {
        match self {
            Dimension::Categorical { choices, .. } => {
                let idx = rng.random_range(0..choices.len());
                ParameterValue::Categorical(choices[idx].clone())
            }
            Dimension::IntegerRange { low, high, .. } => ParameterValue::Integer(rng.random_range(*low..=*high)),
        }
    }

    /// Map a value onto [0, 1]; categorical choices keep their listed order
    pub fn encode(&self, value: &ParameterValue) -> Option<f64> {
        match (self, value) {
            (Dimension::Categorical { choices, .. }, ParameterValue::Categorical(s)) => {
                let idx = choices.iter().position(|c| c == s)?;
                if choices.len() == 1 {
                    Some(0.0)
                } else {
                    Some(idx as f64 / (choices.len() - 1) as f64)
                }
            }
            (Dimension::IntegerRange { low, high, .. }, ParameterValue::Integer(v)) => {
                if high == low {
                    Some(0.0)
                } else {
                    Some((*v - *low) as f64 / (*high - *low) as f64)
                }
            }
            _ => None,
        }
    }

    /// Grid values: every choice, or `points` evenly spaced integers including both bounds
    pub fn grid_values(&self, points: usize) -> Vec<ParameterValue> {
        match self {
            Dimension::Categorical { choices, .. } => {
                choices.iter().map(|c| ParameterValue::Categorical(c.clone())).collect()
            }
            Dimension::IntegerRange { low, high, .. } => {
                let span = (high - low) as u64 + 1;
                if points as u64 >= span || points < 2 {
                    if points < 2 && span > 1 {
                        return vec![ParameterValue::Integer(*low), ParameterValue::Integer(*high)];
                    }
                    return (*low..=*high).map(ParameterValue::Integer).collect();
                }
                let step = (high - low) as f64 / (points - 1) as f64;
                let mut values: Vec<i64> = (0..points)
                    .map(|i| low + (i as f64 * step).round() as i64)
                    .collect();
                values.dedup();
                values.into_iter().map(ParameterValue::Integer).collect()
            }
        }
    }
}

/// Ordered list of dimensions, fixed for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpace {
    dimensions: Vec<Dimension>,
}

impl ParameterSpace {
    /// Build and validate a space
    pub fn new(dimensions: Vec<Dimension>) -> Result<Self> {
        if dimensions.is_empty() {
            return Err(AppError::validation("Parameter space must have at least one dimension"));
        }
        for (i, dim) in dimensions.iter().enumerate() {
            dim.validate()?;
            if dimensions[..i].iter().any(|d| d.name() == dim.name()) {
                return Err(AppError::validation(format!("Dimension '{}' is defined twice", dim.name())));
            }
        }
        Ok(Self { dimensions })
    }

    /// The three PostgreSQL knobs with the default value sets
    pub fn postgres_default() -> Self {
        use crate::defaults::*;
        Self {
            dimensions: vec![
                Dimension::categorical("shared_buffers", DEFAULT_SHARED_BUFFERS),
                Dimension::categorical("work_mem", DEFAULT_WORK_MEM),
                Dimension::integer("max_connections", DEFAULT_MAX_CONNECTIONS.0, DEFAULT_MAX_CONNECTIONS.1),
            ],
        }
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.dimensions.iter().map(|d| d.name()).collect()
    }

    /// Number of distinct candidates, saturating
    pub fn cardinality(&self) -> u64 {
        self.dimensions
            .iter()
            .fold(1u64, |acc, d| acc.saturating_mul(d.cardinality()))
    }

    /// Draw a uniformly random candidate
    pub fn sample<R: Rng>(&self, rng: &mut R) -> Candidate {
        Candidate {
            entries: self
                .dimensions
                .iter()
                .map(|d| (d.name().to_string(), d.sample(rng)))
                .collect(),
        }
    }

    /// Encode a candidate into the unit hypercube, one coordinate per dimension
    pub fn encode(&self, candidate: &Candidate) -> Result<Vec<f64>> {
        self.validate_candidate(candidate)?;
        self.dimensions
            .iter()
            .zip(candidate.values())
            .map(|(d, v)| {
                d.encode(v)
                    .ok_or_else(|| AppError::search(format!("Value {} does not belong to '{}'", v, d.name())))
            })
            .collect()
    }

    /// Every candidate of the space, in row-major order over the dimensions
    pub fn enumerate(&self) -> Vec<Candidate> {
        self.grid(usize::MAX)
    }

    /// Cartesian product of per-dimension grid values
    pub fn grid(&self, integer_points: usize) -> Vec<Candidate> {
        let mut rows: Vec<Vec<(String, ParameterValue)>> = vec![Vec::new()];
        for dim in &self.dimensions {
            let values = dim.grid_values(integer_points);
            let mut next = Vec::with_capacity(rows.len() * values.len());
            for row in &rows {
                for value in &values {
                    let mut extended = row.clone();
                    extended.push((dim.name().to_string(), value.clone()));
                    next.push(extended);
                }
            }
            rows = next;
        }
        rows.into_iter().map(|entries| Candidate { entries }).collect()
    }

    /// Check arity, names, types and bounds
    pub fn validate_candidate(&self, candidate: &Candidate) -> Result<()> {
        if candidate.entries.len() != self.dimensions.len() {
            return Err(AppError::search(format!(
                "Candidate has {} values, space has {} dimensions",
                candidate.entries.len(),
                self.dimensions.len()
            )));
        }
        for (dim, (name, value)) in self.dimensions.iter().zip(&candidate.entries) {
            if dim.name() != name {
                return Err(AppError::search(format!("Expected '{}' but candidate has '{}'", dim.name(), name)));
            }
            if !dim.contains(value) {
                return Err(AppError::search(format!("Value {} is outside dimension '{}'", value, name)));
            }
        }
        Ok(())
    }
}

/// One value per dimension, in space order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    entries: Vec<(String, ParameterValue)>,
}

impl Candidate {
    /// Build a candidate from name/value pairs; validated against a space by the caller
    pub fn new(entries: Vec<(String, ParameterValue)>) -> Self {
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn values(&self) -> impl Iterator<Item = &ParameterValue> {
        self.entries.iter().map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Compact form like `256MB/8MB/75`
    pub fn short(&self) -> String {
        self.values().map(|v| v.to_string()).collect::<Vec<_>>().join("/")
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|(n, v)| format!("{}={}", n, v)).collect();
        write!(f, "{}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn candidate(sb: &str, wm: &str, mc: i64) -> Candidate {
        Candidate::new(vec![
            ("shared_buffers".to_string(), ParameterValue::Categorical(sb.to_string())),
            ("work_mem".to_string(), ParameterValue::Categorical(wm.to_string())),
            ("max_connections".to_string(), ParameterValue::Integer(mc)),
        ])
    }

    #[test]
    fn test_default_space_shape() {
        let space = ParameterSpace::postgres_default();
        assert_eq!(space.names(), vec!["shared_buffers", "work_mem", "max_connections"]);
        assert_eq!(space.cardinality(), 3 * 3 * 51);
    }

    #[test]
    fn test_space_rejects_bad_dimensions() {
        assert!(ParameterSpace::new(vec![]).is_err());
        assert!(ParameterSpace::new(vec![Dimension::categorical("a", &[])]).is_err());
        assert!(ParameterSpace::new(vec![Dimension::categorical("a", &["x", "x"])]).is_err());
        assert!(ParameterSpace::new(vec![Dimension::integer("a", 10, 5)]).is_err());
        assert!(ParameterSpace::new(vec![
            Dimension::integer("a", 1, 5),
            Dimension::integer("a", 1, 5),
        ])
        .is_err());
    }

    #[test]
    fn test_samples_stay_in_space() {
        let space = ParameterSpace::postgres_default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let c = space.sample(&mut rng);
            assert!(space.validate_candidate(&c).is_ok());
        }
    }

    #[test]
    fn test_encode_bounds() {
        let space = ParameterSpace::postgres_default();
        assert_eq!(space.encode(&candidate("128MB", "4MB", 50)).unwrap(), vec![0.0, 0.0, 0.0]);
        assert_eq!(space.encode(&candidate("512MB", "16MB", 100)).unwrap(), vec![1.0, 1.0, 1.0]);
        assert_eq!(space.encode(&candidate("256MB", "8MB", 75)).unwrap(), vec![0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_validate_candidate_rejects_out_of_range() {
        let space = ParameterSpace::postgres_default();
        assert!(space.validate_candidate(&candidate("1GB", "4MB", 50)).is_err());
        assert!(space.validate_candidate(&candidate("128MB", "4MB", 101)).is_err());
        let short = Candidate::new(vec![(
            "shared_buffers".to_string(),
            ParameterValue::Categorical("128MB".to_string()),
        )]);
        assert!(space.validate_candidate(&short).is_err());
    }

    #[test]
    fn test_grid_uses_range_endpoints() {
        let space = ParameterSpace::postgres_default();
        let grid = space.grid(2);
        assert_eq!(grid.len(), 3 * 3 * 2);
        assert_eq!(grid[0].short(), "128MB/4MB/50");
        assert_eq!(grid[1].short(), "128MB/4MB/100");
    }

    #[test]
    fn test_enumerate_covers_everything_once() {
        let space = ParameterSpace::new(vec![
            Dimension::categorical("a", &["x", "y"]),
            Dimension::integer("b", 1, 3),
        ])
        .unwrap();
        let all = space.enumerate();
        assert_eq!(all.len(), 6);
        let unique: std::collections::HashSet<_> = all.iter().collect();
        assert_eq!(unique.len(), 6);
    }

    #[test]
    fn test_integer_grid_values_are_spread() {
        let dim = Dimension::integer("max_connections", 50, 100);
        let values: Vec<i64> = dim.grid_values(3).iter().filter_map(|v| v.as_int()).collect();
        assert_eq!(values, vec![50, 75, 100]);
    }

    #[test]
    fn test_candidate_display() {
        let c = candidate("256MB", "8MB", 75);
        assert_eq!(c.to_string(), "shared_buffers=256MB, work_mem=8MB, max_connections=75");
        assert_eq!(c.get("max_connections"), Some(&ParameterValue::Integer(75)));
    }
}
