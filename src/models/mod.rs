//! Data models and structures for the configuration tuner

pub mod config;
pub mod trial;

// Re-export main model types
pub use config::{BenchmarkMode, Config, ConfigFormat};
pub use trial::{BestTracker, TrialResult};
