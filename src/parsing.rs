//! Text grammar for the outputs of external tools
//!
//! All scraping of unstructured tool output lives here:
//! - metric lines: a line containing a literal marker, followed by a
//!   floating-point token (`tps = 1234.5 (without initial connection time)`)
//! - readiness: probe output containing a literal marker
//! - role tables: `patronictl list` rows of the form `| member | host | Leader | ...`
//! - container listings: one name per line

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults::{LATENCY_MARKER, READINESS_MARKER, THROUGHPUT_MARKER};

/// Parse the first token after `marker` on the last line containing it.
///
/// Returns `None` when no line carries the marker or the token is not a
/// float; parse failures are never propagated.
pub fn parse_metric(output: &str, marker: &str) -> Option<f64> {
    let mut value = None;
    for line in output.lines() {
        if let Some(idx) = line.find(marker) {
            let rest = &line[idx + marker.len()..];
            value = rest
                .split_whitespace()
                .next()
                .and_then(|token| token.parse::<f64>().ok())
                .filter(|v| v.is_finite());
        }
    }
    value
}

/// Metrics scraped from one benchmark run
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Transactions per second
    pub tps: Option<f64>,
    /// Average latency in milliseconds
    pub latency_ms: Option<f64>,
}

impl BenchmarkReport {
    /// Parse pgbench output
    pub fn parse(output: &str) -> Self {
        Self {
            tps: parse_metric(output, THROUGHPUT_MARKER),
            latency_ms: parse_metric(output, LATENCY_MARKER),
        }
    }

    /// Throughput if it is a usable signal (strictly positive)
    pub fn usable_tps(&self) -> Option<f64> {
        self.tps.filter(|tps| *tps > 0.0)
    }
}

/// Whether probe output carries the readiness marker
pub fn is_ready(output: &str) -> bool {
    output.contains(READINESS_MARKER)
}

/// Whether the role table has a row for `member` marked as leader
pub fn is_leader_row(table: &str, member: &str) -> bool {
    let pattern = format!(r"\|\s*{}\s*\|.*Leader", regex::escape(member));
    match Regex::new(&pattern) {
        Ok(re) => table.lines().any(|line| re.is_match(line)),
        Err(_) => false,
    }
}

/// Container names from a `docker ps --format {{.Names}}` listing that start with `prefix`
pub fn container_names(listing: &str, prefix: &str) -> Vec<String> {
    listing
        .lines()
        .map(str::trim)
        .filter(|name| !name.is_empty() && name.starts_with(prefix))
        .map(String::from)
        .collect()
}
