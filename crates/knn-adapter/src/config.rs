//! Adapter configuration.
//!
//! ## Environment Variables
//!
//! - `KNN_NEIGHBORS`: neighbours per query (default: 5)
//! - `KNN_SPACE`: space identifier (default: `l2`)
//! - `KNN_JOBS`: worker count; 0 or negative counts back from all cores
//!   (default: 1)

use serde::Deserialize;

const DEFAULT_NEIGHBORS: usize = 5;
const DEFAULT_SPACE: &str = "l2";
const DEFAULT_JOBS: i64 = 1;

/// Settings shared by every backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Neighbours returned when a query does not ask for a count.
    pub n_neighbors: usize,
    /// Space identifier, e.g. `cosinesimil` or `lp:p=3`.
    pub space: String,
    /// Signed worker count; see [`resolve_jobs`](crate::resolve_jobs).
    pub n_jobs: i64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            n_neighbors: DEFAULT_NEIGHBORS,
            space: DEFAULT_SPACE.to_string(),
            n_jobs: DEFAULT_JOBS,
        }
    }
}

impl AdapterConfig {
    pub fn new(n_neighbors: usize, space: impl Into<String>, n_jobs: i64) -> Self {
        Self {
            n_neighbors,
            space: space.into(),
            n_jobs,
        }
    }

    /// Read settings from the environment, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let n_neighbors: usize = lookup("KNN_NEIGHBORS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_NEIGHBORS);

        let space = lookup("KNN_SPACE")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_SPACE.to_string());

        let n_jobs: i64 = lookup("KNN_JOBS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_JOBS);

        Self {
            n_neighbors,
            space,
            n_jobs,
        }
    }

    pub fn with_space(mut self, space: impl Into<String>) -> Self {
        self.space = space.into();
        self
    }

    pub fn with_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn with_jobs(mut self, n_jobs: i64) -> Self {
        self.n_jobs = n_jobs;
        self
    }
}
