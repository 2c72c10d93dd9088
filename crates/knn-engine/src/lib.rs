//! # knn-engine
//!
//! In-process nearest-neighbour engine behind a four-call contract:
//! construct a handle for a method and space, bulk-load vectors and build,
//! set query parameters and batch query, save and load.
//!
//! ## Methods
//!
//! - **brute_force** / **seq_search**: exact scan (seq_search can split one
//!   query across threads)
//! - **simple_invindex**: posting lists, sparse negative dot product only
//! - **hnsw**: Hierarchical Navigable Small World graph
//! - **sw-graph**: single-layer small world graph
//! - **vptree**: vantage-point tree with tunable pruning
//! - **napp**: pivot-based neighbourhood approximation
//!
//! ## Example
//!
//! ```rust,ignore
//! use knn_engine::{BackendEngine, DataLayout, Dataset, NativeEngine, ParamMap};
//!
//! let mut handle = NativeEngine.construct("hnsw", "cosinesimil", DataLayout::Dense)?;
//! handle.bulk_load(&Dataset::Dense(vectors))?;
//! handle.build(&[("M", 16usize), ("efConstruction", 200)].into_iter().collect())?;
//! handle.set_query_params(&[("efSearch", 64usize)].into_iter().collect())?;
//! let neighbours = handle.batch_query(&Dataset::Dense(queries), 10, 4)?;
//! ```

pub mod backend;
pub mod data;
pub mod distance;
pub mod engine;
pub mod index;
pub mod params;
pub mod simd;
mod storage;

use std::path::PathBuf;

pub use backend::{BackendEngine, IndexHandle, Neighbors};
pub use data::{DataLayout, Dataset};
pub use distance::Space;
pub use engine::{NativeEngine, NativeHandle};
pub use index::Method;
pub use params::{ParamMap, ParamValue};

/// Error types for engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unknown method '{name}', expected one of: {}", valid.join(", "))]
    UnknownMethod { name: String, valid: Vec<&'static str> },

    #[error("Unknown space '{0}'")]
    UnknownSpace(String),

    #[error("Unsupported space '{space}': {reason}")]
    UnsupportedSpace { space: String, reason: String },

    #[error("Unknown parameter '{key}' for method {method}")]
    UnknownParameter { method: String, key: String },

    #[error("Invalid value for parameter '{key}': {reason}")]
    InvalidParameter { key: String, reason: String },

    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Layout mismatch: index holds {expected} data, got {got}")]
    LayoutMismatch { expected: DataLayout, got: DataLayout },

    #[error("Index holds no vectors")]
    EmptyIndex,

    #[error("Index has not been built")]
    NotBuilt,

    #[error("Saved index does not fit this handle: {0}")]
    IncompatibleIndex(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
