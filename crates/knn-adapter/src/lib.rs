//! # knn-adapter
//!
//! One fit / query / save / load lifecycle over seven nearest-neighbour
//! backends, with validation and dense/sparse coercion of distance spaces.
//!
//! ## Backends
//!
//! | Backend | Method | Query tunables |
//! |---|---|---|
//! | [`Backend::BruteForce`] | `brute_force` | |
//! | [`Backend::SimpleInvIndex`] | `simple_invindex` | |
//! | [`Backend::Hnsw`] | `hnsw` | `efSearch` |
//! | [`Backend::SwGraph`] | `sw-graph` | `efSearch` |
//! | [`Backend::VpTree`] | `vptree` | `alphaLeft`, `alphaRight`, `maxLeavesToVisit` |
//! | [`Backend::Napp`] | `napp` | `numPivotSearch` |
//! | [`Backend::SeqSearch`] | `seq_search` | |
//!
//! ## Example
//!
//! ```rust,ignore
//! use knn_adapter::{AdapterConfig, Backend, HnswParams, IndexAdapter, QueryOptions};
//!
//! let config = AdapterConfig::new(10, "cosinesimil", -1);
//! let mut index = IndexAdapter::new(Backend::Hnsw(HnswParams::high_accuracy()), &config)?;
//! index.fit(vectors)?;
//!
//! let result = index.query(Some(&queries.into()), &QueryOptions::new().ef_search(100))?;
//! println!("nearest to the first query: {}", result.indices[[0, 0]]);
//!
//! index.save("vectors.index", true)?;
//! ```

pub mod adapter;
pub mod catalogue;
pub mod config;
pub mod error;
pub mod jobs;
pub mod space;
pub mod surface;

pub use adapter::{GraphMode, IndexAdapter, QueryResult};
pub use catalogue::{Backend, HnswParams, NappParams, SwGraphParams, VpTreeParams};
pub use config::AdapterConfig;
pub use error::{AdapterError, Result, SpaceError};
pub use jobs::{available_parallelism, resolve_jobs};
pub use space::{
    CoercionAdvisory, Resolution, SpaceIdentifier, SpaceParameter, SpaceRegistry, SpaceResolver,
};
pub use surface::{ParameterSurface, QueryOptions};

pub use knn_engine::{DataLayout, Dataset};
