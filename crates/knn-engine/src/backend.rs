//! The four-call engine contract: construct, bulk-load + build, set query
//! parameters + batch query, save/load.
//!
//! The adapter layer only ever talks to these traits, so any engine that
//! implements them can stand in for the bundled [`NativeEngine`].
//!
//! [`NativeEngine`]: crate::NativeEngine

use std::path::Path;

use crate::data::{DataLayout, Dataset};
use crate::params::ParamMap;
use crate::Result;

/// Neighbours of one query point, ascending by distance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Neighbors {
    /// Row positions within the loaded dataset.
    pub indices: Vec<usize>,
    pub distances: Vec<f32>,
}

impl Neighbors {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Factory for index handles.
pub trait BackendEngine: Send + Sync {
    /// Create an empty handle. Fails if the method or the space string is
    /// unknown to the engine, or the method cannot run on that space.
    fn construct(
        &self,
        method: &str,
        space: &str,
        layout: DataLayout,
    ) -> Result<Box<dyn IndexHandle>>;
}

/// One index owned by one adapter.
pub trait IndexHandle: Send + Sync {
    fn method(&self) -> &str;

    fn space(&self) -> &str;

    fn layout(&self) -> DataLayout;

    /// Number of loaded vectors.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append vectors. Fails on layout or dimensionality mismatch.
    fn bulk_load(&mut self, data: &Dataset) -> Result<()>;

    /// Build the index over everything loaded so far.
    fn build(&mut self, params: &ParamMap) -> Result<()>;

    /// Replace the query-time parameters used by later queries.
    fn set_query_params(&self, params: &ParamMap) -> Result<()>;

    /// k nearest neighbours for every query row, using up to `threads`
    /// workers.
    fn batch_query(&self, queries: &Dataset, k: usize, threads: usize) -> Result<Vec<Neighbors>>;

    fn save(&self, path: &Path, persist_data: bool) -> Result<()>;

    /// Replace this handle's index with one read from `path`. Without
    /// `persist_data` the vectors must already be bulk-loaded.
    fn load(&mut self, path: &Path, persist_data: bool) -> Result<()>;
}
