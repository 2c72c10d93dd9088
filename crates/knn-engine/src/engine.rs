//! The bundled in-process engine.

use std::path::Path;

use parking_lot::RwLock;
use rayon::prelude::*;

use crate::backend::{BackendEngine, IndexHandle, Neighbors};
use crate::data::{DataLayout, Dataset, Points};
use crate::distance::Space;
use crate::index::{thread_pool, Corpus, Method, SearchParams, Structure};
use crate::params::ParamMap;
use crate::storage::{self, SavedIndex, SavedIndexRef};
use crate::{EngineError, Result};

/// Engine backed by the index methods in [`crate::index`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeEngine;

impl BackendEngine for NativeEngine {
    fn construct(
        &self,
        method: &str,
        space: &str,
        layout: DataLayout,
    ) -> Result<Box<dyn IndexHandle>> {
        let method: Method = method.parse()?;
        let space = Space::parse(space, layout)?;
        method.check_space(&space)?;
        Ok(Box::new(NativeHandle::new(method, space)))
    }
}

/// Index handle produced by [`NativeEngine`].
#[derive(Debug)]
pub struct NativeHandle {
    method: Method,
    space: Space,
    points: Points,
    build_params: ParamMap,
    structure: Option<Structure>,
    search: RwLock<SearchParams>,
}

impl NativeHandle {
    pub fn new(method: Method, space: Space) -> Self {
        let points = Points::empty(space.layout());
        Self {
            method,
            space,
            points,
            build_params: ParamMap::new(),
            structure: None,
            search: RwLock::new(SearchParams::default()),
        }
    }

    fn check_layout(&self, layout: DataLayout) -> Result<()> {
        if layout != self.space.layout() {
            return Err(EngineError::LayoutMismatch {
                expected: self.space.layout(),
                got: layout,
            });
        }
        Ok(())
    }
}

impl IndexHandle for NativeHandle {
    fn method(&self) -> &str {
        self.method.name()
    }

    fn space(&self) -> &str {
        self.space.name()
    }

    fn layout(&self) -> DataLayout {
        self.space.layout()
    }

    fn len(&self) -> usize {
        self.points.len()
    }

    fn bulk_load(&mut self, data: &Dataset) -> Result<()> {
        self.check_layout(data.layout())?;
        self.points.extend(Points::from_dataset(data))?;
        // New rows invalidate whatever was built before.
        self.structure = None;
        Ok(())
    }

    fn build(&mut self, params: &ParamMap) -> Result<()> {
        let corpus = Corpus::new(&self.points, &self.space);
        let structure = Structure::build(self.method, corpus, params)?;
        tracing::debug!(
            method = %self.method,
            space = %self.space,
            points = self.points.len(),
            params = %params,
            "Index built"
        );
        self.structure = Some(structure);
        self.build_params = params.clone();
        Ok(())
    }

    fn set_query_params(&self, params: &ParamMap) -> Result<()> {
        let parsed = SearchParams::from_params(self.method, params)?;
        *self.search.write() = parsed;
        Ok(())
    }

    fn batch_query(&self, queries: &Dataset, k: usize, threads: usize) -> Result<Vec<Neighbors>> {
        self.check_layout(queries.layout())?;
        let structure = self.structure.as_ref().ok_or(EngineError::NotBuilt)?;
        if self.points.is_empty() {
            return Err(EngineError::EmptyIndex);
        }

        let queries = Points::from_dataset(queries);
        self.points.check_compatible(&queries)?;

        let corpus = Corpus::new(&self.points, &self.space);
        let search = self.search.read().clone();
        let pool = thread_pool(threads)?;

        let results = pool.install(|| {
            (0..queries.len())
                .into_par_iter()
                .map(|q| {
                    let found = structure.search(corpus, queries.get(q), k, &search);
                    Neighbors {
                        indices: found.iter().map(|c| c.index).collect(),
                        distances: found.iter().map(|c| c.distance).collect(),
                    }
                })
                .collect()
        });
        Ok(results)
    }

    fn save(&self, path: &Path, persist_data: bool) -> Result<()> {
        let structure = self.structure.as_ref().ok_or(EngineError::NotBuilt)?;
        let saved = SavedIndexRef {
            version: storage::FORMAT_VERSION,
            method: self.method,
            space: self.space.name(),
            layout: self.space.layout(),
            len: self.points.len(),
            params: &self.build_params,
            structure,
            points: persist_data.then_some(&self.points),
        };
        storage::write(path, &saved)
    }

    fn load(&mut self, path: &Path, persist_data: bool) -> Result<()> {
        let saved: SavedIndex = storage::read(path)?;
        saved.check_matches(self.method, &self.space)?;

        if persist_data {
            let points = saved.points.ok_or_else(|| {
                EngineError::IncompatibleIndex(format!(
                    "{} was saved without its data",
                    path.display()
                ))
            })?;
            if points.len() != saved.len {
                return Err(EngineError::IncompatibleIndex(format!(
                    "saved index covers {} points but carries {}",
                    saved.len,
                    points.len()
                )));
            }
            self.points = points;
        } else if self.points.len() != saved.len {
            return Err(EngineError::IncompatibleIndex(format!(
                "saved index covers {} points but {} are loaded",
                saved.len,
                self.points.len()
            )));
        }

        self.build_params = saved.params;
        self.structure = Some(saved.structure);
        Ok(())
    }
}
