//! The fit / query / persist lifecycle shared by every backend.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use knn_engine::{
    BackendEngine, DataLayout, Dataset, IndexHandle, NativeEngine, Neighbors, ParamMap,
};
use ndarray::Array2;
use sprs::{CsMat, TriMat};

use crate::catalogue::Backend;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, Result};
use crate::jobs::{available_parallelism, resolve_jobs};
use crate::space::{SpaceIdentifier, SpaceResolver};
use crate::surface::{ParameterSurface, QueryOptions};

/// Neighbour tables, one row per query point.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub distances: Array2<f32>,
    /// Row positions within the fitted dataset.
    pub indices: Array2<usize>,
}

impl QueryResult {
    pub fn rows(&self) -> usize {
        self.indices.nrows()
    }

    /// Neighbours per row.
    pub fn k(&self) -> usize {
        self.indices.ncols()
    }
}

/// Output mode of [`IndexAdapter::query_as_adjacency`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphMode {
    /// 1 for every neighbour edge.
    Connectivity,
    /// Distance-weighted edges. Not supported.
    Distance,
}

impl fmt::Display for GraphMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphMode::Connectivity => write!(f, "connectivity"),
            GraphMode::Distance => write!(f, "distance"),
        }
    }
}

impl FromStr for GraphMode {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "connectivity" => Ok(GraphMode::Connectivity),
            "distance" => Ok(GraphMode::Distance),
            other => Err(AdapterError::UnsupportedOperation(format!(
                "unknown adjacency mode '{other}'"
            ))),
        }
    }
}

/// State pinned by a successful fit or load.
struct Fitted {
    layout: DataLayout,
    space: SpaceIdentifier,
    handle: Box<dyn IndexHandle>,
    /// Source data, when the adapter holds it.
    data: Option<Dataset>,
}

/// One index over one backend.
///
/// The adapter is unfitted until [`fit`](Self::fit) (or a query with data,
/// or [`load`](Self::load)) pins a layout and a resolved space. Refitting
/// replaces everything pinned before.
pub struct IndexAdapter {
    backend: Backend,
    surface: ParameterSurface,
    n_neighbors: usize,
    space: SpaceIdentifier,
    jobs: usize,
    resolver: SpaceResolver<'static>,
    engine: Arc<dyn BackendEngine>,
    state: Option<Fitted>,
}

impl fmt::Debug for IndexAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexAdapter")
            .field("method", &self.surface.method_name())
            .field("space", &self.space.to_string())
            .field("n_neighbors", &self.n_neighbors)
            .field("jobs", &self.jobs)
            .field("layout", &self.resolved_layout())
            .finish()
    }
}

impl IndexAdapter {
    /// Adapter over the bundled [`NativeEngine`].
    pub fn new(backend: Backend, config: &AdapterConfig) -> Result<Self> {
        Self::with_engine(backend, config, Arc::new(NativeEngine))
    }

    /// Adapter for a method name with default tunables.
    pub fn from_method(method: &str, config: &AdapterConfig) -> Result<Self> {
        Self::new(method.parse()?, config)
    }

    /// Adapter over any engine. The space string is parsed and validated
    /// here, so a bad space never reaches `fit`.
    pub fn with_engine(
        backend: Backend,
        config: &AdapterConfig,
        engine: Arc<dyn BackendEngine>,
    ) -> Result<Self> {
        let resolver = SpaceResolver::standard();
        let space = resolver.parse_valid(&config.space)?;
        let jobs = resolve_jobs(config.n_jobs, available_parallelism());
        let surface = backend.surface(jobs);

        tracing::debug!(
            method = surface.method_name(),
            n_neighbors = config.n_neighbors,
            space = %space,
            n_jobs = jobs,
            "Init index"
        );

        Ok(Self {
            backend,
            surface,
            n_neighbors: config.n_neighbors,
            space,
            jobs,
            resolver,
            engine,
            state: None,
        })
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn surface(&self) -> &ParameterSurface {
        &self.surface
    }

    pub fn method_name(&self) -> &'static str {
        self.surface.method_name()
    }

    /// The space as configured, before any layout coercion.
    pub fn space(&self) -> &SpaceIdentifier {
        &self.space
    }

    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    /// Resolved worker count.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    pub fn resolved_layout(&self) -> Option<DataLayout> {
        self.state.as_ref().map(|s| s.layout)
    }

    pub fn resolved_space(&self) -> Option<&SpaceIdentifier> {
        self.state.as_ref().map(|s| &s.space)
    }

    /// The fitted dataset, in the pinned layout.
    pub fn data(&self) -> Option<&Dataset> {
        self.state.as_ref().and_then(|s| s.data.as_ref())
    }

    /// Number of indexed points.
    pub fn len(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.handle.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Build the index over `data`.
    ///
    /// The layout is sparse when the data is sparse or the configured space
    /// is a sparse one; the data is converted to that layout and the space
    /// coerced to match.
    pub fn fit(&mut self, data: impl Into<Dataset>) -> Result<&mut Self> {
        let data = data.into();
        let layout = self.resolver.infer_layout(&self.space, data.layout());
        let data = data.into_layout(layout);
        tracing::debug!(
            method = self.method_name(),
            layout = %layout,
            rows = data.rows(),
            cols = data.cols(),
            "Building index"
        );

        let space = self.resolver.resolve_for_layout(&self.space, layout, true)?.space;
        let init = self.surface.init_params();
        tracing::debug!(space = %space, layout = %layout, params = %init, "Index arguments");

        let mut handle = self.engine.construct(self.method_name(), &space.to_string(), layout)?;
        handle.bulk_load(&data)?;
        handle.build(&init)?;

        self.state = Some(Fitted {
            layout,
            space,
            handle,
            data: Some(data),
        });
        Ok(self)
    }

    /// k nearest neighbours for every row of `data`, or of the fitted data
    /// when `data` is `None`.
    ///
    /// An unfitted adapter fits on `data` first. A fitted one converts
    /// `data` to the pinned layout and requires the configured space to be
    /// valid for it as is; no coercion happens at query time.
    pub fn query(&mut self, data: Option<&Dataset>, options: &QueryOptions) -> Result<QueryResult> {
        let params = self.surface.query_params(options.overrides())?;
        let k = options.k.unwrap_or(self.n_neighbors);

        let data = match data {
            Some(d) if !self.is_fitted() => {
                self.fit(d.clone())?;
                None
            }
            other => other,
        };
        self.query_fitted(data, k, &params)
    }

    fn query_fitted(
        &self,
        data: Option<&Dataset>,
        k: usize,
        params: &ParamMap,
    ) -> Result<QueryResult> {
        let state = self.state.as_ref().ok_or(AdapterError::NotFitted)?;

        let queries: Cow<'_, Dataset> = match data {
            None => Cow::Borrowed(
                state
                    .data
                    .as_ref()
                    .ok_or(AdapterError::MissingData("querying without data"))?,
            ),
            Some(d) => {
                let converted = if d.layout() == state.layout {
                    Cow::Borrowed(d)
                } else {
                    Cow::Owned(d.clone().into_layout(state.layout))
                };
                self.resolver
                    .resolve_for_layout(&self.space, state.layout, false)
                    .map_err(|source| AdapterError::IncompatibleState {
                        layout: state.layout,
                        source,
                    })?;
                converted
            }
        };

        tracing::debug!(
            method = self.method_name(),
            rows = queries.rows(),
            k,
            params = %params,
            "Querying index"
        );
        state.handle.set_query_params(params)?;
        let neighbors = state.handle.batch_query(&queries, k, self.jobs)?;
        let result = stack(&neighbors, k)?;
        tracing::debug!(rows = result.rows(), k = result.k(), "Complete");
        Ok(result)
    }

    /// Neighbour graph as an `n x n` sparse matrix over the fitted data,
    /// with a 1 at `(row, neighbour)` for every neighbour.
    ///
    /// Supplied data that differs from the fitted data is fitted first.
    /// Only [`GraphMode::Connectivity`] is supported.
    pub fn query_as_adjacency(
        &mut self,
        data: Option<&Dataset>,
        options: &QueryOptions,
        mode: GraphMode,
    ) -> Result<CsMat<f32>> {
        if mode != GraphMode::Connectivity {
            return Err(AdapterError::UnsupportedOperation(format!(
                "adjacency mode '{mode}', only 'connectivity' is supported"
            )));
        }
        let params = self.surface.query_params(options.overrides())?;
        let k = options.k.unwrap_or(self.n_neighbors);

        if let Some(d) = data {
            if self.data() != Some(d) {
                self.fit(d.clone())?;
            }
        }

        let result = self.query_fitted(None, k, &params)?;
        let n = self.len();
        let mut triplets = TriMat::with_capacity((result.rows(), n), result.indices.len());
        for ((row, _), &col) in result.indices.indexed_iter() {
            triplets.add_triplet(row, col, 1.0f32);
        }
        Ok(triplets.to_csr())
    }

    /// Write the index to `path`, with the vectors when `persist_data` is
    /// set.
    pub fn save(&self, path: impl AsRef<Path>, persist_data: bool) -> Result<()> {
        let path = path.as_ref();
        let state = self.state.as_ref().ok_or(AdapterError::NotFitted)?;
        state.handle.save(path, persist_data)?;
        tracing::info!(
            method = self.method_name(),
            path = %path.display(),
            persist_data,
            "Saved index"
        );
        Ok(())
    }

    /// Read an index written by [`save`](Self::save).
    ///
    /// The layout is `layout` if given, else the one pinned by an earlier
    /// fit; a saved file alone does not record it. Without `load_data` the
    /// adapter must still hold the source data, which is loaded into the
    /// new handle first.
    pub fn load(
        &mut self,
        path: impl AsRef<Path>,
        load_data: bool,
        layout: Option<DataLayout>,
    ) -> Result<&mut Self> {
        let path = path.as_ref();
        let layout = layout
            .or_else(|| self.resolved_layout())
            .ok_or(AdapterError::MissingLayout)?;
        let space = self.resolver.resolve_for_layout(&self.space, layout, true)?.space;

        let mut handle = self.engine.construct(self.method_name(), &space.to_string(), layout)?;
        if !load_data {
            let held = self
                .data()
                .ok_or(AdapterError::MissingData("loading an index saved without data"))?;
            let held = if held.layout() == layout {
                Cow::Borrowed(held)
            } else {
                Cow::Owned(held.clone().into_layout(layout))
            };
            handle.bulk_load(&held)?;
        }
        handle.load(path, load_data)?;

        let data = self
            .state
            .take()
            .and_then(|s| s.data)
            .map(|d| d.into_layout(layout));
        tracing::info!(
            method = self.method_name(),
            path = %path.display(),
            space = %space,
            layout = %layout,
            points = handle.len(),
            "Loaded index"
        );
        self.state = Some(Fitted {
            layout,
            space,
            handle,
            data,
        });
        Ok(self)
    }
}

/// Stack per-query results into tables. Every row must have the width of the
/// first; a ragged batch fails as a whole.
fn stack(neighbors: &[Neighbors], k: usize) -> Result<QueryResult> {
    let rows = neighbors.len();
    let width = neighbors.first().map_or(k, Neighbors::len);

    let mut distances = Array2::<f32>::zeros((rows, width));
    let mut indices = Array2::<usize>::zeros((rows, width));
    for (row, found) in neighbors.iter().enumerate() {
        if found.indices.len() != width || found.distances.len() != width {
            return Err(AdapterError::Convergence {
                row,
                expected: width,
                got: found.indices.len().min(found.distances.len()),
            });
        }
        for (col, (&index, &distance)) in found.indices.iter().zip(&found.distances).enumerate() {
            indices[[row, col]] = index;
            distances[[row, col]] = distance;
        }
    }
    Ok(QueryResult { distances, indices })
}

#[cfg(test)]
mod tests {
    use super::*;
    use knn_engine::EngineError;
    use ndarray::array;
    use parking_lot::Mutex;

    fn points() -> Dataset {
        Dataset::Dense(array![
            [0.0f32, 0.0],
            [1.0, 0.0],
            [0.0, 1.0],
            [1.0, 1.0],
            [5.0, 5.0],
            [6.0, 5.0]
        ])
    }

    fn adapter(method: &str, space: &str) -> IndexAdapter {
        IndexAdapter::from_method(method, &AdapterConfig::new(3, space, 1)).unwrap()
    }

    /// Engine whose handles record parameters and can return ragged rows.
    #[derive(Default)]
    struct StubEngine {
        log: Arc<Mutex<Vec<String>>>,
        ragged: bool,
    }

    struct StubHandle {
        log: Arc<Mutex<Vec<String>>>,
        ragged: bool,
        layout: DataLayout,
        rows: usize,
    }

    impl BackendEngine for StubEngine {
        fn construct(
            &self,
            method: &str,
            space: &str,
            layout: DataLayout,
        ) -> knn_engine::Result<Box<dyn IndexHandle>> {
            self.log.lock().push(format!("construct {method} {space} {layout}"));
            Ok(Box::new(StubHandle {
                log: Arc::clone(&self.log),
                ragged: self.ragged,
                layout,
                rows: 0,
            }))
        }
    }

    impl IndexHandle for StubHandle {
        fn method(&self) -> &str {
            "stub"
        }

        fn space(&self) -> &str {
            "stub"
        }

        fn layout(&self) -> DataLayout {
            self.layout
        }

        fn len(&self) -> usize {
            self.rows
        }

        fn bulk_load(&mut self, data: &Dataset) -> knn_engine::Result<()> {
            self.rows += data.rows();
            Ok(())
        }

        fn build(&mut self, params: &ParamMap) -> knn_engine::Result<()> {
            self.log.lock().push(format!("build {params}"));
            Ok(())
        }

        fn set_query_params(&self, params: &ParamMap) -> knn_engine::Result<()> {
            self.log.lock().push(format!("query {params}"));
            Ok(())
        }

        fn batch_query(
            &self,
            queries: &Dataset,
            k: usize,
            _threads: usize,
        ) -> knn_engine::Result<Vec<Neighbors>> {
            Ok((0..queries.rows())
                .map(|row| {
                    let width = if self.ragged && row == 1 { k - 1 } else { k };
                    Neighbors {
                        indices: (0..width).collect(),
                        distances: vec![0.0; width],
                    }
                })
                .collect())
        }

        fn save(&self, _path: &Path, _persist_data: bool) -> knn_engine::Result<()> {
            Ok(())
        }

        fn load(&mut self, _path: &Path, _persist_data: bool) -> knn_engine::Result<()> {
            Err(EngineError::NotBuilt)
        }
    }

    #[test]
    fn test_invalid_space_fails_at_construction() {
        let config = AdapterConfig::new(3, "lp:p=2:q=1", 1);
        let err = IndexAdapter::new(Backend::BruteForce, &config).unwrap_err();
        assert!(err.is_configuration());
        let config = AdapterConfig::new(3, "euclidean", 1);
        assert!(IndexAdapter::new(Backend::BruteForce, &config).is_err());
    }

    #[test]
    fn test_query_without_fit_or_data_is_not_fitted() {
        let mut index = adapter("brute_force", "l2");
        assert!(matches!(
            index.query(None, &QueryOptions::new()),
            Err(AdapterError::NotFitted)
        ));
        assert!(matches!(index.save("unused.json", true), Err(AdapterError::NotFitted)));
    }

    #[test]
    fn test_query_with_data_fits_lazily() {
        let mut index = adapter("brute_force", "l2");
        let result = index.query(Some(&points()), &QueryOptions::new()).unwrap();
        assert!(index.is_fitted());
        assert_eq!(result.indices.dim(), (6, 3));
        assert_eq!(result.indices[[4, 0]], 4);
        assert_eq!(result.indices[[4, 1]], 5);
    }

    #[test]
    fn test_fit_pins_layout_and_space() {
        let mut index = adapter("hnsw", "cosinesimil");
        assert!(index.resolved_layout().is_none());
        index.fit(points()).unwrap();
        assert_eq!(index.resolved_layout(), Some(DataLayout::Dense));
        assert_eq!(index.resolved_space().unwrap().to_string(), "cosinesimil");
        assert_eq!(index.len(), 6);
    }

    #[test]
    fn test_sparse_space_forces_sparse_layout() {
        let mut index = adapter("brute_force", "l2_sparse");
        index.fit(points()).unwrap();
        assert_eq!(index.resolved_layout(), Some(DataLayout::Sparse));
        assert!(index.data().unwrap().is_sparse());

        // Dense queries are converted to the pinned layout.
        let queries = Dataset::Dense(array![[5.0f32, 5.0]]);
        let result = index.query(Some(&queries), &QueryOptions::with_k(1)).unwrap();
        assert_eq!(result.indices[[0, 0]], 4);
    }

    #[test]
    fn test_query_after_coerced_fit_is_incompatible() {
        let mut index = adapter("brute_force", "l2");
        let sparse = points().into_layout(DataLayout::Sparse);
        index.fit(sparse.clone()).unwrap();
        assert_eq!(index.resolved_space().unwrap().to_string(), "l2_sparse");

        assert!(index.query(None, &QueryOptions::new()).is_ok());
        assert!(matches!(
            index.query(Some(&sparse), &QueryOptions::new()),
            Err(AdapterError::IncompatibleState { .. })
        ));
    }

    #[test]
    fn test_query_override_validation() {
        let mut index = adapter("vptree", "l2");
        index.fit(points()).unwrap();
        let ok = QueryOptions::new().alpha_left(1.0).max_leaves_to_visit(10);
        assert!(index.query(None, &ok).is_ok());

        let bad = QueryOptions::new().ef_search(10);
        assert!(matches!(
            index.query(None, &bad),
            Err(AdapterError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_only_set_parameters_reach_engine() {
        let engine = StubEngine::default();
        let log = Arc::clone(&engine.log);
        let config = AdapterConfig::new(2, "l2", 2);
        let backend = Backend::VpTree(Default::default());
        let mut index = IndexAdapter::with_engine(backend, &config, Arc::new(engine)).unwrap();

        index.fit(points()).unwrap();
        index.query(None, &QueryOptions::new().alpha_right(2.0)).unwrap();
        index.query(None, &QueryOptions::new()).unwrap();

        let log = log.lock();
        assert_eq!(
            *log,
            vec![
                "construct vptree l2 dense".to_string(),
                "build ".to_string(),
                "query alphaRight=2".to_string(),
                "query ".to_string(),
            ]
        );
    }

    #[test]
    fn test_ragged_results_fail_the_batch() {
        let engine = StubEngine {
            ragged: true,
            ..Default::default()
        };
        let config = AdapterConfig::default();
        let mut index =
            IndexAdapter::with_engine(Backend::BruteForce, &config, Arc::new(engine)).unwrap();
        index.fit(points()).unwrap();
        assert!(matches!(
            index.query(None, &QueryOptions::new()),
            Err(AdapterError::Convergence { row: 1, expected: 5, got: 4 })
        ));
    }

    #[test]
    fn test_adjacency_rejects_other_modes() {
        let mut index = adapter("brute_force", "l2");
        assert!(matches!(
            index.query_as_adjacency(Some(&points()), &QueryOptions::new(), GraphMode::Distance),
            Err(AdapterError::UnsupportedOperation(_))
        ));
        assert!(!index.is_fitted());
        assert!(matches!(
            "weights".parse::<GraphMode>(),
            Err(AdapterError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_load_needs_a_layout() {
        let mut index = adapter("brute_force", "l2");
        assert!(matches!(
            index.load("missing.json", true, None),
            Err(AdapterError::MissingLayout)
        ));
        assert!(matches!(
            index.load("missing.json", false, Some(DataLayout::Dense)),
            Err(AdapterError::MissingData(_))
        ));
    }

    #[test]
    fn test_stack_accepts_uniform_rows() {
        let rows = vec![
            Neighbors {
                indices: vec![0, 1],
                distances: vec![0.0, 1.0],
            },
            Neighbors {
                indices: vec![1, 0],
                distances: vec![0.0, 1.0],
            },
        ];
        let result = stack(&rows, 5).unwrap();
        assert_eq!(result.k(), 2);
        assert_eq!(result.indices, array![[0, 1], [1, 0]]);
        assert_eq!(stack(&[], 4).unwrap().indices.dim(), (0, 4));
    }
}
