//! End-to-end lifecycle tests against the bundled engine.

use knn_adapter::{
    AdapterConfig, AdapterError, Backend, DataLayout, Dataset, GraphMode, HnswParams,
    IndexAdapter, NappParams, QueryOptions, SwGraphParams, VpTreeParams,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sprs::TriMat;

fn random_dense(n: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    Dataset::Dense(Array2::from_shape_fn((n, dim), |_| rng.r#gen::<f32>()))
}

fn random_sparse(n: usize, dim: usize, seed: u64) -> Dataset {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut triplets = TriMat::new((n, dim));
    for row in 0..n {
        // Each row gets a guaranteed feature plus a few random ones.
        triplets.add_triplet(row, row % dim, 1.0f32);
        for _ in 0..3 {
            let col = rng.gen_range(0..dim);
            if col != row % dim {
                triplets.add_triplet(row, col, rng.r#gen::<f32>() + 0.1);
            }
        }
    }
    Dataset::sparse(triplets.to_csr())
}

fn all_backends() -> Vec<Backend> {
    vec![
        Backend::BruteForce,
        Backend::Hnsw(HnswParams::default()),
        Backend::SwGraph(SwGraphParams::default()),
        Backend::VpTree(VpTreeParams::default()),
        Backend::Napp(NappParams::default()),
        Backend::SeqSearch,
    ]
}

#[test]
fn test_fit_then_query_shapes_for_every_backend() {
    let data = random_dense(120, 8, 1);
    for backend in all_backends() {
        let name = backend.method_name();
        let mut index = IndexAdapter::new(backend, &AdapterConfig::new(5, "l2", 2)).unwrap();
        index.fit(data.clone()).unwrap();

        let result = index.query(None, &QueryOptions::new()).unwrap();
        assert_eq!(result.indices.dim(), (120, 5), "{name}");
        assert_eq!(result.distances.dim(), (120, 5), "{name}");
        assert!(result.indices.iter().all(|&i| i < 120), "{name}");
        for row in result.distances.rows() {
            assert!(row.windows(2).into_iter().all(|w| w[0] <= w[1]), "{name}");
        }
    }
}

#[test]
fn test_self_query_finds_self_first() {
    let data = random_dense(200, 6, 2);
    let cases = [
        (Backend::BruteForce, QueryOptions::new()),
        (Backend::Hnsw(HnswParams::default()), QueryOptions::new().ef_search(64)),
        (Backend::VpTree(VpTreeParams::default()), QueryOptions::new()),
    ];
    for (backend, options) in cases {
        let mut index = IndexAdapter::new(backend, &AdapterConfig::new(3, "l2", 1)).unwrap();
        let result = index.query(Some(&data), &options).unwrap();
        for row in 0..200 {
            assert_eq!(result.indices[[row, 0]], row);
            assert_eq!(result.distances[[row, 0]], 0.0);
        }
    }
}

#[test]
fn test_graph_backends_agree_with_brute_force() {
    let data = random_dense(300, 8, 3);
    let queries = random_dense(25, 8, 4);
    let config = AdapterConfig::new(10, "cosinesimil", 1);

    let mut exact = IndexAdapter::new(Backend::BruteForce, &config).unwrap();
    exact.fit(data.clone()).unwrap();
    let expected = exact.query(Some(&queries), &QueryOptions::new()).unwrap();

    let mut hnsw = IndexAdapter::new(Backend::Hnsw(HnswParams::default()), &config).unwrap();
    hnsw.fit(data).unwrap();
    let found = hnsw.query(Some(&queries), &QueryOptions::new().ef_search(100)).unwrap();

    let mut hits = 0;
    for (want, got) in expected.indices.rows().into_iter().zip(found.indices.rows()) {
        hits += got.iter().filter(|i| want.iter().any(|w| w == *i)).count();
    }
    assert!(hits as f32 / 250.0 > 0.9, "recall {hits}/250");
}

#[test]
fn test_k_override_per_query() {
    let data = random_dense(50, 4, 5);
    let mut index = IndexAdapter::new(Backend::BruteForce, &AdapterConfig::default()).unwrap();
    index.fit(data).unwrap();
    assert_eq!(index.query(None, &QueryOptions::new()).unwrap().k(), 5);
    assert_eq!(index.query(None, &QueryOptions::with_k(2)).unwrap().k(), 2);
}

#[test]
fn test_parameterized_space() {
    let data = random_dense(40, 3, 6);
    let mut index =
        IndexAdapter::new(Backend::BruteForce, &AdapterConfig::new(4, "lp:p=3", 1)).unwrap();
    index.fit(data).unwrap();
    assert_eq!(index.resolved_space().unwrap().to_string(), "lp:p=3");
    assert_eq!(index.query(None, &QueryOptions::new()).unwrap().indices.dim(), (40, 4));
}

#[test]
fn test_sparse_data_coerces_space() {
    let data = random_sparse(80, 20, 7);
    let config = AdapterConfig::new(3, "cosinesimil", 1);
    let mut index = IndexAdapter::new(Backend::Hnsw(HnswParams::fast()), &config).unwrap();
    index.fit(data).unwrap();
    assert_eq!(index.resolved_layout(), Some(DataLayout::Sparse));
    assert_eq!(index.resolved_space().unwrap().to_string(), "cosinesimil_sparse");
    assert_eq!(index.query(None, &QueryOptions::new()).unwrap().indices.dim(), (80, 3));
}

#[test]
fn test_fit_on_column_major_sparse_keeps_rows() {
    let mut triplets = TriMat::new((5, 3));
    for row in 0..5 {
        triplets.add_triplet(row, row % 3, 1.0f32 + row as f32);
    }
    let mut index =
        IndexAdapter::new(Backend::BruteForce, &AdapterConfig::new(2, "l2_sparse", 1)).unwrap();
    index.fit(Dataset::Sparse(triplets.to_csc())).unwrap();

    assert_eq!(index.len(), 5);
    let result = index.query(None, &QueryOptions::new()).unwrap();
    assert_eq!(result.indices.dim(), (5, 2));
    for row in 0..5 {
        assert_eq!(result.indices[[row, 0]], row);
    }
}

#[test]
fn test_simple_invindex_on_sparse_negdot() {
    let data = random_sparse(60, 30, 8);
    let config = AdapterConfig::new(5, "negdotprod_sparse_fast", 1);
    let mut inverted = IndexAdapter::new(Backend::SimpleInvIndex, &config).unwrap();
    let mut exact = IndexAdapter::new(Backend::BruteForce, &config).unwrap();
    inverted.fit(data.clone()).unwrap();
    exact.fit(data).unwrap();

    let a = inverted.query(None, &QueryOptions::new()).unwrap();
    let b = exact.query(None, &QueryOptions::new()).unwrap();
    for (x, y) in a.distances.iter().zip(b.distances.iter()) {
        assert!((x - y).abs() < 1e-5);
    }
}

#[test]
fn test_simple_invindex_rejects_dense_space() {
    let mut index =
        IndexAdapter::new(Backend::SimpleInvIndex, &AdapterConfig::new(5, "l2", 1)).unwrap();
    let err = index.fit(random_dense(10, 3, 9)).unwrap_err();
    assert!(err.is_configuration());
    assert!(!index.is_fitted());
}

#[test]
fn test_string_space_is_unsupported_by_engine() {
    let mut index =
        IndexAdapter::new(Backend::BruteForce, &AdapterConfig::new(5, "leven", 1)).unwrap();
    assert!(matches!(
        index.fit(random_dense(10, 3, 10)),
        Err(AdapterError::Engine(_))
    ));
}

#[test]
fn test_adjacency_over_fitted_data() {
    let data = random_dense(30, 4, 11);
    let mut index =
        IndexAdapter::new(Backend::BruteForce, &AdapterConfig::new(4, "l1", 1)).unwrap();

    let graph = index
        .query_as_adjacency(Some(&data), &QueryOptions::new(), GraphMode::Connectivity)
        .unwrap();
    assert!(index.is_fitted());
    assert_eq!(graph.shape(), (30, 30));
    assert_eq!(graph.nnz(), 30 * 4);
    for row in graph.outer_iterator() {
        assert_eq!(row.nnz(), 4);
        assert!(row.iter().all(|(_, &v)| v == 1.0));
    }

    // Same data again does not refit; new data does.
    let again =
        index.query_as_adjacency(None, &QueryOptions::with_k(2), GraphMode::Connectivity).unwrap();
    assert_eq!(again.shape(), (30, 30));
    assert_eq!(again.nnz(), 60);

    let other = random_dense(12, 4, 12);
    let refit = index
        .query_as_adjacency(Some(&other), &QueryOptions::with_k(3), GraphMode::Connectivity)
        .unwrap();
    assert_eq!(refit.shape(), (12, 12));
    assert_eq!(index.len(), 12);
}

#[test]
fn test_adjacency_mode_parsing() {
    assert_eq!("connectivity".parse::<GraphMode>().unwrap(), GraphMode::Connectivity);
    let mut index = IndexAdapter::new(Backend::BruteForce, &AdapterConfig::default()).unwrap();
    let mode = "distance".parse::<GraphMode>().unwrap();
    assert!(matches!(
        index.query_as_adjacency(None, &QueryOptions::new(), mode),
        Err(AdapterError::UnsupportedOperation(_))
    ));
}

#[test]
fn test_refit_replaces_state() {
    let mut index =
        IndexAdapter::new(Backend::BruteForce, &AdapterConfig::new(2, "l2", 1)).unwrap();
    index.fit(random_dense(20, 3, 13)).unwrap();
    assert_eq!(index.resolved_layout(), Some(DataLayout::Dense));

    index.fit(random_sparse(15, 10, 14)).unwrap();
    assert_eq!(index.resolved_layout(), Some(DataLayout::Sparse));
    assert_eq!(index.resolved_space().unwrap().to_string(), "l2_sparse");
    assert_eq!(index.len(), 15);
}

#[test]
fn test_save_and_load_with_data() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hnsw.index");
    let data = random_dense(100, 5, 15);
    let config = AdapterConfig::new(4, "l2", 1);

    let mut original = IndexAdapter::new(Backend::Hnsw(HnswParams::default()), &config).unwrap();
    original.fit(data.clone()).unwrap();
    original.save(&path, true).unwrap();
    let expected = original.query(Some(&data), &QueryOptions::new()).unwrap();

    // A fresh adapter has no pinned layout, so it must be given one.
    let mut restored = IndexAdapter::new(Backend::Hnsw(HnswParams::default()), &config).unwrap();
    assert!(matches!(
        restored.load(&path, true, None),
        Err(AdapterError::MissingLayout)
    ));
    restored.load(&path, true, Some(DataLayout::Dense)).unwrap();
    assert!(restored.is_fitted());
    assert_eq!(restored.len(), 100);
    assert_eq!(restored.query(Some(&data), &QueryOptions::new()).unwrap(), expected);
}

#[test]
fn test_save_without_data_reloads_into_fitted_adapter() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vptree.index");
    let data = random_dense(80, 3, 16);

    let config = AdapterConfig::new(3, "l1", 1);
    let mut index = IndexAdapter::new(Backend::VpTree(VpTreeParams::default()), &config).unwrap();
    index.fit(data).unwrap();
    let before = index.query(None, &QueryOptions::new()).unwrap();
    index.save(&path, false).unwrap();

    index.load(&path, false, None).unwrap();
    assert_eq!(index.resolved_layout(), Some(DataLayout::Dense));
    assert_eq!(index.query(None, &QueryOptions::new()).unwrap(), before);
}

#[test]
fn test_load_of_other_method_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("scan.index");
    let data = random_dense(20, 3, 17);

    let mut scan = IndexAdapter::new(Backend::BruteForce, &AdapterConfig::default()).unwrap();
    scan.fit(data).unwrap();
    scan.save(&path, true).unwrap();

    let mut napp =
        IndexAdapter::new(Backend::Napp(NappParams::default()), &AdapterConfig::default()).unwrap();
    assert!(matches!(
        napp.load(&path, true, Some(DataLayout::Dense)),
        Err(AdapterError::Engine(_))
    ));
    assert!(!napp.is_fitted());
}

#[test]
fn test_negative_jobs_resolve_against_cores() {
    let index = IndexAdapter::new(Backend::SeqSearch, &AdapterConfig::new(5, "l2", -1)).unwrap();
    assert_eq!(index.jobs(), num_cpus_or_one());
    let multi = index.surface().init_params();
    assert_eq!(multi.get_usize("threadQty").unwrap(), Some(index.jobs()));
}

fn num_cpus_or_one() -> usize {
    knn_adapter::available_parallelism().max(1)
}
