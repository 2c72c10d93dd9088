//! Index methods behind the engine contract.
//!
//! - `brute_force` / `seq_search`: exhaustive scan
//! - `simple_invindex`: posting lists over sparse features
//! - `hnsw`: layered proximity graph
//! - `sw-graph`: single-layer small world graph
//! - `vptree`: vantage-point tree
//! - `napp`: neighbourhood approximation by shared closest pivots

pub(crate) mod graph;
pub(crate) mod invindex;
pub(crate) mod napp;
pub(crate) mod scan;
pub(crate) mod vptree;

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::{DataLayout, Point, Points};
use crate::distance::{Kernel, Space};
use crate::params::ParamMap;
use crate::{EngineError, Result};

use self::graph::{GraphIndex, HnswConfig, SwGraphConfig};
use self::invindex::InvertedIndex;
use self::napp::{NappConfig, NappIndex};
use self::scan::ScanIndex;
use self::vptree::{VpTree, VpTreeConfig};

/// Seed for every randomised build, so rebuilding the same data gives the
/// same index.
pub(crate) const BUILD_SEED: u64 = 0x5eed_1dec;

/// Index method identifiers understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    BruteForce,
    SeqSearch,
    SimpleInvIndex,
    Hnsw,
    SwGraph,
    VpTree,
    Napp,
}

impl Method {
    pub const ALL: [Method; 7] = [
        Method::BruteForce,
        Method::SeqSearch,
        Method::SimpleInvIndex,
        Method::Hnsw,
        Method::SwGraph,
        Method::VpTree,
        Method::Napp,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Method::BruteForce => "brute_force",
            Method::SeqSearch => "seq_search",
            Method::SimpleInvIndex => "simple_invindex",
            Method::Hnsw => "hnsw",
            Method::SwGraph => "sw-graph",
            Method::VpTree => "vptree",
            Method::Napp => "napp",
        }
    }

    /// Build-time parameter keys.
    pub fn init_keys(&self) -> &'static [&'static str] {
        match self {
            Method::BruteForce | Method::SimpleInvIndex => &[],
            Method::SeqSearch => &["threadQty", "multiThread"],
            Method::Hnsw => &[
                "indexThreadQty",
                "M",
                "efConstruction",
                "post",
                "maxM0",
                "maxM",
                "mult",
                "delaunay_type",
                "skip_optimized_index",
            ],
            Method::SwGraph => &["indexThreadQty", "NN", "efConstruction"],
            Method::VpTree => &["chunkBucket", "bucketSize"],
            Method::Napp => &["indexThreadQty", "numPivot", "numPivotIndex", "chunkIndexSize"],
        }
    }

    /// Query-time parameter keys.
    pub fn query_keys(&self) -> &'static [&'static str] {
        match self {
            Method::Hnsw | Method::SwGraph => &["efSearch"],
            Method::VpTree => &["alphaLeft", "alphaRight", "maxLeavesToVisit"],
            Method::Napp => &["numPivotSearch"],
            Method::BruteForce | Method::SeqSearch | Method::SimpleInvIndex => &[],
        }
    }

    /// Reject spaces a method cannot index.
    pub fn check_space(&self, space: &Space) -> Result<()> {
        match self {
            Method::SimpleInvIndex
                if space.layout() != DataLayout::Sparse || space.kernel() != Kernel::NegDot =>
            {
                Err(EngineError::UnsupportedSpace {
                    space: space.name().to_string(),
                    reason: "simple_invindex only supports negdotprod_sparse spaces".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Method {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        Method::ALL
            .iter()
            .find(|m| m.name() == s)
            .copied()
            .ok_or_else(|| EngineError::UnknownMethod {
                name: s.to_string(),
                valid: Method::ALL.iter().map(|m| m.name()).collect(),
            })
    }
}

/// A scored point. Orders by distance, then by index, so heaps and sorts are
/// deterministic under ties.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub distance: f32,
    pub index: usize,
}

impl Candidate {
    pub fn new(index: usize, distance: f32) -> Self {
        Self { distance, index }
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

/// Keep the `k` closest candidates, ascending.
pub(crate) fn top_k(candidates: impl IntoIterator<Item = Candidate>, k: usize) -> Vec<Candidate> {
    if k == 0 {
        return Vec::new();
    }
    // Max-heap: the furthest kept candidate sits on top.
    let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
    for candidate in candidates {
        if heap.len() < k {
            heap.push(candidate);
        } else if heap.peek().is_some_and(|top| candidate < *top) {
            heap.pop();
            heap.push(candidate);
        }
    }
    heap.into_sorted_vec()
}

/// Stored points together with the space that compares them.
#[derive(Clone, Copy)]
pub(crate) struct Corpus<'a> {
    pub points: &'a Points,
    pub space: &'a Space,
}

impl<'a> Corpus<'a> {
    pub fn new(points: &'a Points, space: &'a Space) -> Self {
        Self { points, space }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Distance between two stored points.
    #[inline]
    pub fn between(&self, a: usize, b: usize) -> f32 {
        self.space.distance(self.points.get(a), self.points.get(b))
    }

    /// Distance from a query to a stored point.
    #[inline]
    pub fn to(&self, query: Point<'_>, i: usize) -> f32 {
        self.space.distance(query, self.points.get(i))
    }
}

/// Query-time settings, validated when set.
#[derive(Debug, Clone, Default)]
pub(crate) struct SearchParams {
    pub ef_search: Option<usize>,
    pub alpha_left: Option<f64>,
    pub alpha_right: Option<f64>,
    pub max_leaves: Option<usize>,
    pub num_pivot_search: Option<usize>,
}

impl SearchParams {
    pub fn from_params(method: Method, params: &ParamMap) -> Result<Self> {
        params.check_known(method.name(), method.query_keys())?;
        Ok(Self {
            ef_search: params.get_usize("efSearch")?,
            alpha_left: params.get_f64("alphaLeft")?,
            alpha_right: params.get_f64("alphaRight")?,
            max_leaves: params.get_usize("maxLeavesToVisit")?,
            num_pivot_search: params.get_usize("numPivotSearch")?,
        })
    }
}

/// Build a worker pool of the requested size.
pub(crate) fn thread_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads.max(1))
        .build()
        .map_err(|e| EngineError::ThreadPool(e.to_string()))
}

/// Built index structure, one variant per family of methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) enum Structure {
    Scan(ScanIndex),
    Inverted(InvertedIndex),
    Graph(GraphIndex),
    VpTree(VpTree),
    Napp(NappIndex),
}

impl Structure {
    pub fn build(method: Method, corpus: Corpus<'_>, params: &ParamMap) -> Result<Self> {
        params.check_known(method.name(), method.init_keys())?;
        let structure = match method {
            Method::BruteForce => Structure::Scan(ScanIndex::exhaustive()),
            Method::SeqSearch => Structure::Scan(ScanIndex::from_params(params)?),
            Method::SimpleInvIndex => Structure::Inverted(InvertedIndex::build(corpus)?),
            Method::Hnsw => {
                let config = HnswConfig::from_params(params)?;
                Structure::Graph(GraphIndex::build_hnsw(corpus, &config)?)
            }
            Method::SwGraph => {
                let config = SwGraphConfig::from_params(params)?;
                Structure::Graph(GraphIndex::build_sw_graph(corpus, &config))
            }
            Method::VpTree => {
                Structure::VpTree(VpTree::build(corpus, &VpTreeConfig::from_params(params)?))
            }
            Method::Napp => {
                Structure::Napp(NappIndex::build(corpus, &NappConfig::from_params(params)?)?)
            }
        };
        Ok(structure)
    }

    /// Neighbours of one query, ascending by distance.
    pub fn search(
        &self,
        corpus: Corpus<'_>,
        query: Point<'_>,
        k: usize,
        params: &SearchParams,
    ) -> Vec<Candidate> {
        match self {
            Structure::Scan(index) => index.search(corpus, query, k),
            Structure::Inverted(index) => index.search(corpus, query, k),
            Structure::Graph(index) => index.search(corpus, query, k, params.ef_search),
            Structure::VpTree(index) => index.search(corpus, query, k, params),
            Structure::Napp(index) => index.search(corpus, query, k, params.num_pivot_search),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names_round_trip() {
        for method in Method::ALL {
            assert_eq!(method.name().parse::<Method>().unwrap(), method);
        }
        assert!(matches!(
            "annoy".parse::<Method>(),
            Err(EngineError::UnknownMethod { .. })
        ));
    }

    #[test]
    fn test_top_k_orders_and_breaks_ties_by_index() {
        let candidates = vec![
            Candidate::new(3, 0.5),
            Candidate::new(1, 0.1),
            Candidate::new(2, 0.5),
            Candidate::new(0, 0.9),
        ];
        let best = top_k(candidates, 3);
        let indices: Vec<usize> = best.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert!(top_k(Vec::new(), 3).is_empty());
        assert!(top_k(vec![Candidate::new(0, 1.0)], 0).is_empty());
    }

    #[test]
    fn test_simple_invindex_requires_negdot_sparse() {
        let dense = Space::parse("l2", DataLayout::Dense).unwrap();
        assert!(Method::SimpleInvIndex.check_space(&dense).is_err());

        let sparse = Space::parse("negdotprod_sparse_fast", DataLayout::Sparse).unwrap();
        assert!(Method::SimpleInvIndex.check_space(&sparse).is_ok());
        assert!(Method::Hnsw.check_space(&dense).is_ok());
    }

    #[test]
    fn test_search_params_reject_foreign_keys() {
        let params: ParamMap = [("efSearch", 20usize)].into_iter().collect();
        assert!(SearchParams::from_params(Method::Hnsw, &params).is_ok());
        assert!(SearchParams::from_params(Method::VpTree, &params).is_err());
    }
}
