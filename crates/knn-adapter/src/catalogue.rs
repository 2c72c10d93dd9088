//! The seven supported backends and their parameter surfaces.

use std::fmt;
use std::str::FromStr;

use knn_engine::ParamValue;
use serde::Deserialize;

use crate::error::AdapterError;
use crate::surface::{ParameterSurface, SchemaEntry};

/// Build-time tunables for `hnsw`. `None` leaves the engine default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HnswParams {
    /// Neighbours linked per inserted point.
    pub m: Option<usize>,
    /// Candidate list size during construction.
    pub ef_construction: Option<usize>,
    /// Post-processing passes over the base layer (0, 1 or 2).
    pub post: Option<usize>,
    pub max_m0: Option<usize>,
    pub max_m: Option<usize>,
    /// Level generation multiplier.
    pub mult: Option<f64>,
    /// 0 keeps the closest neighbours; 1..=3 select for diversity.
    pub delaunay_type: Option<usize>,
    pub skip_optimized_index: Option<bool>,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: None,
            ef_construction: None,
            post: Some(0),
            max_m0: None,
            max_m: None,
            mult: None,
            delaunay_type: Some(2),
            skip_optimized_index: None,
        }
    }
}

impl HnswParams {
    /// Sparse graph, short construction.
    pub fn fast() -> Self {
        Self {
            m: Some(8),
            ef_construction: Some(64),
            ..Default::default()
        }
    }

    /// Denser graph with a symmetrised base layer.
    pub fn high_accuracy() -> Self {
        Self {
            m: Some(32),
            ef_construction: Some(400),
            post: Some(2),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SwGraphParams {
    /// Links made by each inserted point.
    pub nn: Option<usize>,
    pub ef_construction: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct VpTreeParams {
    pub chunk_bucket: Option<bool>,
    pub bucket_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct NappParams {
    pub num_pivot: Option<usize>,
    pub num_pivot_index: Option<usize>,
    pub chunk_index_size: Option<usize>,
}

/// A backend algorithm together with its build-time tunables.
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    BruteForce,
    SimpleInvIndex,
    Hnsw(HnswParams),
    SwGraph(SwGraphParams),
    VpTree(VpTreeParams),
    Napp(NappParams),
    SeqSearch,
}

const METHODS: [&str; 7] = [
    "brute_force",
    "simple_invindex",
    "hnsw",
    "sw-graph",
    "vptree",
    "napp",
    "seq_search",
];

fn int(value: Option<usize>) -> Option<ParamValue> {
    value.map(ParamValue::from)
}

impl Backend {
    pub fn method_name(&self) -> &'static str {
        match self {
            Backend::BruteForce => "brute_force",
            Backend::SimpleInvIndex => "simple_invindex",
            Backend::Hnsw(_) => "hnsw",
            Backend::SwGraph(_) => "sw-graph",
            Backend::VpTree(_) => "vptree",
            Backend::Napp(_) => "napp",
            Backend::SeqSearch => "seq_search",
        }
    }

    /// The parameter surface for a resolved worker count.
    pub fn surface(&self, jobs: usize) -> ParameterSurface {
        let threads = Some(ParamValue::from(jobs));
        let (init, query): (Vec<SchemaEntry>, Vec<SchemaEntry>) = match self {
            Backend::BruteForce | Backend::SimpleInvIndex => (vec![], vec![]),
            Backend::Hnsw(p) => (
                vec![
                    ("indexThreadQty", threads),
                    ("M", int(p.m)),
                    ("efConstruction", int(p.ef_construction)),
                    ("post", int(p.post)),
                    ("maxM0", int(p.max_m0)),
                    ("maxM", int(p.max_m)),
                    ("mult", p.mult.map(ParamValue::from)),
                    ("delaunay_type", int(p.delaunay_type)),
                    ("skip_optimized_index", p.skip_optimized_index.map(ParamValue::from)),
                ],
                vec![("efSearch", None)],
            ),
            Backend::SwGraph(p) => (
                vec![
                    ("indexThreadQty", threads),
                    ("NN", int(p.nn)),
                    ("efConstruction", int(p.ef_construction)),
                ],
                vec![("efSearch", None)],
            ),
            Backend::VpTree(p) => (
                vec![
                    ("chunkBucket", p.chunk_bucket.map(ParamValue::from)),
                    ("bucketSize", int(p.bucket_size)),
                ],
                vec![
                    ("alphaLeft", None),
                    ("alphaRight", None),
                    ("maxLeavesToVisit", None),
                ],
            ),
            Backend::Napp(p) => (
                vec![
                    ("indexThreadQty", threads),
                    ("numPivot", int(p.num_pivot)),
                    ("numPivotIndex", int(p.num_pivot_index)),
                    ("chunkIndexSize", int(p.chunk_index_size)),
                ],
                vec![("numPivotSearch", None)],
            ),
            Backend::SeqSearch => (
                vec![
                    ("threadQty", threads),
                    ("multiThread", Some(ParamValue::Bool(jobs != 1))),
                ],
                vec![],
            ),
        };
        ParameterSurface::new(self.method_name(), init, query)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.method_name())
    }
}

/// Backend by method name, with default tunables.
impl FromStr for Backend {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "brute_force" => Ok(Backend::BruteForce),
            "simple_invindex" => Ok(Backend::SimpleInvIndex),
            "hnsw" => Ok(Backend::Hnsw(HnswParams::default())),
            "sw-graph" => Ok(Backend::SwGraph(SwGraphParams::default())),
            "vptree" => Ok(Backend::VpTree(VpTreeParams::default())),
            "napp" => Ok(Backend::Napp(NappParams::default())),
            "seq_search" => Ok(Backend::SeqSearch),
            other => Err(AdapterError::UnknownMethod {
                name: other.to_string(),
                valid: METHODS.to_vec(),
            }),
        }
    }
}
