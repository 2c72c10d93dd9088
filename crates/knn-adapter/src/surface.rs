//! Per-backend parameter schemas.
//!
//! Each backend declares its method name plus ordered init-time and
//! query-time schemas. A schema entry without a value is left out of the
//! map sent to the engine, which then applies its own default.

use knn_engine::{ParamMap, ParamValue};

use crate::error::{AdapterError, Result};

/// One schema entry: key and optional value.
pub type SchemaEntry = (&'static str, Option<ParamValue>);

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSurface {
    method: &'static str,
    init: Vec<SchemaEntry>,
    query: Vec<SchemaEntry>,
}

impl ParameterSurface {
    pub fn new(method: &'static str, init: Vec<SchemaEntry>, query: Vec<SchemaEntry>) -> Self {
        Self { method, init, query }
    }

    pub fn method_name(&self) -> &'static str {
        self.method
    }

    pub fn query_keys(&self) -> Vec<&'static str> {
        self.query.iter().map(|(key, _)| *key).collect()
    }

    /// Build parameters with values set.
    pub fn init_params(&self) -> ParamMap {
        present(&self.init)
    }

    /// Query parameters with values set, after applying per-call
    /// `overrides`. An override key outside the query schema is rejected.
    pub fn query_params(&self, overrides: &ParamMap) -> Result<ParamMap> {
        let mut params = present(&self.query);
        for (key, value) in overrides.iter() {
            if !self.query.iter().any(|(k, _)| *k == key) {
                return Err(AdapterError::InvalidParameter {
                    method: self.method,
                    key: key.to_string(),
                    accepted: self.query_keys(),
                });
            }
            params.insert(key, value);
        }
        Ok(params)
    }
}

fn present(schema: &[SchemaEntry]) -> ParamMap {
    schema
        .iter()
        .filter_map(|(key, value)| value.map(|v| (*key, v)))
        .collect()
}

/// Per-call query settings.
///
/// `k` falls back to the adapter's neighbour count. Backend tunables are
/// carried as overrides and checked against the backend's query schema when
/// the query runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOptions {
    pub k: Option<usize>,
    overrides: ParamMap,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_k(k: usize) -> Self {
        Self::new().k(k)
    }

    pub fn k(mut self, k: usize) -> Self {
        self.k = Some(k);
        self
    }

    /// Search breadth for `hnsw` and `sw-graph`.
    pub fn ef_search(self, ef: usize) -> Self {
        self.set("efSearch", ef)
    }

    pub fn alpha_left(self, alpha: f64) -> Self {
        self.set("alphaLeft", alpha)
    }

    pub fn alpha_right(self, alpha: f64) -> Self {
        self.set("alphaRight", alpha)
    }

    pub fn max_leaves_to_visit(self, leaves: usize) -> Self {
        self.set("maxLeavesToVisit", leaves)
    }

    pub fn num_pivot_search(self, pivots: usize) -> Self {
        self.set("numPivotSearch", pivots)
    }

    /// Any backend-specific override by engine key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.overrides.insert(key, value);
        self
    }

    pub fn overrides(&self) -> &ParamMap {
        &self.overrides
    }
}
