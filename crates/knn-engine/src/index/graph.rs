//! Proximity graphs: HNSW (`hnsw`) and the single-layer small world graph
//! (`sw-graph`).
//!
//! Based on "Efficient and robust approximate nearest neighbor search using
//! Hierarchical Navigable Small World graphs" by Malkov & Yashunin (2016),
//! and its single-layer predecessor "Approximate nearest neighbor algorithm
//! based on navigable small world graphs" (Malkov et al., 2014).
//!
//! Points are inserted one at a time in row order with a seeded RNG, so the
//! same data and parameters always give the same graph.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::Point;
use crate::params::ParamMap;
use crate::{EngineError, Result};

use super::{thread_pool, Candidate, Corpus, BUILD_SEED};

/// Search breadth when the caller sets no `efSearch`.
const DEFAULT_EF_SEARCH: usize = 10;

/// Hard cap on HNSW levels.
const MAX_LEVEL: usize = 16;

/// HNSW build parameters.
#[derive(Debug, Clone)]
pub struct HnswConfig {
    pub m: usize,
    pub max_m: usize,
    pub max_m0: usize,
    pub ef_construction: usize,
    pub mult: f64,
    /// Diversity heuristic for neighbour selection (`delaunay_type` > 0).
    pub heuristic: bool,
    /// Rounds of base-layer symmetrisation after insertion.
    pub post: usize,
    pub threads: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        let m = 16;
        Self {
            m,
            max_m: m,
            max_m0: 2 * m,
            ef_construction: 200,
            mult: 1.0 / (m as f64).ln(),
            heuristic: true,
            post: 0,
            threads: 1,
        }
    }
}

impl HnswConfig {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let m = params.get_usize("M")?.unwrap_or(16).max(2);
        let delaunay_type = params.get_usize("delaunay_type")?.unwrap_or(2);
        if delaunay_type > 3 {
            return Err(EngineError::InvalidParameter {
                key: "delaunay_type".to_string(),
                reason: format!("expected 0..=3, got {delaunay_type}"),
            });
        }
        let post = params.get_usize("post")?.unwrap_or(0);
        if post > 2 {
            return Err(EngineError::InvalidParameter {
                key: "post".to_string(),
                reason: format!("expected 0..=2, got {post}"),
            });
        }
        let mult = params.get_f64("mult")?.unwrap_or(1.0 / (m as f64).ln());
        if !(mult.is_finite() && mult >= 0.0) {
            return Err(EngineError::InvalidParameter {
                key: "mult".to_string(),
                reason: format!("expected a non-negative number, got {mult}"),
            });
        }
        // Memory-layout flag of optimised native builds; validated only.
        params.get_bool("skip_optimized_index")?;

        Ok(Self {
            m,
            max_m: params.get_usize("maxM")?.unwrap_or(m).max(1),
            max_m0: params.get_usize("maxM0")?.unwrap_or(2 * m).max(1),
            ef_construction: params.get_usize("efConstruction")?.unwrap_or(200).max(1),
            mult,
            heuristic: delaunay_type > 0,
            post,
            threads: params.get_usize("indexThreadQty")?.unwrap_or(1),
        })
    }
}

/// Small world graph build parameters.
#[derive(Debug, Clone)]
pub struct SwGraphConfig {
    /// Links made by each inserted point.
    pub nn: usize,
    pub ef_construction: usize,
}

impl SwGraphConfig {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let nn = params.get_usize("NN")?.unwrap_or(10).max(1);
        // Construction runs single-threaded; the key is accepted for parity.
        params.get_usize("indexThreadQty")?;
        Ok(Self {
            nn,
            ef_construction: params.get_usize("efConstruction")?.unwrap_or(nn).max(1),
        })
    }
}

/// Per-insert linking policy shared by both graph flavours.
struct LinkPolicy {
    links: usize,
    max_links: usize,
    max_links0: usize,
    ef_construction: usize,
    heuristic: bool,
    prune: bool,
}

/// A navigable graph, layered for HNSW and flat for SW-graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphIndex {
    /// `links[node][level]` lists neighbour ids.
    links: Vec<Vec<Vec<usize>>>,
    entry_point: Option<usize>,
    max_level: usize,
}

impl GraphIndex {
    fn empty(capacity: usize) -> Self {
        Self {
            links: Vec::with_capacity(capacity),
            entry_point: None,
            max_level: 0,
        }
    }

    pub fn build_hnsw(corpus: Corpus<'_>, config: &HnswConfig) -> Result<Self> {
        let mut graph = Self::empty(corpus.len());
        let mut rng = StdRng::seed_from_u64(BUILD_SEED);
        let policy = LinkPolicy {
            links: config.m,
            max_links: config.max_m,
            max_links0: config.max_m0,
            ef_construction: config.ef_construction,
            heuristic: config.heuristic,
            prune: true,
        };

        for id in 0..corpus.len() {
            let level = random_level(&mut rng, config.mult);
            graph.insert(corpus, id, level, &policy);
        }

        if config.post > 0 {
            let pool = thread_pool(config.threads)?;
            for _ in 0..config.post {
                graph.symmetrize_base_layer(corpus, config.max_m0, &pool);
            }
        }

        tracing::debug!(
            nodes = graph.links.len(),
            max_level = graph.max_level,
            m = config.m,
            "Built HNSW graph"
        );
        Ok(graph)
    }

    pub fn build_sw_graph(corpus: Corpus<'_>, config: &SwGraphConfig) -> Self {
        let mut graph = Self::empty(corpus.len());
        let policy = LinkPolicy {
            links: config.nn,
            max_links: usize::MAX,
            max_links0: usize::MAX,
            ef_construction: config.ef_construction,
            heuristic: false,
            prune: false,
        };

        for id in 0..corpus.len() {
            graph.insert(corpus, id, 0, &policy);
        }

        tracing::debug!(nodes = graph.links.len(), nn = config.nn, "Built small world graph");
        graph
    }

    fn neighbours(&self, node: usize, level: usize) -> &[usize] {
        self.links[node].get(level).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Greedy best-first search within one level.
    fn search_layer(
        &self,
        corpus: Corpus<'_>,
        query: Point<'_>,
        entry_points: &[usize],
        ef: usize,
        level: usize,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<usize> = HashSet::new();
        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::new();

        for &ep in entry_points {
            if visited.insert(ep) {
                let candidate = Candidate::new(ep, corpus.to(query, ep));
                candidates.push(Reverse(candidate));
                results.push(candidate);
            }
        }
        while results.len() > ef {
            results.pop();
        }

        while let Some(Reverse(current)) = candidates.pop() {
            let furthest = results.peek().map_or(f32::INFINITY, |f| f.distance);
            if results.len() >= ef && current.distance > furthest {
                break;
            }

            for &neighbour in self.neighbours(current.index, level) {
                if !visited.insert(neighbour) {
                    continue;
                }
                let distance = corpus.to(query, neighbour);
                let dominated =
                    results.len() >= ef && results.peek().is_some_and(|f| distance >= f.distance);
                if !dominated {
                    let candidate = Candidate::new(neighbour, distance);
                    candidates.push(Reverse(candidate));
                    results.push(candidate);
                    if results.len() > ef {
                        results.pop();
                    }
                }
            }
        }

        results.into_sorted_vec()
    }

    /// Pick up to `m` neighbours from candidates sorted ascending.
    fn select_neighbours(
        corpus: Corpus<'_>,
        candidates: &[Candidate],
        m: usize,
        heuristic: bool,
    ) -> Vec<usize> {
        if !heuristic {
            return candidates.iter().take(m).map(|c| c.index).collect();
        }

        // Keep a candidate only if it is closer to the base point than to
        // every neighbour already kept.
        let mut kept: Vec<usize> = Vec::with_capacity(m);
        for candidate in candidates {
            if kept.len() >= m {
                break;
            }
            if kept
                .iter()
                .all(|&k| corpus.between(candidate.index, k) > candidate.distance)
            {
                kept.push(candidate.index);
            }
        }
        kept
    }

    /// Link `id` into the graph. Ids must arrive in order 0, 1, 2, ...
    fn insert(&mut self, corpus: Corpus<'_>, id: usize, level: usize, policy: &LinkPolicy) {
        debug_assert_eq!(id, self.links.len());
        self.links.push(vec![Vec::new(); level + 1]);

        let Some(entry_point) = self.entry_point else {
            self.entry_point = Some(id);
            self.max_level = level;
            return;
        };

        let query = corpus.points.get(id);
        let mut nearest = vec![entry_point];

        // Descend greedily through the levels above the new node.
        for lv in (level + 1..=self.max_level).rev() {
            nearest = self
                .search_layer(corpus, query, &nearest, 1, lv)
                .into_iter()
                .map(|c| c.index)
                .collect();
        }

        for lv in (0..=level.min(self.max_level)).rev() {
            let candidates = self.search_layer(corpus, query, &nearest, policy.ef_construction, lv);
            let max_links = if lv == 0 { policy.max_links0 } else { policy.max_links };
            let selected =
                Self::select_neighbours(corpus, &candidates, policy.links, policy.heuristic);

            for &neighbour in &selected {
                self.links[neighbour][lv].push(id);
                if policy.prune && self.links[neighbour][lv].len() > max_links {
                    let mut pool: Vec<Candidate> = self.links[neighbour][lv]
                        .iter()
                        .map(|&other| Candidate::new(other, corpus.between(neighbour, other)))
                        .collect();
                    pool.sort();
                    self.links[neighbour][lv] =
                        Self::select_neighbours(corpus, &pool, max_links, policy.heuristic);
                }
            }
            self.links[id][lv] = selected;

            nearest = candidates.into_iter().map(|c| c.index).collect();
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(id);
        }
    }

    /// Add reverse edges on level 0, then trim each list to its nearest
    /// `max_links`.
    fn symmetrize_base_layer(
        &mut self,
        corpus: Corpus<'_>,
        max_links: usize,
        pool: &rayon::ThreadPool,
    ) {
        let n = self.links.len();
        let mut reverse: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, levels) in self.links.iter().enumerate() {
            for &neighbour in &levels[0] {
                reverse[neighbour].push(node);
            }
        }

        let links = &self.links;
        let merged: Vec<Vec<usize>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .map(|node| {
                    let mut ids: Vec<usize> =
                        links[node][0].iter().chain(&reverse[node]).copied().collect();
                    ids.sort_unstable();
                    ids.dedup();
                    let mut scored: Vec<Candidate> = ids
                        .into_iter()
                        .map(|other| Candidate::new(other, corpus.between(node, other)))
                        .collect();
                    scored.sort();
                    scored.truncate(max_links);
                    scored.into_iter().map(|c| c.index).collect()
                })
                .collect()
        });

        for (levels, list) in self.links.iter_mut().zip(merged) {
            levels[0] = list;
        }
    }

    /// k nearest neighbours; the search breadth is widened to at least k.
    pub fn search(
        &self,
        corpus: Corpus<'_>,
        query: Point<'_>,
        k: usize,
        ef_search: Option<usize>,
    ) -> Vec<Candidate> {
        let Some(entry_point) = self.entry_point else {
            return Vec::new();
        };
        if k == 0 {
            return Vec::new();
        }

        let mut nearest = vec![entry_point];
        for lv in (1..=self.max_level).rev() {
            nearest = self
                .search_layer(corpus, query, &nearest, 1, lv)
                .into_iter()
                .map(|c| c.index)
                .collect();
        }

        let ef = ef_search.unwrap_or(DEFAULT_EF_SEARCH).max(k);
        let mut results = self.search_layer(corpus, query, &nearest, ef, 0);
        results.truncate(k);
        results
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.links.len()
    }
}

/// Draw an HNSW level: floor(-ln(U) * mult), U in (0, 1].
fn random_level(rng: &mut StdRng, mult: f64) -> usize {
    let uniform: f64 = 1.0 - rng.r#gen::<f64>();
    ((-uniform.ln() * mult).floor() as usize).min(MAX_LEVEL)
}
