//! Vantage-point tree with a stretched triangle-inequality pruner.
//!
//! Each inner node splits its points at the median distance to a pivot.
//! During search a subtree is skipped when the query's distance to the
//! median, scaled by `alphaLeft` / `alphaRight`, exceeds the current search
//! radius. Alphas of 1 give exact search in metric spaces; larger alphas
//! prune more aggressively.

use std::collections::BinaryHeap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::Point;
use crate::params::ParamMap;
use crate::Result;

use super::{Candidate, Corpus, SearchParams, BUILD_SEED};

#[derive(Debug, Clone)]
pub struct VpTreeConfig {
    pub bucket_size: usize,
    /// Sort bucket ids so leaf scans walk storage in order.
    pub chunk_bucket: bool,
}

impl Default for VpTreeConfig {
    fn default() -> Self {
        Self {
            bucket_size: 50,
            chunk_bucket: true,
        }
    }
}

impl VpTreeConfig {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        Ok(Self {
            bucket_size: params.get_usize("bucketSize")?.unwrap_or(50).max(1),
            chunk_bucket: params.get_bool("chunkBucket")?.unwrap_or(true),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum VpNode {
    Leaf {
        bucket: Vec<usize>,
    },
    Inner {
        pivot: usize,
        median: f32,
        /// Points with distance <= median.
        left: usize,
        right: usize,
    },
}

/// Arena-allocated tree; node 0 is the root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VpTree {
    nodes: Vec<VpNode>,
}

impl VpTree {
    pub fn build(corpus: Corpus<'_>, config: &VpTreeConfig) -> Self {
        let mut tree = Self { nodes: Vec::new() };
        if corpus.len() > 0 {
            let mut rng = StdRng::seed_from_u64(BUILD_SEED);
            let ids: Vec<usize> = (0..corpus.len()).collect();
            tree.build_node(corpus, ids, config, &mut rng);
        }
        tracing::debug!(
            nodes = tree.nodes.len(),
            bucket_size = config.bucket_size,
            "Built VP-tree"
        );
        tree
    }

    fn push(&mut self, node: VpNode) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn build_node(
        &mut self,
        corpus: Corpus<'_>,
        mut ids: Vec<usize>,
        config: &VpTreeConfig,
        rng: &mut StdRng,
    ) -> usize {
        if ids.len() <= config.bucket_size {
            if config.chunk_bucket {
                ids.sort_unstable();
            }
            return self.push(VpNode::Leaf { bucket: ids });
        }

        let pivot = ids.swap_remove(rng.gen_range(0..ids.len()));
        let mut scored: Vec<Candidate> = ids
            .into_iter()
            .map(|i| Candidate::new(i, corpus.between(pivot, i)))
            .collect();
        scored.sort();

        let mid = scored.len() / 2;
        let median = scored[mid].distance;
        let right_ids: Vec<usize> =
            scored.split_off(mid + 1).into_iter().map(|c| c.index).collect();
        let left_ids: Vec<usize> = scored.into_iter().map(|c| c.index).collect();

        // Reserve the slot so children land after their parent.
        let slot = self.push(VpNode::Leaf { bucket: Vec::new() });
        let left = self.build_node(corpus, left_ids, config, rng);
        let right = self.build_node(corpus, right_ids, config, rng);
        self.nodes[slot] = VpNode::Inner {
            pivot,
            median,
            left,
            right,
        };
        slot
    }

    pub fn search(
        &self,
        corpus: Corpus<'_>,
        query: Point<'_>,
        k: usize,
        params: &SearchParams,
    ) -> Vec<Candidate> {
        if self.nodes.is_empty() || k == 0 {
            return Vec::new();
        }
        let mut state = SearchState {
            results: BinaryHeap::with_capacity(k + 1),
            k,
            alpha_left: params.alpha_left.unwrap_or(1.0) as f32,
            alpha_right: params.alpha_right.unwrap_or(1.0) as f32,
            leaves_left: params.max_leaves.unwrap_or(usize::MAX),
        };
        self.visit(0, corpus, query, &mut state);
        state.results.into_sorted_vec()
    }

    fn visit(&self, node: usize, corpus: Corpus<'_>, query: Point<'_>, state: &mut SearchState) {
        if state.leaves_left == 0 {
            return;
        }
        match &self.nodes[node] {
            VpNode::Leaf { bucket } => {
                state.leaves_left -= 1;
                for &i in bucket {
                    state.offer(Candidate::new(i, corpus.to(query, i)));
                }
            }
            VpNode::Inner {
                pivot,
                median,
                left,
                right,
            } => {
                let d = corpus.to(query, *pivot);
                state.offer(Candidate::new(*pivot, d));

                let (near, far) = if d <= *median { (*left, *right) } else { (*right, *left) };
                self.visit(near, corpus, query, state);

                let gap = if d <= *median {
                    (*median - d) * state.alpha_right
                } else {
                    (d - *median) * state.alpha_left
                };
                if gap <= state.radius() {
                    self.visit(far, corpus, query, state);
                }
            }
        }
    }
}

struct SearchState {
    results: BinaryHeap<Candidate>,
    k: usize,
    alpha_left: f32,
    alpha_right: f32,
    leaves_left: usize,
}

impl SearchState {
    fn offer(&mut self, candidate: Candidate) {
        if self.results.len() < self.k {
            self.results.push(candidate);
        } else if self.results.peek().is_some_and(|top| candidate < *top) {
            self.results.pop();
            self.results.push(candidate);
        }
    }

    /// Distance to the k-th result, unbounded until k results exist.
    fn radius(&self) -> f32 {
        if self.results.len() < self.k {
            f32::INFINITY
        } else {
            self.results.peek().map_or(f32::INFINITY, |c| c.distance)
        }
    }
}
