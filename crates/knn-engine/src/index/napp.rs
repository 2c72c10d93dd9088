//! Neighbourhood APProximation index.
//!
//! A random sample of points serves as pivots. Every point is indexed under
//! its `numPivotIndex` closest pivots. A query looks up its own
//! `numPivotSearch` closest pivots, gathers every point filed under any of
//! them, and reranks that candidate set exactly.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::data::Point;
use crate::params::ParamMap;
use crate::Result;

use super::{thread_pool, top_k, Candidate, Corpus, BUILD_SEED};

#[derive(Debug, Clone)]
pub struct NappConfig {
    pub num_pivot: usize,
    pub num_pivot_index: usize,
    /// Points assigned per parallel work unit.
    pub chunk_index_size: usize,
    pub threads: usize,
}

impl Default for NappConfig {
    fn default() -> Self {
        Self {
            num_pivot: 512,
            num_pivot_index: 32,
            chunk_index_size: 65536,
            threads: 1,
        }
    }
}

impl NappConfig {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            num_pivot: params.get_usize("numPivot")?.unwrap_or(defaults.num_pivot).max(1),
            num_pivot_index: params
                .get_usize("numPivotIndex")?
                .unwrap_or(defaults.num_pivot_index)
                .max(1),
            chunk_index_size: params
                .get_usize("chunkIndexSize")?
                .unwrap_or(defaults.chunk_index_size)
                .max(1),
            threads: params.get_usize("indexThreadQty")?.unwrap_or(defaults.threads),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NappIndex {
    /// Row ids of the pivots.
    pivots: Vec<usize>,
    /// `postings[p]` lists the points indexed under pivot `p`.
    postings: Vec<Vec<usize>>,
    num_pivot_index: usize,
}

impl NappIndex {
    pub fn build(corpus: Corpus<'_>, config: &NappConfig) -> Result<Self> {
        let n = corpus.len();
        let num_pivot = config.num_pivot.min(n);
        let num_pivot_index = config.num_pivot_index.min(num_pivot.max(1));

        let mut rng = StdRng::seed_from_u64(BUILD_SEED);
        let mut pivots = rand::seq::index::sample(&mut rng, n, num_pivot).into_vec();
        pivots.sort_unstable();

        let pool = thread_pool(config.threads)?;
        let assignments: Vec<Vec<usize>> = pool.install(|| {
            (0..n)
                .into_par_iter()
                .with_min_len(config.chunk_index_size)
                .map(|i| {
                    let scored = pivots
                        .iter()
                        .enumerate()
                        .map(|(p, &row)| Candidate::new(p, corpus.between(i, row)));
                    top_k(scored, num_pivot_index).into_iter().map(|c| c.index).collect()
                })
                .collect()
        });

        let mut postings = vec![Vec::new(); num_pivot];
        for (i, closest) in assignments.into_iter().enumerate() {
            for p in closest {
                postings[p].push(i);
            }
        }

        tracing::debug!(
            points = n,
            pivots = num_pivot,
            pivots_per_point = num_pivot_index,
            "Built NAPP index"
        );
        Ok(Self {
            pivots,
            postings,
            num_pivot_index,
        })
    }

    pub fn search(
        &self,
        corpus: Corpus<'_>,
        query: Point<'_>,
        k: usize,
        num_pivot_search: Option<usize>,
    ) -> Vec<Candidate> {
        if self.pivots.is_empty() || k == 0 {
            return Vec::new();
        }
        let wanted = num_pivot_search.unwrap_or(self.num_pivot_index).clamp(1, self.pivots.len());
        let closest = top_k(
            self.pivots
                .iter()
                .enumerate()
                .map(|(p, &row)| Candidate::new(p, corpus.to(query, row))),
            wanted,
        );

        let mut seen = vec![false; corpus.len()];
        let mut candidates = Vec::new();
        for pivot in closest {
            for &i in &self.postings[pivot.index] {
                if !seen[i] {
                    seen[i] = true;
                    candidates.push(i);
                }
            }
        }

        top_k(candidates.into_iter().map(|i| Candidate::new(i, corpus.to(query, i))), k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataLayout, Dataset, Points};
    use crate::distance::Space;
    use ndarray::Array2;

    fn line(n: usize) -> Points {
        Points::from_dataset(&Dataset::Dense(Array2::from_shape_fn((n, 1), |(i, _)| i as f32)))
    }

    #[test]
    fn test_all_pivots_gives_exact_results() {
        let points = line(64);
        let space = Space::parse("l2", DataLayout::Dense).unwrap();
        let corpus = Corpus::new(&points, &space);
        let config = NappConfig {
            num_pivot: 8,
            num_pivot_index: 8,
            chunk_index_size: 16,
            threads: 2,
        };
        let index = NappIndex::build(corpus, &config).unwrap();

        let q = [30.2f32];
        let indices: Vec<usize> = index
            .search(corpus, Point::Dense(&q), 3, Some(8))
            .iter()
            .map(|c| c.index)
            .collect();
        assert_eq!(indices, vec![30, 31, 29]);
    }

    #[test]
    fn test_pivot_counts_capped_by_data_size() {
        let points = line(5);
        let space = Space::parse("l1", DataLayout::Dense).unwrap();
        let corpus = Corpus::new(&points, &space);
        let index = NappIndex::build(corpus, &NappConfig::default()).unwrap();
        assert_eq!(index.pivots.len(), 5);
        assert_eq!(index.num_pivot_index, 5);

        let q = [4.0f32];
        let results = index.search(corpus, Point::Dense(&q), 10, None);
        assert_eq!(results.len(), 5);
        assert_eq!(results[0].index, 4);
    }

    #[test]
    fn test_from_params() {
        let params: ParamMap = [("numPivot", 100usize), ("numPivotIndex", 10usize)]
            .into_iter()
            .collect();
        let config = NappConfig::from_params(&params).unwrap();
        assert_eq!(config.num_pivot, 100);
        assert_eq!(config.num_pivot_index, 10);
        assert_eq!(config.chunk_index_size, 65536);
    }
}
