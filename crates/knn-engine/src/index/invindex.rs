//! Simple inverted index for sparse negative-dot-product search.
//!
//! Each feature id maps to the rows holding it. A query accumulates dot
//! products only along its own features; rows sharing no feature score 0.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::{Point, Points};
use crate::{EngineError, Result};

use super::{top_k, Candidate, Corpus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvertedIndex {
    /// feature id -> (row, value)
    postings: BTreeMap<u32, Vec<(u32, f32)>>,
}

impl InvertedIndex {
    pub fn build(corpus: Corpus<'_>) -> Result<Self> {
        let Points::Sparse(rows) = corpus.points else {
            return Err(EngineError::UnsupportedSpace {
                space: corpus.space.name().to_string(),
                reason: "simple_invindex needs sparse data".to_string(),
            });
        };

        let mut postings: BTreeMap<u32, Vec<(u32, f32)>> = BTreeMap::new();
        for (row, vector) in rows.iter().enumerate() {
            for (&feature, &value) in vector.indices.iter().zip(&vector.values) {
                postings.entry(feature).or_default().push((row as u32, value));
            }
        }

        tracing::debug!(features = postings.len(), rows = rows.len(), "Built inverted index");
        Ok(Self { postings })
    }

    pub fn search(&self, corpus: Corpus<'_>, query: Point<'_>, k: usize) -> Vec<Candidate> {
        let Point::Sparse(query) = query else {
            return Vec::new();
        };

        let mut scores = vec![0.0f32; corpus.len()];
        for (feature, &weight) in query.indices.iter().zip(&query.values) {
            if let Some(list) = self.postings.get(feature) {
                for &(row, value) in list {
                    scores[row as usize] += weight * value;
                }
            }
        }

        top_k(
            scores
                .into_iter()
                .enumerate()
                .map(|(i, score)| Candidate::new(i, -score)),
            k,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{DataLayout, Dataset};
    use crate::distance::Space;
    use sprs::TriMat;

    #[test]
    fn test_inverted_index_matches_negdot_scan() {
        let mut tri = TriMat::new((4, 6));
        tri.add_triplet(0, 0, 1.0f32);
        tri.add_triplet(0, 3, 2.0);
        tri.add_triplet(1, 1, 5.0);
        tri.add_triplet(2, 3, 4.0);
        tri.add_triplet(3, 5, 1.0);
        let points = Points::from_dataset(&Dataset::Sparse(tri.to_csr()));
        let space = Space::parse("negdotprod_sparse_fast", DataLayout::Sparse).unwrap();
        let corpus = Corpus::new(&points, &space);

        let index = InvertedIndex::build(corpus).unwrap();
        let query = crate::data::SparseVector {
            indices: vec![0, 3],
            values: vec![1.0, 1.0],
        };
        let result = index.search(corpus, Point::Sparse(&query), 2);

        // row 2 scores 4, row 0 scores 1 + 2 = 3
        assert_eq!(result[0].index, 2);
        assert_eq!(result[1].index, 0);
        assert!((result[0].distance + 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_dense_points() {
        let points = Points::empty(DataLayout::Dense);
        let space = Space::parse("l2", DataLayout::Dense).unwrap();
        assert!(InvertedIndex::build(Corpus::new(&points, &space)).is_err());
    }
}
