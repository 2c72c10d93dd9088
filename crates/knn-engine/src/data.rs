//! Dataset types crossing the engine boundary, and the engine's own point
//! storage.
//!
//! Callers hand the engine either a dense `ndarray::Array2<f32>` or a CSR
//! `sprs::CsMat<f32>`. Internally the engine keeps rows in [`Points`], which
//! is cheap to index row-by-row and serializes with the saved index.

use std::fmt;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use sprs::CsMat;

use crate::{EngineError, Result};

/// Storage representation of feature vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataLayout {
    /// Dense row-major table.
    Dense,
    /// Compressed sparse rows.
    Sparse,
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataLayout::Dense => write!(f, "dense"),
            DataLayout::Sparse => write!(f, "sparse"),
        }
    }
}

/// A batch of vectors, one per row.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    Dense(Array2<f32>),
    Sparse(CsMat<f32>),
}

impl Dataset {
    /// Wrap a sparse matrix, converting CSC input to CSR.
    pub fn sparse(matrix: CsMat<f32>) -> Self {
        if matrix.is_csr() {
            Dataset::Sparse(matrix)
        } else {
            Dataset::Sparse(matrix.to_other_storage())
        }
    }

    pub fn layout(&self) -> DataLayout {
        match self {
            Dataset::Dense(_) => DataLayout::Dense,
            Dataset::Sparse(_) => DataLayout::Sparse,
        }
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Dataset::Sparse(_))
    }

    /// Number of vectors.
    pub fn rows(&self) -> usize {
        match self {
            Dataset::Dense(m) => m.nrows(),
            Dataset::Sparse(m) => m.rows(),
        }
    }

    /// Number of features.
    pub fn cols(&self) -> usize {
        match self {
            Dataset::Dense(m) => m.ncols(),
            Dataset::Sparse(m) => m.cols(),
        }
    }

    /// Convert to the requested layout. Zero entries are dropped when
    /// densifying the other way round.
    pub fn into_layout(self, layout: DataLayout) -> Self {
        match (self, layout) {
            (Dataset::Dense(m), DataLayout::Sparse) => {
                Dataset::Sparse(CsMat::csr_from_dense(m.view(), 0.0))
            }
            (Dataset::Sparse(m), DataLayout::Dense) => Dataset::Dense(m.to_dense()),
            (data, _) => data,
        }
    }
}

impl From<Array2<f32>> for Dataset {
    fn from(matrix: Array2<f32>) -> Self {
        Dataset::Dense(matrix)
    }
}

impl From<CsMat<f32>> for Dataset {
    fn from(matrix: CsMat<f32>) -> Self {
        Dataset::sparse(matrix)
    }
}

/// A sparse vector with strictly increasing feature ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }
}

/// Borrowed view of one stored or query vector.
#[derive(Debug, Clone, Copy)]
pub enum Point<'a> {
    Dense(&'a [f32]),
    Sparse(&'a SparseVector),
}

/// Engine-side row storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Points {
    Dense { dim: usize, rows: Vec<Vec<f32>> },
    Sparse(Vec<SparseVector>),
}

impl Points {
    pub fn empty(layout: DataLayout) -> Self {
        match layout {
            DataLayout::Dense => Points::Dense {
                dim: 0,
                rows: Vec::new(),
            },
            DataLayout::Sparse => Points::Sparse(Vec::new()),
        }
    }

    /// Copy rows out of a dataset.
    pub fn from_dataset(data: &Dataset) -> Self {
        match data {
            Dataset::Dense(m) => Points::Dense {
                dim: m.ncols(),
                rows: m.rows().into_iter().map(|row| row.to_vec()).collect(),
            },
            Dataset::Sparse(m) if !m.is_csr() => {
                Points::from_dataset(&Dataset::Sparse(m.to_other_storage()))
            }
            Dataset::Sparse(m) => Points::Sparse(
                m.outer_iterator()
                    .map(|row| {
                        let mut entries: Vec<(u32, f32)> = row
                            .iter()
                            .filter(|(_, &v)| v != 0.0)
                            .map(|(i, &v)| (i as u32, v))
                            .collect();
                        entries.sort_by_key(|&(i, _)| i);
                        SparseVector {
                            indices: entries.iter().map(|&(i, _)| i).collect(),
                            values: entries.iter().map(|&(_, v)| v).collect(),
                        }
                    })
                    .collect(),
            ),
        }
    }

    pub fn layout(&self) -> DataLayout {
        match self {
            Points::Dense { .. } => DataLayout::Dense,
            Points::Sparse(_) => DataLayout::Sparse,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Points::Dense { rows, .. } => rows.len(),
            Points::Sparse(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Row `i`. Panics when out of range, like slice indexing.
    pub fn get(&self, i: usize) -> Point<'_> {
        match self {
            Points::Dense { rows, .. } => Point::Dense(&rows[i]),
            Points::Sparse(rows) => Point::Sparse(&rows[i]),
        }
    }

    /// Append another batch, checking layout and dimensionality.
    pub fn extend(&mut self, other: Points) -> Result<()> {
        match (self, other) {
            (Points::Dense { dim, rows }, Points::Dense { dim: new_dim, rows: new_rows }) => {
                if !rows.is_empty() && *dim != new_dim {
                    return Err(EngineError::DimensionMismatch {
                        expected: *dim,
                        got: new_dim,
                    });
                }
                *dim = new_dim;
                rows.extend(new_rows);
                Ok(())
            }
            (Points::Sparse(rows), Points::Sparse(new_rows)) => {
                rows.extend(new_rows);
                Ok(())
            }
            (current, other) => Err(EngineError::LayoutMismatch {
                expected: current.layout(),
                got: other.layout(),
            }),
        }
    }

    /// Check that a query batch can be compared against these rows.
    pub fn check_compatible(&self, queries: &Points) -> Result<()> {
        match (self, queries) {
            (Points::Dense { dim, rows }, Points::Dense { dim: qdim, rows: qrows }) => {
                if !rows.is_empty() && !qrows.is_empty() && dim != qdim {
                    return Err(EngineError::DimensionMismatch {
                        expected: *dim,
                        got: *qdim,
                    });
                }
                Ok(())
            }
            (Points::Sparse(_), Points::Sparse(_)) => Ok(()),
            (stored, queries) => Err(EngineError::LayoutMismatch {
                expected: stored.layout(),
                got: queries.layout(),
            }),
        }
    }
}
