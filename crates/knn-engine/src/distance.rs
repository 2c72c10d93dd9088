//! Distance kernels and engine-side space parsing.
//!
//! A [`Space`] is built from the space string handed to `construct` and the
//! data layout. Dense kernels use the SIMD primitives; sparse kernels merge
//! the sorted feature ids of both operands.
//!
//! Variants that only differ in precomputation strategy (`*fast`, `*fastrq`,
//! `*fastapprox`, `*_sparse_fast`) share the exact kernel of their base.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::{DataLayout, Point, SparseVector};
use crate::simd::{
    chebyshev_simd, dot_product_simd, manhattan_simd, squared_euclidean_simd, squared_norm_simd,
};
use crate::{EngineError, Result};

/// Floor applied to probability mass before taking logarithms.
const MIN_MASS: f32 = 1e-12;

/// The distance function behind a space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Kernel {
    Lp(f32),
    L1,
    L2,
    LInf,
    SquaredL2,
    Cosine,
    NegDot,
    Angular,
    KlDiv,
    KlDivGen,
    ItakuraSaito,
    JsDiv,
    JsMetric,
    Renyi(f32),
    Hamming,
    Jaccard,
}

#[derive(Clone, Copy)]
enum Param {
    None,
    P,
    Alpha,
}

/// Space names the engine can compute, per layout.
const DENSE_KERNELS: &[(&str, Param, Kernel)] = &[
    ("lp", Param::P, Kernel::L2),
    ("l1", Param::None, Kernel::L1),
    ("l2", Param::None, Kernel::L2),
    ("linf", Param::None, Kernel::LInf),
    ("l2sqr_sift", Param::None, Kernel::SquaredL2),
    ("cosinesimil", Param::None, Kernel::Cosine),
    ("negdotprod", Param::None, Kernel::NegDot),
    ("angulardist", Param::None, Kernel::Angular),
    ("kldivfast", Param::None, Kernel::KlDiv),
    ("kldivfastrq", Param::None, Kernel::KlDiv),
    ("kldivgenslow", Param::None, Kernel::KlDivGen),
    ("kldivgenfast", Param::None, Kernel::KlDivGen),
    ("kldivgenfastrq", Param::None, Kernel::KlDivGen),
    ("itakurasaitoslow", Param::None, Kernel::ItakuraSaito),
    ("itakurasaitofast", Param::None, Kernel::ItakuraSaito),
    ("itakurasaitofastrq", Param::None, Kernel::ItakuraSaito),
    ("jsdivslow", Param::None, Kernel::JsDiv),
    ("jsdivfast", Param::None, Kernel::JsDiv),
    ("jsdivfastapprox", Param::None, Kernel::JsDiv),
    ("jsmetrslow", Param::None, Kernel::JsMetric),
    ("jsmetrfast", Param::None, Kernel::JsMetric),
    ("jsmetrfastapprox", Param::None, Kernel::JsMetric),
    ("renyidiv_slow", Param::Alpha, Kernel::KlDiv),
    ("renyidiv_fast", Param::Alpha, Kernel::KlDiv),
    ("bit_hamming", Param::None, Kernel::Hamming),
    ("bit_jaccard", Param::None, Kernel::Jaccard),
];

const SPARSE_KERNELS: &[(&str, Param, Kernel)] = &[
    ("lp_sparse", Param::P, Kernel::L2),
    ("l1_sparse", Param::None, Kernel::L1),
    ("l2_sparse", Param::None, Kernel::L2),
    ("linf_sparse", Param::None, Kernel::LInf),
    ("cosinesimil_sparse", Param::None, Kernel::Cosine),
    ("cosinesimil_sparse_fast", Param::None, Kernel::Cosine),
    ("negdotprod_sparse", Param::None, Kernel::NegDot),
    ("negdotprod_sparse_fast", Param::None, Kernel::NegDot),
    ("angulardist_sparse", Param::None, Kernel::Angular),
    ("angulardist_sparse_fast", Param::None, Kernel::Angular),
    ("jaccard_sparse", Param::None, Kernel::Jaccard),
];

/// String spaces the engine knows but cannot run over float vectors.
const STRING_SPACES: &[&str] = &["leven", "normleven"];

/// A resolved distance space bound to a data layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    name: String,
    layout: DataLayout,
    kernel: Kernel,
}

impl Space {
    /// Parse `name` or `name:param=value` for the given layout.
    pub fn parse(raw: &str, layout: DataLayout) -> Result<Self> {
        let (name, param) = match raw.split_once(':') {
            Some((name, rest)) => {
                let (key, value) = rest.split_once('=').ok_or_else(|| {
                    EngineError::UnknownSpace(raw.to_string())
                })?;
                let value: f32 = value
                    .trim()
                    .parse()
                    .map_err(|_| EngineError::UnknownSpace(raw.to_string()))?;
                (name, Some((key, value)))
            }
            None => (raw, None),
        };

        if STRING_SPACES.contains(&name) {
            return Err(EngineError::UnsupportedSpace {
                space: raw.to_string(),
                reason: "string spaces cannot index float vectors".to_string(),
            });
        }

        let table = match layout {
            DataLayout::Dense => DENSE_KERNELS,
            DataLayout::Sparse => SPARSE_KERNELS,
        };
        let (_, expected, base) = table
            .iter()
            .find(|(n, _, _)| *n == name)
            .copied()
            .ok_or_else(|| EngineError::UnsupportedSpace {
                space: raw.to_string(),
                reason: format!("not a {layout} space"),
            })?;

        let kernel = match (expected, param) {
            (Param::None, None) => base,
            (Param::P, Some(("p", p))) if p > 0.0 => Kernel::Lp(p),
            (Param::Alpha, Some(("alpha", a))) if a > 0.0 => {
                if (a - 1.0).abs() < f32::EPSILON {
                    Kernel::KlDiv
                } else {
                    Kernel::Renyi(a)
                }
            }
            (Param::P, _) => {
                return Err(EngineError::UnsupportedSpace {
                    space: raw.to_string(),
                    reason: "requires a positive parameter p".to_string(),
                });
            }
            (Param::Alpha, _) => {
                return Err(EngineError::UnsupportedSpace {
                    space: raw.to_string(),
                    reason: "requires a positive parameter alpha".to_string(),
                });
            }
            (Param::None, Some(_)) => {
                return Err(EngineError::UnsupportedSpace {
                    space: raw.to_string(),
                    reason: "takes no parameter".to_string(),
                });
            }
        };

        Ok(Self {
            name: raw.to_string(),
            layout,
            kernel,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    pub fn kernel(&self) -> Kernel {
        self.kernel
    }

    /// Distance between two points of this space's layout.
    ///
    /// Mixed layouts never reach here: points are checked at load/query time.
    #[inline]
    pub fn distance(&self, a: Point<'_>, b: Point<'_>) -> f32 {
        match (a, b) {
            (Point::Dense(a), Point::Dense(b)) => dense_distance(self.kernel, a, b),
            (Point::Sparse(a), Point::Sparse(b)) => sparse_distance(self.kernel, a, b),
            _ => f32::MAX,
        }
    }
}

impl fmt::Display for Space {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[inline]
fn cosine_from_parts(dot: f32, sq_a: f32, sq_b: f32) -> f32 {
    let norm = (sq_a * sq_b).sqrt();
    if norm < 1e-20 {
        0.0
    } else {
        (dot / norm).clamp(-1.0, 1.0)
    }
}

#[inline]
fn dense_cosine(a: &[f32], b: &[f32]) -> f32 {
    cosine_from_parts(dot_product_simd(a, b), squared_norm_simd(a), squared_norm_simd(b))
}

#[inline]
fn xlogx(x: f32) -> f32 {
    if x <= 0.0 { 0.0 } else { x * x.ln() }
}

/// Distance between two dense vectors.
pub fn dense_distance(kernel: Kernel, a: &[f32], b: &[f32]) -> f32 {
    match kernel {
        Kernel::Lp(p) => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y).abs().powf(p))
            .sum::<f32>()
            .powf(1.0 / p),
        Kernel::L1 => manhattan_simd(a, b),
        Kernel::L2 => squared_euclidean_simd(a, b).sqrt(),
        Kernel::LInf => chebyshev_simd(a, b),
        Kernel::SquaredL2 => squared_euclidean_simd(a, b),
        Kernel::Cosine => 1.0 - dense_cosine(a, b),
        Kernel::NegDot => -dot_product_simd(a, b),
        Kernel::Angular => dense_cosine(a, b).acos(),
        Kernel::KlDiv => a
            .iter()
            .zip(b)
            .filter(|(x, _)| **x > 0.0)
            .map(|(&x, &y)| x * (x.ln() - y.max(MIN_MASS).ln()))
            .sum(),
        Kernel::KlDivGen => a
            .iter()
            .zip(b)
            .map(|(&x, &y)| {
                let y = y.max(MIN_MASS);
                xlogx(x) - x * y.ln() - x + y
            })
            .sum(),
        Kernel::ItakuraSaito => a
            .iter()
            .zip(b)
            .map(|(&x, &y)| {
                let ratio = x.max(MIN_MASS) / y.max(MIN_MASS);
                ratio - ratio.ln() - 1.0
            })
            .sum(),
        Kernel::JsDiv => js_divergence(a, b),
        Kernel::JsMetric => js_divergence(a, b).max(0.0).sqrt(),
        Kernel::Renyi(alpha) => {
            let sum: f32 = a
                .iter()
                .zip(b)
                .filter(|(x, _)| **x > 0.0)
                .map(|(&x, &y)| x.powf(alpha) * y.max(MIN_MASS).powf(1.0 - alpha))
                .sum();
            sum.max(MIN_MASS).ln() / (alpha - 1.0)
        }
        Kernel::Hamming => a
            .iter()
            .zip(b)
            .filter(|(x, y)| (**x != 0.0) != (**y != 0.0))
            .count() as f32,
        Kernel::Jaccard => {
            let (mut both, mut either) = (0usize, 0usize);
            for (x, y) in a.iter().zip(b) {
                let (x, y) = (*x != 0.0, *y != 0.0);
                both += (x && y) as usize;
                either += (x || y) as usize;
            }
            jaccard_distance(both, either)
        }
    }
}

fn js_divergence(a: &[f32], b: &[f32]) -> f32 {
    0.5 * a
        .iter()
        .zip(b)
        .map(|(&x, &y)| {
            let m = 0.5 * (x + y);
            xlogx(x) + xlogx(y) - 2.0 * xlogx(m)
        })
        .sum::<f32>()
}

#[inline]
fn jaccard_distance(both: usize, either: usize) -> f32 {
    if either == 0 {
        0.0
    } else {
        1.0 - both as f32 / either as f32
    }
}

/// Visit the union of two sorted sparse vectors, yielding value pairs with
/// zeros filled in for absent features.
fn merge_union(a: &SparseVector, b: &SparseVector, mut f: impl FnMut(f32, f32)) {
    let (mut i, mut j) = (0, 0);
    while i < a.nnz() || j < b.nnz() {
        let ai = a.indices.get(i).copied().unwrap_or(u32::MAX);
        let bj = b.indices.get(j).copied().unwrap_or(u32::MAX);
        if ai == bj {
            f(a.values[i], b.values[j]);
            i += 1;
            j += 1;
        } else if ai < bj {
            f(a.values[i], 0.0);
            i += 1;
        } else {
            f(0.0, b.values[j]);
            j += 1;
        }
    }
}

fn sparse_dot(a: &SparseVector, b: &SparseVector) -> f32 {
    let (mut i, mut j, mut dot) = (0, 0, 0.0);
    while i < a.nnz() && j < b.nnz() {
        match a.indices[i].cmp(&b.indices[j]) {
            std::cmp::Ordering::Equal => {
                dot += a.values[i] * b.values[j];
                i += 1;
                j += 1;
            }
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
        }
    }
    dot
}

fn sparse_sq_norm(a: &SparseVector) -> f32 {
    a.values.iter().map(|v| v * v).sum()
}

fn sparse_cosine(a: &SparseVector, b: &SparseVector) -> f32 {
    cosine_from_parts(sparse_dot(a, b), sparse_sq_norm(a), sparse_sq_norm(b))
}

/// Distance between two sparse vectors.
pub fn sparse_distance(kernel: Kernel, a: &SparseVector, b: &SparseVector) -> f32 {
    match kernel {
        Kernel::Lp(p) => {
            let mut sum = 0.0f32;
            merge_union(a, b, |x, y| sum += (x - y).abs().powf(p));
            sum.powf(1.0 / p)
        }
        Kernel::L1 => {
            let mut sum = 0.0f32;
            merge_union(a, b, |x, y| sum += (x - y).abs());
            sum
        }
        Kernel::L2 | Kernel::SquaredL2 => {
            let mut sum = 0.0f32;
            merge_union(a, b, |x, y| sum += (x - y) * (x - y));
            if kernel == Kernel::L2 { sum.sqrt() } else { sum }
        }
        Kernel::LInf => {
            let mut max = 0.0f32;
            merge_union(a, b, |x, y| max = max.max((x - y).abs()));
            max
        }
        Kernel::Cosine => 1.0 - sparse_cosine(a, b),
        Kernel::Angular => sparse_cosine(a, b).acos(),
        Kernel::NegDot => -sparse_dot(a, b),
        Kernel::Jaccard => {
            let (mut both, mut either) = (0usize, 0usize);
            merge_union(a, b, |x, y| {
                let (x, y) = (x != 0.0, y != 0.0);
                both += (x && y) as usize;
                either += (x || y) as usize;
            });
            jaccard_distance(both, either)
        }
        // Divergences have no sparse space; the parser never binds them here.
        _ => f32::MAX,
    }
}
