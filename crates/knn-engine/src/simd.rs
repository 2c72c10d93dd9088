//! SIMD primitive operations for the dense distance kernels.
//!
//! All kernels go through the portable `wide` crate (8 x f32 lanes), which
//! lowers to AVX2/SSE on x86_64 and NEON on aarch64. Every kernel handles
//! the tail that does not fill a full lane with a scalar loop.
//!
//! For best performance, build with:
//! ```bash
//! RUSTFLAGS="-C target-cpu=native" cargo build --release
//! ```

use wide::f32x8;

/// Number of f32 lanes processed per iteration.
pub const SIMD_WIDTH: usize = 8;

/// Compute dot product of two f32 slices using SIMD.
///
/// # Panics
/// Panics if slices have different lengths.
#[inline]
pub fn dot_product_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have same length");

    let chunks = a.len() / SIMD_WIDTH;
    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * SIMD_WIDTH;
        let va = f32x8::from(&a[offset..offset + SIMD_WIDTH]);
        let vb = f32x8::from(&b[offset..offset + SIMD_WIDTH]);
        sum += va * vb;
    }

    let mut result = sum.reduce_add();
    for i in chunks * SIMD_WIDTH..a.len() {
        result += a[i] * b[i];
    }
    result
}

/// Compute squared L2 norm using SIMD.
#[inline]
pub fn squared_norm_simd(a: &[f32]) -> f32 {
    let chunks = a.len() / SIMD_WIDTH;
    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * SIMD_WIDTH;
        let va = f32x8::from(&a[offset..offset + SIMD_WIDTH]);
        sum += va * va;
    }

    let mut result = sum.reduce_add();
    for &x in &a[chunks * SIMD_WIDTH..] {
        result += x * x;
    }
    result
}

/// Compute squared Euclidean distance between two vectors using SIMD.
#[inline]
pub fn squared_euclidean_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have same length");

    let chunks = a.len() / SIMD_WIDTH;
    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * SIMD_WIDTH;
        let va = f32x8::from(&a[offset..offset + SIMD_WIDTH]);
        let vb = f32x8::from(&b[offset..offset + SIMD_WIDTH]);
        let diff = va - vb;
        sum += diff * diff;
    }

    let mut result = sum.reduce_add();
    for i in chunks * SIMD_WIDTH..a.len() {
        let diff = a[i] - b[i];
        result += diff * diff;
    }
    result
}

/// Compute Manhattan (L1) distance using SIMD.
#[inline]
pub fn manhattan_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have same length");

    let chunks = a.len() / SIMD_WIDTH;
    let mut sum = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * SIMD_WIDTH;
        let va = f32x8::from(&a[offset..offset + SIMD_WIDTH]);
        let vb = f32x8::from(&b[offset..offset + SIMD_WIDTH]);
        sum += (va - vb).abs();
    }

    let mut result = sum.reduce_add();
    for i in chunks * SIMD_WIDTH..a.len() {
        result += (a[i] - b[i]).abs();
    }
    result
}

/// Compute Chebyshev (L-infinity) distance using SIMD.
#[inline]
pub fn chebyshev_simd(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "Vectors must have same length");

    let chunks = a.len() / SIMD_WIDTH;
    let mut acc = f32x8::ZERO;

    for i in 0..chunks {
        let offset = i * SIMD_WIDTH;
        let va = f32x8::from(&a[offset..offset + SIMD_WIDTH]);
        let vb = f32x8::from(&b[offset..offset + SIMD_WIDTH]);
        acc = acc.max((va - vb).abs());
    }

    let lanes: [f32; 8] = acc.into();
    let mut result = lanes.iter().copied().fold(0.0f32, f32::max);
    for i in chunks * SIMD_WIDTH..a.len() {
        result = result.max((a[i] - b[i]).abs());
    }
    result
}
