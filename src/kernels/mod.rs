//! Local compute kernels shared by every decomposition.
//!
//! A decomposition hands each rank a [`Region`] of C. The kernels fill
//! exactly the cells of that region and leave every other cell untouched.
//!
//! Available kernels:
//! - `compute_region`: any region, against the full-size C
//! - `block_ikj`: a contiguous row shard, shard-relative indices

pub mod block_ikj;

use crate::matrix::{Dims, Element};

/// The part of C a rank owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Every row; columns `first, first + stride, first + 2*stride, ...`.
    StridedColumns { first: usize, stride: usize },
    /// Rows `[start, end)`, every column.
    RowRange { start: usize, end: usize },
}

impl Region {
    /// Owned cells in the order a rank computes and sends them.
    pub fn cells(&self, dims: Dims) -> Box<dyn Iterator<Item = (usize, usize)>> {
        match *self {
            Region::StridedColumns { first, stride } => Box::new(
                (0..dims.m).flat_map(move |i| (first..dims.k).step_by(stride).map(move |j| (i, j))),
            ),
            Region::RowRange { start, end } => {
                let end = end.min(dims.m);
                Box::new((start..end).flat_map(move |i| (0..dims.k).map(move |j| (i, j))))
            }
        }
    }

    pub fn len(&self, dims: Dims) -> usize {
        match *self {
            Region::StridedColumns { first, stride } => {
                let cols = if first >= dims.k {
                    0
                } else {
                    (dims.k - first).div_ceil(stride)
                };
                dims.m * cols
            }
            Region::RowRange { start, end } => end.min(dims.m).saturating_sub(start) * dims.k,
        }
    }

    pub fn is_empty(&self, dims: Dims) -> bool {
        self.len(dims) == 0
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        match *self {
            Region::StridedColumns { first, stride } => j >= first && (j - first) % stride == 0,
            Region::RowRange { start, end } => (start..end).contains(&i),
        }
    }
}

/// Fill the cells of `region` in the full-size C: `C[i][j] += Σ A[i][p]·B[p][j]`.
///
/// A, B and C are full size. Cells outside the region are not touched.
///
/// # Panics
///
/// Panics if the slice sizes don't match `dims`.
pub fn compute_region(a: &[Element], b: &[Element], c: &mut [Element], dims: Dims, region: &Region) {
    let Dims { m, n, k } = dims;
    assert_eq!(a.len(), m * n, "A: expected {}x{}={} elements", m, n, m * n);
    assert_eq!(b.len(), n * k, "B: expected {}x{}={} elements", n, k, n * k);
    assert_eq!(c.len(), m * k, "C: expected {}x{}={} elements", m, k, m * k);

    match *region {
        Region::StridedColumns { first, stride } => {
            for i in 0..m {
                for j in (first..k).step_by(stride) {
                    let mut acc = c[i * k + j];
                    for p in 0..n {
                        acc = acc.wrapping_add(a[i * n + p].wrapping_mul(b[p * k + j]));
                    }
                    c[i * k + j] = acc;
                }
            }
        }
        Region::RowRange { start, end } => {
            let end = end.min(m);
            if start >= end {
                return;
            }
            block_ikj::matmul_block_ikj(
                &a[start * n..end * n],
                b,
                &mut c[start * k..end * k],
                end - start,
                n,
                k,
            );
        }
    }
}
