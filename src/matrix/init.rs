//! Seeded input generation.
//!
//! Every rank builds its own copy of A and B from the same seed, so the
//! inputs agree across ranks without any communication.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{Dims, Matrix};

/// Values are drawn from `[0, VALUE_BOUND)`.
pub const VALUE_BOUND: i32 = 1000;

#[derive(Debug, Clone, Copy)]
pub struct MatrixInit {
    pub seed: u64,
}

impl MatrixInit {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Returns (A, B, C) with C zeroed.
    pub fn generate(&self, dims: Dims) -> (Matrix, Matrix, Matrix) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let a = random_matrix(&mut rng, dims.m, dims.n);
        let b = random_matrix(&mut rng, dims.n, dims.k);
        (a, b, Matrix::zeros(dims.m, dims.k))
    }
}

fn random_matrix(rng: &mut ChaCha8Rng, rows: usize, cols: usize) -> Matrix {
    let mut m = Matrix::zeros(rows, cols);
    for v in m.as_mut_slice() {
        *v = rng.gen_range(0..VALUE_BOUND);
    }
    m
}
