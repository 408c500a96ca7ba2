//! Distributed integer matrix multiplication, built from scratch.
//!
//! I built this to understand what actually makes a distributed GEMM hard.
//! Turns out it isn't the triple loop: it's deciding who owns which cells of
//! C, getting the pieces back to one place, and timing workers that start
//! and finish at different moments. This crate runs the same product three
//! ways and checks they agree bit for bit.
//!
//! ## Usage
//!
//! ```
//! use distmat::{Matrix, Strategy, multiply_distributed};
//!
//! let a = Matrix::from_rows(&[[1, 2], [3, 4], [5, 6], [7, 8]]);
//! let b = Matrix::from_rows(&[[1, 0, 1, 0], [0, 1, 0, 1]]);
//!
//! let c = multiply_distributed(&a, &b, 2, Strategy::RowBlock).unwrap();
//! assert_eq!(c.row(3), &[7, 8, 7, 8]);
//! ```
//!
//! For timings and per-rank samples, run a whole job:
//!
//! ```
//! use distmat::{Dims, JobConfig, Strategy, run_job};
//!
//! let dims = Dims::new(8, 6, 8).unwrap();
//! let config = JobConfig::new(dims, 4, Strategy::RoundRobin).unwrap();
//! let report = run_job(&config).unwrap();
//! assert!(report.stats.min <= report.stats.max);
//! ```
//!
//! ## What's inside
//!
//! - Serial i-j-k baseline and an i-k-j row-shard kernel
//! - Round-robin column decomposition with per-element tagged assembly
//! - Row-block decomposition with scatter/gather assembly
//! - A message-passing trait with an in-process, thread-per-rank transport,
//!   and an MPI transport behind the `mpi` feature
//! - Barrier-bounded phase timing reduced to min/max/average

pub mod comm;
pub mod decomposition;
pub mod error;
pub mod job;
pub mod kernels;
pub mod matrix;
pub mod report;
pub mod timing;

pub use decomposition::{RemainderPolicy, Strategy};
pub use error::{MatmulError, Result};
pub use job::{JobConfig, JobReport, run_job, run_job_with, run_on};
pub use matrix::naive_ijk::matmul_serial;
pub use matrix::{Dims, Element, Matrix, multiply};

/// C = A·B computed across `world_size` ranks with `strategy`.
///
/// Uneven row-block splits are rejected; use [`run_job_with`] and a
/// [`JobConfig`] with [`RemainderPolicy::LastRank`] to accept them.
pub fn multiply_distributed(a: &Matrix, b: &Matrix, world_size: usize, strategy: Strategy) -> Result<Matrix> {
    let dims = decomposition::dims_of(a, b)?;
    let config = JobConfig::new(dims, world_size, strategy)?;
    run_job_with(&config, a, b).map(|report| report.result)
}
