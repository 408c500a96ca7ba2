//! Contiguous row-block decomposition.
//!
//! With `rows_per_rank = m / world_size`, rank `r` owns rows
//! `[r * rows_per_rank, (r + 1) * rows_per_rank)` of A and C. The
//! coordinator scatters A's row blocks, every rank multiplies its block by
//! the full B, and the coordinator gathers the C blocks back in rank order.
//!
//! `m < world_size` is infeasible and aborts before any compute. When `m`
//! is not a multiple of `world_size`, the [`RemainderPolicy`] decides:
//! either reject the job, or hand the trailing rows to the last rank. Rows
//! are never dropped silently.

use clap::ValueEnum;
use log::{debug, warn};

use super::{Decomposition, dims_of};
use crate::comm::{COORDINATOR, Communicator, Topology};
use crate::error::{MatmulError, Result};
use crate::kernels::Region;
use crate::kernels::block_ikj::matmul_block_ikj;
use crate::matrix::{Dims, Matrix};

/// What to do with the `m % world_size` rows left after even division.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum RemainderPolicy {
    /// Fail with [`MatmulError::UnevenRows`].
    #[default]
    Reject,
    /// The last rank owns its block plus the leftover rows.
    LastRank,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RowBlock {
    pub remainder: RemainderPolicy,
}

impl RowBlock {
    pub fn new(remainder: RemainderPolicy) -> Self {
        Self { remainder }
    }

    /// Rows owned by each rank, indexed by rank.
    pub fn row_counts(&self, m: usize, world_size: usize) -> Result<Vec<usize>> {
        if world_size == 0 {
            return Err(MatmulError::InvalidWorldSize(world_size));
        }
        let rows_per_rank = m / world_size;
        if rows_per_rank == 0 {
            return Err(MatmulError::TooFewRows { rows: m, world_size });
        }

        let leftover = m % world_size;
        let mut counts = vec![rows_per_rank; world_size];
        if leftover > 0 {
            match self.remainder {
                RemainderPolicy::Reject => {
                    return Err(MatmulError::UnevenRows {
                        rows: m,
                        world_size,
                        remainder: leftover,
                    });
                }
                RemainderPolicy::LastRank => counts[world_size - 1] += leftover,
            }
        }
        Ok(counts)
    }
}

impl Decomposition for RowBlock {
    fn name(&self) -> &'static str {
        "row-block"
    }

    fn validate(&self, dims: Dims, world_size: usize) -> Result<()> {
        let counts = self.row_counts(dims.m, world_size)?;
        if counts[world_size - 1] != counts[0] {
            warn!(
                "{} rows over {} ranks: last rank takes {} extra",
                dims.m,
                world_size,
                counts[world_size - 1] - counts[0]
            );
        }
        Ok(())
    }

    fn owned_region(&self, topology: Topology, dims: Dims) -> Result<Region> {
        let counts = self.row_counts(dims.m, topology.world_size)?;
        let start = counts[0] * topology.rank;
        Ok(Region::RowRange {
            start,
            end: start + counts[topology.rank],
        })
    }

    fn compute_and_assemble(&self, comm: &dyn Communicator, a: &Matrix, b: &Matrix) -> Result<Option<Matrix>> {
        let dims = dims_of(a, b)?;
        let topology = comm.topology();
        let rows = self.row_counts(dims.m, topology.world_size)?;
        let a_counts: Vec<usize> = rows.iter().map(|r| r * dims.n).collect();

        let root_a = topology.is_coordinator().then(|| a.as_slice());
        let local_a = comm.scatter(root_a, &a_counts, COORDINATOR)?;

        let local_rows = rows[topology.rank];
        let mut local_c = vec![0; local_rows * dims.k];
        matmul_block_ikj(&local_a, b.as_slice(), &mut local_c, local_rows, dims.n, dims.k);
        debug!("rank {}: computed {} rows", topology.rank, local_rows);

        match comm.gather(&local_c, COORDINATOR)? {
            Some(full) => Matrix::from_vec(dims.m, dims.k, full).map(Some),
            None => Ok(None),
        }
    }
}
