//! Round-robin column decomposition.
//!
//! Rank `r` owns every column `j` with `j % world_size == r`, for all rows.
//! Every rank holds full copies of A and B, so no input is transferred.
//! Column counts differ by at most one across ranks whatever K is.
//!
//! Assembly is point-to-point, one message per element, tagged with the
//! element's flattened index `i * k + j`. That index is a bijection onto
//! `[0, m * k)`, so tags never collide.

use log::debug;

use super::{Decomposition, dims_of};
use crate::comm::{COORDINATOR, Communicator, Payload, Tag, Topology};
use crate::error::Result;
use crate::kernels::{Region, compute_region};
use crate::matrix::{Dims, Matrix};

#[derive(Debug, Clone, Copy, Default)]
pub struct RoundRobin;

impl RoundRobin {
    /// Number of columns `rank` owns: ⌈k/w⌉ or ⌊k/w⌋.
    pub fn column_count(rank: usize, k: usize, world_size: usize) -> usize {
        if rank >= k { 0 } else { (k - rank).div_ceil(world_size) }
    }
}

impl Decomposition for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    fn validate(&self, _dims: Dims, _world_size: usize) -> Result<()> {
        Ok(())
    }

    fn owned_region(&self, topology: Topology, _dims: Dims) -> Result<Region> {
        Ok(Region::StridedColumns {
            first: topology.rank,
            stride: topology.world_size,
        })
    }

    fn compute_and_assemble(&self, comm: &dyn Communicator, a: &Matrix, b: &Matrix) -> Result<Option<Matrix>> {
        let dims = dims_of(a, b)?;
        let topology = comm.topology();
        let region = self.owned_region(topology, dims)?;

        let mut c = Matrix::zeros(dims.m, dims.k);
        compute_region(a.as_slice(), b.as_slice(), c.as_mut_slice(), dims, &region);
        debug!(
            "rank {}: computed {} columns ({} cells)",
            topology.rank,
            Self::column_count(topology.rank, dims.k, topology.world_size),
            region.len(dims)
        );

        if !topology.is_coordinator() {
            for (i, j) in region.cells(dims) {
                let tag = Tag::Element(dims.flat_index(i, j));
                comm.send(tag, Payload::Elements(vec![c.get(i, j)]), COORDINATOR)?;
            }
            return Ok(None);
        }

        // Receive each worker's cells in the same order the worker sent them.
        for source in 0..topology.world_size {
            if source == COORDINATOR {
                continue;
            }
            let remote = self.owned_region(Topology::new(source, topology.world_size)?, dims)?;
            if remote.is_empty(dims) {
                continue;
            }
            for (i, j) in remote.cells(dims) {
                let value = comm.receive_element(Tag::Element(dims.flat_index(i, j)), source)?;
                c.set(i, j, value);
            }
            debug!("rank {}: assembled columns from rank {}", topology.rank, source);
        }
        Ok(Some(c))
    }
}
