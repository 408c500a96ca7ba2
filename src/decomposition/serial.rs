//! Serial baseline as a decomposition: the coordinator owns all of C.

use super::{Decomposition, dims_of};
use crate::comm::{Communicator, Topology};
use crate::error::Result;
use crate::kernels::Region;
use crate::matrix::{Dims, Matrix, multiply};

#[derive(Debug, Clone, Copy, Default)]
pub struct Serial;

impl Decomposition for Serial {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn validate(&self, _dims: Dims, _world_size: usize) -> Result<()> {
        Ok(())
    }

    fn owned_region(&self, topology: Topology, dims: Dims) -> Result<Region> {
        let end = if topology.is_coordinator() { dims.m } else { 0 };
        Ok(Region::RowRange { start: 0, end })
    }

    fn compute_and_assemble(&self, comm: &dyn Communicator, a: &Matrix, b: &Matrix) -> Result<Option<Matrix>> {
        dims_of(a, b)?;
        if !comm.topology().is_coordinator() {
            return Ok(None);
        }
        multiply(a, b).map(Some)
    }
}
