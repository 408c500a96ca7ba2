//! Work decomposition and result assembly.
//!
//! A [`Decomposition`] decides which cells of C each rank owns, fills them
//! with the shared kernels, and moves the pieces back to the coordinator.
//! Every cell of C is owned by exactly one rank, so the assembled matrix is
//! bit-identical to the serial baseline.
//!
//! Available strategies:
//! - `serial`: the coordinator computes everything, other ranks idle
//! - `round_robin`: column `j` belongs to rank `j % world_size`
//! - `row_block`: contiguous row slabs, scattered and gathered in bulk

pub mod round_robin;
pub mod row_block;
pub mod serial;

use std::fmt;

use clap::ValueEnum;

use crate::comm::{Communicator, Topology};
use crate::error::{MatmulError, Result};
use crate::kernels::Region;
use crate::matrix::{Dims, Matrix};

pub use round_robin::RoundRobin;
pub use row_block::{RemainderPolicy, RowBlock};
pub use serial::Serial;

pub trait Decomposition: Send + Sync {
    fn name(&self) -> &'static str;

    /// Reject shapes this strategy cannot split across `world_size` ranks.
    /// Runs before any compute.
    fn validate(&self, dims: Dims, world_size: usize) -> Result<()>;

    /// The cells of C that `topology.rank` computes.
    fn owned_region(&self, topology: Topology, dims: Dims) -> Result<Region>;

    /// Compute this rank's region and take part in assembling C.
    ///
    /// Every rank must call this together. Returns the full C on the
    /// coordinator and `None` everywhere else.
    fn compute_and_assemble(&self, comm: &dyn Communicator, a: &Matrix, b: &Matrix) -> Result<Option<Matrix>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Strategy {
    Serial,
    RoundRobin,
    RowBlock,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::Serial, Strategy::RoundRobin, Strategy::RowBlock];

    pub fn build(self, remainder: RemainderPolicy) -> Box<dyn Decomposition> {
        match self {
            Strategy::Serial => Box::new(Serial),
            Strategy::RoundRobin => Box::new(RoundRobin),
            Strategy::RowBlock => Box::new(RowBlock::new(remainder)),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Strategy::Serial => "serial",
            Strategy::RoundRobin => "round-robin",
            Strategy::RowBlock => "row-block",
        };
        f.pad(name)
    }
}

/// Shape of the product A·B, or an error if the inner dimensions disagree.
pub fn dims_of(a: &Matrix, b: &Matrix) -> Result<Dims> {
    if a.cols() != b.rows() {
        return Err(MatmulError::ShapeMismatch(format!(
            "A is {}x{} but B is {}x{}",
            a.rows(),
            a.cols(),
            b.rows(),
            b.cols()
        )));
    }
    Dims::new(a.rows(), a.cols(), b.cols())
}
