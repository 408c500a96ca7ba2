//! Error type shared by every layer of the crate.
//!
//! All of these are job-fatal: nothing retries, nothing recovers locally.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MatmulError {
    #[error("Invalid dimensions: m={m}, n={n}, k={k} (all must be positive)")]
    InvalidDimensions { m: usize, n: usize, k: usize },

    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("Invalid world size {0}: need at least one rank")]
    InvalidWorldSize(usize),

    #[error("Rank {rank} is outside a world of {world_size} ranks")]
    InvalidTopology { rank: usize, world_size: usize },

    /// The job was sized for one world but handed a communicator for another.
    #[error("Job expects {expected} ranks but the communicator has {actual}")]
    WorldSizeMismatch { expected: usize, actual: usize },

    /// Row-block decomposition cannot give every rank a row.
    #[error("A matrix is too small: {rows} rows for {world_size} ranks")]
    TooFewRows { rows: usize, world_size: usize },

    /// Row-block decomposition would leave trailing rows unowned.
    #[error("{rows} rows do not divide evenly across {world_size} ranks ({remainder} left over)")]
    UnevenRows {
        rows: usize,
        world_size: usize,
        remainder: usize,
    },

    #[error("Could not start the transport: {0}")]
    TransportUnavailable(String),

    #[error("Transport error on rank {rank}: {message}")]
    Transport { rank: usize, message: String },

    /// Another rank failed first; this rank gave up waiting for it.
    #[error("Rank {rank} stopped: job aborted by another rank")]
    JobAborted { rank: usize },

    #[error("Failed to launch rank {rank}: {source}")]
    Launch {
        rank: usize,
        #[source]
        source: std::io::Error,
    },

    #[error("Rank {0} panicked")]
    RankPanicked(usize),
}

impl MatmulError {
    /// True for the configuration-infeasibility outcomes, which abort before
    /// any compute happens.
    pub fn is_infeasible(&self) -> bool {
        matches!(self, Self::TooFewRows { .. } | Self::UnevenRows { .. })
    }
}

pub type Result<T> = std::result::Result<T, MatmulError>;
