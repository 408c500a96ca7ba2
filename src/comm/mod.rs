//! Message passing between ranks.
//!
//! Ranks share no memory. Everything that crosses a rank boundary goes
//! through a [`Communicator`]: tagged point-to-point `send`/`receive`, a
//! barrier, and a handful of collectives built on top of those two.
//!
//! The collectives are provided methods, so a transport only has to move
//! tagged messages. [`threaded::ThreadComm`] is the in-process transport.
//! With the `mpi` feature, `mpi_comm::MpiComm` runs one rank per MPI
//! process and maps the collectives onto MPI's own.

#[cfg(feature = "mpi")]
pub mod mpi_comm;
pub mod threaded;

#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use threaded::{ThreadComm, launch};

use crate::error::{MatmulError, Result};
use crate::matrix::Element;

/// Rank that owns the assembled result and the timing statistics.
pub const COORDINATOR: usize = 0;

/// Where this worker sits in the fixed process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    pub rank: usize,
    pub world_size: usize,
}

impl Topology {
    pub fn new(rank: usize, world_size: usize) -> Result<Self> {
        if world_size == 0 {
            return Err(MatmulError::InvalidWorldSize(world_size));
        }
        if rank >= world_size {
            return Err(MatmulError::InvalidTopology { rank, world_size });
        }
        Ok(Self { rank, world_size })
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank == COORDINATOR
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceOp {
    Min,
    Max,
    Sum,
}

impl ReduceOp {
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            ReduceOp::Min => lhs.min(rhs),
            ReduceOp::Max => lhs.max(rhs),
            ReduceOp::Sum => lhs + rhs,
        }
    }
}

/// Message tag. Collectives use their own variants so they can never match
/// a point-to-point element message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// A single element of C, tagged with its flattened index `i * k + j`.
    Element(u64),
    Scatter,
    Gather,
    Reduce(ReduceOp),
    Samples,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Elements(Vec<Element>),
    Samples(Vec<f64>),
}

impl Payload {
    pub fn into_elements(self, rank: usize) -> Result<Vec<Element>> {
        match self {
            Payload::Elements(v) => Ok(v),
            Payload::Samples(_) => Err(MatmulError::Transport {
                rank,
                message: "expected matrix elements, got timing samples".into(),
            }),
        }
    }

    pub fn into_samples(self, rank: usize) -> Result<Vec<f64>> {
        match self {
            Payload::Samples(v) => Ok(v),
            Payload::Elements(_) => Err(MatmulError::Transport {
                rank,
                message: "expected timing samples, got matrix elements".into(),
            }),
        }
    }
}

pub trait Communicator {
    fn topology(&self) -> Topology;

    /// Block until every rank has called `barrier`.
    fn barrier(&self) -> Result<()>;

    fn send(&self, tag: Tag, payload: Payload, to: usize) -> Result<()>;

    /// Block until the message with `tag` from `from` arrives.
    ///
    /// Messages from `from` are matched in the order `from` sent them.
    fn receive(&self, tag: Tag, from: usize) -> Result<Payload>;

    fn rank(&self) -> usize {
        self.topology().rank
    }

    fn world_size(&self) -> usize {
        self.topology().world_size
    }

    /// Receive exactly one element.
    fn receive_element(&self, tag: Tag, from: usize) -> Result<Element> {
        let rank = self.rank();
        let values = self.receive(tag, from)?.into_elements(rank)?;
        match values.as_slice() {
            [v] => Ok(*v),
            _ => Err(MatmulError::Transport {
                rank,
                message: format!("expected one element from rank {}, got {}", from, values.len()),
            }),
        }
    }

    /// Split `full` into consecutive pieces of `counts[r]` elements and
    /// deliver piece `r` to rank `r`. Only `root` supplies `full`.
    fn scatter(&self, full: Option<&[Element]>, counts: &[usize], root: usize) -> Result<Vec<Element>> {
        let Topology { rank, world_size } = self.topology();
        check_counts(rank, counts, world_size)?;

        if rank != root {
            let local = self.receive(Tag::Scatter, root)?.into_elements(rank)?;
            if local.len() != counts[rank] {
                return Err(MatmulError::Transport {
                    rank,
                    message: format!("scatter delivered {} elements, expected {}", local.len(), counts[rank]),
                });
            }
            return Ok(local);
        }

        let full = full.ok_or_else(|| MatmulError::Transport {
            rank,
            message: "scatter root has no send buffer".into(),
        })?;
        let total: usize = counts.iter().sum();
        if full.len() < total {
            return Err(MatmulError::Transport {
                rank,
                message: format!("scatter needs {} elements, root holds {}", total, full.len()),
            });
        }

        let mut own = Vec::new();
        let mut offset = 0;
        for (dest, &count) in counts.iter().enumerate() {
            let piece = &full[offset..offset + count];
            if dest == root {
                own = piece.to_vec();
            } else {
                self.send(Tag::Scatter, Payload::Elements(piece.to_vec()), dest)?;
            }
            offset += count;
        }
        Ok(own)
    }

    /// Concatenate every rank's `local` in rank order on `root`.
    fn gather(&self, local: &[Element], root: usize) -> Result<Option<Vec<Element>>> {
        let Topology { rank, world_size } = self.topology();
        if rank != root {
            self.send(Tag::Gather, Payload::Elements(local.to_vec()), root)?;
            return Ok(None);
        }

        let mut out = Vec::with_capacity(local.len() * world_size);
        for source in 0..world_size {
            if source == root {
                out.extend_from_slice(local);
            } else {
                out.extend(self.receive(Tag::Gather, source)?.into_elements(rank)?);
            }
        }
        Ok(Some(out))
    }

    /// Fold every rank's `value` with `op` on `root`, in rank order.
    fn reduce(&self, value: f64, op: ReduceOp, root: usize) -> Result<Option<f64>> {
        let Topology { rank, world_size } = self.topology();
        if rank != root {
            self.send(Tag::Reduce(op), Payload::Samples(vec![value]), root)?;
            return Ok(None);
        }

        let mut acc: Option<f64> = None;
        for source in 0..world_size {
            let v = if source == root {
                value
            } else {
                single_sample(rank, source, self.receive(Tag::Reduce(op), source)?)?
            };
            acc = Some(acc.map_or(v, |a| op.apply(a, v)));
        }
        Ok(acc)
    }

    /// Collect every rank's raw `value` on `root`, indexed by rank.
    fn gather_samples(&self, value: f64, root: usize) -> Result<Option<Vec<f64>>> {
        let Topology { rank, world_size } = self.topology();
        if rank != root {
            self.send(Tag::Samples, Payload::Samples(vec![value]), root)?;
            return Ok(None);
        }

        let mut out = Vec::with_capacity(world_size);
        for source in 0..world_size {
            if source == root {
                out.push(value);
            } else {
                out.push(single_sample(rank, source, self.receive(Tag::Samples, source)?)?);
            }
        }
        Ok(Some(out))
    }
}

fn check_counts(rank: usize, counts: &[usize], world_size: usize) -> Result<()> {
    if counts.len() != world_size {
        return Err(MatmulError::Transport {
            rank,
            message: format!("{} counts for {} ranks", counts.len(), world_size),
        });
    }
    Ok(())
}

fn single_sample(rank: usize, from: usize, payload: Payload) -> Result<f64> {
    let values = payload.into_samples(rank)?;
    match values.as_slice() {
        [v] => Ok(*v),
        _ => Err(MatmulError::Transport {
            rank,
            message: format!("expected one sample from rank {}, got {}", from, values.len()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topology_rejects_out_of_range_rank() {
        assert!(matches!(
            Topology::new(2, 2),
            Err(MatmulError::InvalidTopology {
                rank: 2,
                world_size: 2
            })
        ));
        assert!(matches!(Topology::new(0, 0), Err(MatmulError::InvalidWorldSize(0))));
        assert!(Topology::new(0, 1).unwrap().is_coordinator());
        assert!(!Topology::new(1, 3).unwrap().is_coordinator());
    }

    #[test]
    fn reduce_ops() {
        assert_eq!(ReduceOp::Min.apply(1.0, 2.0), 1.0);
        assert_eq!(ReduceOp::Max.apply(1.0, 2.0), 2.0);
        assert_eq!(ReduceOp::Sum.apply(1.0, 2.0), 3.0);
    }

    #[test]
    fn payload_kind_is_checked() {
        assert!(Payload::Samples(vec![1.0]).into_elements(0).is_err());
        assert!(Payload::Elements(vec![1]).into_samples(0).is_err());
        assert_eq!(Payload::Elements(vec![1, 2]).into_elements(0).unwrap(), vec![1, 2]);
    }
}
