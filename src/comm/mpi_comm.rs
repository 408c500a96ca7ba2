//! MPI transport: one rank per process, started by `mpirun`.
//!
//! Point-to-point messages map onto tagged `MPI_Send`/`MPI_Recv`. The
//! collectives skip the provided point-to-point versions and call MPI's own
//! (`MPI_Scatterv`, `MPI_Gatherv`, `MPI_Reduce`, `MPI_Gather`).
//!
//! Element tags are `ELEMENT_BASE + i * k + j`. MPI only promises tags up to
//! 32767; larger ones work where the library's `MPI_TAG_UB` allows, and a
//! tag past `i32::MAX` is refused before anything is sent.

use ::mpi::Count;
use ::mpi::collective::SystemOperation;
use ::mpi::datatype::{Partition, PartitionMut};
use ::mpi::environment::Universe;
use ::mpi::topology::SimpleCommunicator;
use ::mpi::traits::{Communicator as _, CommunicatorCollectives as _, Destination as _, Root as _, Source as _};
use log::debug;

use super::{Communicator, Payload, ReduceOp, Tag, Topology, check_counts};
use crate::error::{MatmulError, Result};
use crate::matrix::Element;

const SCATTER_TAG: i32 = 1;
const GATHER_TAG: i32 = 2;
const REDUCE_MIN_TAG: i32 = 3;
const REDUCE_MAX_TAG: i32 = 4;
const REDUCE_SUM_TAG: i32 = 5;
const SAMPLES_TAG: i32 = 6;
/// First tag used for element messages; everything below is reserved.
const ELEMENT_BASE: i32 = 16;

pub struct MpiComm {
    // Declared before `_universe` so it is dropped before MPI is finalized.
    world: SimpleCommunicator,
    topology: Topology,
    _universe: Universe,
}

impl MpiComm {
    /// Initialise MPI and join `MPI_COMM_WORLD`. Fails if MPI was already
    /// initialised in this process.
    pub fn init() -> Result<Self> {
        let universe = ::mpi::initialize()
            .ok_or_else(|| MatmulError::TransportUnavailable("MPI is already initialised".into()))?;
        let world = universe.world();
        let rank = usize::try_from(world.rank())
            .map_err(|_| MatmulError::TransportUnavailable(format!("negative rank {}", world.rank())))?;
        let world_size = usize::try_from(world.size())
            .map_err(|_| MatmulError::TransportUnavailable(format!("negative world size {}", world.size())))?;
        let topology = Topology::new(rank, world_size)?;
        debug!("rank {}: joined MPI world of {}", rank, world_size);

        Ok(Self {
            world,
            topology,
            _universe: universe,
        })
    }

    fn peer(&self, rank: usize) -> Result<i32> {
        if rank >= self.topology.world_size {
            return Err(MatmulError::Transport {
                rank: self.topology.rank,
                message: format!("no rank {} in a world of {}", rank, self.topology.world_size),
            });
        }
        to_count(self.topology.rank, rank)
    }
}

/// The MPI tag carrying `tag`.
fn wire_tag(rank: usize, tag: Tag) -> Result<i32> {
    Ok(match tag {
        Tag::Scatter => SCATTER_TAG,
        Tag::Gather => GATHER_TAG,
        Tag::Reduce(ReduceOp::Min) => REDUCE_MIN_TAG,
        Tag::Reduce(ReduceOp::Max) => REDUCE_MAX_TAG,
        Tag::Reduce(ReduceOp::Sum) => REDUCE_SUM_TAG,
        Tag::Samples => SAMPLES_TAG,
        Tag::Element(idx) => i32::try_from(idx)
            .ok()
            .and_then(|idx| idx.checked_add(ELEMENT_BASE))
            .ok_or_else(|| MatmulError::Transport {
                rank,
                message: format!("element index {} does not fit in an MPI tag", idx),
            })?,
    })
}

/// Reduce and sample messages carry `f64`; everything else carries elements.
fn carries_samples(tag: Tag) -> bool {
    matches!(tag, Tag::Reduce(_) | Tag::Samples)
}

fn to_count(rank: usize, n: usize) -> Result<Count> {
    Count::try_from(n).map_err(|_| MatmulError::Transport {
        rank,
        message: format!("{} does not fit in an MPI count", n),
    })
}

/// MPI counts and displacements for consecutive pieces of `counts[r]` elements.
fn partition(rank: usize, counts: &[usize]) -> Result<(Vec<Count>, Vec<Count>)> {
    let mut wire_counts = Vec::with_capacity(counts.len());
    let mut displs = Vec::with_capacity(counts.len());
    let mut offset = 0;
    for &count in counts {
        wire_counts.push(to_count(rank, count)?);
        displs.push(to_count(rank, offset)?);
        offset += count;
    }
    Ok((wire_counts, displs))
}

fn system_op(op: ReduceOp) -> SystemOperation {
    match op {
        ReduceOp::Min => SystemOperation::min(),
        ReduceOp::Max => SystemOperation::max(),
        ReduceOp::Sum => SystemOperation::sum(),
    }
}

impl Communicator for MpiComm {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn barrier(&self) -> Result<()> {
        self.world.barrier();
        Ok(())
    }

    fn send(&self, tag: Tag, payload: Payload, to: usize) -> Result<()> {
        let rank = self.topology.rank;
        let dest = self.world.process_at_rank(self.peer(to)?);
        let wire = wire_tag(rank, tag)?;
        match (payload, carries_samples(tag)) {
            (Payload::Elements(v), false) => dest.send_with_tag(&v[..], wire),
            (Payload::Samples(v), true) => dest.send_with_tag(&v[..], wire),
            (_, _) => {
                return Err(MatmulError::Transport {
                    rank,
                    message: format!("payload kind does not match {:?}", tag),
                });
            }
        }
        Ok(())
    }

    fn receive(&self, tag: Tag, from: usize) -> Result<Payload> {
        let rank = self.topology.rank;
        let source = self.world.process_at_rank(self.peer(from)?);
        let wire = wire_tag(rank, tag)?;
        Ok(if carries_samples(tag) {
            Payload::Samples(source.receive_vec_with_tag::<f64>(wire).0)
        } else {
            Payload::Elements(source.receive_vec_with_tag::<Element>(wire).0)
        })
    }

    fn scatter(&self, full: Option<&[Element]>, counts: &[usize], root: usize) -> Result<Vec<Element>> {
        let Topology { rank, world_size } = self.topology;
        check_counts(rank, counts, world_size)?;
        let root_process = self.world.process_at_rank(self.peer(root)?);
        let mut local = vec![0; counts[rank]];

        if rank != root {
            root_process.scatter_varcount_into(&mut local[..]);
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
        let (wire_counts, displs) = partition(rank, counts)?;
        let pieces = Partition::new(&full[..total], &wire_counts[..], &displs[..]);
        root_process.scatter_varcount_into_root(&pieces, &mut local[..]);
        Ok(local)
    }

    fn gather(&self, local: &[Element], root: usize) -> Result<Option<Vec<Element>>> {
        let Topology { rank, world_size } = self.topology;
        let root_process = self.world.process_at_rank(self.peer(root)?);
        let len = to_count(rank, local.len())?;

        if rank != root {
            root_process.gather_into(&len);
            root_process.gather_varcount_into(local);
            return Ok(None);
        }

        // Shards may differ in size, so the root learns every length first.
        let mut lens: Vec<Count> = vec![0; world_size];
        root_process.gather_into_root(&len, &mut lens[..]);
        let sizes: Vec<usize> = lens.iter().map(|&n| n.max(0) as usize).collect();
        let (wire_counts, displs) = partition(rank, &sizes)?;

        let mut out = vec![0; sizes.iter().sum()];
        {
            let mut pieces = PartitionMut::new(&mut out[..], &wire_counts[..], &displs[..]);
            root_process.gather_varcount_into_root(local, &mut pieces);
        }
        Ok(Some(out))
    }

    fn reduce(&self, value: f64, op: ReduceOp, root: usize) -> Result<Option<f64>> {
        let root_process = self.world.process_at_rank(self.peer(root)?);
        if self.topology.rank != root {
            root_process.reduce_into(&value, system_op(op));
            return Ok(None);
        }

        let mut out = 0.0;
        root_process.reduce_into_root(&value, &mut out, system_op(op));
        Ok(Some(out))
    }

    fn gather_samples(&self, value: f64, root: usize) -> Result<Option<Vec<f64>>> {
        let root_process = self.world.process_at_rank(self.peer(root)?);
        if self.topology.rank != root {
            root_process.gather_into(&value);
            return Ok(None);
        }

        let mut out = vec![0.0; self.topology.world_size];
        root_process.gather_into_root(&value, &mut out[..]);
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collective_tags_sit_below_element_tags() {
        let reserved = [
            Tag::Scatter,
            Tag::Gather,
            Tag::Reduce(ReduceOp::Min),
            Tag::Reduce(ReduceOp::Max),
            Tag::Reduce(ReduceOp::Sum),
            Tag::Samples,
        ];
        let mut wire: Vec<i32> = reserved.iter().map(|&t| wire_tag(0, t).unwrap()).collect();
        assert!(wire.iter().all(|&t| t > 0 && t < ELEMENT_BASE));
        wire.dedup();
        assert_eq!(wire.len(), reserved.len());
        assert_eq!(wire_tag(0, Tag::Element(0)).unwrap(), ELEMENT_BASE);
    }

    #[test]
    fn oversized_element_index_is_refused() {
        let too_big = (i32::MAX - ELEMENT_BASE) as u64 + 1;
        assert!(wire_tag(0, Tag::Element(too_big - 1)).is_ok());
        assert!(matches!(
            wire_tag(3, Tag::Element(too_big)),
            Err(MatmulError::Transport { rank: 3, .. })
        ));
    }

    #[test]
    fn partition_offsets_are_running_sums() {
        let (counts, displs) = partition(0, &[3, 6, 0, 3]).unwrap();
        assert_eq!(counts, vec![3, 6, 0, 3]);
        assert_eq!(displs, vec![0, 3, 9, 9]);
    }
}
