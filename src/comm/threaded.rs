//! In-process transport: one OS thread per rank.
//!
//! Every ordered pair of ranks has its own `mpsc` channel, so each rank
//! holds one receiver per source and one sender per destination. Matrices
//! are never shared between threads; they only move as message payloads.
//! Sends are buffered: they return once the message is queued.
//!
//! A rank that fails or panics aborts the job. Ranks blocked in `barrier`
//! or `receive` notice the abort and return [`MatmulError::JobAborted`]
//! instead of waiting forever.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use log::{debug, error};

use super::{Communicator, Payload, Tag, Topology};
use crate::error::{MatmulError, Result};

/// How often a blocked receive re-checks the abort flag.
const ABORT_POLL: Duration = Duration::from_millis(20);

struct Envelope {
    from: usize,
    tag: Tag,
    payload: Payload,
}

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    generation: u64,
}

/// State every rank of one job can see: the barrier and the abort flag.
struct JobControl {
    world_size: usize,
    barrier: Mutex<BarrierState>,
    released: Condvar,
    aborted: AtomicBool,
}

impl JobControl {
    fn new(world_size: usize) -> Self {
        Self {
            world_size,
            barrier: Mutex::new(BarrierState::default()),
            released: Condvar::new(),
            aborted: AtomicBool::new(false),
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        let _state = self.barrier.lock().unwrap_or_else(PoisonError::into_inner);
        self.released.notify_all();
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    fn wait(&self, rank: usize) -> Result<()> {
        let mut state = self.barrier.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_aborted() {
            return Err(MatmulError::JobAborted { rank });
        }

        state.arrived += 1;
        if state.arrived == self.world_size {
            state.arrived = 0;
            state.generation += 1;
            self.released.notify_all();
            return Ok(());
        }

        let generation = state.generation;
        while state.generation == generation {
            if self.is_aborted() {
                return Err(MatmulError::JobAborted { rank });
            }
            state = self.released.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }
}

/// One rank's endpoint.
pub struct ThreadComm {
    topology: Topology,
    /// `outboxes[d]` feeds rank `d`'s inbox for messages from this rank.
    outboxes: Vec<Sender<Envelope>>,
    /// `inboxes[s]` carries only messages sent by rank `s`, in send order.
    inboxes: Vec<Receiver<Envelope>>,
    /// Per source: messages pulled off the inbox before anyone asked for them.
    held: RefCell<Vec<VecDeque<Envelope>>>,
    control: Arc<JobControl>,
}

impl ThreadComm {
    /// Build the endpoints of a `world_size`-rank job, indexed by rank.
    ///
    /// Every ordered pair of ranks gets its own channel, so a receive from
    /// one source never has to look past another source's traffic.
    pub fn world(world_size: usize) -> Result<Vec<ThreadComm>> {
        if world_size == 0 {
            return Err(MatmulError::InvalidWorldSize(world_size));
        }

        let control = Arc::new(JobControl::new(world_size));
        let mut outboxes: Vec<Vec<Sender<Envelope>>> = (0..world_size).map(|_| Vec::with_capacity(world_size)).collect();
        let mut inboxes: Vec<Vec<Receiver<Envelope>>> = (0..world_size).map(|_| Vec::with_capacity(world_size)).collect();
        for source in 0..world_size {
            for dest in 0..world_size {
                let (tx, rx) = mpsc::channel();
                // Pushed in dest order for `source`, and in source order for `dest`.
                outboxes[source].push(tx);
                inboxes[dest].push(rx);
            }
        }

        outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| {
                Ok(ThreadComm {
                    topology: Topology::new(rank, world_size)?,
                    outboxes,
                    inboxes,
                    held: RefCell::new((0..world_size).map(|_| VecDeque::new()).collect()),
                    control: Arc::clone(&control),
                })
            })
            .collect()
    }

    /// Mark the whole job as failed. Every blocked rank wakes up with an error.
    pub fn abort(&self) {
        self.control.abort();
    }

    /// Messages received but not yet matched, across all sources.
    pub fn held_len(&self) -> usize {
        self.held.borrow().iter().map(VecDeque::len).sum()
    }

    fn take_held(&self, tag: Tag, from: usize) -> Option<Payload> {
        let mut held = self.held.borrow_mut();
        let queue = &mut held[from];
        let pos = queue.iter().position(|e| e.tag == tag)?;
        queue.remove(pos).map(|e| e.payload)
    }
}

impl Communicator for ThreadComm {
    fn topology(&self) -> Topology {
        self.topology
    }

    fn barrier(&self) -> Result<()> {
        self.control.wait(self.topology.rank)
    }

    fn send(&self, tag: Tag, payload: Payload, to: usize) -> Result<()> {
        let rank = self.topology.rank;
        let outbox = self.outboxes.get(to).ok_or_else(|| MatmulError::Transport {
            rank,
            message: format!("no rank {} in a world of {}", to, self.topology.world_size),
        })?;
        outbox
            .send(Envelope {
                from: rank,
                tag,
                payload,
            })
            .map_err(|_| MatmulError::Transport {
                rank,
                message: format!("rank {} is no longer receiving", to),
            })
    }

    fn receive(&self, tag: Tag, from: usize) -> Result<Payload> {
        let rank = self.topology.rank;
        let inbox = self.inboxes.get(from).ok_or_else(|| MatmulError::Transport {
            rank,
            message: format!("no rank {} in a world of {}", from, self.topology.world_size),
        })?;
        if let Some(payload) = self.take_held(tag, from) {
            return Ok(payload);
        }

        loop {
            match inbox.recv_timeout(ABORT_POLL) {
                Ok(envelope) if envelope.tag == tag => return Ok(envelope.payload),
                Ok(envelope) => self.held.borrow_mut()[envelope.from].push_back(envelope),
                Err(RecvTimeoutError::Timeout) => {
                    if self.control.is_aborted() {
                        return Err(MatmulError::JobAborted { rank });
                    }
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(MatmulError::Transport {
                        rank,
                        message: format!("rank {} hung up while {:?} was awaited", from, tag),
                    });
                }
            }
        }
    }
}

/// Aborts the job if the rank thread unwinds.
struct AbortOnPanic(Arc<JobControl>);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.abort();
        }
    }
}

/// Run `f` on `world_size` ranks, one named thread each, and return the
/// per-rank results in rank order.
///
/// All-or-nothing: if any rank fails, the job fails with the first root
/// cause (a rank's own error, ahead of the `JobAborted` errors it causes on
/// the others).
pub fn launch<T, F>(world_size: usize, f: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&ThreadComm) -> Result<T> + Sync,
{
    let comms = ThreadComm::world(world_size)?;
    let control = Arc::clone(&comms[0].control);
    let f = &f;

    let outcomes: Vec<Result<T>> = thread::scope(|scope| {
        let mut handles = Vec::with_capacity(world_size);
        for comm in comms {
            let rank = comm.topology.rank;
            let spawned = thread::Builder::new()
                .name(format!("rank-{}", rank))
                .spawn_scoped(scope, move || {
                    let _guard = AbortOnPanic(Arc::clone(&comm.control));
                    let out = f(&comm);
                    if let Err(e) = &out {
                        debug!("rank {} failed: {}", rank, e);
                        comm.abort();
                    }
                    out
                });
            match spawned {
                Ok(handle) => handles.push((rank, Some(handle))),
                Err(source) => {
                    control.abort();
                    handles.push((rank, None));
                    error!("could not start rank {}: {}", rank, source);
                    return handles_into_outcomes(handles, Some(MatmulError::Launch { rank, source }));
                }
            }
        }
        handles_into_outcomes(handles, None)
    });

    let mut results = Vec::with_capacity(world_size);
    let mut first_aborted = None;
    let mut root_cause = None;
    for outcome in outcomes {
        match outcome {
            Ok(v) => results.push(v),
            Err(e @ MatmulError::JobAborted { .. }) => {
                first_aborted.get_or_insert(e);
            }
            Err(e) => {
                root_cause.get_or_insert(e);
            }
        }
    }
    if let Some(e) = root_cause.or(first_aborted) {
        return Err(e);
    }
    Ok(results)
}

fn handles_into_outcomes<T>(
    handles: Vec<(usize, Option<thread::ScopedJoinHandle<'_, Result<T>>>)>,
    launch_error: Option<MatmulError>,
) -> Vec<Result<T>> {
    let mut outcomes: Vec<Result<T>> = handles
        .into_iter()
        .filter_map(|(rank, handle)| {
            let handle = handle?;
            Some(handle.join().unwrap_or(Err(MatmulError::RankPanicked(rank))))
        })
        .collect();
    if let Some(e) = launch_error {
        outcomes.push(Err(e));
    }
    outcomes
}
