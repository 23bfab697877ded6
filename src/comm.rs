//! Collective operations between mesh partitions.
//!
//! Distributed assembly only ever needs all-gathers and barriers. [`SerialCommunicator`] is the
//! trivial single-partition case; [`ThreadCommunicator`] runs several partitions as threads of the
//! current process, which is how the distributed code paths are exercised without an external
//! message-passing runtime.
use crate::error::DistributedError;
use parking_lot::{Condvar, Mutex};
use std::panic::resume_unwind;
use std::sync::Arc;
use std::thread;

pub trait Communicator {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// Gathers one index per rank, ordered by rank, on every rank.
    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>, DistributedError> {
        let gathered = self.all_gather_indices(&[value])?;
        gathered
            .into_iter()
            .map(|values| match values.as_slice() {
                &[value] => Ok(value),
                other => Err(DistributedError::CollectiveSizeMismatch {
                    expected: 1,
                    actual: other.len(),
                }),
            })
            .collect()
    }

    /// Gathers a list of indices from every rank, ordered by rank, on every rank.
    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<Vec<usize>>, DistributedError>;

    /// Gathers a list of reals from every rank, ordered by rank, on every rank.
    fn all_gather_reals(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, DistributedError>;

    /// Blocks until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), DistributedError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<Vec<usize>>, DistributedError> {
        Ok(vec![local.to_vec()])
    }

    fn all_gather_reals(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, DistributedError> {
        Ok(vec![local.to_vec()])
    }

    fn barrier(&self) -> Result<(), DistributedError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Payload {
    Indices(Vec<usize>),
    Reals(Vec<f64>),
}

#[derive(Debug)]
struct GroupState {
    /// Ranks waiting at the current barrier.
    arrived: usize,
    /// Number of completed barriers.
    generation: usize,
    /// First rank that left the group.
    departed: Option<usize>,
    slots: Vec<Option<Payload>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<GroupState>,
    released: Condvar,
}

/// One rank of a group of partitions running on threads of the same process.
///
/// Dropping a communicator removes its rank from the group. Collectives the remaining ranks are
/// blocked in, or enter later, then fail with [`DistributedError::RankDeparted`] instead of waiting
/// forever. A rank that returns early with an error therefore releases its peers.
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    shared: Arc<Shared>,
}

impl ThreadCommunicator {
    /// Creates communicators for all ranks of a group of the given size.
    ///
    /// Every communicator must be driven by its own thread, since collectives block until all
    /// ranks have joined.
    pub fn create(size: usize) -> Vec<Self> {
        assert!(size > 0, "Communicator group must have at least one rank.");
        let shared = Arc::new(Shared {
            state: Mutex::new(GroupState {
                arrived: 0,
                generation: 0,
                departed: None,
                slots: vec![None; size],
            }),
            released: Condvar::new(),
        });
        (0..size)
            .map(|rank| Self {
                rank,
                size,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    /// Runs `f` once per rank on scoped threads and returns the results ordered by rank.
    ///
    /// Each communicator is dropped when its rank returns. A panic on any rank is propagated to
    /// the caller.
    pub fn run<R, F>(size: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(&ThreadCommunicator) -> R + Sync,
    {
        let communicators = Self::create(size);
        let f = &f;
        thread::scope(|scope| {
            let handles: Vec<_> = communicators
                .into_iter()
                .map(|comm| scope.spawn(move || f(&comm)))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap_or_else(|payload| resume_unwind(payload)))
                .collect()
        })
    }

    fn wait(&self) -> Result<(), DistributedError> {
        let mut state = self.shared.state.lock();
        if let Some(rank) = state.departed {
            return Err(DistributedError::RankDeparted { rank });
        }
        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.size {
            state.arrived = 0;
            state.generation += 1;
            self.shared.released.notify_all();
            return Ok(());
        }
        loop {
            self.shared.released.wait(&mut state);
            // A completed barrier takes precedence over a rank that left after passing it
            if state.generation != generation {
                return Ok(());
            }
            if let Some(rank) = state.departed {
                return Err(DistributedError::RankDeparted { rank });
            }
        }
    }

    fn exchange(&self, payload: Payload) -> Result<Vec<Payload>, DistributedError> {
        self.shared.state.lock().slots[self.rank] = Some(payload);
        self.wait()?;
        let gathered: Vec<_> = self.shared.state.lock().slots.iter().cloned().collect();
        // Nobody may overwrite a slot before every rank has read all of them
        self.wait()?;
        Ok(gathered.into_iter().flatten().collect())
    }

    fn check_len<T>(&self, gathered: Vec<T>) -> Result<Vec<T>, DistributedError> {
        if gathered.len() == self.size {
            Ok(gathered)
        } else {
            Err(DistributedError::CollectiveSizeMismatch {
                expected: self.size,
                actual: gathered.len(),
            })
        }
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_gather_indices(&self, local: &[usize]) -> Result<Vec<Vec<usize>>, DistributedError> {
        let gathered = self
            .exchange(Payload::Indices(local.to_vec()))?
            .into_iter()
            .enumerate()
            .map(|(rank, payload)| match payload {
                Payload::Indices(indices) => Ok(indices),
                Payload::Reals(_) => Err(DistributedError::CollectiveKindMismatch { rank }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.check_len(gathered)
    }

    fn all_gather_reals(&self, local: &[f64]) -> Result<Vec<Vec<f64>>, DistributedError> {
        let gathered = self
            .exchange(Payload::Reals(local.to_vec()))?
            .into_iter()
            .enumerate()
            .map(|(rank, payload)| match payload {
                Payload::Reals(reals) => Ok(reals),
                Payload::Indices(_) => Err(DistributedError::CollectiveKindMismatch { rank }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.check_len(gathered)
    }

    fn barrier(&self) -> Result<(), DistributedError> {
        self.wait()
    }
}

impl Drop for ThreadCommunicator {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.departed.get_or_insert(self.rank);
        self.shared.released.notify_all();
    }
}
