//! Background snapshot computations.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc, Arc,
    },
    thread::{self, JoinHandle},
};

use route_replay_core::{AgentId, Epoch, Generation, Snapshot, Timestamp};
use route_replay_system_resolver::Resolver;
use route_replay_world::World;
use tracing::warn;

use crate::compute_snapshot_until;

/// Parameters of a single snapshot query.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotRequest {
    /// Generation assigned to the query when it was issued.
    pub generation: Generation,
    /// Absolute query time.
    pub time: Timestamp,
    /// Epoch used to convert the query time into hours.
    pub epoch: Epoch,
    /// Agents whose positions are requested, in ascending order.
    pub agents: Vec<AgentId>,
}

/// Result of a completed snapshot query.
#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotOutcome {
    /// Generation of the query that produced the result.
    pub generation: Generation,
    /// Absolute query time.
    pub time: Timestamp,
    /// Agents that were requested, in ascending order.
    pub agents: Vec<AgentId>,
    /// Positions resolved for the requested agents.
    pub snapshot: Snapshot,
}

/// State of a background computation observed by [`SnapshotTask::try_take`].
#[derive(Debug)]
pub enum TaskPoll {
    /// The computation is still running.
    Pending,
    /// The computation finished and produced a result.
    Ready(SnapshotOutcome),
    /// The computation stopped without a result, usually after cancellation.
    Abandoned,
}

/// Handle to a snapshot computation running off the control loop.
///
/// Cancellation is advisory: the worker checks the flag between agents and
/// stops early when it is set. A result that still arrives after cancellation
/// is left for the caller to discard.
#[derive(Debug)]
pub struct SnapshotTask {
    generation: Generation,
    cancel: Arc<AtomicBool>,
    receiver: mpsc::Receiver<SnapshotOutcome>,
    handle: Option<JoinHandle<()>>,
}

impl SnapshotTask {
    /// Starts computing the requested snapshot on a background thread.
    ///
    /// If the thread cannot be spawned the snapshot is computed inline so the
    /// caller still observes a result.
    #[must_use]
    pub fn spawn(world: Arc<World>, resolver: Resolver, request: SnapshotRequest) -> Self {
        let generation = request.generation;
        let cancel = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel();

        let worker_cancel = Arc::clone(&cancel);
        let worker_world = Arc::clone(&world);
        let worker_sender = sender.clone();
        let worker_request = request.clone();
        let spawned = thread::Builder::new()
            .name(format!("snapshot-{}", generation.get()))
            .spawn(move || {
                run(
                    &worker_world,
                    &resolver,
                    worker_request,
                    &worker_cancel,
                    &worker_sender,
                );
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!(
                    generation = generation.get(),
                    %error,
                    "snapshot thread unavailable, computing inline"
                );
                run(&world, &resolver, request, &cancel, &sender);
                None
            }
        };

        Self {
            generation,
            cancel,
            receiver,
            handle,
        }
    }

    /// Generation of the query this task computes.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Asks the worker to stop early.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Reports whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Checks for a result without blocking.
    pub fn try_take(&mut self) -> TaskPoll {
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.reap();
                TaskPoll::Ready(outcome)
            }
            Err(mpsc::TryRecvError::Empty) => TaskPoll::Pending,
            Err(mpsc::TryRecvError::Disconnected) => {
                self.reap();
                TaskPoll::Abandoned
            }
        }
    }

    /// Blocks until the computation finishes.
    pub fn wait(mut self) -> Option<SnapshotOutcome> {
        let outcome = self.receiver.recv().ok();
        self.reap();
        outcome
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!(generation = self.generation.get(), "snapshot worker panicked");
            }
        }
    }
}

fn run(
    world: &World,
    resolver: &Resolver,
    request: SnapshotRequest,
    cancel: &AtomicBool,
    sender: &mpsc::Sender<SnapshotOutcome>,
) {
    let Some(snapshot) = compute_snapshot_until(
        world,
        resolver,
        request.epoch,
        request.time,
        request.agents.iter().copied(),
        cancel,
    ) else {
        return;
    };

    // The receiver is gone once the control loop dropped the task.
    let _ = sender.send(SnapshotOutcome {
        generation: request.generation,
        time: request.time,
        agents: request.agents,
        snapshot,
    });
}

#[cfg(test)]
mod tests {
    use route_replay_core::{Coordinate, Hour, LocationId};
    use route_replay_world::{self as world, ObservationRecord};

    use super::*;

    fn request(generation: u64) -> SnapshotRequest {
        let epoch = Epoch::default();
        SnapshotRequest {
            generation: Generation::new(generation),
            time: epoch.timestamp_at(Hour::new(1.0)),
            epoch,
            agents: vec![AgentId::new(1), AgentId::new(2)],
        }
    }

    fn small_world() -> Arc<World> {
        Arc::new(world::load(
            vec![ObservationRecord::new(
                Hour::new(0.0),
                AgentId::new(1),
                LocationId::new("depot"),
            )],
            vec![(LocationId::new("depot"), Coordinate::new(1.0, 2.0))],
        ))
    }

    #[test]
    fn finished_task_reports_its_outcome() {
        let task = SnapshotTask::spawn(small_world(), Resolver::default(), request(3));
        assert_eq!(task.generation(), Generation::new(3));
        assert!(!task.is_cancelled());

        let outcome = task.wait().expect("uncancelled task produces a result");
        assert_eq!(outcome.generation, Generation::new(3));
        assert_eq!(outcome.snapshot.len(), 1);
        assert_eq!(
            outcome.snapshot.position(AgentId::new(1)),
            Some(Coordinate::new(1.0, 2.0))
        );
    }

    #[test]
    fn cancelled_task_never_reports_a_foreign_generation() {
        let task = SnapshotTask::spawn(small_world(), Resolver::default(), request(5));
        task.cancel();
        assert!(task.is_cancelled());

        if let Some(outcome) = task.wait() {
            assert_eq!(outcome.generation, Generation::new(5));
        }
    }
}
