#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Batch coordinator that turns agent selections into position snapshots.
//!
//! [`compute_snapshot`] is the pure unit of work: it resolves every selected
//! agent at one query time. [`Coordinator`] is the control-loop session that
//! routes queries through the [`QueryCache`], offloads misses to a
//! [`SnapshotTask`], and publishes results strictly in issue order. Each
//! issued query receives a new [`Generation`]; a finished computation whose
//! generation is not the latest is discarded instead of committed.

pub mod config;
mod task;

use std::{
    collections::BTreeSet,
    mem,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use route_replay_core::{
    AgentId, Command, Coordinate, Epoch, Event, Generation, Snapshot, Timestamp,
};
use route_replay_system_query_cache::QueryCache;
use route_replay_system_resolver::Resolver;
use route_replay_world::{self as world, World};
use tracing::{debug, info};

pub use self::{
    config::{ConfigError, EngineConfig},
    task::{SnapshotOutcome, SnapshotRequest, SnapshotTask, TaskPoll},
};

/// Resolves the selected agents at `time`.
///
/// Agents without a resolvable position, including agents absent from the
/// world, are omitted from the result.
#[must_use]
pub fn compute_snapshot(
    world: &World,
    resolver: &Resolver,
    epoch: Epoch,
    time: Timestamp,
    selected: impl IntoIterator<Item = AgentId>,
) -> Snapshot {
    let never = AtomicBool::new(false);
    compute_snapshot_until(world, resolver, epoch, time, selected, &never).unwrap_or_default()
}

/// Resolves the selected agents, stopping early once `cancel` is set.
///
/// Returns `None` when the computation was cancelled.
pub(crate) fn compute_snapshot_until(
    world: &World,
    resolver: &Resolver,
    epoch: Epoch,
    time: Timestamp,
    selected: impl IntoIterator<Item = AgentId>,
    cancel: &AtomicBool,
) -> Option<Snapshot> {
    let mut positions = std::collections::BTreeMap::new();
    for agent in selected {
        if cancel.load(Ordering::Relaxed) {
            return None;
        }
        if let Some(coordinate) = resolver.resolve_agent(world, agent, time, epoch) {
            let _ = positions.insert(agent, coordinate);
        }
    }
    Some(Snapshot::from_positions(positions))
}

/// Configuration parameters required to construct the coordinator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Config {
    resolver: route_replay_system_resolver::Config,
    cache: route_replay_system_query_cache::Config,
    epoch: Epoch,
}

impl Config {
    /// Creates a configuration from the resolver, cache and epoch settings.
    #[must_use]
    pub const fn new(
        resolver: route_replay_system_resolver::Config,
        cache: route_replay_system_query_cache::Config,
        epoch: Epoch,
    ) -> Self {
        Self {
            resolver,
            cache,
            epoch,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            route_replay_system_resolver::Config::default(),
            route_replay_system_query_cache::Config::default(),
            Epoch::default(),
        )
    }
}

/// How a call to [`Coordinator::request`] was answered.
#[derive(Clone, Debug, PartialEq)]
pub enum Requested {
    /// The cache answered and the snapshot was published immediately.
    Cached(Generation),
    /// A background computation was started.
    Issued(Generation),
}

impl Requested {
    /// Generation assigned to the query.
    #[must_use]
    pub fn generation(&self) -> Generation {
        match self {
            Self::Cached(generation) | Self::Issued(generation) => *generation,
        }
    }
}

/// Most recent snapshot handed to collaborators.
#[derive(Clone, Debug, PartialEq)]
pub struct Published {
    /// Generation of the query that produced the snapshot.
    pub generation: Generation,
    /// Query time of the snapshot.
    pub time: Timestamp,
    /// Resolved positions.
    pub snapshot: Arc<Snapshot>,
}

/// Control-loop session that owns the world, the cache and in-flight work.
#[derive(Debug)]
pub struct Coordinator {
    world: Arc<World>,
    resolver: Resolver,
    epoch: Epoch,
    cache: QueryCache<Snapshot>,
    selection: BTreeSet<AgentId>,
    latest: Generation,
    in_flight: Option<SnapshotTask>,
    superseded: Vec<SnapshotTask>,
    published: Option<Published>,
}

impl Coordinator {
    /// Creates a coordinator over `world` with an empty selection.
    #[must_use]
    pub fn new(world: World, config: Config) -> Self {
        Self {
            world: Arc::new(world),
            resolver: Resolver::new(config.resolver),
            epoch: config.epoch,
            cache: QueryCache::new(config.cache),
            selection: BTreeSet::new(),
            latest: Generation::default(),
            in_flight: None,
            superseded: Vec::new(),
            published: None,
        }
    }

    /// Read-only access to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Epoch used to convert query times into hours.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Agents currently selected for snapshots.
    #[must_use]
    pub fn selection(&self) -> &BTreeSet<AgentId> {
        &self.selection
    }

    /// Generation of the most recently issued query.
    #[must_use]
    pub fn latest_generation(&self) -> Generation {
        self.latest
    }

    /// Generation of the computation currently running, if any.
    #[must_use]
    pub fn in_flight(&self) -> Option<Generation> {
        self.in_flight.as_ref().map(SnapshotTask::generation)
    }

    /// Most recent snapshot published to collaborators.
    #[must_use]
    pub fn published(&self) -> Option<&Published> {
        self.published.as_ref()
    }

    /// Cache used for snapshot queries.
    #[must_use]
    pub fn cache(&self) -> &QueryCache<Snapshot> {
        &self.cache
    }

    /// Replaces the selection, clearing the cache when it changes.
    pub fn select(&mut self, agents: impl IntoIterator<Item = AgentId>) {
        let selection: BTreeSet<AgentId> = agents.into_iter().collect();
        if selection == self.selection {
            return;
        }
        debug!(selected = selection.len(), "agent selection changed");
        self.selection = selection;
        self.cache.invalidate();
        self.retire();
    }

    /// Clears the query cache.
    pub fn invalidate_cache(&mut self) {
        self.cache.invalidate();
    }

    /// Applies a data command to the world.
    ///
    /// Any in-flight computation keeps reading the previous world revision and
    /// its result is discarded on arrival.
    pub fn apply(&mut self, command: Command, out_events: &mut Vec<Event>) {
        world::apply(Arc::make_mut(&mut self.world), command, out_events);
        self.cache.invalidate();
        self.retire();
    }

    /// Swaps in a freshly loaded world.
    pub fn replace_world(&mut self, world: World) {
        info!(
            agents = world::query::agent_count(&world),
            "replacing world for replay session"
        );
        self.world = Arc::new(world);
        self.cache.invalidate();
        self.retire();
    }

    /// Resolves a single agent at `time` without touching the cache.
    #[must_use]
    pub fn resolve(&self, agent: AgentId, time: Timestamp) -> Option<Coordinate> {
        self.resolver
            .resolve_agent(&self.world, agent, time, self.epoch)
    }

    /// Computes the selection's snapshot on the calling thread through the cache.
    pub fn compute_snapshot_now(&mut self, time: Timestamp) -> Arc<Snapshot> {
        let world = &self.world;
        let resolver = &self.resolver;
        let epoch = self.epoch;
        let selection = &self.selection;
        self.cache
            .get_or_compute(time, selection.iter().copied(), || {
                compute_snapshot(world, resolver, epoch, time, selection.iter().copied())
            })
    }

    /// Issues a snapshot query for the current selection at `time`.
    ///
    /// A cache hit is published immediately. Otherwise the running
    /// computation, if any, is cancelled and a new one is started.
    pub fn request(&mut self, time: Timestamp, out_events: &mut Vec<Event>) -> Requested {
        self.latest = self.latest.next();
        let generation = self.latest;

        if let Some(snapshot) = self.cache.lookup(time, self.selection.iter().copied()) {
            debug!(generation = generation.get(), "snapshot served from cache");
            self.supersede();
            self.publish(generation, time, snapshot, out_events);
            return Requested::Cached(generation);
        }

        self.supersede();
        let request = SnapshotRequest {
            generation,
            time,
            epoch: self.epoch,
            agents: self.selection.iter().copied().collect(),
        };
        debug!(
            generation = generation.get(),
            agents = request.agents.len(),
            "snapshot computation issued"
        );
        self.in_flight = Some(SnapshotTask::spawn(
            Arc::clone(&self.world),
            self.resolver,
            request,
        ));
        Requested::Issued(generation)
    }

    /// Collects finished computations without blocking.
    pub fn poll(&mut self, out_events: &mut Vec<Event>) {
        let mut finished = Vec::new();

        let mut pending = Vec::with_capacity(self.superseded.len());
        for mut task in mem::take(&mut self.superseded) {
            match task.try_take() {
                TaskPoll::Pending => pending.push(task),
                TaskPoll::Ready(outcome) => finished.push(outcome),
                TaskPoll::Abandoned => {}
            }
        }
        self.superseded = pending;

        if let Some(mut task) = self.in_flight.take() {
            match task.try_take() {
                TaskPoll::Pending => self.in_flight = Some(task),
                TaskPoll::Ready(outcome) => finished.push(outcome),
                TaskPoll::Abandoned => {}
            }
        }

        for outcome in finished {
            self.deliver(outcome, out_events);
        }
    }

    /// Blocks until every outstanding computation has finished.
    pub fn settle(&mut self, out_events: &mut Vec<Event>) {
        let mut finished: Vec<SnapshotOutcome> = mem::take(&mut self.superseded)
            .into_iter()
            .filter_map(SnapshotTask::wait)
            .collect();
        if let Some(task) = self.in_flight.take() {
            finished.extend(task.wait());
        }

        for outcome in finished {
            self.deliver(outcome, out_events);
        }
    }

    /// Commits a finished computation if it answers the latest query.
    ///
    /// Results from superseded queries are discarded and reported with
    /// [`Event::StaleSnapshotDiscarded`].
    pub fn deliver(&mut self, outcome: SnapshotOutcome, out_events: &mut Vec<Event>) {
        if outcome.generation != self.latest {
            debug!(
                generation = outcome.generation.get(),
                latest = self.latest.get(),
                "discarding stale snapshot"
            );
            out_events.push(Event::StaleSnapshotDiscarded {
                generation: outcome.generation,
                latest: self.latest,
            });
            return;
        }

        if self
            .in_flight
            .as_ref()
            .is_some_and(|task| task.generation() == outcome.generation)
        {
            self.in_flight = None;
        }

        let snapshot = self
            .cache
            .commit(outcome.time, outcome.agents, outcome.snapshot);
        self.publish(outcome.generation, outcome.time, snapshot, out_events);
    }

    /// Cancels the running computation and keeps it around until it reports.
    fn supersede(&mut self) {
        if let Some(task) = self.in_flight.take() {
            task.cancel();
            self.superseded.push(task);
        }
    }

    /// Makes every outstanding computation stale after an input change.
    fn retire(&mut self) {
        self.supersede();
        self.latest = self.latest.next();
    }

    fn publish(
        &mut self,
        generation: Generation,
        time: Timestamp,
        snapshot: Arc<Snapshot>,
        out_events: &mut Vec<Event>,
    ) {
        debug!(
            generation = generation.get(),
            markers = snapshot.len(),
            "snapshot published"
        );
        out_events.push(Event::SnapshotPublished {
            generation,
            time,
            label: Epoch::label(time),
            markers: snapshot.markers(),
        });
        self.published = Some(Published {
            generation,
            time,
            snapshot,
        });
    }
}
