#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative event store and location registry for Route Replay.

mod registry;
mod tracks;

use route_replay_core::{AgentId, Command, Coordinate, Event, Hour, LocationId};
use tracing::{debug, info};

use self::{
    registry::LocationRegistry,
    tracks::{Ingested, TrackLedger},
};

/// Represents the authoritative Route Replay world state.
///
/// The world is cheap to share behind an `Arc` and is cloned only when it is
/// mutated while a snapshot computation still holds the previous revision.
#[derive(Clone, Debug, Default)]
pub struct World {
    tracks: TrackLedger,
    registry: LocationRegistry,
    revision: u64,
}

impl World {
    /// Creates an empty world with no agents and no known locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn bump_revision(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }
}

/// A single row of the event log as produced by a loader.
#[derive(Clone, Debug, PartialEq)]
pub struct ObservationRecord {
    /// Hour offset of the observation relative to the epoch.
    pub offset: Hour,
    /// Agent that was observed.
    pub agent: AgentId,
    /// Location the agent was observed at.
    pub location: LocationId,
}

impl ObservationRecord {
    /// Creates a new observation record.
    #[must_use]
    pub fn new(offset: Hour, agent: AgentId, location: LocationId) -> Self {
        Self {
            offset,
            agent,
            location,
        }
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::RecordObservation {
            offset,
            agent,
            location,
        } => {
            if !offset.get().is_finite() {
                debug!(agent = agent.get(), offset = offset.get(), "ignoring non-finite offset");
                return;
            }

            match world.tracks.ingest(agent, offset, location) {
                Ingested::Recorded(event) => {
                    world.bump_revision();
                    out_events.push(Event::LocationChangeRecorded { agent, event });
                }
                Ingested::Collapsed => {
                    out_events.push(Event::ObservationCollapsed { agent, offset });
                }
            }
        }
        Command::PlaceLocation {
            location,
            coordinate,
        } => {
            world.registry.place(location.clone(), coordinate);
            world.bump_revision();
            out_events.push(Event::LocationPlaced {
                location,
                coordinate,
            });
        }
        Command::ResetLog => {
            world.tracks.clear();
            world.registry.clear();
            world.bump_revision();
            out_events.push(Event::LogReset);
        }
    }
}

/// Builds a world from a complete event log and coordinate table.
///
/// Coordinates are placed first so that every observation sees the full
/// registry; observations are ingested in the order given.
pub fn load<R, C>(records: R, coordinates: C) -> World
where
    R: IntoIterator<Item = ObservationRecord>,
    C: IntoIterator<Item = (LocationId, Coordinate)>,
{
    let mut world = World::new();
    let mut events = Vec::new();

    for (location, coordinate) in coordinates {
        apply(
            &mut world,
            Command::PlaceLocation {
                location,
                coordinate,
            },
            &mut events,
        );
    }

    let mut recorded = 0_usize;
    let mut collapsed = 0_usize;
    for record in records {
        events.clear();
        apply(
            &mut world,
            Command::RecordObservation {
                offset: record.offset,
                agent: record.agent,
                location: record.location,
            },
            &mut events,
        );
        for event in &events {
            match event {
                Event::LocationChangeRecorded { .. } => recorded += 1,
                Event::ObservationCollapsed { .. } => collapsed += 1,
                _ => {}
            }
        }
    }

    info!(
        agents = world.tracks.len(),
        locations = world.registry.view().len(),
        recorded,
        collapsed,
        "event log loaded"
    );
    world
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::collections::BTreeSet;

    use route_replay_core::{AgentId, Coordinate, Hour, LocationId, RegistryView, TrackView};

    use super::World;

    /// Read-only view of the provided agent's events, if the agent is known.
    #[must_use]
    pub fn track(world: &World, agent: AgentId) -> Option<TrackView<'_>> {
        world.tracks.track(agent).map(|track| track.view())
    }

    /// Read-only view of every known location coordinate.
    #[must_use]
    pub fn registry(world: &World) -> RegistryView<'_> {
        world.registry.view()
    }

    /// Coordinate of the provided location, if known.
    #[must_use]
    pub fn coordinate(world: &World, location: &LocationId) -> Option<Coordinate> {
        world.registry.view().coordinate(location)
    }

    /// Known agents in ascending identifier order.
    #[must_use]
    pub fn agent_ids(world: &World) -> Vec<AgentId> {
        world.tracks.agents().collect()
    }

    /// Number of agents with at least one recorded event.
    #[must_use]
    pub fn agent_count(world: &World) -> usize {
        world.tracks.len()
    }

    /// Selects the first `limit` agents in ascending identifier order.
    #[must_use]
    pub fn default_selection(world: &World, limit: usize) -> BTreeSet<AgentId> {
        world.tracks.agents().take(limit).collect()
    }

    /// Latest event offset over every agent, or zero for an empty world.
    ///
    /// Playback spans `[0, time_span]` hours.
    #[must_use]
    pub fn time_span(world: &World) -> Hour {
        let latest = world
            .tracks
            .iter()
            .filter_map(|(_, track)| track.latest_offset())
            .map(|offset| offset.get())
            .fold(0.0_f64, f64::max);
        Hour::new(latest)
    }

    /// Straight-line polyline through the agent's events with known coordinates.
    ///
    /// Events whose location has no coordinate are skipped.
    #[must_use]
    pub fn trajectory(world: &World, agent: AgentId) -> Vec<Coordinate> {
        let registry = world.registry.view();
        track(world, agent)
            .map(|track| {
                track
                    .events()
                    .iter()
                    .filter_map(|event| registry.coordinate(&event.location))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Counter that changes whenever the world's data changes.
    #[must_use]
    pub fn revision(world: &World) -> u64 {
        world.revision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_reports_recorded_and_collapsed_observations() {
        let mut world = World::new();
        let mut events = Vec::new();
        let agent = AgentId::new(3);

        apply(
            &mut world,
            Command::RecordObservation {
                offset: Hour::new(0.0),
                agent,
                location: LocationId::new("home"),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::RecordObservation {
                offset: Hour::new(1.0),
                agent,
                location: LocationId::new("home"),
            },
            &mut events,
        );

        assert!(matches!(events[0], Event::LocationChangeRecorded { .. }));
        assert_eq!(
            events[1],
            Event::ObservationCollapsed {
                agent,
                offset: Hour::new(1.0)
            }
        );
        assert_eq!(query::revision(&world), 1, "collapsed rows keep the revision");
    }

    #[test]
    fn non_finite_offsets_are_ignored() {
        let mut world = World::new();
        let mut events = Vec::new();
        apply(
            &mut world,
            Command::RecordObservation {
                offset: Hour::new(f64::NAN),
                agent: AgentId::new(1),
                location: LocationId::new("home"),
            },
            &mut events,
        );

        assert!(events.is_empty());
        assert_eq!(query::agent_count(&world), 0);
    }

    #[test]
    fn reset_drops_tracks_and_coordinates() {
        let mut world = load(
            vec![ObservationRecord::new(
                Hour::new(0.0),
                AgentId::new(1),
                LocationId::new("home"),
            )],
            vec![(LocationId::new("home"), Coordinate::new(1.0, 1.0))],
        );
        let before = query::revision(&world);
        let mut events = Vec::new();

        apply(&mut world, Command::ResetLog, &mut events);

        assert_eq!(events, vec![Event::LogReset]);
        assert!(query::agent_ids(&world).is_empty());
        assert!(query::registry(&world).is_empty());
        assert_ne!(query::revision(&world), before);
    }
}
