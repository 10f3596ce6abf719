#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Route Replay engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and pure systems. Loaders submit [`Command`] values
//! describing observed location changes, the world records them via its
//! `apply` entry point and broadcasts [`Event`] values. Systems query
//! immutable views ([`TrackView`], [`RegistryView`]) and produce owned
//! [`Snapshot`] values that never borrow from the world.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unix timestamp of 2024-01-01T00:00:00Z, the default replay epoch.
pub const DEFAULT_EPOCH_UNIX_SECONDS: i64 = 1_704_067_200;

/// Label produced for query times that have no calendar representation.
pub const INVALID_TIME_LABEL: &str = "--.--.---- --:--:--";

/// Number of seconds in a simulated hour.
pub const SECONDS_PER_HOUR: f64 = 3600.0;

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Records a single observation of an agent at a location.
    ///
    /// The world applies its ingestion policy, so observations that repeat the
    /// previously recorded location are collapsed.
    RecordObservation {
        /// Hour offset of the observation relative to the epoch.
        offset: Hour,
        /// Agent that was observed.
        agent: AgentId,
        /// Location the agent was observed at.
        location: LocationId,
    },
    /// Registers (or replaces) the coordinate of a location.
    PlaceLocation {
        /// Location receiving the coordinate.
        location: LocationId,
        /// Coordinate assigned to the location.
        coordinate: Coordinate,
    },
    /// Drops every recorded event and every known coordinate.
    ResetLog,
}

/// Events broadcast by the world and the snapshot coordinator.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Confirms that a location change was recorded for an agent.
    LocationChangeRecorded {
        /// Agent whose track grew.
        agent: AgentId,
        /// Event appended to the agent's track.
        event: LocationEvent,
    },
    /// Reports that an observation was collapsed into the previous event.
    ObservationCollapsed {
        /// Agent whose observation was dropped.
        agent: AgentId,
        /// Hour offset of the dropped observation.
        offset: Hour,
    },
    /// Confirms that a location received a coordinate.
    LocationPlaced {
        /// Location that was placed.
        location: LocationId,
        /// Coordinate assigned to the location.
        coordinate: Coordinate,
    },
    /// Announces that the world dropped all of its data.
    LogReset,
    /// Publishes the positions of the selected agents at a query time.
    SnapshotPublished {
        /// Generation of the query that produced the snapshot.
        generation: Generation,
        /// Query time the snapshot was computed for.
        time: Timestamp,
        /// Query time formatted as `dd.mm.yyyy HH:MM:SS`.
        label: String,
        /// Resolved markers ordered by agent identifier.
        markers: Vec<(AgentId, Coordinate)>,
    },
    /// Reports that a finished computation was superseded before it landed.
    StaleSnapshotDiscarded {
        /// Generation of the discarded computation.
        generation: Generation,
        /// Latest generation issued when the result arrived.
        latest: Generation,
    },
}

/// Unique identifier assigned to an agent by the event log.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of a place referenced by location events.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LocationId(String);

impl LocationId {
    /// Creates a location identifier from the provided name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the location.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fractional number of simulated hours elapsed since the epoch.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Hour(f64);

impl Hour {
    /// Wraps the provided number of hours.
    #[must_use]
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// Retrieves the number of hours.
    #[must_use]
    pub const fn get(&self) -> f64 {
        self.0
    }
}

/// Absolute query time expressed in seconds since the Unix epoch.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(f64);

impl Timestamp {
    /// Wraps the provided number of Unix seconds.
    #[must_use]
    pub const fn from_unix_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Number of seconds since the Unix epoch.
    #[must_use]
    pub const fn unix_seconds(&self) -> f64 {
        self.0
    }

    /// Absolute distance between two timestamps in seconds.
    #[must_use]
    pub fn distance(self, other: Timestamp) -> f64 {
        (self.0 - other.0).abs()
    }
}

/// Planar latitude/longitude pair expressed in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    /// Creates a coordinate from latitude and longitude in degrees.
    #[must_use]
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude in degrees.
    #[must_use]
    pub const fn lat(&self) -> f64 {
        self.lat
    }

    /// Longitude in degrees.
    #[must_use]
    pub const fn lon(&self) -> f64 {
        self.lon
    }

    /// Linearly interpolates towards `other`, componentwise.
    ///
    /// No geodesic correction is applied. `t` is used as given; callers clamp
    /// it when they need a point on the segment.
    #[must_use]
    pub fn lerp(self, other: Coordinate, t: f64) -> Self {
        Self {
            lat: self.lat + t * (other.lat - self.lat),
            lon: self.lon + t * (other.lon - self.lon),
        }
    }
}

/// A single change-of-location record within an agent's track.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationEvent {
    /// Hour at which the agent is considered to be at `location`.
    pub offset: Hour,
    /// Location the agent moved to.
    pub location: LocationId,
}

impl LocationEvent {
    /// Creates a new location event.
    #[must_use]
    pub fn new(offset: Hour, location: LocationId) -> Self {
        Self { offset, location }
    }
}

/// Monotonically increasing counter assigned to issued snapshot queries.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Generation(u64);

impl Generation {
    /// Creates a generation with the provided counter value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the counter value.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the generation that follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

/// Read-only view of one agent's time-ordered events.
#[derive(Clone, Copy, Debug)]
pub struct TrackView<'a> {
    events: &'a [LocationEvent],
}

impl<'a> TrackView<'a> {
    /// Wraps a slice of events that is already sorted by offset.
    #[must_use]
    pub fn new(events: &'a [LocationEvent]) -> Self {
        debug_assert!(
            events
                .windows(2)
                .all(|pair| pair[0].offset.get() <= pair[1].offset.get()),
            "track events must be sorted by offset"
        );
        Self { events }
    }

    /// Events ordered ascending by offset.
    #[must_use]
    pub fn events(&self) -> &'a [LocationEvent] {
        self.events
    }

    /// Reports whether the track holds no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Most recent event in the track.
    #[must_use]
    pub fn last(&self) -> Option<&'a LocationEvent> {
        self.events.last()
    }
}

/// Read-only view of the known location coordinates.
#[derive(Clone, Copy, Debug)]
pub struct RegistryView<'a> {
    entries: &'a BTreeMap<LocationId, Coordinate>,
}

impl<'a> RegistryView<'a> {
    /// Captures a view backed by the provided coordinate table.
    #[must_use]
    pub fn new(entries: &'a BTreeMap<LocationId, Coordinate>) -> Self {
        Self { entries }
    }

    /// Coordinate of the provided location, if known.
    #[must_use]
    pub fn coordinate(&self, location: &LocationId) -> Option<Coordinate> {
        self.entries.get(location).copied()
    }

    /// Number of locations with a known coordinate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Reports whether no location has a known coordinate.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Owned mapping from agents to the positions resolved at one query time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    positions: BTreeMap<AgentId, Coordinate>,
}

impl Snapshot {
    /// Creates a snapshot from resolved positions.
    #[must_use]
    pub fn from_positions(positions: BTreeMap<AgentId, Coordinate>) -> Self {
        Self { positions }
    }

    /// Position resolved for the provided agent, if any.
    #[must_use]
    pub fn position(&self, agent: AgentId) -> Option<Coordinate> {
        self.positions.get(&agent).copied()
    }

    /// Iterator over resolved positions in ascending agent order.
    pub fn iter(&self) -> impl Iterator<Item = (AgentId, Coordinate)> + '_ {
        self.positions.iter().map(|(agent, coordinate)| (*agent, *coordinate))
    }

    /// Number of agents with a resolved position.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Reports whether no agent was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Flattens the snapshot into `(agent, coordinate)` markers.
    #[must_use]
    pub fn markers(&self) -> Vec<(AgentId, Coordinate)> {
        self.iter().collect()
    }
}

/// Reference instant against which every event offset is measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epoch {
    unix_seconds: i64,
}

impl Epoch {
    /// Creates an epoch anchored at the provided Unix timestamp.
    #[must_use]
    pub const fn from_unix_seconds(unix_seconds: i64) -> Self {
        Self { unix_seconds }
    }

    /// Unix timestamp of the epoch.
    #[must_use]
    pub const fn unix_seconds(&self) -> i64 {
        self.unix_seconds
    }

    /// Converts an absolute query time into hours since the epoch.
    #[must_use]
    pub fn hour_at(&self, time: Timestamp) -> Hour {
        Hour::new((time.unix_seconds() - self.unix_seconds as f64) / SECONDS_PER_HOUR)
    }

    /// Converts an offset in seconds since the epoch into an absolute time.
    #[must_use]
    pub fn timestamp_after(&self, seconds: f64) -> Timestamp {
        Timestamp::from_unix_seconds(self.unix_seconds as f64 + seconds)
    }

    /// Converts an hour offset into an absolute time.
    #[must_use]
    pub fn timestamp_at(&self, hour: Hour) -> Timestamp {
        self.timestamp_after(hour.get() * SECONDS_PER_HOUR)
    }

    /// Formats an absolute time as `dd.mm.yyyy HH:MM:SS` in UTC.
    ///
    /// Times outside the representable calendar range yield [`INVALID_TIME_LABEL`].
    #[must_use]
    pub fn label(time: Timestamp) -> String {
        let seconds = time.unix_seconds().floor();
        if !seconds.is_finite() {
            return INVALID_TIME_LABEL.to_owned();
        }
        match DateTime::<Utc>::from_timestamp(seconds as i64, 0) {
            Some(datetime) => datetime.format("%d.%m.%Y %H:%M:%S").to_string(),
            None => INVALID_TIME_LABEL.to_owned(),
        }
    }
}

impl Default for Epoch {
    fn default() -> Self {
        Self::from_unix_seconds(DEFAULT_EPOCH_UNIX_SECONDS)
    }
}
