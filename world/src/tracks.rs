//! Per-agent event tracks and the ingestion policy that feeds them.

use std::collections::BTreeMap;

use route_replay_core::{AgentId, Hour, LocationEvent, LocationId, TrackView};

/// Gap after which a repeated location is recorded again.
pub(crate) const RECORD_REFRESH_HOURS: f64 = 24.0;

/// Result of offering an observation to a track.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Ingested {
    /// The observation became a new event in the track.
    Recorded(LocationEvent),
    /// The observation repeated the last recorded location and was dropped.
    Collapsed,
}

/// Time-ordered location events for one agent.
///
/// Events are kept sorted by offset on insert. An event whose offset equals
/// existing offsets is placed after them, so ties keep ingestion order.
#[derive(Clone, Debug, Default)]
pub(crate) struct EventTrack {
    events: Vec<LocationEvent>,
    last_recorded: Option<(Hour, LocationId)>,
}

impl EventTrack {
    /// Applies the ingestion policy to an observation.
    ///
    /// The observation is recorded when the track is empty, when the location
    /// differs from the last recorded one, or when more than
    /// [`RECORD_REFRESH_HOURS`] passed since the last recorded event.
    pub(crate) fn ingest(&mut self, offset: Hour, location: LocationId) -> Ingested {
        let should_record = match &self.last_recorded {
            None => true,
            Some((last_offset, last_location)) => {
                *last_location != location
                    || offset.get() - last_offset.get() > RECORD_REFRESH_HOURS
            }
        };

        if !should_record {
            return Ingested::Collapsed;
        }

        let event = LocationEvent::new(offset, location.clone());
        let position = self
            .events
            .partition_point(|existing| existing.offset.get() <= offset.get());
        self.events.insert(position, event.clone());
        self.last_recorded = Some((offset, location));
        Ingested::Recorded(event)
    }

    pub(crate) fn view(&self) -> TrackView<'_> {
        TrackView::new(&self.events)
    }

    pub(crate) fn latest_offset(&self) -> Option<Hour> {
        self.events.last().map(|event| event.offset)
    }
}

/// Collection of tracks keyed by agent.
#[derive(Clone, Debug, Default)]
pub(crate) struct TrackLedger {
    tracks: BTreeMap<AgentId, EventTrack>,
}

impl TrackLedger {
    pub(crate) fn ingest(
        &mut self,
        agent: AgentId,
        offset: Hour,
        location: LocationId,
    ) -> Ingested {
        self.tracks.entry(agent).or_default().ingest(offset, location)
    }

    pub(crate) fn track(&self, agent: AgentId) -> Option<&EventTrack> {
        self.tracks.get(&agent)
    }

    pub(crate) fn agents(&self) -> impl Iterator<Item = AgentId> + '_ {
        self.tracks.keys().copied()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (AgentId, &EventTrack)> + '_ {
        self.tracks.iter().map(|(agent, track)| (*agent, track))
    }

    pub(crate) fn len(&self) -> usize {
        self.tracks.len()
    }

    pub(crate) fn clear(&mut self) {
        self.tracks.clear();
    }
}
