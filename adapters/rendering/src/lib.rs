#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Shared rendering contracts for Route Replay adapters.

use std::collections::BTreeMap;

use anyhow::Result as AnyResult;
use glam::DVec2;
use route_replay_core::{AgentId, Coordinate, Event, Generation};

/// Smallest per-axis change, in degrees, that moves an existing marker.
pub const MOVE_THRESHOLD_DEGREES: f64 = 0.0001;

/// RGBA color used when presenting frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Creates a new color from floating point channels.
    #[must_use]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Creates an opaque color from byte RGB values.
    #[must_use]
    pub const fn from_rgb_u8(red: u8, green: u8, blue: u8) -> Self {
        Self {
            red: red as f32 / 255.0,
            green: green as f32 / 255.0,
            blue: blue as f32 / 255.0,
            alpha: 1.0,
        }
    }

    /// Returns a copy of the color with the provided alpha channel.
    #[must_use]
    pub const fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }

    /// Formats the RGB channels as `#RRGGBB`.
    #[must_use]
    pub fn to_hex(self) -> String {
        format!(
            "#{:02X}{:02X}{:02X}",
            channel_byte(self.red),
            channel_byte(self.green),
            channel_byte(self.blue)
        )
    }
}

fn channel_byte(channel: f32) -> u8 {
    (channel.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Fixed marker palette cycled by agent identifier.
pub const PALETTE: [Color; 10] = [
    Color::from_rgb_u8(0xFF, 0x00, 0x00),
    Color::from_rgb_u8(0x00, 0xFF, 0x00),
    Color::from_rgb_u8(0x00, 0x00, 0xFF),
    Color::from_rgb_u8(0xFF, 0xFF, 0x00),
    Color::from_rgb_u8(0xFF, 0x00, 0xFF),
    Color::from_rgb_u8(0x00, 0xFF, 0xFF),
    Color::from_rgb_u8(0xFF, 0xA5, 0x00),
    Color::from_rgb_u8(0x80, 0x00, 0x80),
    Color::from_rgb_u8(0xFF, 0x69, 0xB4),
    Color::from_rgb_u8(0x32, 0xCD, 0x32),
];

/// Palette entry assigned to the agent.
#[must_use]
pub fn agent_color(agent: AgentId) -> Color {
    PALETTE[agent.get() as usize % PALETTE.len()]
}

/// Map-space position of a coordinate, with longitude on the x axis.
#[must_use]
pub fn map_position(coordinate: Coordinate) -> DVec2 {
    DVec2::new(coordinate.lon(), coordinate.lat())
}

/// Marker drawn for one agent.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MarkerPresentation {
    /// Agent represented by the marker.
    pub agent: AgentId,
    /// Map-space position, longitude on x and latitude on y.
    pub position: DVec2,
    /// Fill color.
    pub color: Color,
}

impl MarkerPresentation {
    /// Creates a marker for the agent at the provided coordinate.
    #[must_use]
    pub fn new(agent: AgentId, coordinate: Coordinate) -> Self {
        Self {
            agent,
            position: map_position(coordinate),
            color: agent_color(agent),
        }
    }
}

/// Straight polyline through an agent's recorded locations.
#[derive(Clone, Debug, PartialEq)]
pub struct TrajectoryPresentation {
    /// Agent whose route is drawn.
    pub agent: AgentId,
    /// Polyline vertices in map space.
    pub points: Vec<DVec2>,
    /// Stroke color.
    pub color: Color,
}

impl TrajectoryPresentation {
    /// Builds polylines for at most `limit` agents, skipping routes with a single point.
    ///
    /// Agents are taken in the order supplied, so callers pass them sorted by id.
    #[must_use]
    pub fn collect<I>(routes: I, limit: usize) -> Vec<Self>
    where
        I: IntoIterator<Item = (AgentId, Vec<Coordinate>)>,
    {
        routes
            .into_iter()
            .take(limit)
            .filter(|(_, route)| route.len() > 1)
            .map(|(agent, route)| Self {
                agent,
                points: route.into_iter().map(map_position).collect(),
                color: agent_color(agent).with_alpha(0.5),
            })
            .collect()
    }
}

/// One published snapshot prepared for display.
#[derive(Clone, Debug, PartialEq)]
pub struct MarkerFrame {
    /// Generation of the query that produced the frame.
    pub generation: Generation,
    /// Human readable query time.
    pub label: String,
    /// Markers in ascending agent order.
    pub markers: Vec<MarkerPresentation>,
}

impl MarkerFrame {
    /// Extracts a frame from a published snapshot event.
    ///
    /// Returns `None` for every other event kind.
    #[must_use]
    pub fn from_event(event: &Event) -> Option<Self> {
        match event {
            Event::SnapshotPublished {
                generation,
                label,
                markers,
                ..
            } => Some(Self {
                generation: *generation,
                label: label.clone(),
                markers: markers
                    .iter()
                    .map(|(agent, coordinate)| MarkerPresentation::new(*agent, *coordinate))
                    .collect(),
            }),
            _ => None,
        }
    }
}

/// Change applied to the marker board by a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MarkerChange {
    /// A marker appeared for an agent that had none.
    Spawned(MarkerPresentation),
    /// An existing marker moved to a new position.
    Moved {
        /// Agent whose marker moved.
        agent: AgentId,
        /// Previous position.
        from: DVec2,
        /// New position.
        to: DVec2,
    },
    /// The agent no longer has a position and its marker was removed.
    Removed(AgentId),
}

/// Markers currently on screen, updated incrementally from frames.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MarkerBoard {
    markers: BTreeMap<AgentId, MarkerPresentation>,
}

impl MarkerBoard {
    /// Creates an empty board.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a frame and reports the resulting changes.
    ///
    /// Markers move only when one axis changes by more than
    /// [`MOVE_THRESHOLD_DEGREES`], so sub-threshold jitter leaves them in place.
    pub fn update(&mut self, frame: &MarkerFrame) -> Vec<MarkerChange> {
        let mut changes = Vec::new();
        let incoming: BTreeMap<AgentId, MarkerPresentation> = frame
            .markers
            .iter()
            .map(|marker| (marker.agent, *marker))
            .collect();

        self.markers.retain(|agent, _| {
            let keep = incoming.contains_key(agent);
            if !keep {
                changes.push(MarkerChange::Removed(*agent));
            }
            keep
        });

        for (agent, marker) in incoming {
            match self.markers.get_mut(&agent) {
                Some(existing) => {
                    let delta = (marker.position - existing.position).abs();
                    if delta.x > MOVE_THRESHOLD_DEGREES || delta.y > MOVE_THRESHOLD_DEGREES {
                        changes.push(MarkerChange::Moved {
                            agent,
                            from: existing.position,
                            to: marker.position,
                        });
                        existing.position = marker.position;
                    }
                }
                None => {
                    changes.push(MarkerChange::Spawned(marker));
                    let _ = self.markers.insert(agent, marker);
                }
            }
        }

        changes
    }

    /// Markers in ascending agent order.
    pub fn markers(&self) -> impl Iterator<Item = &MarkerPresentation> + '_ {
        self.markers.values()
    }

    /// Number of markers on the board.
    #[must_use]
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Reports whether the board is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }
}

/// Everything a backend draws for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Scene {
    /// Human readable query time of the displayed frame.
    pub label: String,
    /// Marker board holding the displayed markers.
    pub board: MarkerBoard,
    /// Route polylines for the highlighted agents.
    pub trajectories: Vec<TrajectoryPresentation>,
    /// Changes produced by the most recent frame.
    pub changes: Vec<MarkerChange>,
}

impl Scene {
    /// Creates a scene with the provided trajectories and no markers.
    #[must_use]
    pub fn new(trajectories: Vec<TrajectoryPresentation>) -> Self {
        Self {
            trajectories,
            ..Self::default()
        }
    }

    /// Updates the board and label from a frame.
    pub fn apply_frame(&mut self, frame: &MarkerFrame) {
        self.changes = self.board.update(frame);
        self.label.clone_from(&frame.label);
    }
}

/// Presentation descriptor consumed by rendering backends.
#[derive(Clone, Debug, PartialEq)]
pub struct Presentation {
    /// Title shown by the backend.
    pub title: String,
    /// Scene content that should be displayed.
    pub scene: Scene,
}

impl Presentation {
    /// Constructs a new presentation descriptor.
    #[must_use]
    pub fn new<T>(title: T, scene: Scene) -> Self
    where
        T: Into<String>,
    {
        Self {
            title: title.into(),
            scene,
        }
    }
}

/// Rendering backend capable of presenting Route Replay scenes.
pub trait RenderingBackend {
    /// Runs the rendering backend until the update closure reports completion.
    ///
    /// The provided `update_scene` closure mutates the scene before each frame
    /// is drawn and returns `false` once there is nothing left to show.
    fn run<F>(self, presentation: Presentation, update_scene: F) -> AnyResult<()>
    where
        F: FnMut(&mut Scene) -> AnyResult<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(markers: &[(u32, f64, f64)]) -> MarkerFrame {
        MarkerFrame {
            generation: Generation::new(1),
            label: "01.01.2024 00:00:00".to_owned(),
            markers: markers
                .iter()
                .map(|&(agent, lat, lon)| {
                    MarkerPresentation::new(AgentId::new(agent), Coordinate::new(lat, lon))
                })
                .collect(),
        }
    }

    #[test]
    fn palette_cycles_by_agent_id() {
        assert_eq!(agent_color(AgentId::new(0)).to_hex(), "#FF0000");
        assert_eq!(agent_color(AgentId::new(9)).to_hex(), "#32CD32");
        assert_eq!(agent_color(AgentId::new(16)).to_hex(), "#FFA500");
    }

    #[test]
    fn board_spawns_new_markers() {
        let mut board = MarkerBoard::new();
        let changes = board.update(&frame(&[(1, 55.0, 37.0), (2, 56.0, 38.0)]));

        assert_eq!(changes.len(), 2);
        assert!(changes
            .iter()
            .all(|change| matches!(change, MarkerChange::Spawned(_))));
        assert_eq!(board.len(), 2);
    }

    #[test]
    fn board_ignores_sub_threshold_motion() {
        let mut board = MarkerBoard::new();
        let _ = board.update(&frame(&[(1, 55.0, 37.0)]));

        let changes = board.update(&frame(&[(1, 55.00005, 37.00005)]));
        assert!(changes.is_empty());

        let marker = board.markers().next().expect("marker kept");
        assert_eq!(marker.position, DVec2::new(37.0, 55.0));
    }

    #[test]
    fn board_moves_markers_past_threshold() {
        let mut board = MarkerBoard::new();
        let _ = board.update(&frame(&[(1, 55.0, 37.0)]));

        let changes = board.update(&frame(&[(1, 55.001, 37.0)]));
        assert_eq!(
            changes,
            vec![MarkerChange::Moved {
                agent: AgentId::new(1),
                from: DVec2::new(37.0, 55.0),
                to: DVec2::new(37.0, 55.001),
            }]
        );
    }

    #[test]
    fn board_removes_absent_agents() {
        let mut board = MarkerBoard::new();
        let _ = board.update(&frame(&[(1, 55.0, 37.0), (2, 56.0, 38.0)]));

        let changes = board.update(&frame(&[(2, 56.0, 38.0)]));
        assert_eq!(changes, vec![MarkerChange::Removed(AgentId::new(1))]);
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn trajectories_respect_limit_and_skip_single_points() {
        let route = |points: usize| {
            (0..points)
                .map(|index| Coordinate::new(55.0 + index as f64, 37.0))
                .collect::<Vec<_>>()
        };
        let trajectories = TrajectoryPresentation::collect(
            vec![
                (AgentId::new(1), route(3)),
                (AgentId::new(2), route(1)),
                (AgentId::new(3), route(2)),
                (AgentId::new(4), route(5)),
            ],
            3,
        );

        let agents: Vec<u32> = trajectories.iter().map(|line| line.agent.get()).collect();
        assert_eq!(agents, vec![1, 3]);
        assert_eq!(trajectories[0].points.len(), 3);
    }

    #[test]
    fn frame_is_built_only_from_published_snapshots() {
        let published = Event::SnapshotPublished {
            generation: Generation::new(4),
            time: route_replay_core::Timestamp::from_unix_seconds(0.0),
            label: "01.01.1970 00:00:00".to_owned(),
            markers: vec![(AgentId::new(3), Coordinate::new(1.0, 2.0))],
        };

        let frame = MarkerFrame::from_event(&published).expect("published frame");
        assert_eq!(frame.markers[0].position, DVec2::new(2.0, 1.0));
        assert!(MarkerFrame::from_event(&Event::LogReset).is_none());
    }

    #[test]
    fn scene_tracks_latest_label() {
        let mut scene = Scene::new(Vec::new());
        scene.apply_frame(&frame(&[(1, 55.0, 37.0)]));
        assert_eq!(scene.label, "01.01.2024 00:00:00");
        assert_eq!(scene.changes.len(), 1);
    }
}
