#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Pure position resolver that reconstructs where an agent is at any time.
//!
//! Agents sit still at a location until shortly before their next recorded
//! change, then glide in a straight line towards the next location during a
//! fixed transition window centred on the change's hour.

use route_replay_core::{AgentId, Coordinate, Epoch, Hour, RegistryView, Timestamp, TrackView};
use route_replay_world::{query, World};
use serde::{Deserialize, Serialize};

/// Default width of the transition window in minutes.
pub const DEFAULT_WINDOW_MINUTES: f64 = 20.0;

/// Configuration parameters required to construct the resolver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    window_minutes: f64,
}

impl Config {
    /// Creates a configuration with the provided transition window width.
    #[must_use]
    pub const fn new(window_minutes: f64) -> Self {
        Self { window_minutes }
    }

    /// Width of the transition window in minutes.
    #[must_use]
    pub const fn window_minutes(&self) -> f64 {
        self.window_minutes
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_MINUTES)
    }
}

/// Interpolating resolver for agent positions.
#[derive(Clone, Copy, Debug)]
pub struct Resolver {
    window_hours: f64,
}

impl Resolver {
    /// Creates a new resolver using the supplied configuration.
    ///
    /// Negative or non-finite window widths collapse to an instantaneous jump.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let window_hours = config.window_minutes() / 60.0;
        Self {
            window_hours: if window_hours.is_finite() && window_hours > 0.0 {
                window_hours
            } else {
                0.0
            },
        }
    }

    /// Width of the transition window in hours.
    #[must_use]
    pub fn window_hours(&self) -> f64 {
        self.window_hours
    }

    /// Resolves an agent's position at an absolute time.
    ///
    /// Unknown agents resolve to `None`.
    #[must_use]
    pub fn resolve_agent(
        &self,
        world: &World,
        agent: AgentId,
        time: Timestamp,
        epoch: Epoch,
    ) -> Option<Coordinate> {
        let track = query::track(world, agent)?;
        self.resolve(track, query::registry(world), epoch.hour_at(time))
    }

    /// Resolves the position described by a track at the provided hour.
    ///
    /// The first consecutive pair whose later event is at or after `hour`
    /// decides the result. Before that pair's transition window the agent is
    /// at the earlier location; inside it the agent is interpolated towards
    /// the later one. Because the scan stops at the first pair with
    /// `hour <= h2`, the second half of a window (`hour > h2`) is handled by
    /// the following pair, where the agent is already stationary at the new
    /// location. Past the final event the agent stays at the last location,
    /// and a NaN hour, which precedes no change, is treated the same way.
    #[must_use]
    pub fn resolve(
        &self,
        track: TrackView<'_>,
        registry: RegistryView<'_>,
        hour: Hour,
    ) -> Option<Coordinate> {
        let events = track.events();
        let last = track.last()?;
        let hour = hour.get();
        if hour.is_nan() {
            return registry.coordinate(&last.location);
        }

        for pair in events.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            let change = to.offset.get();
            if hour > change {
                continue;
            }

            let origin = registry.coordinate(&from.location)?;
            let half = self.window_hours / 2.0;
            let window_start = change - half;
            let window_end = change + half;

            if hour < window_start || hour > window_end {
                return Some(origin);
            }

            let Some(destination) = registry.coordinate(&to.location) else {
                return Some(origin);
            };

            let t = if self.window_hours > 0.0 {
                ((hour - window_start) / self.window_hours).clamp(0.0, 1.0)
            } else {
                0.0
            };
            return Some(origin.lerp(destination, t));
        }

        registry.coordinate(&last.location)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_windows_collapse_to_zero_width() {
        assert_eq!(Resolver::new(Config::new(-5.0)).window_hours(), 0.0);
        assert_eq!(Resolver::new(Config::new(f64::NAN)).window_hours(), 0.0);
        assert!((Resolver::default().window_hours() - 1.0 / 3.0).abs() < 1e-12);
    }
}
