//! TOML configuration for a replay session.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use route_replay_core::{Epoch, DEFAULT_EPOCH_UNIX_SECONDS};
use route_replay_system_query_cache::DEFAULT_TOLERANCE_SECONDS;
use route_replay_system_resolver::DEFAULT_WINDOW_MINUTES;
use serde::Deserialize;
use thiserror::Error;

use crate::Config;

/// Default number of agents selected when a log is loaded.
pub const DEFAULT_SELECTION: usize = 5;

/// Default number of selected agents that get a trajectory polyline.
pub const DEFAULT_TRAJECTORY_LIMIT: usize = 3;

/// Errors raised while loading an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config at {path}")]
    Read {
        /// Location of the unreadable file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The configuration was not valid TOML for the expected layout.
    #[error("failed to parse config toml")]
    Parse(#[from] toml::de::Error),
    /// A numeric setting was negative or not finite.
    #[error("`{field}` must be a finite, non-negative number (got {value})")]
    InvalidValue {
        /// Dotted path of the offending setting.
        field: &'static str,
        /// Value that was rejected.
        value: f64,
    },
}

/// Complete configuration of a replay session.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Transition window settings.
    pub transition: TransitionSection,
    /// Query cache settings.
    pub cache: CacheSection,
    /// Session-wide settings.
    pub session: SessionSection,
}

/// `[transition]` table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransitionSection {
    /// Width of the transition window centred on each location change.
    pub window_minutes: f64,
}

impl Default for TransitionSection {
    fn default() -> Self {
        Self {
            window_minutes: DEFAULT_WINDOW_MINUTES,
        }
    }
}

/// `[cache]` table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Queries closer than this many seconds share a cached snapshot.
    pub tolerance_seconds: f64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            tolerance_seconds: DEFAULT_TOLERANCE_SECONDS,
        }
    }
}

/// `[session]` table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    /// Unix timestamp that event offsets are measured from.
    pub epoch_unix_seconds: i64,
    /// Number of agents selected after loading, in ascending id order.
    pub default_selection: usize,
    /// Number of selected agents that get a trajectory polyline.
    pub trajectory_limit: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            epoch_unix_seconds: DEFAULT_EPOCH_UNIX_SECONDS,
            default_selection: DEFAULT_SELECTION,
            trajectory_limit: DEFAULT_TRAJECTORY_LIMIT,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates the configuration stored at `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Epoch configured for the session.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        Epoch::from_unix_seconds(self.session.epoch_unix_seconds)
    }

    /// Coordinator configuration derived from the file.
    #[must_use]
    pub fn coordinator_config(&self) -> Config {
        Config::new(
            route_replay_system_resolver::Config::new(self.transition.window_minutes),
            route_replay_system_query_cache::Config::new(self.cache.tolerance_seconds),
            self.epoch(),
        )
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check("transition.window_minutes", self.transition.window_minutes)?;
        check("cache.tolerance_seconds", self.cache.tolerance_seconds)
    }
}

fn check(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue { field, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.epoch(), Epoch::default());
        assert_eq!(config.session.default_selection, 5);
        assert_eq!(config.session.trajectory_limit, 3);
    }

    #[test]
    fn partial_tables_override_selected_fields() {
        let config = EngineConfig::from_toml_str(
            "[transition]\nwindow_minutes = 40.0\n[session]\nepoch_unix_seconds = 0\n",
        )
        .expect("valid config");

        assert_eq!(config.transition.window_minutes, 40.0);
        assert_eq!(config.cache.tolerance_seconds, DEFAULT_TOLERANCE_SECONDS);
        assert_eq!(config.epoch(), Epoch::from_unix_seconds(0));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let error = EngineConfig::from_toml_str("[cache]\ntolerance_seconds = -1.0\n")
            .expect_err("negative tolerance must be rejected");

        assert!(matches!(
            error,
            ConfigError::InvalidValue {
                field: "cache.tolerance_seconds",
                ..
            }
        ));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let error = EngineConfig::from_toml_str("[cache]\nttl = 3\n")
            .expect_err("unknown keys must be rejected");
        assert!(matches!(error, ConfigError::Parse(_)));
    }
}
