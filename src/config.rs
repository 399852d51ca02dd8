//! Application-level configuration loading, including the spectator policy.

use std::{env, fs, io::ErrorKind, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "REP_RALLY_BACK_CONFIG_PATH";
/// Upper bound accepted for battle durations when the config does not set one.
const DEFAULT_MAX_DURATION_SECS: u32 = 86_400;

/// Who may read and observe a battle they are not contesting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpectatorPolicy {
    /// Any authenticated user may view battles and subscribe to their events.
    Open,
    /// Battle data and events are restricted to the two contestants.
    Participants,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    max_duration_secs: u32,
    spectator_policy: SpectatorPolicy,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        policy = ?config.spectator_policy,
                        "loaded configuration"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Longest battle duration accepted at creation, in seconds.
    pub fn max_duration_secs(&self) -> u32 {
        self.max_duration_secs
    }

    /// Access policy for users who are not contestants of a battle.
    pub fn spectator_policy(&self) -> SpectatorPolicy {
        self.spectator_policy
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
            spectator_policy: SpectatorPolicy::Open,
        }
    }
}

#[cfg(test)]
impl AppConfig {
    /// Test constructor bypassing the filesystem.
    pub fn for_tests(spectator_policy: SpectatorPolicy) -> Self {
        Self {
            spectator_policy,
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    max_duration_secs: Option<u32>,
    spectator_policy: Option<SpectatorPolicy>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Self::default();
        Self {
            max_duration_secs: raw.max_duration_secs.unwrap_or(defaults.max_duration_secs),
            spectator_policy: raw.spectator_policy.unwrap_or(defaults.spectator_policy),
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
