//! Application configuration.
//!
//! Read from a JSON file at startup. Every field has a default, so an
//! empty object is a valid file as long as it names at least one tracker.
//! Feed credentials can also come from the environment so they need not be
//! written to disk.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::domain::{RouteId, StopId};
use crate::realtime::{Credential, DEFAULT_DEGRADED_AFTER, DEFAULT_KEY_PARAM, FeedFormat};

/// Environment variable naming the config file.
pub const CONFIG_PATH_VAR: &str = "RAIL_ARRIVALS_CONFIG";

/// Config file used when `RAIL_ARRIVALS_CONFIG` is unset.
pub const DEFAULT_CONFIG_PATH: &str = "rail-arrivals.json";

const API_KEY_VAR: &str = "RAIL_ARRIVALS_API_KEY";
const USERNAME_VAR: &str = "RAIL_ARRIVALS_USERNAME";
const PASSWORD_VAR: &str = "RAIL_ARRIVALS_PASSWORD";

/// Errors from loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown time zone: {0}")]
    InvalidTimezone(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// IANA zone the agency publishes schedules in.
    pub timezone: String,
    /// Address the JSON API binds to.
    pub listen: SocketAddr,
    pub schedule: ScheduleConfig,
    pub feed: FeedConfig,
    pub trackers: Vec<TrackerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Chicago".to_string(),
            listen: SocketAddr::from(([127, 0, 0, 1], 3000)),
            schedule: ScheduleConfig::default(),
            feed: FeedConfig::default(),
            trackers: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Parse a config from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Load from the file named by `RAIL_ARRIVALS_CONFIG`, apply
    /// environment overrides, and validate.
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::from_file(&path)?;
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Override feed credentials from the environment.
    ///
    /// An API key wins over basic credentials. A lone username or password
    /// is merged with whatever basic credentials the file already has.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(API_KEY_VAR).filter(|k| !k.is_empty()) {
            let param = match &self.feed.credential {
                Credential::ApiKey { param, .. } => param.clone(),
                _ => DEFAULT_KEY_PARAM.to_string(),
            };
            self.feed.credential = Credential::ApiKey { param, key };
            return;
        }

        let username = lookup(USERNAME_VAR);
        let password = lookup(PASSWORD_VAR);
        if username.is_none() && password.is_none() {
            return;
        }

        let (old_user, old_pass) = match &self.feed.credential {
            Credential::Basic { username, password } => (username.clone(), password.clone()),
            _ => (String::new(), String::new()),
        };
        self.feed.credential = Credential::Basic {
            username: username.unwrap_or(old_user),
            password: password.unwrap_or(old_pass),
        };
    }

    /// Parsed agency time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone
            .parse()
            .map_err(|_| ConfigError::InvalidTimezone(self.timezone.clone()))
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tz()?;

        if self.schedule.url.is_empty() {
            return Err(ConfigError::Invalid("schedule.url is empty".into()));
        }
        if self.feed.url.is_empty() {
            return Err(ConfigError::Invalid("feed.url is empty".into()));
        }
        if self.feed.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "feed.poll_interval_secs must be positive".into(),
            ));
        }
        if self.feed.timeout_secs == 0 || self.feed.timeout_secs >= self.feed.poll_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "feed.timeout_secs ({}) must be between 1 and poll_interval_secs ({})",
                self.feed.timeout_secs, self.feed.poll_interval_secs
            )));
        }
        if self.schedule.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "schedule.refresh_interval_secs must be positive".into(),
            ));
        }

        if self.trackers.is_empty() {
            return Err(ConfigError::Invalid("no trackers configured".into()));
        }

        let mut ids = HashSet::new();
        for tracker in &self.trackers {
            if tracker.id.is_empty() {
                return Err(ConfigError::Invalid("tracker id is empty".into()));
            }
            if !ids.insert(tracker.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate tracker id: {}",
                    tracker.id
                )));
            }
            if tracker.departure_stop_id == tracker.arrival_stop_id {
                return Err(ConfigError::Invalid(format!(
                    "tracker {}: departure and arrival stop are both {}",
                    tracker.id, tracker.departure_stop_id
                )));
            }
        }

        Ok(())
    }
}

/// Static schedule download settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// URL of the GTFS zip archive.
    pub url: String,
    pub refresh_interval_secs: u64,
    pub timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            url: "https://schedules.metrarail.com/gtfs/schedule.zip".to_string(),
            refresh_interval_secs: 24 * 60 * 60,
            timeout_secs: 60,
        }
    }
}

impl ScheduleConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Realtime feed settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub url: String,
    pub format: FeedFormat,
    pub credential: Credential,
    pub poll_interval_secs: u64,
    /// Per-fetch timeout; must be shorter than the poll interval.
    pub timeout_secs: u64,
    /// Consecutive failures before logging degraded mode.
    pub degraded_after_failures: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://gtfsapi.metrarail.com/gtfs/tripUpdates".to_string(),
            format: FeedFormat::Json,
            credential: Credential::None,
            poll_interval_secs: 30,
            timeout_secs: 10,
            degraded_after_failures: DEFAULT_DEGRADED_AFTER,
        }
    }
}

impl FeedConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One line and station pair to track.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackerConfig {
    /// Unique name, used in API paths.
    pub id: String,
    /// GTFS `route_id` of the line.
    pub line_id: RouteId,
    pub departure_stop_id: StopId,
    pub arrival_stop_id: StopId,
    /// Overrides the departure stop's schedule name.
    #[serde(default)]
    pub departure_name: Option<String>,
    /// Overrides the arrival stop's schedule name.
    #[serde(default)]
    pub arrival_name: Option<String>,
    /// How long after its departure a train stays listed.
    #[serde(default = "default_grace_secs")]
    pub departure_grace_secs: u64,
}

fn default_grace_secs() -> u64 {
    300
}

impl TrackerConfig {
    pub fn new(
        id: impl Into<String>,
        line_id: impl Into<RouteId>,
        departure_stop_id: impl Into<StopId>,
        arrival_stop_id: impl Into<StopId>,
    ) -> Self {
        Self {
            id: id.into(),
            line_id: line_id.into(),
            departure_stop_id: departure_stop_id.into(),
            arrival_stop_id: arrival_stop_id.into(),
            departure_name: None,
            arrival_name: None,
            departure_grace_secs: default_grace_secs(),
        }
    }

    /// Set display names for the two stations.
    pub fn with_names(mut self, departure: impl Into<String>, arrival: impl Into<String>) -> Self {
        self.departure_name = Some(departure.into());
        self.arrival_name = Some(arrival.into());
        self
    }

    pub fn with_grace_secs(mut self, secs: u64) -> Self {
        self.departure_grace_secs = secs;
        self
    }

    /// Grace period as a duration, capped at one day.
    pub fn departure_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.departure_grace_secs.min(86_400) as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn tracker() -> TrackerConfig {
        TrackerConfig::new("upw-inbound", "UP-W", "OAKPARK", "OTC")
    }

    fn valid() -> AppConfig {
        AppConfig {
            trackers: vec![tracker()],
            ..AppConfig::default()
        }
    }

    #[test]
    fn defaults() {
        let config = AppConfig::default();
        assert_eq!(config.timezone, "America/Chicago");
        assert_eq!(config.listen.port(), 3000);
        assert_eq!(config.schedule.refresh_interval(), Duration::from_secs(86_400));
        assert_eq!(config.feed.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.feed.timeout(), Duration::from_secs(10));
        assert_eq!(config.feed.degraded_after_failures, 3);
        assert_eq!(tracker().departure_grace_secs, 300);
    }

    #[test]
    fn parses_minimal_file() {
        let config = AppConfig::from_json(
            r#"{
                "trackers": [
                    {"id": "upw", "line_id": "UP-W", "departure_stop_id": "OAKPARK", "arrival_stop_id": "OTC"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.trackers.len(), 1);
        assert_eq!(config.trackers[0].line_id.as_str(), "UP-W");
        assert_eq!(config.feed.format, FeedFormat::Json);
        config.validate().unwrap();
    }

    #[test]
    fn parses_full_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "timezone": "America/New_York",
                "listen": "0.0.0.0:8080",
                "schedule": {{"url": "https://example.com/gtfs.zip", "refresh_interval_secs": 3600}},
                "feed": {{
                    "url": "https://example.com/rt",
                    "format": "protobuf",
                    "credential": {{"type": "api_key", "param": "key", "key": "abc"}},
                    "poll_interval_secs": 60,
                    "timeout_secs": 20
                }},
                "trackers": [
                    {{"id": "a", "line_id": "L", "departure_stop_id": "S1", "arrival_stop_id": "S2",
                      "departure_name": "First", "departure_grace_secs": 0}}
                ]
            }}"#
        )
        .unwrap();

        let config = AppConfig::from_file(file.path()).unwrap();
        assert_eq!(config.tz().unwrap(), chrono_tz::America::New_York);
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.schedule.timeout_secs, 60);
        assert_eq!(config.feed.format, FeedFormat::Protobuf);
        assert_eq!(
            config.feed.credential,
            Credential::ApiKey {
                param: "key".into(),
                key: "abc".into()
            }
        );
        assert_eq!(config.trackers[0].departure_name.as_deref(), Some("First"));
        assert_eq!(config.trackers[0].departure_grace(), chrono::Duration::zero());
        config.validate().unwrap();
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppConfig::from_file(dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn rejects_bad_timezone() {
        let config = AppConfig {
            timezone: "Mars/Olympus".into(),
            ..valid()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidTimezone(_))
        ));
    }

    #[test]
    fn rejects_timeout_not_shorter_than_interval() {
        let mut config = valid();
        config.feed.timeout_secs = 30;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_same_stop_pair() {
        let config = AppConfig {
            trackers: vec![TrackerConfig::new("x", "UP-W", "OTC", "OTC")],
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicate_and_missing_trackers() {
        let config = AppConfig {
            trackers: vec![tracker(), tracker()],
            ..AppConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate tracker id"));

        assert!(AppConfig::default().validate().is_err());
    }

    #[test]
    fn env_api_key_overrides_file() {
        let mut config = valid();
        config.feed.credential = Credential::basic("u", "p");
        let env: HashMap<&str, &str> = [(API_KEY_VAR, "k1")].into();

        config.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.feed.credential, Credential::api_key("k1"));
    }

    #[test]
    fn env_password_merges_with_file_username() {
        let mut config = valid();
        config.feed.credential = Credential::basic("metra", "");
        let env: HashMap<&str, &str> = [(PASSWORD_VAR, "secret")].into();

        config.apply_env_overrides(|name| env.get(name).map(|v| v.to_string()));
        assert_eq!(config.feed.credential, Credential::basic("metra", "secret"));
    }

    #[test]
    fn no_env_leaves_credential() {
        let mut config = valid();
        config.apply_env_overrides(|_| None);
        assert_eq!(config.feed.credential, Credential::None);
    }
}
