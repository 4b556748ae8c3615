//! Restart configuration record.
//!
//! The configuration is immutable until the host reloads it. Loading never
//! fails because of bad values: an unparseable `restart_time` loads fine and
//! only suspends scheduling, so the operator can fix it with a reload.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, DomainError, DomainResult};
use crate::gate::RestartGate;
use crate::message::Messages;
use crate::time::TimeCalculator;

/// Default daily restart time.
pub const DEFAULT_RESTART_TIME: &str = "03:50";

/// Current configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Daily restart configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Monotonic schema version, only used to warn on downgrades.
    pub config_version: u32,

    /// Daily restart time, `"HH:MM"` on a 24-hour clock.
    pub restart_time: String,

    /// Warn active sessions before they are disconnected.
    pub notify_before_restart: bool,

    pub min_sessions_instant_shutdown: i32,

    /// Fill ratio (0..1) below which a shutdown is admitted.
    pub min_session_percentage_shutdown_allowed: f32,

    /// Terminate at the next epoch boundary while a restart is pending.
    pub shutdown_on_epoch_boundary_if_pending: bool,

    pub messages: Messages,

    pub host: StandaloneHostConfig,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            config_version: CURRENT_CONFIG_VERSION,
            restart_time: DEFAULT_RESTART_TIME.to_string(),
            notify_before_restart: true,
            min_sessions_instant_shutdown: 1,
            min_session_percentage_shutdown_allowed: 0.6,
            shutdown_on_epoch_boundary_if_pending: true,
            messages: Messages::default(),
            host: StandaloneHostConfig::default(),
        }
    }
}

/// Settings for the standalone daemon, which restarts a process by signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandaloneHostConfig {
    /// File holding the PID of the process to restart. Read at termination.
    pub pid_file: Option<PathBuf>,

    /// Signal delivered to that process, e.g. `"SIGTERM"`.
    pub signal: String,
}

impl Default for StandaloneHostConfig {
    fn default() -> Self {
        Self {
            pid_file: None,
            signal: "SIGTERM".to_string(),
        }
    }
}

impl RestartConfig {
    /// Parses a configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` if the file is not valid TOML for this schema
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the time calculator for the configured restart time.
    pub fn calculator(&self) -> DomainResult<TimeCalculator> {
        TimeCalculator::from_config_value(&self.restart_time)
    }

    pub fn gate(&self) -> RestartGate {
        RestartGate::new(
            self.min_sessions_instant_shutdown,
            self.min_session_percentage_shutdown_allowed,
        )
    }

    /// Returns true when switching to `other` requires a new countdown.
    pub fn schedule_changed(&self, other: &RestartConfig) -> bool {
        self.restart_time != other.restart_time
            || self.notify_before_restart != other.notify_before_restart
    }

    /// Returns true when `other` carries an older schema version.
    pub fn is_downgraded_by(&self, other: &RestartConfig) -> bool {
        other.config_version < self.config_version
    }

    /// Reports every problem in the configuration.
    ///
    /// An empty list means the configuration is fully usable.
    pub fn validate(&self) -> Vec<DomainError> {
        let mut issues = Vec::new();

        if let Err(e) = self.calculator() {
            issues.push(e);
        }

        let pct = self.min_session_percentage_shutdown_allowed;
        if !(0.0..=1.0).contains(&pct) {
            issues.push(DomainError::InvalidFieldValue {
                field: "min_session_percentage_shutdown_allowed".to_string(),
                value: pct.to_string(),
                expected: "a value between 0 and 1".to_string(),
            });
        }

        if self.min_sessions_instant_shutdown < 0 {
            issues.push(DomainError::InvalidFieldValue {
                field: "min_sessions_instant_shutdown".to_string(),
                value: self.min_sessions_instant_shutdown.to_string(),
                expected: "a non-negative count".to_string(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = RestartConfig::default();
        assert_eq!(config.restart_time, "03:50");
        assert!(config.notify_before_restart);
        assert_eq!(config.min_sessions_instant_shutdown, 1);
        assert!((config.min_session_percentage_shutdown_allowed - 0.6).abs() < f32::EPSILON);
        assert!(config.shutdown_on_epoch_boundary_if_pending);
        assert_eq!(config.config_version, 1);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RestartConfig::from_toml_str(
            r#"
            restart_time = "05:15"
            notify_before_restart = false

            [messages]
            prefix = "[Maint]"
            "#,
        )
        .unwrap();

        assert_eq!(config.restart_time, "05:15");
        assert!(!config.notify_before_restart);
        assert_eq!(config.min_sessions_instant_shutdown, 1);
        assert_eq!(config.messages.prefix, "[Maint]");
        assert_eq!(config.messages.minute_label, "minute");
        assert_eq!(config.host.signal, "SIGTERM");
    }

    #[test]
    fn test_invalid_time_still_loads() {
        let config = RestartConfig::from_toml_str(r#"restart_time = "25:99""#).unwrap();
        assert!(config.calculator().is_err());

        let issues = config.validate();
        assert_eq!(issues.len(), 1);
        assert!(matches!(
            issues.first(),
            Some(DomainError::InvalidRestartTime { .. })
        ));
    }

    #[test]
    fn test_validate_thresholds() {
        let config = RestartConfig {
            min_session_percentage_shutdown_allowed: 1.5,
            min_sessions_instant_shutdown: -2,
            ..RestartConfig::default()
        };
        assert_eq!(config.validate().len(), 2);
    }

    #[test]
    fn test_schedule_changed() {
        let base = RestartConfig::default();

        let same_schedule = RestartConfig {
            min_sessions_instant_shutdown: 5,
            ..base.clone()
        };
        assert!(!base.schedule_changed(&same_schedule));

        let new_time = RestartConfig {
            restart_time: "04:00".to_string(),
            ..base.clone()
        };
        assert!(base.schedule_changed(&new_time));

        let new_notify = RestartConfig {
            notify_before_restart: false,
            ..base.clone()
        };
        assert!(base.schedule_changed(&new_notify));
    }

    #[test]
    fn test_downgrade_detection() {
        let current = RestartConfig {
            config_version: 2,
            ..RestartConfig::default()
        };
        assert!(current.is_downgraded_by(&RestartConfig::default()));
        assert!(!RestartConfig::default().is_downgraded_by(&current));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "restart_time = \"06:30\"").unwrap();
        writeln!(file, "[host]").unwrap();
        writeln!(file, "pid_file = \"/run/game.pid\"").unwrap();

        let config = RestartConfig::load(file.path()).unwrap();
        assert_eq!(config.restart_time, "06:30");
        assert_eq!(config.host.pid_file, Some(PathBuf::from("/run/game.pid")));
    }

    #[test]
    fn test_load_errors() {
        let err = RestartConfig::load("/nonexistent/autorestart.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "restart_time = [").unwrap();
        let err = RestartConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
