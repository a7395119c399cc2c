//! Engine tunables loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use dispatch_core::extension::{
    ExtensionBounds, DEFAULT_MAX_EXTENSION_MINUTES, DEFAULT_MIN_EXTENSION_MINUTES,
};
use dispatch_core::liveness::DEFAULT_LIVENESS_WINDOW_SECS;
use dispatch_core::overtime::PausePolicy;
use dispatch_core::task_lifecycle::DEFAULT_TASK_MAX_MINUTES;

/// A configuration value that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("{key} has invalid value '{value}'")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
}

/// Read `key` from the environment, falling back to `default` when unset.
pub fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError { key, value: raw }),
        Err(_) => Ok(default),
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub extension_bounds: ExtensionBounds,
    /// Upper bound on a new task's allotted minutes.
    pub task_max_minutes: i32,
    pub pause_policy: PausePolicy,
    pub overtime_scan_interval: Duration,
    pub reconcile_interval: Duration,
    /// A session must have seen activity within this window to count as live.
    pub liveness_window: chrono::Duration,
    /// Dead sessions are purged once this old.
    pub session_retention: chrono::Duration,
    pub session_sweep_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            extension_bounds: ExtensionBounds::default(),
            task_max_minutes: DEFAULT_TASK_MAX_MINUTES,
            pause_policy: PausePolicy::default(),
            overtime_scan_interval: Duration::from_secs(30),
            reconcile_interval: Duration::from_secs(60),
            liveness_window: chrono::Duration::seconds(DEFAULT_LIVENESS_WINDOW_SECS),
            session_retention: chrono::Duration::hours(168),
            session_sweep_interval: Duration::from_secs(60),
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default |
    /// |--------------------------------|---------|
    /// | `EXTENSION_MIN_MINUTES`        | `5`     |
    /// | `EXTENSION_MAX_MINUTES`        | `480`   |
    /// | `TASK_MAX_MINUTES`             | `1440`  |
    /// | `OVERTIME_EXCLUDES_PAUSED`     | `false` |
    /// | `OVERTIME_SCAN_INTERVAL_SECS`  | `30`    |
    /// | `RECONCILE_INTERVAL_SECS`      | `60`    |
    /// | `SESSION_LIVENESS_WINDOW_SECS` | `300`   |
    /// | `SESSION_RETENTION_HOURS`      | `168`   |
    /// | `SESSION_SWEEP_INTERVAL_SECS`  | `60`    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let min_minutes = env_or("EXTENSION_MIN_MINUTES", DEFAULT_MIN_EXTENSION_MINUTES)?;
        let max_minutes = env_or("EXTENSION_MAX_MINUTES", DEFAULT_MAX_EXTENSION_MINUTES)?;
        if min_minutes <= 0 || max_minutes < min_minutes {
            return Err(ConfigError {
                key: "EXTENSION_MAX_MINUTES",
                value: format!("{min_minutes}..{max_minutes}"),
            });
        }

        let pause_policy = if env_or("OVERTIME_EXCLUDES_PAUSED", false)? {
            PausePolicy::ExcludePaused
        } else {
            PausePolicy::IncludePaused
        };

        let config = Self {
            extension_bounds: ExtensionBounds {
                min_minutes,
                max_minutes,
            },
            task_max_minutes: env_or("TASK_MAX_MINUTES", DEFAULT_TASK_MAX_MINUTES)?,
            pause_policy,
            overtime_scan_interval: Duration::from_secs(env_or("OVERTIME_SCAN_INTERVAL_SECS", 30)?),
            reconcile_interval: Duration::from_secs(env_or("RECONCILE_INTERVAL_SECS", 60)?),
            liveness_window: chrono::Duration::seconds(env_or(
                "SESSION_LIVENESS_WINDOW_SECS",
                DEFAULT_LIVENESS_WINDOW_SECS,
            )?),
            session_retention: chrono::Duration::hours(env_or("SESSION_RETENTION_HOURS", 168)?),
            session_sweep_interval: Duration::from_secs(env_or("SESSION_SWEEP_INTERVAL_SECS", 60)?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the background loops cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let intervals = [
            ("OVERTIME_SCAN_INTERVAL_SECS", self.overtime_scan_interval),
            ("RECONCILE_INTERVAL_SECS", self.reconcile_interval),
            ("SESSION_SWEEP_INTERVAL_SECS", self.session_sweep_interval),
        ];
        for (key, interval) in intervals {
            if interval.is_zero() {
                return Err(ConfigError {
                    key,
                    value: "0".to_string(),
                });
            }
        }
        if self.liveness_window <= chrono::Duration::zero() {
            return Err(ConfigError {
                key: "SESSION_LIVENESS_WINDOW_SECS",
                value: self.liveness_window.num_seconds().to_string(),
            });
        }
        Ok(())
    }
}
