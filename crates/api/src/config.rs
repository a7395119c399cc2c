use std::time::Duration;

use dispatch_engine::config::{env_or, ConfigError};
use dispatch_engine::EngineConfig;

use crate::auth::jwt::JwtConfig;

/// Server configuration loaded from environment variables.
///
/// All fields except the JWT secret have defaults suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long background jobs get to finish after shutdown starts.
    pub shutdown_timeout_secs: u64,
    pub heartbeat: HeartbeatConfig,
    pub jwt: JwtConfig,
    pub engine: EngineConfig,
}

/// WebSocket liveness probing.
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// Time between pings.
    pub interval: Duration,
    /// How long a connection may stay silent after a ping before it is
    /// reported as suspect, and again before it is dropped.
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default                 |
    /// |--------------------------|-------------------------|
    /// | `HOST`                   | `0.0.0.0`               |
    /// | `PORT`                   | `3000`                  |
    /// | `CORS_ORIGINS`           | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`   | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`  | `30`                    |
    /// | `HEARTBEAT_INTERVAL_SECS`| `30`                    |
    /// | `HEARTBEAT_TIMEOUT_SECS` | `10`                    |
    ///
    /// JWT settings come from [`JwtConfig::from_env`], engine tunables from
    /// [`EngineConfig::from_env`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let heartbeat = HeartbeatConfig {
            interval: Duration::from_secs(env_or("HEARTBEAT_INTERVAL_SECS", 30)?),
            timeout: Duration::from_secs(env_or("HEARTBEAT_TIMEOUT_SECS", 10)?),
        };
        if heartbeat.interval.is_zero() || heartbeat.timeout.is_zero() {
            return Err(ConfigError {
                key: "HEARTBEAT_INTERVAL_SECS",
                value: format!("{:?}/{:?}", heartbeat.interval, heartbeat.timeout),
            });
        }

        Ok(Self {
            host,
            port: env_or("PORT", 3000)?,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: env_or("SHUTDOWN_TIMEOUT_SECS", 30)?,
            heartbeat,
            jwt: JwtConfig::from_env()?,
            engine: EngineConfig::from_env()?,
        })
    }
}
