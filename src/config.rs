//! Configuration management for Turnstile.
//!
//! Sources are layered lowest to highest: struct defaults, an optional YAML
//! file, then `TURNSTILE__`-prefixed environment variables using `__` as the
//! section separator (`TURNSTILE__RATE_LIMITING__MAX_REQUESTS=20`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{Policy, Retention, DEFAULT_EVICTION_FACTOR};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "TURNSTILE";

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,

    /// Deployment environment, reported by the health endpoint
    #[serde(default = "default_env")]
    pub env: String,

    /// Overall deadline for a single request in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// How long in-flight requests may drain after a shutdown signal
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            env: default_env(),
            request_timeout_secs: default_request_timeout(),
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3002))
}

fn default_env() -> String {
    "development".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_shutdown_grace() -> u64 {
    5
}

impl ServerConfig {
    /// Overall request deadline.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Drain period after a shutdown signal.
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// How the admission layer derives a client key from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStrategy {
    /// IP address of the TCP peer
    #[default]
    Peer,
    /// First address in a trusted forwarding header, set by a proxy
    Forwarded,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Whether requests are limited at all
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Requests admitted per key per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,

    /// Window length in milliseconds
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Client key extraction strategy
    #[serde(default)]
    pub key_strategy: KeyStrategy,

    /// Header read when `key_strategy` is `forwarded`
    #[serde(default = "default_forwarded_header")]
    pub forwarded_header: String,

    /// Interval between eviction sweeps in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Entries idle for this many windows are evicted
    #[serde(default = "default_eviction_factor")]
    pub eviction_factor: u32,

    /// Upper bound on tracked client keys
    #[serde(default)]
    pub max_tracked_keys: Option<usize>,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            key_strategy: KeyStrategy::default(),
            forwarded_header: default_forwarded_header(),
            sweep_interval_secs: default_sweep_interval(),
            eviction_factor: default_eviction_factor(),
            max_tracked_keys: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_max_requests() -> u64 {
    20
}

fn default_window_ms() -> u64 {
    5000
}

fn default_forwarded_header() -> String {
    "x-forwarded-for".to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_eviction_factor() -> u32 {
    DEFAULT_EVICTION_FACTOR
}

impl RateLimitingConfig {
    /// Window length.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Interval between eviction sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Build the validated admission policy.
    pub fn policy(&self) -> Result<Policy> {
        Policy::new(self.max_requests, self.window(), self.enabled)
    }

    /// Build the retention settings for the key map.
    pub fn retention(&self) -> Result<Retention> {
        if self.eviction_factor == 0 {
            return Err(TurnstileError::InvalidPolicy(
                "eviction_factor must be at least 1".to_string(),
            ));
        }
        if self.max_tracked_keys == Some(0) {
            return Err(TurnstileError::InvalidPolicy(
                "max_tracked_keys must be greater than zero when set".to_string(),
            ));
        }

        Ok(Retention {
            eviction_factor: self.eviction_factor,
            max_tracked_keys: self.max_tracked_keys,
        })
    }
}

impl TurnstileConfig {
    /// Load configuration from an optional file plus process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load configuration, reading overrides from `env` instead of the
    /// process environment when given.
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let environment = ::config::Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .source(env);

        let config: TurnstileConfig = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: TurnstileConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with.
    pub fn validate(&self) -> Result<()> {
        self.rate_limiting.policy()?;
        self.rate_limiting.retention()?;

        if self.rate_limiting.sweep_interval_secs == 0 {
            return Err(TurnstileError::Config(
                "sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.server.request_timeout_secs == 0 {
            return Err(TurnstileError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
