//! Layered runtime settings.
//!
//! Priority, lowest to highest: built-in defaults, an optional YAML file,
//! then `APP_`-prefixed environment variables with `__` separating nested
//! keys (`APP_RATE_LIMIT__MAX_REQUESTS_PER_MINUTE=120`).

use std::path::Path;
use std::time::Duration;

use agent_policy::{RateLimit, RateLimitScope};
use agent_telemetry::TelemetrySettings;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "APP_";

/// Dispatch rate limiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    /// Whether dispatches are rate limited at all.
    pub enabled: bool,
    /// Requests accepted per sliding minute.
    pub max_requests_per_minute: u32,
    /// Minimum rejection period once the limit trips.
    pub cooldown_secs: u64,
    /// Per-agent or global accounting.
    pub scope: RateLimitScope,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests_per_minute: 60,
            cooldown_secs: 1,
            scope: RateLimitScope::PerAgent,
        }
    }
}

impl RateLimitSettings {
    /// Returns the limiter configuration.
    #[must_use]
    pub fn limit(&self) -> RateLimit {
        RateLimit::per_minute(self.max_requests_per_minute)
            .with_cooldown(Duration::from_secs(self.cooldown_secs))
    }
}

/// Code sandbox limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    /// Interpreter executable.
    pub interpreter: String,
    /// Timeout used when a call supplies none.
    pub default_timeout_secs: u64,
    /// Upper bound for requested timeouts.
    pub max_timeout_secs: u64,
    /// Cap on captured output.
    pub max_output_bytes: usize,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            default_timeout_secs: 30,
            max_timeout_secs: 300,
            max_output_bytes: 64 * 1024,
        }
    }
}

/// All runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Rate limiting.
    pub rate_limit: RateLimitSettings,
    /// Code sandbox.
    pub sandbox: SandboxSettings,
    /// Tracing subscriber.
    pub telemetry: TelemetrySettings,
}

impl RuntimeSettings {
    /// Builds the provider stack without extracting it.
    #[must_use]
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Loads and validates settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Settings`] when a source does not parse and
    /// [`ConfigError::InvalidSetting`] when a value is out of range.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let settings: Self = Self::figment(path).extract().map_err(Box::new)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] for the first bad value.
    pub fn validate(&self) -> ConfigResult<()> {
        let invalid = |key, reason: &str| {
            Err(ConfigError::InvalidSetting {
                key,
                reason: reason.to_owned(),
            })
        };
        if self.rate_limit.max_requests_per_minute == 0 {
            return invalid("rate_limit.max_requests_per_minute", "must be greater than zero");
        }
        if self.sandbox.default_timeout_secs == 0 {
            return invalid("sandbox.default_timeout_secs", "must be greater than zero");
        }
        if self.sandbox.max_timeout_secs < self.sandbox.default_timeout_secs {
            return invalid(
                "sandbox.max_timeout_secs",
                "must not be below sandbox.default_timeout_secs",
            );
        }
        if self.sandbox.interpreter.trim().is_empty() {
            return invalid("sandbox.interpreter", "must not be empty");
        }
        Ok(())
    }
}
