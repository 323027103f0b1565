//! Resolution retry and background refresh configuration.

use std::time::Duration;

use snafu::ensure;

use crate::error::{InvalidConfigurationSnafu, Result};

/// Default number of lookup attempts per candidate.
const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default initial backoff between lookup attempts (50 milliseconds).
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Default maximum backoff between lookup attempts (1 second).
const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(1);

/// Default backoff multiplier.
const DEFAULT_MULTIPLIER: f64 = 2.0;

/// Default jitter factor.
const DEFAULT_JITTER: f64 = 0.25;

/// Default endpoint refresh interval (60 seconds).
const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Retry policy for resolving a single candidate endpoint.
///
/// Resolution runs on the connection hot path, so the defaults are tight:
/// a candidate that cannot be resolved quickly is skipped in favor of the
/// next one rather than retried at length.
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    /// Maximum number of lookup attempts per candidate (including the first).
    pub max_attempts: u32,

    /// Initial backoff duration before the first retry.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Backoff multiplier for exponential increase.
    pub multiplier: f64,

    /// Jitter factor (0.0 to 1.0) for randomizing backoff.
    pub jitter: f64,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: DEFAULT_JITTER,
        }
    }
}

impl ResolutionConfig {
    /// Creates a new resolution config builder.
    #[must_use]
    pub fn builder() -> ResolutionConfigBuilder {
        ResolutionConfigBuilder::default()
    }

    /// Creates a policy that attempts each lookup exactly once.
    #[must_use]
    pub fn no_retry() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }
}

/// Builder for [`ResolutionConfig`].
#[derive(Debug, Default)]
pub struct ResolutionConfigBuilder {
    max_attempts: Option<u32>,
    initial_backoff: Option<Duration>,
    max_backoff: Option<Duration>,
    multiplier: Option<f64>,
    jitter: Option<f64>,
}

impl ResolutionConfigBuilder {
    /// Sets the maximum number of lookup attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    /// Sets the initial backoff duration.
    #[must_use]
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = Some(backoff);
        self
    }

    /// Sets the maximum backoff duration.
    #[must_use]
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = Some(backoff);
        self
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Sets the jitter factor (0.0 to 1.0).
    #[must_use]
    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Builds the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if:
    /// - `max_attempts` is zero
    /// - `multiplier` is less than 1.0
    /// - `jitter` is outside `0.0..=1.0`
    /// - `initial_backoff` exceeds `max_backoff`
    pub fn build(self) -> Result<ResolutionConfig> {
        let config = ResolutionConfig {
            max_attempts: self.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
            initial_backoff: self.initial_backoff.unwrap_or(DEFAULT_INITIAL_BACKOFF),
            max_backoff: self.max_backoff.unwrap_or(DEFAULT_MAX_BACKOFF),
            multiplier: self.multiplier.unwrap_or(DEFAULT_MULTIPLIER),
            jitter: self.jitter.unwrap_or(DEFAULT_JITTER),
        };

        ensure!(
            config.max_attempts >= 1,
            InvalidConfigurationSnafu { message: "max_attempts must be at least 1" }
        );
        ensure!(
            config.multiplier >= 1.0,
            InvalidConfigurationSnafu { message: "multiplier must be at least 1.0" }
        );
        ensure!(
            (0.0..=1.0).contains(&config.jitter),
            InvalidConfigurationSnafu { message: "jitter must be between 0.0 and 1.0" }
        );
        ensure!(
            config.initial_backoff <= config.max_backoff,
            InvalidConfigurationSnafu { message: "initial_backoff cannot exceed max_backoff" }
        );

        Ok(config)
    }
}

/// Configuration for background endpoint refresh.
///
/// When enabled, a [`RefreshingHostProvider`](crate::RefreshingHostProvider)
/// periodically re-fetches the authoritative server list from its source and
/// applies it for failover and load distribution.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use ensemble_hosts::RefreshConfig;
///
/// let config = RefreshConfig::enabled().with_interval(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    /// Whether background refresh is enabled.
    enabled: bool,

    /// How often to re-fetch the server list.
    interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self { enabled: false, interval: DEFAULT_REFRESH_INTERVAL }
    }
}

impl RefreshConfig {
    /// Creates a disabled refresh configuration.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Creates an enabled refresh configuration with default settings.
    #[must_use]
    pub fn enabled() -> Self {
        Self { enabled: true, interval: DEFAULT_REFRESH_INTERVAL }
    }

    /// Sets the refresh interval.
    ///
    /// Default: 60 seconds. Must be non-zero when refresh is enabled;
    /// validated at provider construction.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Returns whether background refresh is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Returns the refresh interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}
