use std::time::Duration;

use crate::{BackoffStrategy, Error, Result};

/// Configures timeouts, retry behavior, and response size limits.
///
/// A client takes its own copy at construction; nothing can change it
/// afterwards, so concurrent requests always see the same values.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientConfig {
    /// Per-attempt request timeout. Zero means no timeout.
    pub timeout: Duration,
    /// Maximum number of retries after the initial attempt.
    pub retry_max: usize,
    /// Initial wait between attempts; also the constant-backoff wait.
    pub retry_wait_min: Duration,
    /// Upper bound for exponential backoff.
    pub retry_wait_max: Duration,
    /// Byte ceiling for accepted response bodies. `0` yields empty bodies.
    pub max_response_size: u64,
    /// Idle connections kept per host by the transport pool.
    pub max_idle_connections: usize,
    /// How long an idle pooled connection is kept.
    pub idle_timeout: Duration,
    /// Timeout for establishing a connection.
    pub connect_timeout: Duration,
    /// TCP keepalive interval.
    pub tcp_keepalive: Duration,
    /// Retriable statuses and their backoff.
    pub backoff_strategy: BackoffStrategy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(15),
            retry_max: 3,
            retry_wait_min: Duration::from_secs(1),
            retry_wait_max: Duration::from_secs(15),
            max_response_size: 1024 * 1024,
            max_idle_connections: 5,
            idle_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(15),
            tcp_keepalive: Duration::from_secs(10),
            backoff_strategy: BackoffStrategy::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_max(mut self, retry_max: usize) -> Self {
        self.retry_max = retry_max;
        self
    }

    pub fn with_retry_wait_min(mut self, wait: Duration) -> Self {
        self.retry_wait_min = wait;
        self
    }

    pub fn with_retry_wait_max(mut self, wait: Duration) -> Self {
        self.retry_wait_max = wait;
        self
    }

    pub fn with_max_response_size(mut self, max_bytes: u64) -> Self {
        self.max_response_size = max_bytes;
        self
    }

    pub fn with_max_idle_connections(mut self, max: usize) -> Self {
        self.max_idle_connections = max;
        self
    }

    /// Merges `overrides` onto the current backoff map.
    pub fn with_backoff_strategy(mut self, overrides: BackoffStrategy) -> Self {
        self.backoff_strategy = self.backoff_strategy.merge(&overrides);
        self
    }

    /// Replaces the backoff map entirely, dropping the defaults.
    pub fn with_backoff_map(mut self, strategy: BackoffStrategy) -> Self {
        self.backoff_strategy = strategy;
        self
    }

    /// Loads defaults overridden by environment variables.
    ///
    /// Reads (all optional):
    /// - `RESILIENT_HTTP_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_RETRY_MAX`
    /// - `RESILIENT_HTTP_RETRY_WAIT_MIN_MS`
    /// - `RESILIENT_HTTP_RETRY_WAIT_MAX_MS`
    /// - `RESILIENT_HTTP_MAX_RESPONSE_SIZE`
    /// - `RESILIENT_HTTP_MAX_IDLE_CONNECTIONS`
    ///
    /// Returns [`Error::Config`] if a variable is set but not a valid integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let parse = |key: &str| -> Result<Option<u64>> {
            match lookup(key) {
                None => Ok(None),
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Some)
                    .map_err(|err| Error::Config(format!("{key}={raw:?}: {err}"))),
            }
        };

        let mut config = Self::default();
        if let Some(ms) = parse("RESILIENT_HTTP_TIMEOUT_MS")? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(n) = parse("RESILIENT_HTTP_RETRY_MAX")? {
            config.retry_max = to_usize("RESILIENT_HTTP_RETRY_MAX", n)?;
        }
        if let Some(ms) = parse("RESILIENT_HTTP_RETRY_WAIT_MIN_MS")? {
            config.retry_wait_min = Duration::from_millis(ms);
        }
        if let Some(ms) = parse("RESILIENT_HTTP_RETRY_WAIT_MAX_MS")? {
            config.retry_wait_max = Duration::from_millis(ms);
        }
        if let Some(n) = parse("RESILIENT_HTTP_MAX_RESPONSE_SIZE")? {
            config.max_response_size = n;
        }
        if let Some(n) = parse("RESILIENT_HTTP_MAX_IDLE_CONNECTIONS")? {
            config.max_idle_connections = to_usize("RESILIENT_HTTP_MAX_IDLE_CONNECTIONS", n)?;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks wait bounds and backoff status codes.
    pub fn validate(&self) -> Result<()> {
        if self.retry_wait_min > self.retry_wait_max {
            return Err(Error::Config(format!(
                "retry_wait_min ({:?}) must not exceed retry_wait_max ({:?})",
                self.retry_wait_min, self.retry_wait_max
            )));
        }
        self.backoff_strategy.validate().map_err(Error::Config)
    }
}

fn to_usize(key: &str, value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::Config(format!("{key}={value} is too large")))
}
