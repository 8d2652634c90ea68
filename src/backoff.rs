//! Backoff kinds and the status-code to backoff mapping.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

/// How the wait between attempts evolves.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Every wait equals the configured minimum.
    Constant,
    /// The wait doubles after each attempt, capped at the configured maximum.
    Exponential,
}

impl BackoffKind {
    /// Computes the wait that follows `current`.
    pub fn next_wait(self, current: Duration, min: Duration, max: Duration) -> Duration {
        match self {
            Self::Constant => min,
            Self::Exponential => current.saturating_mul(2).min(max),
        }
    }
}

/// What caused an attempt to be retried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RetryTrigger {
    /// A response with a status present in the backoff map.
    Status(StatusCode),
    /// No response was received.
    Transport,
}

/// Mapping from HTTP status code to [`BackoffKind`].
///
/// Only statuses present in the map are retried; the map is not an
/// allow-list layered over some built-in notion of "retriable". Transport
/// errors look up a separate "no status" entry which defaults to
/// [`BackoffKind::Constant`] when unset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackoffStrategy {
    by_status: HashMap<StatusCode, BackoffKind>,
    on_transport_error: Option<BackoffKind>,
}

impl Default for BackoffStrategy {
    fn default() -> Self {
        Self::empty()
            .with_backoff(StatusCode::TOO_MANY_REQUESTS, BackoffKind::Exponential)
            .with_backoff(StatusCode::BAD_GATEWAY, BackoffKind::Constant)
            .with_backoff(StatusCode::SERVICE_UNAVAILABLE, BackoffKind::Constant)
            .with_backoff(StatusCode::GATEWAY_TIMEOUT, BackoffKind::Constant)
    }
}

impl BackoffStrategy {
    /// A map with no retriable statuses.
    pub fn empty() -> Self {
        Self {
            by_status: HashMap::new(),
            on_transport_error: None,
        }
    }

    /// Sets (or overrides) the backoff for `status`.
    pub fn with_backoff(mut self, status: StatusCode, kind: BackoffKind) -> Self {
        self.by_status.insert(status, kind);
        self
    }

    /// Removes `status` from the map so it is never retried.
    pub fn without_backoff(mut self, status: StatusCode) -> Self {
        self.by_status.remove(&status);
        self
    }

    /// Sets the backoff used after transport errors.
    pub fn with_transport_backoff(mut self, kind: BackoffKind) -> Self {
        self.on_transport_error = Some(kind);
        self
    }

    /// Merges `overrides` onto `self`; entries in `overrides` win.
    pub fn merge(mut self, overrides: &BackoffStrategy) -> Self {
        self.by_status
            .extend(overrides.by_status.iter().map(|(status, kind)| (*status, *kind)));
        if overrides.on_transport_error.is_some() {
            self.on_transport_error = overrides.on_transport_error;
        }
        self
    }

    /// Returns the configured kind for `status`, if it is retriable.
    pub fn get(&self, status: StatusCode) -> Option<BackoffKind> {
        self.by_status.get(&status).copied()
    }

    /// Returns the kind used to compute the wait after `trigger`.
    pub fn kind_for(&self, trigger: RetryTrigger) -> BackoffKind {
        let kind = match trigger {
            RetryTrigger::Status(status) => self.get(status),
            RetryTrigger::Transport => self.on_transport_error,
        };
        kind.unwrap_or(BackoffKind::Constant)
    }

    /// Iterates the configured statuses.
    pub fn statuses(&self) -> impl Iterator<Item = StatusCode> + '_ {
        self.by_status.keys().copied()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        match self
            .by_status
            .keys()
            .find(|status| !(100..=599).contains(&status.as_u16()))
        {
            Some(status) => Err(format!(
                "backoff status code {} is outside 100..=599",
                status.as_u16()
            )),
            None => Ok(()),
        }
    }
}
