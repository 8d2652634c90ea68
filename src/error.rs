/// Error type returned by this crate.
///
/// Non-success HTTP statuses are never reported here: a `503` that survives
/// every retry comes back as a normal [`Response`](crate::Response).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No response was obtained (connect, DNS, TLS, timeout) from `reqwest`.
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),
    /// The request context was cancelled before a response was accepted.
    #[error("request cancelled")]
    Cancelled,
    /// The request context deadline passed before a response was accepted.
    #[error("request deadline exceeded")]
    DeadlineExceeded,
    /// An accepted response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),
    /// Invalid client configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The underlying `reqwest` client could not be built.
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

impl Error {
    /// Returns `true` for errors raised by the request context.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
