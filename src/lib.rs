//! `resilient-http` is an async HTTP client wrapper with retries and bounded
//! response bodies.
//!
//! - [`RetryingClient::execute`] retries transport errors and the statuses
//!   listed in a [`BackoffStrategy`], waiting between attempts with
//!   [`BackoffKind::Constant`] or [`BackoffKind::Exponential`] backoff.
//! - Accepted responses carry a [`BoundedBody`] that stops yielding data at
//!   [`ClientConfig::max_response_size`].
//! - A [`RequestContext`] cancels an in-flight request or backoff wait.

mod backoff;
mod body;
mod client;
mod context;
mod error;
mod options;
mod transport;
mod types;

pub use backoff::{BackoffKind, BackoffStrategy, RetryTrigger};
pub use body::{BodyStream, BoundedBody};
pub use client::RetryingClient;
pub use context::RequestContext;
pub use error::Error;
pub use options::ClientConfig;
pub use transport::Transport;
pub use types::Response;

pub use reqwest::{Method, Request, StatusCode, Url};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, Error>;
