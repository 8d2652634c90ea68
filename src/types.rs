use reqwest::{header::HeaderMap, StatusCode, Url, Version};

use crate::BoundedBody;

/// A response accepted by [`RetryingClient`](crate::RetryingClient).
///
/// The status may be anything, including a retriable one when the retry
/// budget ran out. The body is capped at the configured maximum size and
/// must be closed (or dropped) to release the connection.
#[derive(Debug)]
pub struct Response {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    /// Final URL after redirects.
    pub url: Url,
    /// Attempts made, including the one that produced this response.
    pub attempts: usize,
    pub body: BoundedBody<reqwest::Response>,
}

impl Response {
    pub(crate) fn accept(response: reqwest::Response, max_bytes: u64, attempts: usize) -> Self {
        Self {
            status: response.status(),
            version: response.version(),
            headers: response.headers().clone(),
            url: response.url().clone(),
            attempts,
            body: BoundedBody::new(response, max_bytes),
        }
    }

    /// Closes the body. Returns `false` if it was already closed.
    pub fn close(&mut self) -> bool {
        self.body.close()
    }
}
