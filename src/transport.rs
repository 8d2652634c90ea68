use std::future::Future;

/// Sends one HTTP request and returns whatever the wire produced.
///
/// Connection pooling, TLS, DNS, and proxies live behind this trait.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, reqwest::Error>> + Send;
}

impl Transport for reqwest::Client {
    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response, reqwest::Error>> + Send {
        self.execute(request)
    }
}
