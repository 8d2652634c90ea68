use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::{
    backoff::RetryTrigger, BodyStream, BoundedBody, ClientConfig, Error, RequestContext, Response,
    Result, Transport,
};

/// HTTP client that retries transient failures with per-status backoff.
///
/// Cloning is cheap; clones share the transport and configuration. Each call
/// to [`execute`](Self::execute) keeps its own retry state, so concurrent
/// calls do not interact.
pub struct RetryingClient<T = reqwest::Client> {
    transport: Arc<T>,
    config: Arc<ClientConfig>,
}

impl<T> Clone for RetryingClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: Arc::clone(&self.config),
        }
    }
}

impl<T> fmt::Debug for RetryingClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RetryingClient<reqwest::Client> {
    /// Builds a `reqwest` transport from `config`.
    ///
    /// Proxies are taken from the environment; pool size, idle timeout,
    /// connect timeout, keepalive, and the per-attempt timeout come from
    /// `config`. A zero per-attempt timeout disables it.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = reqwest::Client::builder();
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        let http = builder
            .connect_timeout(config.connect_timeout)
            .pool_max_idle_per_host(config.max_idle_connections)
            .pool_idle_timeout(config.idle_timeout)
            .tcp_keepalive(config.tcp_keepalive)
            .build()
            .map_err(Error::Build)?;
        Self::with_transport(config, http)
    }

    /// Returns the underlying `reqwest::Client`, for building requests.
    pub fn inner(&self) -> &reqwest::Client {
        &self.transport
    }
}

impl<T: Transport> RetryingClient<T> {
    /// Creates a client that sends through `transport`.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport: Arc::new(transport),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Wraps `body` with this client's response size ceiling.
    pub fn limit_body<S: BodyStream>(&self, body: S) -> BoundedBody<S> {
        BoundedBody::new(body, self.config.max_response_size)
    }

    /// Sends `request`, retrying per the configured backoff map. The request
    /// is never cancelled.
    pub async fn execute(&self, request: reqwest::Request) -> Result<Response> {
        self.execute_with_context(request, &RequestContext::background())
            .await
    }

    /// Sends `request`, retrying per the configured backoff map until a
    /// response is accepted, the retry budget runs out, or `ctx` fires.
    ///
    /// Statuses absent from the backoff map are returned immediately. When the
    /// budget is exhausted the last response is returned as-is, whatever its
    /// status; a transport error on the last attempt is returned verbatim.
    ///
    /// Each attempt sends a clone of `request`. A request whose body cannot be
    /// cloned is sent once, without retries.
    #[cfg_attr(
        feature = "tracing",
        tracing::instrument(
            name = "resilient_http.execute",
            skip_all,
            fields(method = %request.method(), url = %request.url())
        )
    )]
    pub async fn execute_with_context(
        &self,
        request: reqwest::Request,
        ctx: &RequestContext,
    ) -> Result<Response> {
        let mut state = RetryState::new(&self.config);

        while state.has_retries_left() {
            let Some(outgoing) = request.try_clone() else {
                #[cfg(feature = "tracing")]
                tracing::warn!("request body cannot be cloned; sending without retries");
                break;
            };
            let attempt = state.begin_attempt();

            let trigger = match self.send(outgoing, ctx).await? {
                Ok(response) => {
                    let status = response.status();
                    if self.config.backoff_strategy.get(status).is_none() {
                        return Ok(Response::accept(
                            response,
                            self.config.max_response_size,
                            attempt,
                        ));
                    }
                    // Release the connection before sleeping.
                    drop(response);
                    RetryTrigger::Status(status)
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(attempt, error = %_err, "transport error");
                    RetryTrigger::Transport
                }
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(attempt, ?trigger, wait = ?state.wait, "retrying after backoff");

            ctx.sleep(state.wait).await?;
            state.advance(self.config.backoff_strategy.kind_for(trigger));
        }

        let attempt = state.begin_attempt();
        let response = self.send(request, ctx).await?.map_err(Error::Transport)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(attempt, status = %response.status(), "accepting final response");

        Ok(Response::accept(
            response,
            self.config.max_response_size,
            attempt,
        ))
    }

    /// One attempt, raced against the context. The outer error is the
    /// context's; the inner one is the transport's.
    async fn send(
        &self,
        request: reqwest::Request,
        ctx: &RequestContext,
    ) -> Result<std::result::Result<reqwest::Response, reqwest::Error>> {
        if let Some(err) = ctx.err() {
            return Err(err);
        }
        ctx.run(self.transport.send(request)).await
    }
}

/// Per-call retry bookkeeping.
struct RetryState<'a> {
    config: &'a ClientConfig,
    attempts: usize,
    wait: Duration,
}

impl<'a> RetryState<'a> {
    fn new(config: &'a ClientConfig) -> Self {
        Self {
            config,
            attempts: 0,
            wait: config.retry_wait_min,
        }
    }

    /// Whether the next attempt may still be followed by another one.
    fn has_retries_left(&self) -> bool {
        self.attempts < self.config.retry_max
    }

    /// Counts an attempt and returns its 1-based number.
    fn begin_attempt(&mut self) -> usize {
        self.attempts += 1;
        self.attempts
    }

    fn advance(&mut self, kind: crate::BackoffKind) {
        self.wait = kind.next_wait(
            self.wait,
            self.config.retry_wait_min,
            self.config.retry_wait_max,
        );
    }
}
