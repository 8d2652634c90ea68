use std::time::Duration;

use resilient_http::{
    BackoffKind, BackoffStrategy, ClientConfig, RequestContext, RetryingClient, StatusCode,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::var("RESILIENT_HTTP_URL").unwrap_or_else(|_| "https://example.com".into());

    let config = ClientConfig::from_env()?
        .with_max_response_size(64 * 1024)
        .with_backoff_strategy(
            BackoffStrategy::empty()
                .with_backoff(StatusCode::INTERNAL_SERVER_ERROR, BackoffKind::Exponential),
        );
    let client = RetryingClient::new(config)?;

    let request = client.inner().get(&url).build()?;
    let ctx = RequestContext::background().with_timeout(Duration::from_secs(30));
    let mut response = client.execute_with_context(request, &ctx).await?;

    println!(
        "{} after {} attempt(s)",
        response.status, response.attempts
    );
    let body = response.body.text().await?;
    println!("{body}");
    response.close();

    Ok(())
}
