use axum::http::Request;
use clap::Parser; // for cli
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use page_views::config::Args;
use page_views::rate_limit::{self, FixedWindowLimiter, RateLimiter};
use page_views::{AppState, router, store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    args.validate()?;

    // a bad database config is logged and answered with 500s, not fatal
    let store = store::connect(
        args.database_url.as_deref(),
        args.database_token.as_deref(),
        args.store_timeout(),
    )
    .await;

    let limiter: Arc<dyn RateLimiter> = Arc::new(FixedWindowLimiter::new(
        args.rate_limit,
        args.rate_window(),
        args.retry_after,
    ));

    // spawn the background sweeper
    if let Some(every) = args.sweep_interval() {
        tokio::spawn(rate_limit::sweeper(Arc::clone(&limiter), every));
    }

    let state = Arc::new(AppState::from_args(&args, store, limiter));

    let app = router(state).layer(TraceLayer::new_for_http().make_span_with(
        |request: &Request<_>| {
            tracing::span!(
                Level::INFO,
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
            )
        },
    ));

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!(
        addr = %addr,
        rate_limit = args.rate_limit,
        rate_window_secs = args.rate_window,
        retry_after = ?args.retry_after,
        quota = ?args.quota,
        kinds = ?args.kinds,
        "page view counter listening"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
