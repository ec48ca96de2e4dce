//! Sentinel API server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use sentinel_api::config::Config;
use sentinel_api::error::ServerError;
use sentinel_api::routes;
use sentinel_api::routes::events;
use sentinel_api::state::{AppState, build_state};
use sentinel_core::clock::{Clock, SystemClock};
use sentinel_resilience::executor::ExecuteOptions;
use sentinel_resilience::rate_limit::FixedWindowRateLimiter;
use sentinel_store::pg_store::{PgStore, run_migrations};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Sentinel API server");

    let config = Config::from_env()?;
    sentinel_resilience::metrics::register_metrics();
    sentinel_outbox::metrics::register_metrics();

    // Create database connection pool.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    run_migrations(&pool).await?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rate_limiter = Arc::new(FixedWindowRateLimiter::new(
        config.rate_limit.max_requests,
        config.rate_limit.window,
        Arc::clone(&clock),
    ));
    let app_state = build_state(&config, Arc::new(PgStore::new(pool)), clock, rate_limiter)?;

    if let Some(interval) = config.poll_interval {
        spawn_poller(app_state.clone(), interval);
    }

    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app = routes::router(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}

/// Runs one outbox batch every `interval` until the process exits.
fn spawn_poller(state: AppState, interval: std::time::Duration) {
    tracing::info!(
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "starting outbox poller"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let options = ExecuteOptions::default()
                .skip_rate_limit()
                .timeout(events::batch_timeout(&state));
            let worker = Arc::clone(&state.worker);
            let result = state
                .executor
                .execute_with(events::PROCESS_BATCH_OPERATION, options, move || async move {
                    worker.process_default_batch().await
                })
                .await;
            if let Err(err) = result {
                tracing::warn!(code = %err.code(), error = %err, "scheduled batch failed");
            }
        }
    });
}
