use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showtime_booking::{config::Config, controllers, services::HoldExpirySweeper, AppState};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log));
    if config.app.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    info!("Starting showtime booking API ({})", config.app.environment);

    // Database, migrations, Redis, caches
    let app_state = AppState::new(config.clone())
        .await
        .context("failed to initialize application state")?;
    info!("Database and Redis connected");

    // --- Start background tasks ---

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = HoldExpirySweeper::new(app_state.reservations.clone())
        .with_cache(app_state.cache.clone())
        .spawn(shutdown_rx);

    // --- Start the web server ---

    let app = Router::new()
        .route("/", get(|| async { "Showtime Booking API v1.0" }))
        .route("/health", get(health))
        .nest("/api", controllers::routes())
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("invalid HOST/PORT")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server stopped, waiting for sweeper");
    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        error!("Sweeper task ended abnormally: {}", e);
    }
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, &'static str) {
    if let Err(e) = state.db.ping().await {
        error!("Health check: database unavailable: {}", e);
        return (StatusCode::SERVICE_UNAVAILABLE, "DB DOWN");
    }
    if let Err(e) = state.redis.ping().await {
        error!("Health check: redis unavailable: {}", e);
        return (StatusCode::SERVICE_UNAVAILABLE, "REDIS DOWN");
    }
    (StatusCode::OK, "OK")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
