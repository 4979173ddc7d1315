//! API Server for the DSA Notes Agent
//!
//! Serves `POST /v1/agents/run` and `GET /health`. Memories and session
//! history live in Postgres; the pool connects lazily on first use.

mod routes;
mod state;

use agent_runner::AgentBackends;
use anyhow::Context;
use dsa_core::config::Settings;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env().context("Failed to load settings")?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("{},tower_http=debug", settings.log_filter()).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::debug!("Loaded settings: {:?}", settings);
    tracing::info!(
        "Using database {}:{}/{}",
        settings.database.host,
        settings.database.port,
        settings.database.database
    );

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect_lazy(&settings.database.url())
        .context("Invalid database settings")?;
    let backends = AgentBackends::postgres(pool)?;

    let addr = settings.bind_addr;
    let app = routes::router()
        .with_state(AppState::new(settings, backends))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    tracing::info!("REST API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
