//! AQI Tracker server.
//!
//! Serves the session state machine over HTTP; see [`aqi_tracker::api`] for
//! the endpoint list.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use aqi_tracker::api::{self, AppState};
use aqi_tracker::config::Config;
use aqi_tracker::controller::ViewController;
use aqi_tracker::generative::GeminiClient;
use aqi_tracker::storage::ProfileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Profile health conditions and the API key are never logged, at any level.
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("aqi_tracker=info".parse()?))
        .init();

    let config = Config::from_env()?;

    info!(
        port = config.port,
        db_url = %config.database_url,
        model = %config.model,
        credential = config.api_key.is_some(),
        "Starting AQI tracker"
    );

    let store = ProfileStore::new(&config.database_url).await?;
    info!("Database initialized");

    let client = GeminiClient::with_base_url(&config.api_base_url, &config.model, config.api_key.clone());
    let controller = ViewController::new(store, Arc::new(client));

    let view = controller.restore().await?;
    info!(view = ?view, "Session restored");

    let app = api::router(AppState { controller });

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    info!(%addr, "AQI tracker is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
