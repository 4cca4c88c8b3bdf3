//! ForestWatch - NDVI change detection service.
//!
//! # API Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /config` - Default detection parameters
//! - `POST /validate-coordinates` - Validate a bounding box
//! - `POST /detect` - Detect vegetation loss between two supplied rasters
//! - `POST /analyze-deforestation` - Fetch Sentinel-2 NDVI and detect loss
//! - `GET /images/search` - Search the Sentinel-2 catalog

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use forestwatch::api::{AppState, router};
use forestwatch::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive("forestwatch=info".parse()?))
        .init();

    let config = ServerConfig::from_env();

    info!(
        port = config.port,
        window_days = config.window_days,
        raster_size = config.raster_size,
        "Starting ForestWatch server"
    );
    if config.credentials.is_none() {
        warn!("SENTINEL_HUB_CLIENT_ID/SECRET not set; imagery endpoints will answer 503");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config));

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "ForestWatch is listening");

    axum::serve(listener, app).await?;

    Ok(())
}
