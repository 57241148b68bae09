//! Home weather server
//!
//! Reads Netatmo credentials from the environment (or `.env`, or the config
//! file) and serves the station data over HTTP.

use home_weather_core::Config;
use home_weather_server::{router_from_config, run_http_server};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    tracing::info!("Starting home-weather-server...");

    let config = Config::load()?;
    let router = router_from_config(&config)?;

    run_http_server(router, &config.bind_addr()).await
}
