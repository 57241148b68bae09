use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

use crate::{
    Config,
    error::Result,
    forecast::{Coordinates, Forecast},
    model::{HistoricalSeries, MeasureQuery, Station},
    provider::{netatmo::NetatmoClient, openmeteo::OpenMeteoClient},
};

pub mod netatmo;
pub mod openmeteo;

/// Source of station data. Implementations return normalized values.
#[async_trait]
pub trait StationApi: Send + Sync + Debug {
    /// Current readings of the account's first station and its modules.
    async fn fetch_current(&self) -> Result<Station>;

    /// Time-bucketed measurements for one device or module.
    async fn fetch_measurements(&self, query: &MeasureQuery) -> Result<HistoricalSeries>;
}

/// Source of weather forecasts.
#[async_trait]
pub trait ForecastApi: Send + Sync + Debug {
    /// Seven days of hourly forecast for `coords`, in the location's local time.
    async fn fetch_forecast(&self, coords: Coordinates) -> Result<Forecast>;
}

/// Construct the Netatmo provider from config.
///
/// Fails with a config error before touching the network if any credential
/// is missing.
pub fn provider_from_config(config: &Config) -> Result<Arc<dyn StationApi>> {
    let credentials = config.credentials()?;
    let client = NetatmoClient::new(config.api_url(), credentials);
    Ok(Arc::new(client))
}

/// Construct the Open-Meteo provider. Needs no credentials.
pub fn forecast_provider_from_config(config: &Config) -> Arc<dyn ForecastApi> {
    Arc::new(OpenMeteoClient::new(
        config.forecast_api_url(),
        config.forecast_timezone(),
    ))
}
