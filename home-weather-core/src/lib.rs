//! Core library for the home weather service.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Netatmo OAuth2 token management
//! - The station API abstraction and its Netatmo implementation
//! - Normalization of raw station/module records into typed readings
//! - Open-Meteo forecasts and the views built from them
//! - The read operations shared by the CLI and the HTTP server
//!
//! It is used by `home-weather-cli` and `home-weather-server`.

pub mod auth;
pub mod config;
pub mod error;
pub mod forecast;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod service;

pub use config::{Config, Credentials};
pub use error::{Error, Result};
pub use model::{
    DayHistory, DaySummary, HistoricalSeries, Module, ModuleCategory, OutdoorSummary, Reading,
    Scale, Station, Trend,
};
pub use forecast::Coordinates;
pub use provider::{ForecastApi, StationApi, netatmo::NetatmoClient, openmeteo::OpenMeteoClient};
pub use service::{ForecastService, WeatherService};
