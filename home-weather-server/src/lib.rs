//! HTTP front end for the home weather service.
//!
//! Exposes `/health`, the `/weather/*` endpoints on top of
//! [`home_weather_core::WeatherService`] and the `/forecast/*` endpoints on
//! top of [`home_weather_core::ForecastService`].

pub mod http_server;

pub use http_server::{create_router, router_from_config, run_http_server};
