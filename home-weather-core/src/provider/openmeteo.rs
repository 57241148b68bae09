use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::Client;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::{
    error::{Error, Result, truncate_body},
    forecast::{
        Coordinates, Forecast, ForecastLocation, HourlyForecast, MAX_FORECAST_DAYS, SunTimes,
    },
};

use super::ForecastApi;

const HOURLY_FIELDS: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
weather_code,wind_speed_10m,wind_direction_10m,wind_gusts_10m,rain,surface_pressure,\
cloud_cover,cloud_cover_low,cloud_cover_mid,cloud_cover_high,precipitation_probability";

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Client for the keyless Open-Meteo forecast API.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    http: Client,
    base_url: String,
    timezone: String,
}

impl OpenMeteoClient {
    /// `timezone` is passed through as is; `auto` resolves it from the coordinates.
    pub fn new(api_url: &str, timezone: &str) -> Self {
        Self {
            http: Client::new(),
            base_url: api_url.trim_end_matches('/').to_string(),
            timezone: timezone.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    elevation: Option<f64>,
    #[serde(default)]
    timezone: Option<String>,
    #[serde(default)]
    utc_offset_seconds: i32,
    #[serde(default)]
    hourly_units: BTreeMap<String, String>,
    #[serde(default)]
    hourly: HourlyColumns,
    #[serde(default)]
    daily: DailyColumns,
}

/// Open-Meteo answers column-wise: one array per variable, indexed by `time`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HourlyColumns {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    apparent_temperature: Vec<Option<f64>>,
    weather_code: Vec<Option<u8>>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
    wind_gusts_10m: Vec<Option<f64>>,
    rain: Vec<Option<f64>>,
    surface_pressure: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
    cloud_cover_low: Vec<Option<f64>>,
    cloud_cover_mid: Vec<Option<f64>>,
    cloud_cover_high: Vec<Option<f64>>,
    precipitation_probability: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyColumns {
    time: Vec<String>,
    sunrise: Vec<Option<String>>,
    sunset: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    reason: String,
}

fn at<T: Copy>(column: &[Option<T>], idx: usize) -> Option<T> {
    column.get(idx).copied().flatten()
}

fn parse_time(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .map_err(|e| Error::parse("Open-Meteo timestamp", e))
}

impl HourlyColumns {
    fn into_hours(self) -> Result<Vec<HourlyForecast>> {
        self.time
            .iter()
            .enumerate()
            .map(|(idx, raw)| {
                Ok(HourlyForecast {
                    temperature: at(&self.temperature_2m, idx),
                    apparent_temperature: at(&self.apparent_temperature, idx),
                    humidity: at(&self.relative_humidity_2m, idx),
                    wind_speed: at(&self.wind_speed_10m, idx),
                    wind_direction: at(&self.wind_direction_10m, idx),
                    wind_gusts: at(&self.wind_gusts_10m, idx),
                    rain: at(&self.rain, idx),
                    pressure: at(&self.surface_pressure, idx),
                    cloud_cover: at(&self.cloud_cover, idx),
                    cloud_cover_low: at(&self.cloud_cover_low, idx),
                    cloud_cover_mid: at(&self.cloud_cover_mid, idx),
                    cloud_cover_high: at(&self.cloud_cover_high, idx),
                    precipitation_probability: at(&self.precipitation_probability, idx),
                    ..HourlyForecast::empty(parse_time(raw)?, at(&self.weather_code, idx))
                })
            })
            .collect()
    }
}

impl DailyColumns {
    fn into_days(self) -> Result<Vec<SunTimes>> {
        let time_at = |column: &[Option<String>], idx: usize| -> Result<Option<NaiveDateTime>> {
            column
                .get(idx)
                .and_then(|v| v.as_deref())
                .map(parse_time)
                .transpose()
        };

        self.time
            .iter()
            .enumerate()
            .map(|(idx, raw)| {
                let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| Error::parse("Open-Meteo date", e))?;
                Ok(SunTimes {
                    date,
                    sunrise: time_at(&self.sunrise, idx)?,
                    sunset: time_at(&self.sunset, idx)?,
                })
            })
            .collect()
    }
}

impl ForecastResponse {
    fn into_forecast(self) -> Result<Forecast> {
        Ok(Forecast {
            location: ForecastLocation {
                latitude: self.latitude,
                longitude: self.longitude,
                elevation: self.elevation,
                timezone: self.timezone,
                utc_offset_seconds: self.utc_offset_seconds,
            },
            hourly: self.hourly.into_hours()?,
            daily: self.daily.into_days()?,
            units: self.hourly_units,
        })
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(e) if !e.reason.is_empty() => e.reason,
        _ => truncate_body(body),
    }
}

#[async_trait]
impl ForecastApi for OpenMeteoClient {
    async fn fetch_forecast(&self, coords: Coordinates) -> Result<Forecast> {
        let url = format!("{}/v1/forecast", self.base_url);
        tracing::debug!("GET {url} for {coords}");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("latitude", coords.latitude.to_string()),
                ("longitude", coords.longitude.to_string()),
                ("hourly", HOURLY_FIELDS.to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", self.timezone.clone()),
                ("forecast_days", MAX_FORECAST_DAYS.to_string()),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let raw: ForecastResponse =
            serde_json::from_str(&body).map_err(|e| Error::parse("Open-Meteo forecast", e))?;
        let forecast = raw.into_forecast()?;

        tracing::debug!(
            "forecast for {coords}: {} hours, {} days",
            forecast.hourly.len(),
            forecast.daily.len()
        );
        Ok(forecast)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "latitude": 49.92, "longitude": 14.44, "elevation": 351.0,
        "timezone": "Europe/Prague", "utc_offset_seconds": 3600,
        "hourly_units": {"time": "iso8601", "temperature_2m": "°C"},
        "hourly": {
            "time": ["2024-03-10T00:00", "2024-03-10T01:00", "2024-03-10T02:00"],
            "temperature_2m": [4.1, null, 3.2],
            "weather_code": [3, 61],
            "rain": [0.0, 0.3, 0.1]
        },
        "daily": {
            "time": ["2024-03-10"],
            "sunrise": ["2024-03-10T06:27"],
            "sunset": [null]
        }
    }"#;

    #[test]
    fn columns_become_hours() {
        let raw: ForecastResponse = serde_json::from_str(SAMPLE).unwrap();
        let forecast = raw.into_forecast().unwrap();

        assert_eq!(forecast.location.utc_offset_seconds, 3600);
        assert_eq!(forecast.hourly.len(), 3);
        assert_eq!(forecast.hourly[0].temperature, Some(4.1));
        assert_eq!(forecast.hourly[0].weather_description, "Overcast");
        assert_eq!(forecast.hourly[1].temperature, None);
        assert_eq!(forecast.hourly[1].weather_description, "Slight rain");
        // Short columns leave the tail empty.
        assert_eq!(forecast.hourly[2].weather_code, None);
        assert_eq!(forecast.hourly[2].humidity, None);
        assert_eq!(forecast.units["temperature_2m"], "°C");
    }

    #[test]
    fn daily_sun_times_allow_gaps() {
        let raw: ForecastResponse = serde_json::from_str(SAMPLE).unwrap();
        let days = raw.into_forecast().unwrap().daily;

        assert_eq!(days.len(), 1);
        assert_eq!(days[0].sunrise.unwrap().format("%H:%M").to_string(), "06:27");
        assert_eq!(days[0].sunset, None);
    }

    #[test]
    fn bad_timestamp_is_a_parse_error() {
        let raw: ForecastResponse = serde_json::from_str(
            r#"{"latitude": 0, "longitude": 0, "hourly": {"time": ["yesterday"]}}"#,
        )
        .unwrap();
        assert!(matches!(raw.into_forecast(), Err(Error::Parse { .. })));
    }

    #[test]
    fn error_reason_is_extracted() {
        let body = r#"{"error": true, "reason": "Latitude must be in range of -90 to 90°."}"#;
        assert_eq!(error_message(body), "Latitude must be in range of -90 to 90°.");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }
}
