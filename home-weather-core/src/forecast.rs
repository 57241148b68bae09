//! Open-Meteo forecast data and the views built from it.
//!
//! The provider hands back an hour-by-hour [`Forecast`] in the location's
//! local time. Everything here is pure: each view takes the forecast plus
//! the current instant and works out "today" from the location's UTC
//! offset, so a cached forecast can be re-sliced on every request.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::{collections::BTreeMap, fmt, str::FromStr};

use crate::error::{Error, Result};

pub const MAX_FORECAST_DAYS: u8 = 7;

/// A point on the globe, validated on construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::InvalidRequest(format!(
                "latitude {latitude} out of range (-90 to 90)"
            )));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::InvalidRequest(format!(
                "longitude {longitude} out of range (-180 to 180)"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Key for caching, stable to roughly a hundred metres.
    pub fn cache_key(&self) -> String {
        format!("{:.3},{:.3}", self.latitude, self.longitude)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.longitude, self.latitude)
    }
}

/// Parses `longitude,latitude`, the same order Netatmo uses for a station.
impl FromStr for Coordinates {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || {
            Error::InvalidRequest(format!(
                "invalid coordinates '{s}', expected 'longitude,latitude'"
            ))
        };

        let (lon, lat) = s.split_once(',').ok_or_else(invalid)?;
        let longitude: f64 = lon.trim().parse().map_err(|_| invalid())?;
        let latitude: f64 = lat.trim().parse().map_err(|_| invalid())?;
        Self::new(latitude, longitude)
    }
}

/// Reject day counts outside `1..=7`.
pub fn validate_days(days: u8) -> Result<u8> {
    if (1..=MAX_FORECAST_DAYS).contains(&days) {
        Ok(days)
    } else {
        Err(Error::InvalidRequest(format!(
            "days must be between 1 and {MAX_FORECAST_DAYS}, got {days}"
        )))
    }
}

/// WMO weather interpretation code as text.
pub fn describe_weather_code(code: u8) -> &'static str {
    match code {
        0 => "Clear sky",
        1 => "Mainly clear",
        2 => "Partly cloudy",
        3 => "Overcast",
        45 => "Foggy",
        48 => "Depositing rime fog",
        51 => "Light drizzle",
        53 => "Moderate drizzle",
        55 => "Dense drizzle",
        56 => "Light freezing drizzle",
        57 => "Dense freezing drizzle",
        61 => "Slight rain",
        63 => "Moderate rain",
        65 => "Heavy rain",
        66 => "Light freezing rain",
        67 => "Heavy freezing rain",
        71 => "Slight snow fall",
        73 => "Moderate snow fall",
        75 => "Heavy snow fall",
        77 => "Snow grains",
        80 => "Slight rain showers",
        81 => "Moderate rain showers",
        82 => "Violent rain showers",
        85 => "Slight snow showers",
        86 => "Heavy snow showers",
        95 => "Thunderstorm",
        96 => "Thunderstorm with slight hail",
        99 => "Thunderstorm with heavy hail",
        _ => "Unknown",
    }
}

fn describe(code: Option<u8>) -> &'static str {
    code.map(describe_weather_code).unwrap_or("Unknown")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub timezone: Option<String>,
    pub utc_offset_seconds: i32,
}

impl ForecastLocation {
    /// Wall-clock time at the location.
    pub fn local_time(&self, now: DateTime<Utc>) -> NaiveDateTime {
        now.naive_utc() + Duration::seconds(i64::from(self.utc_offset_seconds))
    }
}

/// One forecast hour. Times are local to the forecast location.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyForecast {
    pub time: NaiveDateTime,
    pub temperature: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub weather_code: Option<u8>,
    pub weather_description: &'static str,
    pub wind_speed: Option<f64>,
    pub wind_direction: Option<f64>,
    pub wind_gusts: Option<f64>,
    pub rain: Option<f64>,
    pub pressure: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub cloud_cover_low: Option<f64>,
    pub cloud_cover_mid: Option<f64>,
    pub cloud_cover_high: Option<f64>,
    pub precipitation_probability: Option<f64>,
}

impl HourlyForecast {
    /// An hour with nothing but a time and a weather code.
    pub fn empty(time: NaiveDateTime, weather_code: Option<u8>) -> Self {
        Self {
            time,
            temperature: None,
            apparent_temperature: None,
            humidity: None,
            weather_code,
            weather_description: describe(weather_code),
            wind_speed: None,
            wind_direction: None,
            wind_gusts: None,
            rain: None,
            pressure: None,
            cloud_cover: None,
            cloud_cover_low: None,
            cloud_cover_mid: None,
            cloud_cover_high: None,
            precipitation_probability: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SunTimes {
    pub date: NaiveDate,
    pub sunrise: Option<NaiveDateTime>,
    pub sunset: Option<NaiveDateTime>,
}

/// Everything one Open-Meteo call returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub location: ForecastLocation,
    pub hourly: Vec<HourlyForecast>,
    pub daily: Vec<SunTimes>,
    /// Unit per hourly variable, as reported by the provider.
    pub units: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Stats {
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub average: Option<f64>,
}

impl Stats {
    /// Min, max and mean of the values present; all `None` if there are none.
    pub fn from_values(values: impl IntoIterator<Item = Option<f64>>) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for v in values.into_iter().flatten() {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }

        if count == 0 {
            return Self::default();
        }
        Self {
            min: Some(min),
            max: Some(max),
            average: Some(sum / count as f64),
        }
    }
}

fn total(values: impl IntoIterator<Item = Option<f64>>) -> Option<f64> {
    values
        .into_iter()
        .flatten()
        .fold(None, |acc, v| Some(acc.unwrap_or(0.0) + v))
}

/// Most frequent code; ties go to the lowest code.
fn dominant_code(hours: &[&HourlyForecast]) -> Option<u8> {
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for code in hours.iter().filter_map(|h| h.weather_code) {
        *counts.entry(code).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(code, _)| code)
}

/// A reading with its current value alongside the day's spread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurrentStats {
    pub current: Option<f64>,
    #[serde(flatten)]
    pub stats: Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_speed: Option<f64>,
    pub average_speed: Option<f64>,
    pub max_gust: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PrecipitationStats {
    pub total_rain: Option<f64>,
    /// Mean precipitation probability in percent.
    pub probability: Option<f64>,
    pub rainy_hours: usize,
}

fn wind_stats(hours: &[&HourlyForecast], current: Option<&HourlyForecast>) -> WindStats {
    WindStats {
        current_speed: current.and_then(|h| h.wind_speed),
        average_speed: Stats::from_values(hours.iter().map(|h| h.wind_speed)).average,
        max_gust: Stats::from_values(hours.iter().map(|h| h.wind_gusts.or(h.wind_speed))).max,
    }
}

fn precipitation_stats(hours: &[&HourlyForecast]) -> PrecipitationStats {
    PrecipitationStats {
        total_rain: total(hours.iter().map(|h| h.rain)),
        probability: Stats::from_values(hours.iter().map(|h| h.precipitation_probability))
            .average,
        rainy_hours: hours
            .iter()
            .filter(|h| h.rain.is_some_and(|r| r > 0.0))
            .count(),
    }
}

/// The hour closest to `now` on the location's current day, or the first
/// hour when the forecast does not cover today.
pub fn current_conditions(hourly: &[HourlyForecast], now: NaiveDateTime) -> Option<&HourlyForecast> {
    let today = now.date();
    hourly
        .iter()
        .filter(|h| h.time.date() == today)
        .min_by_key(|h| (h.time - now).num_seconds().abs())
        .or_else(|| hourly.first())
}

/// `GET /forecast`: the raw hours and days, trimmed to `days` days.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastReport {
    pub location: ForecastLocation,
    pub current: Option<HourlyForecast>,
    pub hourly: Vec<HourlyForecast>,
    pub daily: Vec<SunTimes>,
    pub units: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

pub fn report(forecast: &Forecast, days: u8, now: DateTime<Utc>) -> ForecastReport {
    let local_now = forecast.location.local_time(now);
    let first_day = local_now.date();
    let last_day = first_day + Duration::days(i64::from(days) - 1);

    ForecastReport {
        location: forecast.location.clone(),
        current: current_conditions(&forecast.hourly, local_now).cloned(),
        hourly: forecast
            .hourly
            .iter()
            .filter(|h| h.time.date() <= last_day)
            .cloned()
            .collect(),
        daily: forecast.daily.iter().take(usize::from(days)).cloned().collect(),
        units: forecast.units.clone(),
        generated_at: now,
    }
}

/// `GET /forecast/today`: the location's current day in aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TodayForecast {
    pub date: NaiveDate,
    pub temperature: CurrentStats,
    pub humidity: CurrentStats,
    pub pressure: CurrentStats,
    pub wind: WindStats,
    pub precipitation: PrecipitationStats,
    pub cloud_cover: Stats,
    pub hourly: Vec<HourlyForecast>,
}

pub fn today(forecast: &Forecast, now: DateTime<Utc>) -> Result<TodayForecast> {
    let local_now = forecast.location.local_time(now);
    let date = local_now.date();

    let hours: Vec<&HourlyForecast> = forecast
        .hourly
        .iter()
        .filter(|h| h.time.date() == date)
        .collect();
    if hours.is_empty() {
        return Err(Error::NoData(format!("no forecast hours for {date}")));
    }

    let current = current_conditions(&forecast.hourly, local_now);
    let current_stats = |pick: fn(&HourlyForecast) -> Option<f64>| CurrentStats {
        current: current.and_then(pick),
        stats: Stats::from_values(hours.iter().map(|h| pick(h))),
    };

    Ok(TodayForecast {
        date,
        temperature: current_stats(|h| h.temperature),
        humidity: current_stats(|h| h.humidity),
        pressure: current_stats(|h| h.pressure),
        wind: wind_stats(&hours, current),
        precipitation: precipitation_stats(&hours),
        cloud_cover: Stats::from_values(hours.iter().map(|h| h.cloud_cover)),
        hourly: hours.into_iter().cloned().collect(),
    })
}

/// One day of the week view. Days the forecast does not reach have no values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayOutlook {
    pub date: NaiveDate,
    pub weekday: String,
    pub temperature: Stats,
    pub humidity: Option<f64>,
    pub wind_speed: Option<f64>,
    pub rain: Option<f64>,
    pub pressure: Option<f64>,
    pub weather_code: Option<u8>,
    pub weather_description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeekForecast {
    pub location: ForecastLocation,
    pub daily_summaries: Vec<DayOutlook>,
    pub generated_at: DateTime<Utc>,
}

pub fn week(forecast: &Forecast, now: DateTime<Utc>) -> WeekForecast {
    let first_day = forecast.location.local_time(now).date();

    let daily_summaries = (0..i64::from(MAX_FORECAST_DAYS))
        .map(|offset| {
            let date = first_day + Duration::days(offset);
            let hours: Vec<&HourlyForecast> = forecast
                .hourly
                .iter()
                .filter(|h| h.time.date() == date)
                .collect();
            let code = dominant_code(&hours);
            let average = |pick: fn(&HourlyForecast) -> Option<f64>| {
                Stats::from_values(hours.iter().map(|h| pick(h))).average
            };

            DayOutlook {
                date,
                weekday: date.format("%A").to_string(),
                temperature: Stats::from_values(hours.iter().map(|h| h.temperature)),
                humidity: average(|h| h.humidity),
                wind_speed: average(|h| h.wind_speed),
                rain: total(hours.iter().map(|h| h.rain)),
                pressure: average(|h| h.pressure),
                weather_code: code,
                weather_description: if hours.is_empty() {
                    "No data"
                } else {
                    describe(code)
                },
            }
        })
        .collect();

    WeekForecast {
        location: forecast.location.clone(),
        daily_summaries,
        generated_at: now,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DateRange {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastStats {
    pub temperature: Stats,
    pub humidity: Stats,
    pub pressure: Stats,
    pub wind: WindStats,
    pub precipitation: PrecipitationStats,
    pub data_points: usize,
    pub date_range: DateRange,
}

/// `GET /forecast/summary`: the whole forecast window in aggregate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastSummary {
    pub summary: ForecastStats,
    pub current_conditions: Option<HourlyForecast>,
    pub generated_at: DateTime<Utc>,
}

pub fn summary(forecast: &Forecast, now: DateTime<Utc>) -> Result<ForecastSummary> {
    let hours: Vec<&HourlyForecast> = forecast.hourly.iter().collect();
    let (Some(first), Some(last)) = (hours.first(), hours.last()) else {
        return Err(Error::NoData("forecast has no hourly data".into()));
    };
    let date_range = DateRange {
        start: first.time,
        end: last.time,
    };

    let local_now = forecast.location.local_time(now);
    Ok(ForecastSummary {
        summary: ForecastStats {
            temperature: Stats::from_values(hours.iter().map(|h| h.temperature)),
            humidity: Stats::from_values(hours.iter().map(|h| h.humidity)),
            pressure: Stats::from_values(hours.iter().map(|h| h.pressure)),
            wind: wind_stats(&hours, None),
            precipitation: precipitation_stats(&hours),
            data_points: hours.len(),
            date_range,
        },
        current_conditions: current_conditions(&forecast.hourly, local_now).cloned(),
        generated_at: now,
    })
}
