//! The read operations shared by the CLI and the HTTP server.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

use crate::{
    Config,
    error::{Error, Result},
    forecast::{
        self, Coordinates, Forecast, ForecastReport, ForecastSummary, TodayForecast,
        WeekForecast, validate_days,
    },
    model::{
        DayHistory, DaySummary, HistoricalSeries, MeasureQuery, ModuleCategory, OutdoorSummary,
        Scale, Station,
    },
    normalize::outdoor_summary,
    provider::{ForecastApi, StationApi, forecast_provider_from_config, provider_from_config},
};

/// How long a fetched forecast is served before asking Open-Meteo again.
pub const FORECAST_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
pub struct WeatherService {
    api: Arc<dyn StationApi>,
}

impl WeatherService {
    pub fn new(api: Arc<dyn StationApi>) -> Self {
        Self { api }
    }

    /// Validate config and build the Netatmo-backed service. No network
    /// traffic happens here.
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(provider_from_config(config)?))
    }

    pub async fn current(&self) -> Result<Station> {
        self.api.fetch_current().await
    }

    /// Measurements for `date` (local calendar day) for the station and
    /// each classified module.
    pub async fn historical(&self, date: NaiveDate, scale: Scale) -> Result<DayHistory> {
        let station = self.api.fetch_current().await?;
        self.history_for(&station, date, scale).await
    }

    pub async fn summary(&self, date: NaiveDate, scale: Scale) -> Result<DaySummary> {
        let station = self.api.fetch_current().await?;
        let historical = self.history_for(&station, date, scale).await?;
        let outdoor = outdoor_summary(&station);

        Ok(DaySummary {
            current: station,
            historical,
            outdoor,
        })
    }

    pub async fn outdoor(&self) -> Result<OutdoorSummary> {
        let station = self.api.fetch_current().await?;
        Ok(outdoor_summary(&station))
    }

    async fn history_for(
        &self,
        station: &Station,
        date: NaiveDate,
        scale: Scale,
    ) -> Result<DayHistory> {
        let (begin, end) = day_window(date, &Local, Utc::now())?;

        let mut series: Vec<HistoricalSeries> = Vec::new();
        for query in measure_queries(station, scale, begin, end) {
            series.push(self.api.fetch_measurements(&query).await?);
        }

        Ok(DayHistory {
            date,
            scale,
            series,
        })
    }
}

#[derive(Debug)]
struct CachedForecast {
    forecast: Arc<Forecast>,
    fetched_at: Instant,
}

/// Forecast views over a per-location cache.
///
/// Every view of the same location within the TTL is cut from one upstream
/// response. Locations are keyed to three decimals.
#[derive(Debug, Clone)]
pub struct ForecastService {
    api: Arc<dyn ForecastApi>,
    home: Coordinates,
    ttl: Duration,
    cache: Arc<RwLock<HashMap<String, CachedForecast>>>,
}

impl ForecastService {
    /// `home` is used whenever a request names no location.
    pub fn new(api: Arc<dyn ForecastApi>, home: Coordinates) -> Self {
        Self::with_ttl(api, home, FORECAST_TTL)
    }

    pub fn with_ttl(api: Arc<dyn ForecastApi>, home: Coordinates, ttl: Duration) -> Self {
        Self {
            api,
            home,
            ttl,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            forecast_provider_from_config(config),
            config.forecast_location()?,
        ))
    }

    pub async fn forecast(&self, coords: Option<Coordinates>, days: u8) -> Result<ForecastReport> {
        let days = validate_days(days)?;
        let data = self.fetch(coords).await?;
        Ok(forecast::report(&data, days, Utc::now()))
    }

    pub async fn today(&self, coords: Option<Coordinates>) -> Result<TodayForecast> {
        let data = self.fetch(coords).await?;
        forecast::today(&data, Utc::now())
    }

    pub async fn week(&self, coords: Option<Coordinates>) -> Result<WeekForecast> {
        let data = self.fetch(coords).await?;
        Ok(forecast::week(&data, Utc::now()))
    }

    pub async fn summary(&self, coords: Option<Coordinates>) -> Result<ForecastSummary> {
        let data = self.fetch(coords).await?;
        forecast::summary(&data, Utc::now())
    }

    async fn fetch(&self, coords: Option<Coordinates>) -> Result<Arc<Forecast>> {
        let coords = coords.unwrap_or(self.home);
        let key = coords.cache_key();

        if let Some(hit) = self.cache.read().await.get(&key) {
            if hit.fetched_at.elapsed() < self.ttl {
                tracing::debug!("forecast cache hit for {key}");
                return Ok(hit.forecast.clone());
            }
        }

        let forecast = Arc::new(self.api.fetch_forecast(coords).await?);
        tracing::info!("fetched forecast for {key}");

        let mut cache = self.cache.write().await;
        cache.retain(|_, entry| entry.fetched_at.elapsed() < self.ttl);
        cache.insert(
            key,
            CachedForecast {
                forecast: forecast.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(forecast)
    }
}

/// One query for the station itself, then one per classified module.
/// Unclassified modules have no known measurement types and are skipped.
pub fn measure_queries(
    station: &Station,
    scale: Scale,
    begin: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<MeasureQuery> {
    let types = |category: ModuleCategory| -> Vec<String> {
        category.measure_types().iter().map(|t| t.to_string()).collect()
    };

    let mut queries = vec![MeasureQuery {
        device_id: station.id.clone(),
        module_id: None,
        name: station.name.clone(),
        types: types(ModuleCategory::Indoor),
        scale,
        begin,
        end,
    }];

    for module in &station.modules {
        let Some(category) = module.category() else {
            tracing::debug!("no history for unclassified module {}", module.id);
            continue;
        };
        queries.push(MeasureQuery {
            device_id: station.id.clone(),
            module_id: Some(module.id.clone()),
            name: module.name.clone(),
            types: types(category),
            scale,
            begin,
            end,
        });
    }

    queries
}

/// Start and end of `date` in `tz`, clipped to `now` for the current day.
pub fn day_window<Tz: TimeZone>(
    date: NaiveDate,
    tz: &Tz,
    now: DateTime<Utc>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start_of = |day: NaiveDate| -> Result<DateTime<Utc>> {
        let midnight = day
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| Error::InvalidRequest(format!("invalid date {day}")))?;
        tz.from_local_datetime(&midnight)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::InvalidRequest(format!("{day} has no local midnight")))
    };

    let begin = start_of(date)?;
    if begin > now {
        return Err(Error::InvalidRequest(format!(
            "{date} is in the future; only past days have measurements"
        )));
    }

    let next_day = date
        .succ_opt()
        .ok_or_else(|| Error::InvalidRequest(format!("invalid date {date}")))?;
    let end = start_of(next_day)?.min(now);

    Ok((begin, end))
}

/// Today's date in the local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        forecast::{ForecastLocation, HourlyForecast},
        normalize::{RawDevice, normalize_device},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    /// Serves a day of hours around now and counts upstream calls.
    #[derive(Debug, Default)]
    struct CountingForecast {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ForecastApi for CountingForecast {
        async fn fetch_forecast(&self, coords: Coordinates) -> Result<Forecast> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = Utc::now().naive_utc();
            Ok(Forecast {
                location: ForecastLocation {
                    latitude: coords.latitude,
                    longitude: coords.longitude,
                    elevation: None,
                    timezone: Some("GMT".into()),
                    utc_offset_seconds: 0,
                },
                hourly: vec![HourlyForecast {
                    temperature: Some(12.0),
                    ..HourlyForecast::empty(now, Some(0))
                }],
                daily: Vec::new(),
                units: BTreeMap::new(),
            })
        }
    }

    fn home() -> Coordinates {
        Coordinates::new(49.922, 14.446).unwrap()
    }

    fn utc(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn past_day_spans_full_day() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let (begin, end) = day_window(date, &Utc, utc(2024, 3, 12, 8)).unwrap();
        assert_eq!(begin, utc(2024, 3, 10, 0));
        assert_eq!(end, utc(2024, 3, 11, 0));
    }

    #[test]
    fn today_is_clipped_to_now() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let now = utc(2024, 3, 10, 14);
        let (begin, end) = day_window(date, &Utc, now).unwrap();
        assert_eq!(begin, utc(2024, 3, 10, 0));
        assert_eq!(end, now);
    }

    #[test]
    fn future_day_is_rejected() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        let err = day_window(date, &Utc, utc(2024, 3, 10, 14)).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn forecast_views_share_one_fetch() {
        let api = Arc::new(CountingForecast::default());
        let service = ForecastService::new(api.clone(), home());

        service.forecast(None, 3).await.unwrap();
        service.today(None).await.unwrap();
        service.week(None).await.unwrap();
        service.summary(Some(home())).await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forecast_cache_is_per_location() {
        let api = Arc::new(CountingForecast::default());
        let service = ForecastService::new(api.clone(), home());

        service.week(None).await.unwrap();
        let elsewhere = Coordinates::new(52.37, 4.89).unwrap();
        let week = service.week(Some(elsewhere)).await.unwrap();

        assert_eq!(week.location.latitude, 52.37);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn expired_forecast_is_fetched_again() {
        let api = Arc::new(CountingForecast::default());
        let service = ForecastService::with_ttl(api.clone(), home(), Duration::ZERO);

        service.week(None).await.unwrap();
        service.week(None).await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn out_of_range_days_never_reach_upstream() {
        let api = Arc::new(CountingForecast::default());
        let service = ForecastService::new(api.clone(), home());

        let err = service.forecast(None, 8).await.unwrap_err();

        assert!(matches!(err, Error::InvalidRequest(_)));
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn queries_cover_station_and_classified_modules() {
        let raw: RawDevice = serde_json::from_value(json!({
            "_id": "70:ee:50:00:00:01",
            "station_name": "Home",
            "modules": [
                {"_id": "out", "type": "NAModule1", "module_name": "Garden"},
                {"_id": "bed", "type": "NAModule4", "module_name": "Bedroom"},
                {"_id": "wind", "type": "NAModule2", "module_name": "Wind"}
            ]
        }))
        .unwrap();
        let station = normalize_device(raw).unwrap();

        let begin = utc(2024, 3, 10, 0);
        let queries = measure_queries(&station, Scale::Hour, begin, begin);

        assert_eq!(queries.len(), 3);
        assert_eq!(queries[0].module_id, None);
        assert_eq!(queries[0].types.len(), 5);
        assert_eq!(queries[1].module_id.as_deref(), Some("out"));
        assert_eq!(queries[1].types, vec!["Temperature", "Humidity"]);
        assert_eq!(queries[2].types[0], "WindStrength");
        assert!(queries.iter().all(|q| q.device_id == "70:ee:50:00:00:01"));
    }
}
