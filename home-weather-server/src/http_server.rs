//! HTTP REST API
//!
//! Republishes the station data and the Open-Meteo forecast as JSON. Every
//! response is wrapped in an envelope with a `status` of `success` or
//! `error` and a unix timestamp.

use axum::{
    Json, Router,
    extract::{FromRequestParts, Query, State},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{NaiveDate, Utc};
use home_weather_core::{
    Config, Coordinates, DayHistory, DaySummary, Error, ForecastService, OutdoorSummary, Scale,
    Station, WeatherService,
    forecast::{ForecastReport, ForecastSummary, MAX_FORECAST_DAYS, TodayForecast, WeekForecast},
    service,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tower_http::cors::{Any, CorsLayer};

/// Shared state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub weather: WeatherService,
    pub forecast: ForecastService,
}

/// Successful response body.
#[derive(Serialize)]
pub struct Envelope<T> {
    pub status: &'static str,
    pub data: T,
    pub timestamp: i64,
}

impl<T: Serialize> Envelope<T> {
    fn success(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            data,
            timestamp: Utc::now().timestamp(),
        })
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
}

/// Failure response body.
#[derive(Serialize)]
pub struct ErrorEnvelope {
    pub status: &'static str,
    pub error: ErrorBody,
    pub timestamp: i64,
}

/// Core error on its way out as an error envelope.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

fn status_for(err: &Error) -> StatusCode {
    match err {
        Error::Auth(_) | Error::Network(_) | Error::Api { .. } | Error::Parse { .. } => {
            StatusCode::BAD_GATEWAY
        }
        Error::NoStation | Error::NoData(_) => StatusCode::NOT_FOUND,
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::Config(_) | Error::Io { .. } | Error::Toml { .. } | Error::TomlSer(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            tracing::error!("request failed: {}", self.0);
        } else {
            tracing::warn!("request rejected: {}", self.0);
        }

        let body = ErrorEnvelope {
            status: "error",
            error: ErrorBody {
                kind: self.0.kind(),
                message: self.0.to_string(),
            },
            timestamp: Utc::now().timestamp(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// `Query` whose rejections come back as an `invalid_request` envelope.
pub struct ValidQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(query) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| Error::InvalidRequest(rejection.body_text()))?;
        Ok(Self(query))
    }
}

/// Query params for day-based endpoints
#[derive(Debug, Deserialize)]
pub struct DayQuery {
    /// Local calendar day; defaults to today.
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub scale: Scale,
}

impl DayQuery {
    fn date(&self) -> NaiveDate {
        self.date.unwrap_or_else(service::today)
    }
}

/// Query params for forecast endpoints
#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    /// 1 to 7, `/forecast` only.
    pub days: Option<u8>,
    /// `longitude,latitude`; defaults to the configured home location.
    pub coords: Option<String>,
}

impl ForecastQuery {
    fn coordinates(&self) -> Result<Option<Coordinates>, Error> {
        self.coords.as_deref().map(str::parse).transpose()
    }
}

#[derive(Serialize)]
pub struct HealthData {
    pub service: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct CurrentData {
    pub current: Station,
}

#[derive(Serialize)]
pub struct HistoricalData {
    pub historical: DayHistory,
}

#[derive(Serialize)]
pub struct ForecastData {
    pub forecast: ForecastReport,
}

#[derive(Serialize)]
pub struct TodayData {
    pub today_forecast: TodayForecast,
}

#[derive(Serialize)]
pub struct WeekData {
    pub week_forecast: WeekForecast,
}

#[derive(Serialize)]
pub struct ForecastSummaryData {
    pub forecast_summary: ForecastSummary,
}

/// GET /health - Health check endpoint
async fn health() -> Json<Envelope<HealthData>> {
    Envelope::success(HealthData {
        service: "home-weather",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /weather/current - Station and module readings
async fn current(State(state): State<AppState>) -> ApiResult<CurrentData> {
    let current = state.weather.current().await?;
    Ok(Envelope::success(CurrentData { current }))
}

/// GET /weather/historical - Measurements for one day
async fn historical(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<DayQuery>,
) -> ApiResult<HistoricalData> {
    let historical = state.weather.historical(query.date(), query.scale).await?;
    Ok(Envelope::success(HistoricalData { historical }))
}

/// GET /weather/summary - Current readings, history and outdoor view
async fn summary(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<DayQuery>,
) -> ApiResult<DaySummary> {
    let summary = state.weather.summary(query.date(), query.scale).await?;
    Ok(Envelope::success(summary))
}

/// GET /weather/outdoor - Outdoor, wind and rain modules
async fn outdoor(State(state): State<AppState>) -> ApiResult<OutdoorSummary> {
    let outdoor = state.weather.outdoor().await?;
    Ok(Envelope::success(outdoor))
}

/// GET /forecast - Hourly forecast for up to seven days
async fn forecast(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ForecastQuery>,
) -> ApiResult<ForecastData> {
    let days = query.days.unwrap_or(MAX_FORECAST_DAYS);
    let forecast = state.forecast.forecast(query.coordinates()?, days).await?;
    Ok(Envelope::success(ForecastData { forecast }))
}

/// GET /forecast/today - Today's forecast with statistics
async fn forecast_today(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ForecastQuery>,
) -> ApiResult<TodayData> {
    let today_forecast = state.forecast.today(query.coordinates()?).await?;
    Ok(Envelope::success(TodayData { today_forecast }))
}

/// GET /forecast/week - One summary per day for the coming week
async fn forecast_week(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ForecastQuery>,
) -> ApiResult<WeekData> {
    let week_forecast = state.forecast.week(query.coordinates()?).await?;
    Ok(Envelope::success(WeekData { week_forecast }))
}

/// GET /forecast/summary - Statistics over the whole forecast window
async fn forecast_summary(
    State(state): State<AppState>,
    ValidQuery(query): ValidQuery<ForecastQuery>,
) -> ApiResult<ForecastSummaryData> {
    let forecast_summary = state.forecast.summary(query.coordinates()?).await?;
    Ok(Envelope::success(ForecastSummaryData { forecast_summary }))
}

/// Create the HTTP router
pub fn create_router(weather: WeatherService, forecast: ForecastService) -> Router {
    let state = AppState { weather, forecast };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/weather/current", get(current))
        .route("/weather/historical", get(historical))
        .route("/weather/summary", get(summary))
        .route("/weather/outdoor", get(outdoor))
        .route("/forecast", get(self::forecast))
        .route("/forecast/today", get(forecast_today))
        .route("/forecast/week", get(forecast_week))
        .route("/forecast/summary", get(forecast_summary))
        .layer(cors)
        .with_state(state)
}

/// Validate config and build the router. Missing credentials fail here,
/// before any request reaches Netatmo.
pub fn router_from_config(config: &Config) -> home_weather_core::Result<Router> {
    let weather = WeatherService::from_config(config)?;
    let forecast = ForecastService::from_config(config)?;
    Ok(create_router(weather, forecast))
}

/// Run the HTTP server until Ctrl+C.
pub async fn run_http_server(router: Router, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Received Ctrl+C, shutting down gracefully...");
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_failures_are_bad_gateway() {
        assert_eq!(status_for(&Error::Auth("no".into())), StatusCode::BAD_GATEWAY);
        assert_eq!(
            status_for(&Error::Api { status: 500, message: String::new() }),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(status_for(&Error::NoStation), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&Error::NoData("today".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&Error::InvalidRequest("future".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(&Error::Config("missing".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn forecast_coords_are_optional_but_checked() {
        let none = ForecastQuery { days: None, coords: None };
        assert_eq!(none.coordinates().unwrap(), None);

        let bad = ForecastQuery { days: None, coords: Some("north".into()) };
        assert!(matches!(bad.coordinates(), Err(Error::InvalidRequest(_))));
    }

    #[test]
    fn router_from_config_rejects_missing_credentials() {
        let err = router_from_config(&Config::default()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
