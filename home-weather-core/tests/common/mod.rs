//! In-process stand-in for the Netatmo API.
//!
//! Serves the three endpoints the client uses on `127.0.0.1:0` and counts
//! every call, so tests can assert on exactly what went over the wire.

#![allow(dead_code)]

use axum::{
    Form, Json, Router,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use chrono::{Duration, Utc};
use home_weather_core::{
    Credentials,
    auth::{Token, TokenManager},
    provider::netatmo::NetatmoClient,
};
use serde_json::{Value, json};
use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex,
        atomic::{AtomicI64, AtomicUsize, Ordering},
    },
};

pub const USERNAME: &str = "user@example.com";
pub const PASSWORD: &str = "correct-horse";

pub struct StubNetatmo {
    pub password_grants: AtomicUsize,
    pub refresh_grants: AtomicUsize,
    pub station_calls: AtomicUsize,
    pub measure_calls: AtomicUsize,
    issued: AtomicUsize,
    /// `expires_in` handed out with every new token.
    expires_in: AtomicI64,
    /// Status and raw body served by `getstationsdata`.
    stations: Mutex<(StatusCode, String)>,
    /// Access tokens answered with "Access token expired".
    stale_tokens: Mutex<HashSet<String>>,
    /// Query strings received by `getmeasure`.
    pub measure_queries: Mutex<Vec<HashMap<String, String>>>,
    token_delay: std::time::Duration,
}

impl StubNetatmo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            password_grants: AtomicUsize::new(0),
            refresh_grants: AtomicUsize::new(0),
            station_calls: AtomicUsize::new(0),
            measure_calls: AtomicUsize::new(0),
            issued: AtomicUsize::new(0),
            expires_in: AtomicI64::new(10800),
            stations: Mutex::new((StatusCode::OK, stations_payload().to_string())),
            stale_tokens: Mutex::new(HashSet::new()),
            measure_queries: Mutex::new(Vec::new()),
            token_delay: std::time::Duration::from_millis(50),
        })
    }

    pub fn set_stations(&self, status: StatusCode, body: impl Into<String>) {
        *self.stations.lock().unwrap() = (status, body.into());
    }

    pub fn mark_stale(&self, access_token: &str) {
        self.stale_tokens
            .lock()
            .unwrap()
            .insert(access_token.to_string());
    }

    pub fn set_expires_in(&self, seconds: i64) {
        self.expires_in.store(seconds, Ordering::SeqCst);
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn issue(&self) -> Value {
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        json!({
            "access_token": format!("access-{n}"),
            "refresh_token": format!("refresh-{n}"),
            "expires_in": self.expires_in.load(Ordering::SeqCst),
            "scope": ["read_station"]
        })
    }
}

/// Bind the stub on an ephemeral port and return its base URL.
pub async fn spawn(stub: Arc<StubNetatmo>) -> String {
    let app = Router::new()
        .route("/oauth2/token", post(token_endpoint))
        .route("/api/getstationsdata", get(stations))
        .route("/api/getmeasure", get(measure))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{addr}")
}

async fn token_endpoint(
    State(stub): State<Arc<StubNetatmo>>,
    Form(form): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    tokio::time::sleep(stub.token_delay).await;

    let grant = form.get("grant_type").map(String::as_str);
    match grant {
        Some("password") => {
            stub.password_grants.fetch_add(1, Ordering::SeqCst);
            let ok = form.get("username").map(String::as_str) == Some(USERNAME)
                && form.get("password").map(String::as_str) == Some(PASSWORD);
            if ok {
                (StatusCode::OK, Json(stub.issue()))
            } else {
                (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
            }
        }
        Some("refresh_token") => {
            stub.refresh_grants.fetch_add(1, Ordering::SeqCst);
            let known = form
                .get("refresh_token")
                .is_some_and(|t| t.starts_with("refresh-"));
            if known {
                (StatusCode::OK, Json(stub.issue()))
            } else {
                (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
            }
        }
        _ => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "unsupported_grant_type"})),
        ),
    }
}

fn bearer(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string)
}

fn check_token(stub: &StubNetatmo, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let Some(token) = bearer(headers) else {
        return Err((StatusCode::UNAUTHORIZED, String::new()));
    };
    if stub.stale_tokens.lock().unwrap().contains(&token) {
        let body = json!({"error": {"code": 3, "message": "Access token expired"}});
        return Err((StatusCode::FORBIDDEN, body.to_string()));
    }
    Ok(())
}

async fn stations(State(stub): State<Arc<StubNetatmo>>, headers: HeaderMap) -> impl IntoResponse {
    stub.station_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = check_token(&stub, &headers) {
        return rejection;
    }
    stub.stations.lock().unwrap().clone()
}

async fn measure(
    State(stub): State<Arc<StubNetatmo>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    stub.measure_calls.fetch_add(1, Ordering::SeqCst);
    if let Err(rejection) = check_token(&stub, &headers) {
        return rejection;
    }

    let width = query.get("type").map(|t| t.split(',').count()).unwrap_or(0);
    let begin: i64 = query
        .get("date_begin")
        .and_then(|b| b.parse().ok())
        .unwrap_or(0);
    stub.measure_queries.lock().unwrap().push(query);

    let tuple: Vec<Value> = (0..width).map(|i| json!(10.0 + i as f64)).collect();
    let body = json!({
        "status": "ok",
        "body": [{"beg_time": begin, "step_time": 3600, "value": [tuple.clone(), tuple]}]
    });
    (StatusCode::OK, body.to_string())
}

/// A station with one module of every known kind plus an unknown one.
pub fn stations_payload() -> Value {
    json!({
        "status": "ok",
        "time_server": 1700000400,
        "body": {
            "devices": [{
                "_id": "70:ee:50:00:00:01",
                "station_name": "Home",
                "type": "NAMain",
                "place": {"location": [4.89, 52.37], "altitude": 2, "timezone": "Europe/Amsterdam"},
                "dashboard_data": {
                    "time_utc": 1700000000,
                    "Temperature": 21.3,
                    "Humidity": 45,
                    "Pressure": 1013.2,
                    "AbsolutePressure": 1012.9,
                    "CO2": 612,
                    "Noise": 38,
                    "pressure_trend": "stable",
                    "temp_trend": "up"
                },
                "modules": [
                    {
                        "_id": "02:00:00:00:00:01",
                        "type": "NAModule1",
                        "module_name": "Garden",
                        "battery_percent": 80,
                        "dashboard_data": {"time_utc": 1700000000, "Temperature": 7.4, "Humidity": 88, "min_temp": 5.1, "max_temp": 9.8, "temp_trend": "down"}
                    },
                    {
                        "_id": "06:00:00:00:00:02",
                        "type": "NAModule2",
                        "module_name": "Wind gauge",
                        "dashboard_data": {"time_utc": 1700000000, "WindStrength": 14, "WindAngle": 225, "GustStrength": 31, "GustAngle": 240, "max_wind_str": 35}
                    },
                    {
                        "_id": "05:00:00:00:00:03",
                        "type": "NAModule3",
                        "module_name": "Rain gauge",
                        "dashboard_data": {"time_utc": 1700000000, "Rain": 0.3, "sum_rain_1h": 1.2, "sum_rain_24h": 6.5}
                    },
                    {
                        "_id": "03:00:00:00:00:04",
                        "type": "NAModule4",
                        "module_name": "Bedroom",
                        "dashboard_data": {"time_utc": 1700000000, "Temperature": 19.0, "CO2": 700}
                    }
                ]
            }],
            "user": {"mail": "user@example.com"}
        }
    })
}

pub fn credentials() -> Credentials {
    Credentials {
        client_id: "client".into(),
        client_secret: "secret".into(),
        username: USERNAME.into(),
        password: PASSWORD.into(),
    }
}

pub fn token(access: &str, refresh: &str, valid_for_secs: i64) -> Token {
    Token {
        access_token: access.into(),
        refresh_token: refresh.into(),
        expires_at: Utc::now() + Duration::seconds(valid_for_secs),
    }
}

/// Client whose token cache starts out holding `seed`.
pub fn client_with_token(base_url: &str, seed: Token) -> NetatmoClient {
    client_with(base_url, credentials(), seed)
}

pub fn client_with(base_url: &str, credentials: Credentials, seed: Token) -> NetatmoClient {
    let http = reqwest::Client::new();
    let tokens = TokenManager::with_token(http.clone(), base_url, credentials, seed);
    NetatmoClient::with_tokens(http, base_url, tokens)
}
