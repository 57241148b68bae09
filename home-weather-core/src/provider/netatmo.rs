use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};
use std::collections::BTreeMap;

use crate::{
    auth::{Token, TokenManager},
    config::Credentials,
    error::{Error, Result, truncate_body},
    model::{HistoricalSeries, MeasureQuery, MeasureRecord, Station},
    normalize::{RawDevice, normalize_device},
};

use super::StationApi;

/// Netatmo error codes meaning "this access token is no good".
const INVALID_TOKEN: i64 = 2;
const EXPIRED_TOKEN: i64 = 3;

#[derive(Debug)]
pub struct NetatmoClient {
    http: Client,
    base_url: String,
    tokens: TokenManager,
}

impl NetatmoClient {
    pub fn new(api_url: &str, credentials: Credentials) -> Self {
        let http = Client::new();
        let tokens = TokenManager::new(http.clone(), api_url, credentials);
        Self::with_tokens(http, api_url, tokens)
    }

    /// Build a client around an existing token manager.
    pub fn with_tokens(http: Client, api_url: &str, tokens: TokenManager) -> Self {
        Self {
            http,
            base_url: api_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    async fn send(
        &self,
        path: &str,
        query: &[(&str, String)],
        token: &Token,
    ) -> Result<(StatusCode, String)> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("GET {url}");

        let res = self
            .http
            .get(&url)
            .bearer_auth(&token.access_token)
            .query(query)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        Ok((status, body))
    }

    /// Issue an authenticated GET and decode the `body` field of the reply.
    ///
    /// If the provider rejects the access token, the token is refreshed and
    /// the request is sent once more. Any other failure is returned as is.
    async fn get_body<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &'static str,
    ) -> Result<T> {
        let token = self.tokens.valid_token().await?;
        let (mut status, mut body) = self.send(path, query, &token).await?;

        if token_rejected(status, &body) {
            self.tokens.invalidate(&token).await;
            let token = self.tokens.valid_token().await?;
            (status, body) = self.send(path, query, &token).await?;
        }

        if !status.is_success() {
            return Err(Error::Api {
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        let envelope: Envelope<T> =
            serde_json::from_str(&body).map_err(|e| Error::parse(context, e))?;
        Ok(envelope.body)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    body: T,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct StationsBody {
    #[serde(default)]
    devices: Vec<RawDevice>,
}

#[derive(Debug, Deserialize)]
struct RawMeasureBlock {
    #[serde(with = "chrono::serde::ts_seconds")]
    beg_time: DateTime<Utc>,
    #[serde(default)]
    step_time: Option<i64>,
    #[serde(default)]
    value: Vec<Vec<Option<f64>>>,
}

/// `getmeasure` answers with blocks when `optimize=true`, and with a map of
/// timestamp to values otherwise (or when there is nothing to report).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum MeasureBody {
    Blocks(Vec<RawMeasureBlock>),
    Keyed(BTreeMap<String, Vec<Option<f64>>>),
}

impl MeasureBody {
    fn into_records(self, default_step: i64) -> Vec<MeasureRecord> {
        match self {
            MeasureBody::Blocks(blocks) => blocks
                .into_iter()
                .map(|b| MeasureRecord {
                    start: b.beg_time,
                    step_seconds: b.step_time.unwrap_or(default_step),
                    values: b.value,
                })
                .collect(),
            MeasureBody::Keyed(map) => {
                let mut records: Vec<MeasureRecord> = map
                    .into_iter()
                    .filter_map(|(ts, tuple)| {
                        let start = ts.parse::<i64>().ok().and_then(|s| DateTime::from_timestamp(s, 0));
                        if start.is_none() {
                            tracing::warn!("skipping measurement with bad timestamp '{ts}'");
                        }
                        start.map(|start| MeasureRecord {
                            start,
                            step_seconds: default_step,
                            values: vec![tuple],
                        })
                    })
                    .collect();
                // String keys sort lexically; order by time instead.
                records.sort_by_key(|r| r.start);
                records
            }
        }
    }
}

fn token_rejected(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::UNAUTHORIZED {
        return true;
    }
    if status.is_success() {
        return false;
    }
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|e| matches!(e.error.code, INVALID_TOKEN | EXPIRED_TOKEN))
        .unwrap_or(false)
}

fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ApiErrorBody>(body) {
        Ok(e) if !e.error.message.is_empty() => {
            format!("{} (code {})", e.error.message, e.error.code)
        }
        _ => truncate_body(body),
    }
}

#[async_trait]
impl StationApi for NetatmoClient {
    async fn fetch_current(&self) -> Result<Station> {
        let body: StationsBody = self
            .get_body("/api/getstationsdata", &[], "Netatmo stations data")
            .await?;

        let device = body.devices.into_iter().next().ok_or(Error::NoStation)?;
        let station = normalize_device(device)?;

        tracing::debug!(
            "station {} ({}) reports {} modules",
            station.name,
            station.id,
            station.modules.len()
        );
        Ok(station)
    }

    async fn fetch_measurements(&self, query: &MeasureQuery) -> Result<HistoricalSeries> {
        let mut params = vec![
            ("device_id", query.device_id.clone()),
            ("scale", query.scale.as_str().to_string()),
            ("type", query.types.join(",")),
            ("date_begin", query.begin.timestamp().to_string()),
            ("date_end", query.end.timestamp().to_string()),
            ("optimize", "true".to_string()),
        ];
        if let Some(module_id) = &query.module_id {
            params.push(("module_id", module_id.clone()));
        }

        let body: MeasureBody = self
            .get_body("/api/getmeasure", &params, "Netatmo measurements")
            .await?;

        Ok(HistoricalSeries {
            device_id: query.device_id.clone(),
            module_id: query.module_id.clone(),
            name: query.name.clone(),
            types: query.types.clone(),
            records: body.into_records(query.scale.seconds()),
        })
    }
}
