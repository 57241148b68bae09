//! Error type shared by every layer of the weather pipeline.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Credentials or refresh token rejected by the provider.
    #[error("Netatmo authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success answer from Netatmo or Open-Meteo.
    #[error("Upstream API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Failed to parse {context}: {source}")]
    Parse {
        context: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No weather station found on this Netatmo account")]
    NoStation,

    /// The forecast has no data points for what was asked.
    #[error("No forecast data: {0}")]
    NoData(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Failed to access config file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", .path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),
}

impl Error {
    /// Short, stable name for the error, used in HTTP error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Auth(_) => "auth",
            Error::Network(_) => "network",
            Error::Api { .. } => "api",
            Error::Parse { .. } => "parse",
            Error::Config(_) | Error::Io { .. } | Error::Toml { .. } | Error::TomlSer(_) => {
                "config"
            }
            Error::NoStation => "no_station",
            Error::NoData(_) => "no_data",
            Error::InvalidRequest(_) => "invalid_request",
        }
    }

    pub(crate) fn parse(
        context: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Parse {
            context,
            source: Box::new(source),
        }
    }
}

/// Cut a response body down to something that fits in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() > MAX {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    } else {
        body.to_string()
    }
}
