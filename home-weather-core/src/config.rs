use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    forecast::Coordinates,
};

pub const DEFAULT_API_URL: &str = "https://api.netatmo.com";
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_LATITUDE: f64 = 49.922;
pub const DEFAULT_LONGITUDE: f64 = 14.446;
/// Let Open-Meteo pick the zone from the coordinates.
pub const DEFAULT_TIMEZONE: &str = "auto";

pub const ENV_CLIENT_ID: &str = "NETATMO_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "NETATMO_CLIENT_SECRET";
pub const ENV_USERNAME: &str = "NETATMO_USERNAME";
pub const ENV_PASSWORD: &str = "NETATMO_PASSWORD";
pub const ENV_API_URL: &str = "NETATMO_API_URL";
pub const ENV_HOST: &str = "HWS_HOST";
pub const ENV_PORT: &str = "HWS_PORT";
pub const ENV_FORECAST_URL: &str = "FORECAST_API_URL";
pub const ENV_FORECAST_LATITUDE: &str = "FORECAST_LATITUDE";
pub const ENV_FORECAST_LONGITUDE: &str = "FORECAST_LONGITUDE";
pub const ENV_FORECAST_TIMEZONE: &str = "FORECAST_TIMEZONE";

/// Netatmo account and application settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NetatmoConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_url: Option<String>,
}

/// Where the HTTP front end listens.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

/// Default location and endpoint for Open-Meteo forecasts.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ForecastConfig {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub timezone: Option<String>,
    pub api_url: Option<String>,
}

/// Top-level configuration.
///
/// Example TOML:
/// ```toml
/// [netatmo]
/// client_id = "..."
/// client_secret = "..."
/// username = "me@example.com"
/// password = "..."
///
/// [server]
/// port = 8080
///
/// [forecast]
/// latitude = 49.922
/// longitude = 14.446
/// ```
///
/// Environment variables override whatever the file says.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub netatmo: NetatmoConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub forecast: ForecastConfig,
}

/// The four values needed for a password-grant token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Config {
    /// Load the config file (if any), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_file()?;
        cfg.merge_vars(|name| std::env::var(name).ok())?;
        Ok(cfg)
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load_file() -> Result<Self> {
        Self::load_from(&Self::config_file_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Config = toml::from_str(&contents).map_err(|source| Error::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!("loaded config from {}", path.display());
        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<PathBuf> {
        let path = Self::config_file_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let io_error = |source| Error::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml).map_err(io_error)
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "home-weather", "home-weather")
            .ok_or_else(|| Error::Config("Could not determine platform config directory".into()))?;

        Ok(dirs.config_dir().join("config.toml"))
    }

    /// Override fields with whatever `lookup` returns for the known variable names.
    ///
    /// Empty values count as unset.
    pub fn merge_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let netatmo = &mut self.netatmo;
        for (name, slot) in [
            (ENV_CLIENT_ID, &mut netatmo.client_id),
            (ENV_CLIENT_SECRET, &mut netatmo.client_secret),
            (ENV_USERNAME, &mut netatmo.username),
            (ENV_PASSWORD, &mut netatmo.password),
            (ENV_API_URL, &mut netatmo.api_url),
            (ENV_HOST, &mut self.server.host),
            (ENV_FORECAST_URL, &mut self.forecast.api_url),
            (ENV_FORECAST_TIMEZONE, &mut self.forecast.timezone),
        ] {
            if let Some(value) = get(name) {
                *slot = Some(value);
            }
        }

        if let Some(port) = get(ENV_PORT) {
            let port = port
                .trim()
                .parse::<u16>()
                .map_err(|_| Error::Config(format!("{ENV_PORT} must be a port number, got '{port}'")))?;
            self.server.port = Some(port);
        }

        for (name, slot) in [
            (ENV_FORECAST_LATITUDE, &mut self.forecast.latitude),
            (ENV_FORECAST_LONGITUDE, &mut self.forecast.longitude),
        ] {
            if let Some(value) = get(name) {
                let parsed = value
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| Error::Config(format!("{name} must be a number, got '{value}'")))?;
                *slot = Some(parsed);
            }
        }

        Ok(())
    }

    /// Validate that every credential is present.
    ///
    /// The error names each missing variable, so a half-configured setup is
    /// reported in one go.
    pub fn credentials(&self) -> Result<Credentials> {
        let n = &self.netatmo;
        let required = [
            (ENV_CLIENT_ID, &n.client_id),
            (ENV_CLIENT_SECRET, &n.client_secret),
            (ENV_USERNAME, &n.username),
            (ENV_PASSWORD, &n.password),
        ];

        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.is_none())
            .map(|(name, _)| *name)
            .collect();

        if !missing.is_empty() {
            return Err(Error::Config(format!(
                "Missing required environment variables: {}.\n\
                 Hint: set them in a .env file or run `home-weather --configure`.",
                missing.join(", ")
            )));
        }

        Ok(Credentials {
            client_id: n.client_id.clone().unwrap_or_default(),
            client_secret: n.client_secret.clone().unwrap_or_default(),
            username: n.username.clone().unwrap_or_default(),
            password: n.password.clone().unwrap_or_default(),
        })
    }

    pub fn api_url(&self) -> &str {
        self.netatmo
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
    }

    /// Location used when a forecast request names none.
    pub fn forecast_location(&self) -> Result<Coordinates> {
        let f = &self.forecast;
        Coordinates::new(
            f.latitude.unwrap_or(DEFAULT_LATITUDE),
            f.longitude.unwrap_or(DEFAULT_LONGITUDE),
        )
        .map_err(|e| Error::Config(format!("bad forecast location: {e}")))
    }

    pub fn forecast_api_url(&self) -> &str {
        self.forecast
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_FORECAST_URL)
            .trim_end_matches('/')
    }

    pub fn forecast_timezone(&self) -> &str {
        self.forecast.timezone.as_deref().unwrap_or(DEFAULT_TIMEZONE)
    }

    /// `host:port` string for the HTTP listener.
    pub fn bind_addr(&self) -> String {
        let host = self.server.host.as_deref().unwrap_or(DEFAULT_HOST);
        let port = self.server.port.unwrap_or(DEFAULT_PORT);
        format!("{host}:{port}")
    }

    /// Convenience helper used by interactive setup.
    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.netatmo.client_id = Some(credentials.client_id);
        self.netatmo.client_secret = Some(credentials.client_secret);
        self.netatmo.username = Some(credentials.username);
        self.netatmo.password = Some(credentials.password);
    }
}
