use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use home_weather_core::{
    Config, Coordinates, Credentials, ForecastService, Scale, WeatherService,
    forecast::MAX_FORECAST_DAYS, service,
};
use serde_json::json;

use crate::display::{
    CurrentView, ForecastSummaryView, ForecastView, HistoryView, OutdoorView, TodayView, WeekView,
};

const STATION_VIEWS: [&str; 4] = ["current", "historical", "summary", "outdoor"];

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "home-weather", version, about = "Netatmo weather station CLI")]
pub struct Cli {
    /// Show current weather data (default when no view is selected).
    #[arg(long)]
    pub current: bool,

    /// Show historical data for a day.
    #[arg(long)]
    pub historical: bool,

    /// Show both current and historical data.
    #[arg(long)]
    pub summary: bool,

    /// Show outdoor weather data (wind, rain, temperature, pressure).
    #[arg(long)]
    pub outdoor: bool,

    /// Output in JSON format.
    #[arg(long)]
    pub json: bool,

    /// Include ids, battery levels and extra readings.
    #[arg(short, long)]
    pub verbose: bool,

    /// Day for historical data, e.g. 2024-03-10; defaults to today.
    #[arg(long)]
    pub date: Option<NaiveDate>,

    /// Measurement step: 30min, 1hour, 3hours or 1day.
    #[arg(long, default_value = "1hour")]
    pub scale: Scale,

    /// Show the Open-Meteo forecast instead of station data.
    #[arg(
        long,
        value_enum,
        num_args = 0..=1,
        default_missing_value = "hourly",
        conflicts_with_all = STATION_VIEWS
    )]
    pub forecast: Option<ForecastKind>,

    /// Days of hourly forecast, 1 to 7.
    #[arg(long, default_value_t = MAX_FORECAST_DAYS, requires = "forecast")]
    pub days: u8,

    /// Forecast location as LONGITUDE,LATITUDE; defaults to the configured one.
    #[arg(long, requires = "forecast", allow_hyphen_values = true)]
    pub coords: Option<Coordinates>,

    /// Store Netatmo credentials in the config file interactively.
    #[arg(long, conflicts_with_all = ["current", "historical", "summary", "outdoor", "forecast", "json"])]
    pub configure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ForecastKind {
    /// Hour by hour with sunrise and sunset.
    Hourly,
    /// Today's statistics.
    Today,
    /// One line per day.
    Week,
    /// Statistics over the whole window.
    Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Current,
    Historical,
    Summary,
    Outdoor,
}

impl Cli {
    /// Which view the flags ask for. `--outdoor` wins, then summary; asking
    /// for both current and historical is a summary.
    pub fn view(&self) -> View {
        if self.outdoor {
            View::Outdoor
        } else if self.summary || (self.current && self.historical) {
            View::Summary
        } else if self.historical {
            View::Historical
        } else {
            View::Current
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        if self.configure {
            return configure();
        }

        let config = Config::load().context("Failed to load configuration")?;
        if let Some(kind) = self.forecast {
            return self.run_forecast(&config, kind).await;
        }

        let weather = WeatherService::from_config(&config)?;
        let date = self.date.unwrap_or_else(service::today);
        let view = self.view();
        tracing::debug!("showing {view:?} view, date {date}, scale {}", self.scale);

        match view {
            View::Current => {
                let station = weather.current().await?;
                if self.json {
                    print_json(&json!({ "current": station }))?;
                } else {
                    print!("{}", CurrentView { station: &station, verbose: self.verbose });
                }
            }
            View::Historical => {
                let history = weather.historical(date, self.scale).await?;
                if self.json {
                    print_json(&json!({ "historical": history }))?;
                } else {
                    print!("{}", HistoryView { history: &history, verbose: self.verbose });
                }
            }
            View::Summary => {
                let summary = weather.summary(date, self.scale).await?;
                if self.json {
                    print_json(&summary)?;
                } else {
                    print!(
                        "{}{}",
                        CurrentView { station: &summary.current, verbose: self.verbose },
                        HistoryView { history: &summary.historical, verbose: self.verbose }
                    );
                }
            }
            View::Outdoor => {
                let outdoor = weather.outdoor().await?;
                if self.json {
                    print_json(&outdoor)?;
                } else {
                    print!("{}", OutdoorView { summary: &outdoor, verbose: self.verbose });
                }
            }
        }

        Ok(())
    }

    /// Forecast views need no Netatmo credentials.
    async fn run_forecast(&self, config: &Config, kind: ForecastKind) -> anyhow::Result<()> {
        let forecast = ForecastService::from_config(config)?;
        let coords = self.coords;
        tracing::debug!("showing {kind:?} forecast, {} days", self.days);

        match kind {
            ForecastKind::Hourly => {
                let report = forecast.forecast(coords, self.days).await?;
                if self.json {
                    print_json(&json!({ "forecast": report }))?;
                } else {
                    print!("{}", ForecastView { report: &report, verbose: self.verbose });
                }
            }
            ForecastKind::Today => {
                let today = forecast.today(coords).await?;
                if self.json {
                    print_json(&json!({ "today_forecast": today }))?;
                } else {
                    print!("{}", TodayView { today: &today, verbose: self.verbose });
                }
            }
            ForecastKind::Week => {
                let week = forecast.week(coords).await?;
                if self.json {
                    print_json(&json!({ "week_forecast": week }))?;
                } else {
                    print!("{}", WeekView { week: &week });
                }
            }
            ForecastKind::Summary => {
                let summary = forecast.summary(coords).await?;
                if self.json {
                    print_json(&json!({ "forecast_summary": summary }))?;
                } else {
                    print!("{}", ForecastSummaryView { summary: &summary });
                }
            }
        }

        Ok(())
    }
}

fn print_json<T: serde::Serialize>(data: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(data).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

/// Prompt for credentials and merge them into the config file.
fn configure() -> anyhow::Result<()> {
    let mut config = Config::load_file().context("Failed to load existing configuration")?;

    let client_id = inquire::Text::new("Netatmo client id:")
        .with_default(config.netatmo.client_id.as_deref().unwrap_or_default())
        .prompt()?;
    let client_secret = inquire::Password::new("Netatmo client secret:")
        .without_confirmation()
        .prompt()?;
    let username = inquire::Text::new("Netatmo account e-mail:")
        .with_default(config.netatmo.username.as_deref().unwrap_or_default())
        .prompt()?;
    let password = inquire::Password::new("Netatmo account password:")
        .without_confirmation()
        .prompt()?;

    config.set_credentials(Credentials {
        client_id,
        client_secret,
        username,
        password,
    });

    let path = config.save().context("Failed to save configuration")?;
    println!("Saved credentials to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["home-weather"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn current_is_the_default_view() {
        assert_eq!(parse(&[]).view(), View::Current);
        assert_eq!(parse(&["--json"]).view(), View::Current);
    }

    #[test]
    fn flags_select_views() {
        assert_eq!(parse(&["--historical"]).view(), View::Historical);
        assert_eq!(parse(&["--summary"]).view(), View::Summary);
        assert_eq!(parse(&["--current", "--historical"]).view(), View::Summary);
        assert_eq!(parse(&["--outdoor", "--summary"]).view(), View::Outdoor);
    }

    #[test]
    fn date_and_scale_are_parsed() {
        let cli = parse(&["--historical", "--date", "2024-03-10", "--scale", "3hours"]);
        assert_eq!(cli.date, NaiveDate::from_ymd_opt(2024, 3, 10));
        assert_eq!(cli.scale, Scale::ThreeHours);
        assert_eq!(parse(&[]).scale, Scale::Hour);
    }

    #[test]
    fn bad_scale_is_rejected() {
        assert!(Cli::try_parse_from(["home-weather", "--scale", "weekly"]).is_err());
    }

    #[test]
    fn bare_forecast_flag_means_hourly() {
        let cli = parse(&["--forecast"]);
        assert_eq!(cli.forecast, Some(ForecastKind::Hourly));
        assert_eq!(cli.days, 7);
        assert_eq!(cli.coords, None);

        let cli = parse(&["--forecast", "week", "--json"]);
        assert_eq!(cli.forecast, Some(ForecastKind::Week));
        assert!(cli.json);
    }

    #[test]
    fn forecast_takes_days_and_coords() {
        let cli = parse(&["--forecast", "--days", "3", "--coords", "-0.12,51.5"]);
        assert_eq!(cli.forecast, Some(ForecastKind::Hourly));
        assert_eq!(cli.days, 3);
        assert_eq!(cli.coords, Some(Coordinates::new(51.5, -0.12).unwrap()));
    }

    #[test]
    fn forecast_rejects_station_views_and_bad_coords() {
        assert!(Cli::try_parse_from(["home-weather", "--forecast", "--outdoor"]).is_err());
        assert!(Cli::try_parse_from(["home-weather", "--forecast", "--coords", "north"]).is_err());
        assert!(Cli::try_parse_from(["home-weather", "--days", "3"]).is_err());
    }

    #[test]
    fn configure_conflicts_with_views() {
        assert!(Cli::try_parse_from(["home-weather", "--configure", "--outdoor"]).is_err());
    }
}
