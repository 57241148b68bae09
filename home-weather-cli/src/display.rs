//! Human-readable rendering of station data and forecasts.
//!
//! Each view is a borrowed wrapper implementing [`fmt::Display`], so the
//! caller decides where the text goes.

use chrono::{DateTime, Local, NaiveDateTime, Utc};
use home_weather_core::{
    DayHistory, HistoricalSeries, OutdoorSummary, Reading, Station, Trend,
    forecast::{
        ForecastLocation, ForecastReport, ForecastSummary, HourlyForecast, Stats, TodayForecast,
        WeekForecast,
    },
};
use std::fmt::{self, Display, Formatter};

const RULE_WIDTH: usize = 60;

/// Hours listed by the plain forecast view.
const HOURLY_ROWS: usize = 24;

const COMPASS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

pub fn with_unit<T: Display>(value: Option<T>, unit: &str) -> String {
    match value {
        Some(v) if unit == "%" => format!("{v}%"),
        Some(v) => format!("{v} {unit}"),
        None => "N/A".to_string(),
    }
}

pub fn temperature(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v}°C"),
        None => "N/A".to_string(),
    }
}

/// 16-point compass name for an angle in degrees.
pub fn compass_direction(angle: f64) -> &'static str {
    let index = (angle.rem_euclid(360.0) / 22.5).round() as usize % COMPASS.len();
    COMPASS[index]
}

pub fn angle(value: Option<f64>) -> String {
    match value {
        Some(a) => format!("{a}° ({})", compass_direction(a)),
        None => "N/A".to_string(),
    }
}

pub fn trend_arrow(trend: Trend) -> &'static str {
    match trend {
        Trend::Up => "↗",
        Trend::Down => "↘",
        Trend::Stable => "→",
    }
}

fn trend(value: Option<Trend>) -> String {
    match value {
        Some(t) => {
            let name = match t {
                Trend::Up => "up",
                Trend::Down => "down",
                Trend::Stable => "stable",
            };
            format!("{} {name}", trend_arrow(t))
        }
        None => "N/A".to_string(),
    }
}

fn local_time(ts: DateTime<Utc>, pattern: &str) -> String {
    ts.with_timezone(&Local).format(pattern).to_string()
}

fn clock(time: Option<NaiveDateTime>) -> String {
    time.map(|t| t.format("%H:%M").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

/// Two decimals at most, trailing zeros dropped.
fn rounded(value: Option<f64>) -> Option<f64> {
    value.map(|v| (v * 100.0).round() / 100.0)
}

fn range(stats: &Stats, unit: &str) -> String {
    let show = |v: Option<f64>| match unit {
        "°C" => temperature(rounded(v)),
        _ => with_unit(rounded(v), unit),
    };
    format!(
        "{} to {} (avg {})",
        show(stats.min),
        show(stats.max),
        show(stats.average)
    )
}

/// Unit for a `getmeasure` type name.
pub fn measure_unit(kind: &str) -> &'static str {
    match kind {
        "Temperature" | "min_temp" | "max_temp" => "°C",
        "Humidity" => "%",
        "Pressure" => "hPa",
        "CO2" => "ppm",
        "Noise" => "dB",
        "WindStrength" | "GustStrength" => "km/h",
        "WindAngle" | "GustAngle" => "°",
        "Rain" => "mm",
        _ => "",
    }
}

fn measure_value(kind: &str, value: Option<f64>) -> String {
    match (measure_unit(kind), value) {
        (_, None) => "N/A".to_string(),
        ("°C", Some(v)) => format!("{v}°C"),
        ("°", Some(v)) => format!("{v}° ({})", compass_direction(v)),
        ("%", Some(v)) => format!("{v}%"),
        ("", Some(v)) => v.to_string(),
        (unit, Some(v)) => format!("{v} {unit}"),
    }
}

fn header(f: &mut Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f, "\n{title}")?;
    writeln!(f, "{}", "=".repeat(RULE_WIDTH))
}

fn last_update(f: &mut Formatter<'_>, indent: &str, ts: Option<DateTime<Utc>>) -> fmt::Result {
    match ts {
        Some(ts) => writeln!(
            f,
            "{indent}Last Update: {}",
            local_time(ts, "%Y-%m-%d %H:%M:%S")
        ),
        None => Ok(()),
    }
}

/// Station and module readings.
pub struct CurrentView<'a> {
    pub station: &'a Station,
    pub verbose: bool,
}

impl Display for CurrentView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let station = self.station;
        let d = &station.dashboard;

        header(f, &format!("Current Weather - {}", station.name))?;
        writeln!(
            f,
            "Location: {}, {} (altitude {} m)",
            station.location.latitude, station.location.longitude, station.location.altitude
        )?;
        if self.verbose {
            writeln!(f, "Station ID: {}", station.id)?;
        }
        writeln!(f, "Main Station Readings:")?;
        writeln!(f, "   Temperature: {}", temperature(d.temperature))?;
        writeln!(f, "   Humidity: {}", with_unit(d.humidity, "%"))?;
        writeln!(f, "   Pressure: {}", with_unit(d.pressure, "hPa"))?;
        if d.pressure_trend.is_some() {
            writeln!(f, "   Pressure Trend: {}", trend(d.pressure_trend))?;
        }
        writeln!(f, "   CO2: {}", with_unit(d.co2, "ppm"))?;
        writeln!(f, "   Noise: {}", with_unit(d.noise, "dB"))?;
        last_update(f, "   ", d.time_utc)?;

        if !station.modules.is_empty() {
            writeln!(f, "\nAdditional Modules ({}):", station.modules.len())?;
        }
        for (i, module) in station.modules.iter().enumerate() {
            writeln!(f, "\n   {}. {} ({})", i + 1, module.name, module.type_code)?;
            if self.verbose {
                writeln!(f, "      ID: {}", module.id)?;
                if let Some(battery) = module.battery_percent {
                    writeln!(f, "      Battery: {battery}%")?;
                }
            }

            let ind = "      ";
            match &module.reading {
                Reading::Indoor(r) => {
                    writeln!(f, "{ind}Temperature: {}", temperature(r.temperature))?;
                    writeln!(f, "{ind}Humidity: {}", with_unit(r.humidity, "%"))?;
                    writeln!(f, "{ind}CO2: {}", with_unit(r.co2, "ppm"))?;
                }
                Reading::Outdoor(r) => {
                    writeln!(f, "{ind}Temperature: {}", temperature(r.temperature))?;
                    writeln!(f, "{ind}Humidity: {}", with_unit(r.humidity, "%"))?;
                    if self.verbose {
                        writeln!(
                            f,
                            "{ind}Min/Max: {} / {}",
                            temperature(r.min_temp),
                            temperature(r.max_temp)
                        )?;
                    }
                }
                Reading::Wind(r) => {
                    writeln!(f, "{ind}Wind: {}", with_unit(r.wind_strength, "km/h"))?;
                    writeln!(f, "{ind}Direction: {}", angle(r.wind_angle))?;
                }
                Reading::Rain(r) => {
                    writeln!(f, "{ind}Rain: {}", with_unit(r.rain, "mm"))?;
                }
                Reading::Unclassified(raw) => {
                    for (key, value) in raw.iter().filter(|(k, _)| k.as_str() != "time_utc") {
                        writeln!(f, "{ind}{key}: {value}")?;
                    }
                }
            }
            last_update(f, ind, module.reading.time_utc())?;
        }

        Ok(())
    }
}

struct SeriesView<'a> {
    series: &'a HistoricalSeries,
    verbose: bool,
}

impl Display for SeriesView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let series = self.series;
        let label = match &series.module_id {
            Some(id) if self.verbose => format!("{} [{id}]", series.name),
            _ => series.name.clone(),
        };
        writeln!(f, "\n{label}: {}", series.types.join(", "))?;

        if series.records.is_empty() {
            return writeln!(f, "   No measurements");
        }

        for record in &series.records {
            for (ts, tuple) in record.points() {
                let values: Vec<String> = series
                    .types
                    .iter()
                    .zip(tuple)
                    .map(|(kind, value)| format!("{kind} {}", measure_value(kind, *value)))
                    .collect();
                writeln!(f, "   {}  {}", local_time(ts, "%H:%M"), values.join(" | "))?;
            }
        }
        Ok(())
    }
}

/// One day of measurements, grouped by device.
pub struct HistoryView<'a> {
    pub history: &'a DayHistory,
    pub verbose: bool,
}

impl Display for HistoryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let history = self.history;
        header(
            f,
            &format!("Historical Data for {} (step {})", history.date, history.scale),
        )?;

        if history.series.iter().all(|s| s.records.is_empty()) {
            return writeln!(f, "No historical measurements found");
        }

        for series in &history.series {
            write!(
                f,
                "{}",
                SeriesView {
                    series,
                    verbose: self.verbose
                }
            )?;
        }
        Ok(())
    }
}

/// Outdoor, wind and rain modules.
pub struct OutdoorView<'a> {
    pub summary: &'a OutdoorSummary,
    pub verbose: bool,
}

impl Display for OutdoorView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let summary = self.summary;
        header(f, "Outdoor Weather Data")?;

        if let Some(o) = &summary.outdoor {
            writeln!(f, "Outdoor Module: {}", o.module_name)?;
            if self.verbose {
                writeln!(f, "   ID: {}", o.module_id)?;
            }
            writeln!(f, "   Temperature: {}", temperature(o.temperature))?;
            writeln!(f, "   Humidity: {}", with_unit(o.humidity, "%"))?;
            if o.pressure.is_some() {
                writeln!(f, "   Pressure: {}", with_unit(o.pressure, "hPa"))?;
                if o.pressure_trend.is_some() {
                    writeln!(f, "   Pressure Trend: {}", trend(o.pressure_trend))?;
                }
            }
            last_update(f, "   ", o.last_update)?;
        }

        if let Some(w) = &summary.wind {
            writeln!(f, "\nWind Module: {}", w.module_name)?;
            writeln!(f, "   Wind Strength: {}", with_unit(w.wind_strength, "km/h"))?;
            writeln!(f, "   Wind Direction: {}", angle(w.wind_angle))?;
            writeln!(f, "   Gust Strength: {}", with_unit(w.gust_strength, "km/h"))?;
            writeln!(f, "   Gust Direction: {}", angle(w.gust_angle))?;
            last_update(f, "   ", w.last_update)?;
        }

        if let Some(r) = &summary.rain {
            writeln!(f, "\nRain Module: {}", r.module_name)?;
            writeln!(f, "   Current Rain: {}", with_unit(r.rain, "mm"))?;
            writeln!(f, "   Rain (1h): {}", with_unit(r.rain_1h, "mm"))?;
            writeln!(f, "   Rain (24h): {}", with_unit(r.rain_24h, "mm"))?;
            last_update(f, "   ", r.last_update)?;
        }

        if summary.is_empty() {
            writeln!(f, "No outdoor weather modules detected")?;
            writeln!(
                f,
                "   Make sure you have outdoor, wind, and/or rain modules connected"
            )?;
        }

        Ok(())
    }
}

fn location(f: &mut Formatter<'_>, location: &ForecastLocation) -> fmt::Result {
    header(f, "Location")?;
    writeln!(f, "   Coordinates: {}, {}", location.latitude, location.longitude)?;
    writeln!(f, "   Elevation: {}", with_unit(location.elevation, "m"))?;
    writeln!(
        f,
        "   Timezone: {}",
        location.timezone.as_deref().unwrap_or("N/A")
    )
}

fn conditions(f: &mut Formatter<'_>, hour: &HourlyForecast) -> fmt::Result {
    header(f, "Current Forecast Conditions")?;
    writeln!(f, "   Time: {}", clock(Some(hour.time)))?;
    writeln!(f, "   Temperature: {}", temperature(hour.temperature))?;
    writeln!(f, "   Feels Like: {}", temperature(hour.apparent_temperature))?;
    writeln!(f, "   Humidity: {}", with_unit(hour.humidity, "%"))?;
    writeln!(f, "   Weather: {}", hour.weather_description)?;
    writeln!(
        f,
        "   Wind: {} from {}",
        with_unit(hour.wind_speed, "km/h"),
        angle(hour.wind_direction)
    )?;
    writeln!(f, "   Pressure: {}", with_unit(hour.pressure, "hPa"))?;
    writeln!(f, "   Cloud Cover: {}", with_unit(hour.cloud_cover, "%"))
}

fn hour_rows(f: &mut Formatter<'_>, hours: &[HourlyForecast], verbose: bool) -> fmt::Result {
    if hours.is_empty() {
        return writeln!(f, "No hourly forecast data available");
    }
    for hour in hours {
        writeln!(
            f,
            "   {} {}: {} | {} | Wind: {} | Rain: {}",
            hour.time.format("%a"),
            clock(Some(hour.time)),
            temperature(hour.temperature),
            hour.weather_description,
            with_unit(hour.wind_speed, "km/h"),
            with_unit(hour.rain, "mm")
        )?;
        if verbose {
            writeln!(
                f,
                "        Humidity: {} | Pressure: {} | Clouds: {}",
                with_unit(hour.humidity, "%"),
                with_unit(hour.pressure, "hPa"),
                with_unit(hour.cloud_cover, "%")
            )?;
        }
    }
    Ok(())
}

/// Hour-by-hour forecast with sunrise and sunset per day.
pub struct ForecastView<'a> {
    pub report: &'a ForecastReport,
    pub verbose: bool,
}

impl Display for ForecastView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let report = self.report;
        location(f, &report.location)?;
        if let Some(current) = &report.current {
            conditions(f, current)?;
        }

        // Without --verbose only the hours from now on are listed.
        let from = report
            .current
            .as_ref()
            .and_then(|c| report.hourly.iter().position(|h| h.time == c.time))
            .unwrap_or(0);
        let hours = &report.hourly[from..];
        let hours = if self.verbose {
            hours
        } else {
            &hours[..hours.len().min(HOURLY_ROWS)]
        };

        header(f, &format!("Hourly Forecast ({} hours)", hours.len()))?;
        hour_rows(f, hours, self.verbose)?;

        header(f, "Daily Forecast")?;
        if report.daily.is_empty() {
            writeln!(f, "No daily forecast data available")?;
        }
        for day in &report.daily {
            writeln!(
                f,
                "   {}: Sunrise {} | Sunset {}",
                day.date,
                clock(day.sunrise),
                clock(day.sunset)
            )?;
        }

        writeln!(f, "\nGenerated at: {}", local_time(report.generated_at, "%Y-%m-%d %H:%M:%S"))
    }
}

/// Today's statistics, then each remaining hour.
pub struct TodayView<'a> {
    pub today: &'a TodayForecast,
    pub verbose: bool,
}

impl Display for TodayView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let t = self.today;
        header(f, &format!("Today's Forecast - {}", t.date))?;
        writeln!(
            f,
            "   Temperature: now {}, {}",
            temperature(t.temperature.current),
            range(&t.temperature.stats, "°C")
        )?;
        writeln!(
            f,
            "   Humidity: now {}, {}",
            with_unit(t.humidity.current, "%"),
            range(&t.humidity.stats, "%")
        )?;
        writeln!(
            f,
            "   Pressure: now {}, {}",
            with_unit(t.pressure.current, "hPa"),
            range(&t.pressure.stats, "hPa")
        )?;
        writeln!(
            f,
            "   Wind: now {}, avg {}, gusts up to {}",
            with_unit(t.wind.current_speed, "km/h"),
            with_unit(rounded(t.wind.average_speed), "km/h"),
            with_unit(t.wind.max_gust, "km/h")
        )?;
        writeln!(
            f,
            "   Rain: {} over {} hours ({} chance)",
            with_unit(rounded(t.precipitation.total_rain), "mm"),
            t.precipitation.rainy_hours,
            with_unit(rounded(t.precipitation.probability), "%")
        )?;
        writeln!(f, "   Cloud Cover: {}", range(&t.cloud_cover, "%"))?;

        header(f, "Hourly")?;
        hour_rows(f, &t.hourly, self.verbose)
    }
}

/// One line per day for the coming week.
pub struct WeekView<'a> {
    pub week: &'a WeekForecast,
}

impl Display for WeekView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        location(f, &self.week.location)?;
        header(f, "Weekly Forecast")?;

        for day in &self.week.daily_summaries {
            writeln!(f, "   {} {}: {}", day.weekday, day.date, day.weather_description)?;
            if day.temperature.average.is_none() {
                continue;
            }
            writeln!(
                f,
                "     Temperature: {} to {}",
                temperature(rounded(day.temperature.min)),
                temperature(rounded(day.temperature.max))
            )?;
            writeln!(
                f,
                "     Humidity: {} | Wind: {} | Rain: {} | Pressure: {}",
                with_unit(rounded(day.humidity), "%"),
                with_unit(rounded(day.wind_speed), "km/h"),
                with_unit(rounded(day.rain), "mm"),
                with_unit(rounded(day.pressure), "hPa")
            )?;
        }
        Ok(())
    }
}

/// Statistics over the whole forecast window.
pub struct ForecastSummaryView<'a> {
    pub summary: &'a ForecastSummary,
}

impl Display for ForecastSummaryView<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = &self.summary.summary;
        if let Some(current) = &self.summary.current_conditions {
            conditions(f, current)?;
        }

        header(f, "Forecast Summary")?;
        writeln!(
            f,
            "   Period: {} to {} ({} hours)",
            s.date_range.start.format("%Y-%m-%d %H:%M"),
            s.date_range.end.format("%Y-%m-%d %H:%M"),
            s.data_points
        )?;
        writeln!(f, "   Temperature: {}", range(&s.temperature, "°C"))?;
        writeln!(f, "   Humidity: {}", range(&s.humidity, "%"))?;
        writeln!(f, "   Pressure: {}", range(&s.pressure, "hPa"))?;
        writeln!(
            f,
            "   Wind: avg {}, gusts up to {}",
            with_unit(rounded(s.wind.average_speed), "km/h"),
            with_unit(s.wind.max_gust, "km/h")
        )?;
        writeln!(
            f,
            "   Rain: {} over {} hours",
            with_unit(rounded(s.precipitation.total_rain), "mm"),
            s.precipitation.rainy_hours
        )
    }
}
