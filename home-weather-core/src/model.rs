use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Module categories the pipeline knows how to read, keyed by Netatmo type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    Indoor,
    Outdoor,
    Wind,
    Rain,
}

impl ModuleCategory {
    pub fn from_type_code(code: &str) -> Option<Self> {
        match code {
            "NAMain" => Some(ModuleCategory::Indoor),
            "NAModule1" => Some(ModuleCategory::Outdoor),
            "NAModule2" => Some(ModuleCategory::Wind),
            "NAModule3" => Some(ModuleCategory::Rain),
            _ => None,
        }
    }

    pub fn type_code(&self) -> &'static str {
        match self {
            ModuleCategory::Indoor => "NAMain",
            ModuleCategory::Outdoor => "NAModule1",
            ModuleCategory::Wind => "NAModule2",
            ModuleCategory::Rain => "NAModule3",
        }
    }

    /// Measurement types requested from `getmeasure` for this category, in
    /// the order the values come back.
    pub fn measure_types(&self) -> &'static [&'static str] {
        match self {
            ModuleCategory::Indoor => &["Temperature", "Humidity", "Pressure", "CO2", "Noise"],
            ModuleCategory::Outdoor => &["Temperature", "Humidity"],
            ModuleCategory::Wind => &["WindStrength", "WindAngle", "GustStrength", "GustAngle"],
            ModuleCategory::Rain => &["Rain"],
        }
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ModuleCategory::Indoor => "indoor",
            ModuleCategory::Outdoor => "outdoor",
            ModuleCategory::Wind => "wind",
            ModuleCategory::Rain => "rain",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Stable,
}

/// Indoor readings of the main station.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndoorReading {
    #[serde(rename(deserialize = "Temperature"), default)]
    pub temperature: Option<f64>,
    #[serde(rename(deserialize = "Humidity"), default)]
    pub humidity: Option<u8>,
    #[serde(rename(deserialize = "Pressure"), default)]
    pub pressure: Option<f64>,
    #[serde(rename(deserialize = "AbsolutePressure"), default)]
    pub absolute_pressure: Option<f64>,
    #[serde(rename(deserialize = "CO2"), default)]
    pub co2: Option<u32>,
    #[serde(rename(deserialize = "Noise"), default)]
    pub noise: Option<u32>,
    #[serde(default)]
    pub pressure_trend: Option<Trend>,
    #[serde(default)]
    pub temp_trend: Option<Trend>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub time_utc: Option<DateTime<Utc>>,
}

/// Outdoor temperature module (`NAModule1`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutdoorReading {
    #[serde(rename(deserialize = "Temperature"), default)]
    pub temperature: Option<f64>,
    #[serde(rename(deserialize = "Humidity"), default)]
    pub humidity: Option<u8>,
    #[serde(default)]
    pub min_temp: Option<f64>,
    #[serde(default)]
    pub max_temp: Option<f64>,
    #[serde(default)]
    pub temp_trend: Option<Trend>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub time_utc: Option<DateTime<Utc>>,
}

/// Wind gauge (`NAModule2`). Strengths in km/h, angles in degrees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WindReading {
    #[serde(rename(deserialize = "WindStrength"), default)]
    pub wind_strength: Option<f64>,
    #[serde(rename(deserialize = "WindAngle"), default)]
    pub wind_angle: Option<f64>,
    #[serde(rename(deserialize = "GustStrength"), default)]
    pub gust_strength: Option<f64>,
    #[serde(rename(deserialize = "GustAngle"), default)]
    pub gust_angle: Option<f64>,
    #[serde(default)]
    pub max_wind_str: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub time_utc: Option<DateTime<Utc>>,
}

/// Rain gauge (`NAModule3`). Millimetres.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RainReading {
    #[serde(rename(deserialize = "Rain"), default)]
    pub rain: Option<f64>,
    #[serde(rename(deserialize = "sum_rain_1h"), default)]
    pub rain_1h: Option<f64>,
    #[serde(rename(deserialize = "sum_rain_24h"), default)]
    pub rain_24h: Option<f64>,
    #[serde(default, with = "chrono::serde::ts_seconds_option")]
    pub time_utc: Option<DateTime<Utc>>,
}

/// Dashboard data of a module, shaped by its category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", content = "dashboard", rename_all = "snake_case")]
pub enum Reading {
    Indoor(IndoorReading),
    Outdoor(OutdoorReading),
    Wind(WindReading),
    Rain(RainReading),
    /// Unknown type code; the raw dashboard is passed through.
    Unclassified(Map<String, Value>),
}

impl Reading {
    pub fn category(&self) -> Option<ModuleCategory> {
        match self {
            Reading::Indoor(_) => Some(ModuleCategory::Indoor),
            Reading::Outdoor(_) => Some(ModuleCategory::Outdoor),
            Reading::Wind(_) => Some(ModuleCategory::Wind),
            Reading::Rain(_) => Some(ModuleCategory::Rain),
            Reading::Unclassified(_) => None,
        }
    }

    pub fn time_utc(&self) -> Option<DateTime<Utc>> {
        match self {
            Reading::Indoor(r) => r.time_utc,
            Reading::Outdoor(r) => r.time_utc,
            Reading::Wind(r) => r.time_utc,
            Reading::Rain(r) => r.time_utc,
            Reading::Unclassified(raw) => raw
                .get("time_utc")
                .and_then(Value::as_i64)
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Module {
    pub id: String,
    pub name: String,
    pub type_code: String,
    pub battery_percent: Option<u8>,
    pub reading: Reading,
}

impl Module {
    pub fn category(&self) -> Option<ModuleCategory> {
        self.reading.category()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    pub location: Location,
    pub dashboard: IndoorReading,
    pub modules: Vec<Module>,
}

impl Station {
    /// First module of the given category, in payload order.
    pub fn first_module(&self, category: ModuleCategory) -> Option<&Module> {
        self.modules.iter().find(|m| m.category() == Some(category))
    }
}

/// Aggregation step for historical measurements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Scale {
    #[serde(rename = "30min")]
    HalfHour,
    #[default]
    #[serde(rename = "1hour")]
    Hour,
    #[serde(rename = "3hours")]
    ThreeHours,
    #[serde(rename = "1day")]
    Day,
}

impl Scale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scale::HalfHour => "30min",
            Scale::Hour => "1hour",
            Scale::ThreeHours => "3hours",
            Scale::Day => "1day",
        }
    }

    pub fn seconds(&self) -> i64 {
        match self {
            Scale::HalfHour => 30 * 60,
            Scale::Hour => 60 * 60,
            Scale::ThreeHours => 3 * 60 * 60,
            Scale::Day => 24 * 60 * 60,
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "30min" => Ok(Scale::HalfHour),
            "1hour" => Ok(Scale::Hour),
            "3hours" => Ok(Scale::ThreeHours),
            "1day" => Ok(Scale::Day),
            other => Err(format!(
                "Unknown scale '{other}'. Supported scales: 30min, 1hour, 3hours, 1day."
            )),
        }
    }
}

/// One `getmeasure` call: which device/module, which types, which window.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureQuery {
    pub device_id: String,
    pub module_id: Option<String>,
    pub name: String,
    pub types: Vec<String>,
    pub scale: Scale,
    pub begin: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A block of evenly spaced measurements starting at `start`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasureRecord {
    #[serde(with = "chrono::serde::ts_seconds")]
    pub start: DateTime<Utc>,
    pub step_seconds: i64,
    pub values: Vec<Vec<Option<f64>>>,
}

impl MeasureRecord {
    /// Each tuple paired with its own timestamp.
    pub fn points(&self) -> impl Iterator<Item = (DateTime<Utc>, &[Option<f64>])> + '_ {
        self.values.iter().enumerate().map(move |(i, tuple)| {
            let offset = chrono::Duration::seconds(self.step_seconds * i as i64);
            (self.start + offset, tuple.as_slice())
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoricalSeries {
    pub device_id: String,
    pub module_id: Option<String>,
    pub name: String,
    pub types: Vec<String>,
    pub records: Vec<MeasureRecord>,
}

impl HistoricalSeries {
    pub fn point_count(&self) -> usize {
        self.records.iter().map(|r| r.values.len()).sum()
    }
}

/// Every series measured for one calendar day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayHistory {
    pub date: NaiveDate,
    pub scale: Scale,
    pub series: Vec<HistoricalSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutdoorSection {
    pub module_id: String,
    pub module_name: String,
    pub temperature: Option<f64>,
    pub humidity: Option<u8>,
    pub min_temp: Option<f64>,
    pub max_temp: Option<f64>,
    pub temp_trend: Option<Trend>,
    /// Taken from the main station; the outdoor module has no barometer.
    pub pressure: Option<f64>,
    pub pressure_trend: Option<Trend>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WindSection {
    pub module_id: String,
    pub module_name: String,
    pub wind_strength: Option<f64>,
    pub wind_angle: Option<f64>,
    pub gust_strength: Option<f64>,
    pub gust_angle: Option<f64>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RainSection {
    pub module_id: String,
    pub module_name: String,
    pub rain: Option<f64>,
    pub rain_1h: Option<f64>,
    pub rain_24h: Option<f64>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_update: Option<DateTime<Utc>>,
}

/// Outdoor view of a station; categories without a module are left out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OutdoorSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outdoor: Option<OutdoorSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wind: Option<WindSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rain: Option<RainSection>,
}

impl OutdoorSummary {
    pub fn is_empty(&self) -> bool {
        self.outdoor.is_none() && self.wind.is_none() && self.rain.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DaySummary {
    pub current: Station,
    pub historical: DayHistory,
    pub outdoor: OutdoorSummary,
}
