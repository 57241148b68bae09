//! Turns raw `getstationsdata` records into typed stations and modules.
//!
//! The provider keys everything by module type code and ships each module's
//! readings as a loose `dashboard_data` object. Here each module is given a
//! [`Reading`] for its category, keeping only the fields that category
//! defines. Unknown type codes keep their raw dashboard.

use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Map, Value};

use crate::{
    error::{Error, Result},
    model::{
        Location, Module, ModuleCategory, OutdoorSection, OutdoorSummary, RainSection, Reading,
        Station, WindSection,
    },
};

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlace {
    /// `[longitude, latitude]`
    #[serde(default)]
    pub location: Vec<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawModule {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(rename = "type", default)]
    pub type_code: String,
    #[serde(default)]
    pub battery_percent: Option<u8>,
    #[serde(default)]
    pub dashboard_data: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawDevice {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub station_name: Option<String>,
    #[serde(default)]
    pub module_name: Option<String>,
    #[serde(default)]
    pub place: RawPlace,
    #[serde(default)]
    pub dashboard_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub modules: Vec<RawModule>,
}

fn extract<T: DeserializeOwned>(dashboard: Map<String, Value>, context: &'static str) -> Result<T> {
    serde_json::from_value(Value::Object(dashboard)).map_err(|e| Error::parse(context, e))
}

/// Classify a module by type code and pull out its category's fields.
///
/// A module without `dashboard_data` (unreachable, battery dead) still gets
/// a reading of its category, just with every field empty.
pub fn normalize_module(raw: RawModule) -> Result<Module> {
    let dashboard = raw.dashboard_data.unwrap_or_default();

    let reading = match ModuleCategory::from_type_code(&raw.type_code) {
        Some(ModuleCategory::Indoor) => Reading::Indoor(extract(dashboard, "indoor dashboard")?),
        Some(ModuleCategory::Outdoor) => {
            Reading::Outdoor(extract(dashboard, "outdoor module dashboard")?)
        }
        Some(ModuleCategory::Wind) => Reading::Wind(extract(dashboard, "wind module dashboard")?),
        Some(ModuleCategory::Rain) => Reading::Rain(extract(dashboard, "rain module dashboard")?),
        None => {
            tracing::debug!(
                "module {} has unknown type '{}', passing it through",
                raw.id,
                raw.type_code
            );
            Reading::Unclassified(dashboard)
        }
    };

    Ok(Module {
        id: raw.id,
        name: raw.module_name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        type_code: raw.type_code,
        battery_percent: raw.battery_percent,
        reading,
    })
}

pub fn normalize_device(raw: RawDevice) -> Result<Station> {
    let dashboard = extract(raw.dashboard_data.unwrap_or_default(), "station dashboard")?;

    let location = Location {
        longitude: raw.place.location.first().copied().unwrap_or_default(),
        latitude: raw.place.location.get(1).copied().unwrap_or_default(),
        altitude: raw.place.altitude.unwrap_or_default(),
    };

    let modules = raw
        .modules
        .into_iter()
        .map(normalize_module)
        .collect::<Result<Vec<_>>>()?;

    Ok(Station {
        id: raw.id,
        name: raw
            .station_name
            .or(raw.module_name)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
        location,
        dashboard,
        modules,
    })
}

/// First outdoor, wind and rain module of the station, each reduced to its
/// dashboard fields. The outdoor section borrows the station's barometer.
pub fn outdoor_summary(station: &Station) -> OutdoorSummary {
    let mut summary = OutdoorSummary::default();

    if let Some(module) = station.first_module(ModuleCategory::Outdoor) {
        if let Reading::Outdoor(r) = &module.reading {
            summary.outdoor = Some(OutdoorSection {
                module_id: module.id.clone(),
                module_name: module.name.clone(),
                temperature: r.temperature,
                humidity: r.humidity,
                min_temp: r.min_temp,
                max_temp: r.max_temp,
                temp_trend: r.temp_trend,
                pressure: station.dashboard.pressure,
                pressure_trend: station.dashboard.pressure_trend,
                last_update: r.time_utc,
            });
        }
    }

    if let Some(module) = station.first_module(ModuleCategory::Wind) {
        if let Reading::Wind(r) = &module.reading {
            summary.wind = Some(WindSection {
                module_id: module.id.clone(),
                module_name: module.name.clone(),
                wind_strength: r.wind_strength,
                wind_angle: r.wind_angle,
                gust_strength: r.gust_strength,
                gust_angle: r.gust_angle,
                last_update: r.time_utc,
            });
        }
    }

    if let Some(module) = station.first_module(ModuleCategory::Rain) {
        if let Reading::Rain(r) = &module.reading {
            summary.rain = Some(RainSection {
                module_id: module.id.clone(),
                module_name: module.name.clone(),
                rain: r.rain,
                rain_1h: r.rain_1h,
                rain_24h: r.rain_24h,
                last_update: r.time_utc,
            });
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Trend;
    use serde_json::json;

    fn module(value: Value) -> Module {
        normalize_module(serde_json::from_value(value).unwrap()).unwrap()
    }

    fn device(value: Value) -> Station {
        normalize_device(serde_json::from_value(value).unwrap()).unwrap()
    }

    #[test]
    fn category_does_not_depend_on_field_order() {
        let a = module(json!({
            "_id": "02:00:00:aa:bb:cc",
            "type": "NAModule2",
            "module_name": "Anemometer",
            "dashboard_data": {"WindStrength": 12, "WindAngle": 270, "GustStrength": 30, "GustAngle": 260, "time_utc": 1700000000}
        }));
        let b = module(json!({
            "dashboard_data": {"time_utc": 1700000000, "GustAngle": 260, "GustStrength": 30, "WindAngle": 270, "WindStrength": 12},
            "module_name": "Anemometer",
            "type": "NAModule2",
            "_id": "02:00:00:aa:bb:cc"
        }));

        assert_eq!(a.category(), Some(ModuleCategory::Wind));
        assert_eq!(a, b);
    }

    #[test]
    fn only_category_fields_are_kept() {
        let m = module(json!({
            "_id": "05:00:00:00:00:01",
            "type": "NAModule3",
            "dashboard_data": {"Rain": 0.2, "sum_rain_1h": 1.1, "sum_rain_24h": 4.5, "Temperature": 99.0}
        }));

        let json = serde_json::to_value(&m.reading).unwrap();
        assert_eq!(json["category"], "rain");
        assert_eq!(json["dashboard"]["rain_24h"], 4.5);
        assert!(json["dashboard"].get("temperature").is_none());
        assert_eq!(m.name, "Unknown");
    }

    #[test]
    fn unknown_type_is_passed_through() {
        let m = module(json!({
            "_id": "03:00:00:00:00:01",
            "type": "NAModule4",
            "module_name": "Bedroom",
            "dashboard_data": {"Temperature": 19.5, "CO2": 600}
        }));

        assert_eq!(m.category(), None);
        match &m.reading {
            Reading::Unclassified(raw) => assert_eq!(raw["CO2"], 600),
            other => panic!("expected unclassified reading, got {other:?}"),
        }
    }

    #[test]
    fn offline_module_has_empty_reading() {
        let m = module(json!({"_id": "02:00:00:00:00:09", "type": "NAModule1"}));
        match m.reading {
            Reading::Outdoor(r) => {
                assert_eq!(r.temperature, None);
                assert_eq!(r.time_utc, None);
            }
            other => panic!("expected outdoor reading, got {other:?}"),
        }
    }

    #[test]
    fn malformed_dashboard_is_a_parse_error() {
        let raw: RawModule = serde_json::from_value(json!({
            "_id": "02:00:00:00:00:09",
            "type": "NAModule1",
            "dashboard_data": {"Temperature": "warm"}
        }))
        .unwrap();

        let err = normalize_module(raw).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }

    #[test]
    fn device_location_is_longitude_first() {
        let station = device(json!({
            "_id": "70:ee:50:00:00:01",
            "station_name": "Home",
            "place": {"location": [4.89, 52.37], "altitude": 2},
            "dashboard_data": {"Temperature": 21.3, "CO2": 512, "Pressure": 1013.2, "pressure_trend": "up"},
            "modules": []
        }));

        assert_eq!(station.location.latitude, 52.37);
        assert_eq!(station.location.longitude, 4.89);
        assert_eq!(station.location.altitude, 2.0);
        assert_eq!(station.dashboard.co2, Some(512));
        assert_eq!(station.dashboard.pressure_trend, Some(Trend::Up));
    }

    #[test]
    fn summary_takes_first_module_of_each_category() {
        let station = device(json!({
            "_id": "70:ee:50:00:00:01",
            "dashboard_data": {"Pressure": 1009.5, "pressure_trend": "down"},
            "modules": [
                {"_id": "rain-1", "type": "NAModule3", "module_name": "Rain", "dashboard_data": {"Rain": 0.0}},
                {"_id": "out-1", "type": "NAModule1", "module_name": "Garden", "dashboard_data": {"Temperature": 7.5, "Humidity": 88}},
                {"_id": "out-2", "type": "NAModule1", "module_name": "Roof", "dashboard_data": {"Temperature": 6.0}}
            ]
        }));

        let summary = outdoor_summary(&station);

        let outdoor = summary.outdoor.as_ref().unwrap();
        assert_eq!(outdoor.module_id, "out-1");
        assert_eq!(outdoor.temperature, Some(7.5));
        assert_eq!(outdoor.pressure, Some(1009.5));
        assert_eq!(outdoor.pressure_trend, Some(Trend::Down));
        assert_eq!(summary.rain.as_ref().unwrap().module_id, "rain-1");
        assert!(summary.wind.is_none());

        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("wind").is_none());
    }

    #[test]
    fn station_without_outdoor_modules_has_empty_summary() {
        let station = device(json!({"_id": "70:ee:50:00:00:01"}));
        assert!(outdoor_summary(&station).is_empty());
        assert_eq!(station.name, "Unknown");
    }
}
