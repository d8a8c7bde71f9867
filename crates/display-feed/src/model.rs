use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::weather_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    Weather,
    AirQuality,
}

impl DataKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weather => "weather",
            Self::AirQuality => "air_quality",
        }
    }
}

/// Configured place descriptor. Postal code wins over city when both are set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationQuery {
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub country: String,
}

impl LocationQuery {
    pub fn postal_code(code: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            postal_code: Some(code.into()),
            city: None,
            country: country.into(),
        }
    }

    pub fn city(city: impl Into<String>, country: impl Into<String>) -> Self {
        Self {
            postal_code: None,
            city: Some(city.into()),
            country: country.into(),
        }
    }

    pub fn locality(&self) -> Option<&str> {
        non_blank(self.postal_code.as_deref()).or_else(|| non_blank(self.city.as_deref()))
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationResult {
    pub lat: f64,
    pub lon: f64,
    pub display_name: String,
}

impl LocationResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            latitude: self.lat,
            longitude: self.lon,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureUnit {
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Celsius => "celsius",
            Self::Fahrenheit => "fahrenheit",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "celsius" | "c" => Some(Self::Celsius),
            "fahrenheit" | "f" => Some(Self::Fahrenheit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindSpeedUnit {
    Kmh,
    Ms,
    Mph,
    Kn,
}

impl WindSpeedUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Kmh => "kmh",
            Self::Ms => "ms",
            Self::Mph => "mph",
            Self::Kn => "kn",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kmh" => Some(Self::Kmh),
            "ms" => Some(Self::Ms),
            "mph" => Some(Self::Mph),
            "kn" => Some(Self::Kn),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecipitationUnit {
    Mm,
    Inch,
}

impl PrecipitationUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mm => "mm",
            Self::Inch => "inch",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "mm" => Some(Self::Mm),
            "inch" | "in" => Some(Self::Inch),
            _ => None,
        }
    }
}

/// Unit selection sent with every provider request and echoed in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub temperature_unit: TemperatureUnit,
    pub wind_speed_unit: WindSpeedUnit,
    pub precipitation_unit: PrecipitationUnit,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            temperature_unit: TemperatureUnit::Fahrenheit,
            wind_speed_unit: WindSpeedUnit::Mph,
            precipitation_unit: PrecipitationUnit::Inch,
        }
    }
}

/// Provider response as fetched, plus the request parameters that shaped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPayload {
    pub kind: DataKind,
    pub units: Units,
    pub forecast_days: u8,
    pub body: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub code: Option<i32>,
    pub label: String,
    pub icon: String,
}

impl Default for Condition {
    fn default() -> Self {
        weather_code::condition(None)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindDirection {
    pub degrees: f64,
    pub compass: String,
}

impl WindDirection {
    pub fn from_degrees(degrees: f64) -> Self {
        Self {
            degrees,
            compass: weather_code::compass(degrees).to_string(),
        }
    }
}

impl Default for WindDirection {
    fn default() -> Self {
        Self::from_degrees(0.0)
    }
}

pub const DEFAULT_POLLEN_TREE: f64 = 2.0;
pub const DEFAULT_POLLEN_GRASS: f64 = 5.0;
pub const DEFAULT_POLLEN_RAGWEED: f64 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollenLevels {
    pub tree: f64,
    pub grass: f64,
    pub ragweed: f64,
    /// Set when the fixed low-confidence levels replaced missing provider data.
    pub estimated: bool,
}

impl PollenLevels {
    pub fn estimated() -> Self {
        Self {
            tree: DEFAULT_POLLEN_TREE,
            grass: DEFAULT_POLLEN_GRASS,
            ragweed: DEFAULT_POLLEN_RAGWEED,
            estimated: true,
        }
    }
}

impl Default for PollenLevels {
    fn default() -> Self {
        Self::estimated()
    }
}

/// One instant of the feed. `F` carries the fields that differ between the
/// current, hourly and daily variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationPoint<F> {
    pub timestamp: NaiveDateTime,
    pub date: String,
    pub time: String,
    pub weekday: String,
    #[serde(flatten)]
    pub fields: F,
}

impl<F> ObservationPoint<F> {
    pub fn at(timestamp: NaiveDateTime, fields: F) -> Self {
        Self {
            timestamp,
            date: timestamp.format("%Y-%m-%d").to_string(),
            time: timestamp.format("%H:%M").to_string(),
            weekday: timestamp.format("%A").to_string(),
            fields,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrentFields {
    pub temperature: f64,
    pub apparent_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub condition: Condition,
    pub wind_speed: f64,
    pub wind_direction: WindDirection,
    pub precipitation: f64,
    pub uv_index: f64,
    pub cloud_cover: Option<f64>,
    pub visibility: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub us_aqi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm2_5: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
    pub pollen: PollenLevels,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HourlyFields {
    pub temperature: f64,
    pub apparent_temperature: Option<f64>,
    pub condition: Condition,
    pub wind_speed: f64,
    pub wind_direction: Option<WindDirection>,
    pub precipitation_probability: f64,
    pub precipitation: f64,
    pub snowfall: Option<f64>,
    pub snow_depth: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub visibility: Option<f64>,
    pub uv_index: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm2_5: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm10: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollen: Option<PollenLevels>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DailyFields {
    pub temperature_max: Option<f64>,
    pub temperature_min: Option<f64>,
    pub apparent_temperature_max: Option<f64>,
    pub apparent_temperature_min: Option<f64>,
    pub apparent_temperature_mean: Option<f64>,
    pub precipitation_sum: Option<f64>,
    pub snowfall_sum: Option<f64>,
    pub precipitation_hours: Option<f64>,
    pub precipitation_probability_mean: Option<f64>,
    pub precipitation_probability_max: Option<f64>,
    pub condition: Condition,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub uv_index_max: Option<f64>,
}

pub type CurrentPoint = ObservationPoint<CurrentFields>;
pub type HourlyPoint = ObservationPoint<HourlyFields>;
pub type DailyPoint = ObservationPoint<DailyFields>;

/// The normalized artifact handed to the rendering stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSet {
    pub timestamp_generated: DateTime<Utc>,
    pub location_name: String,
    pub coordinates: Coordinates,
    pub timezone: String,
    pub units: Units,
    pub current: CurrentPoint,
    pub hourly: Vec<HourlyPoint>,
    pub daily: Vec<DailyPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Live,
    CacheFresh,
    CacheStale,
    Unavailable,
}

impl FetchStatus {
    pub const ALL: [Self; 4] = [
        Self::Live,
        Self::CacheFresh,
        Self::CacheStale,
        Self::Unavailable,
    ];

    /// Same name the status serializes to.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::CacheFresh => "cache_fresh",
            Self::CacheStale => "cache_stale",
            Self::Unavailable => "unavailable",
        }
    }

    pub fn is_degraded(self) -> bool {
        matches!(self, Self::CacheStale | Self::Unavailable)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub observations: ObservationSet,
    pub degraded: bool,
    pub weather: FetchStatus,
    pub air_quality: FetchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}
