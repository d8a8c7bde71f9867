//! Open-Meteo payloads to [`ObservationSet`].
//!
//! Each response block is read through an explicit optional-field schema;
//! absent fields resolve to the neutral defaults documented on the model
//! types. Weather and air quality share the timestamp and window logic and
//! are joined afterwards with [`merge`].

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde::Deserialize;

use crate::config::ForecastWindow;
use crate::error::PipelineError;
use crate::model::{
    CurrentFields, DailyFields, DailyPoint, DataKind, HourlyFields, HourlyPoint,
    LocationResult, ObservationPoint, ObservationSet, PollenLevels, RawPayload, WindDirection,
};
use crate::weather_code;

const LOCAL_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];
const DEFAULT_TIMEZONE: &str = "UTC";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ForecastBody {
    timezone: Option<String>,
    utc_offset_seconds: Option<i64>,
    current: Option<CurrentBlock>,
    hourly: Option<HourlyBlock>,
    daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CurrentBlock {
    time: Option<String>,
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    relative_humidity_2m: Option<f64>,
    weather_code: Option<f64>,
    wind_speed_10m: Option<f64>,
    wind_direction_10m: Option<f64>,
    precipitation: Option<f64>,
    uv_index: Option<f64>,
    cloud_cover: Option<f64>,
    visibility: Option<f64>,
    us_aqi: Option<f64>,
    pm2_5: Option<f64>,
    pm10: Option<f64>,
    #[serde(flatten)]
    pollen: PollenSample,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PollenSample {
    alder_pollen: Option<f64>,
    birch_pollen: Option<f64>,
    olive_pollen: Option<f64>,
    grass_pollen: Option<f64>,
    ragweed_pollen: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    apparent_temperature: Vec<Option<f64>>,
    weather_code: Vec<Option<f64>>,
    precipitation_probability: Vec<Option<f64>>,
    precipitation: Vec<Option<f64>>,
    snowfall: Vec<Option<f64>>,
    snow_depth: Vec<Option<f64>>,
    cloud_cover: Vec<Option<f64>>,
    visibility: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
    wind_direction_10m: Vec<Option<f64>>,
    uv_index: Vec<Option<f64>>,
    pm2_5: Vec<Option<f64>>,
    pm10: Vec<Option<f64>>,
    alder_pollen: Vec<Option<f64>>,
    birch_pollen: Vec<Option<f64>>,
    olive_pollen: Vec<Option<f64>>,
    grass_pollen: Vec<Option<f64>>,
    ragweed_pollen: Vec<Option<f64>>,
}

impl HourlyBlock {
    fn pollen_at(&self, index: usize) -> PollenSample {
        PollenSample {
            alder_pollen: value_at(&self.alder_pollen, index),
            birch_pollen: value_at(&self.birch_pollen, index),
            olive_pollen: value_at(&self.olive_pollen, index),
            grass_pollen: value_at(&self.grass_pollen, index),
            ragweed_pollen: value_at(&self.ragweed_pollen, index),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DailyBlock {
    time: Vec<String>,
    weather_code: Vec<Option<f64>>,
    temperature_2m_max: Vec<Option<f64>>,
    temperature_2m_min: Vec<Option<f64>>,
    apparent_temperature_max: Vec<Option<f64>>,
    apparent_temperature_min: Vec<Option<f64>>,
    apparent_temperature_mean: Vec<Option<f64>>,
    precipitation_sum: Vec<Option<f64>>,
    snowfall_sum: Vec<Option<f64>>,
    precipitation_hours: Vec<Option<f64>>,
    precipitation_probability_mean: Vec<Option<f64>>,
    precipitation_probability_max: Vec<Option<f64>>,
    sunrise: Vec<Option<String>>,
    sunset: Vec<Option<String>>,
    uv_index_max: Vec<Option<f64>>,
}

/// Normalize one provider payload. `kind` must match the payload's kind.
///
/// Weather payloads fill the current, hourly and daily weather fields and
/// leave pollen at the estimated default. Air-quality payloads fill AQI,
/// particulates and pollen only; join them with [`merge`].
pub fn normalize(
    kind: DataKind,
    raw: &RawPayload,
    location: &LocationResult,
    now: DateTime<Utc>,
    window: ForecastWindow,
) -> Result<ObservationSet, PipelineError> {
    normalize_anchored(kind, raw, location, now, window, None)
}

/// [`normalize`] with the hourly window measured from `anchor` instead of
/// the payload's own current time. Air quality reports `current` on whole
/// hours while weather uses 15-minute steps, so an air-quality set meant for
/// [`merge`] must be anchored on the weather set's current timestamp.
pub fn normalize_anchored(
    kind: DataKind,
    raw: &RawPayload,
    location: &LocationResult,
    now: DateTime<Utc>,
    window: ForecastWindow,
    anchor: Option<NaiveDateTime>,
) -> Result<ObservationSet, PipelineError> {
    if raw.kind != kind {
        return Err(PipelineError::parse(format!(
            "expected {} payload, got {}",
            kind.as_str(),
            raw.kind.as_str()
        )));
    }

    if !raw.body.is_object() {
        return Err(PipelineError::parse(format!(
            "{} payload: expected a JSON object",
            kind.as_str()
        )));
    }

    let body = ForecastBody::deserialize(&raw.body)
        .map_err(|error| PipelineError::parse(format!("{} payload: {error}", kind.as_str())))?;

    if kind == DataKind::Weather && body.current.is_none() {
        return Err(PipelineError::parse("weather payload: missing current block"));
    }

    let current_block = body.current.unwrap_or_default();
    let current_timestamp = current_timestamp(&current_block, body.utc_offset_seconds, now)?;
    let hourly_block = body.hourly.unwrap_or_default();
    let window_start = anchor.unwrap_or(current_timestamp);

    let (current, hourly, daily) = match kind {
        DataKind::Weather => (
            weather_current(&current_block),
            upcoming_hours(&hourly_block, window_start, window, weather_hourly),
            body.daily.as_ref().map(daily_points).unwrap_or_default(),
        ),
        DataKind::AirQuality => (
            air_quality_current(&current_block, &hourly_block, current_timestamp),
            upcoming_hours(&hourly_block, window_start, window, air_quality_hourly),
            Vec::new(),
        ),
    };

    Ok(ObservationSet {
        timestamp_generated: now,
        location_name: location.display_name.clone(),
        coordinates: location.coordinates(),
        timezone: body
            .timezone
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
        units: raw.units,
        current: ObservationPoint::at(current_timestamp, current),
        hourly,
        daily,
    })
}

/// Field union of a weather set and an air-quality set for the same place.
///
/// Weather keeps location, timezone, units, current and daily. Air quality
/// contributes AQI, particulates and pollen; hourly values are joined on
/// identical timestamps and left empty where air quality has no point.
pub fn merge(mut weather: ObservationSet, air: &ObservationSet) -> ObservationSet {
    let current = &mut weather.current.fields;
    current.us_aqi = air.current.fields.us_aqi;
    current.pm2_5 = air.current.fields.pm2_5;
    current.pm10 = air.current.fields.pm10;
    current.pollen = air.current.fields.pollen.clone();

    let by_timestamp: HashMap<NaiveDateTime, &HourlyFields> = air
        .hourly
        .iter()
        .map(|point| (point.timestamp, &point.fields))
        .collect();

    for point in &mut weather.hourly {
        if let Some(fields) = by_timestamp.get(&point.timestamp) {
            point.fields.pm2_5 = fields.pm2_5;
            point.fields.pm10 = fields.pm10;
            point.fields.pollen = fields.pollen.clone();
        }
    }

    weather
}

pub fn parse_local_time(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

/// True when `timestamp` lies past the grace window and starts a later
/// clock hour than `current`.
pub fn is_upcoming(timestamp: NaiveDateTime, current: NaiveDateTime, grace_minutes: i64) -> bool {
    timestamp > current + Duration::minutes(grace_minutes)
        && hour_slot(timestamp) > hour_slot(current)
}

fn hour_slot(timestamp: NaiveDateTime) -> (NaiveDate, u32) {
    (timestamp.date(), timestamp.hour())
}

fn current_timestamp(
    block: &CurrentBlock,
    utc_offset_seconds: Option<i64>,
    now: DateTime<Utc>,
) -> Result<NaiveDateTime, PipelineError> {
    if let Some(raw) = block.time.as_deref() {
        return parse_local_time(raw)
            .ok_or_else(|| PipelineError::parse(format!("invalid current time '{raw}'")));
    }

    let local = now.naive_utc() + Duration::seconds(utc_offset_seconds.unwrap_or(0));
    Ok(local
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(local))
}

fn upcoming_hours<F>(
    block: &HourlyBlock,
    current: NaiveDateTime,
    window: ForecastWindow,
    fields_at: F,
) -> Vec<HourlyPoint>
where
    F: Fn(&HourlyBlock, usize) -> HourlyFields,
{
    let mut points = Vec::new();

    for (index, raw) in block.time.iter().enumerate() {
        if points.len() >= window.max_hourly_points {
            break;
        }

        let Some(timestamp) = parse_local_time(raw) else {
            tracing::warn!(time = raw.as_str(), index, "skipping unparseable hourly timestamp");
            continue;
        };

        if is_upcoming(timestamp, current, window.grace_minutes) {
            points.push(ObservationPoint::at(timestamp, fields_at(block, index)));
        } else {
            tracing::debug!(time = raw.as_str(), "skipping hourly point inside grace window");
        }
    }

    points
}

fn weather_current(block: &CurrentBlock) -> CurrentFields {
    CurrentFields {
        temperature: block.temperature_2m.unwrap_or(0.0),
        apparent_temperature: block.apparent_temperature,
        humidity: block.relative_humidity_2m,
        condition: weather_code::condition(code(block.weather_code)),
        wind_speed: block.wind_speed_10m.unwrap_or(0.0),
        wind_direction: WindDirection::from_degrees(block.wind_direction_10m.unwrap_or(0.0)),
        precipitation: block.precipitation.unwrap_or(0.0),
        uv_index: block.uv_index.unwrap_or(0.0),
        cloud_cover: block.cloud_cover,
        visibility: block.visibility,
        ..CurrentFields::default()
    }
}

fn air_quality_current(
    block: &CurrentBlock,
    hourly: &HourlyBlock,
    current: NaiveDateTime,
) -> CurrentFields {
    let pollen = pollen_levels(&block.pollen)
        .or_else(|| {
            hourly
                .time
                .iter()
                .position(|raw| parse_local_time(raw) == Some(current))
                .and_then(|index| pollen_levels(&hourly.pollen_at(index)))
        })
        .unwrap_or_else(|| {
            tracing::debug!("no pollen series in air-quality payload; using estimate");
            PollenLevels::estimated()
        });

    CurrentFields {
        us_aqi: block.us_aqi,
        pm2_5: block.pm2_5,
        pm10: block.pm10,
        pollen,
        ..CurrentFields::default()
    }
}

fn weather_hourly(block: &HourlyBlock, index: usize) -> HourlyFields {
    HourlyFields {
        temperature: value_at(&block.temperature_2m, index).unwrap_or(0.0),
        apparent_temperature: value_at(&block.apparent_temperature, index),
        condition: weather_code::condition(code(value_at(&block.weather_code, index))),
        wind_speed: value_at(&block.wind_speed_10m, index).unwrap_or(0.0),
        wind_direction: value_at(&block.wind_direction_10m, index).map(WindDirection::from_degrees),
        precipitation_probability: value_at(&block.precipitation_probability, index)
            .unwrap_or(0.0),
        precipitation: value_at(&block.precipitation, index).unwrap_or(0.0),
        snowfall: value_at(&block.snowfall, index),
        snow_depth: value_at(&block.snow_depth, index),
        cloud_cover: value_at(&block.cloud_cover, index),
        visibility: value_at(&block.visibility, index),
        uv_index: value_at(&block.uv_index, index),
        ..HourlyFields::default()
    }
}

fn air_quality_hourly(block: &HourlyBlock, index: usize) -> HourlyFields {
    HourlyFields {
        pm2_5: value_at(&block.pm2_5, index),
        pm10: value_at(&block.pm10, index),
        pollen: pollen_levels(&block.pollen_at(index)),
        ..HourlyFields::default()
    }
}

fn daily_points(block: &DailyBlock) -> Vec<DailyPoint> {
    block
        .time
        .iter()
        .enumerate()
        .filter_map(|(index, raw)| {
            let Ok(date) = NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d") else {
                tracing::warn!(date = raw.as_str(), index, "skipping unparseable daily date");
                return None;
            };

            let fields = DailyFields {
                temperature_max: value_at(&block.temperature_2m_max, index),
                temperature_min: value_at(&block.temperature_2m_min, index),
                apparent_temperature_max: value_at(&block.apparent_temperature_max, index),
                apparent_temperature_min: value_at(&block.apparent_temperature_min, index),
                apparent_temperature_mean: value_at(&block.apparent_temperature_mean, index),
                precipitation_sum: value_at(&block.precipitation_sum, index),
                snowfall_sum: value_at(&block.snowfall_sum, index),
                precipitation_hours: value_at(&block.precipitation_hours, index),
                precipitation_probability_mean: value_at(
                    &block.precipitation_probability_mean,
                    index,
                ),
                precipitation_probability_max: value_at(
                    &block.precipitation_probability_max,
                    index,
                ),
                condition: weather_code::condition(code(value_at(&block.weather_code, index))),
                sunrise: block.sunrise.get(index).cloned().flatten(),
                sunset: block.sunset.get(index).cloned().flatten(),
                uv_index_max: value_at(&block.uv_index_max, index),
            };

            Some(ObservationPoint::at(date.and_time(NaiveTime::MIN), fields))
        })
        .collect()
}

/// Levels from one sample, or `None` when the sample carries no pollen at
/// all. Missing species inside a present sample count as 0.
fn pollen_levels(sample: &PollenSample) -> Option<PollenLevels> {
    let species = [
        sample.alder_pollen,
        sample.birch_pollen,
        sample.olive_pollen,
        sample.grass_pollen,
        sample.ragweed_pollen,
    ];
    if species.iter().all(Option::is_none) {
        return None;
    }

    let tree = [sample.alder_pollen, sample.birch_pollen, sample.olive_pollen]
        .into_iter()
        .flatten()
        .fold(0.0_f64, f64::max);

    Some(PollenLevels {
        tree,
        grass: sample.grass_pollen.unwrap_or(0.0),
        ragweed: sample.ragweed_pollen.unwrap_or(0.0),
        estimated: false,
    })
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

fn code(value: Option<f64>) -> Option<i32> {
    value.filter(|value| value.is_finite()).map(|value| value as i32)
}
