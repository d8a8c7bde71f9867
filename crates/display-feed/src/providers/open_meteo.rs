use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::PipelineError;
use crate::model::{Coordinates, DataKind, RawPayload, Units};

use super::{execute_request, parse_json_body};

const FORECAST_ENDPOINT: &str = "https://api.open-meteo.com/v1/forecast";
const AIR_QUALITY_ENDPOINT: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";
const AIR_QUALITY_MAX_FORECAST_DAYS: u8 = 7;

const WEATHER_CURRENT_FIELDS: &str = "temperature_2m,apparent_temperature,relative_humidity_2m,\
weather_code,wind_speed_10m,wind_direction_10m,precipitation,uv_index,cloud_cover,visibility";
const WEATHER_HOURLY_FIELDS: &str = "temperature_2m,apparent_temperature,weather_code,\
precipitation_probability,precipitation,snowfall,snow_depth,cloud_cover,visibility,\
wind_speed_10m,wind_direction_10m,uv_index";
const WEATHER_DAILY_FIELDS: &str = "weather_code,temperature_2m_max,temperature_2m_min,\
apparent_temperature_max,apparent_temperature_min,apparent_temperature_mean,precipitation_sum,\
snowfall_sum,precipitation_hours,precipitation_probability_mean,precipitation_probability_max,\
sunrise,sunset,uv_index_max";
const AIR_QUALITY_FIELDS: &str = "us_aqi,pm2_5,pm10,alder_pollen,birch_pollen,grass_pollen,\
mugwort_pollen,olive_pollen,ragweed_pollen";

#[derive(Debug, Serialize)]
struct ForecastQuery<'a> {
    latitude: f64,
    longitude: f64,
    current: &'a str,
    hourly: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    daily: Option<&'a str>,
    temperature_unit: &'a str,
    wind_speed_unit: &'a str,
    precipitation_unit: &'a str,
    timezone: &'a str,
    forecast_days: u8,
}

pub fn endpoint(kind: DataKind) -> &'static str {
    match kind {
        DataKind::Weather => FORECAST_ENDPOINT,
        DataKind::AirQuality => AIR_QUALITY_ENDPOINT,
    }
}

pub fn fetch(
    client: &Client,
    kind: DataKind,
    coordinates: Coordinates,
    units: Units,
    forecast_days: u8,
) -> Result<RawPayload, PipelineError> {
    let query = build_query(kind, coordinates, units, forecast_days);
    tracing::info!(
        kind = kind.as_str(),
        latitude = coordinates.latitude,
        longitude = coordinates.longitude,
        "requesting open-meteo data"
    );

    let body = execute_request(client.get(endpoint(kind)).query(&query))?;
    tracing::debug!(kind = kind.as_str(), length = body.len(), "open-meteo response received");

    Ok(RawPayload {
        kind,
        units,
        forecast_days: query.forecast_days,
        body: parse_json_body(&body, kind.as_str())?,
    })
}

fn build_query(
    kind: DataKind,
    coordinates: Coordinates,
    units: Units,
    forecast_days: u8,
) -> ForecastQuery<'static> {
    let (current, hourly, daily, forecast_days) = match kind {
        DataKind::Weather => (
            WEATHER_CURRENT_FIELDS,
            WEATHER_HOURLY_FIELDS,
            Some(WEATHER_DAILY_FIELDS),
            forecast_days,
        ),
        DataKind::AirQuality => (
            AIR_QUALITY_FIELDS,
            AIR_QUALITY_FIELDS,
            None,
            forecast_days.min(AIR_QUALITY_MAX_FORECAST_DAYS),
        ),
    };

    ForecastQuery {
        latitude: coordinates.latitude,
        longitude: coordinates.longitude,
        current,
        hourly,
        daily,
        temperature_unit: units.temperature_unit.as_str(),
        wind_speed_unit: units.wind_speed_unit.as_str(),
        precipitation_unit: units.precipitation_unit.as_str(),
        timezone: "auto",
        forecast_days,
    }
}
