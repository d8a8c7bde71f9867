//! Fakes shared by the unit tests.

use std::cell::Cell;

use serde_json::{Value, json};

use crate::error::PipelineError;
use crate::model::{Coordinates, DataKind, LocationQuery, LocationResult, RawPayload, Units};
use crate::providers::ProviderApi;

pub fn denver() -> LocationResult {
    LocationResult {
        lat: 39.7335,
        lon: -104.9906,
        display_name: "Denver, Colorado, United States".to_string(),
    }
}

pub fn weather_body() -> Value {
    json!({
        "timezone": "America/Denver",
        "utc_offset_seconds": -25200,
        "current": {
            "time": "2024-01-01T12:00",
            "temperature_2m": 41.3,
            "weather_code": 3,
            "wind_speed_10m": 9.0,
            "wind_direction_10m": 180
        },
        "hourly": {
            "time": ["2024-01-01T13:00", "2024-01-01T14:00"],
            "temperature_2m": [43.0, 44.0]
        },
        "daily": {
            "time": ["2024-01-01"],
            "temperature_2m_max": [45.0],
            "temperature_2m_min": [25.0]
        }
    })
}

pub fn air_quality_body() -> Value {
    json!({
        "timezone": "America/Denver",
        "current": {
            "time": "2024-01-01T12:00",
            "us_aqi": 38,
            "pm2_5": 6.0,
            "pm10": 9.0,
            "grass_pollen": 4.0
        },
        "hourly": {
            "time": ["2024-01-01T13:00"],
            "pm2_5": [7.0]
        }
    })
}

pub fn raw_payload(kind: DataKind, body: Value) -> RawPayload {
    RawPayload {
        kind,
        units: Units::default(),
        forecast_days: 3,
        body,
    }
}

pub struct FakeProviders {
    search_result: Result<Vec<LocationResult>, PipelineError>,
    weather_result: Result<Value, PipelineError>,
    air_quality_result: Result<Value, PipelineError>,
    pub search_calls: Cell<usize>,
    pub weather_calls: Cell<usize>,
    pub air_quality_calls: Cell<usize>,
}

impl FakeProviders {
    pub fn new() -> Self {
        Self {
            search_result: Ok(vec![denver()]),
            weather_result: Ok(weather_body()),
            air_quality_result: Ok(air_quality_body()),
            search_calls: Cell::new(0),
            weather_calls: Cell::new(0),
            air_quality_calls: Cell::new(0),
        }
    }

    pub fn with_search(mut self, result: Result<Vec<LocationResult>, PipelineError>) -> Self {
        self.search_result = result;
        self
    }

    pub fn with_weather(mut self, result: Result<Value, PipelineError>) -> Self {
        self.weather_result = result;
        self
    }

    pub fn with_air_quality(mut self, result: Result<Value, PipelineError>) -> Self {
        self.air_quality_result = result;
        self
    }

    pub fn network_calls(&self) -> usize {
        self.search_calls.get() + self.weather_calls.get() + self.air_quality_calls.get()
    }
}

impl ProviderApi for FakeProviders {
    fn search_location(
        &self,
        _query: &LocationQuery,
    ) -> Result<Vec<LocationResult>, PipelineError> {
        self.search_calls.set(self.search_calls.get() + 1);
        self.search_result.clone()
    }

    fn fetch(
        &self,
        kind: DataKind,
        _coordinates: Coordinates,
        units: Units,
        forecast_days: u8,
    ) -> Result<RawPayload, PipelineError> {
        let result = match kind {
            DataKind::Weather => {
                self.weather_calls.set(self.weather_calls.get() + 1);
                self.weather_result.clone()
            }
            DataKind::AirQuality => {
                self.air_quality_calls.set(self.air_quality_calls.get() + 1);
                self.air_quality_result.clone()
            }
        };

        result.map(|body| RawPayload {
            kind,
            units,
            forecast_days,
            body,
        })
    }
}
