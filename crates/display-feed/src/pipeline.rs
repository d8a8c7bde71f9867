//! One refresh cycle: resolve the location, fetch both data kinds, normalize
//! and merge. Recoverable failures degrade to stale cache or demo data;
//! only configuration problems and unknown locations fail the run.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};

use crate::cache::{CacheEntry, CacheKind, CacheStore, age_secs, is_fresh};
use crate::config::RuntimeConfig;
use crate::error::PipelineError;
use crate::location;
use crate::model::{
    Coordinates, CurrentFields, DataKind, FetchStatus, LocationResult, ObservationPoint,
    ObservationSet, PipelineOutput, PollenLevels, RawPayload, Units, WindDirection,
};
use crate::normalize::{merge, normalize_anchored};
use crate::providers::{ProviderApi, execute_with_retry};
use crate::weather_code;

const FORECAST_PROVIDER_NAME: &str = "open_meteo";

pub const FALLBACK_LOCATION_NAME: &str = "Denver, CO";
pub const FALLBACK_COORDINATES: Coordinates = Coordinates {
    latitude: 39.7392,
    longitude: -104.9903,
};
pub const FALLBACK_TEMPERATURE: f64 = 72.0;
pub const FALLBACK_WEATHER_CODE: i32 = 2;
pub const FALLBACK_WIND_SPEED: f64 = 12.0;
pub const FALLBACK_WIND_DEGREES: f64 = 225.0;
pub const FALLBACK_UV_INDEX: f64 = 6.0;
pub const FALLBACK_US_AQI: f64 = 25.0;

/// A payload ready for normalization. Live payloads are only written to the
/// cache once they normalize; `stale` keeps the entry they would replace.
#[derive(Debug)]
struct Fetched {
    kind: DataKind,
    key: String,
    payload: RawPayload,
    status: FetchStatus,
    stale: Option<RawPayload>,
}

#[derive(Debug)]
enum State {
    ResolveLocation,
    Fetch(LocationResult),
    Normalize {
        location: LocationResult,
        weather: Fetched,
        air_quality: Option<Fetched>,
    },
    Done(PipelineOutput),
    Fallback(String),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            Self::ResolveLocation => "resolve_location",
            Self::Fetch(_) => "fetch",
            Self::Normalize { .. } => "normalize",
            Self::Done(_) => "done",
            Self::Fallback(_) => "fallback",
        }
    }
}

pub fn run<P, C, N>(
    config: &RuntimeConfig,
    providers: &P,
    cache: &C,
    now_fn: N,
) -> Result<PipelineOutput, PipelineError>
where
    P: ProviderApi,
    C: CacheStore,
    N: Fn() -> DateTime<Utc>,
{
    run_with_sleep(config, providers, cache, now_fn, std::thread::sleep)
}

/// [`run`] with an injectable retry sleeper.
pub fn run_with_sleep<P, C, N, S>(
    config: &RuntimeConfig,
    providers: &P,
    cache: &C,
    now_fn: N,
    mut sleep_fn: S,
) -> Result<PipelineOutput, PipelineError>
where
    P: ProviderApi,
    C: CacheStore,
    N: Fn() -> DateTime<Utc>,
    S: FnMut(Duration),
{
    let now = now_fn();
    let mut state = State::ResolveLocation;

    loop {
        tracing::debug!(state = state.name(), "pipeline state");
        state = match state {
            State::ResolveLocation => match location::resolve(
                providers,
                cache,
                &config.location,
                now,
                config.retry_policy,
                &mut sleep_fn,
            ) {
                Ok(location) => {
                    tracing::info!(location = location.display_name.as_str(), "location resolved");
                    State::Fetch(location)
                }
                Err(error) if error.is_recoverable() => {
                    State::Fallback(format!("location lookup failed: {error}"))
                }
                Err(error) => return Err(error),
            },
            State::Fetch(location) => {
                let coordinates = location.coordinates();
                match fetch_kind(
                    DataKind::Weather,
                    coordinates,
                    config,
                    providers,
                    cache,
                    now,
                    &mut sleep_fn,
                ) {
                    Ok(weather) => {
                        let air_quality = fetch_kind(
                            DataKind::AirQuality,
                            coordinates,
                            config,
                            providers,
                            cache,
                            now,
                            &mut sleep_fn,
                        )
                        .map_err(|error| {
                            tracing::warn!(%error, "air quality unavailable; continuing without it");
                        })
                        .ok();

                        State::Normalize {
                            location,
                            weather,
                            air_quality,
                        }
                    }
                    Err(error) => State::Fallback(format!("weather unavailable: {error}")),
                }
            }
            State::Normalize {
                location,
                weather,
                air_quality,
            } => match build_output(
                config,
                cache,
                &location,
                &weather,
                air_quality.as_ref(),
                now,
            ) {
                Ok(output) => State::Done(output),
                Err(error) => State::Fallback(format!("normalization failed: {error}")),
            },
            State::Done(output) => {
                tracing::info!(
                    weather = ?output.weather,
                    air_quality = ?output.air_quality,
                    degraded = output.degraded,
                    "pipeline done"
                );
                return Ok(output);
            }
            State::Fallback(reason) => {
                tracing::warn!(reason = reason.as_str(), "serving fallback observations");
                return Ok(PipelineOutput {
                    observations: fallback_observations(now),
                    degraded: true,
                    weather: FetchStatus::Unavailable,
                    air_quality: FetchStatus::Unavailable,
                    fallback_reason: Some(reason),
                });
            }
        };
    }
}

/// Cache key for forecast payloads. A new location, unit selection or
/// forecast length is a different key and therefore a miss.
pub fn payload_cache_key(coordinates: Coordinates, units: Units, forecast_days: u8) -> String {
    format!(
        "{:.4},{:.4}|{},{},{}|{}d",
        coordinates.latitude,
        coordinates.longitude,
        units.temperature_unit.as_str(),
        units.wind_speed_unit.as_str(),
        units.precipitation_unit.as_str(),
        forecast_days
    )
}

fn ttl_for(kind: DataKind, config: &RuntimeConfig) -> u64 {
    match kind {
        DataKind::Weather => config.weather_ttl_secs,
        DataKind::AirQuality => config.air_quality_ttl_secs,
    }
}

fn fetch_kind<P, C, S>(
    kind: DataKind,
    coordinates: Coordinates,
    config: &RuntimeConfig,
    providers: &P,
    cache: &C,
    now: DateTime<Utc>,
    sleep_fn: &mut S,
) -> Result<Fetched, PipelineError>
where
    P: ProviderApi,
    C: CacheStore,
    S: FnMut(Duration),
{
    let key = payload_cache_key(coordinates, config.units, config.forecast_days);
    let cache_kind = CacheKind::from(kind);
    let ttl_secs = ttl_for(kind, config);

    let cached = cache.get(cache_kind, &key).and_then(|entry| {
        entry
            .decode::<RawPayload>()
            .map(|payload| (payload, entry.stored_at))
            .map_err(|error| {
                tracing::warn!(kind = kind.as_str(), %error, "ignoring undecodable cache entry");
            })
            .ok()
    });

    if let Some((payload, stored_at)) = &cached
        && is_fresh(*stored_at, now, ttl_secs)
    {
        tracing::debug!(
            kind = kind.as_str(),
            age_secs = age_secs(*stored_at, now),
            "cache fresh"
        );
        return Ok(Fetched {
            kind,
            key,
            payload: payload.clone(),
            status: FetchStatus::CacheFresh,
            stale: None,
        });
    }

    let result = execute_with_retry(
        FORECAST_PROVIDER_NAME,
        config.retry_policy,
        || providers.fetch(kind, coordinates, config.units, config.forecast_days),
        &mut *sleep_fn,
    );

    match result {
        Ok(payload) => Ok(Fetched {
            kind,
            key,
            payload,
            status: FetchStatus::Live,
            stale: cached.map(|(payload, _)| payload),
        }),
        Err(error) => match cached {
            Some((payload, stored_at)) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    age_secs = age_secs(stored_at, now),
                    %error,
                    "fetch failed; reusing stale cache"
                );
                Ok(Fetched {
                    kind,
                    key,
                    payload,
                    status: FetchStatus::CacheStale,
                    stale: None,
                })
            }
            None => Err(error),
        },
    }
}

fn store_payload<C: CacheStore>(
    cache: &C,
    kind: CacheKind,
    key: &str,
    payload: &RawPayload,
    now: DateTime<Utc>,
) {
    let stored = CacheEntry::encode(key, payload, now)
        .map_err(|error| error.to_string())
        .and_then(|entry| cache.put(kind, &entry).map_err(|error| error.to_string()));

    if let Err(error) = stored {
        tracing::warn!(kind = kind.as_str(), error = error.as_str(), "cache not updated");
    }
}

/// Normalize a fetched payload and persist it when it came from the
/// network. A live payload that does not normalize is never cached; the
/// entry it would have replaced is served as stale instead.
fn normalize_fetched<C: CacheStore>(
    cache: &C,
    fetched: &Fetched,
    location: &LocationResult,
    config: &RuntimeConfig,
    now: DateTime<Utc>,
    anchor: Option<NaiveDateTime>,
) -> Result<(ObservationSet, FetchStatus), PipelineError> {
    let kind = fetched.kind;
    let normalized = normalize_anchored(
        kind,
        &fetched.payload,
        location,
        now,
        config.window,
        anchor,
    );

    match normalized {
        Ok(set) => {
            if fetched.status == FetchStatus::Live {
                store_payload(cache, CacheKind::from(kind), &fetched.key, &fetched.payload, now);
            }
            Ok((set, fetched.status))
        }
        Err(error) => match &fetched.stale {
            Some(stale) => {
                tracing::warn!(
                    kind = kind.as_str(),
                    %error,
                    "live payload unusable; reusing stale cache"
                );
                normalize_anchored(kind, stale, location, now, config.window, anchor)
                    .map(|set| (set, FetchStatus::CacheStale))
                    .map_err(|_| error)
            }
            None => Err(error),
        },
    }
}

fn build_output<C: CacheStore>(
    config: &RuntimeConfig,
    cache: &C,
    location: &LocationResult,
    weather: &Fetched,
    air_quality: Option<&Fetched>,
    now: DateTime<Utc>,
) -> Result<PipelineOutput, PipelineError> {
    let (weather_set, weather_status) =
        normalize_fetched(cache, weather, location, config, now, None)?;

    let anchor = Some(weather_set.current.timestamp);
    let air_set = air_quality.and_then(|fetched| {
        normalize_fetched(cache, fetched, location, config, now, anchor)
            .map_err(|error| {
                tracing::warn!(%error, "air quality payload unusable; continuing without it");
            })
            .ok()
    });

    let (observations, air_status) = match air_set {
        Some((air, status)) => (merge(weather_set, &air), status),
        None => (weather_set, FetchStatus::Unavailable),
    };

    Ok(PipelineOutput {
        observations,
        degraded: weather_status.is_degraded() || air_status.is_degraded(),
        weather: weather_status,
        air_quality: air_status,
        fallback_reason: None,
    })
}

/// Fixed demo data so the panel always has something to render. Values are
/// in the default units.
pub fn fallback_observations(now: DateTime<Utc>) -> ObservationSet {
    let timestamp = now.naive_utc();
    let timestamp = timestamp
        .with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(timestamp);

    ObservationSet {
        timestamp_generated: now,
        location_name: FALLBACK_LOCATION_NAME.to_string(),
        coordinates: FALLBACK_COORDINATES,
        timezone: "UTC".to_string(),
        units: Units::default(),
        current: ObservationPoint::at(
            timestamp,
            CurrentFields {
                temperature: FALLBACK_TEMPERATURE,
                condition: weather_code::condition(Some(FALLBACK_WEATHER_CODE)),
                wind_speed: FALLBACK_WIND_SPEED,
                wind_direction: WindDirection::from_degrees(FALLBACK_WIND_DEGREES),
                uv_index: FALLBACK_UV_INDEX,
                us_aqi: Some(FALLBACK_US_AQI),
                pollen: PollenLevels::estimated(),
                ..CurrentFields::default()
            },
        ),
        hourly: Vec::new(),
        daily: Vec::new(),
    }
}
