use std::collections::HashMap;
use std::path::PathBuf;

use crate::model::{LocationQuery, PrecipitationUnit, TemperatureUnit, Units, WindSpeedUnit};

pub const WEATHER_CACHE_TTL_SECS: u64 = 15 * 60;
pub const AIR_QUALITY_CACHE_TTL_SECS: u64 = 30 * 60;
pub const HOURLY_GRACE_MINUTES: i64 = 25;
pub const MAX_HOURLY_POINTS: usize = 4;
pub const FORECAST_DAYS: u8 = 3;
pub const DEFAULT_COUNTRY: &str = "US";

pub const DISPLAY_CACHE_DIR_ENV: &str = "DISPLAY_CACHE_DIR";
pub const DISPLAY_POSTAL_CODE_ENV: &str = "DISPLAY_POSTAL_CODE";
pub const DISPLAY_CITY_ENV: &str = "DISPLAY_CITY";
pub const DISPLAY_COUNTRY_ENV: &str = "DISPLAY_COUNTRY";
pub const DISPLAY_WEATHER_TTL_SECS_ENV: &str = "DISPLAY_WEATHER_TTL_SECS";
pub const DISPLAY_AIR_QUALITY_TTL_SECS_ENV: &str = "DISPLAY_AIR_QUALITY_TTL_SECS";
pub const DISPLAY_TEMPERATURE_UNIT_ENV: &str = "DISPLAY_TEMPERATURE_UNIT";
pub const DISPLAY_WIND_SPEED_UNIT_ENV: &str = "DISPLAY_WIND_SPEED_UNIT";
pub const DISPLAY_PRECIPITATION_UNIT_ENV: &str = "DISPLAY_PRECIPITATION_UNIT";
pub const DISPLAY_GRACE_MINUTES_ENV: &str = "DISPLAY_GRACE_MINUTES";
pub const DISPLAY_MAX_HOURLY_POINTS_ENV: &str = "DISPLAY_MAX_HOURLY_POINTS";
pub const DISPLAY_FORECAST_DAYS_ENV: &str = "DISPLAY_FORECAST_DAYS";
pub const DISPLAY_HTTP_TIMEOUT_SECS_ENV: &str = "DISPLAY_HTTP_TIMEOUT_SECS";
const HOME_ENV: &str = "HOME";

pub const PROVIDER_TIMEOUT_SECS: u64 = 10;
pub const PROVIDER_RETRY_MAX_ATTEMPTS: usize = 2;
pub const PROVIDER_RETRY_BASE_BACKOFF_MS: u64 = 200;
pub const USER_AGENT: &str = "smart-display/1.0";

/// Hourly window applied by the normalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForecastWindow {
    pub grace_minutes: i64,
    pub max_hourly_points: usize,
}

impl Default for ForecastWindow {
    fn default() -> Self {
        Self {
            grace_minutes: HOURLY_GRACE_MINUTES,
            max_hourly_points: MAX_HOURLY_POINTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub cache_dir: PathBuf,
    pub location: LocationQuery,
    pub units: Units,
    pub window: ForecastWindow,
    pub forecast_days: u8,
    pub weather_ttl_secs: u64,
    pub air_quality_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub retry_policy: RetryPolicy,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let map: HashMap<String, String> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let defaults = Units::default();

        Self {
            cache_dir: resolve_cache_dir(&map),
            location: resolve_location(&map),
            units: Units {
                temperature_unit: env_value(&map, DISPLAY_TEMPERATURE_UNIT_ENV)
                    .and_then(TemperatureUnit::parse)
                    .unwrap_or(defaults.temperature_unit),
                wind_speed_unit: env_value(&map, DISPLAY_WIND_SPEED_UNIT_ENV)
                    .and_then(WindSpeedUnit::parse)
                    .unwrap_or(defaults.wind_speed_unit),
                precipitation_unit: env_value(&map, DISPLAY_PRECIPITATION_UNIT_ENV)
                    .and_then(PrecipitationUnit::parse)
                    .unwrap_or(defaults.precipitation_unit),
            },
            window: ForecastWindow {
                grace_minutes: env_value(&map, DISPLAY_GRACE_MINUTES_ENV)
                    .and_then(|value| value.parse::<i64>().ok())
                    .filter(|value| *value >= 0)
                    .unwrap_or(HOURLY_GRACE_MINUTES),
                max_hourly_points: positive(&map, DISPLAY_MAX_HOURLY_POINTS_ENV)
                    .unwrap_or(MAX_HOURLY_POINTS),
            },
            forecast_days: env_value(&map, DISPLAY_FORECAST_DAYS_ENV)
                .and_then(|value| value.parse::<u8>().ok())
                .filter(|value| (1..=16).contains(value))
                .unwrap_or(FORECAST_DAYS),
            weather_ttl_secs: positive(&map, DISPLAY_WEATHER_TTL_SECS_ENV)
                .unwrap_or(WEATHER_CACHE_TTL_SECS),
            air_quality_ttl_secs: positive(&map, DISPLAY_AIR_QUALITY_TTL_SECS_ENV)
                .unwrap_or(AIR_QUALITY_CACHE_TTL_SECS),
            http_timeout_secs: positive(&map, DISPLAY_HTTP_TIMEOUT_SECS_ENV)
                .unwrap_or(PROVIDER_TIMEOUT_SECS),
            retry_policy: RetryPolicy::default(),
        }
    }
}

fn env_value<'a>(env_map: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    env_map
        .get(key)
        .map(String::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn positive<T>(env_map: &HashMap<String, String>, key: &str) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    env_value(env_map, key)
        .and_then(|value| value.parse::<T>().ok())
        .filter(|value| *value > T::default())
}

fn resolve_location(env_map: &HashMap<String, String>) -> LocationQuery {
    LocationQuery {
        postal_code: env_value(env_map, DISPLAY_POSTAL_CODE_ENV).map(str::to_string),
        city: env_value(env_map, DISPLAY_CITY_ENV).map(str::to_string),
        country: env_value(env_map, DISPLAY_COUNTRY_ENV)
            .unwrap_or(DEFAULT_COUNTRY)
            .to_string(),
    }
}

fn resolve_cache_dir(env_map: &HashMap<String, String>) -> PathBuf {
    let home = env_map.get(HOME_ENV).map(String::as_str);
    env_value(env_map, DISPLAY_CACHE_DIR_ENV)
        .map(|value| expand_home_path(value, home))
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("smart-display-feed"))
}

fn expand_home_path(raw: &str, home: Option<&str>) -> String {
    let trimmed = raw.trim();
    let Some(home) = home.map(str::trim).filter(|value| !value.is_empty()) else {
        return trimmed.to_string();
    };

    let home = home.trim_end_matches('/');
    let mut expanded = trimmed.replace("$HOME", home);

    if expanded == "~" {
        expanded = home.to_string();
    } else if let Some(rest) = expanded.strip_prefix("~/") {
        expanded = format!("{home}/{rest}");
    }

    expanded
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: PROVIDER_RETRY_MAX_ATTEMPTS,
            base_backoff_ms: PROVIDER_RETRY_BASE_BACKOFF_MS,
        }
    }
}

impl RetryPolicy {
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            base_backoff_ms: 0,
        }
    }

    pub fn backoff_for_attempt(self, attempt: usize) -> u64 {
        if attempt <= 1 {
            return 0;
        }

        let shift = (attempt - 2).min(8);
        self.base_backoff_ms.saturating_mul(1_u64 << shift)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults_match_panel_layout() {
        let config = RuntimeConfig::from_pairs(Vec::<(String, String)>::new());

        assert!(config.cache_dir.ends_with("smart-display-feed"));
        assert_eq!(config.weather_ttl_secs, WEATHER_CACHE_TTL_SECS);
        assert_eq!(config.air_quality_ttl_secs, AIR_QUALITY_CACHE_TTL_SECS);
        assert_eq!(config.window, ForecastWindow::default());
        assert_eq!(config.window.grace_minutes, 25);
        assert_eq!(config.window.max_hourly_points, 4);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.units, Units::default());
        assert_eq!(config.location.country, "US");
        assert_eq!(config.location.locality(), None);
    }

    #[test]
    fn config_reads_location_descriptor() {
        let config = RuntimeConfig::from_pairs(vec![
            (DISPLAY_POSTAL_CODE_ENV, " 80204 "),
            (DISPLAY_COUNTRY_ENV, "US"),
        ]);

        assert_eq!(config.location, LocationQuery::postal_code("80204", "US"));
    }

    #[test]
    fn config_treats_blank_values_as_unset() {
        let config = RuntimeConfig::from_pairs(vec![
            (DISPLAY_POSTAL_CODE_ENV, "  "),
            (DISPLAY_CITY_ENV, ""),
            (DISPLAY_COUNTRY_ENV, " "),
        ]);

        assert_eq!(config.location.postal_code, None);
        assert_eq!(config.location.city, None);
        assert_eq!(config.location.country, DEFAULT_COUNTRY);
    }

    #[test]
    fn config_expands_home_prefix_for_cache_dir() {
        let config = RuntimeConfig::from_pairs(vec![
            (HOME_ENV, "/tmp/home"),
            (DISPLAY_CACHE_DIR_ENV, "~/.cache/display"),
        ]);

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/home/.cache/display"));
    }

    #[test]
    fn config_supports_unit_and_window_overrides() {
        let config = RuntimeConfig::from_pairs(vec![
            (DISPLAY_TEMPERATURE_UNIT_ENV, "celsius"),
            (DISPLAY_WIND_SPEED_UNIT_ENV, "kmh"),
            (DISPLAY_PRECIPITATION_UNIT_ENV, "mm"),
            (DISPLAY_GRACE_MINUTES_ENV, "0"),
            (DISPLAY_MAX_HOURLY_POINTS_ENV, "6"),
            (DISPLAY_WEATHER_TTL_SECS_ENV, "600"),
        ]);

        assert_eq!(config.units.temperature_unit, TemperatureUnit::Celsius);
        assert_eq!(config.units.wind_speed_unit, WindSpeedUnit::Kmh);
        assert_eq!(config.units.precipitation_unit, PrecipitationUnit::Mm);
        assert_eq!(config.window.grace_minutes, 0);
        assert_eq!(config.window.max_hourly_points, 6);
        assert_eq!(config.weather_ttl_secs, 600);
    }

    #[test]
    fn config_falls_back_when_overrides_invalid() {
        let config = RuntimeConfig::from_pairs(vec![
            (DISPLAY_WEATHER_TTL_SECS_ENV, "abc"),
            (DISPLAY_MAX_HOURLY_POINTS_ENV, "0"),
            (DISPLAY_TEMPERATURE_UNIT_ENV, "kelvin"),
            (DISPLAY_FORECAST_DAYS_ENV, "40"),
        ]);

        assert_eq!(config.weather_ttl_secs, WEATHER_CACHE_TTL_SECS);
        assert_eq!(config.window.max_hourly_points, MAX_HOURLY_POINTS);
        assert_eq!(config.units.temperature_unit, TemperatureUnit::Fahrenheit);
        assert_eq!(config.forecast_days, FORECAST_DAYS);
    }

    #[test]
    fn config_retry_policy_backoff_is_deterministic() {
        let policy = RetryPolicy::default();

        assert_eq!(policy.backoff_for_attempt(1), 0);
        assert_eq!(policy.backoff_for_attempt(2), 200);
        assert_eq!(policy.backoff_for_attempt(3), 400);
    }
}
