use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::{CacheEntry, CacheKind, CacheStore};
use crate::config::RetryPolicy;
use crate::error::PipelineError;
use crate::model::{LocationQuery, LocationResult};
use crate::providers::{ProviderApi, execute_with_retry};

const GEOCODER_NAME: &str = "nominatim";

/// Cache key for a location descriptor: `{country}_{locality}`, both
/// trimmed and otherwise verbatim (`US_80204`, `US_New York`).
///
/// Depends only on the country and the locality actually sent to the
/// geocoder, so equal descriptors always share one entry.
pub fn cache_key(query: &LocationQuery) -> Result<String, PipelineError> {
    let locality = query.locality().ok_or_else(|| {
        PipelineError::Configuration("location requires a postal code or a city".to_string())
    })?;

    let country = query.country.trim();
    if country.is_empty() {
        return Err(PipelineError::Configuration(
            "location requires a country".to_string(),
        ));
    }

    Ok(format!("{country}_{locality}"))
}

/// Resolve a descriptor to coordinates. Cached results never expire; a miss
/// costs exactly one geocoding request.
pub fn resolve<P, C, S>(
    providers: &P,
    cache: &C,
    query: &LocationQuery,
    now: DateTime<Utc>,
    policy: RetryPolicy,
    sleep_fn: S,
) -> Result<LocationResult, PipelineError>
where
    P: ProviderApi,
    C: CacheStore,
    S: FnMut(Duration),
{
    let key = cache_key(query)?;

    if let Some(entry) = cache.get(CacheKind::Location, &key) {
        match entry.decode::<LocationResult>() {
            Ok(location) => {
                tracing::debug!(key = key.as_str(), "location cache hit");
                return Ok(location);
            }
            Err(error) => {
                tracing::warn!(key = key.as_str(), %error, "ignoring undecodable location entry");
            }
        }
    }

    tracing::info!(key = key.as_str(), "location cache miss; geocoding");
    let results = execute_with_retry(
        GEOCODER_NAME,
        policy,
        || providers.search_location(query),
        sleep_fn,
    )?;

    let Some(location) = results.into_iter().next() else {
        return Err(PipelineError::NotFound(key));
    };

    match CacheEntry::encode(key.as_str(), &location, now) {
        Ok(entry) => {
            if let Err(error) = cache.put(CacheKind::Location, &entry) {
                tracing::warn!(key = key.as_str(), %error, "failed to cache location");
            }
        }
        Err(error) => tracing::warn!(key = key.as_str(), %error, "failed to encode location"),
    }

    Ok(location)
}
