use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde_json::Value;

use crate::config::{RetryPolicy, USER_AGENT};
use crate::error::PipelineError;
use crate::model::{Coordinates, DataKind, LocationQuery, LocationResult, RawPayload, Units};

pub mod nominatim;
pub mod open_meteo;

/// Raw transport to the geocoder and the forecast provider. Implementations
/// never cache and never retry.
pub trait ProviderApi {
    fn search_location(&self, query: &LocationQuery)
    -> Result<Vec<LocationResult>, PipelineError>;
    fn fetch(
        &self,
        kind: DataKind,
        coordinates: Coordinates,
        units: Units,
        forecast_days: u8,
    ) -> Result<RawPayload, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct HttpProviders {
    client: Client,
}

impl HttpProviders {
    pub fn new(timeout_secs: u64) -> Result<Self, PipelineError> {
        Self::with_timeout(Duration::from_secs(timeout_secs))
    }

    /// Every request, including reading the body, must finish within
    /// `timeout`; overruns surface as status-less transport errors.
    pub fn with_timeout(timeout: Duration) -> Result<Self, PipelineError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|error| PipelineError::transport(error.to_string()))?;

        Ok(Self { client })
    }
}

impl ProviderApi for HttpProviders {
    fn search_location(
        &self,
        query: &LocationQuery,
    ) -> Result<Vec<LocationResult>, PipelineError> {
        nominatim::search(&self.client, query)
    }

    fn fetch(
        &self,
        kind: DataKind,
        coordinates: Coordinates,
        units: Units,
        forecast_days: u8,
    ) -> Result<RawPayload, PipelineError> {
        open_meteo::fetch(&self.client, kind, coordinates, units, forecast_days)
    }
}

pub fn execute_with_retry<T, F, S>(
    provider_name: &'static str,
    policy: RetryPolicy,
    mut operation: F,
    mut sleep_fn: S,
) -> Result<T, PipelineError>
where
    F: FnMut() -> Result<T, PipelineError>,
    S: FnMut(Duration),
{
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match operation() {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.retryable() || attempt == max_attempts {
                    return Err(error.with_provider(provider_name));
                }

                let delay = policy.backoff_for_attempt(attempt + 1);
                tracing::debug!(provider = provider_name, attempt, delay_ms = delay, %error, "retrying");
                sleep_fn(Duration::from_millis(delay));
            }
        }
    }

    Err(PipelineError::transport(format!(
        "{provider_name}: exhausted retry attempts"
    )))
}

pub(crate) fn execute_request(request: RequestBuilder) -> Result<String, PipelineError> {
    let response = request
        .send()
        .map_err(|error| PipelineError::transport(error.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .map_err(|error| PipelineError::transport(error.to_string()))?;

    if status.is_success() {
        return Ok(body);
    }

    let message = extract_error_message(&body).unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    });

    Err(PipelineError::http(status.as_u16(), message))
}

pub(crate) fn parse_json_body(body: &str, context: &str) -> Result<Value, PipelineError> {
    serde_json::from_str::<Value>(body)
        .map_err(|error| PipelineError::parse(format!("{context} payload: {error}")))
}

fn extract_error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    let from_json = serde_json::from_str::<Value>(trimmed)
        .ok()
        .and_then(|json| {
            for key in ["reason", "message", "error", "detail", "description"] {
                if let Some(value) = json.get(key).and_then(Value::as_str) {
                    let message = value.trim();
                    if !message.is_empty() {
                        return Some(message.to_string());
                    }
                }
            }
            None
        });

    from_json.or_else(|| Some(trimmed.chars().take(200).collect()))
}
