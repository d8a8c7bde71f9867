use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::model::{LocationQuery, LocationResult};

use super::{execute_request, parse_json_body};

const SEARCH_ENDPOINT: &str = "https://nominatim.openstreetmap.org/search";

#[derive(Debug, Serialize)]
struct SearchQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    postalcode: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    city: Option<&'a str>,
    country: &'a str,
    format: &'a str,
    limit: u8,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: CoordinateValue,
    lon: CoordinateValue,
    display_name: Option<String>,
}

/// Nominatim sends coordinates as strings; numbers are accepted too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CoordinateValue {
    Number(f64),
    Text(String),
}

impl CoordinateValue {
    fn to_f64(&self, field: &str) -> Result<f64, PipelineError> {
        match self {
            Self::Number(value) => Ok(*value),
            Self::Text(raw) => raw.trim().parse::<f64>().map_err(|_| {
                PipelineError::parse(format!("geocode payload: invalid {field} '{raw}'"))
            }),
        }
    }
}

pub fn search(client: &Client, query: &LocationQuery) -> Result<Vec<LocationResult>, PipelineError> {
    let search_query = build_query(query)?;
    tracing::info!(
        postalcode = search_query.postalcode,
        city = search_query.city,
        country = search_query.country,
        "requesting geocode"
    );

    let body = execute_request(client.get(SEARCH_ENDPOINT).query(&search_query))?;
    tracing::debug!(length = body.len(), "geocode response received");
    parse_search_response(&body, query)
}

fn build_query(query: &LocationQuery) -> Result<SearchQuery<'_>, PipelineError> {
    let postal_code = query
        .postal_code
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    let city = query
        .city
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());

    if postal_code.is_none() && city.is_none() {
        return Err(PipelineError::Configuration(
            "location requires a postal code or a city".to_string(),
        ));
    }

    Ok(SearchQuery {
        postalcode: postal_code,
        city: if postal_code.is_some() { None } else { city },
        country: query.country.trim(),
        format: "jsonv2",
        limit: 1,
    })
}

fn parse_search_response(
    body: &str,
    query: &LocationQuery,
) -> Result<Vec<LocationResult>, PipelineError> {
    let value = parse_json_body(body, "geocode")?;
    let hits: Vec<SearchHit> = serde_json::from_value(value)
        .map_err(|error| PipelineError::parse(format!("geocode payload: {error}")))?;

    hits.into_iter()
        .map(|hit| {
            let display_name = hit
                .display_name
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| fallback_display_name(query));
            Ok(LocationResult {
                lat: hit.lat.to_f64("lat")?,
                lon: hit.lon.to_f64("lon")?,
                display_name,
            })
        })
        .collect()
}

fn fallback_display_name(query: &LocationQuery) -> String {
    match query.locality() {
        Some(locality) => format!("{locality}, {}", query.country),
        None => query.country.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nominatim_parses_string_coordinates() {
        let body = r#"[
            {
                "place_id": 123,
                "lat": "39.7335",
                "lon": "-104.9906",
                "display_name": "Denver, Denver County, Colorado, 80204, United States"
            }
        ]"#;

        let results =
            parse_search_response(body, &LocationQuery::postal_code("80204", "US")).expect("parse");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lat, 39.7335);
        assert_eq!(results[0].lon, -104.9906);
        assert!(results[0].display_name.starts_with("Denver"));
    }

    #[test]
    fn nominatim_accepts_numeric_coordinates_and_missing_name() {
        let body = r#"[{"lat": 52.52, "lon": 13.405}]"#;

        let results =
            parse_search_response(body, &LocationQuery::city("Berlin", "DE")).expect("parse");
        assert_eq!(results[0].display_name, "Berlin, DE");
    }

    #[test]
    fn nominatim_empty_array_is_not_an_error_here() {
        let results =
            parse_search_response("[]", &LocationQuery::postal_code("80204", "US")).expect("parse");
        assert!(results.is_empty());
    }

    #[test]
    fn nominatim_rejects_non_array_payload() {
        let error = parse_search_response(
            r#"{"error": "Unable to geocode"}"#,
            &LocationQuery::postal_code("80204", "US"),
        )
        .expect_err("must fail");
        assert!(matches!(error, PipelineError::Parse(_)));
    }

    #[test]
    fn nominatim_rejects_unparseable_coordinate_text() {
        let error = parse_search_response(
            r#"[{"lat": "north", "lon": "-104.9"}]"#,
            &LocationQuery::postal_code("80204", "US"),
        )
        .expect_err("must fail");
        assert!(matches!(error, PipelineError::Parse(message) if message.contains("lat")));
    }

    #[test]
    fn nominatim_query_sends_only_the_locality_used_for_the_key() {
        let query = LocationQuery {
            postal_code: Some("80204".to_string()),
            city: Some("Denver".to_string()),
            country: "US".to_string(),
        };

        let search = build_query(&query).expect("query");
        assert_eq!(search.postalcode, Some("80204"));
        assert_eq!(search.city, None);
        assert_eq!(search.format, "jsonv2");
        assert_eq!(search.limit, 1);
    }

    #[test]
    fn nominatim_query_requires_locality() {
        let query = LocationQuery {
            postal_code: None,
            city: Some("  ".to_string()),
            country: "US".to_string(),
        };

        assert!(matches!(
            build_query(&query),
            Err(PipelineError::Configuration(_))
        ));
    }
}
