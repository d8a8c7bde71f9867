//! Data feed for the smart display panel.
//!
//! - `location`: postal code / city to coordinates, cached forever.
//! - `providers`: raw Nominatim and Open-Meteo transport.
//! - `normalize`: provider payloads to the `ObservationSet` schema.
//! - `cache`: per-kind JSON documents with freshness checks.
//! - `pipeline`: resolve, fetch, normalize, with stale and demo fallbacks.
//! - `agenda`: sample calendar entries formatted for the panel.

pub mod agenda;
pub mod cache;
pub mod config;
pub mod error;
pub mod location;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod weather_code;

#[cfg(test)]
mod test_support;

pub use error::PipelineError;
pub use model::{ObservationSet, PipelineOutput};
pub use pipeline::run;
