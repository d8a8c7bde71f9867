use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use display_feed::{
    PipelineError, PipelineOutput, agenda,
    cache::{CacheStore, FileCacheStore, MemoryCacheStore},
    config::RuntimeConfig,
    error::ErrorKind,
    location,
    model::{LocationResult, TemperatureUnit},
    pipeline,
    providers::{HttpProviders, ProviderApi},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Weather and air-quality feed for the smart display panel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one refresh cycle and print the normalized observations.
    Refresh {
        #[arg(long)]
        json: bool,
        /// Keep cache entries in memory only.
        #[arg(long)]
        dry_run: bool,
    },
    /// Resolve the configured location to coordinates.
    Locate {
        #[arg(long)]
        json: bool,
    },
    /// Print the sample agenda as laid out on the panel.
    Agenda {
        #[arg(long)]
        json: bool,
        #[arg(long, default_value_t = agenda::MAX_EVENTS)]
        max_events: usize,
    },
}

const ENVELOPE_SCHEMA_VERSION: &str = "v1";
const ERROR_CODE_USER_INVALID_CONFIG: &str = "user.invalid_config";
const ERROR_CODE_USER_LOCATION_NOT_FOUND: &str = "user.location_not_found";
const ERROR_CODE_RUNTIME_PROVIDER_INIT: &str = "runtime.provider_init_failed";
const ERROR_CODE_RUNTIME_PROVIDER: &str = "runtime.provider_failed";
const ERROR_CODE_RUNTIME_SERIALIZE: &str = "runtime.serialize_failed";

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliError {
    kind: ErrorKind,
    code: &'static str,
    message: String,
}

impl CliError {
    fn runtime(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Runtime,
            code,
            message: message.into(),
        }
    }

    fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }
}

impl From<PipelineError> for CliError {
    fn from(error: PipelineError) -> Self {
        let code = match &error {
            PipelineError::Configuration(_) => ERROR_CODE_USER_INVALID_CONFIG,
            PipelineError::NotFound(_) => ERROR_CODE_USER_LOCATION_NOT_FOUND,
            PipelineError::Transport { .. } | PipelineError::Parse(_) => {
                ERROR_CODE_RUNTIME_PROVIDER
            }
        };

        Self {
            kind: error.kind(),
            code,
            message: error.to_string(),
        }
    }
}

impl Cli {
    fn command_name(&self) -> &'static str {
        match &self.command {
            Commands::Refresh { .. } => "display.refresh",
            Commands::Locate { .. } => "display.locate",
            Commands::Agenda { .. } => "display.agenda",
        }
    }

    fn json_output(&self) -> bool {
        match &self.command {
            Commands::Refresh { json, .. }
            | Commands::Locate { json }
            | Commands::Agenda { json, .. } => *json,
        }
    }

    fn dry_run(&self) -> bool {
        matches!(self.command, Commands::Refresh { dry_run: true, .. })
    }
}

fn main() {
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command_name();
    let json_output = cli.json_output();
    match run(cli) {
        Ok(output) => println!("{output}"),
        Err(error) => {
            emit_error(command, json_output, &error);
            std::process::exit(error.exit_code());
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run(cli: Cli) -> Result<String, CliError> {
    let config = RuntimeConfig::from_env();
    let providers = HttpProviders::new(config.http_timeout_secs)
        .map_err(|error| CliError::runtime(ERROR_CODE_RUNTIME_PROVIDER_INIT, error.to_string()))?;

    if cli.dry_run() {
        run_with(cli, &config, &providers, &MemoryCacheStore::new(), Utc::now)
    } else {
        let cache = FileCacheStore::new(&config.cache_dir);
        run_with(cli, &config, &providers, &cache, Utc::now)
    }
}

fn run_with<P, C, N>(
    cli: Cli,
    config: &RuntimeConfig,
    providers: &P,
    cache: &C,
    now_fn: N,
) -> Result<String, CliError>
where
    P: ProviderApi,
    C: CacheStore,
    N: Fn() -> DateTime<Utc>,
{
    let command = cli.command_name();
    match cli.command {
        Commands::Refresh { json, .. } => {
            let output = pipeline::run(config, providers, cache, now_fn)?;
            if json {
                render_json_envelope(command, &output)
            } else {
                Ok(format_refresh_text(&output))
            }
        }
        Commands::Locate { json } => {
            let resolved = location::resolve(
                providers,
                cache,
                &config.location,
                now_fn(),
                config.retry_policy,
                std::thread::sleep,
            )?;
            if json {
                render_json_envelope(command, &resolved)
            } else {
                Ok(format_location_text(&resolved))
            }
        }
        Commands::Agenda { json, max_events } => {
            let now = now_fn().with_timezone(&Local).naive_local();
            let lines = agenda::format_events_for_display(
                &agenda::sample_events(now),
                now,
                max_events,
            );
            if json {
                render_json_envelope(command, &lines)
            } else {
                Ok(lines
                    .iter()
                    .map(|line| format!("{}  {} ({})", line.time_display, line.title, line.location))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
        }
    }
}

fn render_json_envelope<T: Serialize>(command: &str, output: &T) -> Result<String, CliError> {
    let result = serde_json::to_value(output).map_err(|error| {
        CliError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output: {error}"),
        )
    })?;
    serde_json::to_string(&json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": true,
        "result": result,
    }))
    .map_err(|error| {
        CliError::runtime(
            ERROR_CODE_RUNTIME_SERIALIZE,
            format!("failed to serialize output envelope: {error}"),
        )
    })
}

fn emit_error(command: &str, json_output: bool, error: &CliError) {
    if !json_output {
        eprintln!("error[{}]: {}", error.code, error.message);
        return;
    }

    let payload = json!({
        "schema_version": ENVELOPE_SCHEMA_VERSION,
        "command": command,
        "ok": false,
        "error": {
            "code": error.code,
            "message": error.message,
            "details": {
                "kind": error.kind.as_str(),
                "exit_code": error.exit_code(),
            }
        }
    });
    match serde_json::to_string(&payload) {
        Ok(rendered) => println!("{rendered}"),
        Err(serialize_error) => eprintln!(
            "error[{ERROR_CODE_RUNTIME_SERIALIZE}]: failed to serialize error envelope: {serialize_error}"
        ),
    }
}

fn temperature_symbol(unit: TemperatureUnit) -> &'static str {
    match unit {
        TemperatureUnit::Celsius => "°C",
        TemperatureUnit::Fahrenheit => "°F",
    }
}

fn format_location_text(location: &LocationResult) -> String {
    format!(
        "{} | lat={:.4} lon={:.4}",
        location.display_name, location.lat, location.lon
    )
}

fn format_refresh_text(output: &PipelineOutput) -> String {
    let set = &output.observations;
    let degree = temperature_symbol(set.units.temperature_unit);
    let wind_unit = set.units.wind_speed_unit.as_str();
    let current = &set.current.fields;

    let mut lines = vec![format!(
        "{} ({}) | weather={} air_quality={} degraded={}",
        set.location_name,
        set.timezone,
        output.weather.as_str(),
        output.air_quality.as_str(),
        output.degraded
    )];
    if let Some(reason) = &output.fallback_reason {
        lines.push(format!("fallback: {reason}"));
    }

    let aqi = current
        .us_aqi
        .map(|value| format!(" aqi {value:.0}"))
        .unwrap_or_default();
    lines.push(format!(
        "{} {} {:.1}{degree} {} {} wind {:.0} {wind_unit} {} uv {:.1}{aqi}",
        set.current.weekday,
        set.current.time,
        current.temperature,
        current.condition.icon,
        current.condition.label,
        current.wind_speed,
        current.wind_direction.compass,
        current.uv_index,
    ));
    lines.push(format!(
        "pollen tree {:.0} grass {:.0} ragweed {:.0}{}",
        current.pollen.tree,
        current.pollen.grass,
        current.pollen.ragweed,
        if current.pollen.estimated {
            " (estimated)"
        } else {
            ""
        }
    ));

    for point in &set.hourly {
        lines.push(format!(
            "{} {:.1}{degree} {} rain {:.0}%",
            point.time,
            point.fields.temperature,
            point.fields.condition.label,
            point.fields.precipitation_probability
        ));
    }

    for day in &set.daily {
        let range = match (day.fields.temperature_min, day.fields.temperature_max) {
            (Some(min), Some(max)) => format!("{min:.1}~{max:.1}{degree}"),
            _ => "n/a".to_string(),
        };
        lines.push(format!(
            "{} {} {range} {}",
            day.date, day.weekday, day.fields.condition.label
        ));
    }

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::Value;

    use display_feed::config::{DISPLAY_COUNTRY_ENV, DISPLAY_POSTAL_CODE_ENV};
    use display_feed::model::{Coordinates, DataKind, LocationQuery, RawPayload, Units};

    use super::*;

    struct FakeProviders {
        search_result: Result<Vec<LocationResult>, PipelineError>,
        weather_result: Result<Value, PipelineError>,
    }

    impl FakeProviders {
        fn ok() -> Self {
            Self {
                search_result: Ok(vec![LocationResult {
                    lat: 39.7335,
                    lon: -104.9906,
                    display_name: "Denver, Colorado, United States".to_string(),
                }]),
                weather_result: Ok(json!({
                    "timezone": "America/Denver",
                    "current": {
                        "time": "2024-01-01T12:00",
                        "temperature_2m": 41.3,
                        "weather_code": 3,
                        "wind_direction_10m": 354
                    },
                    "hourly": {
                        "time": ["2024-01-01T13:00"],
                        "temperature_2m": [43.0],
                        "precipitation_probability": [20]
                    }
                })),
            }
        }
    }

    impl ProviderApi for FakeProviders {
        fn search_location(
            &self,
            _query: &LocationQuery,
        ) -> Result<Vec<LocationResult>, PipelineError> {
            self.search_result.clone()
        }

        fn fetch(
            &self,
            kind: DataKind,
            _coordinates: Coordinates,
            units: Units,
            forecast_days: u8,
        ) -> Result<RawPayload, PipelineError> {
            let body = match kind {
                DataKind::Weather => self.weather_result.clone()?,
                DataKind::AirQuality => json!({"current": {"us_aqi": 31}}),
            };
            Ok(RawPayload {
                kind,
                units,
                forecast_days,
                body,
            })
        }
    }

    fn config() -> RuntimeConfig {
        let mut config = RuntimeConfig::from_pairs(vec![
            (DISPLAY_POSTAL_CODE_ENV, "80204"),
            (DISPLAY_COUNTRY_ENV, "US"),
        ]);
        config.retry_policy = display_feed::config::RetryPolicy::single_attempt();
        config
    }

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 19, 0, 0)
            .single()
            .expect("time")
    }

    #[test]
    fn main_outputs_refresh_json_contract() {
        let cli = Cli::parse_from(["display-feed", "refresh", "--json"]);

        let output = run_with(
            cli,
            &config(),
            &FakeProviders::ok(),
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect("refresh should pass");
        let json: Value = serde_json::from_str(&output).expect("json");

        assert_eq!(
            json.get("command").and_then(Value::as_str),
            Some("display.refresh")
        );
        assert_eq!(json.get("ok").and_then(Value::as_bool), Some(true));
        let result = json.get("result").expect("result");
        assert_eq!(result.get("degraded").and_then(Value::as_bool), Some(false));
        assert_eq!(result.get("weather").and_then(Value::as_str), Some("live"));
        assert_eq!(
            result
                .get("observations")
                .and_then(|set| set.get("location_name"))
                .and_then(Value::as_str),
            Some("Denver, Colorado, United States")
        );
        assert_eq!(
            result
                .get("observations")
                .and_then(|set| set.get("current"))
                .and_then(|current| current.get("us_aqi"))
                .and_then(Value::as_f64),
            Some(31.0)
        );
    }

    #[test]
    fn main_outputs_refresh_text_summary() {
        let cli = Cli::parse_from(["display-feed", "refresh"]);

        let output = run_with(
            cli,
            &config(),
            &FakeProviders::ok(),
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect("text mode");

        assert!(output.contains("weather=live"));
        assert!(output.contains("41.3°F"));
        assert!(output.contains("Overcast"));
        assert!(output.contains("13:00 43.0°F"));
        assert!(output.contains("rain 20%"));
    }

    #[test]
    fn main_refresh_reports_fallback_reason() {
        let cli = Cli::parse_from(["display-feed", "refresh"]);
        let providers = FakeProviders {
            weather_result: Err(PipelineError::http(500, "boom")),
            ..FakeProviders::ok()
        };

        let output = run_with(
            cli,
            &config(),
            &providers,
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect("fallback is not an error");

        assert!(output.starts_with("Denver, CO"));
        assert!(output.contains("degraded=true"));
        assert!(output.contains("fallback: weather unavailable"));
    }

    #[test]
    fn main_maps_missing_location_to_user_error() {
        let cli = Cli::parse_from(["display-feed", "refresh", "--json"]);
        let config = RuntimeConfig::from_pairs(Vec::<(String, String)>::new());

        let err = run_with(
            cli,
            &config,
            &FakeProviders::ok(),
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect_err("must fail");

        assert_eq!(err.kind, ErrorKind::User);
        assert_eq!(err.code, ERROR_CODE_USER_INVALID_CONFIG);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn main_cli_error_exit_code_matches_pipeline_error() {
        let errors = [
            PipelineError::Configuration("no locality".to_string()),
            PipelineError::NotFound("US_80204".to_string()),
            PipelineError::transport("timed out"),
            PipelineError::parse("not json"),
        ];

        for error in errors {
            let expected = error.exit_code();
            let cli_error = CliError::from(error);
            assert_eq!(cli_error.exit_code(), expected);
        }
    }

    #[test]
    fn main_maps_unknown_location_to_not_found() {
        let cli = Cli::parse_from(["display-feed", "locate"]);
        let providers = FakeProviders {
            search_result: Ok(Vec::new()),
            ..FakeProviders::ok()
        };

        let err = run_with(
            cli,
            &config(),
            &providers,
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect_err("must fail");

        assert_eq!(err.code, ERROR_CODE_USER_LOCATION_NOT_FOUND);
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn main_maps_geocoder_outage_to_runtime_error_for_locate() {
        let cli = Cli::parse_from(["display-feed", "locate", "--json"]);
        let providers = FakeProviders {
            search_result: Err(PipelineError::http(400, "bad request")),
            ..FakeProviders::ok()
        };

        let err = run_with(
            cli,
            &config(),
            &providers,
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect_err("must fail");

        assert_eq!(err.kind, ErrorKind::Runtime);
        assert_eq!(err.code, ERROR_CODE_RUNTIME_PROVIDER);
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn main_outputs_locate_text() {
        let cli = Cli::parse_from(["display-feed", "locate"]);

        let output = run_with(
            cli,
            &config(),
            &FakeProviders::ok(),
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect("locate");

        assert_eq!(
            output,
            "Denver, Colorado, United States | lat=39.7335 lon=-104.9906"
        );
    }

    #[test]
    fn main_outputs_agenda_json_with_limit() {
        let cli = Cli::parse_from(["display-feed", "agenda", "--json", "--max-events", "2"]);

        let output = run_with(
            cli,
            &config(),
            &FakeProviders::ok(),
            &MemoryCacheStore::new(),
            fixed_now,
        )
        .expect("agenda");
        let json: Value = serde_json::from_str(&output).expect("json");

        let items = json
            .get("result")
            .and_then(Value::as_array)
            .expect("result array");
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].get("title").and_then(Value::as_str),
            Some("Team Meeting")
        );
    }

    #[test]
    fn main_dry_run_flag_is_parsed() {
        let cli = Cli::parse_from(["display-feed", "refresh", "--dry-run"]);
        assert!(cli.dry_run());
        assert!(!cli.json_output());
    }

    #[test]
    fn main_help_flag_is_supported() {
        let help = Cli::try_parse_from(["display-feed", "--help"]).expect_err("help");
        assert_eq!(help.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
