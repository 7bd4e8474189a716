use std::env;

use tracing_subscriber::{EnvFilter, Registry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const LOG_ENV_VAR: &str = "BATCHTOOLS_LOG";
const LOG_FORMAT_ENV_VAR: &str = "BATCHTOOLS_LOG_FORMAT";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum LogFormat {
    Pretty,
    Compact,
}

/// Install the stderr log subscriber. Safe to call more than once.
pub fn init(verbose: u8, quiet: bool) {
    let filter = build_filter(env::var(LOG_ENV_VAR).ok(), verbose, quiet);
    let registry = Registry::default().with(filter);

    let result = match parse_format(env::var(LOG_FORMAT_ENV_VAR).ok().as_deref()) {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .without_time()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    if result.is_err() {
        tracing::debug!("log subscriber already installed");
    }
}

fn default_level(verbose: u8, quiet: bool) -> &'static str {
    match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    }
}

fn build_filter(env_value: Option<String>, verbose: u8, quiet: bool) -> EnvFilter {
    match env_value.filter(|value| !value.trim().is_empty()) {
        Some(value) => EnvFilter::new(value),
        None => EnvFilter::new(default_level(verbose, quiet)),
    }
}

fn parse_format(value: Option<&str>) -> LogFormat {
    match value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_lowercase())
    {
        Some(value) if value == "pretty" => LogFormat::Pretty,
        _ => LogFormat::Compact,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_level() {
        assert_eq!(default_level(0, false), "warn");
        assert_eq!(default_level(1, false), "info");
        assert_eq!(default_level(3, false), "debug");
        assert_eq!(default_level(2, true), "error");
    }

    #[test]
    fn test_env_overrides_verbosity() {
        let filter = build_filter(Some("batchtools_core=trace".to_string()), 0, true);
        assert_eq!(filter.to_string(), "batchtools_core=trace");
        let filter = build_filter(Some("  ".to_string()), 1, false);
        assert_eq!(filter.to_string(), "info");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format(Some("Pretty")), LogFormat::Pretty);
        assert_eq!(parse_format(Some("compact")), LogFormat::Compact);
        assert_eq!(parse_format(Some("json")), LogFormat::Compact);
        assert_eq!(parse_format(None), LogFormat::Compact);
    }
}
