//! Logging setup for the CLI.
//!
//! Logs go to stderr so command output stays clean on stdout.
//!
//! # Environment Variables
//!
//! - `TAILOR_DEBUG=true|1|yes` - Enable debug logging
//! - `TAILOR_LOG_LEVEL=trace|debug|info|warn|error` - Set a specific log level
//! - `TAILOR_LOG_FORMAT=json|pretty|compact` - Set the output format (default: compact)

use std::env;
use std::sync::Once;

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static INIT: Once = Once::new();

const DEBUG_ENV: &str = "TAILOR_DEBUG";
const LEVEL_ENV: &str = "TAILOR_LOG_LEVEL";
const FORMAT_ENV: &str = "TAILOR_LOG_FORMAT";

/// Whether `TAILOR_DEBUG` is set to a truthy value.
pub fn is_debug_enabled() -> bool {
    env::var(DEBUG_ENV)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Log level from `TAILOR_LOG_LEVEL`, falling back to `debug` or `warn`.
pub fn get_log_level() -> &'static str {
    parse_level(env::var(LEVEL_ENV).ok().as_deref(), is_debug_enabled())
}

/// Log format from `TAILOR_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    parse_format(env::var(FORMAT_ENV).ok().as_deref())
}

fn parse_level(raw: Option<&str>, debug: bool) -> &'static str {
    let fallback = if debug { "debug" } else { "warn" };
    match raw.map(str::to_lowercase).as_deref() {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("info") => "info",
        Some("warn") => "warn",
        Some("error") => "error",
        _ => fallback,
    }
}

fn parse_format(raw: Option<&str>) -> &'static str {
    match raw.map(str::to_lowercase).as_deref() {
        Some("json") => "json",
        Some("pretty") => "pretty",
        _ => "compact",
    }
}

/// Install the global subscriber once, and only when logging was requested.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var(LEVEL_ENV).is_err() {
            return;
        }

        let level = get_log_level();
        let filter = EnvFilter::try_new(format!(
            "tailor={},tailor_cli={},tailor_migrate={}",
            level, level, level
        ))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

        let registry = tracing_subscriber::registry().with(filter);
        match get_log_format() {
            "json" => registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init(),
            "pretty" => registry
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .init(),
            _ => registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init(),
        }

        tracing::debug!(level, format = get_log_format(), "Logging initialized");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level(Some("INFO"), false), "info");
        assert_eq!(parse_level(Some("bogus"), true), "debug");
        assert_eq!(parse_level(None, false), "warn");
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(parse_format(Some("json")), "json");
        assert_eq!(parse_format(Some("Pretty")), "pretty");
        assert_eq!(parse_format(None), "compact");
    }
}
