//! Command-line interface for herald using clap.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::engine::STDIN_SOURCE;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format for journalctl (default).
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Parse a human-readable duration such as `30s` or `2m 5s`.
fn parse_duration(value: &str) -> Result<Duration, String> {
    use serde::de::IntoDeserializer;
    use serde::de::value::{Error, StrDeserializer};

    let deserializer: StrDeserializer<'_, Error> = value.into_deserializer();
    humantime_serde::deserialize(deserializer).map_err(|e: Error| e.to_string())
}

/// Incident notification dispatcher: email, HTTP POST/GET and console.
#[derive(Parser, Debug)]
#[command(name = "herald")]
#[command(version)]
#[command(about = "Incident notification dispatcher: email, HTTP POST/GET and console")]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Incident stream: a file of JSON lines, or `-` for stdin.
    #[arg(short = 'i', long = "incidents", default_value = STDIN_SOURCE)]
    pub incidents: String,

    /// Validate configuration and exit.
    #[arg(long = "validate")]
    pub validate: bool,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,

    /// How long to wait for in-flight notifications at shutdown (e.g. 30s, 2m).
    #[arg(long = "drain-timeout", default_value = "30s", value_parser = parse_duration)]
    pub drain_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn cli_default_config_path() {
        let cli = Cli::try_parse_from(["herald"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn cli_custom_config_path() {
        let cli = Cli::try_parse_from(["herald", "-c", "/custom/path.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/custom/path.yaml"));
    }

    #[test]
    fn cli_config_long_option() {
        let cli = Cli::try_parse_from(["herald", "--config", "/long/path.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/long/path.yaml"));
    }

    #[test]
    fn cli_incidents_default_to_stdin() {
        let cli = Cli::try_parse_from(["herald"]).unwrap();
        assert_eq!(cli.incidents, "-");
    }

    #[test]
    fn cli_incidents_file() {
        let cli = Cli::try_parse_from(["herald", "-i", "/var/spool/incidents.jsonl"]).unwrap();
        assert_eq!(cli.incidents, "/var/spool/incidents.jsonl");
    }

    #[test]
    fn cli_validate_flag() {
        let cli = Cli::try_parse_from(["herald", "--validate"]).unwrap();
        assert!(cli.validate);
    }

    #[test]
    fn cli_drain_timeout_default() {
        let cli = Cli::try_parse_from(["herald"]).unwrap();
        assert_eq!(cli.drain_timeout, Duration::from_secs(30));
    }

    #[test]
    fn cli_drain_timeout_humantime() {
        let cli = Cli::try_parse_from(["herald", "--drain-timeout", "2m 5s"]).unwrap();
        assert_eq!(cli.drain_timeout, Duration::from_secs(125));
    }

    #[test]
    fn cli_drain_timeout_invalid_rejected() {
        let result = Cli::try_parse_from(["herald", "--drain-timeout", "soon"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_log_format_default() {
        let cli = Cli::try_parse_from(["herald"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Text));
    }

    #[test]
    fn cli_log_format_json() {
        let cli = Cli::try_parse_from(["herald", "--log-format", "json"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn cli_log_format_invalid_rejected() {
        let result = Cli::try_parse_from(["herald", "--log-format", "invalid"]);
        assert!(result.is_err(), "Invalid log format should be rejected");
    }

    #[test]
    #[serial]
    fn cli_log_format_from_env() {
        // SAFETY: Test marked #[serial] to prevent parallel execution with other env var tests
        unsafe { std::env::set_var("LOG_FORMAT", "json") };

        let cli = Cli::try_parse_from(["herald"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));

        unsafe { std::env::remove_var("LOG_FORMAT") };
    }

    #[test]
    #[serial]
    fn cli_log_format_flag_overrides_env() {
        // SAFETY: Test marked #[serial] to prevent parallel execution with other env var tests
        unsafe { std::env::set_var("LOG_FORMAT", "json") };

        let cli = Cli::try_parse_from(["herald", "--log-format", "text"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Text));

        unsafe { std::env::remove_var("LOG_FORMAT") };
    }
}
