use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// Attendance sidecar. Speaks JSON lines on stdin/stdout and logs to stderr.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
pub struct Config {
    /// Workspace directory to open at startup.
    #[clap(long, env = "ROLLBOOKD_WORKSPACE")]
    pub workspace: Option<PathBuf>,
    /// Log level or filter directive, e.g. `debug` or `rollbookd=trace`.
    #[clap(long, env = "ROLLBOOKD_LOG", default_value = "info")]
    pub log_level: String,
    #[clap(long, env = "ROLLBOOKD_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
}

fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level.trim().to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Stdout carries responses, so every log line goes to stderr.
pub fn init_logging(config: &Config) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&config.log_level))
        .with_writer(std::io::stderr)
        .with_ansi(false);
    match config.log_format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_flags() {
        let config = Config::try_parse_from(["rollbookd"]).expect("parse");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn flags_override_defaults() {
        let config = Config::try_parse_from([
            "rollbookd",
            "--workspace",
            "/tmp/school",
            "--log-level",
            "debug",
            "--log-format",
            "json",
        ])
        .expect("parse");
        assert_eq!(config.workspace, Some(PathBuf::from("/tmp/school")));
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
