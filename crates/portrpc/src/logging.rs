use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Overrides the computed filter with full `EnvFilter` directives.
pub const LOG_ENV: &str = "PORTRPC_LOG";

/// Targets that follow `--log-level`; everything else stays at warn.
const PORTRPC_TARGETS: [&str; 3] = ["portrpc", "portrpc_peer", "portrpc_channel"];

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Filter directives for `level`: the portrpc crates at `level`, others
/// no louder than warn.
pub fn default_directives(level: LogLevel) -> String {
    let global = match level {
        LogLevel::Error => "error",
        _ => "warn",
    };
    let mut directives = vec![global.to_string()];
    directives.extend(
        PORTRPC_TARGETS
            .iter()
            .map(|target| format!("{target}={}", level.directive())),
    );
    directives.join(",")
}

fn build_filter(level: LogLevel) -> EnvFilter {
    match EnvFilter::try_from_env(LOG_ENV) {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new(default_directives(level)),
    }
}

/// Install the stderr subscriber. Library crates only emit `tracing` events.
///
/// `PORTRPC_LOG`, when set and valid, replaces the `--log-level` defaults.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(level))
        .with_ansi(false)
        .with_target(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_level_only_raises_portrpc_targets() {
        assert_eq!(
            default_directives(LogLevel::Debug),
            "warn,portrpc=debug,portrpc_peer=debug,portrpc_channel=debug"
        );
    }

    #[test]
    fn error_level_quiets_everything() {
        assert_eq!(
            default_directives(LogLevel::Error),
            "error,portrpc=error,portrpc_peer=error,portrpc_channel=error"
        );
    }

    #[test]
    fn default_directives_parse() {
        for level in [LogLevel::Warn, LogLevel::Trace] {
            assert!(EnvFilter::try_new(default_directives(level)).is_ok());
        }
    }
}
