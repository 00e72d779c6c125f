//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use vista_settings::LoggingSettings;

/// Install the global subscriber.
///
/// `RUST_LOG` wins over the configured level. Output is JSON lines when
/// `settings.json` is set, human-readable otherwise.
pub fn init_tracing(settings: &LoggingSettings) {
    let filter = env_filter(settings, std::env::var("RUST_LOG").ok());
    let registry = tracing_subscriber::registry().with(filter);
    let result = if settings.json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(true))
            .try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
    if let Err(err) = result {
        eprintln!("tracing subscriber already installed: {err}");
    }
}

fn env_filter(settings: &LoggingSettings, rust_log: Option<String>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(&settings.level))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(level: &str) -> LoggingSettings {
        LoggingSettings {
            level: level.into(),
            json: false,
        }
    }

    #[test]
    fn configured_level_is_the_default() {
        assert_eq!(env_filter(&settings("debug"), None).to_string(), "debug");
    }

    #[test]
    fn rust_log_takes_precedence() {
        let filter = env_filter(&settings("debug"), Some("warn".into()));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn empty_rust_log_is_ignored() {
        let filter = env_filter(&settings("error"), Some(String::new()));
        assert_eq!(filter.to_string(), "error");
    }
}
