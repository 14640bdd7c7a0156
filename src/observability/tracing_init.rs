//! Tracing initialization with configurable logging formats.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{LogFormat, LoggingConfig};

/// Initialize the tracing subscriber with the given configuration.
///
/// This sets up:
/// - Console logging with configurable format (pretty, compact, JSON)
/// - Environment-based log filtering (`RUST_LOG` wins over the config file)
pub fn init_tracing(logging: &LoggingConfig) -> Result<TracingGuard, TracingError> {
    let filter = build_env_filter(logging);

    let result = match (&logging.format, logging.timestamps) {
        (LogFormat::Pretty, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Pretty, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .pretty()
                .with_target(true)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Compact, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Compact, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .compact()
                .with_target(false)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Json, true) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line);
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
        (LogFormat::Json, false) => {
            let fmt_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_file(logging.file_line)
                .with_line_number(logging.file_line)
                .without_time();
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
        }
    };

    result.map_err(|e| TracingError::Init(e.to_string()))?;

    Ok(TracingGuard { _private: () })
}

fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    let base_level = config.level.as_str();

    // Check for RUST_LOG environment variable first
    if let Ok(env_filter) = std::env::var("RUST_LOG") {
        EnvFilter::try_new(env_filter).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else if let Some(filter) = &config.filter {
        let combined = format!("{},{}", base_level, filter);
        EnvFilter::try_new(combined).unwrap_or_else(|_| EnvFilter::new(base_level))
    } else {
        // Default filter that quiets noisy HTTP client crates
        EnvFilter::new(format!(
            "{},hyper=warn,hyper_util=warn,h2=warn,reqwest=warn,rustls=warn",
            base_level
        ))
    }
}

/// Guard returned by [`init_tracing`]; keep it alive for the lifetime of the process.
pub struct TracingGuard {
    _private: (),
}

impl Drop for TracingGuard {
    fn drop(&mut self) {
        tracing::debug!("Tracing shut down");
    }
}

/// Tracing initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Failed to initialize tracing: {0}")]
    Init(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_default_filter_quiets_http_crates() {
        temp_env::with_var_unset("RUST_LOG", || {
            let filter = build_env_filter(&LoggingConfig::default()).to_string();
            assert!(filter.contains("info"), "{filter}");
            assert!(filter.contains("reqwest=warn"), "{filter}");
        });
    }

    #[test]
    fn test_config_filter_appended_to_level() {
        temp_env::with_var_unset("RUST_LOG", || {
            let config = LoggingConfig {
                level: LogLevel::Debug,
                filter: Some("graphite_cleaner::store=trace".into()),
                ..Default::default()
            };
            let filter = build_env_filter(&config).to_string();
            assert!(filter.contains("debug"), "{filter}");
            assert!(filter.contains("graphite_cleaner::store=trace"), "{filter}");
        });
    }

    #[test]
    fn test_rust_log_overrides_config() {
        temp_env::with_var("RUST_LOG", Some("error"), || {
            let config = LoggingConfig {
                level: LogLevel::Trace,
                ..Default::default()
            };
            let filter = build_env_filter(&config).to_string();
            assert_eq!(filter, "error");
        });
    }
}
