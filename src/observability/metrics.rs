//! Prometheus metrics for the cleaner.
//!
//! Provides metrics for:
//! - Cycle outcomes and duration
//! - Obsolete paths found per index table
//! - Delete statements issued per table
//!
//! Without the `prometheus` feature every recording function is a no-op.

#[cfg(feature = "prometheus")]
use metrics::{counter, gauge, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::config::MetricsConfig;

/// Initialize the metrics system and start the scrape endpoint.
///
/// Must be called from within a Tokio runtime; the exporter spawns its
/// HTTP listener onto it.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(config.listen)
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_duration_seconds".to_string()),
            &config.duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?
        .install()
        .map_err(MetricsError::Install)?;

    tracing::info!(listen = %config.listen, "Prometheus metrics endpoint started");

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if config.enabled {
        tracing::warn!(
            "Metrics are enabled in config but the 'prometheus' feature is not compiled. \
             Rebuild with: cargo build --features prometheus"
        );
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record the outcome and duration of one retention cycle.
///
/// # Arguments
/// * `outcome` - "success", "noop" or "failure"
/// * `duration_secs` - Wall-clock time of the cycle
pub fn record_cycle(outcome: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("graphite_cleaner_cycles_total", "outcome" => outcome.to_string()).increment(1);
        histogram!("graphite_cleaner_cycle_duration_seconds").record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, duration_secs);
    }
}

/// Record how many obsolete paths the last discovery found in an index table.
pub fn record_obsolete_paths(table: &str, count: usize) {
    #[cfg(feature = "prometheus")]
    {
        gauge!("graphite_cleaner_obsolete_paths", "table" => table.to_string()).set(count as f64);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (table, count);
    }
}

/// Record a delete statement issued (or suppressed by dry-run) against a table.
pub fn record_mutation(table: &str, dry_run: bool) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "graphite_cleaner_mutations_total",
            "table" => table.to_string(),
            "dry_run" => dry_run.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (table, dry_run);
    }
}

/// Record a failed cycle step.
pub fn record_cycle_error(step: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("graphite_cleaner_cycle_errors_total", "step" => step.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = step;
    }
}

/// Metrics initialization errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
