//! Retention worker.
//!
//! Runs the retention cycle once, or on a fixed interval until shutdown.
//! Cycles never overlap: the next one starts only after the previous one
//! has returned and the interval has elapsed.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::{CycleError, RetentionCycle};

/// How the worker schedules cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run a single cycle and report its outcome.
    OneShot,
    /// Run a cycle every `interval` until shutdown. Failures are logged and retried next interval.
    Continuous { interval: Duration },
}

/// Run the retention worker.
///
/// In one-shot mode the cycle's failure is returned so the caller can exit
/// non-zero. In continuous mode this only returns once `shutdown` is
/// cancelled; a running cycle is always allowed to finish first.
pub async fn run_retention_worker(
    cycle: &RetentionCycle,
    mode: RunMode,
    shutdown: CancellationToken,
) -> Result<(), CycleError> {
    let dry_run_msg = if cycle.is_dry_run() { " (DRY RUN)" } else { "" };
    let policy = cycle.policy();
    let tables = cycle.tables();

    match mode {
        RunMode::OneShot => {
            tracing::info!(
                value_table = %tables.value,
                index_table = %tables.index,
                tagged_table = %tables.tagged,
                max_age_plain_secs = policy.max_age_plain().as_secs(),
                max_age_tagged_secs = policy.max_age_tagged().as_secs(),
                dry_run = cycle.is_dry_run(),
                "Running single retention cycle{}",
                dry_run_msg
            );
            cycle.run().await.map(|_| ())
        }
        RunMode::Continuous { interval } => {
            tracing::info!(
                value_table = %tables.value,
                index_table = %tables.index,
                tagged_table = %tables.tagged,
                max_age_plain_secs = policy.max_age_plain().as_secs(),
                max_age_tagged_secs = policy.max_age_tagged().as_secs(),
                interval_secs = interval.as_secs(),
                dry_run = cycle.is_dry_run(),
                "Starting retention worker{}",
                dry_run_msg
            );

            loop {
                if shutdown.is_cancelled() {
                    break;
                }

                // The cycle has already logged its own failure.
                if let Err(e) = cycle.run().await {
                    tracing::debug!(
                        step = %e.step,
                        retry_in_secs = interval.as_secs(),
                        "Retrying next interval"
                    );
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
            }

            tracing::info!("Retention worker stopped");
            Ok(())
        }
    }
}
