//! One retention cycle: discover obsolete paths, then delete points and index entries.
//!
//! Steps run strictly in order:
//! 1. open a store session
//! 2. discover obsolete paths in the plain index, then in the tagged index
//! 3. stop if both sets are empty
//! 4. delete points from the value table
//! 5. delete plain index entries (only when plain paths were found)
//! 6. delete tagged index entries (only when tagged paths were found)
//!
//! The three tables cannot be mutated atomically. A failing step stops the
//! cycle and earlier deletes stand; the next cycle re-derives what is left.

use std::{fmt, time::Instant};

use chrono::{DateTime, Utc};

use super::{
    RetentionPolicy, Watermarks,
    finder::{ObsoletePathSet, find_obsolete_paths},
    queries::{self, Tables},
};
use crate::{
    config::CleanerConfig,
    observability::metrics,
    store::{Session, Statement, StoreError, StoreGateway, StoreResult},
};

/// A step of the retention cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    Opening,
    Discovering,
    DeletingPoints,
    DeletingIndex,
    DeletingTagged,
}

impl CycleStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStep::Opening => "opening",
            CycleStep::Discovering => "discovering",
            CycleStep::DeletingPoints => "deleting_points",
            CycleStep::DeletingIndex => "deleting_index",
            CycleStep::DeletingTagged => "deleting_tagged",
        }
    }
}

impl fmt::Display for CycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one delete step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// The delete was issued (or logged, in dry-run mode).
    Success,
    /// Nothing was obsolete for this step, so no statement was issued.
    SkippedEmpty,
    Failed(String),
}

impl From<&StoreResult<()>> for StepResult {
    fn from(result: &StoreResult<()>) -> Self {
        match result {
            Ok(()) => StepResult::Success,
            Err(e) => StepResult::Failed(e.to_string()),
        }
    }
}

/// What one cycle found and did.
///
/// Steps that were never reached are `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub watermarks: Watermarks,
    pub dry_run: bool,
    pub plain_obsolete: Option<ObsoletePathSet>,
    pub tagged_obsolete: Option<ObsoletePathSet>,
    pub points: Option<StepResult>,
    pub plain_index: Option<StepResult>,
    pub tagged_index: Option<StepResult>,
}

impl CycleReport {
    fn new(started_at: DateTime<Utc>, watermarks: Watermarks, dry_run: bool) -> Self {
        Self {
            started_at,
            watermarks,
            dry_run,
            plain_obsolete: None,
            tagged_obsolete: None,
            points: None,
            plain_index: None,
            tagged_index: None,
        }
    }

    /// True when discovery completed and found nothing to delete.
    pub fn is_noop(&self) -> bool {
        matches!(
            (&self.plain_obsolete, &self.tagged_obsolete),
            (Some(plain), Some(tagged)) if plain.is_empty() && tagged.is_empty()
        )
    }

    fn obsolete_count(set: &Option<ObsoletePathSet>) -> usize {
        set.as_ref().map_or(0, ObsoletePathSet::len)
    }

    fn record(&mut self, step: CycleStep, result: StepResult) {
        match step {
            CycleStep::DeletingPoints => self.points = Some(result),
            CycleStep::DeletingIndex => self.plain_index = Some(result),
            CycleStep::DeletingTagged => self.tagged_index = Some(result),
            CycleStep::Opening | CycleStep::Discovering => {}
        }
    }

    fn fail(self, step: CycleStep, table: Option<&str>, source: StoreError) -> CycleError {
        CycleError {
            step,
            table: table.map(str::to_string),
            source,
            report: Box::new(self),
        }
    }
}

/// A cycle that stopped at `step`.
#[derive(Debug, thiserror::Error)]
#[error("Retention cycle failed while {step}: {source}")]
pub struct CycleError {
    pub step: CycleStep,
    pub table: Option<String>,
    pub source: StoreError,
    /// Progress up to the failure. Deletes already issued are not rolled back.
    pub report: Box<CycleReport>,
}

/// Runs retention cycles against the store.
pub struct RetentionCycle {
    gateway: StoreGateway,
    tables: Tables,
    policy: RetentionPolicy,
}

impl RetentionCycle {
    pub fn new(gateway: StoreGateway, tables: Tables, policy: RetentionPolicy) -> Self {
        Self {
            gateway,
            tables,
            policy,
        }
    }

    /// Build a cycle talking to the configured ClickHouse server.
    pub fn from_config(config: &CleanerConfig) -> StoreResult<Self> {
        let gateway = StoreGateway::from_config(&config.store, config.retention.dry_run)?;
        Ok(Self::new(
            gateway,
            Tables::from_config(&config.store),
            RetentionPolicy::from_config(&config.retention),
        ))
    }

    pub fn tables(&self) -> &Tables {
        &self.tables
    }

    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    pub fn is_dry_run(&self) -> bool {
        self.gateway.is_dry_run()
    }

    /// Run one cycle with watermarks derived from the current time.
    pub async fn run(&self) -> Result<CycleReport, CycleError> {
        self.run_at(Utc::now()).await
    }

    /// Run one cycle with watermarks derived from `now`.
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let start = Instant::now();
        let result = self.execute(now).await;
        let elapsed = start.elapsed();

        match &result {
            Ok(report) => {
                let outcome = if report.is_noop() { "noop" } else { "success" };
                metrics::record_cycle(outcome, elapsed.as_secs_f64());
            }
            Err(e) => {
                tracing::error!(
                    step = %e.step,
                    table = e.table.as_deref().unwrap_or(""),
                    error = %e.source,
                    "Retention cycle failed"
                );
                metrics::record_cycle_error(e.step.as_str());
                metrics::record_cycle("failure", elapsed.as_secs_f64());
            }
        }
        result
    }

    async fn execute(&self, now: DateTime<Utc>) -> Result<CycleReport, CycleError> {
        let watermarks = self.policy.watermarks(now);
        let dry_run = self.gateway.is_dry_run();
        let mut report = CycleReport::new(now, watermarks, dry_run);
        let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };

        tracing::info!(
            plain_watermark = %watermarks.plain,
            tagged_watermark = %watermarks.tagged,
            combined_watermark = %watermarks.combined,
            dry_run,
            "Starting retention cycle{}",
            dry_run_msg
        );

        // Closed on drop, so every early return below releases the connection.
        let mut session = match self.gateway.open().await {
            Ok(session) => session,
            Err(e) => return Err(report.fail(CycleStep::Opening, None, e)),
        };

        let plain =
            match find_obsolete_paths(&session, &self.tables.index, watermarks.plain).await {
                Ok(set) => set,
                Err(e) => {
                    return Err(report.fail(CycleStep::Discovering, Some(&self.tables.index), e));
                }
            };
        let has_plain = !plain.is_empty();
        report.plain_obsolete = Some(plain);

        let tagged =
            match find_obsolete_paths(&session, &self.tables.tagged, watermarks.tagged).await {
                Ok(set) => set,
                Err(e) => {
                    return Err(report.fail(
                        CycleStep::Discovering,
                        Some(&self.tables.tagged),
                        e,
                    ));
                }
            };
        let has_tagged = !tagged.is_empty();
        report.tagged_obsolete = Some(tagged);

        if !has_plain && !has_tagged {
            report.points = Some(StepResult::SkippedEmpty);
            report.plain_index = Some(StepResult::SkippedEmpty);
            report.tagged_index = Some(StepResult::SkippedEmpty);
            session.close();
            tracing::info!("Retention cycle complete, nothing to clean");
            return Ok(report);
        }

        let cluster = session.cluster_clause();

        let statement = queries::delete_points(&self.tables, &cluster, &watermarks);
        if let Err(e) = delete(&session, &mut report, CycleStep::DeletingPoints, &statement).await {
            return Err(report.fail(CycleStep::DeletingPoints, Some(statement.table()), e));
        }

        if has_plain {
            let statement =
                queries::delete_index_paths(&self.tables.index, &cluster, watermarks.plain);
            if let Err(e) =
                delete(&session, &mut report, CycleStep::DeletingIndex, &statement).await
            {
                return Err(report.fail(CycleStep::DeletingIndex, Some(statement.table()), e));
            }
        } else {
            report.plain_index = Some(StepResult::SkippedEmpty);
        }

        if has_tagged {
            let statement =
                queries::delete_index_paths(&self.tables.tagged, &cluster, watermarks.tagged);
            if let Err(e) =
                delete(&session, &mut report, CycleStep::DeletingTagged, &statement).await
            {
                return Err(report.fail(CycleStep::DeletingTagged, Some(statement.table()), e));
            }
        } else {
            report.tagged_index = Some(StepResult::SkippedEmpty);
        }

        session.close();

        tracing::info!(
            plain_paths = CycleReport::obsolete_count(&report.plain_obsolete),
            tagged_paths = CycleReport::obsolete_count(&report.tagged_obsolete),
            dry_run,
            "Retention cycle complete{}",
            dry_run_msg
        );
        Ok(report)
    }
}

async fn delete(
    session: &Session<'_>,
    report: &mut CycleReport,
    step: CycleStep,
    statement: &Statement,
) -> StoreResult<()> {
    tracing::debug!(step = %step, table = %statement.table(), "Issuing delete");
    let result = session.mutate(statement).await;
    report.record(step, StepResult::from(&result));
    if result.is_ok() {
        metrics::record_mutation(statement.table(), session.is_dry_run());
    }
    result
}
