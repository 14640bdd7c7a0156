//! Retention enforcement for graphite-clickhouse tables.
//!
//! Each cycle:
//! 1. Derives a plain and a tagged watermark from the configured max ages
//! 2. Finds the paths whose latest index version is at or before each watermark
//! 3. Deletes the data points of those paths from the value table
//! 4. Deletes their entries from whichever index tables had obsolete paths
//!
//! Mutations honour the configured cluster and dry-run mode.

mod cycle;
mod finder;
mod policy;
mod queries;
mod worker;

pub use cycle::{CycleError, CycleReport, CycleStep, RetentionCycle, StepResult};
pub use finder::{ObsoletePath, ObsoletePathSet, find_obsolete_paths};
pub use policy::{RetentionPolicy, Watermarks};
pub use queries::{
    Tables, date_bound, delete_index_paths, delete_points, select_obsolete_paths, version_bound,
};
pub use worker::{RunMode, run_retention_worker};
