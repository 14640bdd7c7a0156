//! Statement builders for discovery and the three deletes.
//!
//! Index tables store `Version` as a `UInt32` unix timestamp and partition
//! by `Date`, so every watermark is bound twice: as a version and as a date.

use chrono::{DateTime, NaiveDate, Utc};

use super::Watermarks;
use crate::{config::StoreConfig, store::Statement};

/// The three coupled graphite tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    /// Raw data points.
    pub value: String,
    /// Plain (dotted) path index.
    pub index: String,
    /// Tagged path index.
    pub tagged: String,
}

impl Tables {
    pub fn new(
        value: impl Into<String>,
        index: impl Into<String>,
        tagged: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            index: index.into(),
            tagged: tagged.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(
            &config.value_table,
            &config.index_table,
            &config.tagged_table,
        )
    }
}

/// Index version for a watermark, clamped to the `UInt32` range.
pub fn version_bound(watermark: DateTime<Utc>) -> u32 {
    watermark.timestamp().clamp(0, i64::from(u32::MAX)) as u32
}

pub fn date_bound(watermark: DateTime<Utc>) -> NaiveDate {
    watermark.date_naive()
}

/// Paths of `table` whose latest version is at or before `watermark`.
///
/// Rows decode as `{"Path": String, "MaxVersion": u32}`.
pub fn select_obsolete_paths(table: &str, watermark: DateTime<Utc>) -> Statement {
    let sql = format!(
        "SELECT Path, max(Version) AS MaxVersion FROM {table} \
         GROUP BY Path \
         HAVING MaxVersion <= {{max_version:UInt32}} \
         ORDER BY Path"
    );
    Statement::new(table, sql).bind("max_version", version_bound(watermark))
}

/// Delete the data points of every path obsolete under either class.
///
/// Obsolescence is re-evaluated by subquery when the delete runs. The date
/// bound uses the combined watermark and applies to both classes.
pub fn delete_points(tables: &Tables, cluster_clause: &str, watermarks: &Watermarks) -> Statement {
    let sql = format!(
        "DELETE FROM {value}{cluster} WHERE Date <= {{date:Date}} AND (\
         Path IN (SELECT Path FROM {index} GROUP BY Path HAVING max(Version) <= {{plain_version:UInt32}}) \
         OR Path IN (SELECT Path FROM {tagged} GROUP BY Path HAVING max(Version) <= {{tagged_version:UInt32}}))",
        value = tables.value,
        cluster = spaced(cluster_clause),
        index = tables.index,
        tagged = tables.tagged,
    );
    Statement::new(&tables.value, sql)
        .bind("date", date_bound(watermarks.combined))
        .bind("plain_version", version_bound(watermarks.plain))
        .bind("tagged_version", version_bound(watermarks.tagged))
}

/// Delete the index rows of every path of `table` obsolete at `watermark`.
pub fn delete_index_paths(
    table: &str,
    cluster_clause: &str,
    watermark: DateTime<Utc>,
) -> Statement {
    let sql = format!(
        "ALTER TABLE {table}{cluster} DELETE WHERE Date <= {{date:Date}} AND \
         Path IN (SELECT Path FROM {table} GROUP BY Path HAVING max(Version) <= {{max_version:UInt32}})",
        cluster = spaced(cluster_clause),
    );
    Statement::new(table, sql)
        .bind("date", date_bound(watermark))
        .bind("max_version", version_bound(watermark))
}

fn spaced(clause: &str) -> String {
    if clause.is_empty() {
        String::new()
    } else {
        format!(" {clause}")
    }
}
