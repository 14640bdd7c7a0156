//! Obsolete path discovery.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::queries;
use crate::{
    observability::metrics,
    store::{Session, StoreResult},
};

#[derive(Debug, Deserialize)]
struct ObsoletePathRow {
    #[serde(rename = "Path")]
    path: String,
    #[serde(rename = "MaxVersion")]
    max_version: u32,
}

/// A path whose latest version is at or before the watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoletePath {
    pub path: String,
    /// Latest version seen in the index.
    pub last_seen: DateTime<Utc>,
}

/// The obsolete paths of one index table for one watermark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObsoletePathSet {
    pub table: String,
    pub watermark: DateTime<Utc>,
    paths: Vec<ObsoletePath>,
}

impl ObsoletePathSet {
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Paths ordered by name.
    pub fn paths(&self) -> &[ObsoletePath] {
        &self.paths
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths
            .binary_search_by(|p| p.path.as_str().cmp(path))
            .is_ok()
    }
}

/// Find the distinct paths of `table` whose latest version is at or before `watermark`.
///
/// No qualifying path yields an empty set, not an error.
pub async fn find_obsolete_paths(
    session: &Session<'_>,
    table: &str,
    watermark: DateTime<Utc>,
) -> StoreResult<ObsoletePathSet> {
    let statement = queries::select_obsolete_paths(table, watermark);
    let rows: Vec<ObsoletePathRow> = session.read(&statement).await?;

    // A path keeps its highest version if the store returns duplicates.
    let mut latest: BTreeMap<String, u32> = BTreeMap::new();
    for row in rows {
        let version = latest.entry(row.path).or_insert(row.max_version);
        *version = (*version).max(row.max_version);
    }

    let paths: Vec<ObsoletePath> = latest
        .into_iter()
        .map(|(path, version)| ObsoletePath {
            path,
            last_seen: DateTime::<Utc>::from_timestamp(i64::from(version), 0)
                .unwrap_or_default(),
        })
        .collect();

    tracing::info!(
        table = %table,
        watermark = %watermark,
        count = paths.len(),
        "Found obsolete paths"
    );
    for path in &paths {
        tracing::debug!(
            table = %table,
            path = %path.path,
            last_seen = %path.last_seen,
            "Obsolete path"
        );
    }
    metrics::record_obsolete_paths(table, paths.len());

    Ok(ObsoletePathSet {
        table: table.to_string(),
        watermark,
        paths,
    })
}
