//! Store connection configuration.
//!
//! # Example
//!
//! ```toml
//! [store]
//! connection_string = "http://clickhouse:8123/?user=cleaner&database=graphite"
//! value_table = "graphite"
//! index_table = "graphite_index"
//! tagged_table = "graphite_tagged"
//! cluster = "graphite"
//!
//! [store.settings]
//! mutations_sync = "2"
//! ```

use std::{collections::BTreeMap, time::Duration};

use serde::{Deserialize, Serialize};
use url::Url;

use super::ConfigError;

/// ClickHouse connection and table layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// ClickHouse HTTP interface URL. Query parameters (`user`, `password`,
    /// `database`, settings) are forwarded with every statement, user-info is
    /// sent as ClickHouse auth headers.
    #[serde(default = "default_connection_string")]
    pub connection_string: String,

    /// Table holding raw data points.
    #[serde(default = "default_value_table")]
    pub value_table: String,

    /// Index table for plain (dotted) series paths.
    #[serde(default = "default_index_table")]
    pub index_table: String,

    /// Index table for tagged series paths.
    #[serde(default = "default_tagged_table")]
    pub tagged_table: String,

    /// Cluster name. When set, every mutation is issued `ON CLUSTER`.
    /// Accepts a bare identifier, a backtick-quoted name (`` `graphite-cluster` ``)
    /// or a single-quoted string such as the `'{cluster}'` macro.
    #[serde(default)]
    pub cluster: Option<String>,

    /// Timeout for establishing the HTTP connection, in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Timeout for a single statement, in seconds.
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Extra ClickHouse settings sent with every statement.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            connection_string: default_connection_string(),
            value_table: default_value_table(),
            index_table: default_index_table(),
            tagged_table: default_tagged_table(),
            cluster: None,
            connect_timeout_secs: default_connect_timeout(),
            query_timeout_secs: default_query_timeout(),
            settings: BTreeMap::new(),
        }
    }
}

fn default_connection_string() -> String {
    "http://localhost:8123/?user=default&database=default".to_string()
}

fn default_value_table() -> String {
    "graphite".to_string()
}

fn default_index_table() -> String {
    "graphite_index".to_string()
}

fn default_tagged_table() -> String {
    "graphite_tagged".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_query_timeout() -> u64 {
    300
}

impl StoreConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// The cluster name, ignoring an empty string.
    pub fn cluster_name(&self) -> Option<&str> {
        self.cluster.as_deref().filter(|c| !c.is_empty())
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.connection_string.trim().is_empty() {
            return Err(ConfigError::Validation(
                "store.connection_string cannot be empty".into(),
            ));
        }
        let url = Url::parse(&self.connection_string).map_err(|e| {
            ConfigError::Validation(format!("store.connection_string is not a valid URL: {e}"))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "store.connection_string must use http or https, got '{}'",
                url.scheme()
            )));
        }

        for (field, table) in [
            ("value_table", &self.value_table),
            ("index_table", &self.index_table),
            ("tagged_table", &self.tagged_table),
        ] {
            if !is_table_name(table) {
                return Err(ConfigError::Validation(format!(
                    "store.{field} '{table}' is not a valid table name"
                )));
            }
        }

        if self.value_table == self.index_table
            || self.value_table == self.tagged_table
            || self.index_table == self.tagged_table
        {
            return Err(ConfigError::Validation(
                "store.value_table, store.index_table and store.tagged_table must be distinct"
                    .into(),
            ));
        }

        if let Some(cluster) = self.cluster_name()
            && !is_cluster_name(cluster)
        {
            return Err(ConfigError::Validation(format!(
                "store.cluster '{cluster}' is not a valid cluster name"
            )));
        }

        if self.query_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "store.query_timeout_secs must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Table names are spliced into statements, so only plain identifiers
/// (optionally `database.table`) are accepted.
fn is_table_name(name: &str) -> bool {
    match name.split_once('.') {
        Some((db, table)) => is_identifier(db) && is_identifier(table),
        None => is_identifier(name),
    }
}

/// Cluster names are spliced into `ON CLUSTER`, so quoted forms may not
/// contain their own quote character or a statement separator.
fn is_cluster_name(name: &str) -> bool {
    if let Some(inner) = name
        .strip_prefix('`')
        .and_then(|rest| rest.strip_suffix('`'))
    {
        return !inner.is_empty() && !inner.contains(['`', ';']);
    }
    if let Some(inner) = name
        .strip_prefix('\'')
        .and_then(|rest| rest.strip_suffix('\''))
    {
        return !inner.is_empty() && !inner.contains(['\'', ';', '\\']);
    }
    is_identifier(name)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
