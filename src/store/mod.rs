//! Store gateway for the columnar time-series store.
//!
//! The gateway executes parametrized statements and applies two policies
//! uniformly to every mutation:
//! - the cluster-scope modifier (`ON CLUSTER <name>`) when a cluster is configured
//! - dry-run suppression, which logs the statement instead of executing it
//!
//! Connections are scoped: [`StoreGateway::open`] returns a [`Session`] that
//! releases its connection when closed or dropped, on every exit path.

mod clickhouse;
#[cfg(test)]
pub(crate) mod fake;
mod statement;

use std::sync::Arc;

use async_trait::async_trait;
pub use clickhouse::{ClickHouseConnection, ClickHouseConnector};
use serde::de::DeserializeOwned;
pub use statement::{Param, Statement};

use crate::config::StoreConfig;

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The store is unreachable or failed its liveness probe.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A read failed or returned rows that could not be decoded.
    #[error("Query error on {table}: {message}")]
    Query { table: String, message: String },

    /// A mutating statement failed to execute.
    #[error("Mutation error on {table}: {message}")]
    Mutation { table: String, message: String },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Opens connections to the store.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> StoreResult<Box<dyn Connection>>;
}

/// One live connection to the store.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Liveness probe; fails with [`StoreError::Connection`].
    async fn ping(&self) -> StoreResult<()>;

    /// Run a read and return one JSON object per result row.
    async fn query(&self, statement: &Statement) -> StoreResult<Vec<serde_json::Value>>;

    /// Run a mutating statement.
    async fn execute(&self, statement: &Statement) -> StoreResult<()>;

    /// Release the connection. Must be idempotent.
    fn close(&mut self);
}

/// Executes statements against the store with cluster and dry-run policy.
///
/// Knows nothing about retention; callers build the statements.
#[derive(Clone)]
pub struct StoreGateway {
    connector: Arc<dyn Connector>,
    cluster: Option<String>,
    dry_run: bool,
}

impl StoreGateway {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            cluster: None,
            dry_run: false,
        }
    }

    /// Build a gateway talking to ClickHouse over HTTP.
    pub fn from_config(config: &StoreConfig, dry_run: bool) -> StoreResult<Self> {
        let connector = ClickHouseConnector::from_config(config)?;
        Ok(Self::new(Arc::new(connector))
            .with_cluster(config.cluster_name().map(str::to_string))
            .with_dry_run(dry_run))
    }

    pub fn with_cluster(mut self, cluster: Option<String>) -> Self {
        self.cluster = cluster.filter(|c| !c.is_empty());
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The cluster-scope modifier for mutating statements.
    ///
    /// Empty when no cluster is configured (single-node mode).
    pub fn cluster_clause(&self) -> String {
        match &self.cluster {
            Some(cluster) => format!("ON CLUSTER {cluster}"),
            None => String::new(),
        }
    }

    /// Acquire a connection and verify it with a liveness probe.
    ///
    /// A connection that fails the probe is closed before the error is returned.
    pub async fn open(&self) -> StoreResult<Session<'_>> {
        let mut connection = self.connector.connect().await?;
        if let Err(e) = connection.ping().await {
            connection.close();
            tracing::debug!(error = %e, "Store liveness check failed");
            return Err(e);
        }
        tracing::debug!("Store connection opened");
        Ok(Session {
            gateway: self,
            connection: Some(connection),
        })
    }
}

/// A scoped store connection. Closed on drop.
pub struct Session<'g> {
    gateway: &'g StoreGateway,
    connection: Option<Box<dyn Connection>>,
}

impl Session<'_> {
    fn connection(&self) -> StoreResult<&dyn Connection> {
        self.connection
            .as_deref()
            .ok_or_else(|| StoreError::Connection("session is closed".into()))
    }

    /// Run a read and decode every row into `T`.
    pub async fn read<T: DeserializeOwned>(&self, statement: &Statement) -> StoreResult<Vec<T>> {
        let connection = self.connection()?;
        log_statement(statement, false);

        let rows = connection.query(statement).await?;
        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row).map_err(|e| StoreError::Query {
                    table: statement.table().to_string(),
                    message: format!("malformed result row: {e}"),
                })
            })
            .collect()
    }

    /// Run a mutating statement, or only log it in dry-run mode.
    pub async fn mutate(&self, statement: &Statement) -> StoreResult<()> {
        let connection = self.connection()?;
        log_statement(statement, self.gateway.dry_run);

        if self.gateway.dry_run {
            return Ok(());
        }
        connection.execute(statement).await
    }

    pub fn is_dry_run(&self) -> bool {
        self.gateway.dry_run
    }

    pub fn cluster_clause(&self) -> String {
        self.gateway.cluster_clause()
    }

    /// Release the connection. Safe to call more than once.
    pub fn close(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
            tracing::debug!("Store connection closed");
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// The logged form of a statement: its SQL text and its bound parameters
/// as `name=value` pairs. Dry-run and real execution log the same form.
fn render_statement(statement: &Statement) -> (&str, String) {
    let params = statement
        .params()
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect::<Vec<_>>()
        .join(", ");
    (statement.sql(), params)
}

fn log_statement(statement: &Statement, dry_run: bool) {
    let (query, params) = render_statement(statement);

    if dry_run {
        tracing::info!(
            table = %statement.table(),
            query = %query,
            params = %params,
            dry_run = true,
            "DRY RUN: Would execute SQL statement"
        );
    } else {
        tracing::info!(
            table = %statement.table(),
            query = %query,
            params = %params,
            "Executing SQL statement"
        );
    }
}
