//! In-memory store used by unit tests.
//!
//! Models the three graphite tables closely enough to answer discovery reads
//! and apply the retention deletes, keyed off statement tables and bound
//! parameters rather than SQL text. Every connect, close, read and executed
//! mutation is recorded, and failures can be injected per table.

use std::{
    collections::{BTreeMap, HashSet},
    io,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::json;
use tracing_subscriber::fmt::MakeWriter;

use super::{Connection, Connector, Param, Statement, StoreError, StoreResult};

pub const VALUE_TABLE: &str = "graphite";
pub const INDEX_TABLE: &str = "graphite_index";
pub const TAGGED_TABLE: &str = "graphite_tagged";

#[derive(Default)]
struct FakeState {
    /// table -> (path, version)
    index: BTreeMap<String, Vec<(String, u32)>>,
    /// table -> (path, date)
    values: BTreeMap<String, Vec<(String, NaiveDate)>>,
    connects: usize,
    closes: usize,
    reads: Vec<Statement>,
    executed: Vec<Statement>,
    fail_connect: bool,
    fail_ping: bool,
    fail_read: HashSet<String>,
    fail_execute: HashSet<String>,
    malformed: HashSet<String>,
}

impl FakeState {
    fn obsolete_paths(&self, table: &str, max_version: u32) -> BTreeMap<String, u32> {
        let mut latest: BTreeMap<String, u32> = BTreeMap::new();
        for (path, version) in self.index.get(table).into_iter().flatten() {
            let entry = latest.entry(path.clone()).or_insert(*version);
            *entry = (*entry).max(*version);
        }
        latest.retain(|_, version| *version <= max_version);
        latest
    }

    fn apply(&mut self, statement: &Statement) {
        let table = statement.table().to_string();
        if table == VALUE_TABLE {
            let (Some(date), Some(plain), Some(tagged)) = (
                date_param(statement, "date"),
                version_param(statement, "plain_version"),
                version_param(statement, "tagged_version"),
            ) else {
                return;
            };
            let mut doomed: HashSet<String> =
                self.obsolete_paths(INDEX_TABLE, plain).into_keys().collect();
            doomed.extend(self.obsolete_paths(TAGGED_TABLE, tagged).into_keys());
            if let Some(rows) = self.values.get_mut(&table) {
                rows.retain(|(path, row_date)| !(*row_date <= date && doomed.contains(path)));
            }
        } else if let (Some(date), Some(max_version)) = (
            date_param(statement, "date"),
            version_param(statement, "max_version"),
        ) {
            let doomed = self.obsolete_paths(&table, max_version);
            if let Some(rows) = self.index.get_mut(&table) {
                rows.retain(|(path, version)| {
                    !(doomed.contains_key(path) && version_date(*version) <= date)
                });
            }
        }
    }
}

fn version_param(statement: &Statement, name: &str) -> Option<u32> {
    match statement.param(name)? {
        Param::UInt32(v) => Some(*v),
        _ => None,
    }
}

fn date_param(statement: &Statement, name: &str) -> Option<NaiveDate> {
    match statement.param(name)? {
        Param::Date(d) => Some(*d),
        _ => None,
    }
}

fn version_date(version: u32) -> NaiveDate {
    DateTime::<Utc>::from_timestamp(i64::from(version), 0)
        .map(|dt| dt.date_naive())
        .unwrap_or_default()
}

/// Shared handle to the in-memory store.
#[derive(Clone, Default)]
pub struct FakeStore {
    state: Arc<Mutex<FakeState>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    /// Add an index row for `path` written at `version`.
    pub fn with_index_row(self, table: &str, path: &str, version: DateTime<Utc>) -> Self {
        self.state()
            .index
            .entry(table.to_string())
            .or_default()
            .push((path.to_string(), version.timestamp() as u32));
        self
    }

    /// Add a data point for `path` on `date`.
    pub fn with_value_row(self, path: &str, date: NaiveDate) -> Self {
        self.state()
            .values
            .entry(VALUE_TABLE.to_string())
            .or_default()
            .push((path.to_string(), date));
        self
    }

    pub fn fail_connect(self) -> Self {
        self.state().fail_connect = true;
        self
    }

    pub fn fail_ping(self) -> Self {
        self.state().fail_ping = true;
        self
    }

    pub fn fail_read_on(self, table: &str) -> Self {
        self.state().fail_read.insert(table.to_string());
        self
    }

    pub fn fail_execute_on(self, table: &str) -> Self {
        self.state().fail_execute.insert(table.to_string());
        self
    }

    /// Reads against `table` return rows that do not match the expected shape.
    pub fn with_malformed_rows(self, table: &str) -> Self {
        self.state().malformed.insert(table.to_string());
        self
    }

    /// Simulate a fresh write to `path` after the store was seeded.
    pub fn write(&self, table: &str, path: &str, version: DateTime<Utc>) {
        self.state()
            .index
            .entry(table.to_string())
            .or_default()
            .push((path.to_string(), version.timestamp() as u32));
    }

    pub fn connector(&self) -> Arc<dyn Connector> {
        Arc::new(self.clone())
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn closes(&self) -> usize {
        self.state().closes
    }

    pub fn reads(&self) -> Vec<Statement> {
        self.state().reads.clone()
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.state().executed.clone()
    }

    /// Tables that received at least one executed mutation, in order.
    pub fn mutated_tables(&self) -> Vec<String> {
        self.state()
            .executed
            .iter()
            .map(|s| s.table().to_string())
            .collect()
    }

    /// Distinct paths still present in an index table.
    pub fn index_paths(&self, table: &str) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state()
            .index
            .get(table)
            .into_iter()
            .flatten()
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Distinct paths that still have data points.
    pub fn value_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .state()
            .values
            .get(VALUE_TABLE)
            .into_iter()
            .flatten()
            .map(|(path, _)| path.clone())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }
}

#[async_trait]
impl Connector for FakeStore {
    async fn connect(&self) -> StoreResult<Box<dyn Connection>> {
        let mut state = self.state();
        state.connects += 1;
        if state.fail_connect {
            return Err(StoreError::Connection("connection refused".into()));
        }
        Ok(Box::new(FakeConnection {
            store: self.clone(),
            open: true,
        }))
    }
}

struct FakeConnection {
    store: FakeStore,
    open: bool,
}

#[async_trait]
impl Connection for FakeConnection {
    async fn ping(&self) -> StoreResult<()> {
        if self.store.state().fail_ping {
            return Err(StoreError::Connection("liveness probe failed".into()));
        }
        Ok(())
    }

    async fn query(&self, statement: &Statement) -> StoreResult<Vec<serde_json::Value>> {
        let mut state = self.store.state();
        state.reads.push(statement.clone());

        let table = statement.table();
        if state.fail_read.contains(table) {
            return Err(StoreError::Query {
                table: table.to_string(),
                message: "injected read failure".into(),
            });
        }
        if state.malformed.contains(table) {
            return Ok(vec![json!({ "Path": 42, "MaxVersion": "yesterday" })]);
        }

        let max_version = version_param(statement, "max_version").unwrap_or(u32::MAX);
        Ok(state
            .obsolete_paths(table, max_version)
            .into_iter()
            .map(|(path, version)| json!({ "Path": path, "MaxVersion": version }))
            .collect())
    }

    async fn execute(&self, statement: &Statement) -> StoreResult<()> {
        let mut state = self.store.state();
        let table = statement.table();
        if state.fail_execute.contains(table) {
            return Err(StoreError::Mutation {
                table: table.to_string(),
                message: "injected mutation failure".into(),
            });
        }
        state.executed.push(statement.clone());
        state.apply(statement);
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            self.store.state().closes += 1;
        }
    }
}

/// Collects formatted log output.
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
