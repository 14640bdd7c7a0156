//! Retention daemon for graphite-clickhouse.
//!
//! Removes series whose most recent write is older than a configured age
//! from the value table and from the plain and tagged index tables.

pub mod config;
pub mod observability;
pub mod retention;
pub mod store;
