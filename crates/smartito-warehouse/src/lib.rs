//! Smartito warehouse crate - read-only query execution.
//!
//! Exposes the [`Warehouse`] trait ("run query, get rows"), a SQLite adapter
//! over a local replica of the funnel table, a scripted mock for tests, and
//! the table's column catalogue.

pub mod error;
pub mod mock;
pub mod schema;
pub mod sqlite;

use async_trait::async_trait;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;

pub use error::WarehouseError;
pub use mock::MockWarehouse;
pub use sqlite::SqliteWarehouse;

/// One result row: column names and values in select-list order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    values: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a column. Duplicate names are kept; [`Row::get`] returns the
    /// first match.
    pub fn push(&mut self, column: impl Into<String>, value: Value) {
        self.values.push((column.into(), value));
    }

    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, v)| v)
    }

    /// Numeric value of a column, if it holds a number.
    pub fn get_f64(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(Value::as_f64)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(name, v)| (name.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in &self.values {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Read-only query execution.
///
/// Implementations receive only text that already passed the safety gate.
#[async_trait]
pub trait Warehouse: Send + Sync {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WarehouseError>;
}
