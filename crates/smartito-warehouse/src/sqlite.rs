//! SQLite adapter over a local replica of the funnel table.
//!
//! The replica is attached read-only. When the configured table name carries
//! a schema qualifier (`amplitude.funnels_resumido`) the file is attached
//! under that schema name so generated SQL runs unchanged.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::WarehouseError;
use crate::schema::schema_name;
use crate::{Row, Warehouse};

/// Hard cap on rows returned to the analyst.
pub const MAX_ROWS: usize = 5_000;

/// Read-only SQLite warehouse.
///
/// The connection lives behind a Mutex since rusqlite `Connection` is not
/// Sync; queries run on the blocking thread pool.
#[derive(Clone)]
pub struct SqliteWarehouse {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteWarehouse {
    /// Open the replica at `path` for the given (possibly qualified) table.
    pub fn open(path: &Path, table: &str, busy_timeout: Duration) -> Result<Self, WarehouseError> {
        if !path.exists() {
            return Err(WarehouseError::Open(format!(
                "{} does not exist",
                path.display()
            )));
        }

        let conn = match schema_name(table) {
            Some(schema) => {
                if !schema.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                    return Err(WarehouseError::Open(format!(
                        "invalid schema name: {}",
                        schema
                    )));
                }
                let conn = Connection::open_in_memory()
                    .map_err(|e| WarehouseError::Open(e.to_string()))?;
                let uri = format!("file:{}?mode=ro", path.display());
                conn.execute("ATTACH DATABASE ?1 AS ?2", [uri.as_str(), schema])
                    .map_err(|e| WarehouseError::Open(format!("Failed to attach replica: {}", e)))?;
                conn
            }
            None => Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
            .map_err(|e| WarehouseError::Open(e.to_string()))?,
        };

        conn.busy_timeout(busy_timeout)
            .map_err(|e| WarehouseError::Open(e.to_string()))?;
        conn.execute_batch("PRAGMA query_only = ON;")
            .map_err(|e| WarehouseError::Open(format!("Failed to set pragmas: {}", e)))?;

        info!("Warehouse replica opened at {}", path.display());

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

fn run_query(conn: &Connection, sql: &str) -> Result<Vec<Row>, WarehouseError> {
    let mut stmt = conn.prepare(sql)?;
    let names: Vec<String> = stmt.column_names().iter().map(|n| n.to_string()).collect();

    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        if out.len() >= MAX_ROWS {
            warn!("Result truncated at {} rows", MAX_ROWS);
            break;
        }
        let mut record = Row::new();
        for (i, name) in names.iter().enumerate() {
            record.push(name.clone(), json_value(row.get_ref(i)?));
        }
        out.push(record);
    }
    Ok(out)
}

#[async_trait]
impl Warehouse for SqliteWarehouse {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        let conn = Arc::clone(&self.conn);
        let sql = sql.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            let conn = conn
                .lock()
                .map_err(|e| WarehouseError::Unavailable(format!("Database lock poisoned: {}", e)))?;
            run_query(&conn, &sql)
        })
        .await
        .map_err(|e| WarehouseError::Unavailable(format!("Query task failed: {}", e)))??;

        debug!(rows = rows.len(), "Warehouse query completed");
        Ok(rows)
    }
}

impl std::fmt::Debug for SqliteWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteWarehouse").finish()
    }
}
