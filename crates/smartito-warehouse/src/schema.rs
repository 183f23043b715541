//! Column catalogue and fixture helpers for the funnel table.
//!
//! The catalogue feeds the Data-Analyst's `get_schema_info` tool and its
//! system prompt. The fixture helpers build a local SQLite replica with the
//! same shape, used by tests and by `smartito seed`.

use std::path::Path;

use rusqlite::{params, Connection};
use tracing::info;

use crate::error::WarehouseError;

/// One column of the funnel table.
#[derive(Debug, Clone, Copy)]
pub struct ColumnInfo {
    pub name: &'static str,
    pub data_type: &'static str,
    pub description: &'static str,
}

pub const FUNNEL_COLUMNS: &[ColumnInfo] = &[
    ColumnInfo {
        name: "date",
        data_type: "date",
        description: "Day of the data (YYYY-MM-DD)",
    },
    ColumnInfo {
        name: "culture",
        data_type: "text",
        description: "Market/country code (BR, CL, PE, PY, US, CO, AR, EC, UY)",
    },
    ColumnInfo {
        name: "device",
        data_type: "text",
        description: "Device type (desktop, mobile)",
    },
    ColumnInfo {
        name: "traffic_type",
        data_type: "text",
        description: "Traffic source (Organico, Pagado, Promoted)",
    },
    ColumnInfo {
        name: "traffic",
        data_type: "integer",
        description: "Website traffic count",
    },
    ColumnInfo {
        name: "flight_dom_loaded_flight",
        data_type: "integer",
        description: "Domestic flight page loads",
    },
    ColumnInfo {
        name: "payment_confirmation_loaded",
        data_type: "integer",
        description: "Payment confirmation page views",
    },
    ColumnInfo {
        name: "median_time_seconds",
        data_type: "numeric",
        description: "Median completion time in seconds",
    },
    ColumnInfo {
        name: "median_time_minutes",
        data_type: "numeric",
        description: "Median completion time in minutes",
    },
];

/// JSON description of the table, returned by the `get_schema_info` tool.
pub fn schema_info(table: &str, current_date: &str) -> serde_json::Value {
    let columns: serde_json::Map<String, serde_json::Value> = FUNNEL_COLUMNS
        .iter()
        .map(|c| {
            (
                c.name.to_string(),
                serde_json::json!({ "type": c.data_type, "description": c.description }),
            )
        })
        .collect();
    serde_json::json!({
        "table": table,
        "description": "Daily aggregated airline website funnel data by culture, device, and traffic type",
        "granularity": "One row per day, culture, device, and traffic type combination",
        "columns": columns,
        "current_date": current_date,
    })
}

/// Bulleted column list for prompts.
pub fn column_summary() -> String {
    FUNNEL_COLUMNS
        .iter()
        .map(|c| format!("- `{}` ({}): {}", c.name, c.data_type, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One row of the funnel table.
#[derive(Debug, Clone, PartialEq)]
pub struct FunnelRecord {
    pub date: String,
    pub culture: String,
    pub device: String,
    pub traffic_type: String,
    pub traffic: i64,
    pub flight_dom_loaded_flight: i64,
    pub payment_confirmation_loaded: i64,
    pub median_time_seconds: f64,
}

/// Create (or open) a SQLite file holding the funnel table and insert the
/// given records. The table is named after the last segment of `table`.
pub fn create_funnel_table(
    path: &Path,
    table: &str,
    records: &[FunnelRecord],
) -> Result<(), WarehouseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| WarehouseError::Open(e.to_string()))?;
    }
    let name = table_name(table);
    let mut conn = Connection::open(path)
        .map_err(|e| WarehouseError::Open(format!("Failed to open database: {}", e)))?;

    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {name} (
            date                        TEXT NOT NULL,
            culture                     TEXT NOT NULL,
            device                      TEXT NOT NULL
                                        CHECK (device IN ('desktop', 'mobile')),
            traffic_type                TEXT NOT NULL
                                        CHECK (traffic_type IN ('Organico', 'Pagado', 'Promoted')),
            traffic                     INTEGER NOT NULL DEFAULT 0,
            flight_dom_loaded_flight    INTEGER NOT NULL DEFAULT 0,
            payment_confirmation_loaded INTEGER NOT NULL DEFAULT 0,
            median_time_seconds         REAL,
            median_time_minutes         REAL
        );

        CREATE INDEX IF NOT EXISTS idx_{name}_date_culture
            ON {name} (date, culture);",
    ))?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(&format!(
            "INSERT INTO {name} (date, culture, device, traffic_type, traffic,
                flight_dom_loaded_flight, payment_confirmation_loaded,
                median_time_seconds, median_time_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
        ))?;
        for r in records {
            stmt.execute(params![
                r.date,
                r.culture,
                r.device,
                r.traffic_type,
                r.traffic,
                r.flight_dom_loaded_flight,
                r.payment_confirmation_loaded,
                r.median_time_seconds,
                r.median_time_seconds / 60.0,
            ])?;
        }
    }
    tx.commit()?;

    info!(
        "Funnel table {} written to {} ({} rows)",
        name,
        path.display(),
        records.len()
    );
    Ok(())
}

/// Last dotted segment of a qualified table name.
pub fn table_name(table: &str) -> &str {
    table.rsplit('.').next().unwrap_or(table)
}

/// Schema qualifier of a table name, if any.
pub fn schema_name(table: &str) -> Option<&str> {
    table.rsplit_once('.').map(|(schema, _)| schema)
}
