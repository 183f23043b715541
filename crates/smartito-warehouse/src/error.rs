use thiserror::Error;

/// Errors raised while running a query against the warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Failed to open warehouse: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Warehouse busy or timed out: {0}")]
    Busy(String),

    #[error("Warehouse unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for WarehouseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                WarehouseError::Busy(err.to_string())
            }
            _ => WarehouseError::Query(err.to_string()),
        }
    }
}

impl From<WarehouseError> for smartito_core::SmartitoError {
    fn from(err: WarehouseError) -> Self {
        smartito_core::SmartitoError::Warehouse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_display() {
        let err = WarehouseError::Query("no such column: foo".into());
        assert_eq!(err.to_string(), "Query failed: no such column: foo");
    }

    #[test]
    fn test_rusqlite_error_conversion() {
        let err: WarehouseError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, WarehouseError::Query(_)));
    }

    #[test]
    fn test_into_core_error() {
        let err: smartito_core::SmartitoError = WarehouseError::Open("missing".into()).into();
        assert!(matches!(err, smartito_core::SmartitoError::Warehouse(_)));
    }
}
