//! Scripted warehouse for tests: returns queued responses in order and keeps
//! a log of every query it received.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::WarehouseError;
use crate::{Row, Warehouse};

#[derive(Default)]
pub struct MockWarehouse {
    responses: Mutex<VecDeque<Result<Vec<Row>, WarehouseError>>>,
    calls: Mutex<Vec<String>>,
}

impl MockWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&self, rows: Vec<Row>) -> &Self {
        self.push(Ok(rows))
    }

    pub fn push_error(&self, error: WarehouseError) -> &Self {
        self.push(Err(error))
    }

    fn push(&self, response: Result<Vec<Row>, WarehouseError>) -> &Self {
        if let Ok(mut responses) = self.responses.lock() {
            responses.push_back(response);
        }
        self
    }

    /// Every query received, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Warehouse for MockWarehouse {
    async fn execute(&self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        self.calls
            .lock()
            .map_err(|e| WarehouseError::Unavailable(format!("Lock poisoned: {}", e)))?
            .push(sql.to_string());

        self.responses
            .lock()
            .map_err(|e| WarehouseError::Unavailable(format!("Lock poisoned: {}", e)))?
            .pop_front()
            .unwrap_or_else(|| Err(WarehouseError::Unavailable("no scripted response".into())))
    }
}
