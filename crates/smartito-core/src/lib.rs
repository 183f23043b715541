pub mod config;
pub mod error;
pub mod safety;
pub mod types;

pub use config::{MarketConfig, SmartitoConfig};
pub use error::{Result, SmartitoError};
pub use safety::{GateWarning, SqlCandidate, SqlSafetyGate, ValidationResult};
pub use types::*;
