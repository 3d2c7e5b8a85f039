pub mod config;
pub mod data;
pub mod error;
pub mod report;

pub use error::{ColumnRole, EngineError, Result};
