pub mod config;
pub mod error;
pub mod schema;
pub mod snapshot;

pub use config::Config;
pub use error::*;
pub use schema::{Column, ColumnType, TableSchema};
pub use snapshot::{LedgerEntry, SnapshotPointer};
