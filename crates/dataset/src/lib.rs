//! Columnar side of the ingestion pipeline.
//!
//! Loads landed TSV increments into Arrow batches of verbatim text, removes
//! full-row duplicates and keeps the merged result in a single Zstd-compressed Parquet
//! file that is only ever replaced through a temp file and a rename.

pub(crate) mod builders;
pub mod dedup;
pub mod increment;
pub mod schema;
pub mod store;

pub use dedup::{dedup_rows, merge_dedup};
pub use increment::load_increment;
pub use schema::{arrow_schema, LOGICAL_TYPE_KEY, STORAGE_TYPE};
pub use store::{DatasetStore, MergeStats, LAST_IDENTIFIER_KEY};
