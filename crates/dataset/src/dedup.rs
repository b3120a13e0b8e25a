//! Full-row duplicate elimination.

use std::collections::HashSet;

use arrow::array::UInt32Array;
use arrow::compute::{concat_batches, take_record_batch};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow::row::{RowConverter, SortField};

use eventlake_core::IngestError;

fn arrow_err(e: arrow::error::ArrowError) -> IngestError {
    IngestError::Parquet(e.to_string())
}

/// Drop rows that are identical to an earlier row across every column,
/// keeping the first occurrence and the relative order of survivors.
///
/// Rows are compared through Arrow's row format, so two NULLs compare equal
/// and floats compare by their bit pattern.
pub fn dedup_rows(batch: &RecordBatch) -> Result<RecordBatch, IngestError> {
    if batch.num_rows() == 0 {
        return Ok(batch.clone());
    }

    let sort_fields: Vec<SortField> = batch
        .schema()
        .fields()
        .iter()
        .map(|f| SortField::new(f.data_type().clone()))
        .collect();
    let converter = RowConverter::new(sort_fields).map_err(arrow_err)?;
    let rows = converter.convert_columns(batch.columns()).map_err(arrow_err)?;

    let mut seen = HashSet::with_capacity(rows.num_rows());
    let mut keep: Vec<u32> = Vec::with_capacity(rows.num_rows());
    for (idx, row) in rows.iter().enumerate() {
        if seen.insert(row) {
            keep.push(idx as u32);
        }
    }

    if keep.len() == batch.num_rows() {
        return Ok(batch.clone());
    }
    take_record_batch(batch, &UInt32Array::from(keep)).map_err(arrow_err)
}

/// Existing rows first, then the increment, then dedup over the concatenation.
pub fn merge_dedup(
    schema: &SchemaRef,
    existing: Option<&RecordBatch>,
    increment: &RecordBatch,
) -> Result<RecordBatch, IngestError> {
    let combined = match existing {
        Some(existing) => concat_batches(schema, [existing, increment]).map_err(arrow_err)?,
        None => increment.clone(),
    };
    dedup_rows(&combined)
}
