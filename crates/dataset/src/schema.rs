//! Canonical column schema to Arrow schema mapping.
//!
//! Every field is stored as the verbatim text of the landed file so that
//! duplicate elimination compares exact bytes. The declared logical type is
//! kept in the field metadata under [`LOGICAL_TYPE_KEY`] for readers that
//! want to cast.

use std::collections::HashMap;
use std::sync::Arc;

use arrow::compute::{can_cast_types, cast};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::record_batch::RecordBatch;

use eventlake_core::{IngestError, TableSchema};

/// Field metadata key holding the column's logical type.
pub const LOGICAL_TYPE_KEY: &str = "eventlake.type";

/// Physical type of every stored column. 64-bit offsets, so a single column
/// is not capped at 2 GiB of text.
pub const STORAGE_TYPE: DataType = DataType::LargeUtf8;

/// Build an Arrow [`Schema`] from the canonical table schema. Every column is nullable.
pub fn arrow_schema(schema: &TableSchema) -> SchemaRef {
    let fields: Vec<Field> = schema
        .columns()
        .iter()
        .map(|col| {
            Field::new(&col.name, STORAGE_TYPE, true).with_metadata(HashMap::from([(
                LOGICAL_TYPE_KEY.to_string(),
                col.column_type.as_str().to_string(),
            )]))
        })
        .collect();
    Arc::new(Schema::new(fields))
}

/// Re-label a batch read back from disk with the canonical schema.
///
/// The batch must have the same column count; names are taken from `schema`.
/// Columns written with another type (typed or 32-bit offset text) are cast
/// to the storage type.
pub(crate) fn conform(batch: RecordBatch, schema: &SchemaRef) -> Result<RecordBatch, IngestError> {
    let expected = schema.fields().len();
    if batch.num_columns() != expected {
        return Err(IngestError::SchemaMismatch {
            line: 0,
            expected,
            found: batch.num_columns(),
        });
    }

    let mut columns = Vec::with_capacity(expected);
    for (idx, field) in schema.fields().iter().enumerate() {
        let column = batch.column(idx);
        if column.data_type() == field.data_type() {
            columns.push(column.clone());
            continue;
        }
        if !can_cast_types(column.data_type(), field.data_type()) {
            return Err(IngestError::Parquet(format!(
                "column {} ({}) has type {}, expected {}",
                idx,
                field.name(),
                column.data_type(),
                field.data_type()
            )));
        }
        columns.push(
            cast(column, field.data_type()).map_err(|e| IngestError::Parquet(e.to_string()))?,
        );
    }

    RecordBatch::try_new(schema.clone(), columns).map_err(|e| IngestError::Parquet(e.to_string()))
}
