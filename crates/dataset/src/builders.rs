//! Build Arrow text columns from the string fields of a landed increment.

use std::sync::Arc;

use arrow::array::{ArrayRef, LargeStringBuilder};
use arrow::datatypes::{Field, Schema};

use eventlake_core::ColumnType;

use crate::schema::LOGICAL_TYPE_KEY;

/// One growing column. Non-empty fields are stored verbatim, empty fields
/// become NULL. The logical type is only checked, never applied.
struct ColumnBuilder {
    logical: ColumnType,
    values: LargeStringBuilder,
}

impl ColumnBuilder {
    fn for_field(field: &Field, capacity: usize) -> Self {
        let logical = field
            .metadata()
            .get(LOGICAL_TYPE_KEY)
            .and_then(|name| ColumnType::from_name(name))
            .unwrap_or(ColumnType::Utf8);
        Self {
            logical,
            values: LargeStringBuilder::with_capacity(capacity, capacity * 16),
        }
    }

    /// Append one raw field. Returns `false` when the value does not read as
    /// the column's logical type; it is stored as-is regardless.
    fn append(&mut self, raw: &str) -> bool {
        if raw.is_empty() {
            self.values.append_null();
            return true;
        }
        self.values.append_value(raw);
        self.logical.accepts(raw)
    }

    fn finish(&mut self) -> ArrayRef {
        Arc::new(self.values.finish())
    }
}

/// Row-at-a-time builder for a whole batch.
pub(crate) struct BatchBuilder {
    columns: Vec<ColumnBuilder>,
    rows: usize,
    nonconforming: u64,
}

impl BatchBuilder {
    pub(crate) fn new(schema: &Schema, capacity: usize) -> Self {
        Self {
            columns: schema
                .fields()
                .iter()
                .map(|f| ColumnBuilder::for_field(f, capacity))
                .collect(),
            rows: 0,
            nonconforming: 0,
        }
    }

    pub(crate) fn width(&self) -> usize {
        self.columns.len()
    }

    /// Append a row. The caller guarantees `fields` has exactly `width()` items.
    pub(crate) fn append_row<'a>(&mut self, fields: impl IntoIterator<Item = &'a str>) {
        for (builder, raw) in self.columns.iter_mut().zip(fields) {
            if !builder.append(raw) {
                self.nonconforming += 1;
            }
        }
        self.rows += 1;
    }

    pub(crate) fn rows(&self) -> usize {
        self.rows
    }

    /// Number of stored values that do not read as their column's logical type.
    pub(crate) fn nonconforming(&self) -> u64 {
        self.nonconforming
    }

    pub(crate) fn finish(mut self) -> Vec<ArrayRef> {
        self.columns.iter_mut().map(ColumnBuilder::finish).collect()
    }
}
