//! Loading of a landed increment: headerless, tab-separated, fixed width.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use eventlake_core::IngestError;

use crate::builders::BatchBuilder;

const FIELD_DELIMITER: u8 = b'\t';

/// Read a landed TSV file into a single batch shaped by `schema`.
///
/// Field text is kept byte for byte; only empty fields become NULL.
///
/// Every row must carry exactly `schema.fields().len()` fields; the first row
/// that does not fails the whole load with [`IngestError::SchemaMismatch`].
/// Quotes have no special meaning in the feed, so quoting is disabled.
pub fn load_increment(path: &Path, schema: &SchemaRef) -> Result<RecordBatch, IngestError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(FIELD_DELIMITER)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .from_reader(BufReader::new(file));

    let mut builder = BatchBuilder::new(schema, 4096);
    let mut record = csv::StringRecord::new();

    loop {
        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => return Err(csv_error(e, path)),
        }
        if record.len() != builder.width() {
            let line = record
                .position()
                .map(|p| p.line())
                .unwrap_or(builder.rows() as u64 + 1);
            return Err(IngestError::SchemaMismatch {
                line,
                expected: builder.width(),
                found: record.len(),
            });
        }
        builder.append_row(record.iter());
    }

    let rows = builder.rows();
    if builder.nonconforming() > 0 {
        debug!(
            path = %path.display(),
            values = builder.nonconforming(),
            "values not matching their column type kept as text"
        );
    }

    let batch = RecordBatch::try_new(schema.clone(), builder.finish())
        .map_err(|e| IngestError::Parquet(e.to_string()))?;

    info!(path = %path.display(), rows, "loaded increment");
    Ok(batch)
}

fn csv_error(e: csv::Error, path: &Path) -> IngestError {
    if e.is_io_error() {
        if let csv::ErrorKind::Io(io) = e.into_kind() {
            return IngestError::Io(io);
        }
        return IngestError::Io(std::io::Error::other(format!("reading {}", path.display())));
    }
    IngestError::Io(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}: {}", path.display(), e),
    ))
}
