//! A number of utilities useful for testing the checkpoint reader across crates.

use std::collections::HashMap;
use std::sync::Arc;

use arrow_array::RecordBatch;
use arrow_schema::Schema as ArrowSchema;
use bytes::Bytes;
use itertools::Itertools;
use parquet::arrow::arrow_writer::ArrowWriter;
use parquet::file::properties::WriterProperties;

use delta_checkpoint::actions::{FormatEntry, MetadataEntry, ProtocolEntry};
use delta_checkpoint::schema::StructType;

/// Decode newline-separated JSON rows into a record batch of the given checkpoint row type.
/// Actions a row does not mention stay null, so `{}` makes a row that carries nothing.
pub fn checkpoint_batch(row_type: &StructType, json_rows: &[&str]) -> RecordBatch {
    let arrow_schema: ArrowSchema = row_type
        .try_into()
        .expect("checkpoint row type converts to an arrow schema");
    let json = json_rows.iter().join("\n");
    let mut decoded = arrow_json::ReaderBuilder::new(Arc::new(arrow_schema))
        .build(std::io::Cursor::new(json.into_bytes()))
        .expect("build json reader")
        .collect::<Result<Vec<_>, _>>()
        .expect("decode json rows");
    assert_eq!(decoded.len(), 1, "expected one batch of rows");
    decoded.remove(0)
}

/// Write batches into an in-memory Parquet checkpoint file, one row group per batch, with
/// column statistics enabled so row-group pruning has something to work with.
pub fn write_checkpoint_file(batches: &[RecordBatch]) -> Bytes {
    let schema = batches
        .first()
        .expect("at least one batch to write")
        .schema();
    let mut buffer = Vec::new();
    let properties = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(&mut buffer, schema, Some(properties))
        .expect("create parquet writer");
    for batch in batches {
        writer.write(batch).expect("write checkpoint batch");
        // one row group per batch keeps pruning behavior deterministic
        writer.flush().expect("flush row group");
    }
    writer.close().expect("close parquet writer");
    Bytes::from(buffer)
}

/// A metadata entry for a table with the given schema string and partition columns
pub fn metadata_entry(schema_string: &str, partition_columns: &[&str]) -> MetadataEntry {
    MetadataEntry {
        id: "5fba94ed-9794-4965-ba6e-6ee3c0d22af9".to_string(),
        name: None,
        description: None,
        format: FormatEntry {
            provider: "parquet".to_string(),
            options: HashMap::new(),
        },
        schema_string: schema_string.to_string(),
        partition_columns: partition_columns.iter().map(|c| c.to_string()).collect(),
        configuration: HashMap::new(),
        created_time: Some(1587968585495),
    }
}

/// A protocol entry with no table features
pub fn basic_protocol_entry() -> ProtocolEntry {
    ProtocolEntry::new(1, 2)
}

/// A protocol entry with the `deletionVectors` reader and writer feature
pub fn deletion_vector_protocol_entry() -> ProtocolEntry {
    ProtocolEntry {
        min_reader_version: 3,
        min_writer_version: 7,
        reader_features: Some(["deletionVectors".to_string()].into()),
        writer_features: Some(["deletionVectors".to_string()].into()),
    }
}
