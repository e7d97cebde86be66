//! Resolves the logical row type to project for each requested action kind.
//!
//! The fixed kinds always look the same; `add` depends on the table: its partition columns give
//! `partitionvalues_parsed` its shape, its data columns give `stats_parsed` its shape, and the
//! protocol decides whether a `deletionVector` sub-row is expected at all.

use std::sync::{Arc, LazyLock};

use crate::actions::deletion_vector::deletion_vector_type;
use crate::actions::{MetadataEntry, ProtocolEntry};
use crate::pushdown::PARTITION_VALUES_PARSED_NAME;
use crate::schema::{DataType, PrimitiveType, SchemaRef, StructField, StructType};
use crate::stats::StatsColumnFilter;
use crate::DeltaResult;

/// Produces, for each action kind, the row type the Parquet reader should project and the field
/// reader should decode against.
pub trait CheckpointSchemaManager {
    fn txn_entry_type(&self) -> SchemaRef;

    /// The `add` row type. Requires the table metadata (for partition and data columns) and
    /// protocol; `with_parsed_stats` controls whether a `stats_parsed` sub-row is expected,
    /// `with_deletion_vector` whether a `deletionVector` sub-row is, and
    /// `with_physical_column_stats` whether row-typed statistics columns are carried for
    /// write-through.
    fn add_entry_type(
        &self,
        metadata: &MetadataEntry,
        protocol: &ProtocolEntry,
        stats_filter: &StatsColumnFilter,
        with_parsed_stats: bool,
        with_deletion_vector: bool,
        with_physical_column_stats: bool,
    ) -> DeltaResult<SchemaRef>;

    fn remove_entry_type(&self, with_deletion_vector: bool) -> SchemaRef;

    fn metadata_entry_type(&self) -> SchemaRef;

    fn protocol_entry_type(
        &self,
        with_reader_features: bool,
        with_writer_features: bool,
    ) -> SchemaRef;

    fn sidecar_entry_type(&self) -> SchemaRef;
}

static TXN_ENTRY_TYPE: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(StructType::new([
        StructField::nullable("appId", DataType::STRING),
        StructField::nullable("version", DataType::LONG),
        StructField::nullable("lastUpdated", DataType::LONG),
    ]))
});

static METADATA_ENTRY_TYPE: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(StructType::new([
        StructField::nullable("id", DataType::STRING),
        StructField::nullable("name", DataType::STRING),
        StructField::nullable("description", DataType::STRING),
        StructField::nullable(
            "format",
            StructType::new([
                StructField::nullable("provider", DataType::STRING),
                StructField::nullable("options", DataType::string_map()),
            ]),
        ),
        StructField::nullable("schemaString", DataType::STRING),
        StructField::nullable("partitionColumns", DataType::string_list()),
        StructField::nullable("configuration", DataType::string_map()),
        StructField::nullable("createdTime", DataType::LONG),
    ]))
});

static SIDECAR_ENTRY_TYPE: LazyLock<SchemaRef> = LazyLock::new(|| {
    Arc::new(StructType::new([
        StructField::nullable("path", DataType::STRING),
        StructField::nullable("sizeInBytes", DataType::LONG),
        StructField::nullable("modificationTime", DataType::LONG),
        StructField::nullable("tags", DataType::string_map()),
    ]))
});

/// The schema manager used when the caller does not bring their own.
#[derive(Debug, Default)]
pub struct DefaultSchemaManager;

impl DefaultSchemaManager {
    pub fn new() -> Self {
        Self
    }
}

impl CheckpointSchemaManager for DefaultSchemaManager {
    fn txn_entry_type(&self) -> SchemaRef {
        TXN_ENTRY_TYPE.clone()
    }

    fn add_entry_type(
        &self,
        metadata: &MetadataEntry,
        _protocol: &ProtocolEntry,
        stats_filter: &StatsColumnFilter,
        with_parsed_stats: bool,
        with_deletion_vector: bool,
        with_physical_column_stats: bool,
    ) -> DeltaResult<SchemaRef> {
        let table_schema = StructType::try_from_json(&metadata.schema_string)?;

        let mut fields = vec![
            StructField::nullable("path", DataType::STRING),
            StructField::nullable("partitionValues", DataType::string_map()),
        ];
        let partition_columns: Vec<&StructField> = metadata
            .partition_columns
            .iter()
            .filter_map(|column| table_schema.field(column))
            .collect();
        if !partition_columns.is_empty() {
            fields.push(StructField::nullable(
                PARTITION_VALUES_PARSED_NAME,
                StructType::new(partition_columns.iter().map(|&field| field.clone())),
            ));
        }
        fields.extend([
            StructField::nullable("size", DataType::LONG),
            StructField::nullable("modificationTime", DataType::LONG),
            StructField::nullable("dataChange", DataType::BOOLEAN),
            StructField::nullable("tags", DataType::string_map()),
        ]);
        if with_deletion_vector {
            fields.push(StructField::nullable(
                "deletionVector",
                deletion_vector_type(),
            ));
        }
        fields.push(StructField::nullable("stats", DataType::STRING));
        if with_parsed_stats {
            let data_columns: Vec<&StructField> = table_schema
                .fields()
                .filter(|field| !metadata.partition_columns.contains(&field.name))
                .collect();
            fields.push(StructField::nullable(
                "stats_parsed",
                parsed_stats_type(
                    &data_columns,
                    stats_filter,
                    with_physical_column_stats,
                ),
            ));
        }
        Ok(Arc::new(StructType::new(fields)))
    }

    fn remove_entry_type(&self, with_deletion_vector: bool) -> SchemaRef {
        let mut fields = vec![
            StructField::nullable("path", DataType::STRING),
            StructField::nullable("partitionValues", DataType::string_map()),
            StructField::nullable("deletionTimestamp", DataType::LONG),
            StructField::nullable("dataChange", DataType::BOOLEAN),
        ];
        if with_deletion_vector {
            fields.push(StructField::nullable(
                "deletionVector",
                deletion_vector_type(),
            ));
        }
        Arc::new(StructType::new(fields))
    }

    fn metadata_entry_type(&self) -> SchemaRef {
        METADATA_ENTRY_TYPE.clone()
    }

    fn protocol_entry_type(
        &self,
        with_reader_features: bool,
        with_writer_features: bool,
    ) -> SchemaRef {
        let mut fields = vec![
            StructField::nullable("minReaderVersion", DataType::INTEGER),
            StructField::nullable("minWriterVersion", DataType::INTEGER),
        ];
        if with_reader_features {
            fields.push(StructField::nullable("readerFeatures", DataType::string_list()));
        }
        if with_writer_features {
            fields.push(StructField::nullable("writerFeatures", DataType::string_list()));
        }
        Arc::new(StructType::new(fields))
    }

    fn sidecar_entry_type(&self) -> SchemaRef {
        SIDECAR_ENTRY_TYPE.clone()
    }
}

/// The `stats_parsed` row type for the given data columns: min/max sub-rows hold only the
/// filter-selected columns with statistics-eligible types, the null-count sub-row covers every
/// data column.
fn parsed_stats_type(
    data_columns: &[&StructField],
    stats_filter: &StatsColumnFilter,
    with_physical_column_stats: bool,
) -> StructType {
    let mut fields = vec![StructField::nullable("numRecords", DataType::LONG)];
    let min_max_columns: Vec<StructField> = data_columns
        .iter()
        .filter(|field| stats_filter.selects(field.physical_name()))
        .filter_map(|field| min_max_stat_field(field, with_physical_column_stats))
        .collect();
    if !min_max_columns.is_empty() {
        for name in ["minValues", "maxValues"] {
            fields.push(StructField::nullable(
                name,
                StructType::new(min_max_columns.iter().cloned()),
            ));
        }
    }
    fields.push(StructField::nullable(
        "nullCount",
        StructType::new(data_columns.iter().map(|field| null_count_field(field))),
    ));
    StructType::new(fields)
}

fn min_max_stat_field(
    field: &StructField,
    with_physical_column_stats: bool,
) -> Option<StructField> {
    match field.data_type() {
        DataType::Primitive(primitive) if min_max_supported(*primitive) => Some(field.clone()),
        // row-typed statistics are only carried when a rewrite needs their bytes preserved
        DataType::Struct(nested) if with_physical_column_stats => {
            let nested_fields: Vec<StructField> = nested
                .fields()
                .filter_map(|nested_field| {
                    min_max_stat_field(nested_field, with_physical_column_stats)
                })
                .collect();
            match nested_fields.is_empty() {
                true => None,
                false => {
                    let mut stat_field = field.clone();
                    stat_field.data_type = StructType::new(nested_fields).into();
                    Some(stat_field)
                }
            }
        }
        _ => None,
    }
}

fn null_count_field(field: &StructField) -> StructField {
    let mut count_field = field.clone();
    count_field.data_type = match field.data_type() {
        DataType::Struct(nested) => {
            StructType::new(nested.fields().map(null_count_field)).into()
        }
        _ => DataType::LONG,
    };
    count_field
}

fn min_max_supported(primitive: PrimitiveType) -> bool {
    !matches!(
        primitive,
        PrimitiveType::Boolean | PrimitiveType::Binary | PrimitiveType::Decimal(_, _)
    )
}
