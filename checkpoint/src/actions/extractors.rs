//! One extractor per action kind.
//!
//! An extractor consumes one row position from its action column block and produces either a
//! typed entry or `None`, where `None` means "this row carries a different action kind" (or,
//! for `add`, "this row was pruned by the partition constraint"). Non-null rows are validated
//! against the field-count range the Delta protocol fixes for the kind before any nested field
//! is touched.

use arrow_array::{Array, ArrayRef, StructArray};

use crate::partition::{canonicalize_partition_values, PartitionConstraint};
use crate::row::RowReader;
use crate::schema::SchemaRef;
use crate::stats::StatsExtractor;
use crate::utils::require;
use crate::{DeltaResult, Error};

use super::{
    ActionKind, AddFileEntry, CheckpointEntry, DeletionVectorDescriptor, FormatEntry,
    MetadataEntry, ProtocolEntry, RemoveFileEntry, SidecarEntry, TxnEntry,
};

const TXN_FIELD_COUNT: usize = 3;
const METADATA_FIELD_COUNT: usize = 8;
const FORMAT_FIELD_COUNT: usize = 2;
const MIN_PROTOCOL_FIELD_COUNT: usize = 2;
const MAX_PROTOCOL_FIELD_COUNT: usize = 4;
const REMOVE_FIELD_COUNT: usize = 4;
const SIDECAR_FIELD_COUNT: usize = 4;

const STATS_PARSED_NAME: &str = "stats_parsed";

/// A first-class extractor value: `(row position, column block) -> optional entry`.
pub(crate) trait EntryExtractor {
    fn kind(&self) -> ActionKind;

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>>;
}

/// Downcast an action column block and position a field reader on `position`, or `None` when
/// the row does not carry this action kind.
fn action_row<'a>(
    kind: ActionKind,
    position: usize,
    block: &'a ArrayRef,
    entry_type: &'a SchemaRef,
) -> DeltaResult<Option<RowReader<'a>>> {
    let rows = block
        .as_any()
        .downcast_ref::<StructArray>()
        .ok_or_else(|| {
            Error::unexpected_column_type(format!(
                "Block for the '{}' column is not a row block (found {})",
                kind.column_name(),
                block.data_type()
            ))
        })?;
    if rows.is_null(position) {
        return Ok(None);
    }
    Ok(Some(RowReader::new(rows, entry_type, position)))
}

fn field_count_error(kind: ActionKind, position: usize, expected: &str, found: usize) -> Error {
    Error::schema(format!(
        "Expected {expected} fields in a '{}' row, found {found} at position {position}",
        kind.column_name()
    ))
}

pub(crate) struct TxnExtractor {
    entry_type: SchemaRef,
}

impl TxnExtractor {
    pub(crate) fn new(entry_type: SchemaRef) -> Self {
        Self { entry_type }
    }
}

impl EntryExtractor for TxnExtractor {
    fn kind(&self) -> ActionKind {
        ActionKind::Txn
    }

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>> {
        let Some(row) = action_row(self.kind(), position, block, &self.entry_type)? else {
            return Ok(None);
        };
        require!(
            row.field_count() == TXN_FIELD_COUNT,
            field_count_error(self.kind(), position, "3", row.field_count())
        );
        Ok(Some(CheckpointEntry::Txn(TxnEntry {
            app_id: row.get_string("appId")?,
            version: row.get_long("version")?,
            last_updated: row.get_optional_long("lastUpdated")?,
        })))
    }
}

pub(crate) struct MetadataExtractor {
    entry_type: SchemaRef,
}

impl MetadataExtractor {
    pub(crate) fn new(entry_type: SchemaRef) -> Self {
        Self { entry_type }
    }
}

impl EntryExtractor for MetadataExtractor {
    fn kind(&self) -> ActionKind {
        ActionKind::Metadata
    }

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>> {
        let Some(row) = action_row(self.kind(), position, block, &self.entry_type)? else {
            return Ok(None);
        };
        require!(
            row.field_count() == METADATA_FIELD_COUNT,
            field_count_error(self.kind(), position, "8", row.field_count())
        );
        let format_row = row.get_row("format")?.ok_or_else(|| {
            Error::missing_data(format!("Metadata row at position {position} has no format"))
        })?;
        require!(
            format_row.field_count() == FORMAT_FIELD_COUNT,
            field_count_error(self.kind(), position, "2 format", format_row.field_count())
        );
        Ok(Some(CheckpointEntry::Metadata(MetadataEntry {
            id: row.get_string("id")?,
            name: row.get_optional_string("name")?,
            description: row.get_optional_string("description")?,
            format: FormatEntry {
                provider: format_row.get_string("provider")?,
                options: format_row.get_optional_map("options")?.unwrap_or_default(),
            },
            schema_string: row.get_string("schemaString")?,
            partition_columns: row.get_list("partitionColumns")?,
            configuration: row.get_optional_map("configuration")?.unwrap_or_default(),
            created_time: row.get_optional_long("createdTime")?,
        })))
    }
}

pub(crate) struct ProtocolExtractor {
    entry_type: SchemaRef,
}

impl ProtocolExtractor {
    pub(crate) fn new(entry_type: SchemaRef) -> Self {
        Self { entry_type }
    }
}

impl EntryExtractor for ProtocolExtractor {
    fn kind(&self) -> ActionKind {
        ActionKind::Protocol
    }

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>> {
        let Some(row) = action_row(self.kind(), position, block, &self.entry_type)? else {
            return Ok(None);
        };
        require!(
            (MIN_PROTOCOL_FIELD_COUNT..=MAX_PROTOCOL_FIELD_COUNT).contains(&row.field_count()),
            field_count_error(self.kind(), position, "2 to 4", row.field_count())
        );
        let reader_features = match row.has_field("readerFeatures") {
            true => row.get_optional_set("readerFeatures")?,
            false => None,
        };
        let writer_features = match row.has_field("writerFeatures") {
            true => row.get_optional_set("writerFeatures")?,
            false => None,
        };
        Ok(Some(CheckpointEntry::Protocol(ProtocolEntry {
            min_reader_version: row.get_int("minReaderVersion")?,
            min_writer_version: row.get_int("minWriterVersion")?,
            reader_features,
            writer_features,
        })))
    }
}

pub(crate) struct RemoveExtractor {
    entry_type: SchemaRef,
    deletion_vectors_enabled: bool,
}

impl RemoveExtractor {
    pub(crate) fn new(entry_type: SchemaRef, deletion_vectors_enabled: bool) -> Self {
        Self {
            entry_type,
            deletion_vectors_enabled,
        }
    }
}

impl EntryExtractor for RemoveExtractor {
    fn kind(&self) -> ActionKind {
        ActionKind::Remove
    }

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>> {
        let Some(row) = action_row(self.kind(), position, block, &self.entry_type)? else {
            return Ok(None);
        };
        // the deletionVector sub-row is part of the shape once the table has the feature
        let expected = REMOVE_FIELD_COUNT + usize::from(self.deletion_vectors_enabled);
        require!(
            row.field_count() == expected,
            field_count_error(self.kind(), position, "4", row.field_count())
        );
        let deletion_vector = match self.deletion_vectors_enabled {
            true => row
                .get_row("deletionVector")?
                .map(|dv| DeletionVectorDescriptor::read_from(&dv))
                .transpose()?,
            false => None,
        };
        Ok(Some(CheckpointEntry::Remove(RemoveFileEntry {
            path: row.get_string("path")?,
            partition_values: row.get_optional_map("partitionValues")?.unwrap_or_default(),
            deletion_timestamp: row.get_long("deletionTimestamp")?,
            data_change: row.get_boolean("dataChange")?,
            deletion_vector,
        })))
    }
}

pub(crate) struct SidecarExtractor {
    entry_type: SchemaRef,
}

impl SidecarExtractor {
    pub(crate) fn new(entry_type: SchemaRef) -> Self {
        Self { entry_type }
    }
}

impl EntryExtractor for SidecarExtractor {
    fn kind(&self) -> ActionKind {
        ActionKind::Sidecar
    }

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>> {
        let Some(row) = action_row(self.kind(), position, block, &self.entry_type)? else {
            return Ok(None);
        };
        require!(
            row.field_count() == SIDECAR_FIELD_COUNT,
            field_count_error(self.kind(), position, "4", row.field_count())
        );
        Ok(Some(CheckpointEntry::Sidecar(SidecarEntry {
            path: row.get_string("path")?,
            size_in_bytes: row.get_long("sizeInBytes")?,
            modification_time: row.get_long("modificationTime")?,
            tags: row.get_optional_map("tags")?,
        })))
    }
}

pub(crate) struct AddExtractor {
    entry_type: SchemaRef,
    partition_constraint: PartitionConstraint,
    deletion_vectors_enabled: bool,
    stats: StatsExtractor,
}

impl AddExtractor {
    pub(crate) fn new(
        entry_type: SchemaRef,
        partition_constraint: PartitionConstraint,
        deletion_vectors_enabled: bool,
        stats: StatsExtractor,
    ) -> Self {
        Self {
            entry_type,
            partition_constraint,
            deletion_vectors_enabled,
            stats,
        }
    }
}

impl EntryExtractor for AddExtractor {
    fn kind(&self) -> ActionKind {
        ActionKind::Add
    }

    fn extract(
        &self,
        position: usize,
        block: &ArrayRef,
    ) -> DeltaResult<Option<CheckpointEntry>> {
        let Some(row) = action_row(self.kind(), position, block, &self.entry_type)? else {
            return Ok(None);
        };

        // partition values come first so a non-matching row is dropped before anything else is
        // decoded; this is the row-level half of partition pruning
        let raw_partition_values = row.get_nullable_value_map("partitionValues")?;
        let canonical_partition_values = canonicalize_partition_values(&raw_partition_values);
        if !self.partition_constraint.is_all()
            && !self.partition_constraint.matches(&canonical_partition_values)
        {
            return Ok(None);
        }

        let deletion_vector = match self.deletion_vectors_enabled {
            true => row
                .get_row("deletionVector")?
                .map(|dv| DeletionVectorDescriptor::read_from(&dv))
                .transpose()?,
            false => None,
        };
        let parsed_stats = match row.has_field(STATS_PARSED_NAME) {
            true => row
                .get_row(STATS_PARSED_NAME)?
                .map(|stats_row| self.stats.extract(&stats_row))
                .transpose()?,
            false => None,
        };
        // the raw JSON form is only interesting when nothing parsed is available
        let stats = match parsed_stats.is_some() {
            true => None,
            false => row.get_optional_string("stats")?,
        };

        Ok(Some(CheckpointEntry::Add(AddFileEntry {
            path: row.get_string("path")?,
            partition_values: raw_partition_values
                .into_iter()
                .filter_map(|(k, v)| v.map(|v| (k, v)))
                .collect(),
            canonical_partition_values,
            size: row.get_long("size")?,
            modification_time: row.get_long("modificationTime")?,
            data_change: row.get_boolean("dataChange")?,
            stats,
            parsed_stats,
            tags: row.get_optional_map("tags")?.unwrap_or_default(),
            deletion_vector,
        })))
    }
}
