//! The typed log-entry records a checkpoint row can carry, and the sum type that keys them.

use std::collections::{HashMap, HashSet};
use std::fmt::{self, Display, Formatter};

use strum::{AsRefStr, Display as StrumDisplay, EnumCount, EnumString};

use crate::stats::ParsedStats;

pub(crate) mod deletion_vector;
pub(crate) mod extractors;

pub use deletion_vector::DeletionVectorDescriptor;

pub(crate) const TXN_NAME: &str = "txn";
pub(crate) const ADD_NAME: &str = "add";
pub(crate) const REMOVE_NAME: &str = "remove";
pub(crate) const METADATA_NAME: &str = "metadata";
pub(crate) const PROTOCOL_NAME: &str = "protocol";
pub(crate) const SIDECAR_NAME: &str = "sidecar";

/// The distinct action kinds a checkpoint row can carry. The enum's string form is exactly the
/// column name the Parquet file uses for that action.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    EnumString,
    StrumDisplay,
    AsRefStr,
    EnumCount,
)]
#[strum(serialize_all = "camelCase")]
pub enum ActionKind {
    Txn,
    Add,
    Remove,
    Metadata,
    Protocol,
    Sidecar,
}

impl ActionKind {
    /// The name of the action column in the checkpoint file
    pub fn column_name(&self) -> &'static str {
        match self {
            ActionKind::Txn => TXN_NAME,
            ActionKind::Add => ADD_NAME,
            ActionKind::Remove => REMOVE_NAME,
            ActionKind::Metadata => METADATA_NAME,
            ActionKind::Protocol => PROTOCOL_NAME,
            ActionKind::Sidecar => SIDECAR_NAME,
        }
    }
}

/// An application transaction recorded in the log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxnEntry {
    pub app_id: String,
    pub version: i64,
    pub last_updated: Option<i64>,
}

/// The file format block inside a [`MetadataEntry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatEntry {
    pub provider: String,
    pub options: HashMap<String, String>,
}

/// The table metadata action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub format: FormatEntry,
    pub schema_string: String,
    pub partition_columns: Vec<String>,
    pub configuration: HashMap<String, String>,
    pub created_time: Option<i64>,
}

/// The protocol versions (and, from reader version 3 / writer version 7 on, the feature lists)
/// the table requires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolEntry {
    pub min_reader_version: i32,
    pub min_writer_version: i32,
    pub reader_features: Option<HashSet<String>>,
    pub writer_features: Option<HashSet<String>>,
}

impl ProtocolEntry {
    pub fn new(min_reader_version: i32, min_writer_version: i32) -> Self {
        Self {
            min_reader_version,
            min_writer_version,
            reader_features: None,
            writer_features: None,
        }
    }

    pub fn has_reader_features(&self) -> bool {
        self.reader_features.is_some()
    }

    pub fn has_writer_features(&self) -> bool {
        self.writer_features.is_some()
    }

    /// True when the table has the `deletionVectors` reader feature enabled, which is what makes
    /// the `deletionVector` sub-rows of `add`/`remove` meaningful.
    pub fn supports_deletion_vectors(&self) -> bool {
        self.reader_features
            .as_ref()
            .is_some_and(|features| features.contains("deletionVectors"))
    }
}

/// A data file that is part of the table as of the checkpoint version
#[derive(Debug, Clone, PartialEq)]
pub struct AddFileEntry {
    pub path: String,
    /// Partition values exactly as stored in the file
    pub partition_values: HashMap<String, String>,
    /// Partition values with nulls made explicit ("an empty string means null")
    pub canonical_partition_values: HashMap<String, Option<String>>,
    pub size: i64,
    pub modification_time: i64,
    pub data_change: bool,
    /// The raw statistics JSON string; only carried when no parsed statistics were present
    pub stats: Option<String>,
    pub parsed_stats: Option<ParsedStats>,
    pub tags: HashMap<String, String>,
    pub deletion_vector: Option<DeletionVectorDescriptor>,
}

/// A data file removed from the table, kept as a tombstone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoveFileEntry {
    pub path: String,
    pub partition_values: HashMap<String, String>,
    pub deletion_timestamp: i64,
    pub data_change: bool,
    pub deletion_vector: Option<DeletionVectorDescriptor>,
}

/// A sidecar file holding part of a v2 checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidecarEntry {
    pub path: String,
    pub size_in_bytes: i64,
    pub modification_time: i64,
    pub tags: Option<HashMap<String, String>>,
}

/// One typed log entry decoded out of a checkpoint row: a tagged union over the action kinds,
/// mirroring the one-of-N shape of the on-disk row.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckpointEntry {
    Txn(TxnEntry),
    Add(AddFileEntry),
    Remove(RemoveFileEntry),
    Metadata(MetadataEntry),
    Protocol(ProtocolEntry),
    Sidecar(SidecarEntry),
}

impl CheckpointEntry {
    pub fn kind(&self) -> ActionKind {
        match self {
            CheckpointEntry::Txn(_) => ActionKind::Txn,
            CheckpointEntry::Add(_) => ActionKind::Add,
            CheckpointEntry::Remove(_) => ActionKind::Remove,
            CheckpointEntry::Metadata(_) => ActionKind::Metadata,
            CheckpointEntry::Protocol(_) => ActionKind::Protocol,
            CheckpointEntry::Sidecar(_) => ActionKind::Sidecar,
        }
    }
}

impl Display for CheckpointEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointEntry::Txn(txn) => write!(f, "txn({})", txn.app_id),
            CheckpointEntry::Add(add) => write!(f, "add({})", add.path),
            CheckpointEntry::Remove(remove) => write!(f, "remove({})", remove.path),
            CheckpointEntry::Metadata(metadata) => write!(f, "metadata({})", metadata.id),
            CheckpointEntry::Protocol(protocol) => write!(
                f,
                "protocol({}, {})",
                protocol.min_reader_version, protocol.min_writer_version
            ),
            CheckpointEntry::Sidecar(sidecar) => write!(f, "sidecar({})", sidecar.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn action_kind_string_round_trip() {
        for (kind, name) in [
            (ActionKind::Txn, "txn"),
            (ActionKind::Add, "add"),
            (ActionKind::Remove, "remove"),
            (ActionKind::Metadata, "metadata"),
            (ActionKind::Protocol, "protocol"),
            (ActionKind::Sidecar, "sidecar"),
        ] {
            assert_eq!(kind.to_string(), name);
            assert_eq!(kind.column_name(), name);
            assert_eq!(ActionKind::from_str(name).unwrap(), kind);
        }
    }

    #[test]
    fn protocol_feature_predicates() {
        let mut protocol = ProtocolEntry::new(3, 7);
        assert!(!protocol.supports_deletion_vectors());
        protocol.reader_features = Some(HashSet::from(["deletionVectors".to_string()]));
        assert!(protocol.supports_deletion_vectors());
        assert!(protocol.has_reader_features());
        assert!(!protocol.has_writer_features());
    }
}
