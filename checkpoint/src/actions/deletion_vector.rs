//! The deletion-vector descriptor carried by `add` and `remove` actions.

use serde::{Deserialize, Serialize};

use crate::row::RowReader;
use crate::schema::{DataType, StructField, StructType};
use crate::utils::require;
use crate::{DeltaResult, Error};

/// The number of fields a deletion-vector sub-row always has.
const DELETION_VECTOR_FIELD_COUNT: usize = 5;

/// Describes where a deletion vector lives and how big it is. This is only the descriptor from
/// the log entry; materializing the vector itself is the table driver's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionVectorDescriptor {
    /// A single character to indicate how to access the DV: 'u' (relative path with random
    /// prefix), 'i' (inline), or 'p' (absolute path)
    pub storage_type: String,
    /// Three possible formats: the own z85-encoded UUID, the inline vector data, or an absolute
    /// path, depending on `storage_type`
    pub path_or_inline_dv: String,
    /// Start of the data for this DV in number of bytes from the beginning of the file it is
    /// stored in. Always None when `storage_type = 'i'`.
    pub offset: Option<i32>,
    /// Size of the serialized DV in bytes
    pub size_in_bytes: i32,
    /// Number of rows the DV logically removes from the file
    pub cardinality: i64,
}

impl DeletionVectorDescriptor {
    /// Decode the fixed 5-field deletion-vector sub-row. Any other field count is a schema
    /// error.
    pub(crate) fn read_from(reader: &RowReader<'_>) -> DeltaResult<Self> {
        require!(
            reader.field_count() == DELETION_VECTOR_FIELD_COUNT,
            Error::schema(format!(
                "Deletion vector sub-row must have exactly {DELETION_VECTOR_FIELD_COUNT} fields, found {}",
                reader.field_count()
            ))
        );
        Ok(Self {
            storage_type: reader.get_string("storageType")?,
            path_or_inline_dv: reader.get_string("pathOrInlineDv")?,
            offset: reader.get_optional_int("offset")?,
            size_in_bytes: reader.get_int("sizeInBytes")?,
            cardinality: reader.get_long("cardinality")?,
        })
    }

    /// A string that uniquely identifies this deletion vector, usable as a dedup key next to the
    /// file path during log replay.
    pub fn unique_id(&self) -> String {
        match self.offset {
            Some(offset) => format!("{}{}@{offset}", self.storage_type, self.path_or_inline_dv),
            None => format!("{}{}", self.storage_type, self.path_or_inline_dv),
        }
    }
}

/// The declared row type of a deletion-vector sub-row
pub(crate) fn deletion_vector_type() -> StructType {
    StructType::new([
        StructField::nullable("storageType", DataType::STRING),
        StructField::nullable("pathOrInlineDv", DataType::STRING),
        StructField::nullable("offset", DataType::INTEGER),
        StructField::nullable("sizeInBytes", DataType::INTEGER),
        StructField::nullable("cardinality", DataType::LONG),
    ])
}
