//! Definitions of the logical row types found inside checkpoint rows.
//!
//! This is the subset of the Delta type system the checkpoint reader needs: the action columns
//! themselves are rows, their fields are primitives, lists, maps, and nested rows, and the
//! `stats_parsed` column re-uses the table's own column types. Field lookup inside a
//! [`StructType`] is by declared field name; ordinal changes in the underlying Parquet schema are
//! tolerated.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use arrow_schema::{
    ArrowError, DataType as ArrowDataType, Field as ArrowField, Schema as ArrowSchema, TimeUnit,
};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A reference to a [`StructType`]
pub type SchemaRef = Arc<StructType>;

/// Metadata key carrying the physical column name when column mapping is active.
pub(crate) const COLUMN_MAPPING_PHYSICAL_NAME_KEY: &str = "delta.columnMapping.physicalName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrimitiveType {
    String,
    Long,
    Integer,
    Short,
    Byte,
    Float,
    Double,
    Boolean,
    Binary,
    Date,
    /// Microsecond precision timestamp, adjusted to UTC.
    Timestamp,
    /// Microsecond precision timestamp with no timezone.
    #[serde(rename = "timestampNtz")]
    TimestampNtz,
    #[serde(
        serialize_with = "serialize_decimal",
        deserialize_with = "deserialize_decimal",
        untagged
    )]
    Decimal(u8, u8),
}

fn serialize_decimal<S: Serializer>(
    precision: &u8,
    scale: &u8,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("decimal({precision},{scale})"))
}

fn deserialize_decimal<'de, D>(deserializer: D) -> Result<(u8, u8), D::Error>
where
    D: Deserializer<'de>,
{
    let str_value = String::deserialize(deserializer)?;
    let parsed = str_value
        .strip_prefix("decimal(")
        .and_then(|s| s.strip_suffix(')'))
        .and_then(|body| {
            let (precision, scale) = body.split_once(',')?;
            Some((
                precision.trim().parse::<u8>().ok()?,
                scale.trim().parse::<u8>().ok()?,
            ))
        });
    parsed.ok_or_else(|| {
        serde::de::Error::custom(format!("Invalid decimal type string: {str_value}"))
    })
}

impl Display for PrimitiveType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PrimitiveType::String => write!(f, "string"),
            PrimitiveType::Long => write!(f, "long"),
            PrimitiveType::Integer => write!(f, "integer"),
            PrimitiveType::Short => write!(f, "short"),
            PrimitiveType::Byte => write!(f, "byte"),
            PrimitiveType::Float => write!(f, "float"),
            PrimitiveType::Double => write!(f, "double"),
            PrimitiveType::Boolean => write!(f, "boolean"),
            PrimitiveType::Binary => write!(f, "binary"),
            PrimitiveType::Date => write!(f, "date"),
            PrimitiveType::Timestamp => write!(f, "timestamp"),
            PrimitiveType::TimestampNtz => write!(f, "timestampNtz"),
            PrimitiveType::Decimal(precision, scale) => {
                write!(f, "decimal({precision},{scale})")
            }
        }
    }
}

/// An array of elements of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayType {
    #[serde(rename = "type")]
    type_name: String,
    /// The type of element stored in this array
    pub element_type: DataType,
    /// Denoting whether this array can contain one or more null values
    pub contains_null: bool,
}

impl ArrayType {
    pub fn new(element_type: DataType, contains_null: bool) -> Self {
        Self {
            type_name: "array".into(),
            element_type,
            contains_null,
        }
    }
}

/// String keyed map to values of one type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapType {
    #[serde(rename = "type")]
    type_name: String,
    /// The type of element used for the key of this map
    pub key_type: DataType,
    /// The type of element used for the value of this map
    pub value_type: DataType,
    /// Denoting whether this map can contain null values
    pub value_contains_null: bool,
}

impl MapType {
    pub fn new(key_type: DataType, value_type: DataType, value_contains_null: bool) -> Self {
        Self {
            type_name: "map".into(),
            key_type,
            value_type,
            value_contains_null,
        }
    }
}

/// A field inside a row type: a name, a data type, and nullability
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructField {
    /// Name of this (possibly nested) column
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: DataType,
    /// Whether this field can be null
    pub nullable: bool,
    /// Arbitrary metadata attached by the writer (column mapping ids, physical names, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl StructField {
    pub fn new(name: impl Into<String>, data_type: impl Into<DataType>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            metadata: HashMap::new(),
        }
    }

    /// A nullable field
    pub fn nullable(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self::new(name, data_type, true)
    }

    /// A non-nullable field
    pub fn not_null(name: impl Into<String>, data_type: impl Into<DataType>) -> Self {
        Self::new(name, data_type, false)
    }

    /// The name this column has in the data file, which is the declared name unless column
    /// mapping recorded a physical one.
    pub fn physical_name(&self) -> &str {
        self.metadata
            .get(COLUMN_MAPPING_PHYSICAL_NAME_KEY)
            .and_then(|v| v.as_str())
            .unwrap_or(&self.name)
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }
}

/// A row type: an ordered collection of named fields, indexed by name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(
        serialize_with = "serialize_struct_fields",
        deserialize_with = "deserialize_struct_fields"
    )]
    fields: IndexMap<String, StructField>,
}

// Delta serializes a struct's fields as an array; in memory we keep them keyed by name so that
// lookup is not a linear scan.
fn serialize_struct_fields<S: Serializer>(
    fields: &IndexMap<String, StructField>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(fields.values())
}

fn deserialize_struct_fields<'de, D>(
    deserializer: D,
) -> Result<IndexMap<String, StructField>, D::Error>
where
    D: Deserializer<'de>,
{
    let fields = Vec::<StructField>::deserialize(deserializer)?;
    Ok(fields
        .into_iter()
        .map(|field| (field.name.clone(), field))
        .collect())
}

impl StructType {
    pub fn new(fields: impl IntoIterator<Item = StructField>) -> Self {
        Self {
            type_name: "struct".into(),
            fields: fields
                .into_iter()
                .map(|field| (field.name.clone(), field))
                .collect(),
        }
    }

    /// Parse a Delta `schemaString` into a row type
    pub fn try_from_json(schema_string: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(schema_string)
    }

    pub fn field(&self, name: impl AsRef<str>) -> Option<&StructField> {
        self.fields.get(name.as_ref())
    }

    pub fn index_of(&self, name: impl AsRef<str>) -> Option<usize> {
        self.fields.get_index_of(name.as_ref())
    }

    pub fn fields(&self) -> impl Iterator<Item = &StructField> {
        self.fields.values()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The data type of a field inside a checkpoint row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DataType {
    Primitive(PrimitiveType),
    Array(Box<ArrayType>),
    Struct(Box<StructType>),
    Map(Box<MapType>),
}

impl DataType {
    pub const STRING: Self = DataType::Primitive(PrimitiveType::String);
    pub const LONG: Self = DataType::Primitive(PrimitiveType::Long);
    pub const INTEGER: Self = DataType::Primitive(PrimitiveType::Integer);
    pub const BOOLEAN: Self = DataType::Primitive(PrimitiveType::Boolean);
    pub const DOUBLE: Self = DataType::Primitive(PrimitiveType::Double);
    pub const DATE: Self = DataType::Primitive(PrimitiveType::Date);
    pub const TIMESTAMP: Self = DataType::Primitive(PrimitiveType::Timestamp);

    /// A `map<string, string>`, the shape of partition values, configuration, and tags
    pub fn string_map() -> Self {
        MapType::new(Self::STRING, Self::STRING, true).into()
    }

    /// A `list<string>`, the shape of partition column and feature lists
    pub fn string_list() -> Self {
        ArrayType::new(Self::STRING, false).into()
    }
}

impl From<PrimitiveType> for DataType {
    fn from(value: PrimitiveType) -> Self {
        DataType::Primitive(value)
    }
}

impl From<ArrayType> for DataType {
    fn from(value: ArrayType) -> Self {
        DataType::Array(Box::new(value))
    }
}

impl From<MapType> for DataType {
    fn from(value: MapType) -> Self {
        DataType::Map(Box::new(value))
    }
}

impl From<StructType> for DataType {
    fn from(value: StructType) -> Self {
        DataType::Struct(Box::new(value))
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Primitive(p) => write!(f, "{p}"),
            DataType::Array(a) => write!(f, "array<{}>", a.element_type),
            DataType::Struct(s) => {
                write!(f, "struct<")?;
                for (i, field) in s.fields().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, field.data_type)?;
                }
                write!(f, ">")
            }
            DataType::Map(m) => write!(f, "map<{}, {}>", m.key_type, m.value_type),
        }
    }
}

impl TryFrom<&DataType> for ArrowDataType {
    type Error = ArrowError;

    fn try_from(t: &DataType) -> Result<ArrowDataType, ArrowError> {
        match t {
            DataType::Primitive(primitive) => Ok(match primitive {
                PrimitiveType::String => ArrowDataType::Utf8,
                PrimitiveType::Long => ArrowDataType::Int64,
                PrimitiveType::Integer => ArrowDataType::Int32,
                PrimitiveType::Short => ArrowDataType::Int16,
                PrimitiveType::Byte => ArrowDataType::Int8,
                PrimitiveType::Float => ArrowDataType::Float32,
                PrimitiveType::Double => ArrowDataType::Float64,
                PrimitiveType::Boolean => ArrowDataType::Boolean,
                PrimitiveType::Binary => ArrowDataType::Binary,
                PrimitiveType::Date => ArrowDataType::Date32,
                PrimitiveType::Timestamp => {
                    ArrowDataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
                }
                PrimitiveType::TimestampNtz => {
                    ArrowDataType::Timestamp(TimeUnit::Microsecond, None)
                }
                PrimitiveType::Decimal(precision, scale) => {
                    ArrowDataType::Decimal128(*precision, *scale as i8)
                }
            }),
            DataType::Array(array) => Ok(ArrowDataType::List(Arc::new(
                ArrowField::new_list_field((&array.element_type).try_into()?, array.contains_null),
            ))),
            DataType::Struct(s) => {
                let fields = s
                    .fields()
                    .map(ArrowField::try_from)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ArrowDataType::Struct(fields.into()))
            }
            DataType::Map(m) => {
                let key = ArrowField::new("key", (&m.key_type).try_into()?, false);
                let value =
                    ArrowField::new("value", (&m.value_type).try_into()?, m.value_contains_null);
                let entries = ArrowField::new(
                    "key_value",
                    ArrowDataType::Struct(vec![key, value].into()),
                    false,
                );
                Ok(ArrowDataType::Map(Arc::new(entries), false))
            }
        }
    }
}

impl TryFrom<&StructField> for ArrowField {
    type Error = ArrowError;

    fn try_from(field: &StructField) -> Result<ArrowField, ArrowError> {
        Ok(ArrowField::new(
            field.physical_name(),
            (&field.data_type).try_into()?,
            field.nullable,
        ))
    }
}

impl TryFrom<&StructType> for ArrowSchema {
    type Error = ArrowError;

    fn try_from(s: &StructType) -> Result<ArrowSchema, ArrowError> {
        let fields = s
            .fields()
            .map(ArrowField::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ArrowSchema::new(fields))
    }
}
