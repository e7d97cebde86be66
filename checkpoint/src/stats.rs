//! Decoding of the `stats_parsed` sub-row of an `add` action.
//!
//! Statistics are keyed by the column's physical name. Min/max values are only decoded when the
//! caller's stats-column filter selects at least one column; null counts are always decoded
//! against the full schema. Timestamp statistics are the one place the reader tolerates bad
//! data: values before the start of the modern era are not trusted and are dropped from the map
//! while the row itself is still emitted.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use arrow_array::types::{Int16Type, Int32Type, Int64Type, Int8Type, TimestampMicrosecondType};
use arrow_array::{
    Array, ArrayRef, BooleanArray, Date32Array, Float32Array, Float64Array, PrimitiveArray,
    StringArray,
};
use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::row::RowReader;
use crate::schema::{DataType, PrimitiveType, StructField};
use crate::{DeltaResult, Error};

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;
const MICROS_PER_MILLI: i64 = 1000;

/// Epoch day of 1900-01-01. Timestamp statistics older than this are treated as artifacts of
/// calendar conversion bugs in old writers and are not trusted.
pub static START_OF_MODERN_ERA_EPOCH_DAY: LazyLock<i64> = LazyLock::new(|| {
    let modern_era = NaiveDate::from_ymd_opt(1900, 1, 1).expect("valid date");
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("valid date");
    modern_era.signed_duration_since(epoch).num_days()
});

/// One statistic value, carrying the native representation of the column it describes.
#[derive(Debug, Clone)]
pub enum Scalar {
    String(String),
    Long(i64),
    Integer(i32),
    Short(i16),
    Byte(i8),
    Float(f32),
    Double(f64),
    Boolean(bool),
    /// Days since the Unix epoch
    Date(i32),
    /// Milliseconds since the Unix epoch, UTC
    Timestamp(i64),
    /// Microseconds since the Unix epoch, no zone
    TimestampNtz(i64),
    /// An unmodified nested-row statistic, carried only so a rewrite can preserve its bytes
    Preserved(ArrayRef),
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        use Scalar::*;
        match (self, other) {
            (String(a), String(b)) => a == b,
            (Long(a), Long(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Short(a), Short(b)) => a == b,
            (Byte(a), Byte(b)) => a == b,
            (Float(a), Float(b)) => a == b,
            (Double(a), Double(b)) => a == b,
            (Boolean(a), Boolean(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            (TimestampNtz(a), TimestampNtz(b)) => a == b,
            (Preserved(a), Preserved(b)) => a.to_data() == b.to_data(),
            _ => false,
        }
    }
}

/// Per-file statistics decoded from `stats_parsed`
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStats {
    pub num_records: i64,
    pub min_values: Option<HashMap<String, Scalar>>,
    pub max_values: Option<HashMap<String, Scalar>>,
    pub null_count: Option<HashMap<String, Scalar>>,
}

/// Selects which columns min/max statistics should be decoded for, by physical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsColumnFilter {
    /// Decode min/max for every eligible column
    All,
    /// Skip min/max decoding entirely
    None,
    /// Decode min/max only for the named columns
    Columns(HashSet<String>),
}

impl StatsColumnFilter {
    pub fn selects(&self, physical_name: &str) -> bool {
        match self {
            StatsColumnFilter::All => true,
            StatsColumnFilter::None => false,
            StatsColumnFilter::Columns(columns) => columns.contains(physical_name),
        }
    }

    pub(crate) fn selects_any<'a>(
        &self,
        mut physical_names: impl Iterator<Item = &'a str>,
    ) -> bool {
        physical_names.any(|name| self.selects(name))
    }
}

/// Decodes `stats_parsed` rows, honoring the stats-column filter and the modern-era cutoff.
pub(crate) struct StatsExtractor {
    filter: StatsColumnFilter,
    preserve_row_stats: bool,
    cutoff_epoch_day: i64,
}

impl StatsExtractor {
    pub(crate) fn new(
        filter: StatsColumnFilter,
        preserve_row_stats: bool,
        cutoff_epoch_day: i64,
    ) -> Self {
        Self {
            filter,
            preserve_row_stats,
            cutoff_epoch_day,
        }
    }

    /// Decode one `stats_parsed` row. `reader` must be positioned on a non-null row.
    pub(crate) fn extract(&self, reader: &RowReader<'_>) -> DeltaResult<ParsedStats> {
        let num_records = reader.get_long("numRecords")?;
        let mut min_values = None;
        let mut max_values = None;
        for (name, target) in [("minValues", &mut min_values), ("maxValues", &mut max_values)] {
            if !reader.has_field(name) {
                continue;
            }
            if let Some(values) = reader.get_row(name)? {
                if self
                    .filter
                    .selects_any(values.schema().fields().map(StructField::physical_name))
                {
                    *target = Some(self.decode_values(&values)?);
                }
            }
        }
        let null_count = match reader.has_field("nullCount") {
            true => reader
                .get_row("nullCount")?
                .map(|counts| self.decode_null_count(&counts))
                .transpose()?,
            false => None,
        };
        Ok(ParsedStats {
            num_records,
            min_values,
            max_values,
            null_count,
        })
    }

    fn decode_values(&self, reader: &RowReader<'_>) -> DeltaResult<HashMap<String, Scalar>> {
        let mut values = HashMap::new();
        for field in reader.schema().fields() {
            if !self.filter.selects(field.physical_name()) {
                continue;
            }
            let Some(column) = reader.column_for(field) else {
                continue;
            };
            if column.is_null(reader.row()) {
                continue;
            }
            let scalar = match field.data_type() {
                DataType::Struct(_) => self.preserved(column, reader.row()),
                DataType::Primitive(primitive) => {
                    self.decode_primitive(*primitive, field, column, reader.row())?
                }
                // arrays and maps carry no min/max statistics
                _ => None,
            };
            if let Some(scalar) = scalar {
                values.insert(field.physical_name().to_string(), scalar);
            }
        }
        Ok(values)
    }

    fn decode_null_count(&self, reader: &RowReader<'_>) -> DeltaResult<HashMap<String, Scalar>> {
        let mut counts = HashMap::new();
        for field in reader.schema().fields() {
            let Some(column) = reader.column_for(field) else {
                continue;
            };
            if column.is_null(reader.row()) {
                continue;
            }
            let scalar = match field.data_type() {
                DataType::Struct(_) => self.preserved(column, reader.row()),
                _ => Some(Scalar::Long(
                    downcast::<PrimitiveArray<Int64Type>>(field, column)?.value(reader.row()),
                )),
            };
            if let Some(scalar) = scalar {
                counts.insert(field.physical_name().to_string(), scalar);
            }
        }
        Ok(counts)
    }

    fn preserved(&self, column: &ArrayRef, row: usize) -> Option<Scalar> {
        self.preserve_row_stats
            .then(|| Scalar::Preserved(column.slice(row, 1)))
    }

    fn decode_primitive(
        &self,
        primitive: PrimitiveType,
        field: &StructField,
        column: &ArrayRef,
        row: usize,
    ) -> DeltaResult<Option<Scalar>> {
        let scalar = match primitive {
            PrimitiveType::String => {
                Scalar::String(downcast::<StringArray>(field, column)?.value(row).to_string())
            }
            PrimitiveType::Long => {
                Scalar::Long(downcast::<PrimitiveArray<Int64Type>>(field, column)?.value(row))
            }
            PrimitiveType::Integer => {
                Scalar::Integer(downcast::<PrimitiveArray<Int32Type>>(field, column)?.value(row))
            }
            PrimitiveType::Short => {
                Scalar::Short(downcast::<PrimitiveArray<Int16Type>>(field, column)?.value(row))
            }
            PrimitiveType::Byte => {
                Scalar::Byte(downcast::<PrimitiveArray<Int8Type>>(field, column)?.value(row))
            }
            PrimitiveType::Float => {
                Scalar::Float(downcast::<Float32Array>(field, column)?.value(row))
            }
            PrimitiveType::Double => {
                Scalar::Double(downcast::<Float64Array>(field, column)?.value(row))
            }
            PrimitiveType::Boolean => {
                Scalar::Boolean(downcast::<BooleanArray>(field, column)?.value(row))
            }
            PrimitiveType::Date => {
                Scalar::Date(downcast::<Date32Array>(field, column)?.value(row))
            }
            PrimitiveType::TimestampNtz => Scalar::TimestampNtz(
                downcast::<PrimitiveArray<TimestampMicrosecondType>>(field, column)?.value(row),
            ),
            PrimitiveType::Timestamp => {
                let micros = downcast::<PrimitiveArray<TimestampMicrosecondType>>(field, column)?
                    .value(row);
                return Ok(self.timestamp_millis(field, micros));
            }
            // no statistics are collected for binary or decimal columns
            PrimitiveType::Binary | PrimitiveType::Decimal(_, _) => return Ok(None),
        };
        Ok(Some(scalar))
    }

    /// Convert a microsecond timestamp statistic to milliseconds, UTC. Values that are not
    /// whole milliseconds or predate the modern era are dropped.
    fn timestamp_millis(&self, field: &StructField, micros: i64) -> Option<Scalar> {
        if micros % MICROS_PER_MILLI != 0 {
            warn!(
                "Dropping timestamp statistic for '{}': {micros}us is not a whole millisecond",
                field.name
            );
            return None;
        }
        let millis = micros / MICROS_PER_MILLI;
        let epoch_day = millis.div_euclid(MILLIS_PER_DAY);
        if epoch_day < self.cutoff_epoch_day {
            debug!(
                "Dropping untrusted pre-modern-era timestamp statistic for '{}' (epoch day {epoch_day})",
                field.name
            );
            return None;
        }
        Some(Scalar::Timestamp(millis))
    }
}

fn downcast<'a, T: 'static>(field: &StructField, column: &'a ArrayRef) -> DeltaResult<&'a T> {
    column.as_any().downcast_ref::<T>().ok_or_else(|| {
        Error::unexpected_column_type(format!(
            "Statistic for '{}' has arrow type {}, which does not match its declared type {}",
            field.name,
            column.data_type(),
            field.data_type
        ))
    })
}
