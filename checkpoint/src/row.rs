//! Read fields out of one materialized checkpoint row by name.
//!
//! A [`RowReader`] wraps a `(StructArray, StructType)` pair plus a row position. All lookups go
//! through the declared [`StructType`], so the reader tolerates ordinal changes in the file and
//! fields that are physically absent (they read as null). Asking for a field the declared row
//! schema does not have is a schema error.

use std::collections::{HashMap, HashSet};

use arrow_array::{
    Array, ArrayRef, BooleanArray, Int32Array, Int64Array, ListArray, MapArray, StringArray,
    StructArray,
};

use crate::schema::{DataType, StructField, StructType};
use crate::{DeltaResult, Error};

pub struct RowReader<'a> {
    array: &'a StructArray,
    schema: &'a StructType,
    row: usize,
}

impl<'a> RowReader<'a> {
    pub fn new(array: &'a StructArray, schema: &'a StructType, row: usize) -> Self {
        Self { array, schema, row }
    }

    /// The number of fields the row physically carries, used for per-kind shape validation.
    pub fn field_count(&self) -> usize {
        self.array.num_columns()
    }

    pub fn schema(&self) -> &'a StructType {
        self.schema
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.schema.field(name).is_some()
    }

    /// The data column backing `field`, or `None` when the file does not carry it. Lookup uses
    /// the field's physical name.
    pub(crate) fn column_for(&self, field: &StructField) -> Option<&'a ArrayRef> {
        self.array.column_by_name(field.physical_name())
    }

    fn field(&self, name: &str) -> DeltaResult<&'a StructField> {
        self.schema.field(name).ok_or_else(|| {
            Error::schema(format!("No field named '{name}' in row schema {}", self.schema_desc()))
        })
    }

    fn schema_desc(&self) -> String {
        itertools::Itertools::join(&mut self.schema.field_names(), ", ")
    }

    fn value_column(&self, name: &str) -> DeltaResult<Option<&'a ArrayRef>> {
        let field = self.field(name)?;
        let column = self
            .column_for(field)
            .filter(|column| column.is_valid(self.row));
        Ok(column)
    }

    fn required(&self, name: &str, column: Option<&'a ArrayRef>) -> DeltaResult<&'a ArrayRef> {
        column.ok_or_else(|| Error::missing_data(format!("Required field '{name}' is null")))
    }

    fn downcast<T: 'static>(&self, name: &str, column: &'a ArrayRef) -> DeltaResult<&'a T> {
        column.as_any().downcast_ref::<T>().ok_or_else(|| {
            Error::unexpected_column_type(format!(
                "Field '{name}' has arrow type {}, cannot read it as {}",
                column.data_type(),
                std::any::type_name::<T>(),
            ))
        })
    }

    pub fn get_string(&self, name: &str) -> DeltaResult<String> {
        self.get_optional_string(name)?
            .ok_or_else(|| Error::missing_data(format!("Required field '{name}' is null")))
    }

    pub fn get_optional_string(&self, name: &str) -> DeltaResult<Option<String>> {
        match self.value_column(name)? {
            Some(column) => {
                let values: &StringArray = self.downcast(name, column)?;
                Ok(Some(values.value(self.row).to_string()))
            }
            None => Ok(None),
        }
    }

    pub fn get_int(&self, name: &str) -> DeltaResult<i32> {
        self.get_optional_int(name)?
            .ok_or_else(|| Error::missing_data(format!("Required field '{name}' is null")))
    }

    pub fn get_optional_int(&self, name: &str) -> DeltaResult<Option<i32>> {
        match self.value_column(name)? {
            Some(column) => {
                let values: &Int32Array = self.downcast(name, column)?;
                Ok(Some(values.value(self.row)))
            }
            None => Ok(None),
        }
    }

    pub fn get_long(&self, name: &str) -> DeltaResult<i64> {
        self.get_optional_long(name)?
            .ok_or_else(|| Error::missing_data(format!("Required field '{name}' is null")))
    }

    pub fn get_optional_long(&self, name: &str) -> DeltaResult<Option<i64>> {
        match self.value_column(name)? {
            Some(column) => {
                let values: &Int64Array = self.downcast(name, column)?;
                Ok(Some(values.value(self.row)))
            }
            None => Ok(None),
        }
    }

    pub fn get_boolean(&self, name: &str) -> DeltaResult<bool> {
        let column = self.value_column(name)?;
        let column = self.required(name, column)?;
        let values: &BooleanArray = self.downcast(name, column)?;
        Ok(values.value(self.row))
    }

    /// A required `map<string, string>`; entries whose value is null are dropped.
    pub fn get_map(&self, name: &str) -> DeltaResult<HashMap<String, String>> {
        let entries = self.get_nullable_value_map(name)?;
        Ok(entries
            .into_iter()
            .filter_map(|(k, v)| v.map(|v| (k, v)))
            .collect())
    }

    pub fn get_optional_map(&self, name: &str) -> DeltaResult<Option<HashMap<String, String>>> {
        match self.value_column(name)? {
            Some(column) => {
                let map: &MapArray = self.downcast(name, column)?;
                Ok(Some(
                    self.materialize_map(name, map)?
                        .into_iter()
                        .filter_map(|(k, v)| v.map(|v| (k, v)))
                        .collect(),
                ))
            }
            None => Ok(None),
        }
    }

    /// A required `map<string, string>` keeping null values, as needed to canonicalize
    /// partition values.
    pub fn get_nullable_value_map(
        &self,
        name: &str,
    ) -> DeltaResult<HashMap<String, Option<String>>> {
        let column = self.value_column(name)?;
        let column = self.required(name, column)?;
        let map: &MapArray = self.downcast(name, column)?;
        self.materialize_map(name, map)
    }

    fn materialize_map(
        &self,
        name: &str,
        map: &MapArray,
    ) -> DeltaResult<HashMap<String, Option<String>>> {
        let entries = map.value(self.row);
        let keys = entries
            .column(0)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                Error::unexpected_column_type(format!("Map field '{name}' has non-string keys"))
            })?;
        let values = entries
            .column(1)
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                Error::unexpected_column_type(format!("Map field '{name}' has non-string values"))
            })?;
        let mut result = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values.iter()) {
            if let Some(key) = key {
                result.insert(key.to_string(), value.map(|v| v.to_string()));
            }
        }
        Ok(result)
    }

    /// A required `list<string>`
    pub fn get_list(&self, name: &str) -> DeltaResult<Vec<String>> {
        let column = self.value_column(name)?;
        let column = self.required(name, column)?;
        let list: &ListArray = self.downcast(name, column)?;
        let items = list.value(self.row);
        let items = items
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                Error::unexpected_column_type(format!(
                    "List field '{name}' has non-string elements"
                ))
            })?;
        Ok(items.iter().flatten().map(str::to_string).collect())
    }

    /// An optional `list<string>` read as a set, the shape of protocol feature lists
    pub fn get_optional_set(&self, name: &str) -> DeltaResult<Option<HashSet<String>>> {
        match self.value_column(name)? {
            Some(_) => Ok(Some(self.get_list(name)?.into_iter().collect())),
            None => Ok(None),
        }
    }

    /// A nested row. Returns `None` when the field exists but its value is null (or is
    /// physically absent from the file).
    pub fn get_row(&self, name: &str) -> DeltaResult<Option<RowReader<'a>>> {
        let field = self.field(name)?;
        let DataType::Struct(nested_schema) = &field.data_type else {
            return Err(Error::schema(format!(
                "Field '{name}' is declared as {}, not a nested row",
                field.data_type
            )));
        };
        match self.value_column(name)? {
            Some(column) => {
                let nested: &StructArray = self.downcast(name, column)?;
                Ok(Some(RowReader::new(nested, nested_schema, self.row)))
            }
            None => Ok(None),
        }
    }
}
