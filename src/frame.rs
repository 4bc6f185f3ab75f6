//! Tabular payloads
//!
//! A [`Frame`] is an Arrow [`RecordBatch`] plus index semantics:
//! - **natural index**: a named column of the batch identifies rows
//! - **synthetic index**: rows are identified by their position `0..n`
//!
//! The natural index column lives physically inside the batch, so every
//! column-level operation below keeps it in place unless asked otherwise.

use crate::{Error, Result};
use arrow::array::{
    Array, ArrayRef, Float64Array, Int64Array, RecordBatch, StringArray, UInt32Array,
};
use arrow::compute::{cast, take, take_record_batch};
use arrow::datatypes::{DataType, Field, Schema};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// In-memory tabular data with an optional natural index column.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    batch: RecordBatch,
    index: Option<String>,
}

impl Frame {
    /// Wrap a batch with a synthetic (row-number) index.
    #[must_use]
    pub const fn new(batch: RecordBatch) -> Self {
        Self { batch, index: None }
    }

    /// Wrap a batch whose column `index` is the natural row identifier.
    ///
    /// # Errors
    /// Returns `ColumnNotFound` if the batch has no such column
    pub fn with_index(batch: RecordBatch, index: impl Into<String>) -> Result<Self> {
        let index = index.into();
        if batch.schema().index_of(&index).is_err() {
            return Err(Error::ColumnNotFound(index));
        }
        Ok(Self {
            batch,
            index: Some(index),
        })
    }

    /// Build a synthetic-index frame from named columns.
    ///
    /// # Errors
    /// Returns error if the columns have different lengths or the list is empty
    pub fn from_columns(columns: Vec<(&str, ArrayRef)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::InvalidInput("a frame needs at least one column".to_string()));
        }
        let fields: Vec<Field> = columns
            .iter()
            .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
            .collect();
        let arrays = columns.into_iter().map(|(_, array)| array).collect();
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?;
        Ok(Self::new(batch))
    }

    /// Underlying record batch (index column included).
    #[must_use]
    pub const fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Name of the natural index column, `None` for a synthetic index.
    #[must_use]
    pub fn index_name(&self) -> Option<&str> {
        self.index.as_deref()
    }

    /// Number of rows.
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    /// All column names in batch order (index column included).
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Look up a column by name.
    ///
    /// # Errors
    /// Returns `ColumnNotFound` for unknown names
    pub fn column(&self, name: &str) -> Result<&ArrayRef> {
        self.batch
            .column_by_name(name)
            .ok_or_else(|| Error::ColumnNotFound(name.to_string()))
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.batch
            .schema()
            .index_of(name)
            .map_err(|_| Error::ColumnNotFound(name.to_string()))
    }

    /// Keep only `names` (plus the index column, which always survives).
    ///
    /// # Errors
    /// Returns `ColumnNotFound` for unknown names
    pub fn select(&self, names: &[&str]) -> Result<Self> {
        let mut positions = Vec::with_capacity(names.len() + 1);
        if let Some(index) = self.index.as_deref() {
            if !names.contains(&index) {
                positions.push(self.position(index)?);
            }
        }
        for name in names {
            positions.push(self.position(name)?);
        }
        Ok(Self {
            batch: self.batch.project(&positions)?,
            index: self.index.clone(),
        })
    }

    /// Remove one column. Dropping the index column turns the index synthetic.
    ///
    /// # Errors
    /// Returns `ColumnNotFound` for unknown names
    pub fn drop_column(&self, name: &str) -> Result<Self> {
        let dropped = self.position(name)?;
        let positions: Vec<usize> = (0..self.batch.num_columns())
            .filter(|&i| i != dropped)
            .collect();
        let index = self.index.clone().filter(|index| index != name);
        Ok(Self {
            batch: self.batch.project(&positions)?,
            index,
        })
    }

    /// Replace the values of an existing column.
    ///
    /// # Errors
    /// Returns error if the column is unknown or the length differs
    pub fn replace_column(&self, name: &str, values: ArrayRef) -> Result<Self> {
        let position = self.position(name)?;
        let schema = self.batch.schema();
        let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
        fields[position] = Field::new(name, values.data_type().clone(), true);
        let mut columns = self.batch.columns().to_vec();
        columns[position] = values;
        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(Self {
            batch,
            index: self.index.clone(),
        })
    }

    fn strings(&self, name: &str) -> Result<&StringArray> {
        let column = self.column(name)?;
        column
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| {
                Error::InvalidInput(format!(
                    "column '{name}' has type {}, expected Utf8",
                    column.data_type()
                ))
            })
    }

    /// Apply `f` to every non-null value of a text column.
    ///
    /// # Errors
    /// Returns error if the column is missing or not Utf8
    pub fn map_strings<F>(&self, name: &str, mut f: F) -> Result<Self>
    where
        F: FnMut(&str) -> String,
    {
        let mapped: StringArray = self
            .strings(name)?
            .iter()
            .map(|value| value.map(&mut f))
            .collect();
        self.replace_column(name, Arc::new(mapped))
    }

    /// Fill nulls of one column with a JSON scalar.
    ///
    /// Utf8 columns accept any value (non-strings use their JSON text),
    /// numeric columns need a number of the matching kind.
    ///
    /// # Errors
    /// Returns error if the column is missing or the fill value does not fit
    pub fn fill_nulls(&self, name: &str, fill: &Value) -> Result<Self> {
        let column = self.column(name)?;
        let mismatch = || {
            Error::InvalidInput(format!(
                "fill value {fill} does not fit column '{name}' of type {}",
                column.data_type()
            ))
        };
        let filled: ArrayRef = match column.data_type() {
            DataType::Utf8 => {
                let text = fill_text(fill);
                let values = self.strings(name)?;
                Arc::new(
                    values
                        .iter()
                        .map(|v| Some(v.unwrap_or(text.as_str())))
                        .collect::<StringArray>(),
                )
            }
            DataType::Float64 => {
                let value = fill.as_f64().ok_or_else(mismatch)?;
                let values = column
                    .as_any()
                    .downcast_ref::<Float64Array>()
                    .ok_or_else(mismatch)?;
                Arc::new(
                    values
                        .iter()
                        .map(|v| Some(v.unwrap_or(value)))
                        .collect::<Float64Array>(),
                )
            }
            DataType::Int64 => {
                let value = fill.as_i64().ok_or_else(mismatch)?;
                let values = column
                    .as_any()
                    .downcast_ref::<Int64Array>()
                    .ok_or_else(mismatch)?;
                Arc::new(
                    values
                        .iter()
                        .map(|v| Some(v.unwrap_or(value)))
                        .collect::<Int64Array>(),
                )
            }
            // A column that was entirely empty on disk comes back untyped
            DataType::Null => {
                let rows = column.len();
                if let Some(value) = fill.as_i64() {
                    Arc::new(Int64Array::from(vec![value; rows]))
                } else if let Some(value) = fill.as_f64() {
                    Arc::new(Float64Array::from(vec![value; rows]))
                } else {
                    Arc::new(StringArray::from(vec![fill_text(fill); rows]))
                }
            }
            _ => return Err(mismatch()),
        };
        self.replace_column(name, filled)
    }

    /// Row identifiers as integers.
    ///
    /// Synthetic indexes yield `0..n`; natural indexes must be integer typed.
    ///
    /// # Errors
    /// Returns `NonIntegerIndex` for non-integer index columns and
    /// `InvalidInput` for null identifiers
    pub fn row_ids(&self) -> Result<Vec<i64>> {
        let Some(index) = self.index.as_deref() else {
            let rows = i64::try_from(self.num_rows())
                .map_err(|_| Error::InvalidInput("frame too large".to_string()))?;
            return Ok((0..rows).collect());
        };
        let column = self.column(index)?;
        if !column.data_type().is_integer() {
            return Err(Error::NonIntegerIndex {
                column: index.to_string(),
                data_type: column.data_type().to_string(),
            });
        }
        let ids = cast(column, &DataType::Int64)?;
        let ids = ids
            .as_any()
            .downcast_ref::<Int64Array>()
            .ok_or_else(|| Error::InvalidInput(format!("index '{index}' failed to cast")))?;
        if ids.null_count() > 0 {
            return Err(Error::InvalidInput(format!(
                "index '{index}' contains null row ids"
            )));
        }
        Ok(ids.values().to_vec())
    }

    /// Rows whose identifiers are `ids`, in that order.
    ///
    /// A natural index is carried along; a synthetic index is renumbered.
    ///
    /// # Errors
    /// Returns error for unknown ids or non-integer indexes
    pub fn take_ids(&self, ids: &[i64]) -> Result<Self> {
        let mut positions: FxHashMap<i64, u32> = FxHashMap::default();
        for (position, id) in self.row_ids()?.into_iter().enumerate() {
            let position = u32::try_from(position)
                .map_err(|_| Error::InvalidInput("frame too large".to_string()))?;
            positions.entry(id).or_insert(position);
        }
        let indices = ids
            .iter()
            .map(|id| {
                positions
                    .get(id)
                    .copied()
                    .ok_or_else(|| Error::InvalidInput(format!("row id {id} not in frame")))
            })
            .collect::<Result<Vec<u32>>>()?;
        let batch = take_record_batch(&self.batch, &UInt32Array::from(indices))?;
        Ok(Self {
            batch,
            index: self.index.clone(),
        })
    }

    /// Index values rendered as text (join keys).
    fn index_keys(&self) -> Result<Vec<Option<String>>> {
        let Some(index) = self.index.as_deref() else {
            return Ok((0..self.num_rows()).map(|i| Some(i.to_string())).collect());
        };
        let keys = cast(self.column(index)?, &DataType::Utf8)?;
        let keys = keys
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| Error::InvalidInput(format!("index '{index}' failed to cast")))?;
        Ok(keys.iter().map(|k| k.map(str::to_owned)).collect())
    }

    /// Left join `other` onto `self` by index.
    ///
    /// Rows of `self` without a partner get nulls; for duplicated keys in
    /// `other` the first row wins. The result keeps `self`'s index.
    ///
    /// # Errors
    /// Returns `InvalidInput` if a non-index column name appears on both sides
    pub fn join(&self, other: &Self) -> Result<Self> {
        let right_keys = other.index_keys()?;
        let mut lookup: FxHashMap<&str, u32> = FxHashMap::default();
        for (position, key) in right_keys.iter().enumerate() {
            if let Some(key) = key {
                let position = u32::try_from(position)
                    .map_err(|_| Error::InvalidInput("frame too large".to_string()))?;
                lookup.entry(key.as_str()).or_insert(position);
            }
        }
        let indices: UInt32Array = self
            .index_keys()?
            .iter()
            .map(|key| key.as_deref().and_then(|k| lookup.get(k).copied()))
            .collect();

        let left_schema = self.batch.schema();
        let mut fields: Vec<Field> = left_schema
            .fields()
            .iter()
            .map(|f| f.as_ref().clone())
            .collect();
        let mut columns = self.batch.columns().to_vec();

        let right_schema = other.batch.schema();
        for (position, field) in right_schema.fields().iter().enumerate() {
            if other.index.as_deref() == Some(field.name().as_str()) {
                continue;
            }
            if left_schema.index_of(field.name()).is_ok() {
                return Err(Error::InvalidInput(format!(
                    "columns overlap on join: '{}'",
                    field.name()
                )));
            }
            let joined = take(other.batch.column(position).as_ref(), &indices, None)?;
            fields.push(Field::new(field.name(), field.data_type().clone(), true));
            columns.push(joined);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?;
        Ok(Self {
            batch,
            index: self.index.clone(),
        })
    }

    /// Numeric, non-index columns minus `exclude`, in batch order.
    #[must_use]
    pub fn numeric_columns(&self, exclude: &[&str]) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .filter(|f| f.data_type().is_numeric())
            .map(|f| f.name().clone())
            .filter(|name| Some(name.as_str()) != self.index.as_deref())
            .filter(|name| !exclude.contains(&name.as_str()))
            .collect()
    }

    /// A numeric column as `f64` values, nulls as `NaN`.
    ///
    /// # Errors
    /// Returns error if the column is missing or not numeric
    pub fn float_column(&self, name: &str) -> Result<Vec<f64>> {
        let column = self.column(name)?;
        if !column.data_type().is_numeric() {
            return Err(Error::InvalidInput(format!(
                "column '{name}' has type {}, expected a numeric type",
                column.data_type()
            )));
        }
        let values = cast(column, &DataType::Float64)?;
        let values = values
            .as_any()
            .downcast_ref::<Float64Array>()
            .ok_or_else(|| Error::InvalidInput(format!("column '{name}' failed to cast")))?;
        Ok(values.iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }

    /// Row-major matrix of the named numeric columns, nulls as `0.0`.
    ///
    /// # Errors
    /// Returns error if any column is missing or not numeric
    pub fn feature_matrix(&self, columns: &[String]) -> Result<Vec<Vec<f64>>> {
        let mut rows = vec![Vec::with_capacity(columns.len()); self.num_rows()];
        for name in columns {
            for (row, value) in rows.iter_mut().zip(self.float_column(name)?) {
                row.push(if value.is_nan() { 0.0 } else { value });
            }
        }
        Ok(rows)
    }
}

fn fill_text(fill: &Value) -> String {
    fill.as_str()
        .map_or_else(|| fill.to_string(), str::to_owned)
}
