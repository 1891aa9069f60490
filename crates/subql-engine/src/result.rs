//! Materialized query results

use crate::error::ExecutionError;
use arrow::array::{
    ArrayRef, BinaryArray, BooleanArray, Date32Array, Decimal128Array, Float32Array, Float64Array,
    Int16Array, Int32Array, Int64Array, Int8Array, NullArray, StringArray,
    TimestampMicrosecondArray,
};
use arrow::datatypes::{DataType as ArrowType, Field as ArrowField, Schema as ArrowSchema, TimeUnit};
use arrow::record_batch::RecordBatch;
use serde::Serialize;
use std::sync::Arc;
use subql_ir::{DataType, Schema, Value};

/// Rows returned by a statement, with a read cursor for `fetchone`.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    columns: Vec<String>,
    types: Vec<DataType>,
    rows: Vec<Vec<Value>>,
    cursor: usize,
}

/// JSON form of a result, as served over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct JsonResult {
    pub columns: Vec<String>,
    pub types: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
    pub row_count: usize,
}

impl QueryResult {
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns: schema.names(),
            types: schema.types(),
            rows,
            cursor: 0,
        }
    }

    /// Empty result of a statement that produces no rows.
    pub fn empty() -> Self {
        Self::new(Schema::new(vec![]), vec![])
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn types(&self) -> &[DataType] {
        &self.types
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Next unread row.
    pub fn fetchone(&mut self) -> Option<Vec<Value>> {
        let row = self.rows.get(self.cursor).cloned();
        if row.is_some() {
            self.cursor += 1;
        }
        row
    }

    /// All unread rows.
    pub fn fetchall(&mut self) -> Vec<Vec<Value>> {
        let rest = self.rows[self.cursor..].to_vec();
        self.cursor = self.rows.len();
        rest
    }

    /// Values of the named column, matched case-insensitively.
    pub fn column(&self, name: &str) -> Option<Vec<Value>> {
        let index = self
            .columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))?;
        Some(self.rows.iter().map(|r| r[index].clone()).collect())
    }

    pub fn into_rows(self) -> Vec<Vec<Value>> {
        self.rows
    }

    pub fn to_json(&self) -> JsonResult {
        JsonResult {
            columns: self.columns.clone(),
            types: self.types.iter().map(|t| t.to_string()).collect(),
            rows: self
                .rows
                .iter()
                .map(|row| row.iter().map(json_value).collect())
                .collect(),
            row_count: self.rows.len(),
        }
    }

    /// Columnar copy of the result.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ExecutionError> {
        let mut fields = Vec::with_capacity(self.columns.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(self.columns.len());

        for (index, (name, data_type)) in self.columns.iter().zip(&self.types).enumerate() {
            let values: Vec<&Value> = self.rows.iter().map(|r| &r[index]).collect();
            let array = column_array(&values, *data_type)?;
            fields.push(ArrowField::new(name, array.data_type().clone(), true));
            arrays.push(array);
        }

        Ok(RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), arrays)?)
    }
}

fn json_value(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Boolean(b) => serde_json::Value::Bool(*b),
        Value::Int8(v) => serde_json::Value::from(*v),
        Value::Int16(v) => serde_json::Value::from(*v),
        Value::Int32(v) => serde_json::Value::from(*v),
        Value::Int64(v) => serde_json::Value::from(*v),
        Value::Float32(v) => serde_json::json!(v),
        Value::Float64(v) => serde_json::json!(v),
        // decimals keep their exact text
        other => serde_json::Value::String(other.to_string()),
    }
}

fn column_array(values: &[&Value], data_type: DataType) -> Result<ArrayRef, ExecutionError> {
    let ints = || values.iter().map(|v| v.as_i64()).collect::<Vec<_>>();

    Ok(match data_type {
        DataType::Boolean => Arc::new(BooleanArray::from(
            values.iter().map(|v| v.as_bool()).collect::<Vec<_>>(),
        )),
        DataType::Int8 => Arc::new(Int8Array::from(
            ints().into_iter().map(|v| v.and_then(|x| i8::try_from(x).ok())).collect::<Vec<_>>(),
        )),
        DataType::Int16 => Arc::new(Int16Array::from(
            ints().into_iter().map(|v| v.and_then(|x| i16::try_from(x).ok())).collect::<Vec<_>>(),
        )),
        DataType::Int32 => Arc::new(Int32Array::from(
            ints().into_iter().map(|v| v.and_then(|x| i32::try_from(x).ok())).collect::<Vec<_>>(),
        )),
        DataType::Int64 => Arc::new(Int64Array::from(ints())),
        DataType::Float32 => Arc::new(Float32Array::from(
            values.iter().map(|v| v.as_f64().map(|f| f as f32)).collect::<Vec<_>>(),
        )),
        DataType::Float64 => Arc::new(Float64Array::from(
            values.iter().map(|v| v.as_f64()).collect::<Vec<_>>(),
        )),
        DataType::Decimal { precision, scale } => Arc::new(
            Decimal128Array::from(values.iter().map(|v| v.as_scaled(scale)).collect::<Vec<_>>())
                .with_precision_and_scale(precision, scale as i8)?,
        ),
        DataType::Varchar => Arc::new(StringArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Varchar(s) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Blob => Arc::new(BinaryArray::from_iter(values.iter().map(|v| match v {
            Value::Blob(b) => Some(b.as_slice()),
            _ => None,
        }))),
        DataType::Date => Arc::new(Date32Array::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Date(d) => Some(*d),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Timestamp => Arc::new(TimestampMicrosecondArray::from(
            values
                .iter()
                .map(|v| match v {
                    Value::Timestamp(t) => Some(*t),
                    _ => None,
                })
                .collect::<Vec<_>>(),
        )),
        DataType::Null => Arc::new(NullArray::new(values.len())),
    })
}

/// Arrow type for a column of `data_type`.
pub fn arrow_type(data_type: DataType) -> ArrowType {
    match data_type {
        DataType::Boolean => ArrowType::Boolean,
        DataType::Int8 => ArrowType::Int8,
        DataType::Int16 => ArrowType::Int16,
        DataType::Int32 => ArrowType::Int32,
        DataType::Int64 => ArrowType::Int64,
        DataType::Float32 => ArrowType::Float32,
        DataType::Float64 => ArrowType::Float64,
        DataType::Decimal { precision, scale } => ArrowType::Decimal128(precision, scale as i8),
        DataType::Varchar => ArrowType::Utf8,
        DataType::Blob => ArrowType::Binary,
        DataType::Date => ArrowType::Date32,
        DataType::Timestamp => ArrowType::Timestamp(TimeUnit::Microsecond, None),
        DataType::Null => ArrowType::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Array;
    use subql_ir::Field;

    fn result() -> QueryResult {
        QueryResult::new(
            Schema::new(vec![
                Field::new("id", DataType::Int32, false),
                Field::new("salary", DataType::Decimal { precision: 10, scale: 2 }, true),
            ]),
            vec![
                vec![Value::Int32(1), Value::Decimal { value: 9_500_000, scale: 2 }],
                vec![Value::Int32(2), Value::Null],
            ],
        )
    }

    #[test]
    fn test_cursor() {
        let mut result = result();
        assert_eq!(result.fetchone().unwrap()[0], Value::Int32(1));
        assert_eq!(result.fetchall().len(), 1);
        assert!(result.fetchone().is_none());
        assert_eq!(result.row_count(), 2);
        assert_eq!(result.column("ID").unwrap(), vec![Value::Int32(1), Value::Int32(2)]);
    }

    #[test]
    fn test_record_batch_types() {
        let batch = result().to_record_batch().unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.schema().field(0).data_type(), &arrow_type(DataType::Int32));
        assert_eq!(batch.schema().field(1).data_type(), &ArrowType::Decimal128(10, 2));
        assert!(batch.column(1).is_null(1));
    }

    #[test]
    fn test_json_keeps_decimal_text() {
        let json = result().to_json();
        assert_eq!(json.types, vec!["INTEGER", "DECIMAL(10,2)"]);
        assert_eq!(json.rows[0][1], serde_json::Value::String("95000.00".into()));
        assert_eq!(json.rows[1][1], serde_json::Value::Null);
    }
}
