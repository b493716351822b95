//! Row-record conversion helpers shared by the loader and dispatcher.

use polars::prelude::*;
use serde_json::{Map, Value};

/// Columns whose dtype participates in numeric operations (describe,
/// correlation, groupby aggregation).
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float32
            | DataType::Float64
            | DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
    )
}

/// Names of the numeric columns in frame order.
pub fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|col| is_numeric_dtype(col.dtype()))
        .map(|col| col.name().to_string())
        .collect()
}

/// Column name -> dtype string, in frame order.
pub fn dtype_map(df: &DataFrame) -> Map<String, Value> {
    df.get_columns()
        .iter()
        .map(|col| {
            (
                col.name().to_string(),
                Value::String(col.dtype().to_string()),
            )
        })
        .collect()
}

/// Column name -> null count, in frame order.
pub fn null_count_map(df: &DataFrame) -> Map<String, Value> {
    df.get_columns()
        .iter()
        .map(|col| (col.name().to_string(), Value::from(col.null_count())))
        .collect()
}

/// Convert one cell to a JSON value. NaN floats become null, like a
/// JSON-serialized pandas record.
pub fn any_value_to_json(value: &AnyValue) -> Value {
    match value {
        AnyValue::Null => Value::Null,
        AnyValue::Boolean(b) => Value::Bool(*b),
        AnyValue::String(s) => Value::String((*s).to_string()),
        AnyValue::StringOwned(s) => Value::String(s.to_string()),
        AnyValue::Int8(v) => Value::from(*v),
        AnyValue::Int16(v) => Value::from(*v),
        AnyValue::Int32(v) => Value::from(*v),
        AnyValue::Int64(v) => Value::from(*v),
        AnyValue::UInt8(v) => Value::from(*v),
        AnyValue::UInt16(v) => Value::from(*v),
        AnyValue::UInt32(v) => Value::from(*v),
        AnyValue::UInt64(v) => Value::from(*v),
        AnyValue::Float32(v) => f64_to_json(f64::from(*v)),
        AnyValue::Float64(v) => f64_to_json(*v),
        other => Value::String(other.to_string().trim_matches('"').to_string()),
    }
}

pub fn f64_to_json(v: f64) -> Value {
    serde_json::Number::from_f64(v).map_or(Value::Null, Value::Number)
}

/// First `limit` rows as a list of `{column: value}` records,
/// preserving column order.
pub fn head_records(df: &DataFrame, limit: usize) -> PolarsResult<Vec<Value>> {
    let take = limit.min(df.height());
    let columns = df.get_columns();
    let mut records = Vec::with_capacity(take);

    for i in 0..take {
        let mut record = Map::with_capacity(columns.len());
        for col in columns {
            let value = col.get(i)?;
            record.insert(col.name().to_string(), any_value_to_json(&value));
        }
        records.push(Value::Object(record));
    }

    Ok(records)
}

/// Non-null f64 values of a numeric column, nulls dropped.
pub fn column_values(df: &DataFrame, name: &str) -> PolarsResult<Vec<f64>> {
    let casted = df.column(name)?.cast(&DataType::Float64)?;
    let ca = casted.f64()?;
    Ok(ca.into_iter().flatten().filter(|v| !v.is_nan()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("a".into(), vec![1i64, 2, 3]),
            Column::new("b".into(), vec!["x", "y", "z"]),
        ])
        .unwrap()
    }

    #[test]
    fn numeric_columns_exclude_strings() {
        let df = sample_frame();
        assert_eq!(numeric_column_names(&df), vec!["a".to_string()]);
    }

    #[test]
    fn head_records_preserve_order_and_types() {
        let df = sample_frame();
        let records = head_records(&df, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["a"], Value::from(1));
        assert_eq!(records[0]["b"], Value::from("x"));
    }

    #[test]
    fn nan_serializes_as_null() {
        assert_eq!(f64_to_json(f64::NAN), Value::Null);
    }
}
