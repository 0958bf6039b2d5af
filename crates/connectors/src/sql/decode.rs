use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::core::value::Value;
use tokio_postgres::types::Type;
use tokio_postgres::Row;
use tracing::debug;

/// Decode one driver row into pipeline values, in column order.
///
/// The source type zoo is narrowed to the pipeline's `Value` vocabulary;
/// a column of a type the pipeline has no use for decodes as Null (and is
/// reported once per chunk at debug level by the caller's logging).
pub fn decode_row(row: &Row) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| decode_cell(row, idx, column.type_()))
        .collect()
}

/// Column names of a driver row, as the query aliased them.
pub fn column_names(row: &Row) -> Vec<String> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect()
}

fn decode_cell(row: &Row, idx: usize, ty: &Type) -> Value {
    if *ty == Type::BOOL {
        opt(row.try_get::<_, Option<bool>>(idx), Value::Boolean)
    } else if *ty == Type::INT2 {
        opt(row.try_get::<_, Option<i16>>(idx), |v| Value::Int(v as i64))
    } else if *ty == Type::INT4 {
        opt(row.try_get::<_, Option<i32>>(idx), |v| Value::Int(v as i64))
    } else if *ty == Type::INT8 {
        opt(row.try_get::<_, Option<i64>>(idx), Value::Int)
    } else if *ty == Type::FLOAT4 {
        opt(row.try_get::<_, Option<f32>>(idx), |v| {
            Value::Float(v as f64)
        })
    } else if *ty == Type::FLOAT8 {
        opt(row.try_get::<_, Option<f64>>(idx), Value::Float)
    } else if *ty == Type::TIMESTAMP {
        opt(row.try_get::<_, Option<NaiveDateTime>>(idx), Value::Timestamp)
    } else if *ty == Type::TIMESTAMPTZ {
        opt(row.try_get::<_, Option<DateTime<Utc>>>(idx), |v| {
            Value::Timestamp(v.naive_utc())
        })
    } else if *ty == Type::DATE {
        opt(row.try_get::<_, Option<NaiveDate>>(idx), Value::Date)
    } else if *ty == Type::TEXT || *ty == Type::VARCHAR || *ty == Type::BPCHAR || *ty == Type::NAME
    {
        opt(row.try_get::<_, Option<String>>(idx), Value::String)
    } else {
        match row.try_get::<_, Option<String>>(idx) {
            Ok(Some(v)) => Value::String(v),
            Ok(None) => Value::Null,
            Err(_) => {
                debug!("column {idx} has unsupported source type '{ty}', decoding as null");
                Value::Null
            }
        }
    }
}

fn opt<T>(cell: Result<Option<T>, tokio_postgres::Error>, wrap: impl Fn(T) -> Value) -> Value {
    match cell {
        Ok(Some(v)) => wrap(v),
        Ok(None) => Value::Null,
        Err(err) => {
            debug!("cell decode failed ({err}), decoding as null");
            Value::Null
        }
    }
}
