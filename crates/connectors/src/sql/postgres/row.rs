use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::{core::value::Value, records::record::Record};
use rust_decimal::Decimal as RustDecimal;
use std::str::FromStr;
use tokio_postgres::{Row, types::Type};
use tracing::warn;
use uuid::Uuid;

/// Decodes every column of a Postgres row into a [`Record`].
pub fn to_record(row: &Row) -> Record {
    let mut record = Record::with_capacity(row.len());
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode(row, idx, column.type_()).unwrap_or_else(|| {
            warn!(
                column = column.name(),
                pg_type = column.type_().name(),
                "Unsupported or undecodable column value, reading as NULL"
            );
            Value::Null
        });
        record.insert(column.name(), value);
    }
    record
}

/// `Some(Value::Null)` for SQL NULL, `None` when the type cannot be decoded.
fn decode(row: &Row, idx: usize, ty: &Type) -> Option<Value> {
    fn get<'a, T>(row: &'a Row, idx: usize) -> Option<Option<T>>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        row.try_get::<_, Option<T>>(idx).ok()
    }

    let value = match *ty {
        Type::BOOL => get::<bool>(row, idx)?.map(Value::Boolean),
        Type::INT2 => get::<i16>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT4 => get::<i32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::INT8 => get::<i64>(row, idx)?.map(Value::Int),
        Type::OID => get::<u32>(row, idx)?.map(|v| Value::Int(v.into())),
        Type::FLOAT4 => get::<f32>(row, idx)?.map(|v| Value::Float(v.into())),
        Type::FLOAT8 => get::<f64>(row, idx)?.map(Value::Float),
        Type::NUMERIC => get::<RustDecimal>(row, idx)?
            .and_then(|d| BigDecimal::from_str(&d.to_string()).ok())
            .map(Value::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx)?.map(Value::String)
        }
        Type::UUID => get::<Uuid>(row, idx)?.map(Value::Uuid),
        Type::DATE => get::<NaiveDate>(row, idx)?.map(Value::Date),
        Type::TIME => get::<NaiveTime>(row, idx)?.map(Value::Time),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx)?.map(Value::TimestampNaive),
        Type::TIMESTAMPTZ => get::<DateTime<Utc>>(row, idx)?.map(Value::Timestamp),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx)?.map(Value::Json),
        Type::BYTEA => get::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        _ => get::<String>(row, idx)?.map(Value::String),
    };
    Some(value.unwrap_or(Value::Null))
}
