use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveTime};
use model::{core::value::Value, records::record::Record};
use mysql_async::{Column, Row, Value as MySqlValue, consts::ColumnType};
use std::str::FromStr;

const BINARY_CHARSET: u16 = 63;

/// Decodes every column of a MySQL row into a [`Record`].
pub fn to_record(row: &Row) -> Record {
    let columns = row.columns_ref();
    let mut record = Record::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value = row
            .as_ref(idx)
            .map(|raw| decode(raw, column))
            .unwrap_or(Value::Null);
        record.insert(column.name_str().into_owned(), value);
    }
    record
}

fn decode(raw: &MySqlValue, column: &Column) -> Value {
    match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(v)
            if column.column_type() == ColumnType::MYSQL_TYPE_TINY && column.column_length() == 1 =>
        {
            Value::Boolean(*v != 0)
        }
        MySqlValue::Int(v) => Value::Int(*v),
        MySqlValue::UInt(v) => match i64::try_from(*v) {
            Ok(v) => Value::Int(v),
            Err(_) => Value::Decimal(BigDecimal::from(*v)),
        },
        MySqlValue::Float(v) => Value::Float(f64::from(*v)),
        MySqlValue::Double(v) => Value::Float(*v),
        MySqlValue::Date(y, m, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d));
            match column.column_type() {
                ColumnType::MYSQL_TYPE_DATE => date.map(Value::Date).unwrap_or(Value::Null),
                _ => date
                    .and_then(|d| {
                        d.and_hms_micro_opt(u32::from(*h), u32::from(*mi), u32::from(*s), *us)
                    })
                    .map(Value::TimestampNaive)
                    .unwrap_or(Value::Null),
            }
        }
        MySqlValue::Time(negative, days, h, mi, s, us) => {
            if *negative || *days > 0 {
                let sign = if *negative { "-" } else { "" };
                let hours = u32::from(*h) + *days * 24;
                Value::String(format!("{sign}{hours:02}:{mi:02}:{s:02}"))
            } else {
                NaiveTime::from_hms_micro_opt(u32::from(*h), u32::from(*mi), u32::from(*s), *us)
                    .map(Value::Time)
                    .unwrap_or(Value::Null)
            }
        }
        MySqlValue::Bytes(bytes) => decode_bytes(bytes, column),
    }
}

fn decode_bytes(bytes: &[u8], column: &Column) -> Value {
    match column.column_type() {
        ColumnType::MYSQL_TYPE_NEWDECIMAL | ColumnType::MYSQL_TYPE_DECIMAL => {
            std::str::from_utf8(bytes)
                .ok()
                .and_then(|s| BigDecimal::from_str(s).ok())
                .map(Value::Decimal)
                .unwrap_or_else(|| Value::String(String::from_utf8_lossy(bytes).into_owned()))
        }
        ColumnType::MYSQL_TYPE_JSON => serde_json::from_slice(bytes)
            .map(Value::Json)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        _ if column.character_set() == BINARY_CHARSET => Value::Bytes(bytes.to_vec()),
        _ => match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Value::String(text),
            Err(err) => Value::Bytes(err.into_bytes()),
        },
    }
}
