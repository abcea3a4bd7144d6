use chrono::{Datelike, NaiveDateTime, Timelike};
use model::core::value::Value;
use mysql_async::Value as MySqlValue;
use mysql_common::params::Params;

pub struct MySqlParam(MySqlValue);

impl MySqlParam {
    /// MySQL converts text parameters to the column type itself, so only
    /// typed values need mapping.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Int(i) => MySqlParam(MySqlValue::Int(*i)),
            Value::Float(f) => MySqlParam(MySqlValue::Double(*f)),
            Value::Decimal(d) => MySqlParam(MySqlValue::Bytes(d.to_string().into_bytes())),
            Value::String(s) => MySqlParam(MySqlValue::Bytes(s.clone().into_bytes())),
            Value::Boolean(b) => MySqlParam(MySqlValue::Int(i64::from(*b))),
            Value::Json(j) => MySqlParam(MySqlValue::Bytes(j.to_string().into_bytes())),
            Value::Uuid(u) => MySqlParam(MySqlValue::Bytes(u.to_string().into_bytes())),
            Value::Bytes(b) => MySqlParam(MySqlValue::Bytes(b.clone())),
            Value::Date(d) => MySqlParam(MySqlValue::Date(
                d.year() as u16,
                d.month() as u8,
                d.day() as u8,
                0,
                0,
                0,
                0,
            )),
            Value::Time(t) => MySqlParam(MySqlValue::Time(
                false,
                0,
                t.hour() as u8,
                t.minute() as u8,
                t.second() as u8,
                t.nanosecond() / 1_000,
            )),
            Value::Timestamp(ts) => MySqlParam(date_time(&ts.naive_utc())),
            Value::TimestampNaive(ts) => MySqlParam(date_time(ts)),
            Value::Null => MySqlParam(MySqlValue::NULL),
        }
    }
}

fn date_time(ts: &NaiveDateTime) -> MySqlValue {
    MySqlValue::Date(
        ts.year() as u16,
        ts.month() as u8,
        ts.day() as u8,
        ts.hour() as u8,
        ts.minute() as u8,
        ts.second() as u8,
        ts.and_utc().timestamp_subsec_micros(),
    )
}

pub struct MySqlParamStore {
    pub params: Vec<MySqlParam>,
}

impl MySqlParamStore {
    pub fn from_values(values: &[Value]) -> Self {
        let params = values.iter().map(MySqlParam::from_value).collect();
        MySqlParamStore { params }
    }

    pub fn params(&self) -> Params {
        if self.params.is_empty() {
            return Params::Empty;
        }
        let mysql_values: Vec<MySqlValue> = self.params.iter().map(|p| p.0.clone()).collect();
        Params::Positional(mysql_values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn maps_values_positionally() {
        let ts = NaiveDate::from_ymd_opt(2024, 5, 6)
            .and_then(|d| d.and_hms_micro_opt(7, 8, 9, 10))
            .unwrap();
        let store = MySqlParamStore::from_values(&[
            Value::Int(1),
            Value::from("abc"),
            Value::TimestampNaive(ts),
            Value::Null,
        ]);

        match store.params() {
            Params::Positional(values) => {
                assert_eq!(values[0], MySqlValue::Int(1));
                assert_eq!(values[1], MySqlValue::Bytes(b"abc".to_vec()));
                assert_eq!(values[2], MySqlValue::Date(2024, 5, 6, 7, 8, 9, 10));
                assert_eq!(values[3], MySqlValue::NULL);
            }
            other => panic!("unexpected params {other:?}"),
        }
        assert_eq!(MySqlParamStore::from_values(&[]).params(), Params::Empty);
    }
}
