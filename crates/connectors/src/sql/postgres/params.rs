use crate::sql::base::error::DbError;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::core::value::Value;
use rust_decimal::Decimal as RustDecimal;
use std::{error::Error, str::FromStr};
use tokio_postgres::types::{IsNull, Json as PgJson, ToSql, Type, to_sql_checked};
use uuid::Uuid;

/// SQL NULL that binds to a parameter of any type.
#[derive(Debug)]
struct PgNull;

impl ToSql for PgNull {
    fn to_sql(
        &self,
        _ty: &Type,
        _out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        Ok(IsNull::Yes)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

pub struct PgParam(Box<dyn ToSql + Sync + Send>);

fn boxed<T: ToSql + Sync + Send + 'static>(value: T) -> Box<dyn ToSql + Sync + Send> {
    Box::new(value)
}

impl PgParam {
    /// Converts `value` to the Rust type the server declared for the parameter.
    ///
    /// Input values are mostly text, so strings are parsed into the target
    /// type; anything the column type does not know is bound as text.
    pub fn coerce(value: &Value, ty: &Type) -> Result<Self, DbError> {
        if value.is_null() {
            return Ok(PgParam(boxed(PgNull)));
        }

        let fail = || DbError::Coercion {
            value: value.to_string(),
            target: ty.name().to_string(),
        };

        let param: Box<dyn ToSql + Sync + Send> = match *ty {
            Type::BOOL => boxed(value.as_bool().ok_or_else(fail)?),
            Type::INT2 => {
                let v = value.as_i64().ok_or_else(fail)?;
                boxed(i16::try_from(v).map_err(|_| fail())?)
            }
            Type::INT4 => {
                let v = value.as_i64().ok_or_else(fail)?;
                boxed(i32::try_from(v).map_err(|_| fail())?)
            }
            Type::INT8 => boxed(value.as_i64().ok_or_else(fail)?),
            Type::FLOAT4 => boxed(value.as_f64().ok_or_else(fail)? as f32),
            Type::FLOAT8 => boxed(value.as_f64().ok_or_else(fail)?),
            Type::NUMERIC => {
                let text = value.key_text().ok_or_else(fail)?;
                boxed(RustDecimal::from_str(text.trim()).map_err(|_| fail())?)
            }
            Type::UUID => match value {
                Value::Uuid(u) => boxed(*u),
                other => {
                    let text = other.key_text().ok_or_else(fail)?;
                    boxed(Uuid::parse_str(text.trim()).map_err(|_| fail())?)
                }
            },
            Type::DATE => match value {
                Value::Date(d) => boxed(*d),
                Value::TimestampNaive(t) => boxed(t.date()),
                other => boxed(parse_text::<NaiveDate>(other).ok_or_else(fail)?),
            },
            Type::TIME => match value {
                Value::Time(t) => boxed(*t),
                other => boxed(parse_text::<NaiveTime>(other).ok_or_else(fail)?),
            },
            Type::TIMESTAMP => match value {
                Value::TimestampNaive(t) => boxed(*t),
                Value::Timestamp(t) => boxed(t.naive_utc()),
                other => boxed(parse_timestamp(other).ok_or_else(fail)?),
            },
            Type::TIMESTAMPTZ => match value {
                Value::Timestamp(t) => boxed(*t),
                Value::TimestampNaive(t) => boxed(t.and_utc()),
                Value::String(s) => match DateTime::parse_from_rfc3339(s.trim()) {
                    Ok(t) => boxed(t.with_timezone(&Utc)),
                    Err(_) => boxed(parse_timestamp(value).ok_or_else(fail)?.and_utc()),
                },
                _ => return Err(fail()),
            },
            Type::JSON | Type::JSONB => match value {
                Value::Json(j) => boxed(PgJson(j.clone())),
                Value::String(s) => {
                    let json = serde_json::from_str(s)
                        .unwrap_or_else(|_| serde_json::Value::String(s.clone()));
                    boxed(PgJson(json))
                }
                other => boxed(PgJson(serde_json::Value::String(
                    other.key_text().unwrap_or_default(),
                ))),
            },
            Type::BYTEA => match value {
                Value::Bytes(b) => boxed(b.clone()),
                Value::String(s) => boxed(s.as_bytes().to_vec()),
                _ => return Err(fail()),
            },
            _ => boxed(value.key_text().ok_or_else(fail)?),
        };
        Ok(PgParam(param))
    }
}

fn parse_text<T: FromStr>(value: &Value) -> Option<T> {
    value.key_text().and_then(|s| s.trim().parse::<T>().ok())
}

fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
    let text = value.key_text()?;
    let text = text.trim();
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            NaiveDate::from_str(text)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

impl AsRef<dyn ToSql + Sync> for PgParam {
    fn as_ref(&self) -> &(dyn ToSql + Sync + 'static) {
        &*self.0
    }
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    /// Coerces each value to the matching declared parameter type.
    pub fn coerce(values: &[Value], types: &[Type]) -> Result<Self, DbError> {
        let params = values
            .iter()
            .zip(types.iter())
            .map(|(value, ty)| PgParam::coerce(value, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { params })
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|param| param.as_ref())
            .collect::<Vec<_>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_text_into_declared_types() {
        assert!(PgParam::coerce(&Value::from("42"), &Type::INT4).is_ok());
        assert!(PgParam::coerce(&Value::from("12.50"), &Type::NUMERIC).is_ok());
        assert!(PgParam::coerce(&Value::from("2024-01-31"), &Type::DATE).is_ok());
        assert!(PgParam::coerce(&Value::from("2024-01-31 08:00:00"), &Type::TIMESTAMP).is_ok());
        assert!(PgParam::coerce(&Value::from("t"), &Type::BOOL).is_ok());
        assert!(PgParam::coerce(&Value::Null, &Type::INT8).is_ok());
    }

    #[test]
    fn reports_unconvertible_values() {
        let err = PgParam::coerce(&Value::from("abc"), &Type::INT8)
            .err()
            .unwrap();
        assert!(matches!(err, DbError::Coercion { .. }));

        let overflow = PgParam::coerce(&Value::Int(70_000), &Type::INT2);
        assert!(overflow.is_err());
    }
}
