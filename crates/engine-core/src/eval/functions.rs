use crate::error::EvalError;
use chrono::Utc;
use model::{core::value::Value, records::record::Record};
use std::{collections::HashMap, fmt, sync::Arc};
use uuid::Uuid;

/// Computes the value of `column` for one record.
pub type ScalarFunction = Arc<dyn Fn(&str, &Record) -> Result<Value, EvalError> + Send + Sync>;

/// Turns one mapped record into zero or more records.
pub type MapFunction = Arc<dyn Fn(Record) -> Result<Vec<Record>, EvalError> + Send + Sync>;

/// Named functions that value definitions and the `map` option refer to.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    scalars: HashMap<String, ScalarFunction>,
    maps: HashMap<String, MapFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with `trim`, `upper`, `lower`, `nullIfEmpty`, `uuid`
    /// and `now`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_scalar("trim", |column, record| {
            Ok(map_text(record.value(column), |s| s.trim().to_string()))
        });
        registry.register_scalar("upper", |column, record| {
            Ok(map_text(record.value(column), |s| s.to_uppercase()))
        });
        registry.register_scalar("lower", |column, record| {
            Ok(map_text(record.value(column), |s| s.to_lowercase()))
        });
        registry.register_scalar("nullIfEmpty", |column, record| {
            Ok(match record.value(column) {
                Value::String(s) if s.trim().is_empty() => Value::Null,
                other => other,
            })
        });
        registry.register_scalar("uuid", |_, _| Ok(Value::Uuid(Uuid::new_v4())));
        registry.register_scalar("now", |_, _| Ok(Value::Timestamp(Utc::now())));
        registry
    }

    pub fn register_scalar<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(&str, &Record) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.scalars.insert(name.into(), Arc::new(function));
    }

    pub fn register_map<F>(&mut self, name: impl Into<String>, function: F)
    where
        F: Fn(Record) -> Result<Vec<Record>, EvalError> + Send + Sync + 'static,
    {
        self.maps.insert(name.into(), Arc::new(function));
    }

    pub fn scalar(&self, name: &str) -> Result<ScalarFunction, EvalError> {
        self.scalars
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownFunction(name.to_string()))
    }

    pub fn map_function(&self, name: &str) -> Result<MapFunction, EvalError> {
        self.maps
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownMapFunction(name.to_string()))
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scalars: Vec<_> = self.scalars.keys().collect();
        let mut maps: Vec<_> = self.maps.keys().collect();
        scalars.sort();
        maps.sort();
        f.debug_struct("FunctionRegistry")
            .field("scalars", &scalars)
            .field("maps", &maps)
            .finish()
    }
}

fn map_text(value: Value, f: impl FnOnce(&str) -> String) -> Value {
    match value {
        Value::String(s) => Value::String(f(&s)),
        other => other,
    }
}
