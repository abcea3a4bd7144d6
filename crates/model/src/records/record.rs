use crate::core::{fingerprint::Fingerprint, value::Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One mapped input row: column name to value, in mapping order.
///
/// Lookups are case-insensitive, as column names are in most SQL dialects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Record {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(column))
            .map(|(_, value)| value)
    }

    /// Value of `column`, or [`Value::Null`] when the record has no such column.
    pub fn value(&self, column: &str) -> Value {
        self.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Sets `column`, replacing an existing value in place.
    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        let column = column.into();
        match self
            .fields
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(&column))
        {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Value> {
        let idx = self
            .fields
            .iter()
            .position(|(name, _)| name.eq_ignore_ascii_case(column))?;
        Some(self.fields.remove(idx).1)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fingerprint<S: AsRef<str>>(&self, keys: &[S]) -> Fingerprint {
        let values: Vec<Value> = keys.iter().map(|k| self.value(k.as_ref())).collect();
        Fingerprint::from_values(&values)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (K, Value)>>(iter: T) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case_and_keep_order() {
        let mut record: Record = [("Id", Value::Int(1)), ("name", Value::from("a"))]
            .into_iter()
            .collect();
        record.insert("NAME", Value::from("b"));

        assert_eq!(record.len(), 2);
        assert_eq!(record.value("id"), Value::Int(1));
        assert_eq!(record.value("Name"), Value::from("b"));
        assert_eq!(record.value("missing"), Value::Null);
        assert_eq!(record.columns().collect::<Vec<_>>(), vec!["Id", "name"]);
    }

    #[test]
    fn fingerprint_uses_key_order() {
        let record: Record = [("a", Value::Int(1)), ("b", Value::Int(2))]
            .into_iter()
            .collect();
        assert_ne!(record.fingerprint(&["a", "b"]), record.fingerprint(&["b", "a"]));
        assert_eq!(record.to_string(), "{a=1, b=2}");
    }
}
