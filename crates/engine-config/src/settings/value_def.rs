use serde::{Deserialize, Serialize};
use std::fmt;

/// How a column value is produced when it is not taken verbatim from the input.
///
/// In JSON a plain string, number or boolean is a literal, `{"sql": "..."}` is
/// raw SQL inlined into the statement and `{"function": "name"}` calls a
/// registered function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueDefinition {
    Sql { sql: String },
    Function { function: String },
    Boolean(bool),
    Number(serde_json::Number),
    String(String),
}

impl ValueDefinition {
    pub fn produces_sql(&self) -> bool {
        matches!(self, ValueDefinition::Sql { .. })
    }
}

impl fmt::Display for ValueDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDefinition::Sql { sql } => write!(f, "sql({sql})"),
            ValueDefinition::Function { function } => write!(f, "{function}()"),
            ValueDefinition::Boolean(v) => write!(f, "{v}"),
            ValueDefinition::Number(v) => write!(f, "{v}"),
            ValueDefinition::String(v) => write!(f, "\"{v}\""),
        }
    }
}
