use serde::{Deserialize, Serialize};

/// A row as it came out of the input file, before column mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRow {
    /// 1-based position of the row within its source, after skipped lines.
    pub position: u64,
    pub fields: Vec<String>,
}

impl RawRow {
    pub fn new(position: u64, fields: Vec<String>) -> Self {
        RawRow { position, fields }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
