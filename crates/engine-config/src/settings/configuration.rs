use crate::settings::{csv_options::CsvOptions, value_def::ValueDefinition};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

pub const DEFAULT_BATCH_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationMode {
    Insert,
    #[default]
    Merge,
    InsertOnly,
}

impl OperationMode {
    pub fn requires_primary_keys(&self) -> bool {
        matches!(self, OperationMode::Merge | OperationMode::InsertOnly)
    }
}

impl fmt::Display for OperationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationMode::Insert => "INSERT",
            OperationMode::Merge => "MERGE",
            OperationMode::InsertOnly => "INSERTONLY",
        };
        write!(f, "{name}")
    }
}

/// Everything one import run needs to know about the target table and how input
/// rows map onto it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Configuration {
    pub operation_mode: OperationMode,
    pub connection_url: String,
    pub connection_properties: BTreeMap<String, String>,
    pub target_table: String,
    pub primary_keys: Vec<String>,
    /// Zero-based input column index to target column name.
    pub column_mappings: BTreeMap<usize, String>,
    /// Mapped columns that feed transforms and keys but are never written.
    pub transient_columns: Vec<String>,
    /// Columns produced by the map function rather than by the column mapping.
    pub synthetic_columns: Vec<String>,
    pub insert_values: BTreeMap<String, ValueDefinition>,
    pub update_values: BTreeMap<String, ValueDefinition>,
    pub transform: BTreeMap<String, ValueDefinition>,
    pub map: Option<String>,
    pub batch_size: i64,
    pub force_update: bool,
    #[serde(rename = "ignoreNullPK")]
    pub ignore_null_pk: bool,
    #[serde(rename = "ignoreDuplicatePK")]
    pub ignore_duplicate_pk: bool,
    /// Rows read per input file; zero reads everything.
    pub limit: u64,
    pub csv_options: CsvOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extend: Option<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            operation_mode: OperationMode::default(),
            connection_url: String::new(),
            connection_properties: BTreeMap::new(),
            target_table: String::new(),
            primary_keys: Vec::new(),
            column_mappings: BTreeMap::new(),
            transient_columns: Vec::new(),
            synthetic_columns: Vec::new(),
            insert_values: BTreeMap::new(),
            update_values: BTreeMap::new(),
            transform: BTreeMap::new(),
            map: None,
            batch_size: DEFAULT_BATCH_SIZE,
            force_update: false,
            ignore_null_pk: false,
            ignore_duplicate_pk: false,
            limit: 0,
            csv_options: CsvOptions::default(),
            extend: None,
        }
    }
}

impl Configuration {
    /// Batch size with non-positive values clamped to 1.
    pub fn effective_batch_size(&self) -> usize {
        usize::try_from(self.batch_size.max(1)).unwrap_or(1)
    }

    pub fn is_transient(&self, column: &str) -> bool {
        self.transient_columns
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_keys
            .iter()
            .any(|c| c.eq_ignore_ascii_case(column))
    }

    /// Columns written to the target table: mapped columns in source index
    /// order without transient ones, followed by synthetic columns sorted by
    /// name.
    pub fn target_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .column_mappings
            .values()
            .filter(|name| !self.is_transient(name))
            .cloned()
            .collect();

        let synthetic: BTreeSet<&String> = self.synthetic_columns.iter().collect();
        for name in synthetic {
            if !self.is_transient(name) && !columns.iter().any(|c| c.eq_ignore_ascii_case(name)) {
                columns.push(name.clone());
            }
        }
        columns
    }

    /// Every column name a mapped record may carry, transient ones included.
    pub fn known_columns(&self) -> Vec<&str> {
        self.column_mappings
            .values()
            .chain(self.synthetic_columns.iter())
            .chain(self.transient_columns.iter())
            .map(String::as_str)
            .collect()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_merge_with_batch_of_100() {
        let config: Configuration = serde_json::from_str("{}").unwrap();
        assert_eq!(config.operation_mode, OperationMode::Merge);
        assert_eq!(config.effective_batch_size(), 100);
        assert_eq!(config.csv_options.separator_char, ',');
    }

    #[test]
    fn non_positive_batch_size_becomes_one() {
        let mut config = Configuration::default();
        config.batch_size = 0;
        assert_eq!(config.effective_batch_size(), 1);
        config.batch_size = -20;
        assert_eq!(config.effective_batch_size(), 1);
    }

    #[test]
    fn parses_camel_case_document() {
        let config: Configuration = serde_json::from_str(
            r#"{
                "operationMode": "INSERTONLY",
                "targetTable": "people",
                "primaryKeys": ["id"],
                "columnMappings": {"0": "id", "2": "name", "1": "tmp"},
                "transientColumns": ["tmp"],
                "syntheticColumns": ["z_extra", "a_extra"],
                "ignoreNullPK": true,
                "ignoreDuplicatePK": true,
                "csvOptions": {"separatorChar": ";", "skipLines": 1}
            }"#,
        )
        .unwrap();

        assert_eq!(config.operation_mode, OperationMode::InsertOnly);
        assert!(config.ignore_null_pk && config.ignore_duplicate_pk);
        assert_eq!(config.csv_options.separator_char, ';');
        assert_eq!(config.csv_options.quote_char, '"');
        assert_eq!(
            config.target_columns(),
            vec!["id", "name", "a_extra", "z_extra"]
        );
    }
}
