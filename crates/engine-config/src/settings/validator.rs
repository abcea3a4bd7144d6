use crate::{
    error::ConfigError,
    settings::configuration::{Configuration, OperationMode},
};
use std::collections::HashSet;
use tracing::{info, warn};

const LARGE_BATCH_SIZE: i64 = 100_000;

/// Checks a configuration before any connection is opened.
///
/// All problems are collected and reported together.
pub fn validate(config: &Configuration) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    if config.target_table.trim().is_empty() {
        errors.push("targetTable is required".to_string());
    }
    if config.connection_url.trim().is_empty() {
        errors.push("connectionUrl is required".to_string());
    }

    validate_mappings(config, &mut errors);
    validate_primary_keys(config, &mut errors);

    for (column, definition) in &config.transform {
        if definition.produces_sql() {
            errors.push(format!(
                "transform for '{column}' produces SQL, which is only allowed in insertValues and updateValues"
            ));
        }
    }

    if config.batch_size <= 0 {
        warn!("Batch size {} is not positive, using 1", config.batch_size);
    } else if config.batch_size > LARGE_BATCH_SIZE {
        warn!(
            "Batch size {} is very large, may cause memory issues",
            config.batch_size
        );
    }

    if !errors.is_empty() {
        return Err(ConfigError::ValidationFailed(errors));
    }

    info!(
        mode = %config.operation_mode,
        table = %config.target_table,
        batch_size = config.effective_batch_size(),
        "Configuration validated"
    );
    Ok(())
}

fn validate_mappings(config: &Configuration, errors: &mut Vec<String>) {
    if config.column_mappings.is_empty() {
        errors.push("columnMappings must map at least one input column".to_string());
        return;
    }

    let mut seen = HashSet::new();
    for name in config.column_mappings.values() {
        if name.trim().is_empty() {
            errors.push("columnMappings contains an empty column name".to_string());
        } else if !seen.insert(name.to_ascii_lowercase()) {
            errors.push(format!("column '{name}' is mapped more than once"));
        }
    }

    if config.map.is_none() && !config.synthetic_columns.is_empty() {
        errors.push("syntheticColumns require a map function".to_string());
    }
}

fn validate_primary_keys(config: &Configuration, errors: &mut Vec<String>) {
    if config.primary_keys.is_empty() {
        if config.operation_mode.requires_primary_keys() {
            errors.push(format!(
                "primaryKeys are required in {} mode",
                config.operation_mode
            ));
        }
        if config.ignore_duplicate_pk {
            errors.push("ignoreDuplicatePK requires primaryKeys".to_string());
        }
        return;
    }

    let known = config.known_columns();
    for key in &config.primary_keys {
        let mapped = known.iter().any(|c| c.eq_ignore_ascii_case(key));
        if !mapped && !config.transform.contains_key(key) && config.map.is_none() {
            errors.push(format!(
                "primary key '{key}' is neither mapped nor produced by a transform"
            ));
        }
    }

    if config.operation_mode == OperationMode::Insert && config.ignore_null_pk {
        warn!("ignoreNullPK has no effect in INSERT mode");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::value_def::ValueDefinition;

    fn base() -> Configuration {
        let mut config = Configuration::default();
        config.connection_url = "postgres://localhost/db".into();
        config.target_table = "people".into();
        config.primary_keys = vec!["id".into()];
        config.column_mappings.insert(0, "id".into());
        config.column_mappings.insert(1, "name".into());
        config
    }

    fn errors_of(config: &Configuration) -> Vec<String> {
        match validate(config) {
            Err(ConfigError::ValidationFailed(errors)) => errors,
            other => panic!("expected validation failure, got {other:?}"),
        }
    }

    #[test]
    fn accepts_minimal_merge_configuration() {
        assert!(validate(&base()).is_ok());
    }

    #[test]
    fn merge_and_insert_only_need_primary_keys() {
        for mode in [OperationMode::Merge, OperationMode::InsertOnly] {
            let mut config = base();
            config.operation_mode = mode;
            config.primary_keys.clear();
            assert_eq!(errors_of(&config).len(), 1);
        }

        let mut insert = base();
        insert.operation_mode = OperationMode::Insert;
        insert.primary_keys.clear();
        assert!(validate(&insert).is_ok());
    }

    #[test]
    fn rejects_sql_transforms_and_duplicate_mappings() {
        let mut config = base();
        config.transform.insert(
            "name".into(),
            ValueDefinition::Sql {
                sql: "upper(name)".into(),
            },
        );
        config.column_mappings.insert(2, "NAME".into());

        let errors = errors_of(&config);
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.contains("produces SQL")));
        assert!(errors.iter().any(|e| e.contains("mapped more than once")));
    }

    #[test]
    fn reports_unknown_primary_key() {
        let mut config = base();
        config.primary_keys = vec!["code".into()];
        assert!(errors_of(&config)[0].contains("'code'"));
    }
}
