use crate::{error::ConfigError, settings::configuration::Configuration};
use serde_json::{Map, Value};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

const EXTEND_KEY: &str = "extend";

/// Loads a configuration file, resolving its `extend` chain.
///
/// A child document is deep-merged over its parent: objects merge key by key,
/// any other value replaces the parent's. The parent path is resolved relative
/// to the directory of the file that names it.
pub fn load_file(path: impl AsRef<Path>) -> Result<Configuration, ConfigError> {
    let mut chain = Vec::new();
    let document = resolve_file(path.as_ref(), &mut chain)?;
    into_configuration(document, &path.as_ref().display().to_string())
}

/// Parses a configuration held in memory. `base_dir` anchors a relative
/// `extend` path.
pub fn load_str(json: &str, base_dir: Option<&Path>) -> Result<Configuration, ConfigError> {
    let document = parse_object(json, "<inline>")?;
    let mut chain = Vec::new();
    let document = resolve_extend(document, base_dir.unwrap_or(Path::new(".")), &mut chain)?;
    into_configuration(document, "<inline>")
}

fn resolve_file(path: &Path, chain: &mut Vec<PathBuf>) -> Result<Map<String, Value>, ConfigError> {
    let canonical = fs::canonicalize(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    if chain.contains(&canonical) {
        return Err(ConfigError::ExtendCycle(canonical));
    }
    chain.push(canonical.clone());

    let text = fs::read_to_string(&canonical).map_err(|source| ConfigError::Read {
        path: canonical.clone(),
        source,
    })?;
    let document = parse_object(&text, &canonical.display().to_string())?;
    let base_dir = canonical.parent().unwrap_or(Path::new("."));

    debug!(path = %canonical.display(), "Loaded configuration document");
    resolve_extend(document, base_dir, chain)
}

fn resolve_extend(
    mut document: Map<String, Value>,
    base_dir: &Path,
    chain: &mut Vec<PathBuf>,
) -> Result<Map<String, Value>, ConfigError> {
    let parent = match document.remove(EXTEND_KEY) {
        Some(Value::String(parent)) if !parent.is_empty() => parent,
        Some(Value::String(_)) | Some(Value::Null) | None => return Ok(document),
        Some(other) => {
            return Err(ConfigError::ValidationFailed(vec![format!(
                "'extend' must be a file path, got {other}"
            )]));
        }
    };

    let mut merged = resolve_file(&base_dir.join(parent), chain)?;
    merge_into(&mut merged, document);
    Ok(merged)
}

fn merge_into(target: &mut Map<String, Value>, overrides: Map<String, Value>) {
    for (key, value) in overrides {
        if let Value::Object(nested) = value {
            if let Some(Value::Object(existing)) = target.get_mut(&key) {
                merge_into(existing, nested);
                continue;
            }
            target.insert(key, Value::Object(nested));
        } else {
            target.insert(key, value);
        }
    }
}

fn parse_object(text: &str, origin: &str) -> Result<Map<String, Value>, ConfigError> {
    let value: Value = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ConfigError::NotAnObject(origin.to_string())),
    }
}

fn into_configuration(document: Map<String, Value>, origin: &str) -> Result<Configuration, ConfigError> {
    serde_json::from_value(Value::Object(document)).map_err(|source| ConfigError::Parse {
        origin: origin.to_string(),
        source,
    })
}
