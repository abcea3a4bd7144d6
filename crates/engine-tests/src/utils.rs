use crate::memory::{MemoryDatabase, MemoryFactory};
use engine_config::{Configuration, OperationMode, loader};
use engine_core::eval::functions::FunctionRegistry;
use engine_runtime::execution::{
    importer::{ImportSettings, Importer},
    summary::ImportSummary,
};
use model::{core::value::Value, records::record::Record};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tempfile::TempDir;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

/// No import in these tests should take anywhere near this long.
pub const DEADLINE: Duration = Duration::from_secs(30);

pub const PEOPLE: &str = "people";

/// Configuration for `people(id, name)` fed from two-column input.
pub fn people_config(mode: OperationMode) -> Configuration {
    let json = format!(
        r#"{{
            "operationMode": "{mode}",
            "connectionUrl": "memory://test",
            "targetTable": "{PEOPLE}",
            "primaryKeys": ["id"],
            "columnMappings": {{ "0": "id", "1": "name" }},
            "batchSize": 10
        }}"#
    );
    loader::load_str(&json, None).expect("valid test configuration")
}

pub fn people_db() -> Arc<MemoryDatabase> {
    let db = MemoryDatabase::new();
    db.create_table(PEOPLE, &["id"]);
    db
}

pub fn person(id: impl ToString, name: &str) -> Record {
    [
        ("id", Value::String(id.to_string())),
        ("name", Value::from(name)),
    ]
    .into_iter()
    .collect()
}

/// Writes `lines` as `name` under `dir`.
pub fn write_csv(dir: &TempDir, name: &str, lines: &[String]) -> PathBuf {
    let path = dir.path().join(name);
    let mut body = lines.join("\n");
    body.push('\n');
    fs::write(&path, body).expect("write csv fixture");
    path
}

/// `id,name` lines for the given ids, in that order.
pub fn lines_for(ids: impl IntoIterator<Item = u64>) -> Vec<String> {
    ids.into_iter().map(|id| format!("{id},name-{id}")).collect()
}

/// A fixed, non-sorted permutation of `1..=n`.
pub fn shuffled(n: u64) -> Vec<u64> {
    let stride = (1..n.max(2))
        .rev()
        .find(|s| gcd(*s, n) == 1 && *s > n / 3)
        .unwrap_or(1);
    (0..n).map(|i| (i * stride) % n + 1).collect()
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 { a } else { gcd(b, a % b) }
}

pub fn importer(db: &Arc<MemoryDatabase>, config: Configuration, threads: usize) -> Importer {
    Importer::new(
        config,
        &FunctionRegistry::with_builtins(),
        MemoryFactory::new(Arc::clone(db)),
        ImportSettings {
            threads,
            progress: None,
        },
        CancellationToken::new(),
    )
    .expect("importer")
}

/// Imports `path` into `db`, failing the test if it takes too long.
pub async fn import(
    db: &Arc<MemoryDatabase>,
    config: Configuration,
    threads: usize,
    path: &Path,
) -> ImportSummary {
    let importer = importer(db, config, threads);
    timeout(DEADLINE, importer.import_file(path))
        .await
        .expect("import finished in time")
        .expect("import succeeded")
}

pub fn names(rows: &[Record]) -> Vec<(String, String)> {
    rows.iter()
        .map(|r| {
            let text = |column: &str| r.value(column).key_text().unwrap_or_default();
            (text("id"), text("name"))
        })
        .collect()
}
