use crate::error::CliError;
use engine_runtime::execution::summary::ImportSummary;
use std::path::Path;

pub async fn write_or_print(text: &str, path: Option<&Path>) -> Result<(), CliError> {
    match path {
        Some(path) => tokio::fs::write(path, text).await?,
        None => println!("{text}"),
    }
    Ok(())
}

/// One line per input plus a total when there is more than one.
pub fn render_summaries(summaries: &[ImportSummary]) -> String {
    let mut lines: Vec<String> = summaries.iter().map(ToString::to_string).collect();
    if summaries.len() > 1 {
        let read: u64 = summaries.iter().map(|s| s.metrics.rows_read).sum();
        let applied: u64 = summaries.iter().map(ImportSummary::applied).sum();
        lines.push(format!(
            "total: {} input(s), {read} row(s) read, {applied} applied",
            summaries.len()
        ));
    }
    lines.join("\n")
}
