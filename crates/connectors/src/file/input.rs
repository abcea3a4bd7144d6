use crate::file::csv::error::FileError;
use regex::Regex;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

/// Which files of an input directory are imported.
#[derive(Debug, Clone, Default)]
pub struct InputFilter {
    include: Option<Regex>,
    skip: Option<Regex>,
}

impl InputFilter {
    pub fn new(include: Option<&str>, skip: Option<&str>) -> Result<Self, FileError> {
        Ok(InputFilter {
            include: include.map(compile).transpose()?,
            skip: skip.map(compile).transpose()?,
        })
    }

    /// Matches against the file name only.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let included = self.include.as_ref().is_none_or(|re| re.is_match(name));
        let skipped = self.skip.as_ref().is_some_and(|re| re.is_match(name));
        included && !skipped
    }
}

fn compile(pattern: &str) -> Result<Regex, FileError> {
    Regex::new(pattern).map_err(|source| FileError::Pattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// Resolves the input path to the list of files to import.
///
/// A file is returned as is, filters aside. A directory yields its regular
/// files sorted by name; subdirectories are not descended into.
pub fn discover_inputs(path: &Path, filter: &InputFilter) -> Result<Vec<PathBuf>, FileError> {
    let metadata = fs::metadata(path).map_err(|source| match source.kind() {
        std::io::ErrorKind::NotFound => FileError::NotFound(path.to_path_buf()),
        _ => FileError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    if metadata.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let io_err = |source: std::io::Error| FileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut files = Vec::new();
    for entry in fs::read_dir(path).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let candidate = entry.path();
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        if filter.accepts(&candidate) {
            files.push(candidate);
        } else {
            debug!(file = %candidate.display(), "Skipping input file");
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn lists_directory_files_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["b.csv", "a.csv", "notes.txt", "a.bak.csv"] {
            fs::write(dir.path().join(name), "1\n").unwrap();
        }
        fs::create_dir(dir.path().join("nested.csv")).unwrap();

        let filter = InputFilter::new(Some(r"\.csv$"), Some(r"\.bak\.")).unwrap();
        let files = discover_inputs(dir.path(), &filter).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.csv", "b.csv"]);
    }

    #[test]
    fn single_file_bypasses_filters() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("data.txt");
        fs::write(&file, "1\n").unwrap();

        let filter = InputFilter::new(Some(r"\.csv$"), None).unwrap();
        assert_eq!(discover_inputs(&file, &filter).unwrap(), vec![file]);
    }

    #[test]
    fn reports_missing_input_and_bad_patterns() {
        let dir = tempdir().unwrap();
        let missing = discover_inputs(&dir.path().join("nope"), &InputFilter::default());
        assert!(matches!(missing, Err(FileError::NotFound(_))));
        assert!(matches!(
            InputFilter::new(Some("("), None),
            Err(FileError::Pattern { .. })
        ));
    }
}
