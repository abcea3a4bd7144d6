use crate::file::csv::error::FileError;
use csv::{Reader, ReaderBuilder, StringRecord};
use engine_config::CsvOptions;
use model::records::raw::RawRow;
use std::{
    fs::File,
    io::{self, Read},
    path::Path,
};
use tracing::debug;

/// Pull-based supplier of raw input rows. `Ok(None)` marks end of input.
pub trait RowSource: Send {
    fn next_row(&mut self) -> Result<Option<RawRow>, FileError>;

    /// Human readable origin, for logs.
    fn describe(&self) -> String;
}

pub struct CsvRowSource<R: Read> {
    reader: Reader<R>,
    record: StringRecord,
    origin: String,
    skip_lines: u64,
    trim_leading: bool,
    position: u64,
}

impl CsvRowSource<File> {
    pub fn open(path: &Path, options: &CsvOptions) -> Result<Self, FileError> {
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => FileError::NotFound(path.to_path_buf()),
            _ => FileError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        CsvRowSource::from_reader(file, options, path.display().to_string())
    }
}

impl<R: Read> CsvRowSource<R> {
    pub fn from_reader(
        reader: R,
        options: &CsvOptions,
        origin: String,
    ) -> Result<Self, FileError> {
        let mut builder = ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(ascii(options.separator_char, "separatorChar")?)
            .quote(ascii(options.quote_char, "quoteChar")?)
            .double_quote(true);
        if let Some(escape) = options.escape_char {
            builder.escape(Some(ascii(escape, "escapeChar")?));
        }

        Ok(CsvRowSource {
            reader: builder.from_reader(reader),
            record: StringRecord::new(),
            origin,
            skip_lines: options.skip_lines,
            trim_leading: options.ignore_leading_white_space,
            position: 0,
        })
    }

    fn read_record(&mut self) -> Result<bool, FileError> {
        self.reader
            .read_record(&mut self.record)
            .map_err(|source| FileError::Csv {
                position: self.position + self.skip_lines + 1,
                source,
            })
    }
}

impl<R: Read + Send> RowSource for CsvRowSource<R> {
    fn next_row(&mut self) -> Result<Option<RawRow>, FileError> {
        while self.skip_lines > 0 && self.position == 0 {
            if !self.read_record()? {
                return Ok(None);
            }
            self.skip_lines -= 1;
            debug!(origin = %self.origin, "Skipped leading line");
        }

        if !self.read_record()? {
            return Ok(None);
        }
        self.position += 1;

        let fields = self
            .record
            .iter()
            .map(|field| {
                if self.trim_leading {
                    field.trim_start().to_string()
                } else {
                    field.to_string()
                }
            })
            .collect();
        Ok(Some(RawRow::new(self.position, fields)))
    }

    fn describe(&self) -> String {
        self.origin.clone()
    }
}

fn ascii(c: char, option: &str) -> Result<u8, FileError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| FileError::InvalidOption(format!("{option} must be ASCII, got '{c}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(input: &str, options: &CsvOptions) -> Vec<RawRow> {
        let mut source =
            CsvRowSource::from_reader(input.as_bytes(), options, "inline".into()).unwrap();
        let mut out = Vec::new();
        while let Some(row) = source.next_row().unwrap() {
            out.push(row);
        }
        out
    }

    #[test]
    fn reads_ragged_rows_with_positions() {
        let out = rows("1,a\n2,b,extra\n3\n", &CsvOptions::default());
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].fields, vec!["2", "b", "extra"]);
        assert_eq!(out[2].position, 3);
        assert_eq!(out[2].get(1), None);
    }

    #[test]
    fn honours_separator_quotes_and_skip_lines() {
        let options = CsvOptions {
            separator_char: ';',
            skip_lines: 1,
            ..CsvOptions::default()
        };
        let out = rows("id;name\n1;\"x;y\"\n2;  z\n", &options);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].fields, vec!["1", "x;y"]);
        assert_eq!(out[0].position, 1);
        assert_eq!(out[1].fields, vec!["2", "z"]);
    }

    #[test]
    fn keeps_leading_white_space_when_asked() {
        let options = CsvOptions {
            ignore_leading_white_space: false,
            ..CsvOptions::default()
        };
        let out = rows("1,  padded\n", &options);
        assert_eq!(out[0].fields[1], "  padded");
    }

    #[test]
    fn rejects_non_ascii_separator() {
        let options = CsvOptions {
            separator_char: '§',
            ..CsvOptions::default()
        };
        let result = CsvRowSource::from_reader("".as_bytes(), &options, "inline".into());
        assert!(matches!(result, Err(FileError::InvalidOption(_))));
    }

    #[test]
    fn empty_input_ends_immediately() {
        let options = CsvOptions {
            skip_lines: 3,
            ..CsvOptions::default()
        };
        assert!(rows("header\n", &options).is_empty());
    }
}
