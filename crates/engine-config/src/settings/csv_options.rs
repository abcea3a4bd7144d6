use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CsvOptions {
    pub separator_char: char,
    pub quote_char: char,
    /// `None` disables backslash-style escaping; doubled quotes still work.
    pub escape_char: Option<char>,
    /// Lines dropped from the top of every input file.
    pub skip_lines: u64,
    pub ignore_leading_white_space: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        CsvOptions {
            separator_char: ',',
            quote_char: '"',
            escape_char: Some('\\'),
            skip_lines: 0,
            ignore_leading_white_space: true,
        }
    }
}
