//! Raw source reading with encoding and delimiter auto-detection.
//!
//! Turns uploaded bytes into a ragged matrix of string cells. No header
//! interpretation happens here; that is the assembler's job.

use std::path::Path;

use crate::error::{SourceError, SourceResult};

/// One uploaded source: its display name and its rows of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSource {
    pub name: String,
    pub rows: Vec<Vec<String>>,
}

impl RawSource {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Convenience constructor from string slices.
    pub fn from_strs(name: &str, rows: &[&[&str]]) -> Self {
        Self::new(
            name,
            rows.iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    /// Length of the widest row.
    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }
}

/// Result of parsing with metadata
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub source: RawSource,
    /// Detected or used encoding
    pub encoding: String,
    /// Detected or used delimiter
    pub delimiter: char,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" | "" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the specified encoding
pub fn decode_content(bytes: &[u8], encoding: &str) -> String {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF".as_slice()).unwrap_or(bytes);
    match encoding.to_lowercase().as_str() {
        "iso-8859-1" | "latin-1" | "latin1" => {
            encoding_rs::ISO_8859_15.decode(bytes).0.to_string()
        }
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252.decode(bytes).0.to_string(),
        _ => String::from_utf8_lossy(bytes).to_string(),
    }
}

/// Detect the delimiter by counting occurrences in the first line
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().next().unwrap_or("");

    let separators = [',', ';', '\t', '|'];
    let mut best_sep = ',';
    let mut best_count = 0;

    for &sep in &separators {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }

    best_sep
}

/// Parse delimited text into a ragged row matrix.
///
/// Rows keep their own length; blank lines are dropped.
pub fn parse_matrix(content: &str, delimiter: char) -> SourceResult<Vec<Vec<String>>> {
    let delimiter = u8::try_from(delimiter).map_err(|_| {
        SourceError::EncodingError(format!("delimiter '{}' is not a single byte", delimiter))
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record.map_err(|e| SourceError::ParseError {
            line: e.position().map(|p| p.line() as usize).unwrap_or(idx + 1),
            message: e.to_string(),
        })?;
        let cells: Vec<String> = record.iter().map(|c| c.to_string()).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        rows.push(cells);
    }

    Ok(rows)
}

/// Parse source bytes with auto-detection of encoding and delimiter.
pub fn parse_bytes_auto(name: &str, bytes: &[u8]) -> SourceResult<ParseResult> {
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding);
    let delimiter = detect_delimiter(&content);
    let rows = parse_matrix(&content, delimiter)?;

    Ok(ParseResult {
        source: RawSource::new(name, rows),
        encoding,
        delimiter,
    })
}

/// Parse a source file with auto-detection of encoding and delimiter.
///
/// The file name becomes the source name.
pub fn parse_file_auto<P: AsRef<Path>>(path: P) -> SourceResult<ParseResult> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("source");
    parse_bytes_auto(name, &bytes)
}
