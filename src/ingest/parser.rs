//! Incremental CSV parsing into a structured table.
//!
//! Uses the `csv` crate so embedded commas, quotes, and newlines inside
//! quoted fields are handled correctly. The parse never returns a partial
//! table: any malformed record fails the whole parse.
//!
//! Only the first `preview_rows` rows are kept for on-screen preview; the
//! full row set is returned alongside so the later transform step can run
//! over every row, not just the preview.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use csv::ReaderBuilder;
use tokio_util::sync::CancellationToken;

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::validation::UTF8_BOM;

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// One parsed data row: cells ordered exactly as the table headers.
pub type Row = Vec<String>;

/// The preview-limited view of a parsed file.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTable {
    /// Header names, unique within the table.
    pub headers: Vec<String>,
    /// Up to `preview_rows` rows retained for display.
    pub preview: Vec<Row>,
    /// Total data rows in the file (may exceed the preview length).
    pub total_rows: u64,
}

/// Everything a completed parse produces.
///
/// `rows` is the full row buffer; it is owned here and handed by reference
/// to the row transformer. The preview inside `table` holds copies of the
/// first rows only.
#[derive(Debug)]
pub struct ParseOutcome {
    pub table: ParsedTable,
    pub rows: Vec<Row>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parses a CSV file into a [`ParseOutcome`].
///
/// Blocking; the ingestion engine decides whether to run this inline or on
/// a background worker. Progress is reported through `on_progress` as a
/// cumulative row count every `config.progress_every_rows` rows.
///
/// # Errors
///
/// - `AppError::CsvInvalid` - missing or duplicate headers, malformed records
/// - `AppError::NotUtf8` - non-UTF-8 content
/// - `AppError::ParseFailed` - I/O failure while reading
/// - `AppError::Cancelled` - the cancellation token fired mid-parse
pub fn parse_blocking(
    path: &Path,
    config: &ImportConfig,
    cancel: &CancellationToken,
    on_progress: &dyn Fn(u64),
) -> Result<ParseOutcome, AppError> {
    if cancel.is_cancelled() {
        return Err(AppError::Cancelled);
    }

    let mut file = File::open(path)
        .map_err(|e| AppError::ParseFailed(format!("Failed to open file: {}", e)))?;

    skip_bom(&mut file)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(BufReader::new(file));

    let headers: Vec<String> = reader
        .headers()
        .map_err(map_csv_error)?
        .iter()
        .map(String::from)
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(AppError::CsvInvalid("file has no header row".to_string()));
    }

    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            return Err(AppError::CsvInvalid(format!(
                "duplicate header \"{}\"",
                header
            )));
        }
    }

    let mut rows: Vec<Row> = Vec::new();
    let mut preview: Vec<Row> = Vec::new();
    let mut total_rows: u64 = 0;

    for result in reader.records() {
        if cancel.is_cancelled() {
            return Err(AppError::Cancelled);
        }

        let record = result.map_err(map_csv_error)?;
        let row: Row = record.iter().map(String::from).collect();

        total_rows += 1;
        if preview.len() < config.preview_rows {
            preview.push(row.clone());
        }
        rows.push(row);

        if total_rows % config.progress_every_rows == 0 {
            on_progress(total_rows);
        }
    }

    Ok(ParseOutcome {
        table: ParsedTable {
            headers,
            preview,
            total_rows,
        },
        rows,
    })
}

/// Positions the reader past a leading UTF-8 BOM, if present.
fn skip_bom(file: &mut File) -> Result<(), AppError> {
    let mut prefix = [0u8; 3];
    let read = file
        .read(&mut prefix)
        .map_err(|e| AppError::ParseFailed(format!("Failed to read file: {}", e)))?;

    if read < UTF8_BOM.len() || &prefix[..] != UTF8_BOM {
        file.seek(SeekFrom::Start(0))
            .map_err(|e| AppError::ParseFailed(format!("Failed to seek file: {}", e)))?;
    }
    Ok(())
}

/// Maps a `csv` crate error onto the application error type.
fn map_csv_error(err: csv::Error) -> AppError {
    match err.kind() {
        csv::ErrorKind::Utf8 { .. } => AppError::NotUtf8,
        csv::ErrorKind::Io(_) => AppError::ParseFailed(err.to_string()),
        _ => AppError::CsvInvalid(err.to_string()),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
