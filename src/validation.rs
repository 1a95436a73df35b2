//! Sample-based file preflight for the import wizard.
//!
//! Checks a fixed-size sample of the selected file before the full parse is
//! started, making the check safe for very large files while still catching
//! common issues:
//! - UTF-8 encoding errors
//! - Missing or duplicate headers
//! - Empty files
//!
//! It also estimates the total row count from the sampled rows, which the
//! wizard uses to map parse progress onto an approximate percentage.

use std::collections::HashSet;
use std::io::Cursor;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::config::ImportConfig;
use crate::error::AppError;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Maximum number of records to inspect in the sample.
const MAX_SAMPLED_RECORDS: usize = 1000;

/// UTF-8 BOM bytes.
pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// Result of the preflight check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    /// Whether the file passed all checks (no errors).
    pub ok: bool,
    /// Errors that prevent parsing.
    pub errors: Vec<PreflightError>,
    /// Warnings that do not prevent parsing.
    pub warnings: Vec<PreflightWarning>,
    /// Statistics about the file.
    pub stats: FileStats,
}

/// Statistics collected during the preflight check.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileStats {
    /// Total file size in bytes.
    pub file_size_bytes: u64,
    /// Number of bytes actually inspected.
    pub sample_bytes: u64,
    /// Headers found in the file.
    pub headers: Vec<String>,
    /// Estimated total data rows, extrapolated from the sample average.
    pub estimated_total_rows: Option<u64>,
}

/// Problems that prevent the file from being parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreflightError {
    /// File is empty (0 bytes).
    EmptyFile,
    /// Sample is not valid UTF-8.
    NotUtf8,
    /// No header row found.
    NoHeaders,
    /// The same header name appears more than once.
    DuplicateHeader { name: String },
    /// CSV parsing error in the sample.
    CsvParseError { message: String },
}

/// Findings worth surfacing but not fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreflightWarning {
    /// File starts with a UTF-8 BOM (the parser strips it).
    HasBom,
    /// File is large enough to be parsed on a background worker.
    BackgroundParse { size_bytes: u64 },
    /// Only a sample of the file was inspected.
    SampleOnly { sampled_rows: u64 },
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the preflight check against a file.
///
/// Reads at most `config.preflight_sample_bytes` from the file, so this is
/// safe to call on files of any size.
///
/// # Errors
///
/// Returns `AppError` only for catastrophic I/O failures. Findings about the
/// file itself are reported in `FileReport.errors` / `FileReport.warnings`.
pub async fn preflight(path: &Path, config: &ImportConfig) -> Result<FileReport, AppError> {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read file metadata: {}", e)))?;

    let file_size_bytes = metadata.len();

    if file_size_bytes == 0 {
        return Ok(FileReport {
            ok: false,
            errors: vec![PreflightError::EmptyFile],
            warnings: vec![],
            stats: FileStats::default(),
        });
    }

    if file_size_bytes >= config.worker_threshold_bytes {
        warnings.push(PreflightWarning::BackgroundParse {
            size_bytes: file_size_bytes,
        });
    }

    // Read the sample buffer
    let sample_size = (file_size_bytes as usize).min(config.preflight_sample_bytes);
    let mut buffer = vec![0u8; sample_size];

    let mut file = File::open(path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to open file: {}", e)))?;

    file.read_exact(&mut buffer)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read file: {}", e)))?;

    let sample_bytes = sample_size as u64;
    let is_sample_only = file_size_bytes > sample_bytes;

    let has_bom = buffer.starts_with(UTF8_BOM);
    if has_bom {
        warnings.push(PreflightWarning::HasBom);
    }

    let data_start = if has_bom { UTF8_BOM.len() } else { 0 };
    let data = &buffer[data_start..];

    if std::str::from_utf8(data).is_err() {
        return Ok(FileReport {
            ok: false,
            errors: vec![PreflightError::NotUtf8],
            warnings,
            stats: FileStats {
                file_size_bytes,
                sample_bytes,
                ..FileStats::default()
            },
        });
    }

    let cursor = Cursor::new(data);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(cursor);

    let headers: Vec<String> = match reader.headers() {
        Ok(h) => h.iter().map(String::from).collect(),
        Err(e) => {
            errors.push(PreflightError::CsvParseError {
                message: e.to_string(),
            });
            return Ok(FileReport {
                ok: false,
                errors,
                warnings,
                stats: FileStats {
                    file_size_bytes,
                    sample_bytes,
                    ..FileStats::default()
                },
            });
        }
    };

    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        errors.push(PreflightError::NoHeaders);
    }

    // Duplicate headers would make the column mapping ambiguous
    let mut seen = HashSet::new();
    for header in &headers {
        if !seen.insert(header.as_str()) {
            errors.push(PreflightError::DuplicateHeader {
                name: header.clone(),
            });
        }
    }

    let mut sampled_rows: u64 = 0;
    let mut sampled_record_bytes: usize = 0;

    for result in reader.records().take(MAX_SAMPLED_RECORDS) {
        match result {
            Ok(record) => {
                sampled_rows += 1;
                // fields + separators + newline (estimate)
                sampled_record_bytes +=
                    record.iter().map(|f| f.len()).sum::<usize>() + record.len() + 1;
            }
            Err(e) => {
                // A record cut off at the end of the sample is expected; a
                // parse error elsewhere is real.
                if is_sample_only && is_likely_truncation_error(&e) {
                    break;
                }
                errors.push(PreflightError::CsvParseError {
                    message: e.to_string(),
                });
                break;
            }
        }
    }

    if is_sample_only {
        warnings.push(PreflightWarning::SampleOnly { sampled_rows });
    }

    let estimated_total_rows = if sampled_rows > 0 && sampled_record_bytes > 0 {
        let avg_bytes_per_row = sampled_record_bytes as f64 / sampled_rows as f64;
        let header_bytes = data.len().saturating_sub(sampled_record_bytes);
        let data_bytes = file_size_bytes.saturating_sub(header_bytes as u64);
        Some((data_bytes as f64 / avg_bytes_per_row).ceil() as u64)
    } else {
        None
    };

    let ok = errors.is_empty();

    Ok(FileReport {
        ok,
        errors,
        warnings,
        stats: FileStats {
            file_size_bytes,
            sample_bytes,
            headers,
            estimated_total_rows,
        },
    })
}

/// Checks if the error is likely due to the sample cutting a record short.
///
/// A record sliced mid-way usually surfaces as an EOF-style error or as a
/// record with too few fields; the full parse is the authority on ragged
/// rows, so both are ignored at the sample boundary.
fn is_likely_truncation_error(err: &csv::Error) -> bool {
    if matches!(err.kind(), csv::ErrorKind::UnequalLengths { .. }) {
        return true;
    }
    let msg = err.to_string().to_lowercase();
    msg.contains("unexpected eof")
        || msg.contains("record ends in a quote")
        || msg.contains("premature eof")
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[tokio::test]
    async fn empty_file_fails() {
        let file = create_temp_csv(b"");
        let report = preflight(file.path(), &ImportConfig::default())
            .await
            .expect("preflight should not fail");

        assert!(!report.ok);
        assert!(report.errors.contains(&PreflightError::EmptyFile));
    }

    #[tokio::test]
    async fn non_utf8_fails() {
        let file = create_temp_csv(b"Name,Value\n\xff\xfe,123\n");
        let report = preflight(file.path(), &ImportConfig::default())
            .await
            .expect("preflight should not fail");

        assert!(!report.ok);
        assert!(report.errors.contains(&PreflightError::NotUtf8));
    }

    #[tokio::test]
    async fn bom_is_warned_not_fatal() {
        let mut content = Vec::new();
        content.extend_from_slice(UTF8_BOM);
        content.extend_from_slice(b"id,name\na1,Item 1\n");
        let file = create_temp_csv(&content);

        let report = preflight(file.path(), &ImportConfig::default())
            .await
            .expect("preflight should not fail");

        assert!(report.ok, "BOM should not fail preflight: {:?}", report.errors);
        assert!(report.warnings.contains(&PreflightWarning::HasBom));
        assert_eq!(report.stats.headers, vec!["id", "name"]);
    }

    #[tokio::test]
    async fn duplicate_headers_fail() {
        let file = create_temp_csv(b"id,name,id\na1,Item 1,a2\n");
        let report = preflight(file.path(), &ImportConfig::default())
            .await
            .expect("preflight should not fail");

        assert!(!report.ok);
        assert!(report
            .errors
            .contains(&PreflightError::DuplicateHeader { name: "id".into() }));
    }

    #[tokio::test]
    async fn headers_only_is_ok() {
        let file = create_temp_csv(b"id,name,url\n");
        let report = preflight(file.path(), &ImportConfig::default())
            .await
            .expect("preflight should not fail");

        assert!(report.ok);
        assert_eq!(report.stats.headers, vec!["id", "name", "url"]);
        assert!(report.stats.estimated_total_rows.is_none());
    }

    #[tokio::test]
    async fn estimates_rows_from_sample() {
        let mut content = String::from("id,name\n");
        for i in 0..50 {
            content.push_str(&format!("a{},Item {}\n", i, i));
        }
        let file = create_temp_csv(content.as_bytes());

        let report = preflight(file.path(), &ImportConfig::default())
            .await
            .expect("preflight should not fail");

        assert!(report.ok);
        let estimate = report
            .stats
            .estimated_total_rows
            .expect("should have an estimate");
        // Sample covers the whole file, so the estimate should be close
        assert!((45..=55).contains(&estimate), "estimate was {}", estimate);
    }

    #[tokio::test]
    async fn truncated_record_at_sample_boundary_is_ignored() {
        // Build a file bigger than the sample window so the last sampled
        // record is cut mid-way
        let config = ImportConfig {
            preflight_sample_bytes: 4096,
            ..ImportConfig::default()
        };

        let mut content = String::from("id,name,notes\n");
        for i in 0..500 {
            content.push_str(&format!("a{},\"Item {}\",\"note for row {}\"\n", i, i, i));
        }
        assert!(content.len() > config.preflight_sample_bytes);
        let file = create_temp_csv(content.as_bytes());

        let report = preflight(file.path(), &config)
            .await
            .expect("preflight should not fail");

        assert!(
            report.ok,
            "truncation at sample edge should not fail: {:?}",
            report.errors
        );
        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, PreflightWarning::SampleOnly { .. })));
    }

    #[tokio::test]
    async fn large_file_gets_background_warning() {
        let config = ImportConfig::default().worker_threshold_bytes(16);
        let file = create_temp_csv(b"id,name\na1,Item 1\n");

        let report = preflight(file.path(), &config)
            .await
            .expect("preflight should not fail");

        assert!(report
            .warnings
            .iter()
            .any(|w| matches!(w, PreflightWarning::BackgroundParse { .. })));
    }
}
