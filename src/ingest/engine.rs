//! Ingestion engine: size-keyed parse strategy and background execution.
//!
//! Small files are parsed synchronously in the caller's context; files at or
//! above the configured threshold are handed to a blocking worker task so the
//! interactive context stays responsive. The worker reports cumulative row
//! counts over a watch channel and observes a cancellation token between
//! rows, so destroying the session tears the parse down promptly.

use std::path::Path;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::ingest::parser::{parse_blocking, ParseOutcome};

// ─────────────────────────────────────────────────────────────────────────────
// Strategy
// ─────────────────────────────────────────────────────────────────────────────

/// How a file will be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Parse synchronously in the calling context.
    Inline,
    /// Parse on a background worker task.
    Worker,
}

// ─────────────────────────────────────────────────────────────────────────────
// ParseHandle
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to an in-flight background parse.
///
/// Exposes the progress channel and the cancellation token. Once the token
/// is cancelled the worker terminates at the next row boundary and no
/// further progress or completion values are produced.
pub struct ParseHandle {
    cancel: CancellationToken,
    progress: watch::Receiver<u64>,
    task: JoinHandle<Result<ParseOutcome, AppError>>,
}

impl ParseHandle {
    /// Returns a receiver for cumulative parsed-row counts.
    pub fn progress(&self) -> watch::Receiver<u64> {
        self.progress.clone()
    }

    /// Requests cancellation of the parse.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the parse to finish and returns its outcome.
    pub async fn join(self) -> Result<ParseOutcome, AppError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(AppError::Cancelled),
            Err(e) => Err(AppError::Internal(format!("Parse task panicked: {}", e))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// IngestEngine
// ─────────────────────────────────────────────────────────────────────────────

/// Parses uploaded files, choosing an execution strategy by file size.
#[derive(Debug, Clone)]
pub struct IngestEngine {
    config: ImportConfig,
}

impl IngestEngine {
    /// Creates an engine with the given configuration.
    pub fn new(config: ImportConfig) -> Self {
        Self { config }
    }

    /// Picks the parse strategy for a file of the given size.
    pub fn strategy_for(&self, file_size_bytes: u64) -> ParseStrategy {
        if file_size_bytes < self.config.worker_threshold_bytes {
            ParseStrategy::Inline
        } else {
            ParseStrategy::Worker
        }
    }

    /// Parses a file, selecting the strategy from its on-disk size.
    ///
    /// # Errors
    ///
    /// Propagates parser errors; never returns a partial table.
    pub async fn parse(&self, path: &Path) -> Result<ParseOutcome, AppError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AppError::ParseFailed(format!("Failed to read file metadata: {}", e)))?;

        match self.strategy_for(metadata.len()) {
            ParseStrategy::Inline => {
                debug!("[INGEST] Parsing inline ({} bytes)", metadata.len());
                parse_blocking(path, &self.config, &CancellationToken::new(), &|_| {})
            }
            ParseStrategy::Worker => {
                debug!("[INGEST] Parsing on worker ({} bytes)", metadata.len());
                self.submit(path, CancellationToken::new()).join().await
            }
        }
    }

    /// Submits a file to a background worker and returns its handle.
    ///
    /// The caller supplies the cancellation token so the parse can be tied
    /// into a broader session lifetime.
    pub fn submit(&self, path: &Path, cancel: CancellationToken) -> ParseHandle {
        let (tx, rx) = watch::channel(0u64);
        let path = path.to_owned();
        let config = self.config.clone();
        let worker_cancel = cancel.clone();

        let task = tokio::task::spawn_blocking(move || {
            let result = parse_blocking(&path, &config, &worker_cancel, &|rows| {
                let _ = tx.send(rows);
            });
            match &result {
                Ok(outcome) => info!(
                    "[INGEST] Parse complete: {} rows, {} headers",
                    outcome.table.total_rows,
                    outcome.table.headers.len()
                ),
                Err(AppError::Cancelled) => info!("[INGEST] Parse cancelled"),
                Err(e) => info!("[INGEST] Parse failed: {}", e),
            }
            result
        });

        ParseHandle {
            cancel,
            progress: rx,
            task,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
