//! Batch upload orchestration.
//!
//! Partitions validated entries into ordered, size-bounded batches and
//! dispatches them in waves: each wave sends up to the concurrency limit of
//! batches at once and waits for all of them to settle before the next wave
//! starts. In-flight requests are therefore bounded by construction, with no
//! queueing beyond the wave boundary.
//!
//! The dispatched requests are concurrent asynchronous I/O on the caller's
//! executor, not separate threads. If any batch fails, no further waves are
//! dispatched; batches that already succeeded stay committed server-side, so
//! a failed job can leave a partially imported dataset.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::transform::EntryRecord;
use crate::upload::client::BulkEntryClient;

// ─────────────────────────────────────────────────────────────────────────────
// EntrySink Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Upload operations the orchestrator needs, as a trait so tests can fake
/// the remote collaborator.
pub trait EntrySink: Send + Sync {
    /// Uploads one batch of entries, returning the created count.
    fn create_entries_bulk<'a>(
        &'a self,
        dataset_id: &'a Uuid,
        entries: &'a [EntryRecord],
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + 'a>>;
}

impl EntrySink for BulkEntryClient {
    fn create_entries_bulk<'a>(
        &'a self,
        dataset_id: &'a Uuid,
        entries: &'a [EntryRecord],
    ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + 'a>> {
        Box::pin(BulkEntryClient::create_entries_bulk(self, dataset_id, entries))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Public Types
// ─────────────────────────────────────────────────────────────────────────────

/// A contiguous, order-preserving slice of entries.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    /// Zero-based position of this batch in the job.
    pub index: usize,
    /// The entries of this batch, in source order.
    pub entries: Vec<EntryRecord>,
}

/// Progress event emitted after each completed wave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    /// The job this event belongs to.
    pub job_id: Uuid,
    /// Batches settled so far.
    pub completed_batches: usize,
    /// Total batches in the job.
    pub total_batches: usize,
    /// completed/total, rounded to the nearest percent.
    pub percent: u8,
    /// Entries created so far.
    pub created: u64,
}

/// Terminal state of an import job.
#[derive(Debug)]
pub enum ImportOutcome {
    /// Every batch succeeded.
    Completed { created: u64 },
    /// A batch failed; later waves were never dispatched.
    Failed {
        /// The first error encountered, in batch-index order.
        error: AppError,
        /// Entries created by batches that succeeded before the failure.
        created: u64,
        /// Number of batches that completed successfully.
        completed_batches: usize,
    },
}

impl ImportOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ImportOutcome::Completed { .. })
    }

    /// Entries created, regardless of outcome.
    pub fn created(&self) -> u64 {
        match self {
            ImportOutcome::Completed { created } => *created,
            ImportOutcome::Failed { created, .. } => *created,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Partitioning
// ─────────────────────────────────────────────────────────────────────────────

/// Splits entries into contiguous ordered batches of at most `batch_size`.
///
/// The last batch may be shorter. Batch order reflects entry order.
///
/// # Panics
///
/// Panics if `batch_size` is 0.
pub fn partition_batches(entries: Vec<EntryRecord>, batch_size: usize) -> Vec<ImportBatch> {
    assert!(batch_size > 0, "batch_size must be greater than 0");

    let mut batches = Vec::with_capacity(entries.len().div_ceil(batch_size));
    let mut remaining = entries;

    while !remaining.is_empty() {
        let rest = remaining.split_off(remaining.len().min(batch_size));
        batches.push(ImportBatch {
            index: batches.len(),
            entries: remaining,
        });
        remaining = rest;
    }

    batches
}

// ─────────────────────────────────────────────────────────────────────────────
// BatchUploadOrchestrator
// ─────────────────────────────────────────────────────────────────────────────

/// Drives one import job from validated entries to a terminal outcome.
pub struct BatchUploadOrchestrator<S: EntrySink> {
    sink: Arc<S>,
    dataset_id: Uuid,
    job_id: Uuid,
    batch_size: usize,
    concurrency: usize,
    progress: Option<mpsc::UnboundedSender<ImportProgress>>,
}

impl<S: EntrySink> BatchUploadOrchestrator<S> {
    /// Creates an orchestrator for the given dataset.
    ///
    /// # Panics
    ///
    /// Panics if the configured batch size or concurrency limit is 0.
    pub fn new(sink: Arc<S>, dataset_id: Uuid, config: &ImportConfig) -> Self {
        assert!(config.batch_size > 0, "batch_size must be greater than 0");
        assert!(config.concurrency > 0, "concurrency must be greater than 0");

        Self {
            sink,
            dataset_id,
            job_id: Uuid::new_v4(),
            batch_size: config.batch_size,
            concurrency: config.concurrency,
            progress: None,
        }
    }

    /// Attaches a progress channel; one event is sent per completed wave.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ImportProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Runs the job to a terminal outcome.
    pub async fn run(&self, entries: Vec<EntryRecord>) -> ImportOutcome {
        let batches = partition_batches(entries, self.batch_size);
        let total_batches = batches.len();

        if total_batches == 0 {
            return ImportOutcome::Completed { created: 0 };
        }

        info!(
            "[IMPORT] Job {} starting: {} batches, concurrency {}",
            self.job_id, total_batches, self.concurrency
        );

        let mut created: u64 = 0;
        let mut completed_batches: usize = 0;

        for wave in batches.chunks(self.concurrency) {
            let dispatched = wave.iter().map(|batch| async move {
                let result = self
                    .sink
                    .create_entries_bulk(&self.dataset_id, &batch.entries)
                    .await;
                (batch.index, result)
            });

            // Settles the whole wave; results come back in batch-index order
            let results = join_all(dispatched).await;

            let mut first_error: Option<(usize, AppError)> = None;
            for (index, result) in results {
                match result {
                    Ok(n) => {
                        created += n;
                        completed_batches += 1;
                    }
                    Err(e) => {
                        if first_error.is_none() {
                            first_error = Some((index, e));
                        }
                    }
                }
            }

            if let Some((index, error)) = first_error {
                warn!(
                    "[IMPORT] Job {} halted: batch {} failed after {}/{} batches ({})",
                    self.job_id, index, completed_batches, total_batches, error
                );
                return ImportOutcome::Failed {
                    error,
                    created,
                    completed_batches,
                };
            }

            self.emit_progress(completed_batches, total_batches, created);
        }

        info!(
            "[IMPORT] Job {} complete: {} entries created in {} batches",
            self.job_id, created, total_batches
        );

        ImportOutcome::Completed { created }
    }

    /// Emits a progress event if a channel is attached.
    fn emit_progress(&self, completed_batches: usize, total_batches: usize, created: u64) {
        if let Some(ref tx) = self.progress {
            let percent =
                ((completed_batches as f64 / total_batches as f64) * 100.0).round() as u8;
            let _ = tx.send(ImportProgress {
                job_id: self.job_id,
                completed_batches,
                total_batches,
                percent,
                created,
            });
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
