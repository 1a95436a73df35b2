//! Tunable constants for the import pipeline.
//!
//! All thresholds live in one place so the embedding application can adjust
//! them without touching pipeline code.

/// Configuration for a single import session.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    /// Files at or above this size are parsed on a background worker
    /// (default: 1 MiB).
    pub worker_threshold_bytes: u64,
    /// Maximum parsed rows retained for on-screen preview (default: 1000).
    pub preview_rows: usize,
    /// Maximum entries per upload batch (default: 500).
    pub batch_size: usize,
    /// Maximum concurrently in-flight upload batches (default: 3).
    pub concurrency: usize,
    /// Parse progress is reported every this many rows (default: 1000).
    pub progress_every_rows: u64,
    /// Size of the sample buffer read by the preflight check (default: 256 KiB).
    pub preflight_sample_bytes: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            worker_threshold_bytes: 1024 * 1024,
            preview_rows: 1000,
            batch_size: 500,
            concurrency: 3,
            progress_every_rows: 1000,
            preflight_sample_bytes: 256 * 1024,
        }
    }
}

impl ImportConfig {
    /// Sets the background-worker size threshold.
    pub fn worker_threshold_bytes(mut self, bytes: u64) -> Self {
        self.worker_threshold_bytes = bytes;
        self
    }

    /// Sets the preview row cap.
    pub fn preview_rows(mut self, rows: usize) -> Self {
        self.preview_rows = rows;
        self
    }

    /// Sets the upload batch size.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    /// Sets the upload concurrency limit.
    pub fn concurrency(mut self, limit: usize) -> Self {
        self.concurrency = limit;
        self
    }

    /// Sets the parse progress granularity.
    pub fn progress_every_rows(mut self, rows: u64) -> Self {
        self.progress_every_rows = rows;
        self
    }
}
