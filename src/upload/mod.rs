//! Batch upload: the HTTP client for the bulk entries endpoint and the
//! wave-based orchestrator that drives it under a concurrency bound.

mod client;
mod orchestrator;

pub use client::BulkEntryClient;
pub use orchestrator::{
    partition_batches, BatchUploadOrchestrator, EntrySink, ImportBatch, ImportOutcome,
    ImportProgress,
};
