//! Bulk entry ingestion pipeline for the dataset reconciliation admin tool.
//!
//! Turns an arbitrary-size delimited file into validated, normalized entry
//! records and uploads them to a dataset in size-bounded batches with a
//! bounded number of in-flight requests:
//!
//! 1. **Preflight** ([`validation`]): sample-based checks before parsing.
//! 2. **Ingestion** ([`ingest`]): incremental CSV parse, inline or on a
//!    background worker depending on file size, with progress and
//!    cancellation.
//! 3. **Mapping** ([`mapping`]): auto-detected, user-editable column to
//!    entry-field mapping.
//! 4. **Transform** ([`transform`]): rows + mapping into entry records,
//!    classifying each row valid or invalid.
//! 5. **Upload** ([`upload`]): wave-based batch dispatch to the backend.
//! 6. **Wizard** ([`wizard`]): the explicit state machine tying the steps
//!    together and owning session state and reset.

pub mod cache;
pub mod config;
pub mod error;
pub mod ingest;
pub mod mapping;
pub mod transform;
pub mod upload;
pub mod validation;
pub mod wizard;

pub use cache::LabelCache;
pub use config::ImportConfig;
pub use error::{AppError, ErrorPresentation};
pub use ingest::{IngestEngine, ParseOutcome, ParsedTable};
pub use mapping::{ColumnMapping, EntryField};
pub use transform::{transform, EntryRecord, TransformOutcome};
pub use upload::{BatchUploadOrchestrator, BulkEntryClient, EntrySink, ImportOutcome};
pub use wizard::{ImportWizard, WizardProgress, WizardStep};
