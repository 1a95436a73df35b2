//! The import wizard: an explicit state machine sequencing upload, mapping,
//! validation, import, and completion.
//!
//! The state machine itself is a pure value type: [`transition`] maps a
//! `(step, event)` pair to the next step plus a list of effects, with no I/O
//! and no dependency on any UI framework. [`ImportWizard`] owns the session's
//! transient state, executes the effects, and drives the pipeline components.
//!
//! All mutable session state belongs to one wizard instance; there is no
//! cross-session sharing. Resetting the wizard cancels any live background
//! parse and clears every piece of session state.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::ImportConfig;
use crate::error::AppError;
use crate::ingest::{IngestEngine, ParseOutcome, ParseStrategy, ParsedTable};
use crate::mapping::{ColumnMapping, EntryField};
use crate::transform::{transform, EntryRecord};
use crate::upload::{BatchUploadOrchestrator, EntrySink, ImportOutcome, ImportProgress};
use crate::validation::preflight;

// ─────────────────────────────────────────────────────────────────────────────
// State Machine
// ─────────────────────────────────────────────────────────────────────────────

/// The wizard's steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Upload,
    Mapping,
    Validation,
    Importing,
    Complete,
}

/// Events that drive step transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEvent {
    ParseSucceeded,
    ParseFailed,
    MappingConfirmed,
    ImportStarted,
    ImportSucceeded,
    ImportFailed,
    Reset,
}

/// Side effects a transition asks the session to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardEffect {
    /// Auto-detect a column mapping from the parsed headers.
    InstallAutoMapping,
    /// Re-run the valid/invalid classification over the full row set.
    RecomputeEntries,
    /// Cancel any live background parse.
    CancelParse,
    /// Discard all session state.
    ClearSession,
}

/// Result of applying an event to a step.
#[derive(Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: WizardStep,
    pub effects: Vec<WizardEffect>,
}

/// Pure transition function of the wizard state machine.
///
/// Events that are not meaningful in the current step leave it unchanged
/// with no effects.
pub fn transition(step: WizardStep, event: WizardEvent) -> Transition {
    use WizardEffect::*;
    use WizardEvent::*;
    use WizardStep::*;

    let (next, effects) = match (step, event) {
        (_, Reset) => (Upload, vec![CancelParse, ClearSession]),
        (Upload, ParseSucceeded) => (Mapping, vec![InstallAutoMapping]),
        (Upload, ParseFailed) => (Upload, vec![]),
        (Mapping, MappingConfirmed) => (Validation, vec![RecomputeEntries]),
        (Validation, ImportStarted) => (Importing, vec![]),
        (Importing, ImportSucceeded) => (Complete, vec![]),
        (Importing, ImportFailed) => (Validation, vec![]),
        // Everything else is a no-op
        (step, _) => (step, vec![]),
    };

    Transition { next, effects }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress
// ─────────────────────────────────────────────────────────────────────────────

/// Progress events surfaced to the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardProgress {
    /// Background parse progress. The percentage is approximate, derived
    /// from the preflight row estimate, and capped at 99 until completion.
    Parsing { rows: u64, percent: u8 },
    /// Import job progress, one event per completed wave.
    Importing(ImportProgress),
}

/// Maps a cumulative row count onto an approximate percentage.
fn approx_parse_percent(rows: u64, estimated_total: Option<u64>) -> u8 {
    match estimated_total {
        Some(total) if total > 0 => ((rows * 100) / total).min(99) as u8,
        _ => 0,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ImportWizard
// ─────────────────────────────────────────────────────────────────────────────

/// One import session: owns the parsed table, the mapping, the computed
/// entries, and the lifecycle of the background parse.
pub struct ImportWizard<S: EntrySink + 'static> {
    config: ImportConfig,
    engine: IngestEngine,
    sink: Arc<S>,
    dataset_id: Uuid,
    progress: Option<mpsc::UnboundedSender<WizardProgress>>,

    step: WizardStep,
    session_cancel: CancellationToken,
    outcome: Option<ParseOutcome>,
    mapping: ColumnMapping,
    valid_entries: Vec<EntryRecord>,
    invalid_count: u64,
    created: Option<u64>,
    estimated_rows: Option<u64>,
}

impl<S: EntrySink + 'static> ImportWizard<S> {
    /// Creates a wizard for importing into the given dataset.
    pub fn new(dataset_id: Uuid, sink: Arc<S>, config: ImportConfig) -> Self {
        Self {
            engine: IngestEngine::new(config.clone()),
            config,
            sink,
            dataset_id,
            progress: None,
            step: WizardStep::Upload,
            session_cancel: CancellationToken::new(),
            outcome: None,
            mapping: ColumnMapping::default(),
            valid_entries: Vec::new(),
            invalid_count: 0,
            created: None,
            estimated_rows: None,
        }
    }

    /// Attaches a channel for parse and import progress events.
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<WizardProgress>) -> Self {
        self.progress = Some(tx);
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn step(&self) -> WizardStep {
        self.step
    }

    /// The parsed table, once a parse has succeeded.
    pub fn table(&self) -> Option<&ParsedTable> {
        self.outcome.as_ref().map(|o| &o.table)
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    /// Applies an explicit user edit to the mapping.
    pub fn set_mapping(&mut self, header: &str, field: EntryField) {
        self.mapping.set(header, field);
    }

    pub fn valid_entries(&self) -> &[EntryRecord] {
        &self.valid_entries
    }

    pub fn invalid_count(&self) -> u64 {
        self.invalid_count
    }

    /// Total entries created, once the import has completed.
    pub fn created(&self) -> Option<u64> {
        self.created
    }

    /// A token cancelled when this session is reset; clones let the
    /// embedding layer observe or trigger cancellation from other tasks.
    pub fn cancel_token(&self) -> CancellationToken {
        self.session_cancel.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Steps
    // ─────────────────────────────────────────────────────────────────────────

    /// Parses the selected file and, on success, advances to the mapping
    /// step with an auto-detected mapping installed.
    ///
    /// # Errors
    ///
    /// Preflight findings and parse failures are terminal for the file: the
    /// wizard stays in the upload step and the user must select a file
    /// again.
    pub async fn select_file(&mut self, path: &Path) -> Result<&ParsedTable, AppError> {
        if self.step != WizardStep::Upload {
            return Err(AppError::Internal(
                "a file can only be selected in the upload step".to_string(),
            ));
        }

        let report = preflight(path, &self.config).await?;
        if !report.ok {
            let messages: Vec<String> =
                report.errors.iter().map(|e| format!("{:?}", e)).collect();
            self.apply(WizardEvent::ParseFailed);
            return Err(AppError::CsvInvalid(messages.join("; ")));
        }
        self.estimated_rows = report.stats.estimated_total_rows;

        let result = match self.engine.strategy_for(report.stats.file_size_bytes) {
            ParseStrategy::Inline => self.engine.parse(path).await,
            ParseStrategy::Worker => {
                let handle = self
                    .engine
                    .submit(path, self.session_cancel.child_token());
                self.forward_parse_progress(&handle);
                handle.join().await
            }
        };

        match result {
            Ok(outcome) => {
                info!(
                    "[WIZARD] Parsed {} rows from {}",
                    outcome.table.total_rows,
                    path.display()
                );
                self.emit(WizardProgress::Parsing {
                    rows: outcome.table.total_rows,
                    percent: 100,
                });
                self.outcome = Some(outcome);
                self.apply(WizardEvent::ParseSucceeded);
                match &self.outcome {
                    Some(outcome) => Ok(&outcome.table),
                    None => Err(AppError::Internal("parse outcome missing".to_string())),
                }
            }
            Err(e) => {
                self.apply(WizardEvent::ParseFailed);
                Err(e)
            }
        }
    }

    /// Confirms the current mapping and advances to the validation step,
    /// classifying every row of the full row set.
    ///
    /// Returns `false` (leaving the step unchanged) when the mapping gate
    /// is closed: no error is raised for an invalid mapping.
    pub fn confirm_mapping(&mut self) -> bool {
        if self.step != WizardStep::Mapping || !self.mapping.is_valid() {
            return false;
        }
        self.apply(WizardEvent::MappingConfirmed);
        true
    }

    /// Runs the import job to a terminal state.
    ///
    /// On success the wizard advances to `complete` and the total created
    /// count is returned. On failure the wizard returns to `validation`
    /// with the mapping and computed entries preserved, so the user can
    /// retry without re-uploading the file.
    pub async fn start_import(&mut self) -> Result<u64, AppError> {
        if self.step != WizardStep::Validation {
            return Err(AppError::Internal(
                "import can only start from the validation step".to_string(),
            ));
        }
        if self.valid_entries.is_empty() {
            return Err(AppError::Internal(
                "import requires at least one valid entry".to_string(),
            ));
        }

        self.apply(WizardEvent::ImportStarted);

        let mut orchestrator =
            BatchUploadOrchestrator::new(self.sink.clone(), self.dataset_id, &self.config);
        if let Some(tx) = self.progress.clone() {
            let (import_tx, mut import_rx) = mpsc::unbounded_channel();
            tokio::spawn(async move {
                while let Some(event) = import_rx.recv().await {
                    if tx.send(WizardProgress::Importing(event)).is_err() {
                        break;
                    }
                }
            });
            orchestrator = orchestrator.with_progress(import_tx);
        }
        let job_id = orchestrator.job_id();

        match orchestrator.run(self.valid_entries.clone()).await {
            ImportOutcome::Completed { created } => {
                self.created = Some(created);
                self.apply(WizardEvent::ImportSucceeded);
                Ok(created)
            }
            ImportOutcome::Failed {
                error,
                created,
                completed_batches,
            } => {
                info!(
                    "[WIZARD] Import failed after {} batches ({} entries committed)",
                    completed_batches, created
                );
                self.apply(WizardEvent::ImportFailed);
                Err(AppError::JobFailed {
                    job_id: job_id.to_string(),
                    message: error.to_string(),
                })
            }
        }
    }

    /// Returns the wizard to the upload step, cancelling any live background
    /// parse and discarding all session state.
    pub fn reset(&mut self) {
        self.apply(WizardEvent::Reset);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────────────────────

    /// Applies an event through the pure transition function and executes
    /// the resulting effects.
    fn apply(&mut self, event: WizardEvent) {
        let Transition { next, effects } = transition(self.step, event);
        self.step = next;
        for effect in effects {
            self.run_effect(effect);
        }
    }

    fn run_effect(&mut self, effect: WizardEffect) {
        match effect {
            WizardEffect::InstallAutoMapping => {
                if let Some(outcome) = &self.outcome {
                    self.mapping = ColumnMapping::auto_detect(&outcome.table.headers);
                }
            }
            WizardEffect::RecomputeEntries => {
                if let Some(outcome) = &self.outcome {
                    let result = transform(&outcome.table.headers, &outcome.rows, &self.mapping);
                    self.valid_entries = result.valid;
                    self.invalid_count = result.invalid_count;
                }
            }
            WizardEffect::CancelParse => {
                self.session_cancel.cancel();
                self.session_cancel = CancellationToken::new();
            }
            WizardEffect::ClearSession => {
                self.outcome = None;
                self.mapping = ColumnMapping::default();
                self.valid_entries.clear();
                self.invalid_count = 0;
                self.created = None;
                self.estimated_rows = None;
            }
        }
    }

    /// Spawns a task forwarding worker parse progress to the UI channel.
    fn forward_parse_progress(&self, handle: &crate::ingest::ParseHandle) {
        let Some(tx) = self.progress.clone() else {
            return;
        };
        let mut rx = handle.progress();
        let estimate = self.estimated_rows;
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let rows = *rx.borrow();
                let percent = approx_parse_percent(rows, estimate);
                if tx.send(WizardProgress::Parsing { rows, percent }).is_err() {
                    break;
                }
            }
        });
    }

    fn emit(&self, event: WizardProgress) {
        if let Some(ref tx) = self.progress {
            let _ = tx.send(event);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::future::Future;
    use std::io::Write;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;

    // ─────────────────────────────────────────────────────────────────────────
    // Pure transition function
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn happy_path_transitions() {
        use WizardEvent::*;
        use WizardStep::*;

        let t = transition(Upload, ParseSucceeded);
        assert_eq!(t.next, Mapping);
        assert_eq!(t.effects, vec![WizardEffect::InstallAutoMapping]);

        let t = transition(Mapping, MappingConfirmed);
        assert_eq!(t.next, Validation);
        assert_eq!(t.effects, vec![WizardEffect::RecomputeEntries]);

        assert_eq!(transition(Validation, ImportStarted).next, Importing);
        assert_eq!(transition(Importing, ImportSucceeded).next, Complete);
    }

    #[test]
    fn import_failure_recovers_to_validation() {
        let t = transition(WizardStep::Importing, WizardEvent::ImportFailed);
        assert_eq!(t.next, WizardStep::Validation);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn reset_works_from_every_step() {
        use WizardStep::*;
        for step in [Upload, Mapping, Validation, Importing, Complete] {
            let t = transition(step, WizardEvent::Reset);
            assert_eq!(t.next, Upload);
            assert_eq!(
                t.effects,
                vec![WizardEffect::CancelParse, WizardEffect::ClearSession]
            );
        }
    }

    #[test]
    fn meaningless_events_are_no_ops() {
        use WizardEvent::*;
        use WizardStep::*;

        for (step, event) in [
            (Upload, ImportSucceeded),
            (Mapping, ParseSucceeded),
            (Validation, MappingConfirmed),
            (Complete, ImportStarted),
        ] {
            let t = transition(step, event);
            assert_eq!(t.next, step);
            assert!(t.effects.is_empty());
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session fakes and fixtures
    // ─────────────────────────────────────────────────────────────────────────

    /// Sink that succeeds, counting calls; fails every call when `failing`.
    struct CountingSink {
        calls: AtomicUsize,
        failing: bool,
    }

    impl CountingSink {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                failing: true,
            }
        }
    }

    impl EntrySink for CountingSink {
        fn create_entries_bulk<'a>(
            &'a self,
            _dataset_id: &'a Uuid,
            entries: &'a [EntryRecord],
        ) -> Pin<Box<dyn Future<Output = Result<u64, AppError>> + Send + 'a>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.failing {
                    Err(AppError::ConnectionFailed("injected".into()))
                } else {
                    Ok(entries.len() as u64)
                }
            })
        }
    }

    fn csv_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn wizard(sink: Arc<CountingSink>) -> ImportWizard<CountingSink> {
        ImportWizard::new(Uuid::new_v4(), sink, ImportConfig::default().batch_size(2))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // End-to-end session
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn full_import_session() {
        let sink = Arc::new(CountingSink::new());
        let mut wizard = wizard(sink.clone());
        let file = csv_file("id,name,color\na1,Item 1,red\n,Invalid,blue\na2,Item 2,green\n");

        // Upload -> Mapping with an auto-detected mapping
        let table = wizard.select_file(file.path()).await.expect("parse failed");
        assert_eq!(table.total_rows, 3);
        assert_eq!(wizard.step(), WizardStep::Mapping);
        assert_eq!(
            wizard.mapping().get("id"),
            Some(EntryField::ExternalId)
        );
        assert_eq!(
            wizard.mapping().get("color"),
            Some(EntryField::Skip)
        );

        // Mapping -> Validation classifies the full row set
        assert!(wizard.confirm_mapping());
        assert_eq!(wizard.step(), WizardStep::Validation);
        assert_eq!(wizard.valid_entries().len(), 2);
        assert_eq!(wizard.invalid_count(), 1);

        // Validation -> Importing -> Complete
        let created = wizard.start_import().await.expect("import failed");
        assert_eq!(created, 2);
        assert_eq!(wizard.step(), WizardStep::Complete);
        assert_eq!(wizard.created(), Some(2));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_mapping_blocks_progression_without_error() {
        let sink = Arc::new(CountingSink::new());
        let mut wizard = wizard(sink);
        let file = csv_file("foo,bar\nx,y\n");

        wizard.select_file(file.path()).await.expect("parse failed");
        assert!(!wizard.mapping().is_valid());

        assert!(!wizard.confirm_mapping());
        assert_eq!(wizard.step(), WizardStep::Mapping);

        wizard.set_mapping("foo", EntryField::ExternalId);
        assert!(wizard.confirm_mapping());
        assert_eq!(wizard.step(), WizardStep::Validation);
    }

    #[tokio::test]
    async fn import_failure_returns_to_validation_preserving_entries() {
        let sink = Arc::new(CountingSink::failing());
        let mut wizard = wizard(sink);
        let file = csv_file("id,name\na1,Item 1\na2,Item 2\n");

        wizard.select_file(file.path()).await.expect("parse failed");
        assert!(wizard.confirm_mapping());
        let entries_before = wizard.valid_entries().to_vec();

        let result = wizard.start_import().await;
        assert!(matches!(result, Err(AppError::JobFailed { .. })));

        // Back at validation with everything preserved for a retry
        assert_eq!(wizard.step(), WizardStep::Validation);
        assert_eq!(wizard.valid_entries(), entries_before.as_slice());
        assert!(wizard.mapping().is_valid());
        assert_eq!(wizard.created(), None);
    }

    #[tokio::test]
    async fn preflight_failure_keeps_wizard_in_upload() {
        let sink = Arc::new(CountingSink::new());
        let mut wizard = wizard(sink);
        let file = csv_file("id,name,id\na1,Item 1,a2\n");

        let result = wizard.select_file(file.path()).await;
        assert!(matches!(result, Err(AppError::CsvInvalid(_))));
        assert_eq!(wizard.step(), WizardStep::Upload);
        assert!(wizard.table().is_none());
    }

    #[tokio::test]
    async fn import_without_valid_entries_is_rejected() {
        let sink = Arc::new(CountingSink::new());
        let mut wizard = wizard(sink);
        let file = csv_file("id,name\n,Missing 1\n,Missing 2\n");

        wizard.select_file(file.path()).await.expect("parse failed");
        assert!(wizard.confirm_mapping());
        assert_eq!(wizard.valid_entries().len(), 0);
        assert_eq!(wizard.invalid_count(), 2);

        let result = wizard.start_import().await;
        assert!(result.is_err());
        assert_eq!(wizard.step(), WizardStep::Validation);
    }

    #[tokio::test]
    async fn reset_clears_session_and_next_parse_has_no_residue() {
        let sink = Arc::new(CountingSink::new());
        let mut wizard = wizard(sink);

        let first = csv_file("id,name\na1,Item 1\na2,Item 2\n");
        wizard.select_file(first.path()).await.expect("parse failed");
        assert!(wizard.confirm_mapping());
        assert_eq!(wizard.valid_entries().len(), 2);

        let old_token = wizard.cancel_token();
        wizard.reset();

        assert_eq!(wizard.step(), WizardStep::Upload);
        assert!(wizard.table().is_none());
        assert!(wizard.mapping().is_empty());
        assert!(wizard.valid_entries().is_empty());
        assert_eq!(wizard.invalid_count(), 0);
        assert_eq!(wizard.created(), None);
        assert!(old_token.is_cancelled(), "reset cancels the session token");

        // A fresh parse sees only the new file's data
        let second = csv_file("id\nb1\n");
        let table = wizard
            .select_file(second.path())
            .await
            .expect("parse failed");
        assert_eq!(table.headers, vec!["id"]);
        assert_eq!(table.total_rows, 1);
        assert!(wizard.confirm_mapping());
        assert_eq!(wizard.valid_entries().len(), 1);
        assert_eq!(wizard.valid_entries()[0].external_id, "b1");
    }

    #[tokio::test]
    async fn progress_events_cover_parse_and_import() {
        let sink = Arc::new(CountingSink::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut wizard = ImportWizard::new(
            Uuid::new_v4(),
            sink,
            ImportConfig::default().batch_size(1),
        )
        .with_progress(tx);

        let file = csv_file("id\na1\na2\na3\n");
        wizard.select_file(file.path()).await.expect("parse failed");
        assert!(wizard.confirm_mapping());
        wizard.start_import().await.expect("import failed");

        // Dropping the wizard drops the last sender once the forwarding
        // tasks drain, closing the channel
        drop(wizard);

        let mut saw_parse_complete = false;
        let mut last_import_percent = 0;
        while let Some(event) = rx.recv().await {
            match event {
                WizardProgress::Parsing { percent, .. } => {
                    saw_parse_complete |= percent == 100;
                }
                WizardProgress::Importing(p) => last_import_percent = p.percent,
            }
        }

        assert!(saw_parse_complete);
        assert_eq!(last_import_percent, 100);
    }

    #[test]
    fn approx_percent_is_capped_below_completion() {
        assert_eq!(approx_parse_percent(50, Some(100)), 50);
        assert_eq!(approx_parse_percent(100, Some(100)), 99);
        assert_eq!(approx_parse_percent(500, Some(100)), 99);
        assert_eq!(approx_parse_percent(10, None), 0);
    }
}
