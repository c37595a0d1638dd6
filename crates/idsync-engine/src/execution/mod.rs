//! Export execution.
//!
//! Sends due pending exports to a connected system in batches, records the
//! outcome of every attempt and schedules retries with exponential backoff.
//! Batches run sequentially by default; with a connector factory and a
//! repository factory they can run concurrently, each batch on its own
//! connector instance and persistence session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use idsync_connector::resilience::RetryConfig;
use idsync_connector::traits::{BoxedExportConnector, ConnectorFactory};
use idsync_core::ids::{ConnectedSystemId, ConnectedSystemObjectId, PendingExportId};
use idsync_core::model::{PendingExport, PendingExportChangeType, PendingExportStatus};
use idsync_core::value::AttributeValue;

use crate::audit::{report, ActivityChangeType, AuditSink, NoopAuditSink, OutcomeTree, OutcomeType};
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::progress::{ExportPhase, ExportProgress, ProgressCallback};
use crate::repository::{BoxedRepository, RepositoryFactory};

pub mod batch;
pub mod preview;
pub mod references;

pub use preview::{AttributeChangePreview, ExportPreview};
pub use references::{resolve_references, ResolvedChanges};

use batch::{BatchContext, BatchOutcome};

/// Whether execution contacts the connected system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    /// Build previews only. The connector is never called.
    PreviewOnly,
    /// Build previews and send the exports.
    PreviewAndSync,
}

/// Settings for one execution run.
#[derive(Debug, Clone)]
pub struct ExportExecutionOptions {
    pub batch_size: usize,
    pub max_parallelism: usize,
    pub retry: RetryConfig,
}

impl ExportExecutionOptions {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            batch_size: config.export_batch_size,
            max_parallelism: config.max_export_parallelism,
            retry: config.retry_config(),
        }
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_parallelism(mut self, max_parallelism: usize) -> Self {
        self.max_parallelism = max_parallelism;
        self
    }
}

impl Default for ExportExecutionOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// What happened to one pending export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportRecordStatus {
    Succeeded,
    Failed,
    /// Nothing could be sent yet; left for a later run.
    Deferred,
}

/// Per-record execution result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRecordResult {
    pub pending_export_id: PendingExportId,
    pub connected_system_object_id: ConnectedSystemObjectId,
    pub change_type: PendingExportChangeType,
    pub status: ExportRecordStatus,
    pub error_message: Option<String>,
    /// Identifier returned by a Create.
    pub external_id: Option<AttributeValue>,
}

impl ExportRecordResult {
    fn new(export: &PendingExport, status: ExportRecordStatus) -> Self {
        Self {
            pending_export_id: export.id,
            connected_system_object_id: export.connected_system_object_id,
            change_type: export.change_type,
            status,
            error_message: None,
            external_id: None,
        }
    }

    pub(crate) fn succeeded(export: &PendingExport, external_id: Option<AttributeValue>) -> Self {
        Self {
            external_id,
            ..Self::new(export, ExportRecordStatus::Succeeded)
        }
    }

    pub(crate) fn failed(export: &PendingExport, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::new(export, ExportRecordStatus::Failed)
        }
    }

    pub(crate) fn deferred(export: &PendingExport) -> Self {
        Self::new(export, ExportRecordStatus::Deferred)
    }
}

/// Outcome of [`ExportExecutor::execute_exports`].
#[derive(Debug, Clone, Default)]
pub struct ExportExecutionResult {
    /// Pending exports that were due.
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub deferred: usize,
    /// Set when cancellation stopped the run before every batch was sent.
    pub cancelled: bool,
    pub previews: Vec<ExportPreview>,
    pub records: Vec<ExportRecordResult>,
    /// Batch-level failures (connector errors, crashed batches).
    pub batch_errors: Vec<String>,
}

impl ExportExecutionResult {
    /// Records that reached a final outcome in this run.
    #[must_use]
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.deferred
    }

    /// Success rate as a percentage of processed records.
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        let processed = self.processed();
        if processed == 0 {
            100.0
        } else {
            (self.succeeded as f64 / processed as f64) * 100.0
        }
    }

    pub(crate) fn absorb(&mut self, outcome: BatchOutcome) {
        for record in &outcome.records {
            match record.status {
                ExportRecordStatus::Succeeded => self.succeeded += 1,
                ExportRecordStatus::Failed => self.failed += 1,
                ExportRecordStatus::Deferred => self.deferred += 1,
            }
        }
        self.records.extend(outcome.records);
        self.batch_errors.extend(outcome.error);
        self.cancelled |= outcome.cancelled;
    }

    fn progress(&self, phase: ExportPhase) -> ExportProgress {
        ExportProgress {
            phase,
            processed: self.processed(),
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
        }
    }
}

pub(crate) fn emit(progress: Option<&ProgressCallback>, result: &ExportExecutionResult, phase: ExportPhase) {
    if let Some(callback) = progress {
        callback(result.progress(phase));
    }
}

/// Whether a pending export should be sent now.
///
/// Terminally failed exports are never due. A Delete is due only until it
/// has been sent once; afterwards only an import retires it. Exports in
/// retry must have reached their scheduled time and still have attempts
/// left.
#[must_use]
pub fn is_due(export: &PendingExport, now: DateTime<Utc>) -> bool {
    if export.status == PendingExportStatus::Failed {
        return false;
    }

    let has_work = match export.change_type {
        PendingExportChangeType::Delete => export.status == PendingExportStatus::Pending,
        PendingExportChangeType::Create if export.attribute_value_changes.is_empty() => {
            export.status == PendingExportStatus::Pending
        }
        _ => export.has_exportable_changes(),
    };
    if !has_work {
        return false;
    }

    export.error_count == 0
        || (export.error_count < export.max_retries
            && export.next_retry_at.map_or(true, |at| at <= now))
}

/// Sends pending exports to connected systems.
pub struct ExportExecutor {
    repository: BoxedRepository,
    audit: Arc<dyn AuditSink>,
}

impl ExportExecutor {
    #[must_use]
    pub fn new(repository: BoxedRepository) -> Self {
        Self {
            repository,
            audit: Arc::new(NoopAuditSink),
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Execute every due pending export of `target_system`.
    ///
    /// Per-record and per-batch failures are reported in the result, never
    /// as an error; only a failure to load the due exports is an error.
    #[allow(clippy::too_many_arguments)]
    #[instrument(skip_all, fields(connected_system_id = %target_system, mode = ?mode))]
    pub async fn execute_exports(
        &self,
        target_system: ConnectedSystemId,
        connector: BoxedExportConnector,
        mode: ExportMode,
        options: &ExportExecutionOptions,
        cancellation: &CancellationToken,
        progress: Option<ProgressCallback>,
        connector_factory: Option<ConnectorFactory>,
        repository_factory: Option<RepositoryFactory>,
    ) -> SyncResult<ExportExecutionResult> {
        let progress = progress.as_ref();
        let mut result = ExportExecutionResult::default();
        emit(progress, &result, ExportPhase::Preparing);

        let now = Utc::now();
        let due: Vec<PendingExport> = self
            .repository
            .get_pending_exports(target_system)
            .await?
            .into_iter()
            .filter(|export| is_due(export, now))
            .collect();

        result.total = due.len();
        result.previews = due.iter().map(ExportPreview::for_export).collect();

        if due.is_empty() || mode == ExportMode::PreviewOnly {
            emit(progress, &result, ExportPhase::Completed);
            info!(due = result.total, "No exports sent");
            return Ok(result);
        }

        let batch_size = options.batch_size.max(1);
        let batches: Vec<Vec<PendingExport>> =
            due.chunks(batch_size).map(<[PendingExport]>::to_vec).collect();
        let context = BatchContext {
            target_system,
            retry: options.retry.clone(),
            cancellation: cancellation.clone(),
        };

        match (connector_factory, repository_factory) {
            (Some(connectors), Some(repositories))
                if options.max_parallelism > 1 && batches.len() > 1 =>
            {
                batch::run_parallel(
                    batches,
                    &context,
                    connectors,
                    repositories,
                    options.max_parallelism,
                    &mut result,
                    progress,
                )
                .await;
            }
            _ => {
                batch::run_sequential(
                    batches,
                    &context,
                    connector,
                    Arc::clone(&self.repository),
                    &mut result,
                    progress,
                )
                .await;
            }
        }

        emit(progress, &result, ExportPhase::Completed);
        self.report(target_system, &result).await;

        info!(
            total = result.total,
            succeeded = result.succeeded,
            failed = result.failed,
            deferred = result.deferred,
            cancelled = result.cancelled,
            "Export execution complete"
        );
        Ok(result)
    }

    async fn report(&self, target_system: ConnectedSystemId, result: &ExportExecutionResult) {
        let mut outcomes = OutcomeTree::new();
        for record in &result.records {
            let outcome_type = match record.status {
                ExportRecordStatus::Succeeded => OutcomeType::Exported,
                ExportRecordStatus::Failed => OutcomeType::ExportFailed,
                ExportRecordStatus::Deferred => OutcomeType::ExportDeferred,
            };
            outcomes.add_root(
                outcome_type,
                Some(record.connected_system_object_id.to_string()),
                record.error_message.clone(),
            );
        }
        report(
            self.audit.as_ref(),
            target_system,
            ActivityChangeType::ExportExecution,
            outcomes,
        )
        .await;
    }
}
