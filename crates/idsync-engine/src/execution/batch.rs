//! Batch processing for export execution.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use idsync_connector::resilience::RetryConfig;
use idsync_connector::traits::{BoxedExportConnector, ConnectorFactory, ExportConnector};
use idsync_connector::types::{ExportRequest, ExportResult};
use idsync_core::ids::{ConnectedSystemId, PendingExportId};
use idsync_core::model::{
    ConnectedSystemObject, ConnectedSystemObjectStatus, PendingExport, PendingExportChangeType,
    PendingExportStatus,
};

use crate::error::SyncResult;
use crate::execution::references::{resolve_references, ResolvedChanges};
use crate::execution::{emit, ExportExecutionResult, ExportRecordResult};
use crate::progress::{ExportPhase, ProgressCallback};
use crate::repository::{BoxedRepository, RepositoryFactory, SyncRepository};

/// Settings shared by every batch of a run.
#[derive(Debug, Clone)]
pub(crate) struct BatchContext {
    pub target_system: ConnectedSystemId,
    pub retry: RetryConfig,
    pub cancellation: CancellationToken,
}

/// Result of one batch.
#[derive(Debug, Default)]
pub(crate) struct BatchOutcome {
    pub records: Vec<ExportRecordResult>,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl BatchOutcome {
    /// Every record of the batch failed with the same message.
    fn failed(batch: &[PendingExport], message: String) -> Self {
        Self {
            records: batch
                .iter()
                .map(|export| ExportRecordResult::failed(export, message.clone()))
                .collect(),
            error: Some(message),
            cancelled: false,
        }
    }
}

/// Run batches one after another on the caller's connector and repository.
pub(crate) async fn run_sequential(
    batches: Vec<Vec<PendingExport>>,
    context: &BatchContext,
    connector: BoxedExportConnector,
    repository: BoxedRepository,
    result: &mut ExportExecutionResult,
    progress: Option<&ProgressCallback>,
) {
    for batch in batches {
        if context.cancellation.is_cancelled() {
            result.cancelled = true;
            break;
        }
        let outcome = process_batch(context, connector.as_ref(), repository.as_ref(), batch).await;
        result.absorb(outcome);
        emit(progress, result, ExportPhase::Executing);
    }
}

/// Run batches concurrently, at most `max_parallelism` at a time.
///
/// Each batch gets its own connector and repository from the factories. A
/// batch that errors or crashes fails only its own records.
pub(crate) async fn run_parallel(
    batches: Vec<Vec<PendingExport>>,
    context: &BatchContext,
    connectors: ConnectorFactory,
    repositories: RepositoryFactory,
    max_parallelism: usize,
    result: &mut ExportExecutionResult,
    progress: Option<&ProgressCallback>,
) {
    let semaphore = Arc::new(Semaphore::new(max_parallelism));
    let mut join_set = JoinSet::new();
    let mut in_flight: HashMap<usize, Vec<PendingExport>> = HashMap::new();

    for (index, batch) in batches.into_iter().enumerate() {
        if context.cancellation.is_cancelled() {
            result.cancelled = true;
            break;
        }
        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        if context.cancellation.is_cancelled() {
            result.cancelled = true;
            break;
        }

        in_flight.insert(index, batch.clone());
        let context = context.clone();
        let connectors = Arc::clone(&connectors);
        let repositories = Arc::clone(&repositories);
        join_set.spawn(async move {
            let _permit = permit;
            let outcome = match (connectors(), repositories()) {
                (Ok(connector), Ok(repository)) => {
                    process_batch(&context, connector.as_ref(), repository.as_ref(), batch).await
                }
                (Err(e), _) => BatchOutcome::failed(&batch, format!("Connector unavailable: {e}")),
                (_, Err(e)) => BatchOutcome::failed(&batch, format!("Repository unavailable: {e}")),
            };
            (index, outcome)
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, outcome)) => {
                in_flight.remove(&index);
                result.absorb(outcome);
                emit(progress, result, ExportPhase::Executing);
            }
            Err(e) => {
                error!(error = %e, "Export batch task panicked");
            }
        }
    }

    // Whatever is still in flight belonged to a crashed batch.
    for batch in in_flight.into_values() {
        result.absorb(BatchOutcome::failed(&batch, "Export batch crashed".to_string()));
        emit(progress, result, ExportPhase::Executing);
    }
}

/// Send one batch and persist the outcome.
pub(crate) async fn process_batch(
    context: &BatchContext,
    connector: &dyn ExportConnector,
    repository: &dyn SyncRepository,
    batch: Vec<PendingExport>,
) -> BatchOutcome {
    let snapshot = batch.clone();
    match try_process_batch(context, connector, repository, batch).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, records = snapshot.len(), "Export batch aborted");
            BatchOutcome::failed(&snapshot, e.to_string())
        }
    }
}

struct Prepared {
    export: PendingExport,
    cso: ConnectedSystemObject,
    resolved: ResolvedChanges,
}

async fn try_process_batch(
    context: &BatchContext,
    connector: &dyn ExportConnector,
    repository: &dyn SyncRepository,
    batch: Vec<PendingExport>,
) -> SyncResult<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    let mut export_updates = Vec::new();
    let mut prepared = Vec::with_capacity(batch.len());
    let mut requests = Vec::with_capacity(batch.len());

    for mut export in batch {
        let Some(cso) = repository
            .get_connected_system_object(export.connected_system_object_id)
            .await?
        else {
            let message = "Connected system object not found";
            fail(&mut export, message, &context.retry);
            outcome.records.push(ExportRecordResult::failed(&export, message));
            export_updates.push(export);
            continue;
        };

        let resolved = if export.change_type == PendingExportChangeType::Delete {
            ResolvedChanges::default()
        } else {
            resolve_references(&export, repository, context.target_system).await?
        };

        if export.change_type == PendingExportChangeType::Update && resolved.sendable.is_empty() {
            debug!(pending_export_id = %export.id, "Nothing sendable yet; export deferred");
            outcome.records.push(ExportRecordResult::deferred(&export));
            continue;
        }

        requests.push(ExportRequest {
            pending_export_id: export.id,
            connected_system_object_id: cso.id,
            change_type: export.change_type,
            object_type: cso.object_type_name.clone(),
            external_id: cso.external_id().cloned(),
            secondary_external_id: cso.secondary_external_id().cloned(),
            changes: resolved.sendable.clone(),
        });
        prepared.push(Prepared {
            export,
            cso,
            resolved,
        });
    }

    if requests.is_empty() {
        repository.update_pending_exports(&export_updates).await?;
        return Ok(outcome);
    }

    if context.cancellation.is_cancelled() {
        outcome.cancelled = true;
        repository.update_pending_exports(&export_updates).await?;
        return Ok(outcome);
    }

    let now = Utc::now();
    let mut results: HashMap<PendingExportId, ExportResult> = match connector.export(&requests).await {
        Ok(results) => results
            .into_iter()
            .map(|r| (r.pending_export_id, r))
            .collect(),
        Err(e) => {
            warn!(
                connector = connector.display_name(),
                error = %e,
                records = prepared.len(),
                "Connector failed export batch"
            );
            let message = e.to_string();
            for mut item in prepared {
                fail(&mut item.export, &message, &context.retry);
                outcome
                    .records
                    .push(ExportRecordResult::failed(&item.export, message.clone()));
                export_updates.push(item.export);
            }
            outcome.error = Some(message);
            repository.update_pending_exports(&export_updates).await?;
            return Ok(outcome);
        }
    };

    let mut cso_updates = Vec::new();
    for Prepared {
        mut export,
        mut cso,
        resolved,
    } in prepared
    {
        match results.remove(&export.id) {
            Some(result) if result.success => {
                export.record_success(&resolved.sent_ids(), now);
                if export.change_type == PendingExportChangeType::Create
                    && apply_identifiers(&mut cso, &result)
                {
                    if !resolved.deferred.is_empty() {
                        // The object exists now; what is left goes out as an update.
                        export.change_type = PendingExportChangeType::Update;
                    }
                    cso_updates.push(cso);
                }
                debug!(pending_export_id = %export.id, "Export succeeded");
                outcome
                    .records
                    .push(ExportRecordResult::succeeded(&export, result.external_id));
            }
            Some(result) => {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "Export rejected by connector".to_string());
                fail(&mut export, &message, &context.retry);
                outcome.records.push(ExportRecordResult::failed(&export, message));
            }
            None => {
                let message = "Connector returned no result for this export";
                fail(&mut export, message, &context.retry);
                outcome.records.push(ExportRecordResult::failed(&export, message));
            }
        }
        export_updates.push(export);
    }

    futures::try_join!(
        repository.update_pending_exports(&export_updates),
        repository.update_connected_system_objects(&cso_updates),
    )?;
    Ok(outcome)
}

fn fail(export: &mut PendingExport, message: &str, retry: &RetryConfig) {
    let now = Utc::now();
    let next_retry_at = retry.next_retry_at(export.error_count + 1, now);
    export.record_failure(message, now, next_retry_at);
    if export.status == PendingExportStatus::Failed {
        warn!(
            pending_export_id = %export.id,
            attempts = export.error_count,
            error = message,
            "Pending export failed permanently"
        );
    }
}

/// Copy identifiers returned by a Create onto the staging record.
///
/// Returns whether the record changed. A record only leaves
/// `PendingProvisioning` once it has an external identifier.
fn apply_identifiers(cso: &mut ConnectedSystemObject, result: &ExportResult) -> bool {
    let mut changed = false;
    if let Some(external_id) = &result.external_id {
        let attribute = cso.external_id_attribute.clone();
        cso.set_values(attribute.id, &attribute.name, vec![external_id.clone()]);
        changed = true;
    }
    if let (Some(attribute), Some(secondary)) = (
        cso.secondary_external_id_attribute.clone(),
        &result.secondary_external_id,
    ) {
        cso.set_values(attribute.id, &attribute.name, vec![secondary.clone()]);
        changed = true;
    }
    if cso.status == ConnectedSystemObjectStatus::PendingProvisioning && cso.external_id().is_some() {
        cso.status = ConnectedSystemObjectStatus::Normal;
        changed = true;
    }
    changed
}
