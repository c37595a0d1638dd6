//! Pending export reconciliation.
//!
//! After an import, every change a connected system was sent is checked
//! against what the import observed. Confirmed changes are retired; the
//! rest are queued for another attempt or, once attempts run out, failed.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use idsync_core::ids::{ConnectedSystemAttributeId, PendingExportId};
use idsync_core::model::{
    AttributeChangeStatus, ConnectedSystemObject, ConnectedSystemObjectStatus, PendingExport,
    PendingExportChangeType, PendingExportStatus,
};

use crate::audit::{report, ActivityChangeType, AuditSink, NoopAuditSink, OutcomeTree, OutcomeType};
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::evaluation::is_current_with_substitute;
use crate::repository::BoxedRepository;

/// Outcome of reconciling one staging record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconciliationResult {
    pub pending_export_id: Option<PendingExportId>,
    pub confirmed: usize,
    pub not_confirmed: usize,
    pub failed: usize,
    /// A Create became an Update because the object is known to exist.
    pub converted_to_update: bool,
    /// The pending export was fully confirmed and removed.
    pub deleted: bool,
    /// Status after reconciliation, when the export remains.
    pub status: Option<PendingExportStatus>,
}

impl ReconciliationResult {
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.pending_export_id.is_none()
    }
}

/// Confirms exported changes against imported staging records.
pub struct PendingExportReconciler {
    repository: BoxedRepository,
    config: EngineConfig,
    audit: Arc<dyn AuditSink>,
}

impl PendingExportReconciler {
    #[must_use]
    pub fn new(repository: BoxedRepository, config: EngineConfig) -> Self {
        Self {
            repository,
            config,
            audit: Arc::new(NoopAuditSink),
        }
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Reconcile the pending export of a freshly imported staging record.
    #[instrument(skip(self, cso), fields(cso_id = %cso.id))]
    pub async fn reconcile(&self, cso: &ConnectedSystemObject) -> SyncResult<ReconciliationResult> {
        let Some(mut export) = self.repository.find_pending_export_for_object(cso.id).await? else {
            return Ok(ReconciliationResult::default());
        };

        let mut result = ReconciliationResult {
            pending_export_id: Some(export.id),
            ..Default::default()
        };
        let mut outcomes = OutcomeTree::new();

        if export.change_type == PendingExportChangeType::Delete {
            if export.status == PendingExportStatus::Exported
                && cso.status == ConnectedSystemObjectStatus::Obsolete
            {
                self.repository.delete_pending_exports(&[export.id]).await?;
                outcomes.add_root(
                    OutcomeType::ExportConfirmed,
                    Some(export.id.to_string()),
                    Some(PendingExportChangeType::Delete.to_string()),
                );
                info!(pending_export_id = %export.id, "Delete confirmed by import");
                result.deleted = true;
            } else {
                result.status = Some(export.status);
            }
            report(self.audit.as_ref(), cso.id, ActivityChangeType::Reconciliation, outcomes).await;
            return Ok(result);
        }

        // A merge may have requeued the export while sent changes still await confirmation.
        let awaiting_confirmation = export
            .attribute_value_changes
            .iter()
            .any(|c| c.status == AttributeChangeStatus::ExportedPendingConfirmation);
        if !awaiting_confirmation {
            result.status = Some(export.status);
            return Ok(result);
        }

        let identity_attribute = identity_attribute(cso);
        let mut identity_confirmed = false;
        let mut retained = Vec::with_capacity(export.attribute_value_changes.len());

        for mut change in std::mem::take(&mut export.attribute_value_changes) {
            if change.status != AttributeChangeStatus::ExportedPendingConfirmation {
                retained.push(change);
                continue;
            }

            let current = cso.values(change.attribute_id);
            let substitute = self
                .config
                .protected_attributes
                .substitute_for(cso.connected_system_id, &change.attribute_name);

            if is_current_with_substitute(&change, &current, substitute) {
                debug!(attribute = %change.attribute_name, "Export confirmed");
                outcomes.add_root(
                    OutcomeType::ExportConfirmed,
                    Some(export.id.to_string()),
                    Some(change.attribute_name.clone()),
                );
                if change.attribute_id == identity_attribute {
                    identity_confirmed = true;
                }
                result.confirmed += 1;
                continue;
            }

            change.last_imported_value = current.first().map(|v| (*v).clone());
            if change.export_attempt_count < export.max_retries {
                change.status = AttributeChangeStatus::ExportedNotConfirmed;
                result.not_confirmed += 1;
                outcomes.add_root(
                    OutcomeType::ExportNotConfirmed,
                    Some(export.id.to_string()),
                    Some(change.attribute_name.clone()),
                );
            } else {
                change.status = AttributeChangeStatus::Failed;
                result.failed += 1;
                warn!(
                    attribute = %change.attribute_name,
                    attempts = change.export_attempt_count,
                    "Export never confirmed; change failed"
                );
                outcomes.add_root(
                    OutcomeType::ExportFailed,
                    Some(export.id.to_string()),
                    Some(change.attribute_name.clone()),
                );
            }
            retained.push(change);
        }
        export.attribute_value_changes = retained;

        if export.attribute_value_changes.is_empty() {
            self.repository.delete_pending_exports(&[export.id]).await?;
            outcomes.add_root(OutcomeType::PendingExportDeleted, Some(export.id.to_string()), None);
            result.deleted = true;
        } else {
            if export.change_type == PendingExportChangeType::Create && identity_confirmed {
                export.change_type = PendingExportChangeType::Update;
                result.converted_to_update = true;
                debug!(pending_export_id = %export.id, "Object confirmed; remaining changes become an update");
            }
            let changes = &export.attribute_value_changes;
            export.status = if changes.iter().all(|c| c.status == AttributeChangeStatus::Failed) {
                PendingExportStatus::Failed
            } else if changes.iter().any(|c| c.status == AttributeChangeStatus::Pending) {
                PendingExportStatus::Pending
            } else {
                PendingExportStatus::ExportNotConfirmed
            };
            self.repository
                .update_pending_exports(std::slice::from_ref(&export))
                .await?;
            result.status = Some(export.status);
        }

        info!(
            pending_export_id = %export.id,
            confirmed = result.confirmed,
            not_confirmed = result.not_confirmed,
            failed = result.failed,
            deleted = result.deleted,
            "Reconciled pending export"
        );
        report(self.audit.as_ref(), cso.id, ActivityChangeType::Reconciliation, outcomes).await;
        Ok(result)
    }

    /// Reconcile several staging records, one after another.
    pub async fn reconcile_all(
        &self,
        objects: &[ConnectedSystemObject],
    ) -> SyncResult<Vec<ReconciliationResult>> {
        let mut results = Vec::with_capacity(objects.len());
        for cso in objects {
            results.push(self.reconcile(cso).await?);
        }
        Ok(results)
    }
}

/// Attribute whose confirmation proves the object exists in the system.
///
/// The secondary identifier when the type has one, else the primary.
fn identity_attribute(cso: &ConnectedSystemObject) -> ConnectedSystemAttributeId {
    cso.secondary_external_id_attribute
        .as_ref()
        .map_or(cso.external_id_attribute.id, |a| a.id)
}
