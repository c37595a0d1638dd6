//! Send-time reference resolution.
//!
//! Reference values are queued as the referenced metaverse object's id and
//! resolved against the target system only when the export is sent, since
//! the referenced object may itself be provisioned by the same run.

use std::str::FromStr;

use tracing::{debug, warn};

use idsync_core::ids::{AttributeChangeId, ConnectedSystemId, MetaverseObjectId};
use idsync_core::model::{ConnectedSystemObjectStatus, PendingExport, PendingExportAttributeValueChange};
use idsync_core::value::AttributeValue;

use crate::error::SyncResult;
use crate::repository::SyncRepository;

/// Changes of one pending export split by whether they can be sent now.
#[derive(Debug, Clone, Default)]
pub struct ResolvedChanges {
    /// Changes to send, references replaced by target-system identifiers.
    pub sendable: Vec<PendingExportAttributeValueChange>,
    /// Changes held back because a reference could not be resolved yet.
    pub deferred: Vec<AttributeChangeId>,
}

impl ResolvedChanges {
    #[must_use]
    pub fn sent_ids(&self) -> Vec<AttributeChangeId> {
        self.sendable.iter().map(|c| c.id).collect()
    }
}

/// Resolve the exportable changes of a pending export against `target_system`.
pub async fn resolve_references(
    export: &PendingExport,
    repository: &dyn SyncRepository,
    target_system: ConnectedSystemId,
) -> SyncResult<ResolvedChanges> {
    let mut resolved = ResolvedChanges::default();

    for change in export
        .attribute_value_changes
        .iter()
        .filter(|c| c.status.is_exportable())
    {
        let Some(reference) = change.value.as_ref().and_then(AttributeValue::unresolved_reference) else {
            resolved.sendable.push(change.clone());
            continue;
        };

        match resolve_one(reference, repository, target_system).await? {
            Some(identifier) => {
                let mut sendable = change.clone();
                sendable.value = Some(identifier);
                resolved.sendable.push(sendable);
            }
            None => {
                debug!(
                    pending_export_id = %export.id,
                    attribute = %change.attribute_name,
                    reference,
                    "Reference not resolvable yet; change deferred"
                );
                resolved.deferred.push(change.id);
            }
        }
    }

    Ok(resolved)
}

async fn resolve_one(
    reference: &str,
    repository: &dyn SyncRepository,
    target_system: ConnectedSystemId,
) -> SyncResult<Option<AttributeValue>> {
    let Ok(mvo_id) = MetaverseObjectId::from_str(reference) else {
        warn!(reference, "Unresolved reference is not a metaverse object id");
        return Ok(None);
    };

    let referenced = repository
        .find_joined_connected_system_object(target_system, mvo_id)
        .await?;

    Ok(referenced
        .filter(|cso| cso.status == ConnectedSystemObjectStatus::Normal)
        .and_then(|cso| cso.reference_identifier().cloned()))
}
