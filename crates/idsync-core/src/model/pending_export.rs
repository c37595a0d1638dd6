//! Queued outbound work.
//!
//! A pending export holds every outstanding attribute change for one staging
//! record. Export execution drains it; reconciliation retires changes once a
//! later import observes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    AttributeChangeId, ConnectedSystemAttributeId, ConnectedSystemId, ConnectedSystemObjectId,
    MetaverseObjectId, PendingExportId,
};
use crate::model::connected_system::ConnectedSystemAttribute;
use crate::value::AttributeValue;

/// Object-level operation a pending export performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingExportChangeType {
    Create,
    Update,
    Delete,
}

string_enum!(PendingExportChangeType {
    Create => "create",
    Update => "update",
    Delete => "delete",
});

/// Status of a pending export as a whole.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingExportStatus {
    #[default]
    Pending,
    Exported,
    ExportNotConfirmed,
    /// Retries exhausted. Never selected again without external re-queue.
    Failed,
}

string_enum!(PendingExportStatus {
    Pending => "pending",
    Exported => "exported",
    ExportNotConfirmed => "export_not_confirmed",
    Failed => "failed",
});

/// Kind of change applied to a single attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeChangeType {
    /// Add one value to a multi-valued attribute.
    Add,
    /// Remove one value from a multi-valued attribute.
    Remove,
    /// Remove every value.
    RemoveAll,
    /// Replace the single value, or clear it when the value is `None`.
    Update,
}

string_enum!(AttributeChangeType {
    Add => "add",
    Remove => "remove",
    RemoveAll => "remove_all",
    Update => "update",
});

/// Status of a single attribute change.
///
/// Advances `Pending` -> `ExportedPendingConfirmation` -> (confirmed and
/// removed | `ExportedNotConfirmed` -> `Failed`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeChangeStatus {
    #[default]
    Pending,
    ExportedPendingConfirmation,
    ExportedNotConfirmed,
    Failed,
}

string_enum!(AttributeChangeStatus {
    Pending => "pending",
    ExportedPendingConfirmation => "exported_pending_confirmation",
    ExportedNotConfirmed => "exported_not_confirmed",
    Failed => "failed",
});

impl AttributeChangeStatus {
    /// Whether export execution should (re)send a change in this status.
    #[must_use]
    pub fn is_exportable(&self) -> bool {
        matches!(
            self,
            AttributeChangeStatus::Pending | AttributeChangeStatus::ExportedNotConfirmed
        )
    }
}

/// One attribute-value change inside a pending export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingExportAttributeValueChange {
    pub id: AttributeChangeId,
    pub attribute_id: ConnectedSystemAttributeId,
    pub attribute_name: String,
    pub change_type: AttributeChangeType,
    /// Intended value. `None` is an explicit clear.
    pub value: Option<AttributeValue>,
    pub status: AttributeChangeStatus,
    pub export_attempt_count: u32,
    pub last_exported_at: Option<DateTime<Utc>>,
    /// Value observed by the last import that failed to confirm this change.
    pub last_imported_value: Option<AttributeValue>,
}

impl PendingExportAttributeValueChange {
    #[must_use]
    pub fn new(
        attribute: &ConnectedSystemAttribute,
        change_type: AttributeChangeType,
        value: Option<AttributeValue>,
    ) -> Self {
        Self {
            id: AttributeChangeId::new(),
            attribute_id: attribute.id,
            attribute_name: attribute.name.clone(),
            change_type,
            value,
            status: AttributeChangeStatus::Pending,
            export_attempt_count: 0,
            last_exported_at: None,
            last_imported_value: None,
        }
    }

    /// Replace the single value.
    #[must_use]
    pub fn update(attribute: &ConnectedSystemAttribute, value: impl Into<AttributeValue>) -> Self {
        Self::new(attribute, AttributeChangeType::Update, Some(value.into()))
    }

    /// Explicitly clear a single-valued attribute.
    #[must_use]
    pub fn clear(attribute: &ConnectedSystemAttribute) -> Self {
        Self::new(attribute, AttributeChangeType::Update, None)
    }

    #[must_use]
    pub fn add(attribute: &ConnectedSystemAttribute, value: impl Into<AttributeValue>) -> Self {
        Self::new(attribute, AttributeChangeType::Add, Some(value.into()))
    }

    #[must_use]
    pub fn remove(attribute: &ConnectedSystemAttribute, value: impl Into<AttributeValue>) -> Self {
        Self::new(attribute, AttributeChangeType::Remove, Some(value.into()))
    }

    #[must_use]
    pub fn remove_all(attribute: &ConnectedSystemAttribute) -> Self {
        Self::new(attribute, AttributeChangeType::RemoveAll, None)
    }

    /// Value-identity key used when merging change sets.
    ///
    /// Unresolved references key on the referenced identifier so the same
    /// logical member produced by two evaluators collides.
    #[must_use]
    pub fn merge_key(&self) -> (ConnectedSystemAttributeId, Option<String>) {
        (
            self.attribute_id,
            self.value.as_ref().map(AttributeValue::canonical_key),
        )
    }

    /// Whether two changes express the same intent.
    #[must_use]
    pub fn same_intent(&self, other: &Self) -> bool {
        self.attribute_id == other.attribute_id
            && self.change_type == other.change_type
            && self.value == other.value
    }
}

/// Outstanding outbound work for one staging record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingExport {
    pub id: PendingExportId,
    pub connected_system_id: ConnectedSystemId,
    pub connected_system_object_id: ConnectedSystemObjectId,
    pub change_type: PendingExportChangeType,
    pub status: PendingExportStatus,
    pub attribute_value_changes: Vec<PendingExportAttributeValueChange>,
    /// Metaverse object whose change caused this export.
    pub source_metaverse_object_id: Option<MetaverseObjectId>,
    pub error_count: u32,
    pub max_retries: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub last_error_message: Option<String>,
    pub last_attempted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PendingExport {
    #[must_use]
    pub fn new(
        connected_system_id: ConnectedSystemId,
        connected_system_object_id: ConnectedSystemObjectId,
        change_type: PendingExportChangeType,
        max_retries: u32,
    ) -> Self {
        Self {
            id: PendingExportId::new(),
            connected_system_id,
            connected_system_object_id,
            change_type,
            status: PendingExportStatus::Pending,
            attribute_value_changes: Vec::new(),
            source_metaverse_object_id: None,
            error_count: 0,
            max_retries,
            next_retry_at: None,
            last_error_message: None,
            last_attempted_at: None,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_source(mut self, mvo_id: MetaverseObjectId) -> Self {
        self.source_metaverse_object_id = Some(mvo_id);
        self
    }

    #[must_use]
    pub fn with_changes(mut self, changes: Vec<PendingExportAttributeValueChange>) -> Self {
        self.attribute_value_changes = changes;
        self
    }

    /// Whether any attribute change still needs sending.
    #[must_use]
    pub fn has_exportable_changes(&self) -> bool {
        self.attribute_value_changes
            .iter()
            .any(|c| c.status.is_exportable())
    }

    /// Record a failed execution attempt and schedule the next retry.
    ///
    /// The export becomes terminally `Failed` once the error count reaches
    /// `max_retries`.
    pub fn record_failure(
        &mut self,
        message: impl Into<String>,
        now: DateTime<Utc>,
        next_retry_at: DateTime<Utc>,
    ) {
        self.error_count += 1;
        self.last_error_message = Some(message.into());
        self.last_attempted_at = Some(now);
        if self.error_count >= self.max_retries {
            self.status = PendingExportStatus::Failed;
            self.next_retry_at = None;
        } else {
            self.next_retry_at = Some(next_retry_at);
        }
    }

    /// Record a successful execution attempt.
    ///
    /// Only the changes that were actually sent advance; changes held back
    /// (an unresolved reference, say) stay eligible for the next run.
    pub fn record_success(&mut self, sent: &[AttributeChangeId], now: DateTime<Utc>) {
        for change in &mut self.attribute_value_changes {
            if change.status.is_exportable() && sent.contains(&change.id) {
                change.status = AttributeChangeStatus::ExportedPendingConfirmation;
                change.export_attempt_count += 1;
                change.last_exported_at = Some(now);
            }
        }
        self.status = PendingExportStatus::Exported;
        self.error_count = 0;
        self.next_retry_at = None;
        self.last_error_message = None;
        self.last_attempted_at = Some(now);
    }
}
