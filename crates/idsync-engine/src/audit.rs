//! Activity and outcome records handed to the audit subsystem.
//!
//! Outcomes form a tree (an export outcome under the staging record it was
//! produced for, say). The tree is kept as an arena: every node gets its id
//! up front and points at its parent by id, and the whole tree is flattened
//! into insertion order before it crosses the [`AuditSink`] boundary, since
//! the bulk-insert path behind the sink does not assign identifiers.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use idsync_core::ids::OutcomeId;

use crate::error::SyncResult;

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeType {
    ConnectedSystemObjectCreated,
    ConnectedSystemObjectJoined,
    ConnectedSystemObjectDisconnected,
    ConnectedSystemObjectDeleted,
    AttributeFlow,
    PendingExportCreated,
    PendingExportUpdated,
    PendingExportDeleted,
    DriftDetected,
    Exported,
    ExportFailed,
    ExportDeferred,
    ExportConfirmed,
    ExportNotConfirmed,
    AmbiguousMatch,
}

/// One node of an outcome tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub id: OutcomeId,
    pub parent_id: Option<OutcomeId>,
    pub outcome_type: OutcomeType,
    /// Identifier of the entity the outcome is about.
    pub target_id: Option<String>,
    pub detail: Option<String>,
}

/// Arena of outcomes for one processed record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutcomeTree {
    nodes: Vec<Outcome>,
}

impl OutcomeTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a top-level outcome.
    pub fn add_root(
        &mut self,
        outcome_type: OutcomeType,
        target_id: Option<String>,
        detail: Option<String>,
    ) -> OutcomeId {
        self.push(None, outcome_type, target_id, detail)
    }

    /// Add an outcome under an existing node.
    pub fn add_child(
        &mut self,
        parent_id: OutcomeId,
        outcome_type: OutcomeType,
        target_id: Option<String>,
        detail: Option<String>,
    ) -> OutcomeId {
        self.push(Some(parent_id), outcome_type, target_id, detail)
    }

    fn push(
        &mut self,
        parent_id: Option<OutcomeId>,
        outcome_type: OutcomeType,
        target_id: Option<String>,
        detail: Option<String>,
    ) -> OutcomeId {
        let id = OutcomeId::new();
        self.nodes.push(Outcome {
            id,
            parent_id,
            outcome_type,
            target_id,
            detail,
        });
        id
    }

    /// Direct children of a node, in insertion order.
    pub fn children(&self, parent_id: OutcomeId) -> impl Iterator<Item = &Outcome> {
        self.nodes
            .iter()
            .filter(move |n| n.parent_id == Some(parent_id))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any node has the given type.
    #[must_use]
    pub fn contains(&self, outcome_type: OutcomeType) -> bool {
        self.nodes.iter().any(|n| n.outcome_type == outcome_type)
    }

    /// Consume the tree into its nodes, in insertion order.
    ///
    /// Parents are always inserted before their children, so the sequence is
    /// safe to bulk-insert as is.
    #[must_use]
    pub fn flatten(self) -> Vec<Outcome> {
        self.nodes
    }
}

/// Kind of processing an activity record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityChangeType {
    ExportEvaluation,
    OutOfScope,
    MetaverseObjectDeletion,
    DriftCorrection,
    ExportExecution,
    Reconciliation,
}

/// Per-record activity reported to the audit subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordActivity {
    /// Identifier of the processed record.
    pub object_id: String,
    pub change_type: ActivityChangeType,
    pub outcomes: Vec<Outcome>,
}

impl RecordActivity {
    #[must_use]
    pub fn new(object_id: impl ToString, change_type: ActivityChangeType, outcomes: OutcomeTree) -> Self {
        Self {
            object_id: object_id.to_string(),
            change_type,
            outcomes: outcomes.flatten(),
        }
    }
}

/// Receiver of activity records. Persistence and aggregation are its concern.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, activity: RecordActivity) -> SyncResult<()>;
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

#[async_trait]
impl AuditSink for NoopAuditSink {
    async fn record(&self, _activity: RecordActivity) -> SyncResult<()> {
        Ok(())
    }
}

/// Sink that keeps every record in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<RecordActivity>>>,
}

impl InMemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<RecordActivity> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn record(&self, activity: RecordActivity) -> SyncResult<()> {
        self.records.lock().await.push(activity);
        Ok(())
    }
}

/// Hand an activity to the sink. Audit failures never fail synchronization.
pub(crate) async fn report(
    sink: &dyn AuditSink,
    object_id: impl ToString,
    change_type: ActivityChangeType,
    outcomes: OutcomeTree,
) {
    if outcomes.is_empty() {
        return;
    }
    let activity = RecordActivity::new(object_id, change_type, outcomes);
    if let Err(e) = sink.record(activity).await {
        warn!(error = %e, "Failed to record sync activity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tree_links_children_by_id() {
        let mut tree = OutcomeTree::new();
        let root = tree.add_root(OutcomeType::ConnectedSystemObjectCreated, Some("cso-1".into()), None);
        let child = tree.add_child(root, OutcomeType::PendingExportCreated, Some("pe-1".into()), None);
        tree.add_child(child, OutcomeType::AttributeFlow, None, Some("displayName".into()));

        assert_eq!(tree.children(root).count(), 1);
        assert_eq!(tree.children(child).count(), 1);
        assert!(tree.contains(OutcomeType::AttributeFlow));
    }

    #[test]
    fn test_flatten_keeps_parents_before_children() {
        let mut tree = OutcomeTree::new();
        let root = tree.add_root(OutcomeType::DriftDetected, None, None);
        let a = tree.add_child(root, OutcomeType::AttributeFlow, None, None);
        let b = tree.add_child(root, OutcomeType::AttributeFlow, None, None);
        tree.add_child(a, OutcomeType::PendingExportUpdated, None, None);

        let flat = tree.flatten();
        assert_eq!(flat.len(), 4);
        for (index, node) in flat.iter().enumerate() {
            if let Some(parent) = node.parent_id {
                let parent_index = flat.iter().position(|n| n.id == parent).unwrap();
                assert!(parent_index < index);
            }
        }
        assert_eq!(flat[2].id, b);
    }

    #[tokio::test]
    async fn test_report_skips_empty_trees() {
        let sink = InMemoryAuditSink::new();
        report(&sink, "mvo-1", ActivityChangeType::ExportEvaluation, OutcomeTree::new()).await;
        assert!(sink.records().await.is_empty());

        let mut tree = OutcomeTree::new();
        tree.add_root(OutcomeType::Exported, None, None);
        report(&sink, "mvo-1", ActivityChangeType::ExportExecution, tree).await;
        let records = sink.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].object_id, "mvo-1");
    }
}
