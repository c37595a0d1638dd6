//! Merging attribute change sets.
//!
//! Two merges happen on the way to a pending export: drift corrections are
//! folded into export-evaluation output, and the result is folded into any
//! pending export already outstanding for the staging record.

use std::collections::HashSet;

use idsync_core::ids::ConnectedSystemAttributeId;
use idsync_core::model::{AttributeChangeType, PendingExport, PendingExportAttributeValueChange};

/// Combine export-evaluation changes with drift corrections.
///
/// Keys are (attribute, canonical value). Export-evaluation changes win on a
/// key collision; drift-only keys are appended untouched.
#[must_use]
pub fn merge_drift_changes(
    export_changes: Vec<PendingExportAttributeValueChange>,
    drift_changes: Vec<PendingExportAttributeValueChange>,
) -> Vec<PendingExportAttributeValueChange> {
    let export_keys: HashSet<_> = export_changes
        .iter()
        .map(PendingExportAttributeValueChange::merge_key)
        .collect();

    let mut merged = export_changes;
    merged.extend(
        drift_changes
            .into_iter()
            .filter(|change| !export_keys.contains(&change.merge_key())),
    );
    merged
}

/// Counts of what [`merge_into_existing`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub added: usize,
    pub replaced: usize,
    pub unchanged: usize,
}

impl MergeOutcome {
    /// Whether the pending export was modified.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.added > 0 || self.replaced > 0
    }
}

/// Slot a change occupies within one pending export.
///
/// Update and RemoveAll act on the whole attribute, so at most one of them
/// is outstanding per attribute. Add and Remove act on one value.
#[derive(Debug, PartialEq, Eq)]
enum Slot {
    Attribute(ConnectedSystemAttributeId),
    Value(ConnectedSystemAttributeId, Option<String>),
}

fn slot(change: &PendingExportAttributeValueChange) -> Slot {
    match change.change_type {
        AttributeChangeType::Update | AttributeChangeType::RemoveAll => {
            Slot::Attribute(change.attribute_id)
        }
        AttributeChangeType::Add | AttributeChangeType::Remove => {
            let (attribute_id, value) = change.merge_key();
            Slot::Value(attribute_id, value)
        }
    }
}

/// Fold freshly computed changes into an outstanding pending export.
///
/// A change with the same intent as an existing one keeps the existing
/// change and its status, so an already-sent change is not sent again. A
/// different intent for the same slot replaces the existing change in place.
pub fn merge_into_existing(
    existing: &mut PendingExport,
    fresh: Vec<PendingExportAttributeValueChange>,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for change in fresh {
        let key = slot(&change);
        let position = existing
            .attribute_value_changes
            .iter()
            .position(|c| slot(c) == key);

        match position {
            Some(index) if existing.attribute_value_changes[index].same_intent(&change) => {
                outcome.unchanged += 1;
            }
            Some(index) => {
                existing.attribute_value_changes[index] = change;
                outcome.replaced += 1;
            }
            None => {
                existing.attribute_value_changes.push(change);
                outcome.added += 1;
            }
        }
    }

    outcome
}

/// Withdraw queued changes a fresh evaluation no longer intends.
///
/// `intended` is the full change set computed for the evaluated target
/// attributes, before anything already current was filtered out. Only
/// changes still waiting to be sent are withdrawn; a change awaiting
/// confirmation is left for reconciliation. Returns how many were dropped.
pub fn withdraw_superseded(
    existing: &mut PendingExport,
    intended: &[PendingExportAttributeValueChange],
) -> usize {
    let evaluated: HashSet<ConnectedSystemAttributeId> =
        intended.iter().map(|c| c.attribute_id).collect();
    let intents: HashSet<_> = intended
        .iter()
        .map(|c| (c.change_type, c.merge_key()))
        .collect();

    let before = existing.attribute_value_changes.len();
    existing.attribute_value_changes.retain(|change| {
        !(change.status.is_exportable()
            && evaluated.contains(&change.attribute_id)
            && !intents.contains(&(change.change_type, change.merge_key())))
    });
    before - existing.attribute_value_changes.len()
}
