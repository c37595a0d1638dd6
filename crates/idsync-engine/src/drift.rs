//! Drift detection.
//!
//! After an import, a joined staging record is compared with what the export
//! rules say it should hold. Differences on rules that enforce state become
//! corrective changes, merged with export-evaluation output into the
//! record's pending export.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use idsync_core::ids::{ConnectedSystemObjectId, SyncRuleId};
use idsync_core::model::{
    ConnectedSystemAttribute, ConnectedSystemObject, ConnectedSystemObjectStatus, MappingSource,
    MetaverseObject, PendingExport, PendingExportAttributeValueChange, PendingExportChangeType,
    PendingExportStatus, SyncRule,
};
use idsync_core::value::AttributeValue;

use crate::audit::{report, ActivityChangeType, AuditSink, NoopAuditSink, OutcomeTree, OutcomeType};
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::evaluation::{
    intended_values, is_in_scope, merge_drift_changes, merge_into_existing, ImportContributorCache,
    SyncRuleCache,
};
use crate::expression::{ExpressionEvaluator, RhaiExpressionEvaluator};
use crate::protected::ProtectedAttributeTable;
use crate::repository::BoxedRepository;

/// Expected and observed values of a drifted attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriftValues {
    SingleValued {
        expected: Option<AttributeValue>,
        actual: Option<AttributeValue>,
    },
    MultiValued {
        expected: Vec<AttributeValue>,
        actual: Vec<AttributeValue>,
    },
}

/// One attribute whose live value differs from the intended value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftedAttribute {
    pub sync_rule_id: SyncRuleId,
    pub attribute: ConnectedSystemAttribute,
    pub values: DriftValues,
}

impl DriftedAttribute {
    /// Changes that restore the intended value.
    #[must_use]
    pub fn corrective_changes(&self) -> Vec<PendingExportAttributeValueChange> {
        match &self.values {
            DriftValues::SingleValued { expected, .. } => vec![match expected {
                Some(value) => PendingExportAttributeValueChange::update(&self.attribute, value.clone()),
                None => PendingExportAttributeValueChange::clear(&self.attribute),
            }],
            DriftValues::MultiValued { expected, actual } => {
                if expected.is_empty() {
                    return vec![PendingExportAttributeValueChange::remove_all(&self.attribute)];
                }
                let expected_keys = keys(expected);
                let actual_keys = keys(actual);
                expected
                    .iter()
                    .filter(|v| !actual_keys.contains(&v.canonical_key()))
                    .map(|v| PendingExportAttributeValueChange::add(&self.attribute, v.clone()))
                    .chain(
                        actual
                            .iter()
                            .filter(|v| !expected_keys.contains(&v.canonical_key()))
                            .map(|v| PendingExportAttributeValueChange::remove(&self.attribute, v.clone())),
                    )
                    .collect()
            }
        }
    }
}

/// Drift found on one staging record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriftResult {
    pub connected_system_object_id: ConnectedSystemObjectId,
    pub drifted_attributes: Vec<DriftedAttribute>,
}

impl DriftResult {
    #[must_use]
    pub fn none(connected_system_object_id: ConnectedSystemObjectId) -> Self {
        Self {
            connected_system_object_id,
            drifted_attributes: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_drift(&self) -> bool {
        !self.drifted_attributes.is_empty()
    }

    #[must_use]
    pub fn corrective_changes(&self) -> Vec<PendingExportAttributeValueChange> {
        self.drifted_attributes
            .iter()
            .flat_map(DriftedAttribute::corrective_changes)
            .collect()
    }
}

fn keys(values: &[AttributeValue]) -> HashSet<String> {
    values.iter().map(AttributeValue::canonical_key).collect()
}

/// Compare a joined staging record with what the export rules intend.
///
/// Returns no drift when the record is not joined, the metaverse object's
/// type is not loaded, or no state-enforcing rule applies. Attributes the
/// record's own system imports are never drift.
#[must_use]
pub fn evaluate_drift<'a>(
    cso: &ConnectedSystemObject,
    mvo: &MetaverseObject,
    export_rules: impl IntoIterator<Item = &'a SyncRule>,
    contributors: &ImportContributorCache,
    expressions: &dyn ExpressionEvaluator,
    protected: &ProtectedAttributeTable,
) -> DriftResult {
    let mut result = DriftResult::none(cso.id);

    if !cso.is_joined() || cso.metaverse_object_id != Some(mvo.id) {
        return result;
    }
    let Some(object_type) = mvo.object_type.as_ref() else {
        debug!(mvo_id = %mvo.id, "Metaverse object type not loaded; drift skipped");
        return result;
    };

    let applicable = export_rules.into_iter().filter(|rule| {
        rule.applies_to_export(object_type.id)
            && rule.enforce_state
            && rule.connected_system_id == cso.connected_system_id
            && rule.connected_system_object_type.id == cso.object_type_id
    });

    for rule in applicable {
        if !is_in_scope(mvo, &rule.scoping_criteria_groups) {
            continue;
        }

        for mapping in &rule.attribute_flow_mappings {
            let Some(target) = mapping.connected_system_target() else {
                continue;
            };
            if let MappingSource::MetaverseAttribute(source) = &mapping.source {
                if contributors.is_contributor(cso.connected_system_id, source.id) {
                    continue;
                }
            }

            let expected = match intended_values(&mapping.source, mvo, cso, expressions) {
                Ok(Some(values)) => values,
                Ok(None) => continue,
                Err(e) => {
                    warn!(attribute = %target.name, error = %e, "Expression failed during drift check");
                    continue;
                }
            };
            let actual: Vec<AttributeValue> = cso.values(target.id).into_iter().cloned().collect();

            let values = if target.plurality.is_multi_valued() {
                if keys(&expected) == keys(&actual) {
                    continue;
                }
                DriftValues::MultiValued { expected, actual }
            } else {
                let expected = expected.into_iter().next();
                let actual = actual.into_iter().next();
                let substitute = protected.substitute_for(cso.connected_system_id, &target.name);
                let cleared_to_substitute =
                    expected.is_none() && actual.is_some() && actual.as_ref() == substitute;
                if expected == actual || cleared_to_substitute {
                    continue;
                }
                DriftValues::SingleValued { expected, actual }
            };

            debug!(cso_id = %cso.id, attribute = %target.name, "Drift detected");
            result.drifted_attributes.push(DriftedAttribute {
                sync_rule_id: rule.id,
                attribute: target.clone(),
                values,
            });
        }
    }

    result
}

/// Detects and stages corrections for drifted staging records.
pub struct DriftDetector {
    repository: BoxedRepository,
    rules: Arc<SyncRuleCache>,
    contributors: Arc<ImportContributorCache>,
    config: EngineConfig,
    expressions: Arc<dyn ExpressionEvaluator>,
    audit: Arc<dyn AuditSink>,
}

impl DriftDetector {
    #[must_use]
    pub fn new(repository: BoxedRepository, rules: Arc<SyncRuleCache>, config: EngineConfig) -> Self {
        let contributors = Arc::new(rules.import_contributors());
        Self {
            repository,
            rules,
            contributors,
            config,
            expressions: Arc::new(RhaiExpressionEvaluator::new()),
            audit: Arc::new(NoopAuditSink),
        }
    }

    #[must_use]
    pub fn with_expression_evaluator(mut self, expressions: Arc<dyn ExpressionEvaluator>) -> Self {
        self.expressions = expressions;
        self
    }

    #[must_use]
    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    /// Drift on one staging record against the cached export rules.
    #[must_use]
    pub fn evaluate_drift(&self, cso: &ConnectedSystemObject, mvo: &MetaverseObject) -> DriftResult {
        evaluate_drift(
            cso,
            mvo,
            self.rules.rules(),
            &self.contributors,
            self.expressions.as_ref(),
            &self.config.protected_attributes,
        )
    }

    /// Merge drift corrections with export-evaluation changes and stage them.
    ///
    /// Export-evaluation changes win on a collision. Returns the pending
    /// export when it was created or modified.
    #[instrument(skip(self, cso, drift, export_changes), fields(cso_id = %cso.id))]
    pub async fn stage_corrections(
        &self,
        cso: &ConnectedSystemObject,
        drift: &DriftResult,
        export_changes: Vec<PendingExportAttributeValueChange>,
    ) -> SyncResult<Option<PendingExport>> {
        let merged = merge_drift_changes(export_changes, drift.corrective_changes());
        if merged.is_empty() {
            return Ok(None);
        }

        let mut outcomes = OutcomeTree::new();
        let root = outcomes.add_root(
            OutcomeType::DriftDetected,
            Some(cso.id.to_string()),
            Some(format!("{} attributes", drift.drifted_attributes.len())),
        );

        let staged = match self.repository.find_pending_export_for_object(cso.id).await? {
            Some(existing)
                if existing.change_type == PendingExportChangeType::Delete
                    || existing.status == PendingExportStatus::Failed =>
            {
                debug!(pending_export_id = %existing.id, "Pending export cannot take corrections");
                None
            }
            Some(mut existing) => {
                let outcome = merge_into_existing(&mut existing, merged);
                if outcome.is_modified() {
                    existing.status = PendingExportStatus::Pending;
                    self.repository
                        .update_pending_exports(std::slice::from_ref(&existing))
                        .await?;
                    outcomes.add_child(
                        root,
                        OutcomeType::PendingExportUpdated,
                        Some(existing.id.to_string()),
                        None,
                    );
                    Some(existing)
                } else {
                    None
                }
            }
            None => {
                let change_type = if cso.status == ConnectedSystemObjectStatus::PendingProvisioning {
                    PendingExportChangeType::Create
                } else {
                    PendingExportChangeType::Update
                };
                let mut export = PendingExport::new(
                    cso.connected_system_id,
                    cso.id,
                    change_type,
                    self.config.max_retries,
                )
                .with_changes(merged);
                export.source_metaverse_object_id = cso.metaverse_object_id;
                self.repository
                    .create_pending_exports(std::slice::from_ref(&export))
                    .await?;
                outcomes.add_child(
                    root,
                    OutcomeType::PendingExportCreated,
                    Some(export.id.to_string()),
                    None,
                );
                Some(export)
            }
        };

        if let Some(export) = &staged {
            info!(
                pending_export_id = %export.id,
                changes = export.attribute_value_changes.len(),
                "Staged drift corrections"
            );
        }
        report(self.audit.as_ref(), cso.id, ActivityChangeType::DriftCorrection, outcomes).await;
        Ok(staged)
    }
}
