//! Export evaluation.
//!
//! Turns a change to a metaverse object into pending exports for every
//! connected system an export rule targets. Evaluation only stages work;
//! nothing is sent to a connected system here.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use idsync_core::ids::{
    ConnectedSystemId, ConnectedSystemObjectId, MetaverseAttributeId, SyncRuleId,
};
use idsync_core::model::{
    ConnectedSystemAttribute, ConnectedSystemObject, ConnectedSystemObjectStatus, DeletionRule,
    JoinType, MappingSource, MetaverseObject, OutboundDeprovisionAction, PendingExport,
    PendingExportAttributeValueChange, PendingExportChangeType, PendingExportStatus, SyncRule,
};
use idsync_core::value::AttributeValue;

use crate::audit::{report, ActivityChangeType, AuditSink, NoopAuditSink, OutcomeTree, OutcomeType};
use crate::config::EngineConfig;
use crate::error::{SyncError, SyncResult};
use crate::expression::{ExpressionContext, ExpressionError, ExpressionEvaluator, RhaiExpressionEvaluator};
use crate::matching::ObjectMatcher;
use crate::repository::BoxedRepository;

pub mod cache;
pub mod merge;
pub mod no_net_change;
pub mod scope;

pub use cache::{ImportContributorCache, SyncRuleCache};
pub use merge::{merge_drift_changes, merge_into_existing, withdraw_superseded, MergeOutcome};
pub use no_net_change::{is_already_current, is_current_with_substitute};
pub use scope::is_in_scope;

/// How a metaverse attribute changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetaverseChangeKind {
    Added,
    Updated,
    Removed,
}

/// One changed attribute of a metaverse object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MetaverseAttributeChange {
    pub attribute_id: MetaverseAttributeId,
    pub kind: MetaverseChangeKind,
}

impl MetaverseAttributeChange {
    #[must_use]
    pub fn added(attribute_id: MetaverseAttributeId) -> Self {
        Self { attribute_id, kind: MetaverseChangeKind::Added }
    }

    #[must_use]
    pub fn updated(attribute_id: MetaverseAttributeId) -> Self {
        Self { attribute_id, kind: MetaverseChangeKind::Updated }
    }

    #[must_use]
    pub fn removed(attribute_id: MetaverseAttributeId) -> Self {
        Self { attribute_id, kind: MetaverseChangeKind::Removed }
    }
}

/// An export rule whose object matching found more than one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AmbiguousMatch {
    pub sync_rule_id: SyncRuleId,
    pub attribute: String,
    pub value: String,
    pub candidate_ids: Vec<String>,
}

/// Result of [`ExportEvaluator::evaluate_export_rules`].
#[derive(Debug, Clone, Default)]
pub struct ExportEvaluation {
    /// Pending exports created or modified by this evaluation.
    pub pending_exports: Vec<PendingExport>,
    /// Staging records created by provisioning.
    pub provisioned: Vec<ConnectedSystemObjectId>,
    /// Existing staging records joined through object matching.
    pub joined: Vec<ConnectedSystemObjectId>,
    pub ambiguous_matches: Vec<AmbiguousMatch>,
}

impl ExportEvaluation {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending_exports.is_empty() && self.provisioned.is_empty() && self.joined.is_empty()
    }
}

/// Result of [`ExportEvaluator::evaluate_out_of_scope_exports`].
#[derive(Debug, Clone, Default)]
pub struct OutOfScopeEvaluation {
    /// Staging records detached from the metaverse object.
    pub disconnected: Vec<ConnectedSystemObjectId>,
    /// Delete pending exports staged.
    pub pending_exports: Vec<PendingExport>,
    /// Never-provisioned staging records discarded outright.
    pub removed: Vec<ConnectedSystemObjectId>,
    /// Set when the last connector was disconnected.
    pub last_connector_disconnected_at: Option<chrono::DateTime<Utc>>,
}

/// Result of [`ExportEvaluator::evaluate_mvo_deletion`].
#[derive(Debug, Clone, Default)]
pub struct MetaverseObjectDeletion {
    pub pending_exports: Vec<PendingExport>,
    pub detached: Vec<ConnectedSystemObjectId>,
    pub removed: Vec<ConnectedSystemObjectId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    Existing,
    Joined,
    Provisioned,
}

/// Converts a metaverse value into the form it is exported in.
///
/// References to metaverse objects become unresolved references, resolved
/// against the target system when the export is sent.
pub(crate) fn to_export_value(value: &AttributeValue) -> AttributeValue {
    match value {
        AttributeValue::Reference(id) => AttributeValue::UnresolvedReference(id.to_string()),
        other => other.clone(),
    }
}

/// Values an export mapping intends for its target.
///
/// `None` when the mapping has no export source.
pub(crate) fn intended_values(
    source: &MappingSource,
    mvo: &MetaverseObject,
    cso: &ConnectedSystemObject,
    expressions: &dyn ExpressionEvaluator,
) -> Result<Option<Vec<AttributeValue>>, ExpressionError> {
    match source {
        MappingSource::MetaverseAttribute(attribute) => Ok(Some(
            mvo.values(attribute.id).into_iter().map(to_export_value).collect(),
        )),
        MappingSource::Expression(expression) => {
            let context =
                ExpressionContext::for_metaverse_object(mvo).with_connected_system_object(cso);
            let values = expressions.evaluate(expression, &context)?;
            Ok(Some(values.iter().map(to_export_value).collect()))
        }
        MappingSource::ConnectedSystemAttribute(_) => Ok(None),
    }
}

/// Attribute changes that bring `target` to the intended values.
///
/// Single-valued targets get one Update (a clear when nothing is intended).
/// Multi-valued targets get an Add per intended value and a Remove per
/// current value not intended, or RemoveAll when nothing is intended.
pub(crate) fn changes_for_target(
    target: &ConnectedSystemAttribute,
    intended: Vec<AttributeValue>,
    current: &[&AttributeValue],
) -> Vec<PendingExportAttributeValueChange> {
    if !target.plurality.is_multi_valued() {
        let change = match intended.into_iter().next() {
            Some(value) => PendingExportAttributeValueChange::update(target, value),
            None => PendingExportAttributeValueChange::clear(target),
        };
        return vec![change];
    }

    if intended.is_empty() {
        return vec![PendingExportAttributeValueChange::remove_all(target)];
    }

    let mut seen = HashSet::new();
    let mut changes = Vec::with_capacity(intended.len());
    for value in intended {
        if seen.insert(value.canonical_key()) {
            changes.push(PendingExportAttributeValueChange::add(target, value));
        }
    }
    for value in current {
        if !seen.contains(&value.canonical_key()) {
            changes.push(PendingExportAttributeValueChange::remove(target, (*value).clone()));
        }
    }
    changes
}

/// Changes computed for one export rule.
#[derive(Debug, Default)]
struct ComputedChanges {
    /// Changes still needed once the staging record's values are accounted for.
    changes: Vec<PendingExportAttributeValueChange>,
    /// Every change the evaluated mappings call for, current or not.
    intended: Vec<PendingExportAttributeValueChange>,
}

/// Stages outbound work for metaverse object changes.
pub struct ExportEvaluator {
    repository: BoxedRepository,
    rules: Arc<SyncRuleCache>,
    config: EngineConfig,
    expressions: Arc<dyn ExpressionEvaluator>,
    audit: Arc<dyn AuditSink>,
}

impl ExportEvaluator {
    /// Create an evaluator using the Rhai expression evaluator and no audit sink.
    #[must_use]
    pub fn new(repository: BoxedRepository, rules: Arc<SyncRuleCache>, config: EngineConfig) -> Self {
        Self {
            repository,
            rules,
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

    /// Stage pending exports for a changed metaverse object.
    ///
    /// `source_system` is the connected system whose import caused the
    /// change, if any; rules targeting it are skipped. An empty
    /// `changed_attributes` re-evaluates every mapping.
    #[instrument(skip(self, mvo, changed_attributes), fields(mvo_id = %mvo.id))]
    pub async fn evaluate_export_rules(
        &self,
        mvo: &MetaverseObject,
        changed_attributes: &[MetaverseAttributeChange],
        source_system: Option<ConnectedSystemId>,
    ) -> SyncResult<ExportEvaluation> {
        let mut evaluation = ExportEvaluation::default();
        let mut outcomes = OutcomeTree::new();

        for rule in self.rules.export_rules_for(mvo.object_type_id) {
            if source_system == Some(rule.connected_system_id) {
                debug!(rule = %rule.name, "Skipping export back to the contributing system");
                continue;
            }
            if !is_in_scope(mvo, &rule.scoping_criteria_groups) {
                debug!(rule = %rule.name, "Metaverse object out of scope for export rule");
                continue;
            }

            match self
                .evaluate_rule(mvo, rule, changed_attributes, &mut evaluation, &mut outcomes)
                .await
            {
                Ok(()) => {}
                Err(SyncError::AmbiguousMatch {
                    attribute,
                    value,
                    candidate_ids,
                }) => {
                    warn!(
                        rule = %rule.name,
                        attribute = %attribute,
                        candidates = candidate_ids.len(),
                        "Ambiguous object match; export rule skipped"
                    );
                    outcomes.add_root(
                        OutcomeType::AmbiguousMatch,
                        Some(rule.id.to_string()),
                        Some(format!("{attribute}={value}")),
                    );
                    evaluation.ambiguous_matches.push(AmbiguousMatch {
                        sync_rule_id: rule.id,
                        attribute,
                        value,
                        candidate_ids,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        report(
            self.audit.as_ref(),
            mvo.id,
            ActivityChangeType::ExportEvaluation,
            outcomes,
        )
        .await;

        info!(
            pending_exports = evaluation.pending_exports.len(),
            provisioned = evaluation.provisioned.len(),
            joined = evaluation.joined.len(),
            "Export evaluation complete"
        );
        Ok(evaluation)
    }

    async fn evaluate_rule(
        &self,
        mvo: &MetaverseObject,
        rule: &SyncRule,
        changed_attributes: &[MetaverseAttributeChange],
        evaluation: &mut ExportEvaluation,
        outcomes: &mut OutcomeTree,
    ) -> SyncResult<()> {
        let Some((cso, disposition)) = self.locate_target(mvo, rule).await? else {
            return Ok(());
        };

        let root = match disposition {
            Disposition::Existing => None,
            Disposition::Joined => {
                evaluation.joined.push(cso.id);
                Some(outcomes.add_root(
                    OutcomeType::ConnectedSystemObjectJoined,
                    Some(cso.id.to_string()),
                    Some(rule.name.clone()),
                ))
            }
            Disposition::Provisioned => {
                evaluation.provisioned.push(cso.id);
                Some(outcomes.add_root(
                    OutcomeType::ConnectedSystemObjectCreated,
                    Some(cso.id.to_string()),
                    Some(rule.name.clone()),
                ))
            }
        };

        let full = disposition != Disposition::Existing || changed_attributes.is_empty();
        let ComputedChanges { changes, intended } =
            self.compute_changes(mvo, rule, &cso, changed_attributes, full);

        let change_type = if disposition == Disposition::Provisioned
            || cso.status == ConnectedSystemObjectStatus::PendingProvisioning
        {
            PendingExportChangeType::Create
        } else {
            PendingExportChangeType::Update
        };

        let staged = self
            .stage_changes(mvo, rule, &cso, change_type, changes, &intended)
            .await?;
        if let Some((export, created)) = staged {
            let outcome_type = if created {
                OutcomeType::PendingExportCreated
            } else {
                OutcomeType::PendingExportUpdated
            };
            let target = Some(export.id.to_string());
            let node = match root {
                Some(parent) => outcomes.add_child(parent, outcome_type, target, None),
                None => outcomes.add_root(outcome_type, target, None),
            };
            for change in &export.attribute_value_changes {
                outcomes.add_child(
                    node,
                    OutcomeType::AttributeFlow,
                    None,
                    Some(change.attribute_name.clone()),
                );
            }
            evaluation.pending_exports.push(export);
        }
        Ok(())
    }

    /// Find or create the staging record a rule exports to.
    async fn locate_target(
        &self,
        mvo: &MetaverseObject,
        rule: &SyncRule,
    ) -> SyncResult<Option<(ConnectedSystemObject, Disposition)>> {
        if let Some(cso) = self
            .repository
            .find_joined_connected_system_object(rule.connected_system_id, mvo.id)
            .await?
        {
            if cso.status == ConnectedSystemObjectStatus::Obsolete {
                debug!(cso_id = %cso.id, "Joined connected system object is obsolete");
                return Ok(None);
            }
            return Ok(Some((cso, Disposition::Existing)));
        }

        let matcher = ObjectMatcher::new(self.repository.as_ref());
        if let Some(mut cso) = matcher
            .find_connected_system_object(
                mvo,
                &rule.object_matching_rules,
                rule.connected_system_id,
                rule.connected_system_object_type.id,
            )
            .await?
        {
            cso.join(mvo.id, JoinType::Joined);
            self.repository
                .update_connected_system_objects(std::slice::from_ref(&cso))
                .await?;
            info!(cso_id = %cso.id, rule = %rule.name, "Joined existing connected system object");
            return Ok(Some((cso, Disposition::Joined)));
        }

        if !rule.provision_to_connected_system {
            return Ok(None);
        }

        let cso = ConnectedSystemObject::provisioned(&rule.connected_system_object_type, mvo.id);
        self.repository
            .create_connected_system_objects(std::slice::from_ref(&cso))
            .await?;
        info!(cso_id = %cso.id, rule = %rule.name, "Provisioned connected system object");
        Ok(Some((cso, Disposition::Provisioned)))
    }

    fn compute_changes(
        &self,
        mvo: &MetaverseObject,
        rule: &SyncRule,
        cso: &ConnectedSystemObject,
        changed_attributes: &[MetaverseAttributeChange],
        full: bool,
    ) -> ComputedChanges {
        let pure_recall = !changed_attributes.is_empty()
            && changed_attributes
                .iter()
                .all(|c| c.kind == MetaverseChangeKind::Removed);

        let mut computed = ComputedChanges::default();
        for mapping in &rule.attribute_flow_mappings {
            let Some(target) = mapping.connected_system_target() else {
                continue;
            };

            let relevant = match &mapping.source {
                MappingSource::MetaverseAttribute(source) => {
                    full || changed_attributes.iter().any(|c| c.attribute_id == source.id)
                }
                // A pure recall would feed an expression nothing but gaps.
                MappingSource::Expression(_) => full || !pure_recall,
                MappingSource::ConnectedSystemAttribute(_) => {
                    warn!(rule = %rule.name, attribute = %target.name, "Export mapping has an import source");
                    false
                }
            };
            if !relevant {
                continue;
            }

            let intended =
                match intended_values(&mapping.source, mvo, cso, self.expressions.as_ref()) {
                    Ok(Some(values)) => values,
                    Ok(None) => continue,
                    Err(e) => {
                        warn!(
                            rule = %rule.name,
                            attribute = %target.name,
                            error = %e,
                            "Expression mapping failed; attribute skipped"
                        );
                        continue;
                    }
                };

            let current = cso.values(target.id);
            let substitute = self
                .config
                .protected_attributes
                .substitute_for(rule.connected_system_id, &target.name);
            let target_changes = changes_for_target(target, intended, &current);
            computed.changes.extend(
                target_changes
                    .iter()
                    .filter(|change| !is_current_with_substitute(change, &current, substitute))
                    .cloned(),
            );
            computed.intended.extend(target_changes);
        }
        computed
    }

    /// Merge changes into the outstanding pending export or create one.
    ///
    /// Queued changes for the evaluated attributes that `intended` no longer
    /// holds are withdrawn first. Returns the export and whether it was newly
    /// created, or `None` when nothing was staged.
    async fn stage_changes(
        &self,
        mvo: &MetaverseObject,
        rule: &SyncRule,
        cso: &ConnectedSystemObject,
        change_type: PendingExportChangeType,
        changes: Vec<PendingExportAttributeValueChange>,
        intended: &[PendingExportAttributeValueChange],
    ) -> SyncResult<Option<(PendingExport, bool)>> {
        match self.repository.find_pending_export_for_object(cso.id).await? {
            Some(existing) if existing.change_type == PendingExportChangeType::Delete => {
                debug!(pending_export_id = %existing.id, "Delete outstanding; attribute changes dropped");
                Ok(None)
            }
            Some(existing) if existing.status == PendingExportStatus::Failed => {
                warn!(
                    pending_export_id = %existing.id,
                    "Pending export failed terminally; re-queue it before new changes can flow"
                );
                Ok(None)
            }
            Some(mut existing) => {
                let withdrawn = withdraw_superseded(&mut existing, intended);
                let outcome = merge_into_existing(&mut existing, changes);
                if withdrawn == 0 && !outcome.is_modified() {
                    return Ok(None);
                }
                if existing.attribute_value_changes.is_empty()
                    && existing.change_type == PendingExportChangeType::Update
                {
                    self.repository.delete_pending_exports(&[existing.id]).await?;
                    info!(
                        pending_export_id = %existing.id,
                        withdrawn,
                        "Queued changes withdrawn; pending export removed"
                    );
                    return Ok(None);
                }
                existing.status = PendingExportStatus::Pending;
                existing.source_metaverse_object_id = Some(mvo.id);
                self.repository
                    .update_pending_exports(std::slice::from_ref(&existing))
                    .await?;
                debug!(
                    pending_export_id = %existing.id,
                    added = outcome.added,
                    replaced = outcome.replaced,
                    withdrawn,
                    "Merged changes into pending export"
                );
                Ok(Some((existing, false)))
            }
            None if changes.is_empty() && change_type == PendingExportChangeType::Update => {
                debug!(cso_id = %cso.id, "No net change for connected system object");
                Ok(None)
            }
            None => {
                let export = PendingExport::new(
                    rule.connected_system_id,
                    cso.id,
                    change_type,
                    self.config.max_retries,
                )
                .with_source(mvo.id)
                .with_changes(changes);
                self.repository
                    .create_pending_exports(std::slice::from_ref(&export))
                    .await?;
                debug!(
                    pending_export_id = %export.id,
                    change_type = %change_type,
                    changes = export.attribute_value_changes.len(),
                    "Created pending export"
                );
                Ok(Some((export, true)))
            }
        }
    }

    /// Handle export rules the metaverse object no longer satisfies.
    #[instrument(skip(self, mvo), fields(mvo_id = %mvo.id))]
    pub async fn evaluate_out_of_scope_exports(
        &self,
        mvo: &MetaverseObject,
        source_system: Option<ConnectedSystemId>,
    ) -> SyncResult<OutOfScopeEvaluation> {
        let mut result = OutOfScopeEvaluation::default();
        let mut outcomes = OutcomeTree::new();

        for rule in self.rules.export_rules_for(mvo.object_type_id) {
            if source_system == Some(rule.connected_system_id) {
                continue;
            }
            if is_in_scope(mvo, &rule.scoping_criteria_groups) {
                continue;
            }
            let Some(mut cso) = self
                .repository
                .find_joined_connected_system_object(rule.connected_system_id, mvo.id)
                .await?
            else {
                continue;
            };

            if cso.status == ConnectedSystemObjectStatus::PendingProvisioning {
                self.discard_unprovisioned(&cso).await?;
                outcomes.add_root(
                    OutcomeType::ConnectedSystemObjectDeleted,
                    Some(cso.id.to_string()),
                    Some(rule.name.clone()),
                );
                result.removed.push(cso.id);
                continue;
            }

            match rule.outbound_deprovision_action {
                OutboundDeprovisionAction::Disconnect => {
                    cso.detach();
                    self.repository
                        .update_connected_system_objects(std::slice::from_ref(&cso))
                        .await?;
                    self.drop_outstanding_updates(cso.id).await?;
                    info!(cso_id = %cso.id, rule = %rule.name, "Disconnected out-of-scope connected system object");
                    outcomes.add_root(
                        OutcomeType::ConnectedSystemObjectDisconnected,
                        Some(cso.id.to_string()),
                        Some(rule.name.clone()),
                    );
                    result.disconnected.push(cso.id);
                }
                OutboundDeprovisionAction::Delete => {
                    if let Some(export) = self.stage_delete(&cso, mvo).await? {
                        info!(cso_id = %cso.id, rule = %rule.name, "Staged delete for out-of-scope connected system object");
                        outcomes.add_root(
                            OutcomeType::PendingExportCreated,
                            Some(export.id.to_string()),
                            Some(PendingExportChangeType::Delete.to_string()),
                        );
                        result.pending_exports.push(export);
                    }
                }
            }
        }

        if !result.disconnected.is_empty()
            && mvo.deletion_rule() == Some(DeletionRule::WhenLastConnectorDisconnected)
        {
            let remaining = self
                .repository
                .find_connected_system_objects_for_metaverse_object(mvo.id)
                .await?;
            if remaining.iter().all(|c| !c.is_joined()) {
                let now = Utc::now();
                let mut updated = mvo.clone();
                updated.last_connector_disconnected_at = Some(now);
                self.repository
                    .update_metaverse_objects(std::slice::from_ref(&updated))
                    .await?;
                info!("Last connector disconnected; metaverse object eligible for deletion");
                result.last_connector_disconnected_at = Some(now);
            }
        }

        report(self.audit.as_ref(), mvo.id, ActivityChangeType::OutOfScope, outcomes).await;
        Ok(result)
    }

    /// Stage deprovisioning for a metaverse object being deleted.
    ///
    /// Only provisioned staging records are deleted from their systems;
    /// joined and projected records are detached.
    #[instrument(skip(self, mvo), fields(mvo_id = %mvo.id))]
    pub async fn evaluate_mvo_deletion(
        &self,
        mvo: &MetaverseObject,
    ) -> SyncResult<MetaverseObjectDeletion> {
        let mut result = MetaverseObjectDeletion::default();
        let mut outcomes = OutcomeTree::new();

        let connected = self
            .repository
            .find_connected_system_objects_for_metaverse_object(mvo.id)
            .await?;

        for mut cso in connected {
            match (cso.join_type, cso.status) {
                (JoinType::Provisioned, ConnectedSystemObjectStatus::PendingProvisioning) => {
                    self.discard_unprovisioned(&cso).await?;
                    outcomes.add_root(
                        OutcomeType::ConnectedSystemObjectDeleted,
                        Some(cso.id.to_string()),
                        None,
                    );
                    result.removed.push(cso.id);
                }
                (JoinType::Provisioned, _) => {
                    if let Some(export) = self.stage_delete(&cso, mvo).await? {
                        outcomes.add_root(
                            OutcomeType::PendingExportCreated,
                            Some(export.id.to_string()),
                            Some(PendingExportChangeType::Delete.to_string()),
                        );
                        result.pending_exports.push(export);
                    }
                }
                _ => {
                    cso.detach();
                    self.repository
                        .update_connected_system_objects(std::slice::from_ref(&cso))
                        .await?;
                    self.drop_outstanding_updates(cso.id).await?;
                    outcomes.add_root(
                        OutcomeType::ConnectedSystemObjectDisconnected,
                        Some(cso.id.to_string()),
                        None,
                    );
                    result.detached.push(cso.id);
                }
            }
        }

        info!(
            deletes = result.pending_exports.len(),
            detached = result.detached.len(),
            removed = result.removed.len(),
            "Metaverse object deletion evaluated"
        );
        report(
            self.audit.as_ref(),
            mvo.id,
            ActivityChangeType::MetaverseObjectDeletion,
            outcomes,
        )
        .await;
        Ok(result)
    }

    /// Replace any outstanding work for a staging record with a Delete.
    async fn stage_delete(
        &self,
        cso: &ConnectedSystemObject,
        mvo: &MetaverseObject,
    ) -> SyncResult<Option<PendingExport>> {
        match self.repository.find_pending_export_for_object(cso.id).await? {
            Some(existing) if existing.change_type == PendingExportChangeType::Delete => Ok(None),
            Some(mut existing) => {
                existing.change_type = PendingExportChangeType::Delete;
                existing.status = PendingExportStatus::Pending;
                existing.attribute_value_changes.clear();
                existing.error_count = 0;
                existing.next_retry_at = None;
                existing.last_error_message = None;
                existing.source_metaverse_object_id = Some(mvo.id);
                self.repository
                    .update_pending_exports(std::slice::from_ref(&existing))
                    .await?;
                Ok(Some(existing))
            }
            None => {
                let export = PendingExport::new(
                    cso.connected_system_id,
                    cso.id,
                    PendingExportChangeType::Delete,
                    self.config.max_retries,
                )
                .with_source(mvo.id);
                self.repository
                    .create_pending_exports(std::slice::from_ref(&export))
                    .await?;
                Ok(Some(export))
            }
        }
    }

    /// Remove a staging record that never existed externally, with its work.
    async fn discard_unprovisioned(&self, cso: &ConnectedSystemObject) -> SyncResult<()> {
        if let Some(export) = self.repository.find_pending_export_for_object(cso.id).await? {
            self.repository.delete_pending_exports(&[export.id]).await?;
        }
        self.repository
            .delete_connected_system_objects(&[cso.id])
            .await?;
        debug!(cso_id = %cso.id, "Discarded unprovisioned connected system object");
        Ok(())
    }

    /// Drop attribute work queued for a record that is no longer joined.
    async fn drop_outstanding_updates(&self, cso_id: ConnectedSystemObjectId) -> SyncResult<()> {
        if let Some(export) = self.repository.find_pending_export_for_object(cso_id).await? {
            if export.change_type != PendingExportChangeType::Delete {
                self.repository.delete_pending_exports(&[export.id]).await?;
            }
        }
        Ok(())
    }
}
