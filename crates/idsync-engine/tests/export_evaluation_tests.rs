//! Export Evaluation Tests
//!
//! Covers staging pending exports for metaverse changes:
//! - Provisioning a new object into a target system
//! - Idempotent re-evaluation
//! - No export back to the contributing system
//! - Joining through object matching rules, including ambiguous matches
//! - Merging into an outstanding pending export
//! - Withdrawing queued changes the metaverse no longer intends
//! - Out-of-scope handling and metaverse object deletion

mod common;

use std::sync::Arc;

use common::{init_tracing, repository_with_rules, test_config, DirectorySchema, PersonSchema};
use idsync_core::model::{
    AttributeChangeStatus, AttributeChangeType, ConnectedSystemAttribute, ConnectedSystemObject,
    ConnectedSystemObjectStatus, DeletionRule, JoinType, MetaverseAttribute, ObjectMatchingRule,
    OutboundDeprovisionAction, PendingExport, PendingExportAttributeValueChange,
    PendingExportChangeType, PendingExportStatus, ScopingCriteriaGroup, ScopingCriterion, SyncRule,
    SyncRuleDirection, SyncRuleMapping,
};
use idsync_core::value::{AttributeDataType, AttributeValue};
use idsync_engine::audit::{InMemoryAuditSink, OutcomeType};
use idsync_engine::evaluation::MetaverseAttributeChange;
use idsync_engine::{ExportEvaluator, InMemoryRepository, SyncRuleCache};

async fn evaluator(repo: &InMemoryRepository) -> ExportEvaluator {
    let rules = SyncRuleCache::load(repo).await.unwrap();
    ExportEvaluator::new(Arc::new(repo.clone()), Arc::new(rules), test_config())
}

// =============================================================================
// Provisioning
// =============================================================================

#[tokio::test]
async fn test_provisions_new_object_with_create_export() {
    init_tracing();
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person).provisioning(true)]).await;
    let mvo = person.person("Ada Lovelace");
    repo.insert_metaverse_object(mvo.clone()).await;

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[], None)
        .await
        .unwrap();

    assert_eq!(evaluation.provisioned.len(), 1);
    assert_eq!(evaluation.pending_exports.len(), 1);

    let export = &evaluation.pending_exports[0];
    assert_eq!(export.change_type, PendingExportChangeType::Create);
    assert_eq!(export.status, PendingExportStatus::Pending);
    assert_eq!(export.source_metaverse_object_id, Some(mvo.id));
    assert_eq!(export.max_retries, 3);

    let display_name = export
        .attribute_value_changes
        .iter()
        .find(|c| c.attribute_id == directory.display_name.id)
        .unwrap();
    assert_eq!(display_name.change_type, AttributeChangeType::Update);
    assert_eq!(display_name.value, Some(AttributeValue::from("Ada Lovelace")));

    let dn = export
        .attribute_value_changes
        .iter()
        .find(|c| c.attribute_id == directory.distinguished_name.id)
        .unwrap();
    assert_eq!(dn.value, Some(AttributeValue::from("CN=Ada Lovelace,OU=Users")));

    // Department has no value and nothing to clear
    assert!(export
        .attribute_value_changes
        .iter()
        .all(|c| c.attribute_id != directory.department.id));

    let csos = repo.connected_system_objects().await;
    assert_eq!(csos.len(), 1);
    assert_eq!(csos[0].status, ConnectedSystemObjectStatus::PendingProvisioning);
    assert_eq!(csos[0].join_type, JoinType::Provisioned);
    assert_eq!(csos[0].metaverse_object_id, Some(mvo.id));
}

#[tokio::test]
async fn test_no_provisioning_without_flag() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person)]).await;
    let mvo = person.person("Ada Lovelace");

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[], None)
        .await
        .unwrap();

    assert!(evaluation.is_empty());
    assert!(repo.connected_system_objects().await.is_empty());
}

#[tokio::test]
async fn test_reevaluation_is_idempotent() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person).provisioning(true)]).await;
    let mvo = person.person("Ada Lovelace");
    let evaluator = evaluator(&repo).await;

    let first = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    let second = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    let third = evaluator
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(person.display_name.id)], None)
        .await
        .unwrap();

    assert_eq!(first.pending_exports.len(), 1);
    assert!(second.is_empty());
    assert!(third.is_empty());

    let exports = repo.pending_exports().await;
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].attribute_value_changes.len(), first.pending_exports[0].attribute_value_changes.len());
    assert_eq!(repo.connected_system_objects().await.len(), 1);
}

#[tokio::test]
async fn test_no_export_back_to_contributing_system() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person).provisioning(true)]).await;
    let mvo = person.person("Ada Lovelace");

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(
            &mvo,
            &[MetaverseAttributeChange::updated(person.display_name.id)],
            Some(directory.system_id),
        )
        .await
        .unwrap();

    assert!(evaluation.is_empty());
    assert!(repo.pending_exports().await.is_empty());
}

// =============================================================================
// Joining and updates
// =============================================================================

#[tokio::test]
async fn test_joins_matching_object_and_stages_update() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let rule = directory.export_rule(&person);
    let rule = rule.clone().with_matching_rule(ObjectMatchingRule::for_sync_rule(
        rule.id,
        &person.employee_id,
        &directory.employee_id,
    ));
    let repo = repository_with_rules(vec![rule]).await;

    let existing = ConnectedSystemObject::new(&directory.user_type)
        .with_value(&directory.object_guid, AttributeValue::Guid(uuid::Uuid::new_v4()))
        .with_value(&directory.distinguished_name, "CN=Grace Hopper,OU=Users")
        .with_value(&directory.employee_id, "E100")
        .with_value(&directory.display_name, "G. Hopper");
    repo.insert_connected_system_object(existing.clone()).await;

    let mvo = person
        .person("Grace Hopper")
        .with_value(&person.employee_id, "E100");

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[], None)
        .await
        .unwrap();

    assert_eq!(evaluation.joined, vec![existing.id]);
    assert!(evaluation.provisioned.is_empty());
    assert_eq!(evaluation.pending_exports.len(), 1);

    let export = &evaluation.pending_exports[0];
    assert_eq!(export.change_type, PendingExportChangeType::Update);
    // The distinguished name already matches; only the display name differs.
    assert_eq!(export.attribute_value_changes.len(), 1);
    assert_eq!(
        export.attribute_value_changes[0].value,
        Some(AttributeValue::from("Grace Hopper"))
    );

    let joined = repo.connected_system_objects().await;
    assert_eq!(joined[0].metaverse_object_id, Some(mvo.id));
    assert_eq!(joined[0].join_type, JoinType::Joined);
}

#[tokio::test]
async fn test_ambiguous_match_is_reported_not_raised() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let rule = directory.export_rule(&person);
    let rule = rule.clone().provisioning(true).with_matching_rule(ObjectMatchingRule::for_sync_rule(
        rule.id,
        &person.employee_id,
        &directory.employee_id,
    ));
    let repo = repository_with_rules(vec![rule]).await;
    for _ in 0..2 {
        repo.insert_connected_system_object(
            ConnectedSystemObject::new(&directory.user_type).with_value(&directory.employee_id, "E7"),
        )
        .await;
    }
    let mvo = person.person("Duplicate").with_value(&person.employee_id, "E7");

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[], None)
        .await
        .unwrap();

    assert_eq!(evaluation.ambiguous_matches.len(), 1);
    assert_eq!(evaluation.ambiguous_matches[0].candidate_ids.len(), 2);
    assert!(evaluation.pending_exports.is_empty());
    // No provisioning happens past an ambiguous match
    assert_eq!(repo.connected_system_objects().await.len(), 2);
}

#[tokio::test]
async fn test_changed_attributes_limit_evaluated_mappings() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person)]).await;

    let mvo = person
        .person("Ada Lovelace")
        .with_value(&person.department, "Research");
    let mut cso = ConnectedSystemObject::new(&directory.user_type)
        .with_value(&directory.distinguished_name, "CN=Ada Lovelace,OU=Users")
        .with_value(&directory.display_name, "Ada");
    cso.join(mvo.id, JoinType::Joined);
    repo.insert_connected_system_object(cso).await;

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(person.department.id)], None)
        .await
        .unwrap();

    let export = &evaluation.pending_exports[0];
    let names: Vec<&str> = export
        .attribute_value_changes
        .iter()
        .map(|c| c.attribute_name.as_str())
        .collect();
    // displayName differs too, but it did not change in the metaverse
    assert!(names.contains(&"department"));
    assert!(!names.contains(&"displayName"));
}

#[tokio::test]
async fn test_new_value_replaces_outstanding_change() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person)]).await;

    let mvo = person.person("Ada King");
    let mut cso = ConnectedSystemObject::new(&directory.user_type)
        .with_value(&directory.distinguished_name, "CN=Ada King,OU=Users")
        .with_value(&directory.display_name, "Ada Lovelace");
    cso.join(mvo.id, JoinType::Joined);
    repo.insert_connected_system_object(cso.clone()).await;

    let mut stale = PendingExportAttributeValueChange::update(&directory.display_name, "Ada Byron");
    stale.status = AttributeChangeStatus::ExportedNotConfirmed;
    let mut outstanding = PendingExport::new(directory.system_id, cso.id, PendingExportChangeType::Update, 3)
        .with_changes(vec![
            stale,
            PendingExportAttributeValueChange::update(&directory.department, "Mathematics"),
        ]);
    outstanding.status = PendingExportStatus::ExportNotConfirmed;
    repo.insert_pending_export(outstanding.clone()).await;

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(person.display_name.id)], None)
        .await
        .unwrap();

    assert_eq!(evaluation.pending_exports.len(), 1);
    let merged = &evaluation.pending_exports[0];
    assert_eq!(merged.id, outstanding.id);
    assert_eq!(merged.status, PendingExportStatus::Pending);
    assert_eq!(merged.attribute_value_changes.len(), 2);

    let display_name = merged
        .attribute_value_changes
        .iter()
        .find(|c| c.attribute_id == directory.display_name.id)
        .unwrap();
    assert_eq!(display_name.value, Some(AttributeValue::from("Ada King")));
    assert_eq!(display_name.status, AttributeChangeStatus::Pending);

    assert_eq!(repo.pending_exports().await.len(), 1);
}

#[tokio::test]
async fn test_outstanding_delete_takes_no_changes() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person)]).await;

    let mvo = person.person("Ada Lovelace");
    let mut cso = ConnectedSystemObject::new(&directory.user_type);
    cso.join(mvo.id, JoinType::Provisioned);
    repo.insert_connected_system_object(cso.clone()).await;
    repo.insert_pending_export(PendingExport::new(
        directory.system_id,
        cso.id,
        PendingExportChangeType::Delete,
        3,
    ))
    .await;

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[], None)
        .await
        .unwrap();

    assert!(evaluation.pending_exports.is_empty());
    let exports = repo.pending_exports().await;
    assert_eq!(exports.len(), 1);
    assert!(exports[0].attribute_value_changes.is_empty());
}

#[tokio::test]
async fn test_evaluation_is_audited() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person).provisioning(true)]).await;
    let audit = Arc::new(InMemoryAuditSink::new());
    let rules = SyncRuleCache::load(&repo).await.unwrap();
    let evaluator = ExportEvaluator::new(Arc::new(repo.clone()), Arc::new(rules), test_config())
        .with_audit_sink(audit.clone());

    let mvo = person.person("Ada Lovelace");
    evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();

    let records = audit.records().await;
    assert_eq!(records.len(), 1);
    let types: Vec<OutcomeType> = records[0].outcomes.iter().map(|o| o.outcome_type).collect();
    assert!(types.contains(&OutcomeType::ConnectedSystemObjectCreated));
    assert!(types.contains(&OutcomeType::PendingExportCreated));
    assert!(types.contains(&OutcomeType::AttributeFlow));
}

// =============================================================================
// Out of scope and deletion
// =============================================================================

#[tokio::test]
async fn test_out_of_scope_disconnect_stamps_last_connector() {
    let person = PersonSchema {
        object_type: idsync_core::model::MetaverseObjectType::new("person")
            .with_deletion_rule(DeletionRule::WhenLastConnectorDisconnected),
        ..PersonSchema::new()
    };
    let directory = DirectorySchema::new();
    let rule = directory
        .export_rule(&person)
        .with_scope(ScopingCriteriaGroup::all(vec![ScopingCriterion::equals(
            &person.department,
            "Engineering",
        )]))
        .deprovision_action(OutboundDeprovisionAction::Disconnect);
    let repo = repository_with_rules(vec![rule]).await;

    let mvo = person.person("Ada Lovelace").with_value(&person.department, "Sales");
    repo.insert_metaverse_object(mvo.clone()).await;
    let mut cso = ConnectedSystemObject::new(&directory.user_type).with_value(&directory.display_name, "Ada Lovelace");
    cso.join(mvo.id, JoinType::Joined);
    repo.insert_connected_system_object(cso.clone()).await;
    repo.insert_pending_export(
        PendingExport::new(directory.system_id, cso.id, PendingExportChangeType::Update, 3)
            .with_changes(vec![PendingExportAttributeValueChange::update(&directory.display_name, "Ada")]),
    )
    .await;

    let evaluator = evaluator(&repo).await;
    let in_scope = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    assert!(in_scope.is_empty());

    let result = evaluator.evaluate_out_of_scope_exports(&mvo, None).await.unwrap();

    assert_eq!(result.disconnected, vec![cso.id]);
    assert!(result.last_connector_disconnected_at.is_some());
    assert!(repo.pending_exports().await.is_empty());

    let detached = &repo.connected_system_objects().await[0];
    assert!(!detached.is_joined());
}

#[tokio::test]
async fn test_out_of_scope_delete_replaces_outstanding_work() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let rule = directory
        .export_rule(&person)
        .with_scope(ScopingCriteriaGroup::all(vec![ScopingCriterion::equals(
            &person.department,
            "Engineering",
        )]))
        .deprovision_action(OutboundDeprovisionAction::Delete);
    let repo = repository_with_rules(vec![rule]).await;

    let mvo = person.person("Ada Lovelace");
    let mut cso = ConnectedSystemObject::new(&directory.user_type);
    cso.join(mvo.id, JoinType::Provisioned);
    repo.insert_connected_system_object(cso.clone()).await;
    let outstanding = PendingExport::new(directory.system_id, cso.id, PendingExportChangeType::Update, 3)
        .with_changes(vec![PendingExportAttributeValueChange::update(&directory.display_name, "Ada")]);
    repo.insert_pending_export(outstanding.clone()).await;

    let result = evaluator(&repo)
        .await
        .evaluate_out_of_scope_exports(&mvo, None)
        .await
        .unwrap();

    assert_eq!(result.pending_exports.len(), 1);
    let exports = repo.pending_exports().await;
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].id, outstanding.id);
    assert_eq!(exports[0].change_type, PendingExportChangeType::Delete);
    assert!(exports[0].attribute_value_changes.is_empty());
}

#[tokio::test]
async fn test_unprovisioned_object_is_discarded_when_out_of_scope() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let rule = directory
        .export_rule(&person)
        .provisioning(true)
        .with_scope(ScopingCriteriaGroup::all(vec![ScopingCriterion::equals(
            &person.department,
            "Engineering",
        )]))
        .deprovision_action(OutboundDeprovisionAction::Delete);
    let repo = repository_with_rules(vec![rule]).await;
    let evaluator = evaluator(&repo).await;

    let hired = person.person("Ada Lovelace").with_value(&person.department, "Engineering");
    evaluator.evaluate_export_rules(&hired, &[], None).await.unwrap();
    assert_eq!(repo.pending_exports().await.len(), 1);

    let mut moved = hired.clone();
    moved.set_values(&person.department, vec![AttributeValue::from("Sales")], None);
    let result = evaluator.evaluate_out_of_scope_exports(&moved, None).await.unwrap();

    assert_eq!(result.removed.len(), 1);
    assert!(repo.pending_exports().await.is_empty());
    assert!(repo.connected_system_objects().await.is_empty());
}

#[tokio::test]
async fn test_mvo_deletion_only_deletes_provisioned_objects() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let hr = DirectorySchema::new();
    let repo = repository_with_rules(vec![]).await;

    let mvo = person.person("Ada Lovelace");
    let mut provisioned = ConnectedSystemObject::new(&directory.user_type)
        .with_value(&directory.object_guid, AttributeValue::Guid(uuid::Uuid::new_v4()));
    provisioned.join(mvo.id, JoinType::Provisioned);
    let mut projected = ConnectedSystemObject::new(&hr.user_type);
    projected.join(mvo.id, JoinType::Projected);
    repo.insert_connected_system_object(provisioned.clone()).await;
    repo.insert_connected_system_object(projected.clone()).await;

    let result = evaluator(&repo).await.evaluate_mvo_deletion(&mvo).await.unwrap();

    assert_eq!(result.pending_exports.len(), 1);
    assert_eq!(result.pending_exports[0].connected_system_object_id, provisioned.id);
    assert_eq!(result.pending_exports[0].change_type, PendingExportChangeType::Delete);
    assert_eq!(result.detached, vec![projected.id]);
    assert!(result.removed.is_empty());

    let exports = repo.pending_exports().await;
    assert!(exports.iter().all(|e| e.connected_system_object_id != projected.id));
}

// =============================================================================
// Superseded changes
// =============================================================================

/// A multi-valued mapping from metaverse aliases to directory proxy addresses.
struct AliasMapping {
    aliases: MetaverseAttribute,
    proxy_addresses: ConnectedSystemAttribute,
    rule: SyncRule,
}

impl AliasMapping {
    fn new(person: &PersonSchema, directory: &DirectorySchema) -> Self {
        let aliases = MetaverseAttribute::multi_valued("Aliases", AttributeDataType::String);
        let proxy_addresses =
            ConnectedSystemAttribute::multi_valued("proxyAddresses", AttributeDataType::String);
        let rule = SyncRule::new(
            "Directory aliases",
            SyncRuleDirection::Export,
            directory.user_type.clone(),
            person.object_type.id,
        )
        .with_mapping(SyncRuleMapping::export_direct(&aliases, &proxy_addresses));
        Self {
            aliases,
            proxy_addresses,
            rule,
        }
    }

    fn person(&self, person: &PersonSchema, aliases: &[&str]) -> idsync_core::model::MetaverseObject {
        let mut mvo = person.person("Ada Lovelace");
        for alias in aliases {
            mvo = mvo.with_value(&self.aliases, *alias);
        }
        mvo
    }

    fn joined_cso(
        &self,
        directory: &DirectorySchema,
        mvo_id: idsync_core::ids::MetaverseObjectId,
        addresses: &[&str],
    ) -> ConnectedSystemObject {
        let mut cso = ConnectedSystemObject::new(&directory.user_type);
        for address in addresses {
            cso = cso.with_value(&self.proxy_addresses, *address);
        }
        cso.join(mvo_id, JoinType::Joined);
        cso
    }
}

fn change_keys(export: &PendingExport) -> Vec<(AttributeChangeType, Option<AttributeValue>)> {
    let mut keys: Vec<_> = export
        .attribute_value_changes
        .iter()
        .map(|c| (c.change_type, c.value.clone()))
        .collect();
    keys.sort_by_key(|(change_type, value)| (change_type.to_string(), format!("{value:?}")));
    keys
}

#[tokio::test]
async fn test_reverted_value_withdraws_queued_update() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person)]).await;

    let mvo = person.person("Ada Lovelace");
    let mut cso = ConnectedSystemObject::new(&directory.user_type)
        .with_value(&directory.distinguished_name, "CN=Ada Lovelace,OU=Users")
        .with_value(&directory.display_name, "Ada Lovelace");
    cso.join(mvo.id, JoinType::Joined);
    repo.insert_connected_system_object(cso.clone()).await;

    // Queued while the metaverse briefly held another name
    repo.insert_pending_export(
        PendingExport::new(directory.system_id, cso.id, PendingExportChangeType::Update, 3)
            .with_changes(vec![PendingExportAttributeValueChange::update(&directory.display_name, "Ada Byron")]),
    )
    .await;

    let evaluation = evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(person.display_name.id)], None)
        .await
        .unwrap();

    assert!(evaluation.pending_exports.is_empty());
    assert!(repo.pending_exports().await.is_empty());
}

#[tokio::test]
async fn test_withdrawn_update_leaves_other_attributes_queued() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let repo = repository_with_rules(vec![directory.export_rule(&person)]).await;

    let mvo = person.person("Ada Lovelace");
    let mut cso = ConnectedSystemObject::new(&directory.user_type)
        .with_value(&directory.distinguished_name, "CN=Ada Lovelace,OU=Users")
        .with_value(&directory.display_name, "Ada Lovelace");
    cso.join(mvo.id, JoinType::Joined);
    repo.insert_connected_system_object(cso.clone()).await;

    let mut sent = PendingExportAttributeValueChange::update(&directory.display_name, "Ada Byron");
    sent.status = AttributeChangeStatus::ExportedPendingConfirmation;
    let mut outstanding = PendingExport::new(directory.system_id, cso.id, PendingExportChangeType::Update, 3)
        .with_changes(vec![
            sent,
            PendingExportAttributeValueChange::update(&directory.department, "Mathematics"),
        ]);
    outstanding.status = PendingExportStatus::Exported;
    repo.insert_pending_export(outstanding).await;

    evaluator(&repo)
        .await
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(person.display_name.id)], None)
        .await
        .unwrap();

    // Sent changes await confirmation; unevaluated attributes are untouched
    let exports = repo.pending_exports().await;
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].attribute_value_changes.len(), 2);
}

#[tokio::test]
async fn test_removed_value_withdraws_queued_add() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let aliases = AliasMapping::new(&person, &directory);
    let repo = repository_with_rules(vec![aliases.rule.clone()]).await;

    let mut mvo = aliases.person(&person, &["ada@example.com", "countess@example.com"]);
    let cso = aliases.joined_cso(&directory, mvo.id, &["ada@example.com"]);
    repo.insert_connected_system_object(cso).await;
    let evaluator = evaluator(&repo).await;

    let first = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    assert_eq!(
        change_keys(&first.pending_exports[0]),
        vec![(AttributeChangeType::Add, Some(AttributeValue::from("countess@example.com")))]
    );

    mvo.set_values(&aliases.aliases, vec![AttributeValue::from("ada@example.com")], None);
    let second = evaluator
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(aliases.aliases.id)], None)
        .await
        .unwrap();

    assert!(second.pending_exports.is_empty());
    assert!(repo.pending_exports().await.is_empty());
}

#[tokio::test]
async fn test_multi_valued_reevaluation_is_idempotent() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let aliases = AliasMapping::new(&person, &directory);
    let repo = repository_with_rules(vec![aliases.rule.clone()]).await;

    let mvo = aliases.person(&person, &["ada@example.com", "countess@example.com"]);
    let cso = aliases.joined_cso(&directory, mvo.id, &["ada@example.com", "old@example.com"]);
    repo.insert_connected_system_object(cso).await;
    let evaluator = evaluator(&repo).await;

    let first = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    let second = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    let third = evaluator
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::updated(aliases.aliases.id)], None)
        .await
        .unwrap();

    let expected = vec![
        (AttributeChangeType::Add, Some(AttributeValue::from("countess@example.com"))),
        (AttributeChangeType::Remove, Some(AttributeValue::from("old@example.com"))),
    ];
    assert_eq!(change_keys(&first.pending_exports[0]), expected);
    assert!(second.is_empty());
    assert!(third.is_empty());

    let exports = repo.pending_exports().await;
    assert_eq!(exports.len(), 1);
    assert_eq!(change_keys(&exports[0]), expected);
}

#[tokio::test]
async fn test_remove_all_reevaluation_is_idempotent() {
    let person = PersonSchema::new();
    let directory = DirectorySchema::new();
    let aliases = AliasMapping::new(&person, &directory);
    let repo = repository_with_rules(vec![aliases.rule.clone()]).await;

    let mvo = aliases.person(&person, &[]);
    let cso = aliases.joined_cso(&directory, mvo.id, &["ada@example.com", "old@example.com"]);
    repo.insert_connected_system_object(cso).await;
    let evaluator = evaluator(&repo).await;

    let first = evaluator.evaluate_export_rules(&mvo, &[], None).await.unwrap();
    let second = evaluator
        .evaluate_export_rules(&mvo, &[MetaverseAttributeChange::removed(aliases.aliases.id)], None)
        .await
        .unwrap();

    assert_eq!(change_keys(&first.pending_exports[0]), vec![(AttributeChangeType::RemoveAll, None)]);
    assert!(second.is_empty());
    assert_eq!(repo.pending_exports().await[0].attribute_value_changes.len(), 1);
}
