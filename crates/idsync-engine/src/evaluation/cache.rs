//! Per-run rule caches.
//!
//! Rules are loaded once per synchronization run and shared by every record
//! the run evaluates.

use std::collections::{HashMap, HashSet};

use idsync_core::ids::{ConnectedSystemId, MetaverseAttributeId, MetaverseObjectTypeId, SyncRuleId};
use idsync_core::model::{SyncRule, SyncRuleDirection};

use crate::error::SyncResult;
use crate::repository::SyncRepository;

/// Every sync rule, loaded once.
#[derive(Debug, Clone, Default)]
pub struct SyncRuleCache {
    rules: Vec<SyncRule>,
}

impl SyncRuleCache {
    #[must_use]
    pub fn new(rules: Vec<SyncRule>) -> Self {
        Self { rules }
    }

    pub async fn load(repository: &dyn SyncRepository) -> SyncResult<Self> {
        Ok(Self::new(repository.get_sync_rules().await?))
    }

    /// Enabled export rules for a metaverse object type.
    pub fn export_rules_for(
        &self,
        metaverse_object_type_id: MetaverseObjectTypeId,
    ) -> impl Iterator<Item = &SyncRule> {
        self.rules
            .iter()
            .filter(move |r| r.applies_to_export(metaverse_object_type_id))
    }

    #[must_use]
    pub fn rules(&self) -> &[SyncRule] {
        &self.rules
    }

    /// Contributor index over the enabled import rules.
    #[must_use]
    pub fn import_contributors(&self) -> ImportContributorCache {
        ImportContributorCache::from_rules(&self.rules)
    }
}

/// Which connected systems import which metaverse attributes.
///
/// Keyed by (connected system, metaverse attribute). A system that is an
/// import source for an attribute is authoritative for it, so a difference
/// on that attribute is not drift.
#[derive(Debug, Clone, Default)]
pub struct ImportContributorCache {
    contributors: HashMap<(ConnectedSystemId, MetaverseAttributeId), HashSet<SyncRuleId>>,
}

impl ImportContributorCache {
    #[must_use]
    pub fn from_rules(rules: &[SyncRule]) -> Self {
        let mut contributors: HashMap<_, HashSet<SyncRuleId>> = HashMap::new();
        for rule in rules
            .iter()
            .filter(|r| r.enabled && r.direction == SyncRuleDirection::Import)
        {
            for mapping in &rule.attribute_flow_mappings {
                if let Some(target) = mapping.metaverse_target() {
                    contributors
                        .entry((rule.connected_system_id, target.id))
                        .or_default()
                        .insert(rule.id);
                }
            }
        }
        Self { contributors }
    }

    /// Import rules through which `connected_system_id` feeds an attribute.
    #[must_use]
    pub fn import_rules(
        &self,
        connected_system_id: ConnectedSystemId,
        attribute_id: MetaverseAttributeId,
    ) -> Option<&HashSet<SyncRuleId>> {
        self.contributors.get(&(connected_system_id, attribute_id))
    }

    #[must_use]
    pub fn is_contributor(
        &self,
        connected_system_id: ConnectedSystemId,
        attribute_id: MetaverseAttributeId,
    ) -> bool {
        self.import_rules(connected_system_id, attribute_id)
            .is_some_and(|rules| !rules.is_empty())
    }
}
