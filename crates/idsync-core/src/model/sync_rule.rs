//! Synchronization rules: attribute flow, scoping and object matching.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::{
    ConnectedSystemId, ConnectedSystemObjectTypeId, MetaverseObjectTypeId, ObjectMatchingRuleId,
    SyncRuleId,
};
use crate::model::connected_system::{ConnectedSystemAttribute, ConnectedSystemObjectType};
use crate::model::metaverse::MetaverseAttribute;
use crate::value::AttributeValue;

/// Direction in which a sync rule moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncRuleDirection {
    /// Connected system -> metaverse.
    Import,
    /// Metaverse -> connected system.
    Export,
}

string_enum!(SyncRuleDirection {
    Import => "import",
    Export => "export",
});

/// What happens to a staging record when its metaverse object leaves scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboundDeprovisionAction {
    /// Break the join; the external object stays untouched.
    #[default]
    Disconnect,
    /// Delete the external object.
    Delete,
}

string_enum!(OutboundDeprovisionAction {
    Disconnect => "disconnect",
    Delete => "delete",
});

/// Where a mapped value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "source", rename_all = "snake_case")]
pub enum MappingSource {
    MetaverseAttribute(MetaverseAttribute),
    ConnectedSystemAttribute(ConnectedSystemAttribute),
    /// Expression evaluated by the configured expression evaluator.
    Expression(String),
}

/// Where a mapped value lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum MappingTarget {
    MetaverseAttribute(MetaverseAttribute),
    ConnectedSystemAttribute(ConnectedSystemAttribute),
}

/// One attribute-flow mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRuleMapping {
    pub source: MappingSource,
    pub target: MappingTarget,
}

impl SyncRuleMapping {
    #[must_use]
    pub fn new(source: MappingSource, target: MappingTarget) -> Self {
        Self { source, target }
    }

    /// Export mapping copying a metaverse attribute into a connected system attribute.
    #[must_use]
    pub fn export_direct(source: &MetaverseAttribute, target: &ConnectedSystemAttribute) -> Self {
        Self::new(
            MappingSource::MetaverseAttribute(source.clone()),
            MappingTarget::ConnectedSystemAttribute(target.clone()),
        )
    }

    /// Export mapping computing a connected system attribute from an expression.
    #[must_use]
    pub fn export_expression(expression: impl Into<String>, target: &ConnectedSystemAttribute) -> Self {
        Self::new(
            MappingSource::Expression(expression.into()),
            MappingTarget::ConnectedSystemAttribute(target.clone()),
        )
    }

    /// Import mapping copying a connected system attribute into a metaverse attribute.
    #[must_use]
    pub fn import_direct(source: &ConnectedSystemAttribute, target: &MetaverseAttribute) -> Self {
        Self::new(
            MappingSource::ConnectedSystemAttribute(source.clone()),
            MappingTarget::MetaverseAttribute(target.clone()),
        )
    }

    /// Connected system attribute this mapping writes, if any.
    #[must_use]
    pub fn connected_system_target(&self) -> Option<&ConnectedSystemAttribute> {
        match &self.target {
            MappingTarget::ConnectedSystemAttribute(attr) => Some(attr),
            MappingTarget::MetaverseAttribute(_) => None,
        }
    }

    /// Metaverse attribute this mapping writes, if any.
    #[must_use]
    pub fn metaverse_target(&self) -> Option<&MetaverseAttribute> {
        match &self.target {
            MappingTarget::MetaverseAttribute(attr) => Some(attr),
            MappingTarget::ConnectedSystemAttribute(_) => None,
        }
    }
}

/// How the criteria of a scoping group combine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupLogic {
    #[default]
    All,
    Any,
}

string_enum!(GroupLogic {
    All => "all",
    Any => "any",
});

/// Comparison applied by a scoping criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    Equals,
    NotEquals,
    StartsWith,
    EndsWith,
    Contains,
    LessThan,
    LessThanOrEquals,
    GreaterThan,
    GreaterThanOrEquals,
    IsPresent,
    IsNotPresent,
}

string_enum!(ComparisonType {
    Equals => "equals",
    NotEquals => "not_equals",
    StartsWith => "starts_with",
    EndsWith => "ends_with",
    Contains => "contains",
    LessThan => "less_than",
    LessThanOrEquals => "less_than_or_equals",
    GreaterThan => "greater_than",
    GreaterThanOrEquals => "greater_than_or_equals",
    IsPresent => "is_present",
    IsNotPresent => "is_not_present",
});

/// A single attribute comparison against the metaverse object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingCriterion {
    pub attribute: MetaverseAttribute,
    pub comparison: ComparisonType,
    /// Comparison operand. Unused by the presence checks.
    pub value: Option<AttributeValue>,
    #[serde(default)]
    pub case_sensitive: bool,
}

impl ScopingCriterion {
    #[must_use]
    pub fn new(
        attribute: &MetaverseAttribute,
        comparison: ComparisonType,
        value: Option<AttributeValue>,
    ) -> Self {
        Self {
            attribute: attribute.clone(),
            comparison,
            value,
            case_sensitive: false,
        }
    }

    #[must_use]
    pub fn equals(attribute: &MetaverseAttribute, value: impl Into<AttributeValue>) -> Self {
        Self::new(attribute, ComparisonType::Equals, Some(value.into()))
    }
}

/// A boolean group of criteria with optional nested groups.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopingCriteriaGroup {
    pub logic: GroupLogic,
    #[serde(default)]
    pub criteria: Vec<ScopingCriterion>,
    #[serde(default)]
    pub child_groups: Vec<ScopingCriteriaGroup>,
}

impl ScopingCriteriaGroup {
    #[must_use]
    pub fn all(criteria: Vec<ScopingCriterion>) -> Self {
        Self {
            logic: GroupLogic::All,
            criteria,
            child_groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn any(criteria: Vec<ScopingCriterion>) -> Self {
        Self {
            logic: GroupLogic::Any,
            criteria,
            child_groups: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_child(mut self, group: ScopingCriteriaGroup) -> Self {
        self.child_groups.push(group);
        self
    }
}

/// Attribute a matching rule reads its value from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "attribute", rename_all = "snake_case")]
pub enum MatchingSource {
    MetaverseAttribute(MetaverseAttribute),
    ConnectedSystemAttribute(ConnectedSystemAttribute),
}

/// Attribute a matching rule looks the value up against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "attribute", rename_all = "snake_case")]
pub enum MatchingTarget {
    MetaverseAttribute(MetaverseAttribute),
    ConnectedSystemAttribute(ConnectedSystemAttribute),
}

/// Ordered source of an object matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMatchingRuleSource {
    pub order: i32,
    pub source: MatchingSource,
}

/// Rule that locates an existing counterpart record by attribute value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMatchingRule {
    pub id: ObjectMatchingRuleId,
    pub order: i32,
    /// Owning sync rule (export-side matching).
    pub sync_rule_id: Option<SyncRuleId>,
    /// Owning connected system object type (import-side matching).
    pub connected_system_object_type_id: Option<ConnectedSystemObjectTypeId>,
    pub sources: Vec<ObjectMatchingRuleSource>,
    pub target: Option<MatchingTarget>,
    #[serde(default = "default_case_sensitive")]
    pub case_sensitive: bool,
}

fn default_case_sensitive() -> bool {
    true
}

/// Validation failure of an object matching rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchingRuleError {
    #[error("matching rule {0} has neither a sync rule nor an object type parent")]
    MissingParent(ObjectMatchingRuleId),

    #[error("matching rule {0} has both a sync rule and an object type parent")]
    AmbiguousParent(ObjectMatchingRuleId),

    #[error("matching rule {0} has no sources")]
    NoSources(ObjectMatchingRuleId),

    #[error("matching rule {0} has no target attribute")]
    NoTarget(ObjectMatchingRuleId),
}

impl ObjectMatchingRule {
    /// Rule owned by a sync rule, matching from a metaverse attribute to a
    /// connected system attribute.
    #[must_use]
    pub fn for_sync_rule(
        sync_rule_id: SyncRuleId,
        source: &MetaverseAttribute,
        target: &ConnectedSystemAttribute,
    ) -> Self {
        Self {
            id: ObjectMatchingRuleId::new(),
            order: 0,
            sync_rule_id: Some(sync_rule_id),
            connected_system_object_type_id: None,
            sources: vec![ObjectMatchingRuleSource {
                order: 0,
                source: MatchingSource::MetaverseAttribute(source.clone()),
            }],
            target: Some(MatchingTarget::ConnectedSystemAttribute(target.clone())),
            case_sensitive: true,
        }
    }

    /// Rule owned by a connected system object type, matching from a
    /// connected system attribute to a metaverse attribute.
    #[must_use]
    pub fn for_object_type(
        object_type_id: ConnectedSystemObjectTypeId,
        source: &ConnectedSystemAttribute,
        target: &MetaverseAttribute,
    ) -> Self {
        Self {
            id: ObjectMatchingRuleId::new(),
            order: 0,
            sync_rule_id: None,
            connected_system_object_type_id: Some(object_type_id),
            sources: vec![ObjectMatchingRuleSource {
                order: 0,
                source: MatchingSource::ConnectedSystemAttribute(source.clone()),
            }],
            target: Some(MatchingTarget::MetaverseAttribute(target.clone())),
            case_sensitive: true,
        }
    }

    #[must_use]
    pub fn case_insensitive(mut self) -> Self {
        self.case_sensitive = false;
        self
    }

    /// Check the rule's shape.
    ///
    /// Exactly one parent must be set, at least one source must exist and a
    /// target attribute must be present.
    pub fn validate(&self) -> Result<(), MatchingRuleError> {
        match (self.sync_rule_id, self.connected_system_object_type_id) {
            (None, None) => return Err(MatchingRuleError::MissingParent(self.id)),
            (Some(_), Some(_)) => return Err(MatchingRuleError::AmbiguousParent(self.id)),
            _ => {}
        }
        if self.sources.is_empty() {
            return Err(MatchingRuleError::NoSources(self.id));
        }
        if self.target.is_none() {
            return Err(MatchingRuleError::NoTarget(self.id));
        }
        Ok(())
    }

    /// Source with the lowest order.
    #[must_use]
    pub fn primary_source(&self) -> Option<&MatchingSource> {
        self.sources
            .iter()
            .min_by_key(|s| s.order)
            .map(|s| &s.source)
    }
}

/// A synchronization rule binding a metaverse type to a connected system type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRule {
    pub id: SyncRuleId,
    pub name: String,
    pub direction: SyncRuleDirection,
    pub enabled: bool,
    pub connected_system_id: ConnectedSystemId,
    pub connected_system_object_type: ConnectedSystemObjectType,
    pub metaverse_object_type_id: MetaverseObjectTypeId,
    #[serde(default)]
    pub attribute_flow_mappings: Vec<SyncRuleMapping>,
    #[serde(default)]
    pub object_matching_rules: Vec<ObjectMatchingRule>,
    /// Root groups; every root group must pass for the object to be in scope.
    #[serde(default)]
    pub scoping_criteria_groups: Vec<ScopingCriteriaGroup>,
    /// Participate in drift detection.
    #[serde(default)]
    pub enforce_state: bool,
    #[serde(default)]
    pub provision_to_connected_system: bool,
    #[serde(default)]
    pub outbound_deprovision_action: OutboundDeprovisionAction,
}

impl SyncRule {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        direction: SyncRuleDirection,
        connected_system_object_type: ConnectedSystemObjectType,
        metaverse_object_type_id: MetaverseObjectTypeId,
    ) -> Self {
        Self {
            id: SyncRuleId::new(),
            name: name.into(),
            direction,
            enabled: true,
            connected_system_id: connected_system_object_type.connected_system_id,
            connected_system_object_type,
            metaverse_object_type_id,
            attribute_flow_mappings: Vec::new(),
            object_matching_rules: Vec::new(),
            scoping_criteria_groups: Vec::new(),
            enforce_state: false,
            provision_to_connected_system: false,
            outbound_deprovision_action: OutboundDeprovisionAction::default(),
        }
    }

    #[must_use]
    pub fn with_mapping(mut self, mapping: SyncRuleMapping) -> Self {
        self.attribute_flow_mappings.push(mapping);
        self
    }

    #[must_use]
    pub fn with_scope(mut self, group: ScopingCriteriaGroup) -> Self {
        self.scoping_criteria_groups.push(group);
        self
    }

    #[must_use]
    pub fn with_matching_rule(mut self, rule: ObjectMatchingRule) -> Self {
        self.object_matching_rules.push(rule);
        self
    }

    #[must_use]
    pub fn provisioning(mut self, enabled: bool) -> Self {
        self.provision_to_connected_system = enabled;
        self
    }

    #[must_use]
    pub fn enforcing_state(mut self, enabled: bool) -> Self {
        self.enforce_state = enabled;
        self
    }

    #[must_use]
    pub fn deprovision_action(mut self, action: OutboundDeprovisionAction) -> Self {
        self.outbound_deprovision_action = action;
        self
    }

    /// Enabled export rule for the given metaverse object type.
    #[must_use]
    pub fn applies_to_export(&self, metaverse_object_type_id: MetaverseObjectTypeId) -> bool {
        self.enabled
            && self.direction == SyncRuleDirection::Export
            && self.metaverse_object_type_id == metaverse_object_type_id
    }
}
