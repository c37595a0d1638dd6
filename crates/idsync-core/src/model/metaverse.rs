//! Canonical (metaverse) records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ConnectedSystemId, MetaverseAttributeId, MetaverseObjectId, MetaverseObjectTypeId};
use crate::value::{AttributeDataType, AttributePlurality, AttributeValue};

/// When a metaverse object becomes eligible for deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeletionRule {
    /// Only an administrator deletes the object.
    #[default]
    Manual,
    /// Deleted once no connected system remains joined.
    WhenLastConnectorDisconnected,
}

string_enum!(DeletionRule {
    Manual => "manual",
    WhenLastConnectorDisconnected => "when_last_connector_disconnected",
});

/// How a metaverse object came into existence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaverseObjectOrigin {
    /// Projected from an inbound staging record.
    #[default]
    Projected,
    /// Created inside the engine and provisioned outwards.
    Provisioned,
}

string_enum!(MetaverseObjectOrigin {
    Projected => "projected",
    Provisioned => "provisioned",
});

/// Metaverse object type (e.g. "person", "group").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaverseObjectType {
    pub id: MetaverseObjectTypeId,
    pub name: String,
    #[serde(default)]
    pub deletion_rule: DeletionRule,
}

impl MetaverseObjectType {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: MetaverseObjectTypeId::new(),
            name: name.into(),
            deletion_rule: DeletionRule::default(),
        }
    }

    #[must_use]
    pub fn with_deletion_rule(mut self, rule: DeletionRule) -> Self {
        self.deletion_rule = rule;
        self
    }
}

/// Metaverse attribute definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaverseAttribute {
    pub id: MetaverseAttributeId,
    pub name: String,
    pub data_type: AttributeDataType,
    #[serde(default)]
    pub plurality: AttributePlurality,
}

impl MetaverseAttribute {
    /// Single-valued attribute definition.
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            id: MetaverseAttributeId::new(),
            name: name.into(),
            data_type,
            plurality: AttributePlurality::SingleValued,
        }
    }

    /// Multi-valued attribute definition.
    #[must_use]
    pub fn multi_valued(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            plurality: AttributePlurality::MultiValued,
            ..Self::new(name, data_type)
        }
    }
}

/// One value held by a metaverse object, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaverseAttributeValue {
    pub attribute_id: MetaverseAttributeId,
    pub attribute_name: String,
    pub value: AttributeValue,
    /// Connected system whose import last contributed this value.
    pub contributed_by: Option<ConnectedSystemId>,
}

/// Canonical record for one real-world identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaverseObject {
    pub id: MetaverseObjectId,
    pub object_type_id: MetaverseObjectTypeId,
    /// Loaded object type. `None` when the record was read without its type.
    pub object_type: Option<MetaverseObjectType>,
    pub origin: MetaverseObjectOrigin,
    pub attribute_values: Vec<MetaverseAttributeValue>,
    pub last_connector_disconnected_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl MetaverseObject {
    /// New projected object of the given type.
    #[must_use]
    pub fn new(object_type: MetaverseObjectType) -> Self {
        Self {
            id: MetaverseObjectId::new(),
            object_type_id: object_type.id,
            object_type: Some(object_type),
            origin: MetaverseObjectOrigin::Projected,
            attribute_values: Vec::new(),
            last_connector_disconnected_at: None,
            created_at: Utc::now(),
        }
    }

    /// Builder-style helper adding one value without provenance.
    #[must_use]
    pub fn with_value(mut self, attribute: &MetaverseAttribute, value: impl Into<AttributeValue>) -> Self {
        self.add_value(attribute, value.into(), None);
        self
    }

    /// Append one value for an attribute.
    pub fn add_value(
        &mut self,
        attribute: &MetaverseAttribute,
        value: AttributeValue,
        contributed_by: Option<ConnectedSystemId>,
    ) {
        self.attribute_values.push(MetaverseAttributeValue {
            attribute_id: attribute.id,
            attribute_name: attribute.name.clone(),
            value,
            contributed_by,
        });
    }

    /// Replace every value of an attribute.
    pub fn set_values(
        &mut self,
        attribute: &MetaverseAttribute,
        values: Vec<AttributeValue>,
        contributed_by: Option<ConnectedSystemId>,
    ) {
        self.clear_values(attribute.id);
        for value in values {
            self.add_value(attribute, value, contributed_by);
        }
    }

    /// Remove every value of an attribute.
    pub fn clear_values(&mut self, attribute_id: MetaverseAttributeId) {
        self.attribute_values
            .retain(|v| v.attribute_id != attribute_id);
    }

    /// All non-empty values of an attribute, in insertion order.
    #[must_use]
    pub fn values(&self, attribute_id: MetaverseAttributeId) -> Vec<&AttributeValue> {
        self.attribute_values
            .iter()
            .filter(|v| v.attribute_id == attribute_id && !v.value.is_empty())
            .map(|v| &v.value)
            .collect()
    }

    /// First non-empty value of an attribute.
    #[must_use]
    pub fn first_value(&self, attribute_id: MetaverseAttributeId) -> Option<&AttributeValue> {
        self.values(attribute_id).into_iter().next()
    }

    /// Deletion rule of the loaded type, if the type is loaded.
    #[must_use]
    pub fn deletion_rule(&self) -> Option<DeletionRule> {
        self.object_type.as_ref().map(|t| t.deletion_rule)
    }
}
