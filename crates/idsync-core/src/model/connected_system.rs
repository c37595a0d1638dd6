//! Connected systems and their staging records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{
    ConnectedSystemAttributeId, ConnectedSystemId, ConnectedSystemObjectId,
    ConnectedSystemObjectTypeId, MetaverseObjectId,
};
use crate::value::{AttributeDataType, AttributePlurality, AttributeValue};

/// Lifecycle status of a staging record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectedSystemObjectStatus {
    /// Object exists in the connected system.
    #[default]
    Normal,
    /// Import observed the object is gone.
    Obsolete,
    /// Created by provisioning; not yet confirmed to exist externally.
    PendingProvisioning,
}

string_enum!(ConnectedSystemObjectStatus {
    Normal => "normal",
    Obsolete => "obsolete",
    PendingProvisioning => "pending_provisioning",
});

/// How a staging record became linked to a metaverse object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    #[default]
    NotJoined,
    /// The metaverse object was projected from this record.
    Projected,
    /// This record was created by export-side provisioning.
    Provisioned,
    /// Matched to an existing metaverse object by an object matching rule.
    Joined,
}

string_enum!(JoinType {
    NotJoined => "not_joined",
    Projected => "projected",
    Provisioned => "provisioned",
    Joined => "joined",
});

/// An external system the engine synchronizes with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedSystem {
    pub id: ConnectedSystemId,
    pub name: String,
}

impl ConnectedSystem {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ConnectedSystemId::new(),
            name: name.into(),
        }
    }
}

/// Attribute definition in a connected system's schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectedSystemAttribute {
    pub id: ConnectedSystemAttributeId,
    pub name: String,
    pub data_type: AttributeDataType,
    #[serde(default)]
    pub plurality: AttributePlurality,
}

impl ConnectedSystemAttribute {
    #[must_use]
    pub fn new(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            id: ConnectedSystemAttributeId::new(),
            name: name.into(),
            data_type,
            plurality: AttributePlurality::SingleValued,
        }
    }

    #[must_use]
    pub fn multi_valued(name: impl Into<String>, data_type: AttributeDataType) -> Self {
        Self {
            plurality: AttributePlurality::MultiValued,
            ..Self::new(name, data_type)
        }
    }
}

/// Object type within a connected system, with its identifier attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedSystemObjectType {
    pub id: ConnectedSystemObjectTypeId,
    pub connected_system_id: ConnectedSystemId,
    pub name: String,
    /// Attribute holding the system-assigned identifier.
    pub external_id_attribute: ConnectedSystemAttribute,
    /// Attribute holding a secondary identifier such as a directory path.
    pub secondary_external_id_attribute: Option<ConnectedSystemAttribute>,
}

impl ConnectedSystemObjectType {
    #[must_use]
    pub fn new(
        connected_system_id: ConnectedSystemId,
        name: impl Into<String>,
        external_id_attribute: ConnectedSystemAttribute,
    ) -> Self {
        Self {
            id: ConnectedSystemObjectTypeId::new(),
            connected_system_id,
            name: name.into(),
            external_id_attribute,
            secondary_external_id_attribute: None,
        }
    }

    #[must_use]
    pub fn with_secondary_external_id(mut self, attribute: ConnectedSystemAttribute) -> Self {
        self.secondary_external_id_attribute = Some(attribute);
        self
    }
}

/// One value held by a staging record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedSystemAttributeValue {
    pub attribute_id: ConnectedSystemAttributeId,
    pub attribute_name: String,
    pub value: AttributeValue,
}

/// Staging record: one connected system's view of one external object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSystemObject {
    pub id: ConnectedSystemObjectId,
    pub connected_system_id: ConnectedSystemId,
    pub object_type_id: ConnectedSystemObjectTypeId,
    pub object_type_name: String,
    pub status: ConnectedSystemObjectStatus,
    pub join_type: JoinType,
    pub external_id_attribute: ConnectedSystemAttribute,
    pub secondary_external_id_attribute: Option<ConnectedSystemAttribute>,
    pub attribute_values: Vec<ConnectedSystemAttributeValue>,
    pub metaverse_object_id: Option<MetaverseObjectId>,
    pub date_joined: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ConnectedSystemObject {
    /// Unjoined record in `Normal` status, as import would stage it.
    #[must_use]
    pub fn new(object_type: &ConnectedSystemObjectType) -> Self {
        Self {
            id: ConnectedSystemObjectId::new(),
            connected_system_id: object_type.connected_system_id,
            object_type_id: object_type.id,
            object_type_name: object_type.name.clone(),
            status: ConnectedSystemObjectStatus::Normal,
            join_type: JoinType::NotJoined,
            external_id_attribute: object_type.external_id_attribute.clone(),
            secondary_external_id_attribute: object_type.secondary_external_id_attribute.clone(),
            attribute_values: Vec::new(),
            metaverse_object_id: None,
            date_joined: None,
            created_at: Utc::now(),
        }
    }

    /// Record created by outbound provisioning for a metaverse object.
    ///
    /// Starts `PendingProvisioning` and only becomes `Normal` once a Create
    /// export returns an external identifier.
    #[must_use]
    pub fn provisioned(object_type: &ConnectedSystemObjectType, mvo_id: MetaverseObjectId) -> Self {
        let mut cso = Self::new(object_type);
        cso.status = ConnectedSystemObjectStatus::PendingProvisioning;
        cso.join_type = JoinType::Provisioned;
        cso.metaverse_object_id = Some(mvo_id);
        cso.date_joined = Some(Utc::now());
        cso
    }

    /// Builder-style helper adding one value.
    #[must_use]
    pub fn with_value(mut self, attribute: &ConnectedSystemAttribute, value: impl Into<AttributeValue>) -> Self {
        self.add_value(attribute.id, &attribute.name, value.into());
        self
    }

    pub fn add_value(
        &mut self,
        attribute_id: ConnectedSystemAttributeId,
        attribute_name: &str,
        value: AttributeValue,
    ) {
        self.attribute_values.push(ConnectedSystemAttributeValue {
            attribute_id,
            attribute_name: attribute_name.to_string(),
            value,
        });
    }

    /// Replace every value of an attribute.
    pub fn set_values(
        &mut self,
        attribute_id: ConnectedSystemAttributeId,
        attribute_name: &str,
        values: Vec<AttributeValue>,
    ) {
        self.attribute_values.retain(|v| v.attribute_id != attribute_id);
        for value in values {
            self.add_value(attribute_id, attribute_name, value);
        }
    }

    /// All non-empty values of an attribute, in insertion order.
    #[must_use]
    pub fn values(&self, attribute_id: ConnectedSystemAttributeId) -> Vec<&AttributeValue> {
        self.attribute_values
            .iter()
            .filter(|v| v.attribute_id == attribute_id && !v.value.is_empty())
            .map(|v| &v.value)
            .collect()
    }

    #[must_use]
    pub fn first_value(&self, attribute_id: ConnectedSystemAttributeId) -> Option<&AttributeValue> {
        self.values(attribute_id).into_iter().next()
    }

    /// Current value of the primary external identifier.
    #[must_use]
    pub fn external_id(&self) -> Option<&AttributeValue> {
        self.first_value(self.external_id_attribute.id)
    }

    /// Current value of the secondary external identifier.
    #[must_use]
    pub fn secondary_external_id(&self) -> Option<&AttributeValue> {
        self.secondary_external_id_attribute
            .as_ref()
            .and_then(|a| self.first_value(a.id))
    }

    /// Identifier other systems should use to reference this object.
    ///
    /// Prefers the secondary identifier when the type defines one.
    #[must_use]
    pub fn reference_identifier(&self) -> Option<&AttributeValue> {
        self.secondary_external_id().or_else(|| self.external_id())
    }

    /// Whether the record is linked to a metaverse object.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.metaverse_object_id.is_some() && self.join_type != JoinType::NotJoined
    }

    /// Link this record to a metaverse object.
    pub fn join(&mut self, mvo_id: MetaverseObjectId, join_type: JoinType) {
        self.metaverse_object_id = Some(mvo_id);
        self.join_type = join_type;
        self.date_joined = Some(Utc::now());
    }

    /// Clear the metaverse link and reset the join type.
    pub fn detach(&mut self) {
        self.metaverse_object_id = None;
        self.join_type = JoinType::NotJoined;
        self.date_joined = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_type() -> ConnectedSystemObjectType {
        ConnectedSystemObjectType::new(
            ConnectedSystemId::new(),
            "user",
            ConnectedSystemAttribute::new("objectGUID", AttributeDataType::Guid),
        )
        .with_secondary_external_id(ConnectedSystemAttribute::new(
            "distinguishedName",
            AttributeDataType::String,
        ))
    }

    #[test]
    fn test_provisioned_record_starts_pending() {
        let object_type = account_type();
        let mvo_id = MetaverseObjectId::new();
        let cso = ConnectedSystemObject::provisioned(&object_type, mvo_id);

        assert_eq!(cso.status, ConnectedSystemObjectStatus::PendingProvisioning);
        assert_eq!(cso.join_type, JoinType::Provisioned);
        assert_eq!(cso.metaverse_object_id, Some(mvo_id));
        assert!(cso.is_joined());
    }

    #[test]
    fn test_detach_clears_link() {
        let mut cso = ConnectedSystemObject::provisioned(&account_type(), MetaverseObjectId::new());
        cso.detach();

        assert!(!cso.is_joined());
        assert_eq!(cso.join_type, JoinType::NotJoined);
        assert!(cso.date_joined.is_none());
    }

    #[test]
    fn test_reference_identifier_prefers_secondary() {
        let object_type = account_type();
        let secondary = object_type.secondary_external_id_attribute.clone().unwrap();
        let cso = ConnectedSystemObject::new(&object_type)
            .with_value(&object_type.external_id_attribute, "guid-1")
            .with_value(&secondary, "CN=Test,DC=corp");

        assert_eq!(cso.external_id(), Some(&AttributeValue::from("guid-1")));
        assert_eq!(
            cso.reference_identifier(),
            Some(&AttributeValue::from("CN=Test,DC=corp"))
        );
    }
}
