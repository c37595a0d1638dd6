//! Strongly Typed Identifiers
//!
//! Newtype wrappers around UUIDs for every entity the synchronization engine
//! touches. Passing a `ConnectedSystemObjectId` where a `MetaverseObjectId` is
//! expected does not compile.
//!
//! # Example
//!
//! ```
//! use idsync_core::ids::{ConnectedSystemId, MetaverseObjectId};
//!
//! let system = ConnectedSystemId::new();
//! let mvo = MetaverseObjectId::new();
//!
//! fn requires_system(id: ConnectedSystemId) -> String {
//!     id.to_string()
//! }
//!
//! let _ = requires_system(system);
//! // requires_system(mvo); // This would not compile!
//! # let _ = mvo;
//! ```

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use uuid::Uuid;

/// Error type for ID parsing failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// The type of ID that failed to parse
    pub id_type: &'static str,
    /// The underlying UUID parse error message
    pub message: String,
}

impl Display for ParseIdError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Failed to parse {}: {}", self.id_type, self.message)
    }
}

impl std::error::Error for ParseIdError {}

/// Macro to define a strongly-typed ID type
macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID using UUID v4.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            #[must_use]
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns a reference to the underlying UUID.
            #[must_use]
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|e| ParseIdError {
                        id_type: stringify!($name),
                        message: e.to_string(),
                    })
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id!(
    /// Identifier of a canonical (metaverse) record.
    MetaverseObjectId
);

define_id!(
    /// Identifier of a metaverse object type (e.g. "person", "group").
    MetaverseObjectTypeId
);

define_id!(
    /// Identifier of a metaverse attribute definition.
    MetaverseAttributeId
);

define_id!(
    /// Identifier of a connected (external) system.
    ConnectedSystemId
);

define_id!(
    /// Identifier of a staging record held for one connected system.
    ConnectedSystemObjectId
);

define_id!(
    /// Identifier of a connected system object type.
    ConnectedSystemObjectTypeId
);

define_id!(
    /// Identifier of a connected system attribute definition.
    ConnectedSystemAttributeId
);

define_id!(
    /// Identifier of a synchronization rule.
    SyncRuleId
);

define_id!(
    /// Identifier of an object matching rule.
    ObjectMatchingRuleId
);

define_id!(
    /// Identifier of a queued pending export.
    PendingExportId
);

define_id!(
    /// Identifier of a single attribute-value change inside a pending export.
    AttributeChangeId
);

define_id!(
    /// Identifier of an audit outcome node.
    ///
    /// Assigned up front by the engine because the bulk-insert path of the
    /// audit collaborator does not generate identifiers.
    OutcomeId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_creates_distinct_ids() {
        let id1 = MetaverseObjectId::new();
        let id2 = MetaverseObjectId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = ConnectedSystemId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), &uuid);
    }

    #[test]
    fn test_parse_round_trips_display() {
        let id: PendingExportId = "550e8400-e29b-41d4-a716-446655440000".parse().unwrap();
        assert_eq!(id.to_string(), "550e8400-e29b-41d4-a716-446655440000");
    }

    #[test]
    fn test_parse_error_names_id_type() {
        let err = "not-a-uuid".parse::<SyncRuleId>().unwrap_err();
        assert_eq!(err.id_type, "SyncRuleId");
        assert!(err.to_string().starts_with("Failed to parse SyncRuleId"));
    }

    #[test]
    fn test_serializes_transparently() {
        let id = OutcomeId::from_uuid(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");
    }
}
