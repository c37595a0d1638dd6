//! Synchronization data model.
//!
//! Canonical (metaverse) records, per-system staging records, sync rules and
//! the pending-export queue. All closed sets are plain enums so every match
//! over a change type or status is exhaustive.

use std::fmt;

/// Error parsing one of the model's string-backed enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    /// Name of the enum that rejected the value.
    pub type_name: &'static str,
    /// The rejected input.
    pub value: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} '{}'", self.type_name, self.value)
    }
}

impl std::error::Error for ParseEnumError {}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum.
macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            /// String representation used in storage and logs.
            #[must_use]
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::model::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::model::ParseEnumError {
                        type_name: stringify!($name),
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

pub mod connected_system;
pub mod metaverse;
pub mod pending_export;
pub mod sync_rule;

pub use connected_system::{
    ConnectedSystem, ConnectedSystemAttribute, ConnectedSystemAttributeValue,
    ConnectedSystemObject, ConnectedSystemObjectStatus, ConnectedSystemObjectType, JoinType,
};
pub use metaverse::{
    DeletionRule, MetaverseAttribute, MetaverseAttributeValue, MetaverseObject,
    MetaverseObjectOrigin, MetaverseObjectType,
};
pub use pending_export::{
    AttributeChangeStatus, AttributeChangeType, PendingExport, PendingExportAttributeValueChange,
    PendingExportChangeType, PendingExportStatus,
};
pub use sync_rule::{
    ComparisonType, GroupLogic, MappingSource, MappingTarget, MatchingRuleError, MatchingSource,
    MatchingTarget, ObjectMatchingRule, ObjectMatchingRuleSource, OutboundDeprovisionAction,
    ScopingCriteriaGroup, ScopingCriterion, SyncRule, SyncRuleDirection, SyncRuleMapping,
};
