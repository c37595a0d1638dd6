//! idsync Core Library
//!
//! Shared identifiers, typed attribute values and the synchronization data
//! model used by the connector contract and the sync engine.
//!
//! # Modules
//!
//! - [`ids`] - Strongly typed identifiers (MetaverseObjectId, PendingExportId, ...)
//! - [`value`] - Typed attribute values (`AttributeValue`)
//! - [`model`] - Metaverse objects, staging records, sync rules, pending exports
//!
//! # Example
//!
//! ```
//! use idsync_core::{AttributeValue, MetaverseAttribute, MetaverseObject, MetaverseObjectType};
//! use idsync_core::value::AttributeDataType;
//!
//! let display_name = MetaverseAttribute::new("DisplayName", AttributeDataType::String);
//! let mvo = MetaverseObject::new(MetaverseObjectType::new("person"))
//!     .with_value(&display_name, "Test User");
//!
//! assert_eq!(
//!     mvo.first_value(display_name.id),
//!     Some(&AttributeValue::from("Test User"))
//! );
//! ```

pub mod ids;
pub mod model;
pub mod value;

pub use ids::{
    AttributeChangeId, ConnectedSystemAttributeId, ConnectedSystemId, ConnectedSystemObjectId,
    ConnectedSystemObjectTypeId, MetaverseAttributeId, MetaverseObjectId, MetaverseObjectTypeId,
    ObjectMatchingRuleId, OutcomeId, ParseIdError, PendingExportId, SyncRuleId,
};
pub use model::*;
pub use value::{AttributeDataType, AttributePlurality, AttributeValue};
