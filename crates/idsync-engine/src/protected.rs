//! Protected attributes.
//!
//! Some connected systems refuse to store an empty value for certain
//! attributes and silently write a system default instead (a "never expires"
//! sentinel for an account expiry, for example). Clearing such an attribute
//! can never be observed as an empty value on import, so the table records
//! the substitute each system writes and the engine treats that substitute
//! as the cleared state.

use serde::{Deserialize, Serialize};

use idsync_core::ids::ConnectedSystemId;
use idsync_core::value::AttributeValue;

/// One protected attribute and the value its system substitutes for a clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtectedAttribute {
    /// System the entry applies to. `None` applies to every system.
    pub connected_system_id: Option<ConnectedSystemId>,
    /// Connected system attribute name, compared case-insensitively.
    pub attribute_name: String,
    /// Value the system stores when asked to clear the attribute.
    pub substitute: AttributeValue,
}

/// Externally configured table of protected attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProtectedAttributeTable {
    entries: Vec<ProtectedAttribute>,
}

impl ProtectedAttributeTable {
    #[must_use]
    pub fn new(entries: Vec<ProtectedAttribute>) -> Self {
        Self { entries }
    }

    #[must_use]
    pub fn with_entry(
        mut self,
        connected_system_id: Option<ConnectedSystemId>,
        attribute_name: impl Into<String>,
        substitute: impl Into<AttributeValue>,
    ) -> Self {
        self.entries.push(ProtectedAttribute {
            connected_system_id,
            attribute_name: attribute_name.into(),
            substitute: substitute.into(),
        });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Substitute written by `connected_system_id` when `attribute_name` is cleared.
    ///
    /// A system-specific entry wins over a global one.
    #[must_use]
    pub fn substitute_for(
        &self,
        connected_system_id: ConnectedSystemId,
        attribute_name: &str,
    ) -> Option<&AttributeValue> {
        let matching = |e: &&ProtectedAttribute| e.attribute_name.eq_ignore_ascii_case(attribute_name);
        self.entries
            .iter()
            .filter(matching)
            .find(|e| e.connected_system_id == Some(connected_system_id))
            .or_else(|| {
                self.entries
                    .iter()
                    .filter(matching)
                    .find(|e| e.connected_system_id.is_none())
            })
            .map(|e| &e.substitute)
    }
}
