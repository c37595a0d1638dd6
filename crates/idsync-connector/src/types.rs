//! Request and result types exchanged with export connectors.

use serde::{Deserialize, Serialize};

use idsync_core::ids::{ConnectedSystemObjectId, PendingExportId};
use idsync_core::model::{PendingExportAttributeValueChange, PendingExportChangeType};
use idsync_core::value::AttributeValue;

/// One object-level export handed to a connector.
///
/// `changes` holds only the changes that are due for sending, with every
/// reference already resolved into the target system's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub pending_export_id: PendingExportId,
    pub connected_system_object_id: ConnectedSystemObjectId,
    pub change_type: PendingExportChangeType,
    /// Object type name in the connected system (e.g. "user").
    pub object_type: String,
    /// Current primary identifier. Absent for a Create.
    pub external_id: Option<AttributeValue>,
    /// Current secondary identifier, when the object type defines one.
    pub secondary_external_id: Option<AttributeValue>,
    pub changes: Vec<PendingExportAttributeValueChange>,
}

/// Outcome of one export request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportResult {
    pub pending_export_id: PendingExportId,
    pub success: bool,
    /// Identifier assigned by the target system on Create.
    pub external_id: Option<AttributeValue>,
    /// Secondary identifier assigned by the target system (e.g. a directory path).
    pub secondary_external_id: Option<AttributeValue>,
    pub error_message: Option<String>,
}

impl ExportResult {
    /// Successful result without new identifiers.
    #[must_use]
    pub fn succeeded(pending_export_id: PendingExportId) -> Self {
        Self {
            pending_export_id,
            success: true,
            external_id: None,
            secondary_external_id: None,
            error_message: None,
        }
    }

    /// Successful Create that returned the new object's identifiers.
    #[must_use]
    pub fn created(
        pending_export_id: PendingExportId,
        external_id: impl Into<AttributeValue>,
        secondary_external_id: Option<AttributeValue>,
    ) -> Self {
        Self {
            external_id: Some(external_id.into()),
            secondary_external_id,
            ..Self::succeeded(pending_export_id)
        }
    }

    /// Failed result.
    #[must_use]
    pub fn failed(pending_export_id: PendingExportId, message: impl Into<String>) -> Self {
        Self {
            pending_export_id,
            success: false,
            external_id: None,
            secondary_external_id: None,
            error_message: Some(message.into()),
        }
    }
}
