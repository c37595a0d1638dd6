//! Human-readable export previews.

use serde::{Deserialize, Serialize};

use idsync_core::ids::{ConnectedSystemObjectId, PendingExportId};
use idsync_core::model::{AttributeChangeType, PendingExport, PendingExportChangeType};

/// One attribute change as it would be sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChangePreview {
    pub attribute_name: String,
    pub change_type: AttributeChangeType,
    /// Rendered value; `None` for clears and RemoveAll.
    pub value: Option<String>,
}

/// What executing one pending export would do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPreview {
    pub pending_export_id: PendingExportId,
    pub connected_system_object_id: ConnectedSystemObjectId,
    pub change_type: PendingExportChangeType,
    pub changes: Vec<AttributeChangePreview>,
}

impl ExportPreview {
    /// Preview of the changes that are due for sending.
    #[must_use]
    pub fn for_export(export: &PendingExport) -> Self {
        Self {
            pending_export_id: export.id,
            connected_system_object_id: export.connected_system_object_id,
            change_type: export.change_type,
            changes: export
                .attribute_value_changes
                .iter()
                .filter(|c| c.status.is_exportable())
                .map(|c| AttributeChangePreview {
                    attribute_name: c.attribute_name.clone(),
                    change_type: c.change_type,
                    value: c.value.as_ref().map(ToString::to_string),
                })
                .collect(),
        }
    }
}

impl std::fmt::Display for ExportPreview {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.change_type, self.connected_system_object_id)?;
        for change in &self.changes {
            match &change.value {
                Some(value) => write!(f, "\n  {} {}: {}", change.change_type, change.attribute_name, value)?,
                None => write!(f, "\n  {} {}", change.change_type, change.attribute_name)?,
            }
        }
        Ok(())
    }
}
