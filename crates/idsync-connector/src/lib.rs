//! # Export Connector Contract
//!
//! Abstractions the sync engine uses to push pending exports to external
//! systems. Concrete wire protocols (LDAP, REST, SQL, ...) live outside this
//! workspace and implement [`ExportConnector`].
//!
//! ## Crate Organization
//!
//! - [`error`] - Error types with transient/permanent classification
//! - [`traits`] - Connector traits and the per-batch factory type
//! - [`types`] - Export requests and per-record results
//! - [`resilience`] - Exponential backoff for rescheduling failed exports

pub mod error;
pub mod resilience;
pub mod traits;
pub mod types;

/// Prelude module for convenient imports.
///
/// ```
/// use idsync_connector::prelude::*;
/// ```
pub mod prelude {
    pub use crate::error::{ConnectorError, ConnectorResult};
    pub use crate::resilience::RetryConfig;
    pub use crate::traits::{BoxedExportConnector, Connector, ConnectorFactory, ExportConnector};
    pub use crate::types::{ExportRequest, ExportResult};
}

// Re-export async_trait for connector implementors
pub use async_trait::async_trait;

#[cfg(test)]
mod tests {
    use super::prelude::*;
    use idsync_core::ids::{ConnectedSystemObjectId, PendingExportId};
    use idsync_core::model::PendingExportChangeType;
    use std::sync::Arc;

    struct EchoConnector;

    impl Connector for EchoConnector {
        fn display_name(&self) -> &str {
            "echo"
        }
    }

    #[super::async_trait]
    impl ExportConnector for EchoConnector {
        async fn export(&self, requests: &[ExportRequest]) -> ConnectorResult<Vec<ExportResult>> {
            Ok(requests
                .iter()
                .map(|r| ExportResult::succeeded(r.pending_export_id))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_factory_produces_usable_connector() {
        let factory: ConnectorFactory = Arc::new(|| Ok(Arc::new(EchoConnector) as BoxedExportConnector));
        let connector = factory().unwrap();

        let request = ExportRequest {
            pending_export_id: PendingExportId::new(),
            connected_system_object_id: ConnectedSystemObjectId::new(),
            change_type: PendingExportChangeType::Update,
            object_type: "user".to_string(),
            external_id: None,
            secondary_external_id: None,
            changes: Vec::new(),
        };
        let results = connector.export(std::slice::from_ref(&request)).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pending_export_id, request.pending_export_id);
        assert!(connector.is_healthy());
        assert_eq!(connector.display_name(), "echo");
    }
}
