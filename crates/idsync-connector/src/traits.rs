//! Connector traits
//!
//! The contract the sync engine requires from a per-system connector.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::types::{ExportRequest, ExportResult};

/// Base trait for all connectors.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Get the display name for this connector instance.
    fn display_name(&self) -> &str;

    /// Check if the connector is currently healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Capability for exporting pending changes to the target system.
///
/// Instances may hold per-call-sequence state. The engine never shares one
/// instance between concurrently running batches; it asks a
/// [`ConnectorFactory`] for a fresh instance per batch instead.
#[async_trait]
pub trait ExportConnector: Connector {
    /// Export a batch of requests.
    ///
    /// Returns one result per request, in request order. Per-record failures
    /// are reported as failed results; an `Err` fails the whole batch.
    async fn export(&self, requests: &[ExportRequest]) -> ConnectorResult<Vec<ExportResult>>;
}

/// Shared export connector handle.
pub type BoxedExportConnector = Arc<dyn ExportConnector>;

/// Factory producing a fresh connector instance for one batch.
pub type ConnectorFactory = Arc<dyn Fn() -> ConnectorResult<BoxedExportConnector> + Send + Sync>;
