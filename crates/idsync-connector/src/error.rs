//! Connector error types
//!
//! A connector error fails every record of the batch it was raised for.
//! Transient errors leave those records eligible for a later retry.

use thiserror::Error;

use idsync_core::ids::ConnectedSystemId;

/// Error raised by an export connector for a whole batch.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("connection timeout after {timeout_secs} seconds")]
    ConnectionTimeout { timeout_secs: u64 },

    #[error("connected system unavailable: {message}")]
    TargetUnavailable { message: String },

    #[error("network error: {message}")]
    NetworkError { message: String },

    #[error("authentication rejected by connected system")]
    AuthenticationFailed,

    #[error("invalid connector configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A connector factory could not produce a connector.
    #[error("no connector available for connected system {connected_system_id}")]
    ConnectorUnavailable { connected_system_id: ConnectedSystemId },

    /// The batch call failed for a reason the connector could not classify.
    #[error("export failed: {message}")]
    ExportFailed { message: String },
}

impl ConnectorError {
    /// Whether the condition may clear on its own, so the batch is worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::ConnectionFailed { .. }
                | ConnectorError::ConnectionTimeout { .. }
                | ConnectorError::TargetUnavailable { .. }
                | ConnectorError::NetworkError { .. }
        )
    }

    /// Stable code for logs and audit records.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            ConnectorError::ConnectionTimeout { .. } => "CONNECTION_TIMEOUT",
            ConnectorError::TargetUnavailable { .. } => "TARGET_UNAVAILABLE",
            ConnectorError::NetworkError { .. } => "NETWORK_ERROR",
            ConnectorError::AuthenticationFailed => "AUTH_FAILED",
            ConnectorError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            ConnectorError::ConnectorUnavailable { .. } => "CONNECTOR_UNAVAILABLE",
            ConnectorError::ExportFailed { .. } => "EXPORT_FAILED",
        }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConnectorError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        ConnectorError::NetworkError {
            message: message.into(),
        }
    }

    pub fn export_failed(message: impl Into<String>) -> Self {
        ConnectorError::ExportFailed {
            message: message.into(),
        }
    }
}

/// Result type for connector operations.
pub type ConnectorResult<T> = Result<T, ConnectorError>;
