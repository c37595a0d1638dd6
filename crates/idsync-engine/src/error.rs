//! Sync engine error types.

use thiserror::Error;

use idsync_connector::error::ConnectorError;
use idsync_core::model::MatchingRuleError;

use crate::expression::ExpressionError;

/// Errors that can occur during synchronization.
///
/// Out-of-scope records, no-net-change results and missing rules are not
/// errors; they are reported as empty results.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Persistence collaborator failure.
    #[error("Repository error: {message}")]
    Repository { message: String },

    /// Connector error.
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// More than one candidate matched under an object matching rule.
    #[error("Ambiguous match: {} candidates matched {attribute}={value}", candidate_ids.len())]
    AmbiguousMatch {
        attribute: String,
        value: String,
        candidate_ids: Vec<String>,
    },

    /// Matching rule has an invalid shape.
    #[error("Invalid matching rule: {0}")]
    MatchingRule(#[from] MatchingRuleError),

    /// Expression mapping failed.
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),

    /// Not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Invalid state transition.
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Create a repository error.
    pub fn repository(message: impl Into<String>) -> Self {
        Self::Repository {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an ambiguous match error carrying every candidate.
    pub fn ambiguous_match(
        attribute: impl Into<String>,
        value: impl Into<String>,
        candidate_ids: Vec<String>,
    ) -> Self {
        Self::AmbiguousMatch {
            attribute: attribute.into(),
            value: value.into(),
            candidate_ids,
        }
    }

    /// Create a not found error.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Create an invalid state transition error.
    pub fn invalid_state_transition(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::InvalidStateTransition {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Check if this error is retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Repository { .. } => true,
            SyncError::Connector(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Check if this error needs manual resolution of a match.
    #[must_use]
    pub fn is_ambiguous_match(&self) -> bool {
        matches!(self, SyncError::AmbiguousMatch { .. })
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
