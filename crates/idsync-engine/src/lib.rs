//! # Outbound Synchronization Engine
//!
//! Turns metaverse changes into pending exports, sends them to connected
//! systems and confirms them against later imports.
//!
//! ## Crate Organization
//!
//! - [`matching`] - Object matching rules for joining records
//! - [`evaluation`] - Export rule evaluation, scoping and pending export merging
//! - [`drift`] - Detection and correction of unauthorized target changes
//! - [`execution`] - Batched, optionally parallel export execution
//! - [`reconciliation`] - Confirmation of exported changes after import
//! - [`repository`] - Persistence contract and an in-memory implementation
//! - [`expression`] - Sandboxed Rhai expressions for attribute mappings
//! - [`audit`] - Per-record outcome trees
//! - [`config`] - Engine configuration
//!
//! ## Example
//!
//! ```ignore
//! use idsync_engine::prelude::*;
//!
//! let repository: BoxedRepository = Arc::new(InMemoryRepository::new());
//! let rules = Arc::new(SyncRuleCache::load(repository.as_ref()).await?);
//! let evaluator = ExportEvaluator::new(repository.clone(), rules, EngineConfig::from_env()?);
//!
//! let evaluation = evaluator.evaluate_export_rules(&mvo, &changes, None).await?;
//! ```

pub mod audit;
pub mod config;
pub mod drift;
pub mod error;
pub mod evaluation;
pub mod execution;
pub mod expression;
pub mod matching;
pub mod progress;
pub mod protected;
pub mod reconciliation;
pub mod repository;

pub use config::{ConfigError, EngineConfig};
pub use drift::{DriftDetector, DriftResult, DriftedAttribute};
pub use error::{SyncError, SyncResult};
pub use evaluation::{ExportEvaluation, ExportEvaluator, MetaverseAttributeChange, SyncRuleCache};
pub use execution::{ExportExecutionOptions, ExportExecutionResult, ExportExecutor, ExportMode};
pub use reconciliation::{PendingExportReconciler, ReconciliationResult};
pub use repository::{BoxedRepository, InMemoryRepository, RepositoryFactory, SyncRepository};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::audit::{AuditSink, InMemoryAuditSink, NoopAuditSink, OutcomeType};
    pub use crate::config::EngineConfig;
    pub use crate::drift::{DriftDetector, DriftResult};
    pub use crate::error::{SyncError, SyncResult};
    pub use crate::evaluation::{
        ExportEvaluation, ExportEvaluator, MetaverseAttributeChange, SyncRuleCache,
    };
    pub use crate::execution::{
        ExportExecutionOptions, ExportExecutionResult, ExportExecutor, ExportMode,
    };
    pub use crate::progress::{ExportPhase, ExportProgress, ProgressCallback};
    pub use crate::protected::ProtectedAttributeTable;
    pub use crate::reconciliation::PendingExportReconciler;
    pub use crate::repository::{BoxedRepository, InMemoryRepository, RepositoryFactory, SyncRepository};
}
