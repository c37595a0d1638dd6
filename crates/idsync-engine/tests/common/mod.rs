//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;

use idsync_connector::error::{ConnectorError, ConnectorResult};
use idsync_connector::traits::{Connector, ExportConnector};
use idsync_connector::types::{ExportRequest, ExportResult};
use idsync_core::ids::ConnectedSystemId;
use idsync_core::model::{
    ConnectedSystemAttribute, ConnectedSystemObjectType, MetaverseAttribute, MetaverseObject,
    MetaverseObjectType, PendingExportChangeType, SyncRule, SyncRuleDirection, SyncRuleMapping,
};
use idsync_core::value::{AttributeDataType, AttributeValue};
use idsync_engine::{EngineConfig, InMemoryRepository};

static TRACING: Once = Once::new();

/// Install a test subscriber when `RUST_LOG` is set.
pub fn init_tracing() {
    TRACING.call_once(|| {
        if std::env::var("RUST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

// =============================================================================
// Schema fixtures
// =============================================================================

/// Metaverse schema for people.
pub struct PersonSchema {
    pub object_type: MetaverseObjectType,
    pub display_name: MetaverseAttribute,
    pub department: MetaverseAttribute,
    pub employee_id: MetaverseAttribute,
}

impl PersonSchema {
    pub fn new() -> Self {
        Self {
            object_type: MetaverseObjectType::new("person"),
            display_name: MetaverseAttribute::new("DisplayName", AttributeDataType::String),
            department: MetaverseAttribute::new("Department", AttributeDataType::String),
            employee_id: MetaverseAttribute::new("EmployeeId", AttributeDataType::String),
        }
    }

    pub fn person(&self, display_name: &str) -> MetaverseObject {
        MetaverseObject::new(self.object_type.clone()).with_value(&self.display_name, display_name)
    }
}

/// A directory-like target system with a user type.
pub struct DirectorySchema {
    pub system_id: ConnectedSystemId,
    pub user_type: ConnectedSystemObjectType,
    pub object_guid: ConnectedSystemAttribute,
    pub distinguished_name: ConnectedSystemAttribute,
    pub display_name: ConnectedSystemAttribute,
    pub department: ConnectedSystemAttribute,
    pub employee_id: ConnectedSystemAttribute,
}

impl DirectorySchema {
    pub fn new() -> Self {
        let system_id = ConnectedSystemId::new();
        let object_guid = ConnectedSystemAttribute::new("objectGUID", AttributeDataType::Guid);
        let distinguished_name =
            ConnectedSystemAttribute::new("distinguishedName", AttributeDataType::String);
        let user_type = ConnectedSystemObjectType::new(system_id, "user", object_guid.clone())
            .with_secondary_external_id(distinguished_name.clone());
        Self {
            system_id,
            user_type,
            object_guid,
            distinguished_name,
            display_name: ConnectedSystemAttribute::new("displayName", AttributeDataType::String),
            department: ConnectedSystemAttribute::new("department", AttributeDataType::String),
            employee_id: ConnectedSystemAttribute::new("employeeID", AttributeDataType::String),
        }
    }

    /// Export rule flowing display name and department to this system.
    pub fn export_rule(&self, person: &PersonSchema) -> SyncRule {
        SyncRule::new(
            "Directory users",
            SyncRuleDirection::Export,
            self.user_type.clone(),
            person.object_type.id,
        )
        .with_mapping(SyncRuleMapping::export_direct(&person.display_name, &self.display_name))
        .with_mapping(SyncRuleMapping::export_direct(&person.department, &self.department))
        .with_mapping(SyncRuleMapping::export_expression(
            r#""CN=" + mv.DisplayName + ",OU=Users""#,
            &self.distinguished_name,
        ))
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        max_retries: 3,
        retry_jitter: false,
        ..EngineConfig::default()
    }
}

pub async fn repository_with_rules(rules: Vec<SyncRule>) -> InMemoryRepository {
    let repo = InMemoryRepository::new();
    for rule in rules {
        repo.insert_sync_rule(rule).await;
    }
    repo
}

// =============================================================================
// Mock connector
// =============================================================================

/// How the mock connector answers a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockBehavior {
    /// Every record succeeds; Creates return fresh identifiers.
    Succeed,
    /// Every record comes back as a failed result.
    FailRecords,
    /// The call itself fails.
    Error,
    /// The connector panics mid-call.
    Panic,
}

/// Export connector recording what it was sent.
pub struct MockConnector {
    name: String,
    behavior: MockBehavior,
    call_count: AtomicUsize,
    record_count: AtomicUsize,
    requests: Mutex<Vec<ExportRequest>>,
}

impl MockConnector {
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            name: format!("mock-{behavior:?}"),
            behavior,
            call_count: AtomicUsize::new(0),
            record_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn records(&self) -> usize {
        self.record_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ExportRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn display_name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl ExportConnector for MockConnector {
    async fn export(&self, requests: &[ExportRequest]) -> ConnectorResult<Vec<ExportResult>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.record_count.fetch_add(requests.len(), Ordering::SeqCst);
        self.requests.lock().unwrap().extend_from_slice(requests);

        match self.behavior {
            MockBehavior::Error => Err(ConnectorError::connection_failed("directory unreachable")),
            MockBehavior::Panic => panic!("connector crashed"),
            MockBehavior::FailRecords => Ok(requests
                .iter()
                .map(|r| ExportResult::failed(r.pending_export_id, "constraint violation"))
                .collect()),
            MockBehavior::Succeed => Ok(requests
                .iter()
                .map(|r| match r.change_type {
                    PendingExportChangeType::Create => ExportResult::created(
                        r.pending_export_id,
                        AttributeValue::Guid(uuid::Uuid::new_v4()),
                        r.changes
                            .iter()
                            .find(|c| c.attribute_name == "distinguishedName")
                            .and_then(|c| c.value.clone()),
                    ),
                    _ => ExportResult::succeeded(r.pending_export_id),
                })
                .collect()),
        }
    }
}

pub fn mock(behavior: MockBehavior) -> Arc<MockConnector> {
    Arc::new(MockConnector::new(behavior))
}
