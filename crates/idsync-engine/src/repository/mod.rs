//! Persistence contract.
//!
//! The engine performs no locking of its own. Every read and write of
//! metaverse objects, staging records and pending exports goes through a
//! [`SyncRepository`], whose implementation owns concurrency control.

use std::sync::Arc;

use async_trait::async_trait;

use idsync_core::ids::{
    ConnectedSystemAttributeId, ConnectedSystemId, ConnectedSystemObjectId,
    ConnectedSystemObjectTypeId, MetaverseAttributeId, MetaverseObjectId, MetaverseObjectTypeId,
    PendingExportId,
};
use idsync_core::model::{ConnectedSystemObject, MetaverseObject, PendingExport, SyncRule};
use idsync_core::value::AttributeValue;

use crate::error::SyncResult;

pub mod memory;

pub use memory::InMemoryRepository;

/// Typed persistence operations used by every engine component.
#[async_trait]
pub trait SyncRepository: Send + Sync {
    // Metaverse objects

    /// Metaverse objects of a type holding `value` for an attribute.
    async fn find_metaverse_objects_by_attribute(
        &self,
        object_type_id: MetaverseObjectTypeId,
        attribute_id: MetaverseAttributeId,
        value: &AttributeValue,
        case_sensitive: bool,
    ) -> SyncResult<Vec<MetaverseObject>>;

    async fn update_metaverse_objects(&self, objects: &[MetaverseObject]) -> SyncResult<()>;

    // Staging records

    async fn get_connected_system_object(
        &self,
        id: ConnectedSystemObjectId,
    ) -> SyncResult<Option<ConnectedSystemObject>>;

    /// Staging record of `connected_system_id` joined to a metaverse object.
    async fn find_joined_connected_system_object(
        &self,
        connected_system_id: ConnectedSystemId,
        metaverse_object_id: MetaverseObjectId,
    ) -> SyncResult<Option<ConnectedSystemObject>>;

    /// Every staging record, in any system, joined to a metaverse object.
    async fn find_connected_system_objects_for_metaverse_object(
        &self,
        metaverse_object_id: MetaverseObjectId,
    ) -> SyncResult<Vec<ConnectedSystemObject>>;

    /// Staging records of a type holding `value` for an attribute.
    async fn find_connected_system_objects_by_attribute(
        &self,
        connected_system_id: ConnectedSystemId,
        object_type_id: ConnectedSystemObjectTypeId,
        attribute_id: ConnectedSystemAttributeId,
        value: &AttributeValue,
        case_sensitive: bool,
    ) -> SyncResult<Vec<ConnectedSystemObject>>;

    async fn create_connected_system_objects(
        &self,
        objects: &[ConnectedSystemObject],
    ) -> SyncResult<()>;

    async fn update_connected_system_objects(
        &self,
        objects: &[ConnectedSystemObject],
    ) -> SyncResult<()>;

    async fn delete_connected_system_objects(
        &self,
        ids: &[ConnectedSystemObjectId],
    ) -> SyncResult<()>;

    // Pending exports

    /// Outstanding pending export for a staging record.
    async fn find_pending_export_for_object(
        &self,
        connected_system_object_id: ConnectedSystemObjectId,
    ) -> SyncResult<Option<PendingExport>>;

    /// Every pending export of a connected system, in creation order.
    async fn get_pending_exports(
        &self,
        connected_system_id: ConnectedSystemId,
    ) -> SyncResult<Vec<PendingExport>>;

    async fn create_pending_exports(&self, exports: &[PendingExport]) -> SyncResult<()>;

    async fn update_pending_exports(&self, exports: &[PendingExport]) -> SyncResult<()>;

    async fn delete_pending_exports(&self, ids: &[PendingExportId]) -> SyncResult<()>;

    // Rules

    async fn get_sync_rules(&self) -> SyncResult<Vec<SyncRule>>;
}

/// Shared repository handle.
pub type BoxedRepository = Arc<dyn SyncRepository>;

/// Factory producing an independent persistence session for one batch.
pub type RepositoryFactory = Arc<dyn Fn() -> SyncResult<BoxedRepository> + Send + Sync>;
