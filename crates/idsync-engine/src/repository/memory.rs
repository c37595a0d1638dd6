//! In-memory repository.
//!
//! Reference [`SyncRepository`] used by tests and by hosts that embed the
//! engine without a database. Clones share the same store, so a factory can
//! hand out one clone per batch.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use idsync_core::ids::{
    ConnectedSystemAttributeId, ConnectedSystemId, ConnectedSystemObjectId,
    ConnectedSystemObjectTypeId, MetaverseAttributeId, MetaverseObjectId, MetaverseObjectTypeId,
    PendingExportId,
};
use idsync_core::model::{ConnectedSystemObject, MetaverseObject, PendingExport, SyncRule};
use idsync_core::value::AttributeValue;

use super::SyncRepository;
use crate::error::{SyncError, SyncResult};

#[derive(Debug, Default)]
struct Store {
    metaverse_objects: HashMap<MetaverseObjectId, MetaverseObject>,
    connected_system_objects: Vec<ConnectedSystemObject>,
    pending_exports: Vec<PendingExport>,
    sync_rules: Vec<SyncRule>,
}

/// Repository keeping everything in process memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    store: Arc<RwLock<Store>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_metaverse_object(&self, object: MetaverseObject) {
        self.store
            .write()
            .await
            .metaverse_objects
            .insert(object.id, object);
    }

    pub async fn insert_connected_system_object(&self, object: ConnectedSystemObject) {
        self.store.write().await.connected_system_objects.push(object);
    }

    pub async fn insert_pending_export(&self, export: PendingExport) {
        self.store.write().await.pending_exports.push(export);
    }

    pub async fn insert_sync_rule(&self, rule: SyncRule) {
        self.store.write().await.sync_rules.push(rule);
    }

    /// Every staging record, in insertion order.
    pub async fn connected_system_objects(&self) -> Vec<ConnectedSystemObject> {
        self.store.read().await.connected_system_objects.clone()
    }

    /// Every pending export, in insertion order.
    pub async fn pending_exports(&self) -> Vec<PendingExport> {
        self.store.read().await.pending_exports.clone()
    }
}

fn value_matches(candidate: &AttributeValue, value: &AttributeValue, case_sensitive: bool) -> bool {
    candidate.matches(value, case_sensitive)
}

#[async_trait]
impl SyncRepository for InMemoryRepository {
    async fn find_metaverse_objects_by_attribute(
        &self,
        object_type_id: MetaverseObjectTypeId,
        attribute_id: MetaverseAttributeId,
        value: &AttributeValue,
        case_sensitive: bool,
    ) -> SyncResult<Vec<MetaverseObject>> {
        let store = self.store.read().await;
        let mut found: Vec<MetaverseObject> = store
            .metaverse_objects
            .values()
            .filter(|mvo| mvo.object_type_id == object_type_id)
            .filter(|mvo| {
                mvo.values(attribute_id)
                    .into_iter()
                    .any(|v| value_matches(v, value, case_sensitive))
            })
            .cloned()
            .collect();
        found.sort_by_key(|mvo| (mvo.created_at, mvo.id));
        Ok(found)
    }

    async fn update_metaverse_objects(&self, objects: &[MetaverseObject]) -> SyncResult<()> {
        let mut store = self.store.write().await;
        for object in objects {
            store.metaverse_objects.insert(object.id, object.clone());
        }
        Ok(())
    }

    async fn get_connected_system_object(
        &self,
        id: ConnectedSystemObjectId,
    ) -> SyncResult<Option<ConnectedSystemObject>> {
        Ok(self
            .store
            .read()
            .await
            .connected_system_objects
            .iter()
            .find(|cso| cso.id == id)
            .cloned())
    }

    async fn find_joined_connected_system_object(
        &self,
        connected_system_id: ConnectedSystemId,
        metaverse_object_id: MetaverseObjectId,
    ) -> SyncResult<Option<ConnectedSystemObject>> {
        Ok(self
            .store
            .read()
            .await
            .connected_system_objects
            .iter()
            .find(|cso| {
                cso.connected_system_id == connected_system_id
                    && cso.metaverse_object_id == Some(metaverse_object_id)
            })
            .cloned())
    }

    async fn find_connected_system_objects_for_metaverse_object(
        &self,
        metaverse_object_id: MetaverseObjectId,
    ) -> SyncResult<Vec<ConnectedSystemObject>> {
        Ok(self
            .store
            .read()
            .await
            .connected_system_objects
            .iter()
            .filter(|cso| cso.metaverse_object_id == Some(metaverse_object_id))
            .cloned()
            .collect())
    }

    async fn find_connected_system_objects_by_attribute(
        &self,
        connected_system_id: ConnectedSystemId,
        object_type_id: ConnectedSystemObjectTypeId,
        attribute_id: ConnectedSystemAttributeId,
        value: &AttributeValue,
        case_sensitive: bool,
    ) -> SyncResult<Vec<ConnectedSystemObject>> {
        Ok(self
            .store
            .read()
            .await
            .connected_system_objects
            .iter()
            .filter(|cso| {
                cso.connected_system_id == connected_system_id && cso.object_type_id == object_type_id
            })
            .filter(|cso| {
                cso.values(attribute_id)
                    .into_iter()
                    .any(|v| value_matches(v, value, case_sensitive))
            })
            .cloned()
            .collect())
    }

    async fn create_connected_system_objects(
        &self,
        objects: &[ConnectedSystemObject],
    ) -> SyncResult<()> {
        let mut store = self.store.write().await;
        for object in objects {
            if store.connected_system_objects.iter().any(|c| c.id == object.id) {
                return Err(SyncError::repository(format!(
                    "connected system object {} already exists",
                    object.id
                )));
            }
            store.connected_system_objects.push(object.clone());
        }
        Ok(())
    }

    async fn update_connected_system_objects(
        &self,
        objects: &[ConnectedSystemObject],
    ) -> SyncResult<()> {
        let mut store = self.store.write().await;
        for object in objects {
            let existing = store
                .connected_system_objects
                .iter_mut()
                .find(|c| c.id == object.id)
                .ok_or_else(|| SyncError::not_found("ConnectedSystemObject", object.id))?;
            *existing = object.clone();
        }
        Ok(())
    }

    async fn delete_connected_system_objects(
        &self,
        ids: &[ConnectedSystemObjectId],
    ) -> SyncResult<()> {
        self.store
            .write()
            .await
            .connected_system_objects
            .retain(|c| !ids.contains(&c.id));
        Ok(())
    }

    async fn find_pending_export_for_object(
        &self,
        connected_system_object_id: ConnectedSystemObjectId,
    ) -> SyncResult<Option<PendingExport>> {
        Ok(self
            .store
            .read()
            .await
            .pending_exports
            .iter()
            .find(|pe| pe.connected_system_object_id == connected_system_object_id)
            .cloned())
    }

    async fn get_pending_exports(
        &self,
        connected_system_id: ConnectedSystemId,
    ) -> SyncResult<Vec<PendingExport>> {
        Ok(self
            .store
            .read()
            .await
            .pending_exports
            .iter()
            .filter(|pe| pe.connected_system_id == connected_system_id)
            .cloned()
            .collect())
    }

    async fn create_pending_exports(&self, exports: &[PendingExport]) -> SyncResult<()> {
        let mut store = self.store.write().await;
        for export in exports {
            if store.pending_exports.iter().any(|pe| pe.id == export.id) {
                return Err(SyncError::repository(format!(
                    "pending export {} already exists",
                    export.id
                )));
            }
            store.pending_exports.push(export.clone());
        }
        Ok(())
    }

    async fn update_pending_exports(&self, exports: &[PendingExport]) -> SyncResult<()> {
        let mut store = self.store.write().await;
        for export in exports {
            let existing = store
                .pending_exports
                .iter_mut()
                .find(|pe| pe.id == export.id)
                .ok_or_else(|| SyncError::not_found("PendingExport", export.id))?;
            *existing = export.clone();
        }
        Ok(())
    }

    async fn delete_pending_exports(&self, ids: &[PendingExportId]) -> SyncResult<()> {
        self.store
            .write()
            .await
            .pending_exports
            .retain(|pe| !ids.contains(&pe.id));
        Ok(())
    }

    async fn get_sync_rules(&self) -> SyncResult<Vec<SyncRule>> {
        Ok(self.store.read().await.sync_rules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idsync_core::model::{
        ConnectedSystemAttribute, ConnectedSystemObjectType, MetaverseAttribute,
        MetaverseObjectType, PendingExportChangeType,
    };
    use idsync_core::value::AttributeDataType;

    fn object_type() -> ConnectedSystemObjectType {
        ConnectedSystemObjectType::new(
            ConnectedSystemId::new(),
            "user",
            ConnectedSystemAttribute::new("uid", AttributeDataType::String),
        )
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let repo = InMemoryRepository::new();
        let session = repo.clone();
        let cso = ConnectedSystemObject::new(&object_type());

        session.create_connected_system_objects(&[cso.clone()]).await.unwrap();

        assert_eq!(
            repo.get_connected_system_object(cso.id).await.unwrap(),
            Some(cso)
        );
    }

    #[tokio::test]
    async fn test_find_by_attribute_honours_case_flag() {
        let repo = InMemoryRepository::new();
        let object_type = object_type();
        let mail = ConnectedSystemAttribute::new("mail", AttributeDataType::String);
        let cso = ConnectedSystemObject::new(&object_type).with_value(&mail, "Ann@Corp.com");
        repo.insert_connected_system_object(cso).await;

        let needle = AttributeValue::from("ann@corp.com");
        let exact = repo
            .find_connected_system_objects_by_attribute(
                object_type.connected_system_id,
                object_type.id,
                mail.id,
                &needle,
                true,
            )
            .await
            .unwrap();
        let folded = repo
            .find_connected_system_objects_by_attribute(
                object_type.connected_system_id,
                object_type.id,
                mail.id,
                &needle,
                false,
            )
            .await
            .unwrap();

        assert!(exact.is_empty());
        assert_eq!(folded.len(), 1);
    }

    #[tokio::test]
    async fn test_find_metaverse_objects_by_attribute() {
        let repo = InMemoryRepository::new();
        let person = MetaverseObjectType::new("person");
        let employee_id = MetaverseAttribute::new("employeeId", AttributeDataType::String);
        let mvo = MetaverseObject::new(person.clone()).with_value(&employee_id, "E1");
        repo.insert_metaverse_object(mvo.clone()).await;

        let found = repo
            .find_metaverse_objects_by_attribute(
                person.id,
                employee_id.id,
                &AttributeValue::from("E1"),
                true,
            )
            .await
            .unwrap();
        assert_eq!(found, vec![mvo]);
    }

    #[tokio::test]
    async fn test_update_missing_pending_export_fails() {
        let repo = InMemoryRepository::new();
        let export = PendingExport::new(
            ConnectedSystemId::new(),
            ConnectedSystemObjectId::new(),
            PendingExportChangeType::Update,
            3,
        );
        let err = repo.update_pending_exports(&[export]).await.unwrap_err();
        assert!(matches!(err, SyncError::NotFound { .. }));
    }
}
