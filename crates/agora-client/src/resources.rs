//! Shared resources container.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use agora_shared::{GatewayError, NewResource, Resource, ResourceId, ResourcePatch};

use crate::gateway::Gateway;
use crate::session::IdentityReader;
use crate::state::{clear_if_current, impl_has_status, prepend_unique, replace_by_id, Observable, Status};

#[derive(Debug, Clone, Default)]
pub struct ResourceState {
    /// Newest first.
    pub resources: Vec<Resource>,
    pub current_resource: Option<Resource>,
    pub status: Status,
}
impl_has_status!(ResourceState);

pub struct ResourceStore {
    gateway: Arc<dyn Gateway>,
    identity: IdentityReader,
    state: Observable<ResourceState>,
}

impl ResourceStore {
    pub fn new(gateway: Arc<dyn Gateway>, identity: IdentityReader) -> Self {
        Self {
            gateway,
            identity,
            state: Observable::new(),
        }
    }

    pub fn snapshot(&self) -> ResourceState {
        self.state.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.state.subscribe()
    }

    pub async fn fetch_resources(&self) {
        self.state.begin();
        let result = self.gateway.list_resources().await;
        self.state.complete("fetch_resources", result, |state, rows| {
            state.resources = rows.clone();
        });
    }

    pub async fn fetch_resource(&self, id: ResourceId) -> Option<Resource> {
        self.state.begin();
        let result = self.gateway.get_resource(id).await;
        self.state.complete("fetch_resource", result, |state, resource| {
            replace_by_id(&mut state.resources, resource);
            state.current_resource = Some(resource.clone());
        })
    }

    pub async fn create_resource(&self, resource: &NewResource) -> Option<Resource> {
        let Some(owner) = self.identity.user_id() else {
            self.state.fail("create_resource", GatewayError::not_authenticated());
            return None;
        };

        self.state.begin();
        let result = self.gateway.insert_resource(owner, resource).await;
        let created = self.state.complete("create_resource", result, |state, resource| {
            prepend_unique(&mut state.resources, resource);
        })?;
        info!(resource = %created.id.short(), kind = %created.kind, "resource shared");
        Some(created)
    }

    pub async fn update_resource(&self, id: ResourceId, patch: &ResourcePatch) -> bool {
        self.state.begin();
        let result = self.gateway.update_resource(id, patch).await;
        self.state
            .complete("update_resource", result, |state, _| {
                for resource in state.resources.iter_mut().filter(|r| r.id == id) {
                    resource.apply(patch);
                }
                if let Some(resource) = state.current_resource.as_mut().filter(|r| r.id == id) {
                    resource.apply(patch);
                }
            })
            .is_some()
    }

    pub async fn delete_resource(&self, id: ResourceId) -> bool {
        self.state.begin();
        let result = self.gateway.delete_resource(id).await;
        self.state
            .complete("delete_resource", result, |state, _| {
                state.resources.retain(|r| r.id != id);
                clear_if_current(&mut state.current_resource, id);
            })
            .is_some()
    }

    pub fn set_current_resource(&self, resource: Option<Resource>) {
        self.state.update(|state| state.current_resource = resource);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LocalBackend;
    use crate::session::SessionStore;
    use agora_shared::ResourceKind;

    fn new_resource(title: &str) -> NewResource {
        NewResource {
            title: title.into(),
            description: "Worth a look".into(),
            url: "https://crates.io".into(),
            kind: ResourceKind::Tool,
        }
    }

    #[tokio::test]
    async fn crud_round_trip() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        session.sign_up("ada@example.com", "pw", "ada", "Ada").await.unwrap();
        let store = ResourceStore::new(backend.clone(), session.identity());

        let created = store.create_resource(&new_resource("crates")).await.unwrap();
        assert_eq!(store.snapshot().resources, vec![created.clone()]);

        let fetched = store.fetch_resource(created.id).await.unwrap();
        assert_eq!(fetched, created);

        let patch = ResourcePatch {
            kind: Some(ResourceKind::Other),
            ..Default::default()
        };
        assert!(store.update_resource(created.id, &patch).await);
        let state = store.snapshot();
        assert_eq!(state.resources[0].kind, ResourceKind::Other);
        assert_eq!(state.current_resource.as_ref().unwrap().kind, ResourceKind::Other);

        assert!(store.delete_resource(created.id).await);
        let state = store.snapshot();
        assert!(state.resources.is_empty());
        assert!(state.current_resource.is_none());
    }

    #[tokio::test]
    async fn create_requires_identity() {
        let backend = Arc::new(LocalBackend::in_memory().unwrap());
        let session = SessionStore::new(backend.clone());
        let store = ResourceStore::new(backend.clone(), session.identity());

        assert!(store.create_resource(&new_resource("x")).await.is_none());
        assert!(backend.list_resources().await.unwrap().is_empty());
        assert!(store.snapshot().resources.is_empty());
    }
}
