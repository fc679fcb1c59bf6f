use serde::{Deserialize, Serialize};
use taskforge_core::identity::Identity;
use taskforge_core::store::memory::InMemoryStore;
use taskforge_core::sync::SyncLayer;
use taskforge_core::view::MirrorView;
use taskforge_core::SyncConfig;

/// Stable identifier for a simulated device.
pub type DeviceId = usize;

/// What one device shows after a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub id: DeviceId,
    /// Account the device belongs to, whether or not it is signed in.
    pub user: String,
    pub signed_in: bool,
    pub selected_project: Option<String>,
    pub project_ids: Vec<String>,
    pub task_ids: Vec<String>,
}

/// A client running its own sync layer against the shared store.
pub struct SimulatedDevice {
    id: DeviceId,
    user: Identity,
    layer: SyncLayer<InMemoryStore>,
}

impl SimulatedDevice {
    #[must_use]
    pub fn new(id: DeviceId, user: Identity, store: InMemoryStore, config: SyncConfig) -> Self {
        Self {
            id,
            user,
            layer: SyncLayer::with_config(store, config),
        }
    }

    #[must_use]
    pub const fn id(&self) -> DeviceId {
        self.id
    }

    #[must_use]
    pub const fn user(&self) -> &Identity {
        &self.user
    }

    #[must_use]
    pub const fn layer(&self) -> &SyncLayer<InMemoryStore> {
        &self.layer
    }

    #[must_use]
    pub fn view(&self) -> MirrorView {
        self.layer.view()
    }

    #[must_use]
    pub fn snapshot(&self) -> DeviceState {
        let view = self.layer.view();
        let mut project_ids: Vec<String> = view.projects.into_iter().map(|p| p.id).collect();
        let mut task_ids: Vec<String> = view.tasks.into_iter().map(|t| t.id).collect();
        project_ids.sort();
        task_ids.sort();
        DeviceState {
            id: self.id,
            user: self.user.to_string(),
            signed_in: view.identity.is_some(),
            selected_project: view.selected_project,
            project_ids,
            task_ids,
        }
    }
}
