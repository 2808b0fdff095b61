//! Restore execution.
//!
//! Hands reconstructed containers to the checkpoint engine one at a time, in
//! order, stopping at the first failure. The container that failed is torn
//! down again (name, storage, active set); containers restored before it are
//! left running.

use crate::container::ContainerStore;
use crate::error::{Result, ResultExt};
use crate::services::{
    CheckpointEngine, ContainerStorage, NameRegistry, RestoreOptionDescriptor, SandboxService,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Drives the engine over a list of restore descriptors.
#[derive(Clone)]
pub struct RestoreExecutor {
    engine: Arc<dyn CheckpointEngine>,
    containers: Arc<ContainerStore>,
    sandboxes: Arc<dyn SandboxService>,
    storage: Arc<dyn ContainerStorage>,
    names: Arc<dyn NameRegistry>,
}

impl RestoreExecutor {
    pub fn new(
        engine: Arc<dyn CheckpointEngine>,
        containers: Arc<ContainerStore>,
        sandboxes: Arc<dyn SandboxService>,
        storage: Arc<dyn ContainerStorage>,
        names: Arc<dyn NameRegistry>,
    ) -> Self {
        Self {
            engine,
            containers,
            sandboxes,
            storage,
            names,
        }
    }

    /// Restores every descriptor and returns the restored ids in order.
    pub async fn execute(&self, descriptors: &[RestoreOptionDescriptor]) -> Result<Vec<String>> {
        let mut restored = Vec::with_capacity(descriptors.len());
        for descriptor in descriptors {
            let id = &descriptor.container_id;
            match self.engine.restore(descriptor).await {
                Ok(restored_id) => {
                    if let Some(container) = self.containers.get(&restored_id) {
                        container.set_running();
                    }
                    info!(container = %restored_id, "Restored container");
                    restored.push(restored_id);
                }
                Err(e) => {
                    self.cleanup(id).await;
                    return Err(e).with_context(|| format!("failed to restore container {id}"));
                }
            }
        }
        Ok(restored)
    }

    /// Best-effort teardown of a container the engine failed to restore.
    async fn cleanup(&self, id: &str) {
        let Some(container) = self.containers.get(id) else {
            warn!(container = %id, "Failed to find container for cleanup after failed restore");
            return;
        };

        self.names.release(&container.name);
        if let Err(e) = self.storage.delete_container(id).await {
            warn!(container = %id, error = %e, "Failed to cleanup container directory");
        }
        self.containers.remove(id);
        if let Ok(sandbox) = self.sandboxes.get_sandbox(&container.sandbox_id) {
            sandbox.remove_container(id);
        }
    }
}
