//! Request entry points.
//!
//! [`CheckpointRestoreServer`] wires the collaborators into the pipeline
//! components and serves the two operations. Wire requests are mapped by
//! [`crate::api`] before they get here.

use crate::archive::ArchiveImporter;
use crate::checkpoint::CheckpointExporter;
use crate::config::CheckpointRestoreConfig;
use crate::container::ContainerStore;
use crate::context::RequestContext;
use crate::error::{Error, Result, ResultExt};
use crate::pod::PodReconstructor;
use crate::reconstruct::ContainerReconstructor;
use crate::request::{CheckpointRequest, RestoreMode, RestoreRequest, RestoreResponse, classify};
use crate::restore::RestoreExecutor;
use crate::services::{
    CheckpointEngine, ContainerStorage, IdIndex, NameRegistry, RestoreOptionDescriptor,
    SandboxService,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Runtime services the server depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub storage: Arc<dyn ContainerStorage>,
    pub sandboxes: Arc<dyn SandboxService>,
    pub names: Arc<dyn NameRegistry>,
    pub ids: Arc<dyn IdIndex>,
    pub engine: Arc<dyn CheckpointEngine>,
}

/// Serves checkpoint and restore requests.
pub struct CheckpointRestoreServer {
    config: CheckpointRestoreConfig,
    containers: Arc<ContainerStore>,
    sandboxes: Arc<dyn SandboxService>,
    ids: Arc<dyn IdIndex>,
    importer: ArchiveImporter,
    reconstructor: ContainerReconstructor,
    pods: PodReconstructor,
    executor: RestoreExecutor,
    exporter: CheckpointExporter,
}

impl CheckpointRestoreServer {
    /// Creates a server with an empty active-container set.
    pub fn new(config: CheckpointRestoreConfig, services: Collaborators) -> Self {
        Self::with_containers(config, services, Arc::new(ContainerStore::new()))
    }

    /// Creates a server sharing an existing active-container set.
    pub fn with_containers(
        config: CheckpointRestoreConfig,
        services: Collaborators,
        containers: Arc<ContainerStore>,
    ) -> Self {
        let importer = ArchiveImporter::new(config.staging_root());
        let reconstructor = ContainerReconstructor::new(
            containers.clone(),
            services.sandboxes.clone(),
            services.storage.clone(),
            services.names.clone(),
            services.ids.clone(),
        );
        let pods = PodReconstructor::new(
            services.sandboxes.clone(),
            importer.clone(),
            reconstructor.clone(),
        );
        let executor = RestoreExecutor::new(
            services.engine.clone(),
            containers.clone(),
            services.sandboxes.clone(),
            services.storage.clone(),
            services.names.clone(),
        );
        let exporter = CheckpointExporter::new(
            config.clone(),
            containers.clone(),
            services.ids.clone(),
            services.sandboxes.clone(),
            services.storage,
            services.engine,
        );

        Self {
            config,
            containers,
            sandboxes: services.sandboxes,
            ids: services.ids,
            importer,
            reconstructor,
            pods,
            executor,
            exporter,
        }
    }

    /// Returns the active-container set.
    pub fn containers(&self) -> &Arc<ContainerStore> {
        &self.containers
    }

    fn ensure_enabled(&self) -> Result<()> {
        if !self.config.enabled {
            return Err(Error::Validation(
                "checkpoint/restore support not available".to_string(),
            ));
        }
        Ok(())
    }

    /// Restores a container in place, into an existing pod, or as a new pod.
    pub async fn restore_container(
        &self,
        ctx: &RequestContext,
        req: &RestoreRequest,
    ) -> Result<RestoreResponse> {
        self.ensure_enabled()?;

        match classify(req)? {
            RestoreMode::DirectRestore {
                container_id,
                pod_id,
            } => self.restore_in_place(&container_id, pod_id, req.keep).await,
            RestoreMode::ImportIntoExistingPod { archive, pod_id } => {
                self.import_into_pod(ctx, &archive, &pod_id, req).await
            }
            RestoreMode::ImportAsNewPod { archive } => self.import_as_pod(ctx, &archive, req).await,
        }
    }

    async fn restore_in_place(
        &self,
        container_id: &str,
        pod_id: Option<String>,
        keep: bool,
    ) -> Result<RestoreResponse> {
        let container = self
            .ids
            .get(container_id)
            .and_then(|id| {
                self.containers
                    .get(&id)
                    .ok_or_else(|| Error::container_not_found(id, "not in the active set"))
            })
            .with_context(|| format!("container with ID starting with {container_id} not found"))?;

        self.sandboxes
            .get_sandbox(&container.sandbox_id)
            .with_context(|| format!("sandbox of container {} not found", container.id))?;

        info!(container = %container.id, "Restoring container");
        let restored = self
            .executor
            .execute(&[RestoreOptionDescriptor {
                container_id: container.id.clone(),
                pod_id,
                archive: None,
                keep,
            }])
            .await?;

        Ok(RestoreResponse {
            id: container.id.clone(),
            pod: false,
            restored_containers: restored,
        })
    }

    async fn import_into_pod(
        &self,
        ctx: &RequestContext,
        archive: &Path,
        pod_id: &str,
        req: &RestoreRequest,
    ) -> Result<RestoreResponse> {
        info!(archive = %archive.display(), pod = %pod_id, "Restoring container from archive");
        let checkpoint = self.importer.import_container(archive)?;
        let container = self
            .reconstructor
            .reconstruct(ctx, &checkpoint, Some(pod_id), &req.mount_remap)
            .await
            .with_context(|| format!("failed to restore container from {}", archive.display()))?;

        let restored = self
            .executor
            .execute(&[RestoreOptionDescriptor {
                container_id: container.id.clone(),
                pod_id: Some(pod_id.to_string()),
                archive: Some(archive.to_path_buf()),
                keep: req.keep,
            }])
            .await?;

        info!(container = %container.id, pod = %pod_id, "Restored container");
        Ok(RestoreResponse {
            id: pod_id.to_string(),
            pod: false,
            restored_containers: restored,
        })
    }

    async fn import_as_pod(
        &self,
        ctx: &RequestContext,
        archive: &Path,
        req: &RestoreRequest,
    ) -> Result<RestoreResponse> {
        info!(archive = %archive.display(), "Restoring pod from archive");
        // Owns the staging directory the member archives live in.
        let pod = self.importer.import_pod(archive)?;
        let (pod_id, descriptors) = self
            .pods
            .reconstruct(ctx, &pod, req)
            .await
            .with_context(|| format!("failed to restore pod from {}", archive.display()))?;

        let restored = self.executor.execute(&descriptors).await?;
        drop(pod);

        info!(pod = %pod_id, containers = restored.len(), "Restored pod");
        Ok(RestoreResponse {
            id: pod_id,
            pod: true,
            restored_containers: restored,
        })
    }

    /// Checkpoints a container or a pod and returns the produced artifact.
    pub async fn checkpoint_container(&self, req: &CheckpointRequest) -> Result<PathBuf> {
        self.exporter.checkpoint(req).await
    }
}
