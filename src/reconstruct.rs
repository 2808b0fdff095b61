//! Container reconstruction from checkpoint metadata.
//!
//! Turns the `spec.dump`/`config.dump` pair of a checkpoint into a registered
//! container, ready for the engine to restore into:
//!
//! ```text
//!  derive identity ─► build mounts ─► lock sandbox (shared) ─► reserve name
//!        │                                                        │
//!   (pure, may fail                                               ▼
//!    before any side effect)       mark created ◄─ add to active set ◄─ add id ─► create storage
//! ```
//!
//! Every committed step pushes its undo onto a [`RollbackLog`]; a failure
//! unwinds the log in reverse, so a failed attempt leaves no name, id,
//! storage or active-set entry behind.

use crate::archive::ContainerCheckpoint;
use crate::constants::{
    ANNOTATION_ANNOTATIONS, ANNOTATION_CONTAINER_MANAGER, ANNOTATION_LABELS, ANNOTATION_METADATA,
    ANNOTATION_SANDBOX_ID, CONTAINER_MANAGER_LIBPOD, CONTAINER_NAME_PREFIX, is_ignored_mount,
};
use crate::container::{ContainerStore, Mount, MountPropagation, ReconstructedContainer};
use crate::context::RequestContext;
use crate::error::{Error, Result, ResultExt};
use crate::metadata::{ContainerMetadata, SandboxMetadata, SpecDump};
use crate::rollback::RollbackLog;
use crate::services::{ContainerStorage, IdIndex, NameRegistry, Sandbox, SandboxService};
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Name, attempt, annotations and labels of the checkpointed container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginalIdentity {
    pub metadata: ContainerMetadata,
    pub annotations: HashMap<String, String>,
    pub labels: HashMap<String, String>,
}

fn decode_annotation<T: DeserializeOwned>(spec: &SpecDump, key: &str) -> Result<T> {
    let raw = spec.annotations.get(key).map(String::as_str).unwrap_or("");
    serde_json::from_str(raw).map_err(|e| Error::Import {
        file: key.to_string(),
        reason: e.to_string(),
    })
}

/// Recovers the original identity of a checkpointed container.
///
/// Checkpoints written by the native tool carry the name in `config.dump`;
/// everything else embeds JSON documents in the spec annotations.
pub fn derive_identity(checkpoint: &ContainerCheckpoint) -> Result<OriginalIdentity> {
    let spec = &checkpoint.spec;
    let manager = spec
        .annotations
        .get(ANNOTATION_CONTAINER_MANAGER)
        .map(String::as_str);

    if manager == Some(CONTAINER_MANAGER_LIBPOD) {
        return Ok(OriginalIdentity {
            metadata: ContainerMetadata {
                name: checkpoint.config.name.clone(),
                attempt: 0,
            },
            ..Default::default()
        });
    }

    Ok(OriginalIdentity {
        metadata: decode_annotation(spec, ANNOTATION_METADATA)?,
        annotations: decode_annotation(spec, ANNOTATION_ANNOTATIONS)?,
        labels: decode_annotation(spec, ANNOTATION_LABELS)?,
    })
}

/// Builds the restored container's mounts from the dumped spec.
///
/// Runtime-provided destinations are dropped, host sources are remapped
/// through `remap`, and the `ro`/`rprivate`/`rshared`/`rslaved` options are
/// translated. Any other option is ignored.
pub fn build_mounts(spec: &SpecDump, remap: &HashMap<String, String>) -> Vec<Mount> {
    let mut mounts = Vec::new();
    for m in &spec.mounts {
        if is_ignored_mount(&m.destination) {
            continue;
        }

        let mut mount = Mount {
            container_path: m.destination.clone(),
            host_path: remap.get(&m.source).unwrap_or(&m.source).clone(),
            readonly: false,
            propagation: MountPropagation::Private,
        };
        for opt in &m.options {
            match opt.as_str() {
                "ro" => mount.readonly = true,
                "rprivate" => mount.propagation = MountPropagation::Private,
                "rshared" => mount.propagation = MountPropagation::Bidirectional,
                "rslaved" => mount.propagation = MountPropagation::HostToContainer,
                _ => {}
            }
        }

        debug!(?mount, "Adding mount");
        mounts.push(mount);
    }
    mounts
}

/// Returns the runtime name of a container within a sandbox.
pub fn container_name(container: &ContainerMetadata, sandbox: &SandboxMetadata) -> String {
    format!(
        "{CONTAINER_NAME_PREFIX}_{}_{}_{}_{}_{}",
        container.name, sandbox.name, sandbox.namespace, sandbox.uid, container.attempt
    )
}

/// Generates a fresh 64-character hex container id.
pub fn generate_container_id() -> String {
    format!("{:x}", Sha256::digest(uuid::Uuid::new_v4().as_bytes()))
}

// =============================================================================
// Reconstructor
// =============================================================================

/// Rebuilds single containers and registers them with the runtime.
#[derive(Clone)]
pub struct ContainerReconstructor {
    containers: Arc<ContainerStore>,
    sandboxes: Arc<dyn SandboxService>,
    storage: Arc<dyn ContainerStorage>,
    names: Arc<dyn NameRegistry>,
    ids: Arc<dyn IdIndex>,
}

impl ContainerReconstructor {
    pub fn new(
        containers: Arc<ContainerStore>,
        sandboxes: Arc<dyn SandboxService>,
        storage: Arc<dyn ContainerStorage>,
        names: Arc<dyn NameRegistry>,
        ids: Arc<dyn IdIndex>,
    ) -> Self {
        Self {
            containers,
            sandboxes,
            storage,
            names,
            ids,
        }
    }

    /// Reconstructs one container into `target_sandbox`.
    ///
    /// Without a target sandbox the container goes back into the sandbox it
    /// was checkpointed from and keeps its original id; otherwise it gets a
    /// fresh id.
    pub async fn reconstruct(
        &self,
        ctx: &RequestContext,
        checkpoint: &ContainerCheckpoint,
        target_sandbox: Option<&str>,
        mount_remap: &HashMap<String, String>,
    ) -> Result<Arc<ReconstructedContainer>> {
        let identity = derive_identity(checkpoint)?;
        let mounts = build_mounts(&checkpoint.spec, mount_remap);

        let (sandbox_id, container_id) = match target_sandbox {
            Some(id) => (id.to_string(), generate_container_id()),
            None => (
                checkpoint
                    .spec
                    .annotations
                    .get(ANNOTATION_SANDBOX_ID)
                    .cloned()
                    .unwrap_or_default(),
                checkpoint.config.id.clone(),
            ),
        };
        if sandbox_id.is_empty() {
            return Err(Error::Validation("PodSandboxId should not be empty".to_string()));
        }
        if container_id.is_empty() {
            return Err(Error::Import {
                file: crate::constants::CONFIG_DUMP_FILE.to_string(),
                reason: "checkpoint does not record a container id".to_string(),
            });
        }

        let sandbox = self
            .sandboxes
            .get_sandbox(&sandbox_id)
            .with_context(|| format!("specified sandbox not found: {sandbox_id}"))?;

        // Held until the container is registered with the sandbox.
        let _stop_guard = sandbox.stop_lock().read().await;
        if sandbox.stopped() {
            return Err(Error::Reconstruction {
                id: container_id,
                reason: format!(
                    "CreateContainer failed as the sandbox was stopped: {}",
                    sandbox.id()
                ),
            });
        }

        let container = Arc::new(ReconstructedContainer::new(
            container_id,
            container_name(&identity.metadata, &sandbox.config().metadata()),
            sandbox.id().to_string(),
            identity.metadata,
            checkpoint.config.rootfs_image_name.clone(),
            identity.labels,
            identity.annotations,
            mounts,
        ));

        let mut rollback = RollbackLog::new(format!("restore container {}", container.id));
        match self.register(ctx, &sandbox, &container, &mut rollback).await {
            Ok(()) => {
                rollback.commit();
                info!(
                    container = %container.id,
                    name = %container.name,
                    pod = %sandbox.id(),
                    "Reconstructed container"
                );
                Ok(container)
            }
            Err(e) => {
                rollback.unwind().await;
                Err(e)
            }
        }
    }

    async fn register(
        &self,
        ctx: &RequestContext,
        sandbox: &Arc<Sandbox>,
        container: &Arc<ReconstructedContainer>,
        rollback: &mut RollbackLog,
    ) -> Result<()> {
        let id = container.id.clone();
        let name = container.name.clone();

        self.names
            .reserve(&name, &id)
            .context("reserving container name")?;
        {
            let names = self.names.clone();
            let name = name.clone();
            rollback.push(format!("releasing container name {name}"), move || async move {
                names.release(&name);
                Ok(())
            });
        }

        self.ids
            .add(&id)
            .context("adding container id to the id index")?;
        {
            let ids = self.ids.clone();
            let id = id.clone();
            rollback.push(format!("deleting container {id} from the id index"), move || async move {
                ids.delete(&id)
            });
        }

        self.storage
            .create_container(container)
            .await
            .context("creating container storage")?;
        {
            let storage = self.storage.clone();
            let id = id.clone();
            rollback.push(format!("deleting container {id} from storage"), move || async move {
                storage.delete_container(&id).await
            });
        }

        if let Some(err) = ctx.err() {
            info!(container = %id, error = %err, "Context was either canceled or the deadline was exceeded");
            return Err(err);
        }

        self.containers.add(container.clone())?;
        sandbox.add_container(&id);
        {
            let containers = self.containers.clone();
            let sandbox = sandbox.clone();
            let id = id.clone();
            rollback.push(format!("removing container {id}"), move || async move {
                containers.remove(&id);
                sandbox.remove_container(&id);
                Ok(())
            });
        }

        container.set_created();
        Ok(())
    }
}
