//! Reconstructed containers and the active-container set.
//!
//! A [`ReconstructedContainer`] is built by the reconstruction pipeline and
//! only becomes visible to the rest of the runtime once it is added to the
//! [`ContainerStore`].
//!
//! ```text
//!   ┌──────────┐  reconstruct  ┌─────────┐  engine restore  ┌─────────┐
//!   │ (none)   │ ────────────► │ Created │ ───────────────► │ Running │
//!   └──────────┘               └─────────┘                  └─────────┘
//! ```

use crate::constants::{
    ANNOTATION_ANNOTATIONS, ANNOTATION_LABELS, ANNOTATION_METADATA, ANNOTATION_SANDBOX_ID,
};
use crate::error::{Error, Result};
use crate::metadata::{ConfigDump, ContainerMetadata, SpecDump, SpecMount};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

// =============================================================================
// Mounts
// =============================================================================

/// Mount propagation between host and container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MountPropagation {
    /// No propagation in either direction.
    #[default]
    Private,
    /// Host mounts appear in the container.
    HostToContainer,
    /// Mounts propagate both ways.
    Bidirectional,
}

/// A mount of a reconstructed container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mount {
    pub container_path: String,
    pub host_path: String,
    pub readonly: bool,
    pub propagation: MountPropagation,
}

impl Mount {
    /// Returns mount options equivalent to this mount's flags.
    pub fn options(&self) -> Vec<String> {
        let mut options = vec!["rbind".to_string()];
        if self.readonly {
            options.push("ro".to_string());
        }
        options.push(
            match self.propagation {
                MountPropagation::Private => "rprivate",
                MountPropagation::HostToContainer => "rslaved",
                MountPropagation::Bidirectional => "rshared",
            }
            .to_string(),
        );
        options
    }
}

// =============================================================================
// Container Status
// =============================================================================

/// Lifecycle state of a reconstructed container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerStatus {
    /// Descriptor assembled, not yet registered.
    Creating,
    /// Registered and ready for the engine to restore into.
    Created,
    /// Restored by the engine.
    Running,
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "creating"),
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
        }
    }
}

// =============================================================================
// Reconstructed Container
// =============================================================================

/// A container rebuilt from checkpoint metadata.
#[derive(Debug)]
pub struct ReconstructedContainer {
    pub id: String,
    /// Full runtime name (`k8s_<name>_<pod>_<namespace>_<uid>_<attempt>`).
    pub name: String,
    pub sandbox_id: String,
    pub metadata: ContainerMetadata,
    pub image: String,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    pub mounts: Vec<Mount>,
    pub restore: bool,
    pub created_at: DateTime<Utc>,
    status: RwLock<ContainerStatus>,
}

impl ReconstructedContainer {
    /// Creates a container descriptor in the `Creating` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        name: String,
        sandbox_id: String,
        metadata: ContainerMetadata,
        image: String,
        labels: HashMap<String, String>,
        annotations: HashMap<String, String>,
        mounts: Vec<Mount>,
    ) -> Self {
        Self {
            id,
            name,
            sandbox_id,
            metadata,
            image,
            labels,
            annotations,
            mounts,
            restore: true,
            created_at: Utc::now(),
            status: RwLock::new(ContainerStatus::Creating),
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> ContainerStatus {
        self.status
            .read()
            .map(|s| *s)
            .unwrap_or(ContainerStatus::Creating)
    }

    fn set_status(&self, status: ContainerStatus) {
        if let Ok(mut s) = self.status.write() {
            *s = status;
        }
    }

    /// Marks the container created.
    pub fn set_created(&self) {
        self.set_status(ContainerStatus::Created);
    }

    /// Marks the container running.
    pub fn set_running(&self) {
        self.set_status(ContainerStatus::Running);
    }

    /// Builds the `spec.dump` a checkpoint of this container would carry.
    pub fn spec_dump(&self) -> Result<SpecDump> {
        let mut annotations = HashMap::new();
        annotations.insert(
            ANNOTATION_METADATA.to_string(),
            serde_json::to_string(&self.metadata)?,
        );
        annotations.insert(
            ANNOTATION_ANNOTATIONS.to_string(),
            serde_json::to_string(&self.annotations)?,
        );
        annotations.insert(
            ANNOTATION_LABELS.to_string(),
            serde_json::to_string(&self.labels)?,
        );
        annotations.insert(ANNOTATION_SANDBOX_ID.to_string(), self.sandbox_id.clone());

        Ok(SpecDump {
            oci_version: "1.0.2".to_string(),
            mounts: self
                .mounts
                .iter()
                .map(|m| SpecMount {
                    destination: m.container_path.clone(),
                    source: m.host_path.clone(),
                    mount_type: "bind".to_string(),
                    options: m.options(),
                })
                .collect(),
            annotations,
        })
    }

    /// Builds the `config.dump` a checkpoint of this container would carry.
    pub fn config_dump(&self) -> ConfigDump {
        ConfigDump {
            id: self.id.clone(),
            name: self.name.clone(),
            rootfs_image_name: self.image.clone(),
            rootfs_image_ref: String::new(),
            created_time: Some(self.created_at),
        }
    }
}

// =============================================================================
// Active Container Set
// =============================================================================

/// Containers known to the runtime, keyed by full id.
#[derive(Debug, Default)]
pub struct ContainerStore {
    containers: RwLock<HashMap<String, Arc<ReconstructedContainer>>>,
}

impl ContainerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a container, replacing any entry with the same id.
    pub fn add(&self, container: Arc<ReconstructedContainer>) -> Result<()> {
        let mut containers = self
            .containers
            .write()
            .map_err(|_| Error::Internal("container store lock poisoned".to_string()))?;
        containers.insert(container.id.clone(), container);
        Ok(())
    }

    /// Removes a container. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &str) -> Option<Arc<ReconstructedContainer>> {
        self.containers.write().ok()?.remove(id)
    }

    /// Looks up a container by full id.
    pub fn get(&self, id: &str) -> Option<Arc<ReconstructedContainer>> {
        self.containers.read().ok()?.get(id).cloned()
    }

    /// Returns the containers belonging to a sandbox.
    pub fn list_for_sandbox(&self, sandbox_id: &str) -> Vec<Arc<ReconstructedContainer>> {
        self.containers
            .read()
            .map(|c| {
                c.values()
                    .filter(|ctr| ctr.sandbox_id == sandbox_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.containers.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
