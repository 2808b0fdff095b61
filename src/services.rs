//! Collaborator interfaces consumed by the checkpoint/restore layer.
//!
//! The storage engine, sandbox manager, naming registry, id index and the
//! checkpoint/restore engine are all owned elsewhere in the runtime. This
//! module defines the narrow contracts this layer relies on:
//!
//! ```text
//!                 ┌───────────────────────────────┐
//!                 │   CheckpointRestoreServer     │
//!                 └───────────────┬───────────────┘
//!       ┌──────────────┬──────────┼───────────┬──────────────────┐
//!       ▼              ▼          ▼           ▼                  ▼
//! ContainerStorage SandboxService NameRegistry IdIndex   CheckpointEngine
//!  create/delete    create/get    reserve/     add/delete/  checkpoint/
//!  mount/changes    stop-lock     release      lookup       restore
//! ```
//!
//! None of these are retried by this layer.

use crate::container::ReconstructedContainer;
use crate::error::Result;
use crate::metadata::SandboxConfig;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// =============================================================================
// Storage
// =============================================================================

/// Kind of a filesystem change relative to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// One changed path in a container's root filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Absolute path inside the container (e.g. `/etc/motd`).
    pub path: String,
    pub kind: ChangeKind,
}

/// Container storage: root filesystems and per-container directories.
#[async_trait]
pub trait ContainerStorage: Send + Sync {
    /// Creates on-disk resources for a container and returns its directory.
    async fn create_container(&self, container: &ReconstructedContainer) -> Result<PathBuf>;

    /// Deletes a container's on-disk resources. Deleting a container that
    /// does not exist succeeds.
    async fn delete_container(&self, id: &str) -> Result<()>;

    /// Mounts the container's root filesystem and returns the mountpoint.
    async fn mount(&self, id: &str, read_only: bool) -> Result<PathBuf>;

    /// Unmounts the container's root filesystem.
    async fn unmount(&self, id: &str) -> Result<()>;

    /// Lists root filesystem changes relative to the container's image.
    async fn changes(&self, id: &str) -> Result<Vec<Change>>;
}

// =============================================================================
// Sandboxes
// =============================================================================

/// A pod sandbox as seen by this layer.
///
/// The stop lock is taken in shared mode by everything that adds a container
/// to the sandbox and in exclusive mode by whatever stops it, so a sandbox
/// cannot be stopped while a container is being created in it.
#[derive(Debug)]
pub struct Sandbox {
    id: String,
    config: SandboxConfig,
    stopped: AtomicBool,
    stop_lock: tokio::sync::RwLock<()>,
    containers: RwLock<Vec<String>>,
}

impl Sandbox {
    /// Creates a running sandbox.
    pub fn new(id: impl Into<String>, config: SandboxConfig) -> Self {
        Self {
            id: id.into(),
            config,
            stopped: AtomicBool::new(false),
            stop_lock: tokio::sync::RwLock::new(()),
            containers: RwLock::new(Vec::new()),
        }
    }

    /// Returns the sandbox id.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the configuration the sandbox was created with.
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Returns the lock guarding sandbox stop against container creation.
    pub fn stop_lock(&self) -> &tokio::sync::RwLock<()> {
        &self.stop_lock
    }

    /// Returns true once the sandbox has been stopped.
    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Stops the sandbox, waiting for in-flight container creation.
    pub async fn stop(&self) {
        let _guard = self.stop_lock.write().await;
        self.stopped.store(true, Ordering::Release);
    }

    /// Records a member container. Idempotent.
    pub fn add_container(&self, id: &str) {
        if let Ok(mut containers) = self.containers.write() {
            if !containers.iter().any(|c| c == id) {
                containers.push(id.to_string());
            }
        }
    }

    /// Forgets a member container. Idempotent.
    pub fn remove_container(&self, id: &str) {
        if let Ok(mut containers) = self.containers.write() {
            containers.retain(|c| c != id);
        }
    }

    /// Returns member container ids in the order they were added.
    pub fn containers(&self) -> Vec<String> {
        self.containers
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }
}

/// Creates and looks up pod sandboxes.
#[async_trait]
pub trait SandboxService: Send + Sync {
    /// Creates a sandbox (including its network) and returns its id.
    async fn run_pod_sandbox(&self, config: &SandboxConfig) -> Result<String>;

    /// Looks up a sandbox by id.
    fn get_sandbox(&self, id: &str) -> Result<std::sync::Arc<Sandbox>>;
}

// =============================================================================
// Naming and Id Registries
// =============================================================================

/// Registry of container names. Reservations are exclusive.
pub trait NameRegistry: Send + Sync {
    /// Reserves `name` for `id`. Fails if the name is held by another id.
    fn reserve(&self, name: &str, id: &str) -> Result<()>;

    /// Releases `name`. Releasing an unreserved name is a no-op.
    fn release(&self, name: &str);
}

/// Index of container ids supporting unique-prefix lookup.
pub trait IdIndex: Send + Sync {
    /// Adds a full id. Fails on duplicates or invalid ids.
    fn add(&self, id: &str) -> Result<()>;

    /// Removes a full id. Fails if the id is not present.
    fn delete(&self, id: &str) -> Result<()>;

    /// Resolves a unique prefix to a full id.
    fn get(&self, prefix: &str) -> Result<String>;
}

// =============================================================================
// Checkpoint/Restore Engine
// =============================================================================

/// Options for capturing a container's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointOptions {
    /// Archive to write; `None` keeps the checkpoint in the container directory.
    pub target_file: Option<PathBuf>,
    /// Leave the container running after capture.
    pub keep_running: bool,
    /// Root filesystem diff to include in the archive.
    pub rootfs_diff: Option<PathBuf>,
    /// List of deleted files to include in the archive.
    pub deleted_files: Option<PathBuf>,
    /// Caller-supplied upper bound for the capture.
    pub timeout: Option<Duration>,
}

/// Per-container input to a restore. Built by the restore pipeline, one per
/// container, and handed to the engine unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreOptionDescriptor {
    /// Container to restore.
    pub container_id: String,
    /// Pod the container belongs to, when known.
    pub pod_id: Option<String>,
    /// Archive holding the checkpoint; `None` for a non-exported checkpoint.
    pub archive: Option<PathBuf>,
    /// Keep the checkpoint files after restoring.
    pub keep: bool,
}

/// The state-freeze/thaw mechanism. Opaque to this layer.
#[async_trait]
pub trait CheckpointEngine: Send + Sync {
    /// Captures a container's state and returns the produced artifact.
    async fn checkpoint(&self, container_id: &str, options: &CheckpointOptions)
    -> Result<PathBuf>;

    /// Restores a container and returns its id.
    async fn restore(&self, descriptor: &RestoreOptionDescriptor) -> Result<String>;
}
