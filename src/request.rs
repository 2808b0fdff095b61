//! Internal request model and restore-mode classification.
//!
//! Both wire generations (see [`crate::api`]) are mapped into these types
//! before anything else runs; nothing below this module sees a wire type.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// A request to restore a container or a whole pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreRequest {
    /// Container to restore in place (direct restore only).
    pub container_id: Option<String>,
    /// Existing pod to import into.
    pub pod_id: Option<String>,
    /// Checkpoint archive to import from.
    pub archive: Option<PathBuf>,
    /// Keep the checkpoint files after a successful restore.
    pub keep: bool,
    /// Host source path → replacement host source path.
    pub mount_remap: HashMap<String, String>,
    /// Labels for a re-created pod sandbox (replaces the dumped labels).
    pub labels: Option<HashMap<String, String>>,
    /// Annotations for a re-created pod sandbox (replaces the dumped annotations).
    pub annotations: Option<HashMap<String, String>>,
}

/// A request to checkpoint a container or a pod.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointRequest {
    /// Container id (possibly a unique prefix) or pod sandbox id.
    pub target_id: String,
    /// Destination archive; required for pods.
    pub archive: Option<PathBuf>,
    /// Reject the request when `archive` is unset, even for a container.
    pub require_archive: bool,
    /// Leave the container running after its state is captured.
    pub keep_running: bool,
    /// Upper bound handed to the engine, if the caller set one.
    pub timeout: Option<Duration>,
}

/// Outcome of a restore.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreResponse {
    /// Restored container id, or the pod id when restoring into or as a pod.
    pub id: String,
    /// True when a whole pod was re-created.
    pub pod: bool,
    /// Ids of the restored containers, in restore order.
    pub restored_containers: Vec<String>,
}

/// How a [`RestoreRequest`] is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreMode {
    /// Restore a non-exported checkpoint in place. The original sandbox must
    /// still exist.
    DirectRestore {
        container_id: String,
        pod_id: Option<String>,
    },
    /// Import a single container from an archive into an existing pod.
    ImportIntoExistingPod { archive: PathBuf, pod_id: String },
    /// Re-create a whole pod from a pod archive.
    ImportAsNewPod { archive: PathBuf },
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Classifies a restore request. Pure; performs no I/O.
pub fn classify(req: &RestoreRequest) -> Result<RestoreMode> {
    let archive = req
        .archive
        .as_ref()
        .filter(|p| !p.as_os_str().is_empty());
    let pod_id = non_empty(&req.pod_id);

    match (archive, pod_id) {
        (Some(archive), Some(pod_id)) => Ok(RestoreMode::ImportIntoExistingPod {
            archive: archive.clone(),
            pod_id: pod_id.to_string(),
        }),
        (Some(archive), None) => Ok(RestoreMode::ImportAsNewPod {
            archive: archive.clone(),
        }),
        (None, pod_id) => match non_empty(&req.container_id) {
            Some(container_id) => Ok(RestoreMode::DirectRestore {
                container_id: container_id.to_string(),
                pod_id: pod_id.map(str::to_string),
            }),
            None => Err(Error::Validation(
                "nothing to restore: neither a container id nor a checkpoint archive was given"
                    .to_string(),
            )),
        },
    }
}
