//! Stable runtime interface (v1).

use crate::request::{CheckpointRequest, RestoreRequest, RestoreResponse};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointContainerRequest {
    /// Container id or unique prefix.
    pub container_id: String,
    /// Destination archive.
    pub location: String,
    /// Seconds to allow for the checkpoint; zero means no limit.
    pub timeout: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointContainerResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointRestoreOptions {
    pub archive_location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreContainerOptions {
    pub pod_sandbox_id: String,
    pub common_options: Option<CheckpointRestoreOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreContainerRequest {
    pub container_id: String,
    pub options: Option<RestoreContainerOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreContainerResponse {
    pub id: String,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Maps a v1 checkpoint request.
///
/// v1 checkpoints serve forensic capture, so the container keeps running
/// and the result always lands in an archive.
pub fn checkpoint_request(req: &CheckpointContainerRequest) -> CheckpointRequest {
    CheckpointRequest {
        target_id: req.container_id.clone(),
        archive: non_empty(&req.location).map(PathBuf::from),
        require_archive: true,
        keep_running: true,
        timeout: u64::try_from(req.timeout)
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs),
    }
}

/// Maps a v1 restore request. v1 carries no overrides.
pub fn restore_request(req: &RestoreContainerRequest) -> RestoreRequest {
    let options = req.options.clone().unwrap_or_default();
    let archive = options
        .common_options
        .and_then(|c| non_empty(&c.archive_location))
        .map(PathBuf::from);

    RestoreRequest {
        container_id: non_empty(&req.container_id),
        pod_id: non_empty(&options.pod_sandbox_id),
        archive,
        ..Default::default()
    }
}

/// Maps an internal restore response; v1 only reports the id.
pub fn restore_response(resp: &RestoreResponse) -> RestoreContainerResponse {
    RestoreContainerResponse {
        id: resp.id.clone(),
    }
}
