//! Extended runtime interface.
//!
//! Carries everything v1 does plus pod scope, mount remapping, sandbox
//! label/annotation overrides and the `keep` flag.

use crate::request::{CheckpointRequest, RestoreRequest, RestoreResponse};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointRestoreOptions {
    pub archive: String,
    /// Keep checkpoint files after a restore.
    pub keep: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointContainerOptions {
    pub common_options: Option<CheckpointRestoreOptions>,
    pub leave_running: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointContainerRequest {
    /// Container id, unique prefix, or pod sandbox id.
    pub id: String,
    pub options: Option<CheckpointContainerOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointContainerResponse {}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreContainerOptions {
    pub pod_sandbox_id: String,
    pub common_options: Option<CheckpointRestoreOptions>,
    /// Host source path → replacement host source path.
    pub change_mounts: HashMap<String, String>,
    pub labels: Option<HashMap<String, String>>,
    pub annotations: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreContainerRequest {
    pub id: String,
    pub options: Option<RestoreContainerOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestoreContainerResponse {
    pub id: String,
    pub pod: bool,
    pub restored_containers: Vec<String>,
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

pub fn checkpoint_request(req: &CheckpointContainerRequest) -> CheckpointRequest {
    let options = req.options.clone().unwrap_or_default();
    CheckpointRequest {
        target_id: req.id.clone(),
        archive: options
            .common_options
            .and_then(|c| non_empty(&c.archive))
            .map(PathBuf::from),
        require_archive: false,
        keep_running: options.leave_running,
        timeout: None,
    }
}

pub fn restore_request(req: &RestoreContainerRequest) -> RestoreRequest {
    let options = req.options.clone().unwrap_or_default();
    let common = options.common_options.unwrap_or_default();

    RestoreRequest {
        container_id: non_empty(&req.id),
        pod_id: non_empty(&options.pod_sandbox_id),
        archive: non_empty(&common.archive).map(PathBuf::from),
        keep: common.keep,
        mount_remap: options.change_mounts,
        labels: options.labels,
        annotations: options.annotations,
    }
}

pub fn restore_response(resp: &RestoreResponse) -> RestoreContainerResponse {
    RestoreContainerResponse {
        id: resp.id.clone(),
        pod: resp.pod,
        restored_containers: resp.restored_containers.clone(),
    }
}
