//! Pod reconstruction from a pod checkpoint archive.
//!
//! A pod archive carries `pod.options` (format version and member ids),
//! `pod.dump` (the sandbox configuration) and one `<id>.tar` per member.
//! The sandbox is re-created first; each member is then rebuilt into it and
//! yields one [`RestoreOptionDescriptor`] for the engine.
//!
//! Members already rebuilt are not undone when a later member fails. Each
//! member's own reconstruction is still all-or-nothing, and the re-created
//! sandbox is left to the caller.

use crate::archive::{ArchiveImporter, PodCheckpoint};
use crate::constants::{POD_OPTIONS_FILE, POD_OPTIONS_VERSION};
use crate::context::RequestContext;
use crate::error::{Error, Result, ResultExt};
use crate::metadata::SandboxConfig;
use crate::reconstruct::ContainerReconstructor;
use crate::request::RestoreRequest;
use crate::services::{RestoreOptionDescriptor, SandboxService};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

/// Builds the request for re-creating a dumped sandbox.
///
/// Only hostname, log directory, metadata, DNS and port mappings are carried
/// over. Labels and annotations come from the caller's overrides, replacing
/// the dumped maps entirely.
pub fn sandbox_request(
    dump: &SandboxConfig,
    labels: Option<&HashMap<String, String>>,
    annotations: Option<&HashMap<String, String>>,
) -> SandboxConfig {
    SandboxConfig {
        metadata: dump.metadata.clone(),
        hostname: dump.hostname.clone(),
        log_directory: dump.log_directory.clone(),
        dns_config: dump.dns_config.clone(),
        port_mappings: dump.port_mappings.clone(),
        labels: labels.cloned().unwrap_or_default(),
        annotations: annotations.cloned().unwrap_or_default(),
        linux: None,
    }
}

fn check_manifest(pod: &PodCheckpoint) -> Result<()> {
    if pod.options.version != POD_OPTIONS_VERSION {
        return Err(Error::Import {
            file: POD_OPTIONS_FILE.to_string(),
            reason: format!(
                "cannot import Pod Checkpoint archive version {}",
                pod.options.version
            ),
        });
    }

    let mut seen = HashSet::new();
    for id in &pod.options.containers {
        if !seen.insert(id.as_str()) {
            return Err(Error::Import {
                file: POD_OPTIONS_FILE.to_string(),
                reason: format!("container {id} is listed more than once"),
            });
        }
    }
    Ok(())
}

/// Re-creates pods from pod checkpoints.
#[derive(Clone)]
pub struct PodReconstructor {
    sandboxes: Arc<dyn SandboxService>,
    importer: ArchiveImporter,
    containers: ContainerReconstructor,
}

impl PodReconstructor {
    pub fn new(
        sandboxes: Arc<dyn SandboxService>,
        importer: ArchiveImporter,
        containers: ContainerReconstructor,
    ) -> Self {
        Self {
            sandboxes,
            importer,
            containers,
        }
    }

    /// Creates the sandbox and rebuilds every member container.
    ///
    /// Returns the new sandbox id and one descriptor per member, in manifest
    /// order. The descriptors point into `pod`'s staging directory, so `pod`
    /// must outlive the engine restore.
    pub async fn reconstruct(
        &self,
        ctx: &RequestContext,
        pod: &PodCheckpoint,
        req: &RestoreRequest,
    ) -> Result<(String, Vec<RestoreOptionDescriptor>)> {
        check_manifest(pod)?;

        let config = sandbox_request(&pod.sandbox, req.labels.as_ref(), req.annotations.as_ref());
        config.validate()?;

        let pod_id = self
            .sandboxes
            .run_pod_sandbox(&config)
            .await
            .context("failed to create pod sandbox")?;
        info!(pod = %pod_id, archive = %pod.archive.display(), "Re-created pod sandbox");

        let mut descriptors = Vec::with_capacity(pod.options.containers.len());
        for member in &pod.options.containers {
            let archive = pod.member_archive(member);
            let checkpoint = self
                .importer
                .import_container(&archive)
                .with_context(|| format!("failed to import container {member}"))?;
            let container = self
                .containers
                .reconstruct(ctx, &checkpoint, Some(pod_id.as_str()), &req.mount_remap)
                .await
                .with_context(|| format!("failed to restore container {member} into pod {pod_id}"))?;

            descriptors.push(RestoreOptionDescriptor {
                container_id: container.id.clone(),
                pod_id: Some(pod_id.clone()),
                archive: Some(archive),
                keep: req.keep,
            });
        }

        Ok((pod_id, descriptors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{DnsConfig, PortMapping, SandboxMetadata};

    fn dump() -> SandboxConfig {
        SandboxConfig {
            metadata: Some(SandboxMetadata {
                name: "pod".to_string(),
                uid: "uid".to_string(),
                namespace: "ns".to_string(),
                attempt: 1,
            }),
            hostname: "host".to_string(),
            log_directory: "/var/log/pods/x".to_string(),
            dns_config: Some(DnsConfig {
                servers: vec!["10.0.0.10".to_string()],
                ..Default::default()
            }),
            port_mappings: vec![PortMapping {
                container_port: 80,
                host_port: 8080,
                ..Default::default()
            }],
            labels: HashMap::from([("old".to_string(), "label".to_string())]),
            annotations: HashMap::from([("old".to_string(), "annotation".to_string())]),
            linux: Some(serde_json::json!({"cgroup_parent": "/kubepods"})),
        }
    }

    #[test]
    fn test_sandbox_request_copies_only_known_fields() {
        let config = sandbox_request(&dump(), None, None);
        assert_eq!(config.hostname, "host");
        assert_eq!(config.metadata().name, "pod");
        assert_eq!(config.port_mappings[0].host_port, 8080);
        assert_eq!(config.dns_config.unwrap().servers, vec!["10.0.0.10"]);
        assert!(config.labels.is_empty());
        assert!(config.annotations.is_empty());
        assert!(config.linux.is_none());
    }

    #[test]
    fn test_sandbox_request_overrides_replace_maps() {
        let labels = HashMap::from([("new".to_string(), "label".to_string())]);
        let config = sandbox_request(&dump(), Some(&labels), None);
        assert_eq!(config.labels, labels);
        assert!(!config.labels.contains_key("old"));
    }
}
