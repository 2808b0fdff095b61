//! Metadata files stored in checkpoint archives.
//!
//! These are the JSON documents written next to the engine's checkpoint
//! images. Only the fields this layer reads are modelled; unknown fields are
//! ignored, but every modelled field must have the right shape.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// spec.dump
// =============================================================================

/// The container's runtime spec as dumped at checkpoint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SpecDump {
    /// OCI version of the dumped spec.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub oci_version: String,
    /// Mounts of the checkpointed container.
    pub mounts: Vec<SpecMount>,
    /// Runtime annotations, including the embedded CRI metadata documents.
    pub annotations: HashMap<String, String>,
}

/// One mount entry of a dumped spec.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecMount {
    /// Path inside the container.
    pub destination: String,
    /// Path on the host.
    pub source: String,
    /// Filesystem type.
    #[serde(rename = "type", skip_serializing_if = "String::is_empty")]
    pub mount_type: String,
    /// Raw mount options (`ro`, `rprivate`, ...).
    pub options: Vec<String>,
}

/// Container metadata embedded as JSON under the metadata annotation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerMetadata {
    /// Container name as requested by the orchestrator.
    pub name: String,
    /// Restart attempt counter.
    pub attempt: u32,
}

// =============================================================================
// config.dump
// =============================================================================

/// Internal container configuration as dumped at checkpoint time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConfigDump {
    /// Original container id.
    pub id: String,
    /// Original container name.
    pub name: String,
    /// Image name the container was created from.
    pub rootfs_image_name: String,
    /// Image reference (id) the container was created from.
    pub rootfs_image_ref: String,
    /// When the container was originally created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_time: Option<chrono::DateTime<chrono::Utc>>,
}

// =============================================================================
// pod.options
// =============================================================================

/// Pod manifest listing the member containers of a pod archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PodOptions {
    /// Manifest format version; only 1 is understood.
    #[serde(alias = "Version")]
    pub version: i32,
    /// Member container ids, each stored as `<id>.tar`.
    #[serde(alias = "Containers")]
    pub containers: Vec<String>,
}

// =============================================================================
// pod.dump
// =============================================================================

/// Pod sandbox configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    pub metadata: Option<SandboxMetadata>,
    pub hostname: String,
    pub log_directory: String,
    pub dns_config: Option<DnsConfig>,
    pub port_mappings: Vec<PortMapping>,
    pub labels: HashMap<String, String>,
    pub annotations: HashMap<String, String>,
    /// Platform-specific settings; never carried into a restored sandbox.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linux: Option<serde_json::Value>,
}

/// Identity of a pod sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxMetadata {
    pub name: String,
    pub uid: String,
    pub namespace: String,
    pub attempt: u32,
}

/// DNS settings of a pod sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DnsConfig {
    pub servers: Vec<String>,
    pub searches: Vec<String>,
    pub options: Vec<String>,
}

/// A port published by a pod sandbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortMapping {
    /// 0 = TCP, 1 = UDP, 2 = SCTP.
    pub protocol: i32,
    pub container_port: i32,
    pub host_port: i32,
    pub host_ip: String,
}

impl SandboxConfig {
    /// Checks the fields a sandbox cannot be created without.
    pub fn validate(&self) -> crate::error::Result<()> {
        let metadata = self.metadata.as_ref().ok_or_else(|| {
            crate::error::Error::Validation("PodSandboxConfig.Metadata should not be empty".into())
        })?;
        if metadata.name.is_empty() {
            return Err(crate::error::Error::Validation(
                "PodSandboxConfig.Metadata.Name should not be empty".into(),
            ));
        }
        Ok(())
    }

    /// Returns the sandbox metadata or an empty default.
    pub fn metadata(&self) -> SandboxMetadata {
        self.metadata.clone().unwrap_or_default()
    }
}
