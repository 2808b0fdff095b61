//! # Checkpoint Archive Constants
//!
//! Fixed file names inside checkpoint archives, the annotation keys that
//! carry container metadata through `spec.dump`, and the mount destinations
//! that are never carried over into a restored container.
//!
//! ## Archive Layout
//!
//! ```text
//! container archive              pod archive
//! ─────────────────              ───────────
//! spec.dump                      pod.options
//! config.dump                    pod.dump
//! checkpoint/      (engine)      <containerID>.tar  (one per member)
//! rootfs-diff.tar  (storage)
//! deleted.files    (storage)
//! network.status
//! ```

// =============================================================================
// Archive File Names
// =============================================================================

/// Dumped runtime spec of a container, including its annotations.
pub const SPEC_DUMP_FILE: &str = "spec.dump";

/// Dumped internal container configuration (id, name, image).
pub const CONFIG_DUMP_FILE: &str = "config.dump";

/// Pod manifest: `{version, containers}`.
pub const POD_OPTIONS_FILE: &str = "pod.options";

/// Dumped pod sandbox configuration.
pub const POD_DUMP_FILE: &str = "pod.dump";

/// Root filesystem changes exported by the storage layer.
pub const ROOTFS_DIFF_TAR: &str = "rootfs-diff.tar";

/// List of files deleted from the root filesystem.
pub const DELETED_FILES_FILE: &str = "deleted.files";

/// Network status captured at checkpoint time.
pub const NETWORK_STATUS_FILE: &str = "network.status";

/// Directory holding the engine's checkpoint images.
pub const CHECKPOINT_DIRECTORY: &str = "checkpoint";

/// Extension of per-container archives inside a pod archive.
pub const CONTAINER_ARCHIVE_EXT: &str = "tar";

/// Top-level entries skipped when only a container's metadata is needed.
pub const SINGLE_CONTAINER_EXCLUDES: &[&str] = &[
    "artifacts",
    "ctr.log",
    ROOTFS_DIFF_TAR,
    NETWORK_STATUS_FILE,
    DELETED_FILES_FILE,
    CHECKPOINT_DIRECTORY,
];

/// The only pod manifest version this layer understands.
pub const POD_OPTIONS_VERSION: i32 = 1;

/// Prefix of staging directories.
pub const STAGING_DIR_PREFIX: &str = "checkpoint";

// =============================================================================
// Annotation Keys
// =============================================================================

/// Container metadata (`{name, attempt}`) as embedded JSON.
pub const ANNOTATION_METADATA: &str = "io.kubernetes.cri-o.Metadata";

/// User annotations as embedded JSON.
pub const ANNOTATION_ANNOTATIONS: &str = "io.kubernetes.cri-o.Annotations";

/// User labels as embedded JSON.
pub const ANNOTATION_LABELS: &str = "io.kubernetes.cri-o.Labels";

/// Id of the sandbox the container was checkpointed out of.
pub const ANNOTATION_SANDBOX_ID: &str = "io.kubernetes.cri-o.SandboxID";

/// Identifies the system that produced the checkpoint.
pub const ANNOTATION_CONTAINER_MANAGER: &str = "io.container.manager";

/// Container manager value written by the native checkpoint tool.
pub const CONTAINER_MANAGER_LIBPOD: &str = "libpod";

// =============================================================================
// Mounts
// =============================================================================

/// Mount destinations the runtime recreates itself on restore.
pub const IGNORED_MOUNT_DESTINATIONS: &[&str] = &[
    "/proc",
    "/dev",
    "/dev/pts",
    "/dev/mqueue",
    "/sys",
    "/sys/fs/cgroup",
    "/dev/shm",
    "/etc/resolv.conf",
    "/etc/hostname",
    "/run/secrets",
    "/run/.containerenv",
];

/// Returns true if a mount destination is never propagated on restore.
pub fn is_ignored_mount(destination: &str) -> bool {
    IGNORED_MOUNT_DESTINATIONS.contains(&destination)
}

/// Length of a full container id in hex characters.
pub const CONTAINER_ID_LEN: usize = 64;

/// Prefix of generated container names.
pub const CONTAINER_NAME_PREFIX: &str = "k8s";
