//! Checkpoint export.
//!
//! A checkpoint target is either a container (id or unique prefix) or a pod
//! sandbox. Containers are handed straight to the engine. Pods are exported
//! member by member into a staging directory, which is then packed into the
//! destination archive:
//!
//! ```text
//! <destination>.tar
//! ├── pod.options        {"version":1,"containers":[...]}
//! ├── pod.dump           sandbox configuration
//! ├── <id-1>.tar         engine checkpoint + rootfs-diff.tar + deleted.files
//! └── <id-2>.tar
//! ```

use crate::archive::{StagingDir, pack_directory, write_json_file};
use crate::config::CheckpointRestoreConfig;
use crate::constants::{
    CONTAINER_ARCHIVE_EXT, DELETED_FILES_FILE, POD_DUMP_FILE, POD_OPTIONS_FILE,
    POD_OPTIONS_VERSION, ROOTFS_DIFF_TAR,
};
use crate::container::{ContainerStore, ReconstructedContainer};
use crate::error::{Error, ErrorKind, Result, ResultExt};
use crate::metadata::PodOptions;
use crate::request::CheckpointRequest;
use crate::services::{
    Change, ChangeKind, CheckpointEngine, CheckpointOptions, ContainerStorage, IdIndex, Sandbox,
    SandboxService,
};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a checkpoint request resolved to.
enum Target {
    Container(Arc<ReconstructedContainer>),
    Pod(Arc<Sandbox>),
}

/// Checks that the destination's parent directory exists.
///
/// A bare file name refers to the current directory.
pub fn validate_destination(dest: &Path) -> Result<()> {
    let parent = match dest.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let meta = fs::metadata(parent).map_err(|e| {
        Error::Validation(format!(
            "could not access checkpoint destination directory {}: {e}",
            parent.display()
        ))
    })?;
    if !meta.is_dir() {
        return Err(Error::Validation(format!(
            "checkpoint destination {} is not a directory",
            parent.display()
        )));
    }
    Ok(())
}

/// Writes `rootfs-diff.tar` and `deleted.files` for a set of changes.
///
/// Added and modified paths are archived from `mountpoint`; deleted paths
/// are listed. Returns the paths of both files.
pub fn write_rootfs_diff(
    mountpoint: &Path,
    changes: &[Change],
    dir: &Path,
) -> Result<(PathBuf, PathBuf)> {
    let diff_path = dir.join(ROOTFS_DIFF_TAR);
    let mut builder = tar::Builder::new(File::create(&diff_path)?);
    builder.follow_symlinks(false);

    let mut deleted = Vec::new();
    for change in changes {
        let rel = change.path.trim_start_matches('/');
        if rel.is_empty() {
            continue;
        }
        match change.kind {
            ChangeKind::Deleted => deleted.push(change.path.clone()),
            ChangeKind::Added | ChangeKind::Modified => {
                let src = mountpoint.join(rel);
                // Changes may list paths removed again since.
                if fs::symlink_metadata(&src).is_err() {
                    continue;
                }
                builder.append_path_with_name(&src, rel)?;
            }
        }
    }
    builder.into_inner()?.sync_all()?;

    write_json_file(dir, DELETED_FILES_FILE, &deleted)?;
    Ok((diff_path, dir.join(DELETED_FILES_FILE)))
}

/// Captures containers and pods.
#[derive(Clone)]
pub struct CheckpointExporter {
    config: CheckpointRestoreConfig,
    containers: Arc<ContainerStore>,
    ids: Arc<dyn IdIndex>,
    sandboxes: Arc<dyn SandboxService>,
    storage: Arc<dyn ContainerStorage>,
    engine: Arc<dyn CheckpointEngine>,
}

impl CheckpointExporter {
    pub fn new(
        config: CheckpointRestoreConfig,
        containers: Arc<ContainerStore>,
        ids: Arc<dyn IdIndex>,
        sandboxes: Arc<dyn SandboxService>,
        storage: Arc<dyn ContainerStorage>,
        engine: Arc<dyn CheckpointEngine>,
    ) -> Self {
        Self {
            config,
            containers,
            ids,
            sandboxes,
            storage,
            engine,
        }
    }

    /// Checkpoints a container or a pod and returns the produced artifact.
    ///
    /// Validation happens in a fixed order (feature gate, target, destination)
    /// and nothing is captured if any of it fails. A missing destination is
    /// only accepted for a container when `require_archive` is unset.
    pub async fn checkpoint(&self, req: &CheckpointRequest) -> Result<PathBuf> {
        if !self.config.enabled {
            return Err(Error::Validation(
                "checkpoint/restore support not available".to_string(),
            ));
        }

        let target = self.resolve(&req.target_id)?;

        let dest = req
            .archive
            .as_ref()
            .filter(|p| !p.as_os_str().is_empty());
        match dest {
            Some(dest) => validate_destination(dest)?,
            None if req.require_archive => {
                return Err(Error::Validation(
                    "checkpoint archive location needs to be set".to_string(),
                ));
            }
            None => {}
        }

        match target {
            Target::Container(container) => {
                info!(container = %container.id, "Checkpointing container");
                let options = CheckpointOptions {
                    target_file: dest.cloned(),
                    keep_running: req.keep_running,
                    timeout: req.timeout,
                    ..Default::default()
                };
                let artifact = self
                    .engine
                    .checkpoint(&container.id, &options)
                    .await
                    .with_context(|| format!("failed to checkpoint container {}", container.id))?;
                info!(container = %container.id, artifact = %artifact.display(), "Checkpointed container");
                Ok(artifact)
            }
            Target::Pod(sandbox) => {
                let dest = dest.ok_or_else(|| {
                    Error::Validation("Pod checkpointing requires a destination file".to_string())
                })?;
                self.checkpoint_pod(&sandbox, dest, req).await?;
                Ok(dest.clone())
            }
        }
    }

    fn resolve(&self, target_id: &str) -> Result<Target> {
        let not_found = |e: Error| e.context(format!("could not find container {target_id:?}"));

        match self.ids.get(target_id) {
            Ok(id) => self
                .containers
                .get(&id)
                .map(Target::Container)
                .ok_or_else(|| not_found(Error::container_not_found(&id, "not in the active set"))),
            Err(e) if e.kind() == ErrorKind::NotFound => self
                .sandboxes
                .get_sandbox(target_id)
                .map(Target::Pod)
                .map_err(|_| not_found(e)),
            Err(e) => Err(e),
        }
    }

    async fn checkpoint_pod(
        &self,
        sandbox: &Sandbox,
        dest: &Path,
        req: &CheckpointRequest,
    ) -> Result<()> {
        info!(pod = %sandbox.id(), destination = %dest.display(), "Checkpointing pod");
        let staging = StagingDir::new_in(&self.config.staging_root())?;
        let members = sandbox.containers();

        for id in &members {
            let diff = StagingDir::new_in(&self.config.staging_root())?;
            let (rootfs_diff, deleted_files) = self
                .export_rootfs_diff(id, diff.path())
                .await
                .with_context(|| format!("failed to write file system changes of container {id}"))?;

            let options = CheckpointOptions {
                target_file: Some(staging.path().join(format!("{id}.{CONTAINER_ARCHIVE_EXT}"))),
                keep_running: req.keep_running,
                rootfs_diff: Some(rootfs_diff),
                deleted_files: Some(deleted_files),
                timeout: req.timeout,
            };
            self.engine
                .checkpoint(id, &options)
                .await
                .with_context(|| format!("failed to checkpoint container {id}"))?;
            debug!(pod = %sandbox.id(), container = %id, "Checkpointed pod member");
        }

        write_json_file(
            staging.path(),
            POD_OPTIONS_FILE,
            &PodOptions {
                version: POD_OPTIONS_VERSION,
                containers: members,
            },
        )?;
        write_json_file(staging.path(), POD_DUMP_FILE, sandbox.config())?;
        pack_directory(staging.path(), dest)?;

        info!(pod = %sandbox.id(), destination = %dest.display(), "Checkpointed pod");
        Ok(())
    }

    async fn export_rootfs_diff(&self, id: &str, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        self.diff_mounted(id, dir)
            .await
            .with_context(|| format!("error exporting root file-system diff for {id:?}"))
    }

    async fn diff_mounted(&self, id: &str, dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let mountpoint = self.storage.mount(id, true).await?;
        let exported = match self.storage.changes(id).await {
            Ok(changes) => write_rootfs_diff(&mountpoint, &changes, dir),
            Err(e) => Err(e),
        };
        if let Err(e) = self.storage.unmount(id).await {
            warn!(container = %id, error = %e, "Failed to unmount container root filesystem");
        }
        exported
    }
}
