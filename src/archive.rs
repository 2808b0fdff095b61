//! Checkpoint archive import and packing.
//!
//! Archives are unpacked into a request-scoped staging directory, the fixed
//! metadata files are decoded, and the staging directory is removed again:
//!
//! - [`ArchiveImporter::import_container`] extracts only what is needed to
//!   rebuild one container (`spec.dump`, `config.dump`) and removes the
//!   staging directory before returning.
//! - [`ArchiveImporter::import_pod`] extracts everything. The member archives
//!   are needed until the engine has restored them, so the staging directory
//!   is owned by the returned [`PodCheckpoint`] and removed when it drops.
//!
//! ## Security
//!
//! Entries with absolute paths or `..` components are rejected before
//! anything is written, and extraction goes through `unpack_in`, which
//! refuses to write outside the staging directory.

use crate::constants::{
    CONFIG_DUMP_FILE, CONTAINER_ARCHIVE_EXT, POD_DUMP_FILE, POD_OPTIONS_FILE,
    SINGLE_CONTAINER_EXCLUDES, SPEC_DUMP_FILE, STAGING_DIR_PREFIX,
};
use crate::error::{Error, Result};
use crate::metadata::{ConfigDump, PodOptions, SandboxConfig, SpecDump};
use flate2::read::GzDecoder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tempfile::TempDir;
use tracing::{debug, error};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

// =============================================================================
// Staging Directories
// =============================================================================

/// A temporary directory removed when dropped, with removal failures logged.
#[derive(Debug)]
pub struct StagingDir {
    dir: Option<TempDir>,
    path: PathBuf,
}

impl StagingDir {
    /// Creates a fresh staging directory under `root`.
    pub fn new_in(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_DIR_PREFIX)
            .tempdir_in(root)
            .map_err(|e| Error::Io(e).context("cannot create temporary staging directory"))?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagingDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                error!(path = %self.path.display(), error = %e, "Could not recursively remove staging directory");
            }
        }
    }
}

// =============================================================================
// Imported Checkpoints
// =============================================================================

/// Metadata of a single-container checkpoint archive.
#[derive(Debug, Clone)]
pub struct ContainerCheckpoint {
    /// Archive the metadata was read from.
    pub archive: PathBuf,
    pub spec: SpecDump,
    pub config: ConfigDump,
}

/// An unpacked pod checkpoint archive.
#[derive(Debug)]
pub struct PodCheckpoint {
    /// Archive the pod was unpacked from.
    pub archive: PathBuf,
    pub options: PodOptions,
    pub sandbox: SandboxConfig,
    staging: StagingDir,
}

impl PodCheckpoint {
    /// Returns the unpacked archive of a member container.
    pub fn member_archive(&self, container_id: &str) -> PathBuf {
        self.staging
            .path()
            .join(format!("{container_id}.{CONTAINER_ARCHIVE_EXT}"))
    }

    /// Returns the staging directory holding the unpacked archive.
    pub fn staging_dir(&self) -> &Path {
        self.staging.path()
    }
}

// =============================================================================
// Importer
// =============================================================================

/// Unpacks checkpoint archives and decodes their metadata files.
#[derive(Debug, Clone)]
pub struct ArchiveImporter {
    staging_root: PathBuf,
}

impl ArchiveImporter {
    /// Creates an importer that stages archives under `staging_root`.
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
        }
    }

    /// Unpacks `archive` into a fresh staging directory.
    ///
    /// With `exclude_for_single_container`, filesystem diffs, network status,
    /// deleted-file lists and the engine's checkpoint images are skipped.
    pub fn import(&self, archive: &Path, exclude_for_single_container: bool) -> Result<StagingDir> {
        let staging = StagingDir::new_in(&self.staging_root)?;
        let excludes: &[&str] = if exclude_for_single_container {
            SINGLE_CONTAINER_EXCLUDES
        } else {
            &[]
        };
        unpack(archive, staging.path(), excludes)?;
        debug!(
            archive = %archive.display(),
            staging = %staging.path().display(),
            "Unpacked checkpoint"
        );
        Ok(staging)
    }

    /// Reads the metadata of a single-container archive.
    ///
    /// The staging directory is gone by the time this returns.
    pub fn import_container(&self, archive: &Path) -> Result<ContainerCheckpoint> {
        let staging = self.import(archive, true)?;
        let spec: SpecDump = read_json_file(staging.path(), SPEC_DUMP_FILE)?;
        let config: ConfigDump = read_json_file(staging.path(), CONFIG_DUMP_FILE)?;
        Ok(ContainerCheckpoint {
            archive: archive.to_path_buf(),
            spec,
            config,
        })
    }

    /// Unpacks a pod archive and reads `pod.options` and `pod.dump`.
    pub fn import_pod(&self, archive: &Path) -> Result<PodCheckpoint> {
        let staging = self.import(archive, false)?;
        let options: PodOptions = read_json_file(staging.path(), POD_OPTIONS_FILE)?;
        let sandbox: SandboxConfig = read_json_file(staging.path(), POD_DUMP_FILE)?;
        Ok(PodCheckpoint {
            archive: archive.to_path_buf(),
            options,
            sandbox,
            staging,
        })
    }
}

fn open_archive(path: &Path) -> Result<Box<dyn Read>> {
    let file = File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            Error::NotFound {
                kind: "checkpoint archive",
                id: path.display().to_string(),
                reason: e.to_string(),
            }
        } else {
            Error::Import {
                file: path.display().to_string(),
                reason: format!("failed to open checkpoint archive for import: {e}"),
            }
        }
    })?;

    let mut reader = BufReader::new(file);
    let compressed = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
    if compressed {
        Ok(Box::new(GzDecoder::new(reader)))
    } else {
        Ok(Box::new(reader))
    }
}

fn unpack(path: &Path, dest: &Path, excludes: &[&str]) -> Result<()> {
    let unpack_err = |e: std::io::Error| Error::Unpack {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut archive = Archive::new(open_archive(path)?);
    for entry in archive.entries().map_err(unpack_err)? {
        let mut entry = entry.map_err(unpack_err)?;
        let entry_path = entry.path().map_err(unpack_err)?.into_owned();

        // SECURITY: Check for path traversal
        if entry_path.is_absolute()
            || entry_path
                .components()
                .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(Error::Unpack {
                path: path.to_path_buf(),
                reason: format!("path traversal detected: {}", entry_path.display()),
            });
        }

        let top = entry_path.components().find_map(|c| match c {
            Component::Normal(name) => Some(name),
            _ => None,
        });
        if let Some(top) = top {
            if excludes.iter().any(|e| top == OsStr::new(e)) {
                continue;
            }
        }

        entry.unpack_in(dest).map_err(unpack_err)?;
    }
    Ok(())
}

/// Decodes a JSON metadata file from an unpacked archive.
pub fn read_json_file<T: DeserializeOwned>(dir: &Path, name: &str) -> Result<T> {
    let path = dir.join(name);
    let data = fs::read(&path).map_err(|e| Error::Import {
        file: name.to_string(),
        reason: format!("failed to read {}: {e}", path.display()),
    })?;
    serde_json::from_slice(&data).map_err(|e| Error::Import {
        file: name.to_string(),
        reason: format!("failed to unmarshal: {e}"),
    })
}

// =============================================================================
// Packing
// =============================================================================

/// Writes a value as a JSON metadata file.
pub fn write_json_file<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value)?;
    fs::write(dir.join(name), data)?;
    Ok(())
}

/// Packs the contents of `dir` into an uncompressed tar at `dest`.
///
/// The archive is written next to `dest` and renamed into place, so a failed
/// export never leaves a truncated archive behind.
pub fn pack_directory(dir: &Path, dest: &Path) -> Result<()> {
    let tmp = dest.with_extension("tmp");
    let result = (|| -> std::io::Result<()> {
        let file = File::create(&tmp)?;
        let mut builder = tar::Builder::new(file);
        builder.follow_symlinks(false);
        builder.append_dir_all(".", dir)?;
        builder.into_inner()?.sync_all()?;
        fs::rename(&tmp, dest)
    })();

    if let Err(e) = result {
        let _ = fs::remove_file(&tmp);
        return Err(Error::Io(e).context(format!("writing checkpoint archive {}", dest.display())));
    }
    Ok(())
}
