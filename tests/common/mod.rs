//! In-memory collaborators and archive fixtures shared by integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use magikrestore::metadata::{
    ConfigDump, SandboxConfig, SandboxMetadata, SpecDump, SpecMount,
};
use magikrestore::{
    ANNOTATION_ANNOTATIONS, ANNOTATION_LABELS, ANNOTATION_METADATA, ANNOTATION_SANDBOX_ID,
    Change, CheckpointEngine, CheckpointOptions, CheckpointRestoreConfig, CheckpointRestoreServer,
    Collaborators, ContainerStorage, ContainerStore, Error, IdIndex, NameRegistrar,
    ReconstructedContainer, RestoreOptionDescriptor, Result, Sandbox, SandboxService, TruncIndex,
};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Storage
// =============================================================================

#[derive(Default)]
pub struct FakeStorage {
    root: PathBuf,
    created: Mutex<HashSet<String>>,
    changes: Mutex<HashMap<String, Vec<Change>>>,
    pub fail_create: AtomicBool,
    pub fail_changes: AtomicBool,
    pub mounted: AtomicUsize,
    pub unmounted: AtomicUsize,
}

impl FakeStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.created.lock().unwrap().contains(id)
    }

    pub fn len(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn rootfs(&self, id: &str) -> PathBuf {
        self.root.join(id).join("rootfs")
    }

    pub fn set_changes(&self, id: &str, changes: Vec<Change>) {
        self.changes.lock().unwrap().insert(id.to_string(), changes);
    }
}

#[async_trait]
impl ContainerStorage for FakeStorage {
    async fn create_container(&self, container: &ReconstructedContainer) -> Result<PathBuf> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::Reconstruction {
                id: container.id.clone(),
                reason: "injected storage failure".to_string(),
            });
        }
        let dir = self.root.join(&container.id);
        fs::create_dir_all(dir.join("rootfs"))?;
        self.created.lock().unwrap().insert(container.id.clone());
        Ok(dir)
    }

    async fn delete_container(&self, id: &str) -> Result<()> {
        self.created.lock().unwrap().remove(id);
        let _ = fs::remove_dir_all(self.root.join(id));
        Ok(())
    }

    async fn mount(&self, id: &str, _read_only: bool) -> Result<PathBuf> {
        self.mounted.fetch_add(1, Ordering::SeqCst);
        let rootfs = self.rootfs(id);
        fs::create_dir_all(&rootfs)?;
        Ok(rootfs)
    }

    async fn unmount(&self, _id: &str) -> Result<()> {
        self.unmounted.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn changes(&self, id: &str) -> Result<Vec<Change>> {
        if self.fail_changes.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected changes failure".to_string()));
        }
        Ok(self
            .changes
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

// =============================================================================
// Sandboxes
// =============================================================================

#[derive(Default)]
pub struct FakeSandboxes {
    sandboxes: Mutex<HashMap<String, Arc<Sandbox>>>,
    pub created: AtomicUsize,
    pub lookups: AtomicUsize,
}

impl FakeSandboxes {
    pub fn add(&self, id: &str, config: SandboxConfig) -> Arc<Sandbox> {
        let sandbox = Arc::new(Sandbox::new(id, config));
        self.sandboxes
            .lock()
            .unwrap()
            .insert(id.to_string(), sandbox.clone());
        sandbox
    }

    pub fn get(&self, id: &str) -> Option<Arc<Sandbox>> {
        self.sandboxes.lock().unwrap().get(id).cloned()
    }
}

#[async_trait]
impl SandboxService for FakeSandboxes {
    async fn run_pod_sandbox(&self, config: &SandboxConfig) -> Result<String> {
        let n = self.created.fetch_add(1, Ordering::SeqCst);
        let id = format!("restored-pod-{n}");
        self.add(&id, config.clone());
        Ok(id)
    }

    fn get_sandbox(&self, id: &str) -> Result<Arc<Sandbox>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.get(id)
            .ok_or_else(|| Error::sandbox_not_found(id, "no such sandbox"))
    }
}

// =============================================================================
// Id Index
// =============================================================================

#[derive(Default)]
pub struct FakeIds {
    pub inner: TruncIndex,
    pub fail_add: AtomicBool,
}

impl IdIndex for FakeIds {
    fn add(&self, id: &str) -> Result<()> {
        if self.fail_add.load(Ordering::SeqCst) {
            return Err(Error::Internal("injected id index failure".to_string()));
        }
        self.inner.add(id)
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.inner.delete(id)
    }

    fn get(&self, prefix: &str) -> Result<String> {
        self.inner.get(prefix)
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Records calls; checkpoints write a container archive built from the
/// container's current metadata.
pub struct FakeEngine {
    containers: Arc<ContainerStore>,
    pub restores: Mutex<Vec<RestoreOptionDescriptor>>,
    pub checkpoints: Mutex<Vec<(String, CheckpointOptions)>>,
    /// Zero-based index of the restore call that fails.
    pub fail_restore_at: Mutex<Option<usize>>,
}

impl FakeEngine {
    pub fn new(containers: Arc<ContainerStore>) -> Self {
        Self {
            containers,
            restores: Mutex::new(Vec::new()),
            checkpoints: Mutex::new(Vec::new()),
            fail_restore_at: Mutex::new(None),
        }
    }

    pub fn restore_calls(&self) -> usize {
        self.restores.lock().unwrap().len()
    }

    pub fn checkpoint_calls(&self) -> usize {
        self.checkpoints.lock().unwrap().len()
    }
}

#[async_trait]
impl CheckpointEngine for FakeEngine {
    async fn checkpoint(&self, container_id: &str, options: &CheckpointOptions) -> Result<PathBuf> {
        self.checkpoints
            .lock()
            .unwrap()
            .push((container_id.to_string(), options.clone()));

        let Some(target) = &options.target_file else {
            return Ok(PathBuf::from(format!("/var/lib/checkpoints/{container_id}")));
        };
        let container = self
            .containers
            .get(container_id)
            .ok_or_else(|| Error::container_not_found(container_id, "unknown to engine"))?;

        let mut files = vec![
            (
                "spec.dump".to_string(),
                serde_json::to_vec(&container.spec_dump()?)?,
            ),
            (
                "config.dump".to_string(),
                serde_json::to_vec(&container.config_dump())?,
            ),
        ];
        if let Some(diff) = &options.rootfs_diff {
            files.push(("rootfs-diff.tar".to_string(), fs::read(diff)?));
        }
        if let Some(deleted) = &options.deleted_files {
            files.push(("deleted.files".to_string(), fs::read(deleted)?));
        }
        files.push(("checkpoint/pages-1.img".to_string(), b"pages".to_vec()));
        write_tar(target, &files);
        Ok(target.clone())
    }

    async fn restore(&self, descriptor: &RestoreOptionDescriptor) -> Result<String> {
        let mut restores = self.restores.lock().unwrap();
        let index = restores.len();
        restores.push(descriptor.clone());
        if *self.fail_restore_at.lock().unwrap() == Some(index) {
            return Err(Error::Engine {
                id: descriptor.container_id.clone(),
                reason: "injected restore failure".to_string(),
            });
        }
        Ok(descriptor.container_id.clone())
    }
}

// =============================================================================
// Harness
// =============================================================================

pub struct Harness {
    pub tmp: TempDir,
    pub storage: Arc<FakeStorage>,
    pub sandboxes: Arc<FakeSandboxes>,
    pub names: Arc<NameRegistrar>,
    pub ids: Arc<FakeIds>,
    pub engine: Arc<FakeEngine>,
    pub containers: Arc<ContainerStore>,
    pub server: CheckpointRestoreServer,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_enabled(true)
    }

    pub fn with_enabled(enabled: bool) -> Self {
        init_tracing();
        let tmp = TempDir::new().unwrap();
        let storage = Arc::new(FakeStorage::new(tmp.path().join("storage")));
        let sandboxes = Arc::new(FakeSandboxes::default());
        let names = Arc::new(NameRegistrar::new());
        let ids = Arc::new(FakeIds::default());
        let containers = Arc::new(ContainerStore::new());
        let engine = Arc::new(FakeEngine::new(containers.clone()));

        let config = CheckpointRestoreConfig::default()
            .with_enabled(enabled)
            .with_staging_root(tmp.path().join("staging"));
        let server = CheckpointRestoreServer::with_containers(
            config,
            Collaborators {
                storage: storage.clone(),
                sandboxes: sandboxes.clone(),
                names: names.clone(),
                ids: ids.clone(),
                engine: engine.clone(),
            },
            containers.clone(),
        );

        Self {
            tmp,
            storage,
            sandboxes,
            names,
            ids,
            engine,
            containers,
            server,
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.tmp.path().join(name)
    }

    /// Number of entries left in the staging root.
    pub fn staged(&self) -> usize {
        fs::read_dir(self.path("staging"))
            .map(|d| d.count())
            .unwrap_or(0)
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn sandbox_config(name: &str) -> SandboxConfig {
    SandboxConfig {
        metadata: Some(SandboxMetadata {
            name: name.to_string(),
            uid: format!("{name}-uid"),
            namespace: "default".to_string(),
            attempt: 0,
        }),
        hostname: name.to_string(),
        ..Default::default()
    }
}

pub fn spec_mount(destination: &str, source: &str, options: &[&str]) -> SpecMount {
    SpecMount {
        destination: destination.to_string(),
        source: source.to_string(),
        mount_type: "bind".to_string(),
        options: options.iter().map(|o| o.to_string()).collect(),
    }
}

/// A `spec.dump` as written for a container named `name`.
pub fn spec_dump(name: &str, sandbox_id: &str, mounts: Vec<SpecMount>) -> SpecDump {
    let annotations = HashMap::from([
        (
            ANNOTATION_METADATA.to_string(),
            format!(r#"{{"name":"{name}","attempt":0}}"#),
        ),
        (
            ANNOTATION_ANNOTATIONS.to_string(),
            r#"{"team":"infra"}"#.to_string(),
        ),
        (ANNOTATION_LABELS.to_string(), r#"{"app":"web"}"#.to_string()),
        (ANNOTATION_SANDBOX_ID.to_string(), sandbox_id.to_string()),
    ]);
    SpecDump {
        oci_version: "1.0.2".to_string(),
        mounts,
        annotations,
    }
}

pub fn config_dump(id: &str, name: &str) -> ConfigDump {
    ConfigDump {
        id: id.to_string(),
        name: name.to_string(),
        rootfs_image_name: "docker.io/library/nginx:latest".to_string(),
        ..Default::default()
    }
}

pub fn write_tar(path: &Path, files: &[(String, Vec<u8>)]) {
    let mut builder = tar::Builder::new(File::create(path).unwrap());
    for (name, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    builder.finish().unwrap();
}

pub fn container_archive(path: &Path, spec: &SpecDump, config: &ConfigDump) -> PathBuf {
    write_tar(
        path,
        &[
            ("spec.dump".to_string(), serde_json::to_vec(spec).unwrap()),
            ("config.dump".to_string(), serde_json::to_vec(config).unwrap()),
            ("rootfs-diff.tar".to_string(), b"diff".to_vec()),
            ("checkpoint/pages-1.img".to_string(), b"pages".to_vec()),
        ],
    );
    path.to_path_buf()
}

/// Writes a pod archive. `options` is the raw `pod.options` document.
pub fn pod_archive(
    path: &Path,
    options: &str,
    sandbox: &SandboxConfig,
    members: &[(&str, SpecDump)],
) -> PathBuf {
    let scratch = TempDir::new().unwrap();
    let mut files = vec![
        ("pod.options".to_string(), options.as_bytes().to_vec()),
        ("pod.dump".to_string(), serde_json::to_vec(sandbox).unwrap()),
    ];
    for (id, spec) in members {
        let member = container_archive(
            &scratch.path().join(format!("{id}.tar")),
            spec,
            &config_dump(id, id),
        );
        files.push((format!("{id}.tar"), fs::read(member).unwrap()));
    }
    write_tar(path, &files);
    path.to_path_buf()
}
