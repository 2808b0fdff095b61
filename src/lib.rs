//! # magikrestore
//!
//! **Checkpoint/Restore Orchestration for a Container Runtime**
//!
//! This crate turns "checkpoint this container/pod" and "restore from this
//! archive" requests into the sequence of side-effecting operations a
//! container runtime has to perform against its storage, sandbox, naming and
//! id-index subsystems, undoing partial work when a step fails. Freezing and
//! thawing process state is delegated to an external [`CheckpointEngine`].
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          magikrestore                               │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │   api::v1 ──┐                                                       │
//! │             ├──► RestoreRequest / CheckpointRequest ──► classify()  │
//! │ api::private┘                                              │        │
//! │                 ┌──────────────────┬───────────────────────┤        │
//! │                 ▼                  ▼                       ▼        │
//! │          DirectRestore   ImportIntoExistingPod      ImportAsNewPod  │
//! │                 │                  │                       │        │
//! │                 │          ArchiveImporter          ArchiveImporter │
//! │                 │                  │                       │        │
//! │                 │       ContainerReconstructor ◄── PodReconstructor │
//! │                 │          (RollbackLog)                   │        │
//! │                 ▼                  ▼                       ▼        │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │ RestoreExecutor: engine.restore() per container, fail-fast    │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                         Collaborators                               │
//! │  ContainerStorage │ SandboxService │ NameRegistry │ IdIndex │ Engine │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Archive Format
//!
//! ```text
//! container.tar                     pod.tar
//! ├── spec.dump                     ├── pod.options   {"version":1,"containers":[..]}
//! ├── config.dump                   ├── pod.dump      sandbox configuration
//! ├── rootfs-diff.tar               ├── <id-1>.tar    (container archive)
//! ├── deleted.files                 └── <id-2>.tar
//! └── checkpoint/
//! ```
//!
//! Archives may be gzip-compressed. Entries with absolute paths or `..`
//! components are rejected.
//!
//! # Failure Semantics
//!
//! - Reconstruction of a single container is all-or-nothing: every committed
//!   step (name reservation, id registration, storage creation, active-set
//!   insertion) is undone in reverse order on failure.
//! - Pod restore is **not** atomic across members. Containers rebuilt or
//!   restored before a failing member are left in place.
//! - Nothing is retried. Cancellation is observed once, right after storage
//!   creation.
//!
//! # Example
//!
//! ```rust,ignore
//! use magikrestore::{CheckpointRestoreConfig, CheckpointRestoreServer, Collaborators};
//! use magikrestore::{RequestContext, api};
//!
//! async fn restore(services: Collaborators, wire: api::private::RestoreContainerRequest)
//!     -> magikrestore::Result<api::private::RestoreContainerResponse>
//! {
//!     let server = CheckpointRestoreServer::new(CheckpointRestoreConfig::enabled(), services);
//!     let ctx = RequestContext::background();
//!     let resp = server
//!         .restore_container(&ctx, &api::private::restore_request(&wire))
//!         .await?;
//!     Ok(api::private::restore_response(&resp))
//! }
//! ```

pub mod api;
pub mod archive;
pub mod checkpoint;
pub mod config;
pub mod constants;
pub mod container;
pub mod context;
pub mod error;
pub mod metadata;
pub mod pod;
pub mod reconstruct;
pub mod registry;
pub mod request;
pub mod restore;
pub mod rollback;
pub mod server;
pub mod services;

// Re-exports
pub use archive::{ArchiveImporter, ContainerCheckpoint, PodCheckpoint, StagingDir};
pub use checkpoint::CheckpointExporter;
pub use config::CheckpointRestoreConfig;
pub use constants::*;
pub use container::{
    ContainerStatus, ContainerStore, Mount, MountPropagation, ReconstructedContainer,
};
pub use context::RequestContext;
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use pod::PodReconstructor;
pub use reconstruct::ContainerReconstructor;
pub use registry::{NameRegistrar, TruncIndex};
pub use request::{
    CheckpointRequest, RestoreMode, RestoreRequest, RestoreResponse, classify,
};
pub use restore::RestoreExecutor;
pub use rollback::RollbackLog;
pub use server::{CheckpointRestoreServer, Collaborators};
pub use services::{
    Change, ChangeKind, CheckpointEngine, CheckpointOptions, ContainerStorage, IdIndex,
    NameRegistry, RestoreOptionDescriptor, Sandbox, SandboxService,
};
