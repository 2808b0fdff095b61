//! Wire request shapes and their mapping into the internal request model.
//!
//! Two protocol generations are served:
//!
//! - [`v1`]: the stable container runtime interface. Container scope only,
//!   no overrides, and checkpoints always leave the container running.
//! - [`private`]: the runtime's own extended interface with pod scope,
//!   mount remapping, label/annotation overrides and the `keep` flag.
//!
//! Each module exposes pure functions mapping its requests into
//! [`crate::request`] types and internal responses back out. Nothing past
//! this module sees a wire type.

pub mod private;
pub mod v1;
