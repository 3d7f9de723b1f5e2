//! Diffable core library: resource types, registry persistence, delta patches.
//!
//! - [`types`]: newtypes and the resource descriptor
//! - [`error`]: [`RegistryError`], [`PatchError`]
//! - [`registry`]: load / save / register
//! - [`patch`]: diff decoding and reconstruction

pub mod error;
pub mod patch;
pub mod registry;
pub mod types;

pub use error::{PatchError, RegistryError};
pub use patch::{apply, Diff, Instruction};
pub use types::{Registry, ResourceDescriptor, ResourceId, Version};
