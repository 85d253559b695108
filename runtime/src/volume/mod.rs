//! Encrypted volume lifecycle.
//!
//! Provides `VolumeManager` for provisioning and tearing down LUKS-backed
//! ext4 volumes on sparse files, and `KeyFile` for scoping key material
//! on disk while the LUKS tool needs it.

mod keyfile;
mod manager;

pub use keyfile::KeyFile;
pub use manager::{mapper_name, VolumeManager};
