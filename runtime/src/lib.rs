//! Cryptvol Runtime - encrypted volume provisioning.
//!
//! Drives the host toolchain (`truncate`, `losetup`, `cryptsetup`,
//! `mkfs.ext4`) to turn a sparse file into a LUKS-encrypted ext4 volume,
//! mounts and unmounts it, decrypts fetched images and builds instance
//! manifests.

#![allow(clippy::result_large_err)]

pub mod decrypt;
pub mod loopdev;
pub mod luks;
pub mod manifest;
pub mod mount;
pub mod process;
pub mod volume;

#[cfg(test)]
mod testing;

// Re-export common types
pub use decrypt::{decrypt, decrypt_as, decrypt_file, encrypt, ContainerFormat, ContainerHeader};
pub use loopdev::{LoopDeviceResolver, Resolution};
pub use luks::{classify_status, Cryptsetup};
pub use manifest::{build_container_manifest, build_instance_manifest, validate_identity};
pub use mount::{mount, unmount, MountFailure, MountSyscalls, Mounter, NixMounter};
pub use process::{CommandOutput, CommandRunner, SystemRunner};
pub use volume::{mapper_name, KeyFile, VolumeManager};

/// Cryptvol Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
