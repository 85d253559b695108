//! Cryptvol Core - Foundational Types
//!
//! Error taxonomy, configuration, manifest data model and volume state
//! shared by the runtime and the CLI.

pub mod config;
pub mod error;
pub mod manifest;
pub mod volume;

// Re-export commonly used types
pub use config::{LogLevel, RuntimeConfig, ToolPaths};
pub use error::{CryptvolError, Result};
pub use manifest::{IdentityField, InstanceInfo, InstanceManifest, Manifest};
pub use volume::{DiskSize, LoopDevice, MapperState, FILESYSTEM_TYPE};

/// Cryptvol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
