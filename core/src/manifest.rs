//! Instance manifest types.
//!
//! A manifest records the identity of a VM or container instance, the host
//! it is bound to, the image it was launched from, and whether that image
//! was encrypted (and, for containers, integrity-enforced). Manifests are
//! built by the runtime after identity validation and serialized as:
//!
//! ```json
//! {
//!   "instance_manifest": {
//!     "instance_info": {
//!       "instance_id": "...",
//!       "host_hardware_uuid": "...",
//!       "image_id": "..."
//!     },
//!     "image_encrypted": true,
//!     "image_integrity_enforced": false
//!   }
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Which identifier failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    InstanceId,
    HostHardwareUuid,
    ImageId,
}

impl fmt::Display for IdentityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdentityField::InstanceId => "instance ID",
            IdentityField::HostHardwareUuid => "host hardware UUID",
            IdentityField::ImageId => "image ID",
        };
        f.write_str(name)
    }
}

/// Identity triple of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance (VM or container) UUID, version 4.
    pub instance_id: String,
    /// Hardware UUID of the host the instance is bound to (any version).
    pub host_hardware_uuid: String,
    /// Source image UUID, version 4.
    pub image_id: String,
}

/// Encryption posture of a single instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub instance_info: InstanceInfo,

    /// Whether the image fetched for this instance was encrypted.
    pub image_encrypted: bool,

    /// Container images only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_integrity_enforced: Option<bool>,
}

impl Manifest {
    /// Whether this manifest describes a container (carries the integrity flag).
    pub fn is_container(&self) -> bool {
        self.image_integrity_enforced.is_some()
    }

    /// Serialize wrapped in the `instance_manifest` envelope.
    pub fn to_json(&self) -> Result<String> {
        let envelope = InstanceManifest {
            manifest: self.clone(),
        };
        Ok(serde_json::to_string(&envelope)?)
    }
}

/// Serialization envelope: `{"instance_manifest": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceManifest {
    #[serde(rename = "instance_manifest")]
    pub manifest: Manifest,
}
