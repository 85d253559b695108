//! Instance manifest construction.
//!
//! Identifiers are validated before anything is assembled, so an invalid
//! manifest is never returned. Instance and image IDs must be RFC 4122
//! version-4 UUIDs; the host hardware UUID only needs the hyphenated
//! 8-4-4-4-12 layout, since firmware-assigned UUIDs carry arbitrary
//! version and variant nibbles.

use cryptvol_core::error::{CryptvolError, Result};
use cryptvol_core::manifest::{IdentityField, InstanceInfo, Manifest};
use uuid::{Uuid, Variant};

const HYPHENATED_LEN: usize = 36;

/// Whether `value` is a hyphenated UUID of any version.
pub fn is_uuid(value: &str) -> bool {
    parse_hyphenated(value).is_some()
}

/// Whether `value` is a hyphenated RFC 4122 version-4 UUID.
pub fn is_uuid_v4(value: &str) -> bool {
    parse_hyphenated(value)
        .map(|id| id.get_version_num() == 4 && id.get_variant() == Variant::RFC4122)
        .unwrap_or(false)
}

/// `Uuid::parse_str` also accepts simple, braced and URN forms; only the
/// 36-character hyphenated form is valid here.
fn parse_hyphenated(value: &str) -> Option<Uuid> {
    if value.len() != HYPHENATED_LEN {
        return None;
    }
    Uuid::parse_str(value).ok()
}

/// Validate an identity triple, naming the first field that fails.
pub fn validate_identity(
    instance_id: &str,
    host_hardware_uuid: &str,
    image_id: &str,
) -> Result<()> {
    check(IdentityField::InstanceId, instance_id, is_uuid_v4)?;
    check(IdentityField::HostHardwareUuid, host_hardware_uuid, is_uuid)?;
    check(IdentityField::ImageId, image_id, is_uuid_v4)?;
    Ok(())
}

fn check(field: IdentityField, value: &str, valid: fn(&str) -> bool) -> Result<()> {
    if valid(value) {
        return Ok(());
    }
    tracing::debug!(%field, "Identity validation failed");
    Err(CryptvolError::InvalidIdentity {
        field,
        value: value.to_string(),
    })
}

/// Build a VM manifest.
pub fn build_instance_manifest(
    instance_id: &str,
    host_hardware_uuid: &str,
    image_id: &str,
    image_encrypted: bool,
) -> Result<Manifest> {
    validate_identity(instance_id, host_hardware_uuid, image_id)?;
    Ok(Manifest {
        instance_info: info(instance_id, host_hardware_uuid, image_id),
        image_encrypted,
        image_integrity_enforced: None,
    })
}

/// Build a container manifest, which also records integrity enforcement.
pub fn build_container_manifest(
    container_id: &str,
    host_hardware_uuid: &str,
    image_id: &str,
    image_encrypted: bool,
    image_integrity_enforced: bool,
) -> Result<Manifest> {
    validate_identity(container_id, host_hardware_uuid, image_id)?;
    Ok(Manifest {
        instance_info: info(container_id, host_hardware_uuid, image_id),
        image_encrypted,
        image_integrity_enforced: Some(image_integrity_enforced),
    })
}

fn info(instance_id: &str, host_hardware_uuid: &str, image_id: &str) -> InstanceInfo {
    InstanceInfo {
        instance_id: instance_id.to_string(),
        host_hardware_uuid: host_hardware_uuid.to_string(),
        image_id: image_id.to_string(),
    }
}
