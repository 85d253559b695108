use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::manifest::IdentityField;

/// Cryptvol error types
#[derive(Error, Debug)]
pub enum CryptvolError {
    /// Caller-supplied argument rejected before any side effect
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Identifier failed UUID layout validation
    #[error("the {field} provided is invalid: {value:?}")]
    InvalidIdentity { field: IdentityField, value: String },

    /// Device-mapper node already present at the requested location
    #[error("Volume already provisioned: {} exists", .0.display())]
    AlreadyProvisioned(PathBuf),

    /// External tool could not be started
    #[error("Failed to execute {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exited non-zero
    #[error("{step} failed: {program} exited with code {code}: {stderr}")]
    CommandFailed {
        step: String,
        program: String,
        code: i32,
        stderr: String,
    },

    /// External tool exceeded the configured timeout and was killed
    #[error("{program} timed out after {timeout:?}")]
    CommandTimeout { program: String, timeout: Duration },

    /// External tool succeeded but printed something we cannot interpret
    #[error("{step}: unexpected output: {output:?}")]
    UnexpectedOutput { step: String, output: String },

    /// No loop device is bound to the sparse file after attaching
    #[error("Sparse file {} is not associated to a loop device", .0.display())]
    NotAssociated(PathBuf),

    /// Mapping did not report active after luksOpen
    #[error("Volume {0} is not active for use")]
    MapperNotActive(String),

    /// Mount target already has the device mounted (EBUSY)
    #[error("Device {source_path} is already mounted at {target}")]
    AlreadyMounted { source_path: String, target: String },

    /// Any other mount(2) failure
    #[error("Attempt to mount {source_path} at {target} returned error: {message}")]
    MountFailed {
        source_path: String,
        target: String,
        message: String,
    },

    /// umount(2) failure
    #[error("Attempt to unmount {target} returned error: {message}")]
    UnmountFailed { target: String, message: String },

    /// Operation not available on this platform
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Cipher could not be constructed (bad key length)
    #[error("Cipher error: {0}")]
    Cipher(String),

    /// AEAD tag did not verify
    #[error("Authentication failed: ciphertext tampered or key mismatch")]
    Authentication,

    /// Encrypted container header is truncated or inconsistent
    #[error("Malformed encrypted container: {0}")]
    MalformedContainer(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl CryptvolError {
    /// Whether this error means the device was already mounted.
    ///
    /// Callers that treat mounting as idempotent can ignore these.
    pub fn is_already_mounted(&self) -> bool {
        matches!(self, CryptvolError::AlreadyMounted { .. })
    }
}

impl From<serde_json::Error> for CryptvolError {
    fn from(err: serde_json::Error) -> Self {
        CryptvolError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for CryptvolError {
    fn from(err: serde_yaml::Error) -> Self {
        CryptvolError::SerializationError(err.to_string())
    }
}

/// Result type alias for cryptvol operations
pub type Result<T> = std::result::Result<T, CryptvolError>;
