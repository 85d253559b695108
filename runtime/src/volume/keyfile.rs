//! Scoped on-disk key material.
//!
//! `cryptsetup` reads the key from `--key-file`; passing it on the command
//! line would expose it through the process table. The key is written to a
//! private temporary file that is removed when the guard drops, on every
//! exit path including unwinding.

use cryptvol_core::error::Result;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Temporary key file, deleted on drop.
#[derive(Debug)]
pub struct KeyFile {
    file: NamedTempFile,
}

impl KeyFile {
    /// Write `key` to a new mode-0600 file inside `dir`.
    pub fn create(dir: &Path, key: &[u8]) -> Result<Self> {
        let mut file = tempfile::Builder::new()
            .prefix("volumeKey")
            .tempfile_in(dir)?;
        file.write_all(key)?;
        file.as_file().sync_all()?;

        tracing::debug!(key_len = key.len(), "Staged key material in temporary file");
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
