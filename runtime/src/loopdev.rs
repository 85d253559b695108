//! Sparse file and loop device resolution.
//!
//! Ensures the backing sparse file exists at exactly the requested size,
//! binds it to a loop device and, when the file was (re)created, lays down
//! a fresh LUKS header on that device.
//!
//! The association is always looked up by backing-file path through
//! `losetup -j`; nothing is cached between calls. The query/attach pair is
//! not atomic, so callers must not resolve the same sparse file concurrently.

use cryptvol_core::config::ToolPaths;
use cryptvol_core::error::{CryptvolError, Result};
use cryptvol_core::volume::LoopDevice;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use crate::luks::Cryptsetup;
use crate::process::CommandRunner;

/// Outcome of [`LoopDeviceResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub loop_device: LoopDevice,
    /// The sparse file was created in this call and the device was LUKS-formatted.
    pub needs_format: bool,
}

/// Binds sparse files to loop devices.
pub struct LoopDeviceResolver<'a, R: CommandRunner> {
    runner: &'a R,
    tools: &'a ToolPaths,
}

impl<'a, R: CommandRunner> LoopDeviceResolver<'a, R> {
    pub fn new(runner: &'a R, tools: &'a ToolPaths) -> Self {
        Self { runner, tools }
    }

    /// Ensure `sparse_file` is `size_bytes` long, attached to a loop device,
    /// and LUKS-formatted with `key_file` if it had to be created.
    ///
    /// A size mismatch is treated like absence: the file is recreated and
    /// its previous contents are lost. If the file was already attached, the
    /// loop device is told to re-read the new capacity before formatting.
    pub fn resolve(
        &self,
        sparse_file: &Path,
        size_bytes: u64,
        key_file: &Path,
    ) -> Result<Resolution> {
        let needs_format = self.ensure_sparse_file(sparse_file, size_bytes)?;

        match self.find_association(sparse_file)? {
            None => {
                tracing::info!(
                    sparse_file = %sparse_file.display(),
                    "Attaching sparse file to a free loop device"
                );
                self.runner.run_checked(
                    "loop-attach",
                    &self.tools.losetup,
                    &[OsStr::new("-f"), sparse_file.as_os_str()],
                )?;
            }
            Some(device) if needs_format => {
                tracing::info!(
                    device = %device.display(),
                    "Refreshing loop device capacity after resize"
                );
                self.runner.run_checked(
                    "loop-resize",
                    &self.tools.losetup,
                    &[OsStr::new("-c"), device.as_os_str()],
                )?;
            }
            Some(_) => {}
        }

        let device = self
            .find_association(sparse_file)?
            .ok_or_else(|| CryptvolError::NotAssociated(sparse_file.to_path_buf()))?;

        tracing::info!(
            sparse_file = %sparse_file.display(),
            device = %device.display(),
            "Sparse file associated with loop device"
        );

        if needs_format {
            Cryptsetup::new(self.runner, &self.tools.cryptsetup).format(&device, key_file)?;
        }

        Ok(Resolution {
            loop_device: LoopDevice {
                device,
                backing_file: sparse_file.to_path_buf(),
            },
            needs_format,
        })
    }

    /// Create or resize the sparse file. Returns whether it was (re)created.
    fn ensure_sparse_file(&self, sparse_file: &Path, size_bytes: u64) -> Result<bool> {
        match std::fs::metadata(sparse_file) {
            Ok(meta) if meta.len() == size_bytes => {
                tracing::debug!(
                    sparse_file = %sparse_file.display(),
                    size_bytes,
                    "Sparse file present with matching size"
                );
                return Ok(false);
            }
            Ok(meta) => {
                tracing::warn!(
                    sparse_file = %sparse_file.display(),
                    existing = meta.len(),
                    requested = size_bytes,
                    "Sparse file size mismatch, recreating"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(
                    sparse_file = %sparse_file.display(),
                    size_bytes,
                    "Creating sparse file"
                );
            }
            Err(e) => return Err(e.into()),
        }

        let size = size_bytes.to_string();
        self.runner.run_checked(
            "sparse-create",
            &self.tools.truncate,
            &[OsStr::new("-s"), OsStr::new(&size), sparse_file.as_os_str()],
        )?;
        Ok(true)
    }

    /// Loop device currently backed by `sparse_file`, if any.
    fn find_association(&self, sparse_file: &Path) -> Result<Option<PathBuf>> {
        let stdout = self.runner.run_checked(
            "loop-query",
            &self.tools.losetup,
            &[OsStr::new("-j"), sparse_file.as_os_str()],
        )?;
        Ok(parse_association(&stdout))
    }
}

/// Extract the device path from `losetup -j` output.
///
/// Lines look like `/dev/loop0: [2049]:1311 (/var/lib/img.sparse)`; the
/// first colon-delimited field of the first non-empty line is the device.
pub fn parse_association(stdout: &str) -> Option<PathBuf> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let device = line.split(':').next()?.trim();
    if device.is_empty() {
        None
    } else {
        Some(PathBuf::from(device))
    }
}
