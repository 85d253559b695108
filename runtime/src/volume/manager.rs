//! Encrypted volume lifecycle.
//!
//! Provisioning walks a volume through
//! `Absent -> FormattedClosed -> Active(unformatted) -> Active(usable)`;
//! deletion closes the mapping and leaves the loop device and sparse file
//! in place. Every external step goes through a [`CommandRunner`], and a
//! failure at any step is returned as-is without rolling back earlier
//! steps.

use cryptvol_core::config::RuntimeConfig;
use cryptvol_core::error::{CryptvolError, Result};
use cryptvol_core::volume::MapperState;
use std::ffi::OsStr;
use std::path::Path;

use super::keyfile::KeyFile;
use crate::loopdev::LoopDeviceResolver;
use crate::luks::Cryptsetup;
use crate::process::{CommandRunner, SystemRunner};

/// Creates and removes LUKS-backed volumes.
///
/// Not internally synchronized: callers must serialize operations that
/// target the same sparse file or mapper name.
pub struct VolumeManager<R: CommandRunner = SystemRunner> {
    runner: R,
    config: RuntimeConfig,
}

impl VolumeManager<SystemRunner> {
    /// Manager driving the real host tools with the configured timeout.
    pub fn new(config: RuntimeConfig) -> Self {
        let runner = SystemRunner::new(config.command_timeout());
        Self { runner, config }
    }
}

impl<R: CommandRunner> VolumeManager<R> {
    pub fn with_runner(runner: R, config: RuntimeConfig) -> Self {
        Self { runner, config }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    fn cryptsetup(&self) -> Cryptsetup<'_, R> {
        Cryptsetup::new(&self.runner, &self.config.tools.cryptsetup)
    }

    /// Provision an encrypted ext4 volume backed by `sparse_file` and expose
    /// it at `mapper_location`.
    ///
    /// The filesystem is created only when the LUKS container itself was
    /// created by this call. An existing node at `mapper_location` fails
    /// with [`CryptvolError::AlreadyProvisioned`] before anything runs.
    pub fn create_volume(
        &self,
        sparse_file: &Path,
        mapper_location: &Path,
        key: &[u8],
        size_bytes: u64,
    ) -> Result<()> {
        require_path(sparse_file, "sparse file path not given")?;
        require_path(mapper_location, "device mapper location not given")?;
        if key.is_empty() {
            return Err(CryptvolError::InvalidInput("key not given".to_string()));
        }
        if size_bytes == 0 {
            return Err(CryptvolError::InvalidInput(
                "size must be greater than 0".to_string(),
            ));
        }

        match std::fs::symlink_metadata(mapper_location) {
            Ok(_) => {
                return Err(CryptvolError::AlreadyProvisioned(
                    mapper_location.to_path_buf(),
                ))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let name = mapper_name(mapper_location)?;

        tracing::info!(
            sparse_file = %sparse_file.display(),
            mapper = %mapper_location.display(),
            size_bytes,
            "Provisioning encrypted volume"
        );

        let key_file = KeyFile::create(&self.config.key_dir(), key)?;

        let resolution = LoopDeviceResolver::new(&self.runner, &self.config.tools).resolve(
            sparse_file,
            size_bytes,
            key_file.path(),
        )?;

        let luks = self.cryptsetup();
        match luks.status(mapper_location)? {
            MapperState::Inactive => {
                luks.open(&resolution.loop_device.device, &name, key_file.path())?;
                let state = luks.status(mapper_location)?;
                if state != MapperState::Active {
                    return Err(CryptvolError::MapperNotActive(name));
                }
            }
            MapperState::Active => {
                tracing::debug!(name = %name, "Mapping already active");
            }
            MapperState::Unmapped => {
                return Err(CryptvolError::UnexpectedOutput {
                    step: "luks-status".to_string(),
                    output: format!("no mapper state reported for {}", mapper_location.display()),
                });
            }
        }

        if resolution.needs_format {
            tracing::info!(mapper = %mapper_location.display(), "Creating ext4 filesystem");
            self.runner.run_checked(
                "mkfs",
                &self.config.tools.mkfs_ext4,
                &[mapper_location.as_os_str()],
            )?;
        }

        tracing::info!(
            mapper = %mapper_location.display(),
            device = %resolution.loop_device.device.display(),
            formatted = resolution.needs_format,
            "Encrypted volume ready"
        );
        Ok(())
    }

    /// Close the mapping at `mapper_location`.
    ///
    /// The loop device and sparse file are left untouched, so a later
    /// [`create_volume`](Self::create_volume) reopens the same container.
    pub fn delete_volume(&self, mapper_location: &Path) -> Result<()> {
        require_path(mapper_location, "device mapper location not given")?;
        self.cryptsetup().close(mapper_location)
    }

    /// Current mapping state at `mapper_location`.
    pub fn mapper_state(&self, mapper_location: &Path) -> Result<MapperState> {
        require_path(mapper_location, "device mapper location not given")?;
        self.cryptsetup().status(mapper_location)
    }
}

/// Device-mapper name: the final path segment of `location`.
pub fn mapper_name(location: &Path) -> Result<String> {
    location
        .file_name()
        .and_then(OsStr::to_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            CryptvolError::InvalidInput(format!(
                "cannot derive a mapper name from {}",
                location.display()
            ))
        })
}

fn require_path(path: &Path, message: &str) -> Result<()> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(CryptvolError::InvalidInput(message.to_string()));
    }
    Ok(())
}
