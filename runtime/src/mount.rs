//! Mounting provisioned volumes.
//!
//! The filesystem type is always ext4, with no flags and no data options.
//! "Device busy" from mount(2) is reported as
//! [`CryptvolError::AlreadyMounted`] so callers can treat a repeated mount
//! as success. No state is kept here; the kernel mount table is the record.

use cryptvol_core::error::{CryptvolError, Result};
use cryptvol_core::volume::FILESYSTEM_TYPE;
use std::path::{Path, PathBuf};

const PROC_MOUNTS: &str = "/proc/mounts";

/// How a mount primitive failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountFailure {
    /// The target is busy, i.e. something is already mounted there.
    Busy,
    /// Mounting is not available on this platform.
    Unsupported(String),
    Other(String),
}

/// Raw mount/unmount primitives.
pub trait MountSyscalls: Send + Sync {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: &str,
    ) -> std::result::Result<(), MountFailure>;

    fn unmount(&self, target: &Path) -> std::result::Result<(), MountFailure>;
}

/// mount(2)/umount2(2) through `nix`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NixMounter;

#[cfg(target_os = "linux")]
impl MountSyscalls for NixMounter {
    fn mount(
        &self,
        source: &Path,
        target: &Path,
        fstype: &str,
    ) -> std::result::Result<(), MountFailure> {
        use nix::errno::Errno;
        use nix::mount::MsFlags;

        nix::mount::mount(
            Some(source),
            target,
            Some(fstype),
            MsFlags::empty(),
            None::<&str>,
        )
        .map_err(|errno| match errno {
            Errno::EBUSY => MountFailure::Busy,
            other => MountFailure::Other(other.desc().to_string()),
        })
    }

    fn unmount(&self, target: &Path) -> std::result::Result<(), MountFailure> {
        nix::mount::umount2(target, nix::mount::MntFlags::empty())
            .map_err(|errno| MountFailure::Other(errno.desc().to_string()))
    }
}

#[cfg(not(target_os = "linux"))]
impl MountSyscalls for NixMounter {
    fn mount(
        &self,
        _source: &Path,
        _target: &Path,
        _fstype: &str,
    ) -> std::result::Result<(), MountFailure> {
        Err(MountFailure::Unsupported(
            "mounting encrypted volumes requires Linux".to_string(),
        ))
    }

    fn unmount(&self, _target: &Path) -> std::result::Result<(), MountFailure> {
        Err(MountFailure::Unsupported(
            "unmounting encrypted volumes requires Linux".to_string(),
        ))
    }
}

/// Validating front-end over a [`MountSyscalls`] implementation.
pub struct Mounter<M: MountSyscalls = NixMounter> {
    syscalls: M,
    mount_table: PathBuf,
}

impl Default for Mounter<NixMounter> {
    fn default() -> Self {
        Self::new(NixMounter)
    }
}

impl<M: MountSyscalls> Mounter<M> {
    pub fn new(syscalls: M) -> Self {
        Self {
            syscalls,
            mount_table: PathBuf::from(PROC_MOUNTS),
        }
    }

    /// Read mounts from `path` instead of `/proc/mounts`.
    pub fn with_mount_table(mut self, path: impl Into<PathBuf>) -> Self {
        self.mount_table = path.into();
        self
    }

    pub fn syscalls(&self) -> &M {
        &self.syscalls
    }

    /// Mount the ext4 filesystem at `mapper_location` on `mount_location`.
    pub fn mount(&self, mapper_location: &Path, mount_location: &Path) -> Result<()> {
        require(mapper_location, "device mapper location not given")?;
        require(mount_location, "mount location not given")?;

        tracing::info!(
            source = %mapper_location.display(),
            target = %mount_location.display(),
            "Mounting encrypted volume"
        );

        self.syscalls
            .mount(mapper_location, mount_location, FILESYSTEM_TYPE)
            .map_err(|failure| {
                let source_path = mapper_location.display().to_string();
                let target = mount_location.display().to_string();
                match failure {
                    MountFailure::Busy => CryptvolError::AlreadyMounted {
                        source_path,
                        target,
                    },
                    MountFailure::Unsupported(msg) => CryptvolError::Unsupported(msg),
                    MountFailure::Other(message) => CryptvolError::MountFailed {
                        source_path,
                        target,
                        message,
                    },
                }
            })
    }

    /// Unmount whatever is mounted at `mount_location`.
    pub fn unmount(&self, mount_location: &Path) -> Result<()> {
        require(mount_location, "unmount location not given")?;

        tracing::info!(target = %mount_location.display(), "Unmounting encrypted volume");

        self.syscalls.unmount(mount_location).map_err(|failure| match failure {
            MountFailure::Unsupported(msg) => CryptvolError::Unsupported(msg),
            MountFailure::Busy => CryptvolError::UnmountFailed {
                target: mount_location.display().to_string(),
                message: "target is busy".to_string(),
            },
            MountFailure::Other(message) => CryptvolError::UnmountFailed {
                target: mount_location.display().to_string(),
                message,
            },
        })
    }

    /// Whether anything is mounted at `mount_location`.
    pub fn is_mounted(&self, mount_location: &Path) -> Result<bool> {
        require(mount_location, "mount location not given")?;
        let table = std::fs::read_to_string(&self.mount_table)?;
        let mounted = mount_points(&table).any(|point| point == mount_location);
        Ok(mounted)
    }
}

/// Mount `mapper_location` on `mount_location` using the host primitives.
pub fn mount(mapper_location: &Path, mount_location: &Path) -> Result<()> {
    Mounter::default().mount(mapper_location, mount_location)
}

/// Unmount `mount_location` using the host primitives.
pub fn unmount(mount_location: &Path) -> Result<()> {
    Mounter::default().unmount(mount_location)
}

fn require(path: &Path, message: &str) -> Result<()> {
    if path.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(CryptvolError::InvalidInput(message.to_string()));
    }
    Ok(())
}

/// Mount points listed in a `/proc/mounts`-style table.
fn mount_points(table: &str) -> impl Iterator<Item = PathBuf> + '_ {
    table.lines().filter_map(|line| {
        let mut fields = line.split_whitespace();
        let _device = fields.next()?;
        fields.next().map(|point| PathBuf::from(unescape_mount_field(point)))
    })
}

/// Decode the `\ooo` octal escapes the kernel uses for whitespace in mount fields.
fn unescape_mount_field(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let value =
                (bytes[i + 1] - b'0') * 64 + (bytes[i + 2] - b'0') * 8 + (bytes[i + 3] - b'0');
            out.push(value);
            i += 4;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(digits: &[u8]) -> bool {
    digits.len() == 3 && digits[0] <= b'3' && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}
