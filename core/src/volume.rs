//! Volume types for encrypted block storage.
//!
//! Provides the device-mapper state observed through `cryptsetup status`,
//! the loop device binding of a sparse file, and disk size parsing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{CryptvolError, Result};

/// Filesystem created on, and mounted from, every encrypted volume.
pub const FILESYSTEM_TYPE: &str = "ext4";

const DECIMAL_GB: u64 = 1_000_000_000;

/// Device-mapper state of a LUKS container, as reported by the LUKS tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapperState {
    /// Status output named neither state.
    Unmapped,
    /// Container exists on disk but has no mapping.
    Inactive,
    /// Mapping is open under /dev/mapper.
    Active,
}

impl fmt::Display for MapperState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MapperState::Unmapped => "unmapped",
            MapperState::Inactive => "inactive",
            MapperState::Active => "active",
        };
        f.write_str(s)
    }
}

/// A sparse file bound to a kernel loop device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopDevice {
    /// Loop device node, e.g. `/dev/loop3`.
    pub device: PathBuf,
    /// Regular file backing the device.
    pub backing_file: PathBuf,
}

/// Disk size in bytes.
///
/// Parsing accepts a bare integer (decimal gigabytes) or an integer with a
/// unit suffix: `B`, `KB`/`MB`/`GB`/`TB` (powers of 1000) or
/// `KiB`/`MiB`/`GiB`/`TiB` (powers of 1024). Suffixes are case-insensitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DiskSize(u64);

impl DiskSize {
    /// Construct from a byte count. Zero is rejected.
    pub fn from_bytes(bytes: u64) -> Result<Self> {
        if bytes == 0 {
            return Err(CryptvolError::InvalidInput(
                "size must be greater than 0".to_string(),
            ));
        }
        Ok(Self(bytes))
    }

    /// Construct from decimal gigabytes.
    pub fn from_gb(gb: u64) -> Result<Self> {
        let bytes = gb.checked_mul(DECIMAL_GB).ok_or_else(|| {
            CryptvolError::InvalidInput(format!("size of {gb}GB overflows a 64-bit byte count"))
        })?;
        Self::from_bytes(bytes)
    }

    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for DiskSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}B", self.0)
    }
}

impl FromStr for DiskSize {
    type Err = CryptvolError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let split = trimmed
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(trimmed.len());
        let (digits, unit) = trimmed.split_at(split);

        if digits.is_empty() {
            return Err(CryptvolError::InvalidInput(format!(
                "invalid disk size {s:?}: expected a number with an optional unit"
            )));
        }

        let value: u64 = digits.parse().map_err(|_| {
            CryptvolError::InvalidInput(format!("invalid disk size {s:?}: number out of range"))
        })?;

        let multiplier: u64 = match unit.trim().to_ascii_lowercase().as_str() {
            "" | "gb" | "g" => DECIMAL_GB,
            "b" => 1,
            "kb" | "k" => 1_000,
            "mb" | "m" => 1_000_000,
            "tb" | "t" => 1_000_000_000_000,
            "kib" => 1 << 10,
            "mib" => 1 << 20,
            "gib" => 1 << 30,
            "tib" => 1 << 40,
            other => {
                return Err(CryptvolError::InvalidInput(format!(
                    "invalid disk size {s:?}: unknown unit {other:?}"
                )))
            }
        };

        let bytes = value.checked_mul(multiplier).ok_or_else(|| {
            CryptvolError::InvalidInput(format!("invalid disk size {s:?}: overflows"))
        })?;
        Self::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_number_is_decimal_gigabytes() {
        let size: DiskSize = "10".parse().unwrap();
        assert_eq!(size.bytes(), 10_000_000_000);
    }

    #[test]
    fn test_decimal_and_binary_units() {
        assert_eq!("1GB".parse::<DiskSize>().unwrap().bytes(), 1_000_000_000);
        assert_eq!("1GiB".parse::<DiskSize>().unwrap().bytes(), 1_073_741_824);
        assert_eq!("512MiB".parse::<DiskSize>().unwrap().bytes(), 512 * 1024 * 1024);
        assert_eq!("4096b".parse::<DiskSize>().unwrap().bytes(), 4096);
        assert_eq!(" 2 tb ".parse::<DiskSize>().unwrap().bytes(), 2_000_000_000_000);
    }

    #[test]
    fn test_zero_rejected() {
        let err = "0".parse::<DiskSize>().unwrap_err();
        assert_eq!(err.to_string(), "Invalid input: size must be greater than 0");
        assert!(DiskSize::from_bytes(0).is_err());
        assert!(DiskSize::from_gb(0).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!("".parse::<DiskSize>().is_err());
        assert!("GB".parse::<DiskSize>().is_err());
        assert!("-5".parse::<DiskSize>().is_err());
        assert!("10 parsecs".parse::<DiskSize>().is_err());
    }

    #[test]
    fn test_overflow_rejected() {
        assert!("99999999999999999999".parse::<DiskSize>().is_err());
        assert!("18446744073709551615TB".parse::<DiskSize>().is_err());
        assert!(DiskSize::from_gb(u64::MAX).is_err());
    }

    #[test]
    fn test_mapper_state_display() {
        assert_eq!(MapperState::Active.to_string(), "active");
        assert_eq!(MapperState::Inactive.to_string(), "inactive");
        assert_eq!(MapperState::Unmapped.to_string(), "unmapped");
    }

    #[test]
    fn test_loop_device_serialization() {
        let dev = LoopDevice {
            device: PathBuf::from("/dev/loop3"),
            backing_file: PathBuf::from("/var/lib/vols/a.img"),
        };
        let json = serde_json::to_string(&dev).unwrap();
        let parsed: LoopDevice = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, dev);
    }
}
