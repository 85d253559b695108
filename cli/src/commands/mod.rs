//! CLI command definitions and dispatch.

mod create_volume;
mod decrypt;
mod delete_volume;
mod manifest;
mod mount;
mod unmount;
mod version;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use cryptvol_core::config::{LogLevel, RuntimeConfig};
use zeroize::Zeroizing;

/// Cryptvol - encrypted volume provisioning for VMs and containers.
#[derive(Parser)]
#[command(name = "cryptvol", version, about)]
pub struct Cli {
    /// YAML configuration file (defaults to $CRYPTVOL_CONFIG)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level: debug, info, warn, error (RUST_LOG takes precedence)
    #[arg(long, global = true, value_parser = parse_log_level)]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// Load the runtime configuration named by `--config` or the environment.
    pub fn load_config(&self) -> Result<RuntimeConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => RuntimeConfig::load(path)?,
            None => RuntimeConfig::from_env()?,
        };
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok(config)
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Provision a LUKS-encrypted ext4 volume backed by a sparse file
    CreateVolume(create_volume::CreateVolumeArgs),
    /// Close the LUKS mapping of a volume
    DeleteVolume(delete_volume::DeleteVolumeArgs),
    /// Mount a provisioned volume
    Mount(mount::MountArgs),
    /// Unmount a volume
    Unmount(unmount::UnmountArgs),
    /// Decrypt an encrypted image file
    Decrypt(decrypt::DecryptArgs),
    /// Print a VM instance manifest as JSON
    CreateVmManifest(manifest::VmManifestArgs),
    /// Print a container instance manifest as JSON
    CreateContainerManifest(manifest::ContainerManifestArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Key material supplied as hex on the command line or as a raw key file.
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Key as a hex string
    #[arg(long, conflicts_with = "key_file", required_unless_present = "key_file")]
    pub key: Option<String>,

    /// File holding the raw key bytes
    #[arg(long)]
    pub key_file: Option<PathBuf>,
}

impl KeyArgs {
    pub fn load(&self) -> Result<Zeroizing<Vec<u8>>, Box<dyn std::error::Error>> {
        match (&self.key, &self.key_file) {
            (Some(hex_key), _) => Ok(parse_hex_key(hex_key)?),
            (None, Some(path)) => Ok(cryptvol_runtime::decrypt::read_key_file(path)?),
            (None, None) => Err("no key given, use --key or --key-file".into()),
        }
    }
}

/// Decode a hex-encoded key. The error never echoes the input.
fn parse_hex_key(value: &str) -> Result<Zeroizing<Vec<u8>>, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("key not given".to_string());
    }
    hex::decode(trimmed)
        .map(Zeroizing::new)
        .map_err(|_| "Invalid hex format for the key".to_string())
}

fn parse_log_level(value: &str) -> Result<LogLevel, String> {
    match value.to_lowercase().as_str() {
        "debug" => Ok(LogLevel::Debug),
        "info" => Ok(LogLevel::Info),
        "warn" | "warning" => Ok(LogLevel::Warn),
        "error" => Ok(LogLevel::Error),
        _ => Err(format!(
            "Invalid log level '{}'. Valid: debug, info, warn, error",
            value
        )),
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli, config: RuntimeConfig) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Command::CreateVolume(args) => create_volume::execute(args, config).await,
        Command::DeleteVolume(args) => delete_volume::execute(args, config).await,
        Command::Mount(args) => mount::execute(args).await,
        Command::Unmount(args) => unmount::execute(args).await,
        Command::Decrypt(args) => decrypt::execute(args).await,
        Command::CreateVmManifest(args) => manifest::execute_vm(args).await,
        Command::CreateContainerManifest(args) => manifest::execute_container(args).await,
        Command::Version(args) => version::execute(args).await,
    }
}
