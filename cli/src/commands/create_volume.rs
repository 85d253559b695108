//! `cryptvol create-volume` command.

use std::path::PathBuf;

use clap::Args;
use cryptvol_core::config::RuntimeConfig;
use cryptvol_core::volume::DiskSize;
use cryptvol_runtime::VolumeManager;

use super::KeyArgs;

#[derive(Args, Debug)]
pub struct CreateVolumeArgs {
    /// Sparse file backing the volume (created if absent)
    pub sparse_file: PathBuf,

    /// Device-mapper location to expose the volume at, e.g. /dev/mapper/vol1
    pub mapper_location: PathBuf,

    /// Disk size; a bare number is decimal gigabytes (e.g. 10, 512MiB, 2TB)
    pub size: DiskSize,

    #[command(flatten)]
    pub key: KeyArgs,
}

pub async fn execute(
    args: CreateVolumeArgs,
    config: RuntimeConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = args.key.load()?;
    let sparse_file = args.sparse_file;
    let mapper_location = args.mapper_location;
    let size = args.size;

    println!("Creating dm-crypt volume...");

    let target = mapper_location.clone();
    tokio::task::spawn_blocking(move || {
        VolumeManager::new(config).create_volume(&sparse_file, &mapper_location, &key, size.bytes())
    })
    .await??;

    println!("Volume created successfully in {}", target.display());
    Ok(())
}
