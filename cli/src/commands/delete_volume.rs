//! `cryptvol delete-volume` command.

use std::path::PathBuf;

use clap::Args;
use cryptvol_core::config::RuntimeConfig;
use cryptvol_runtime::VolumeManager;

#[derive(Args, Debug)]
pub struct DeleteVolumeArgs {
    /// Device-mapper location of the volume
    pub mapper_location: PathBuf,
}

pub async fn execute(
    args: DeleteVolumeArgs,
    config: RuntimeConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mapper_location = args.mapper_location;
    let target = mapper_location.clone();

    tokio::task::spawn_blocking(move || VolumeManager::new(config).delete_volume(&mapper_location))
        .await??;

    println!("Successfully deleted dm-crypt volume: {}", target.display());
    Ok(())
}
