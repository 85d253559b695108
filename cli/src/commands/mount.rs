//! `cryptvol mount` command.

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct MountArgs {
    /// Device-mapper location of the volume
    pub mapper_location: PathBuf,

    /// Directory to mount the volume on
    pub mount_location: PathBuf,

    /// Succeed if the volume is already mounted there
    #[arg(long)]
    pub if_not_mounted: bool,
}

pub async fn execute(args: MountArgs) -> Result<(), Box<dyn std::error::Error>> {
    match cryptvol_runtime::mount(&args.mapper_location, &args.mount_location) {
        Ok(()) => {
            println!("Device mounted successfully in {}", args.mount_location.display());
            Ok(())
        }
        Err(e) if args.if_not_mounted && e.is_already_mounted() => {
            println!("{e}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
