//! `cryptvol unmount` command.

use std::path::PathBuf;

use clap::Args;

#[derive(Args, Debug)]
pub struct UnmountArgs {
    /// Directory the volume is mounted on
    pub mount_location: PathBuf,
}

pub async fn execute(args: UnmountArgs) -> Result<(), Box<dyn std::error::Error>> {
    cryptvol_runtime::unmount(&args.mount_location)?;
    println!("Unmounted {} successfully", args.mount_location.display());
    Ok(())
}
