//! `cryptvol create-vm-manifest` and `create-container-manifest` commands.
//!
//! Print the manifest wrapped in its `instance_manifest` envelope.

use clap::{ArgAction, Args};
use cryptvol_core::manifest::{InstanceManifest, Manifest};
use cryptvol_runtime::manifest::{build_container_manifest, build_instance_manifest};

#[derive(Args, Debug)]
pub struct VmManifestArgs {
    /// VM instance UUID (version 4)
    pub vm_id: String,

    /// Hardware UUID of the host the VM will be launched on
    pub host_hardware_uuid: String,

    /// Image UUID (version 4)
    pub image_id: String,

    /// Whether the image downloaded for the VM was encrypted (true/false)
    #[arg(action = ArgAction::Set)]
    pub image_encrypted: bool,

    /// Pretty-print the JSON
    #[arg(long)]
    pub pretty: bool,
}

#[derive(Args, Debug)]
pub struct ContainerManifestArgs {
    /// Container UUID (version 4)
    pub container_id: String,

    /// Hardware UUID of the host the container will be launched on
    pub host_hardware_uuid: String,

    /// Image UUID (version 4)
    pub image_id: String,

    /// Whether the container image was encrypted (true/false)
    #[arg(action = ArgAction::Set)]
    pub image_encrypted: bool,

    /// Whether image integrity is enforced (true/false)
    #[arg(action = ArgAction::Set)]
    pub image_integrity_enforced: bool,

    /// Pretty-print the JSON
    #[arg(long)]
    pub pretty: bool,
}

pub async fn execute_vm(args: VmManifestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = build_instance_manifest(
        &args.vm_id,
        &args.host_hardware_uuid,
        &args.image_id,
        args.image_encrypted,
    )?;
    println!("{}", render(manifest, args.pretty)?);
    Ok(())
}

pub async fn execute_container(
    args: ContainerManifestArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let manifest = build_container_manifest(
        &args.container_id,
        &args.host_hardware_uuid,
        &args.image_id,
        args.image_encrypted,
        args.image_integrity_enforced,
    )?;
    println!("{}", render(manifest, args.pretty)?);
    Ok(())
}

fn render(manifest: Manifest, pretty: bool) -> Result<String, serde_json::Error> {
    let envelope = InstanceManifest { manifest };
    if pretty {
        serde_json::to_string_pretty(&envelope)
    } else {
        serde_json::to_string(&envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::super::{Cli, Command};
    use super::*;
    use clap::Parser;

    const VM_ID: &str = "a774ddad-fca1-4670-86b2-605c88a16dab";
    const HOST_ID: &str = "00448c61-46f2-e711-906e-001560a04062";
    const IMAGE_ID: &str = "6ea6d824-d9b3-453f-9bf0-9167aba2fccc";

    #[test]
    fn test_parse_vm_manifest_bool() {
        let cli = Cli::try_parse_from([
            "cryptvol",
            "create-vm-manifest",
            VM_ID,
            HOST_ID,
            IMAGE_ID,
            "true",
        ])
        .unwrap();
        let Command::CreateVmManifest(args) = cli.command else {
            panic!("expected create-vm-manifest");
        };
        assert!(args.image_encrypted);
        assert!(!args.pretty);
    }

    #[test]
    fn test_non_boolean_flag_rejected() {
        let result = Cli::try_parse_from([
            "cryptvol",
            "create-vm-manifest",
            VM_ID,
            HOST_ID,
            IMAGE_ID,
            "maybe",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_container_manifest() {
        let manifest = build_container_manifest(VM_ID, HOST_ID, IMAGE_ID, true, false).unwrap();
        let json: serde_json::Value =
            serde_json::from_str(&render(manifest, false).unwrap()).unwrap();
        assert_eq!(json["instance_manifest"]["image_encrypted"], true);
        assert_eq!(json["instance_manifest"]["image_integrity_enforced"], false);
        assert_eq!(json["instance_manifest"]["instance_info"]["instance_id"], VM_ID);
    }

    #[tokio::test]
    async fn test_invalid_host_uuid_fails() {
        let args = VmManifestArgs {
            vm_id: VM_ID.to_string(),
            host_hardware_uuid: HOST_ID[..35].to_string(),
            image_id: IMAGE_ID.to_string(),
            image_encrypted: true,
            pretty: false,
        };
        let err = execute_vm(args).await.unwrap_err();
        assert!(err.to_string().contains("host hardware UUID"));
    }
}
