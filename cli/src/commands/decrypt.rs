//! `cryptvol decrypt` command.

use std::path::PathBuf;

use clap::Args;
use cryptvol_runtime::decrypt::{decrypt_file, ContainerFormat};

use super::KeyArgs;

#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Encrypted image
    pub input: PathBuf,

    /// Where to write the decrypted image (mode 0600)
    pub output: PathBuf,

    /// Container layout: header (IV + payload offset) or legacy (nonce + ciphertext)
    #[arg(long, default_value = "header")]
    pub format: ContainerFormat,

    #[command(flatten)]
    pub key: KeyArgs,
}

pub async fn execute(args: DecryptArgs) -> Result<(), Box<dyn std::error::Error>> {
    let key = args.key.load()?;
    let DecryptArgs {
        input,
        output,
        format,
        ..
    } = args;

    println!("Decrypting the image file...");

    let target = output.clone();
    tokio::task::spawn_blocking(move || decrypt_file(format, &input, &key, &output)).await??;

    println!("Decrypted image will be found in: {}", target.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::{dispatch, Cli, Command};
    use super::*;
    use clap::Parser;
    use cryptvol_core::config::RuntimeConfig;

    #[test]
    fn test_parse_decrypt_defaults_to_header_format() {
        let cli =
            Cli::try_parse_from(["cryptvol", "decrypt", "a.enc", "a.img", "--key", "00"]).unwrap();
        let Command::Decrypt(args) = cli.command else {
            panic!("expected decrypt");
        };
        assert_eq!(args.format, ContainerFormat::HeaderWithOffset);
    }

    #[test]
    fn test_parse_legacy_format() {
        let cli = Cli::try_parse_from([
            "cryptvol", "decrypt", "a.enc", "a.img", "--format", "legacy", "--key-file", "k.bin",
        ])
        .unwrap();
        let Command::Decrypt(args) = cli.command else {
            panic!("expected decrypt");
        };
        assert_eq!(args.format, ContainerFormat::Legacy);
        assert_eq!(args.key.key_file, Some(PathBuf::from("k.bin")));
    }

    #[tokio::test]
    async fn test_decrypt_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let key = [0x42u8; 32];
        let input = dir.path().join("image.enc");
        let output = dir.path().join("image.img");
        std::fs::write(&input, cryptvol_runtime::encrypt(b"disk", &key).unwrap()).unwrap();

        let hex_key = "42".repeat(32);
        let cli = Cli::try_parse_from([
            "cryptvol",
            "decrypt",
            input.to_str().unwrap(),
            output.to_str().unwrap(),
            "--key",
            hex_key.as_str(),
        ])
        .unwrap();

        dispatch(cli, RuntimeConfig::default()).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"disk");
    }
}
