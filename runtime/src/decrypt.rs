//! Authenticated decryption of encrypted images.
//!
//! Images are AES-GCM encrypted (128, 192 or 256-bit keys, 16-byte tag, no
//! associated data). Two container layouts exist and the caller picks one
//! explicitly with [`ContainerFormat`]; a container is never retried under
//! the other layout.
//!
//! ## Header with offset (canonical)
//!
//! ```text
//! 0        12          16          offset
//! +--------+-----------+---- ... ---+----------------------+
//! |   IV   | offset LE |  reserved  | ciphertext || tag    |
//! +--------+-----------+---- ... ---+----------------------+
//! ```
//!
//! The offset field is honoured rather than assuming a 16-byte header, so
//! writers may extend the header without breaking readers.
//!
//! ## Legacy
//!
//! `nonce (12 bytes) || ciphertext || tag`, with no offset field.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, AeadCore, KeyInit};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use cryptvol_core::error::{CryptvolError, Result};
use ring::rand::{SecureRandom, SystemRandom};
use std::path::Path;
use std::str::FromStr;
use zeroize::Zeroizing;

/// GCM nonce length.
pub const IV_LEN: usize = 12;

/// GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Length of the fixed part of the canonical header.
pub const HEADER_LEN: usize = IV_LEN + 4;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// Layout of an encrypted container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ContainerFormat {
    /// IV plus little-endian payload offset.
    #[default]
    HeaderWithOffset,
    /// Nonce immediately followed by ciphertext. Deprecated.
    Legacy,
}

impl FromStr for ContainerFormat {
    type Err = CryptvolError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" | "header-with-offset" => Ok(ContainerFormat::HeaderWithOffset),
            "legacy" => Ok(ContainerFormat::Legacy),
            other => Err(CryptvolError::InvalidInput(format!(
                "unknown container format {other:?}, expected \"header\" or \"legacy\""
            ))),
        }
    }
}

/// Fixed part of the canonical container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub iv: [u8; IV_LEN],
    /// Byte offset of the ciphertext from the start of the container.
    pub payload_offset: u32,
}

impl ContainerHeader {
    /// Parse and bounds-check the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_LEN {
            return Err(CryptvolError::MalformedContainer(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                data.len()
            )));
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&data[..IV_LEN]);
        let mut offset = [0u8; 4];
        offset.copy_from_slice(&data[IV_LEN..HEADER_LEN]);
        let payload_offset = u32::from_le_bytes(offset);

        let start = payload_offset as usize;
        if start < HEADER_LEN || start > data.len() {
            return Err(CryptvolError::MalformedContainer(format!(
                "payload offset {payload_offset} outside {HEADER_LEN}..={}",
                data.len()
            )));
        }

        Ok(Self { iv, payload_offset })
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..IV_LEN].copy_from_slice(&self.iv);
        out[IV_LEN..].copy_from_slice(&self.payload_offset.to_le_bytes());
        out
    }
}

// ============================================================================
// Decryption
// ============================================================================

/// Decrypt a canonical (header-with-offset) container.
///
/// Fails with [`CryptvolError::Cipher`] for a key that is not 16, 24 or
/// 32 bytes, and with [`CryptvolError::Authentication`] when the tag does not
/// verify. No plaintext is returned on failure.
pub fn decrypt(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let header = ContainerHeader::parse(data)?;
    let ciphertext = &data[header.payload_offset as usize..];
    open(key, &header.iv, ciphertext)
}

/// Decrypt a legacy `nonce || ciphertext` container.
pub fn decrypt_legacy(data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    if data.len() < IV_LEN {
        return Err(CryptvolError::MalformedContainer(format!(
            "{} bytes is shorter than the {IV_LEN}-byte nonce",
            data.len()
        )));
    }
    let (nonce, ciphertext) = data.split_at(IV_LEN);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(nonce);
    open(key, &iv, ciphertext)
}

/// Decrypt `data` laid out as `format`.
pub fn decrypt_as(format: ContainerFormat, data: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    match format {
        ContainerFormat::HeaderWithOffset => decrypt(data, key),
        ContainerFormat::Legacy => {
            tracing::warn!("Decrypting deprecated legacy container format");
            decrypt_legacy(data, key)
        }
    }
}

fn open(key: &[u8], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>> {
    // Key length is checked first so a bad key is a cipher error no matter
    // how short the payload is.
    if !matches!(key.len(), 16 | 24 | 32) {
        return Err(invalid_key_length(key.len()));
    }
    if ciphertext.len() < TAG_LEN {
        return Err(CryptvolError::MalformedContainer(format!(
            "ciphertext of {} bytes cannot hold a {TAG_LEN}-byte tag",
            ciphertext.len()
        )));
    }

    match key.len() {
        16 => aead_open::<Aes128Gcm>(key, iv, ciphertext),
        24 => aead_open::<Aes192Gcm>(key, iv, ciphertext),
        _ => aead_open::<Aes256Gcm>(key, iv, ciphertext),
    }
}

fn aead_open<C>(key: &[u8], iv: &[u8; IV_LEN], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key_length(key.len()))?;
    cipher
        .decrypt(GenericArray::from_slice(iv), ciphertext)
        .map_err(|_| CryptvolError::Authentication)
}

// ============================================================================
// Encryption
// ============================================================================

/// Encrypt `plaintext` into a canonical container with a random IV.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; IV_LEN];
    SystemRandom::new()
        .fill(&mut iv)
        .map_err(|_| CryptvolError::Cipher("failed to generate random IV".to_string()))?;
    encrypt_with_iv(plaintext, key, &iv)
}

/// Encrypt `plaintext` into a canonical container using `iv`.
///
/// Reusing an IV under the same key breaks GCM; prefer [`encrypt`].
pub fn encrypt_with_iv(plaintext: &[u8], key: &[u8], iv: &[u8; IV_LEN]) -> Result<Vec<u8>> {
    let sealed = match key.len() {
        16 => aead_seal::<Aes128Gcm>(key, iv, plaintext)?,
        24 => aead_seal::<Aes192Gcm>(key, iv, plaintext)?,
        32 => aead_seal::<Aes256Gcm>(key, iv, plaintext)?,
        n => return Err(invalid_key_length(n)),
    };

    let header = ContainerHeader {
        iv: *iv,
        payload_offset: HEADER_LEN as u32,
    };
    let mut out = Vec::with_capacity(HEADER_LEN + sealed.len());
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&sealed);
    Ok(out)
}

fn aead_seal<C>(key: &[u8], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>>
where
    C: KeyInit + Aead + AeadCore<NonceSize = U12>,
{
    let cipher = C::new_from_slice(key).map_err(|_| invalid_key_length(key.len()))?;
    cipher
        .encrypt(GenericArray::from_slice(iv), plaintext)
        .map_err(|_| CryptvolError::Cipher("AES-GCM encryption failed".to_string()))
}

fn invalid_key_length(len: usize) -> CryptvolError {
    CryptvolError::Cipher(format!(
        "invalid key length {len}, expected 16, 24 or 32 bytes"
    ))
}

// ============================================================================
// Files
// ============================================================================

/// Read raw key bytes from `path`.
pub fn read_key_file(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
    Ok(Zeroizing::new(std::fs::read(path)?))
}

/// Decrypt the container at `input` and write the plaintext to `output`.
///
/// Nothing is written unless decryption succeeds. The output file is
/// created owner-only.
pub fn decrypt_file(
    format: ContainerFormat,
    input: &Path,
    key: &[u8],
    output: &Path,
) -> Result<()> {
    if output.as_os_str().to_string_lossy().trim().is_empty() {
        return Err(CryptvolError::InvalidInput(
            "decryption output path not given".to_string(),
        ));
    }

    let data = std::fs::read(input)?;
    let plaintext = Zeroizing::new(decrypt_as(format, &data, key)?);
    write_private(output, &plaintext)?;

    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        bytes = plaintext.len(),
        "Image decrypted"
    );
    Ok(())
}

fn write_private(path: &Path, contents: &[u8]) -> Result<()> {
    use std::io::Write;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()?;
    Ok(())
}
