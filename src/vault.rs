//! Secret vault for the single at-rest secret (the AI provider API key).
//!
//! Sealed blob format (v1), stored as a JSON string inside the settings
//! document:
//!
//! ```text
//! {"v":1,"nonce":"<b64 24 bytes>","tag":"<b64 16 bytes>","ciphertext":"<b64>"}
//! ```
//!
//! The cipher is XChaCha20-Poly1305 with a fresh random nonce per call. The
//! key is derived with Argon2id from the installation path plus a constant
//! application salt, salted with a random per-installation value created once
//! and kept in the data root. Same installation, same key; a moved
//! installation or a lost salt file makes old blobs undecryptable, which
//! callers see as "no secret configured".

use std::path::Path;

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Blob format version.
pub const SEALED_VERSION: u8 = 1;

/// Derived key length (256-bit).
pub const KEY_LEN: usize = 32;

/// XChaCha20-Poly1305 nonce length.
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag length.
pub const TAG_LEN: usize = 16;

/// Per-installation salt length.
pub const INSTALL_SALT_LEN: usize = 16;

/// Name of the salt file inside the data root.
pub const INSTALL_SALT_FILE: &str = "installation.salt";

const APP_SALT: &str = "rss-util:secret-vault:v1";

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Invalid sealed blob: {0}")]
    InvalidFormat(String),

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed")]
    DecryptionFailed,
}

#[derive(Serialize, Deserialize)]
struct SealedBlob {
    v: u8,
    nonce: String,
    tag: String,
    ciphertext: String,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct VaultKey([u8; KEY_LEN]);

pub struct SecretVault {
    key: VaultKey,
}

impl std::fmt::Debug for SecretVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretVault").finish_non_exhaustive()
    }
}

impl SecretVault {
    /// Builds a vault whose key is bound to `installation` and `install_salt`.
    pub fn new(installation: &Path, install_salt: &[u8]) -> Result<Self, VaultError> {
        let key = derive_key(installation, install_salt)?;
        Ok(Self { key: VaultKey(key) })
    }

    /// Seals `plaintext`. `None` for empty input or any cipher failure.
    pub fn encrypt(&self, plaintext: &str) -> Option<String> {
        if plaintext.is_empty() {
            return None;
        }
        match self.seal(plaintext) {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!("Failed to encrypt secret: {}", e);
                None
            }
        }
    }

    /// Opens a sealed blob. `None` when it is malformed, tampered with, or was
    /// sealed under a different key.
    pub fn decrypt(&self, sealed: &str) -> Option<String> {
        if sealed.trim().is_empty() {
            return None;
        }
        match self.open(sealed) {
            Ok(plaintext) => Some(plaintext),
            Err(e) => {
                tracing::debug!("Secret unavailable: {}", e);
                None
            }
        }
    }

    fn seal(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill(&mut nonce);

        let cipher = XChaCha20Poly1305::new((&self.key.0).into());
        let mut sealed = cipher
            .encrypt(XNonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| VaultError::EncryptionFailed)?;

        // The AEAD output is ciphertext followed by the tag.
        let tag = sealed.split_off(sealed.len() - TAG_LEN);
        let blob = SealedBlob {
            v: SEALED_VERSION,
            nonce: BASE64.encode(nonce),
            tag: BASE64.encode(tag),
            ciphertext: BASE64.encode(&sealed),
        };
        serde_json::to_string(&blob).map_err(|e| VaultError::InvalidFormat(e.to_string()))
    }

    fn open(&self, sealed: &str) -> Result<String, VaultError> {
        let blob: SealedBlob =
            serde_json::from_str(sealed).map_err(|e| VaultError::InvalidFormat(e.to_string()))?;
        if blob.v != SEALED_VERSION {
            return Err(VaultError::InvalidFormat(format!(
                "unsupported version {}",
                blob.v
            )));
        }

        let nonce = decode_field("nonce", &blob.nonce)?;
        let tag = decode_field("tag", &blob.tag)?;
        let mut payload = decode_field("ciphertext", &blob.ciphertext)?;
        if nonce.len() != NONCE_LEN {
            return Err(VaultError::InvalidFormat("bad nonce length".to_string()));
        }
        if tag.len() != TAG_LEN {
            return Err(VaultError::InvalidFormat("bad tag length".to_string()));
        }
        payload.extend_from_slice(&tag);

        let cipher = XChaCha20Poly1305::new((&self.key.0).into());
        let mut plaintext = cipher
            .decrypt(XNonce::from_slice(&nonce), payload.as_ref())
            .map_err(|_| VaultError::DecryptionFailed)?;

        let secret = String::from_utf8(plaintext.clone())
            .map_err(|_| VaultError::InvalidFormat("plaintext is not UTF-8".to_string()));
        plaintext.zeroize();
        secret
    }
}

fn decode_field(name: &str, value: &str) -> Result<Vec<u8>, VaultError> {
    BASE64
        .decode(value)
        .map_err(|_| VaultError::InvalidFormat(format!("{name} is not base64")))
}

/// Argon2id over installation path + application salt, salted per installation.
/// Deterministic for the same inputs.
pub fn derive_key(installation: &Path, install_salt: &[u8]) -> Result<[u8; KEY_LEN], VaultError> {
    let mut password = installation.to_string_lossy().into_owned().into_bytes();
    password.extend_from_slice(APP_SALT.as_bytes());

    let params = Params::new(Params::DEFAULT_M_COST, Params::DEFAULT_T_COST, 1, Some(KEY_LEN))
        .map_err(|e| VaultError::KeyDerivation(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let mut key = [0u8; KEY_LEN];
    let result = argon2
        .hash_password_into(&password, install_salt, &mut key)
        .map_err(|e| VaultError::KeyDerivation(e.to_string()));
    password.zeroize();
    result?;
    Ok(key)
}

/// Loads the per-installation salt from `data_dir`, creating it on first use.
/// An unreadable or malformed salt file is replaced by a fresh salt.
pub async fn load_or_create_install_salt(data_dir: &Path) -> Result<Vec<u8>, VaultError> {
    let path = data_dir.join(INSTALL_SALT_FILE);
    match tokio::fs::read(&path).await {
        Ok(bytes) => match BASE64.decode(String::from_utf8_lossy(&bytes).trim()) {
            Ok(salt) if salt.len() == INSTALL_SALT_LEN => return Ok(salt),
            _ => tracing::warn!(
                "Installation salt at {} is malformed, regenerating",
                path.display()
            ),
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let salt = fresh_install_salt();
    tokio::fs::create_dir_all(data_dir).await?;
    tokio::fs::write(&path, BASE64.encode(&salt)).await?;
    tracing::info!("Created installation salt at {}", path.display());
    Ok(salt)
}

/// A new random installation salt.
pub fn fresh_install_salt() -> Vec<u8> {
    let mut salt = vec![0u8; INSTALL_SALT_LEN];
    rand::thread_rng().fill(salt.as_mut_slice());
    salt
}
