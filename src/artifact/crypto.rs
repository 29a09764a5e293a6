//! Passphrase encryption of artifact sections.
//!
//! AES-256-GCM with the SHA-256 digest of the passphrase as key and a random
//! 96-bit nonce per encryption. Nonce and ciphertext are hex encoded.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ArtifactError;

const NONCE_LEN: usize = 12;

/// An encrypted payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    /// Hex-encoded nonce.
    pub nonce: String,
    /// Hex-encoded ciphertext with authentication tag.
    pub ciphertext: String,
}

fn cipher(passphrase: &str) -> Result<Aes256Gcm, ArtifactError> {
    let key = Sha256::digest(passphrase.as_bytes());
    Aes256Gcm::new_from_slice(&key).map_err(|e| ArtifactError::Encryption {
        message: e.to_string(),
    })
}

/// Encrypts `plaintext` with a key derived from `passphrase`.
///
/// # Errors
///
/// Returns `ArtifactError::Encryption` if the cipher rejects the input.
pub fn seal(plaintext: &[u8], passphrase: &str) -> Result<Sealed, ArtifactError> {
    let cipher = cipher(passphrase)?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| ArtifactError::Encryption {
            message: e.to_string(),
        })?;

    Ok(Sealed {
        nonce: hex::encode(nonce),
        ciphertext: hex::encode(ciphertext),
    })
}

/// Decrypts a payload sealed with the same passphrase.
///
/// # Errors
///
/// Returns `ArtifactError::Decryption` for malformed hex, a bad nonce, a
/// wrong passphrase or tampered ciphertext.
pub fn open(sealed: &Sealed, passphrase: &str) -> Result<Vec<u8>, ArtifactError> {
    let decryption = |message: String| ArtifactError::Decryption { message };

    let nonce = hex::decode(&sealed.nonce).map_err(|e| decryption(format!("invalid nonce: {e}")))?;
    if nonce.len() != NONCE_LEN {
        return Err(decryption(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    let ciphertext =
        hex::decode(&sealed.ciphertext).map_err(|e| decryption(format!("invalid ciphertext: {e}")))?;

    cipher(passphrase)?
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice())
        .map_err(|_| decryption(String::from("wrong key or corrupted data")))
}
