//! AES-256-GCM over whole in-memory payloads.
//!
//! The ciphertext format is self-contained: `nonce (12) ++ body ++ tag (16)`.
//! A fresh nonce is drawn from the OS CSPRNG for every [`seal`] call, so the
//! same key can be reused across all chunks of a run.

use std::fmt;

use aes_gcm::{
    aead::{AeadInPlace, KeyInit},
    Aes256Gcm, Nonce, Tag,
};
use rand::{rngs::OsRng, RngCore};

use crate::error::CryptoError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;
/// Bytes [`seal`] adds on top of the plaintext.
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// A 256-bit symmetric key. Lives in memory only.
#[derive(Clone)]
pub struct Key([u8; KEY_LEN]);

impl Key {
    /// Draws a new key from the OS CSPRNG.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut bytes = [0u8; KEY_LEN];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(CryptoError::RandomSource)?;
        Ok(Self(bytes))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(bytes))
    }

    fn cipher(&self) -> Result<Aes256Gcm, CryptoError> {
        Aes256Gcm::new_from_slice(&self.0).map_err(|_| CryptoError::InvalidKeyLength(self.0.len()))
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Key(..)")
    }
}

/// Encrypts and authenticates `plaintext` under `key` with no associated data.
pub fn seal(plaintext: &[u8], key: &Key) -> Result<Vec<u8>, CryptoError> {
    let cipher = key.cipher()?;

    let mut out = Vec::with_capacity(plaintext.len() + OVERHEAD);
    out.resize(NONCE_LEN, 0);
    OsRng
        .try_fill_bytes(&mut out[..NONCE_LEN])
        .map_err(CryptoError::RandomSource)?;
    out.extend_from_slice(plaintext);

    let (nonce, body) = out.split_at_mut(NONCE_LEN);
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(nonce), b"", body)
        .map_err(|_| CryptoError::Seal)?;
    out.extend_from_slice(&tag);
    Ok(out)
}

/// Authenticates and decrypts the output of [`seal`].
///
/// Any modification of the input, or a different key, yields
/// [`CryptoError::Authentication`]; no plaintext is returned in that case.
pub fn open(ciphertext: &[u8], key: &Key) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < OVERHEAD {
        return Err(CryptoError::TooShort(ciphertext.len()));
    }
    let cipher = key.cipher()?;

    let (nonce, rest) = ciphertext.split_at(NONCE_LEN);
    let (body, tag) = rest.split_at(rest.len() - TAG_LEN);
    let mut plaintext = body.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(nonce),
            b"",
            &mut plaintext,
            Tag::from_slice(tag),
        )
        .map_err(|_| CryptoError::Authentication)?;
    Ok(plaintext)
}
