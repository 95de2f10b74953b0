//! Authenticated encryption of whole buffers with AES-EAX
//!
//! The on-disk format is positional, without a length prefix:
//! - nonce: 16 bytes (fresh random per encryption)
//! - tag: 16 bytes (EAX authentication tag)
//! - ciphertext: same length as the plaintext
//!
//! AES-128, AES-192 or AES-256 is chosen from the key length. Decryption
//! is the only integrity check; there is no separate MAC. The layout is
//! the one written by pycryptodome's `AES.MODE_EAX` with default nonce and
//! tag sizes and no header, so those files decrypt here unchanged.

use aes::{Aes128, Aes192, Aes256};
use eax::Eax;
use eax::aead::generic_array::GenericArray;
use eax::aead::{AeadInPlace, KeyInit};
use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::key::Key;

/// Length of nonce in bytes
pub const NONCE_LEN: usize = 16;

/// Length of authentication tag in bytes
pub const TAG_LEN: usize = 16;

/// Smallest valid encrypted blob (empty ciphertext)
pub const HEADER_LEN: usize = NONCE_LEN + TAG_LEN;

enum Cipher {
    Aes128(Eax<Aes128>),
    Aes192(Eax<Aes192>),
    Aes256(Eax<Aes256>),
}

impl Cipher {
    fn new(key: &Key) -> Result<Self> {
        let bytes = key.as_bytes();
        let cipher = match bytes.len() {
            16 => Eax::<Aes128>::new_from_slice(bytes).map(Cipher::Aes128),
            24 => Eax::<Aes192>::new_from_slice(bytes).map(Cipher::Aes192),
            32 => Eax::<Aes256>::new_from_slice(bytes).map(Cipher::Aes256),
            n => {
                return Err(CryptError::with_kind(
                    ErrorCategory::Internal,
                    ErrorKind::InternalInvariant,
                    format!("key of {} bytes slipped past validation", n),
                ));
            }
        };
        cipher.map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "failed to initialise AES-EAX",
                e,
            )
        })
    }

    fn seal(&self, nonce: &[u8; NONCE_LEN], buffer: &mut [u8]) -> Result<[u8; TAG_LEN]> {
        let nonce = GenericArray::from_slice(nonce);
        let tag = match self {
            Cipher::Aes128(c) => c.encrypt_in_place_detached(nonce, b"", buffer),
            Cipher::Aes192(c) => c.encrypt_in_place_detached(nonce, b"", buffer),
            Cipher::Aes256(c) => c.encrypt_in_place_detached(nonce, b"", buffer),
        }
        .map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::InternalInvariant,
                "encryption failed",
                e,
            )
        })?;
        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&tag);
        Ok(out)
    }

    fn open(
        &self,
        nonce: &[u8; NONCE_LEN],
        buffer: &mut [u8],
        tag: &[u8; TAG_LEN],
    ) -> Result<()> {
        let nonce = GenericArray::from_slice(nonce);
        let tag = GenericArray::from_slice(tag);
        match self {
            Cipher::Aes128(c) => c.decrypt_in_place_detached(nonce, b"", buffer, tag),
            Cipher::Aes192(c) => c.decrypt_in_place_detached(nonce, b"", buffer, tag),
            Cipher::Aes256(c) => c.decrypt_in_place_detached(nonce, b"", buffer, tag),
        }
        .map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::User,
                ErrorKind::AuthenticationFailed,
                "corrupt input, tampered-with data, or wrong key",
                e,
            )
        })
    }
}

/// A borrowed view of the three parts of an encrypted blob.
#[derive(Debug, Clone, Copy)]
pub struct EncryptedBlob<'a> {
    pub nonce: &'a [u8; NONCE_LEN],
    pub tag: &'a [u8; TAG_LEN],
    pub ciphertext: &'a [u8],
}

impl<'a> EncryptedBlob<'a> {
    /// Splits `bytes` into nonce, tag and ciphertext.
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::TruncatedInput,
                format!(
                    "input likely truncated: {} bytes, need at least {}",
                    bytes.len(),
                    HEADER_LEN
                ),
            ));
        }
        let (nonce, rest) = bytes.split_at(NONCE_LEN);
        let (tag, ciphertext) = rest.split_at(TAG_LEN);
        Ok(Self {
            nonce: nonce.try_into().map_err(|_| invariant("nonce slice"))?,
            tag: tag.try_into().map_err(|_| invariant("tag slice"))?,
            ciphertext,
        })
    }
}

fn invariant(what: &str) -> CryptError {
    CryptError::with_kind(
        ErrorCategory::Internal,
        ErrorKind::InternalInvariant,
        format!("unexpected {} length", what),
    )
}

/// Encrypt plaintext under `key` with a fresh random nonce
///
/// Returns the binary format: nonce(16) + tag(16) + ciphertext(variable)
pub fn encrypt(key: &Key, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);

    encrypt_with_nonce(key, plaintext, &nonce)
}

/// Encrypt plaintext under `key` using the provided nonce
///
/// This function is ONLY for testing purposes to generate deterministic output.
/// NEVER use this in production - always use `encrypt()` which generates a random nonce.
pub fn encrypt_with_nonce(
    key: &Key,
    plaintext: &[u8],
    nonce: &[u8; NONCE_LEN],
) -> Result<Vec<u8>> {
    let cipher = Cipher::new(key)?;

    let mut output = Vec::with_capacity(HEADER_LEN + plaintext.len());
    output.extend_from_slice(nonce);
    output.extend_from_slice(&[0u8; TAG_LEN]);
    output.extend_from_slice(plaintext);

    let tag = cipher.seal(nonce, &mut output[HEADER_LEN..])?;
    output[NONCE_LEN..HEADER_LEN].copy_from_slice(&tag);

    Ok(output)
}

/// Decrypt a blob produced by [`encrypt`]
///
/// Fails with `AuthenticationFailed` when the tag does not verify; corrupted
/// plaintext is never returned.
pub fn decrypt(key: &Key, blob: &[u8]) -> Result<Vec<u8>> {
    let parts = EncryptedBlob::parse(blob)?;
    let cipher = Cipher::new(key)?;

    let mut plaintext = parts.ciphertext.to_vec();
    cipher.open(parts.nonce, &mut plaintext, parts.tag)?;

    Ok(plaintext)
}
