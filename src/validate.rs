//! Trial decryption to confirm a key before anything destructive happens

use std::fs;
use std::path::Path;

use tracing::debug;

use crate::cipher;
use crate::key::Key;

/// Returns true iff the blob decrypts and its tag verifies under `key`.
pub fn validate_blob(key: &Key, blob: &[u8]) -> bool {
    cipher::decrypt(key, blob).is_ok()
}

/// Returns true iff the file at `path` decrypts under `key`.
///
/// Any failure (unreadable file, truncated framing, tag mismatch) reads as
/// "this key is not valid for this file".
pub fn validate(key: &Key, path: &Path) -> bool {
    match fs::read(path) {
        Ok(blob) => validate_blob(key, &blob),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "key validation could not read file");
            false
        }
    }
}
