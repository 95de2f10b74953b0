//! Byte-frequency heuristic for telling ciphertext from plaintext
//!
//! Ciphertext has a near-uniform byte distribution, so no byte value
//! occurs much more often than `len / 256`. Text and structured
//! documents draw from a small alphabet and have a pronounced peak.
//! The buffer is classified as encrypted when the most frequent byte
//! value stays below `average + sigma * sqrt(average)`.
//!
//! This is a heuristic. Buffers shorter than about ten bytes can never
//! be classified as encrypted, and short ciphertexts (a few hundred
//! bytes) are occasionally classified as plaintext.

use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};

/// Default multiplier on the standard deviation of a uniform histogram.
pub const DEFAULT_SIGMA: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detector {
    sigma: f64,
}

impl Detector {
    /// Builds a detector with a custom sigma, which must be finite and positive.
    pub fn new(sigma: f64) -> Result<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::InvalidConfig,
                format!("sigma must be a finite positive number, got {}", sigma),
            ));
        }
        Ok(Self { sigma })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Returns true when `bytes` looks like ciphertext.
    ///
    /// An empty buffer is never considered encrypted.
    pub fn looks_encrypted(&self, bytes: &[u8]) -> bool {
        if bytes.is_empty() {
            return false;
        }

        let mut histogram = [0usize; 256];
        for &b in bytes {
            histogram[b as usize] += 1;
        }
        let largest = histogram.iter().copied().max().unwrap_or(0) as f64;
        let average = bytes.len() as f64 / 256.0;

        largest < average + self.sigma * average.sqrt()
    }
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            sigma: DEFAULT_SIGMA,
        }
    }
}

/// Classifies `bytes` with the default sigma.
pub fn looks_encrypted(bytes: &[u8]) -> bool {
    Detector::default().looks_encrypted(bytes)
}
