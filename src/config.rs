//! Per-operation configuration

use crate::detect::Detector;
use crate::key::Key;

/// Everything an operation needs besides the path it works on.
///
/// The value is immutable and passed by reference into each call, so
/// operations never depend on the order in which a caller configured
/// them. It is `Sync`, which lets the directory walker share one
/// instance across worker threads.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    key: Key,
    detector: Detector,
}

impl EngineConfig {
    pub fn new(key: Key) -> Self {
        Self {
            key,
            detector: Detector::default(),
        }
    }

    /// Replaces the plaintext detector, e.g. to tune its sigma.
    pub fn with_detector(mut self, detector: Detector) -> Self {
        self.detector = detector;
        self
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    pub fn detector(&self) -> &Detector {
        &self.detector
    }
}
