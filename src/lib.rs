//! filecrypt - in-place file and directory encryption with AES-EAX
//!
//! Documents (JSON) and text files are sealed with AES-EAX under a
//! caller-supplied key; images and PDFs are XOR-obfuscated. Encrypted JSON
//! and XML documents can be queried for individual fields without writing
//! the plaintext back to disk.

#![forbid(unsafe_code)]

pub mod cipher;
pub mod codec;
pub mod config;
pub mod detect;
pub mod document;
pub mod error;
pub mod file_ops;
pub mod key;
pub mod validate;
pub mod walk;

pub use config::EngineConfig;
pub use error::{CryptError, ErrorCategory, ErrorKind, Result};
pub use key::Key;
