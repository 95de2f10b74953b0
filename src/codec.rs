//! Per-file-type transforms between on-disk bytes and the payload the cipher sees

use std::fmt;
use std::path::Path;

use serde_json::Value;

use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};
use crate::key::Key;

const DOCUMENT_EXTENSIONS: &[&str] = &["json"];
const TEXT_EXTENSIONS: &[&str] = &["txt", "xml", "csv"];
const BINARY_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "pdf"];

/// The content class a file belongs to, resolved once from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentClass {
    /// Structured documents (JSON). Canonicalised before encryption.
    Document,
    /// Markup and plain text. Must be UTF-8; passed through unchanged.
    Text,
    /// Images and PDFs. XOR-obfuscated with the key, no authentication.
    Binary,
}

impl ContentClass {
    /// Maps a file extension (case-insensitive, without the dot) to a class.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentClass::Document)
        } else if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentClass::Text)
        } else if BINARY_EXTENSIONS.contains(&ext.as_str()) {
            Some(ContentClass::Binary)
        } else {
            None
        }
    }

    /// Resolves the class of `path`, failing with `UnsupportedExtension`.
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_extension(&ext).ok_or_else(|| {
            CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::UnsupportedExtension,
                format!("file extension was not supported: '.{}'", ext),
            )
        })
    }

    /// Whether files of this class are protected by the authenticated cipher.
    pub fn is_authenticated(self) -> bool {
        !matches!(self, ContentClass::Binary)
    }
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentClass::Document => "document",
            ContentClass::Text => "text",
            ContentClass::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Document formats that field lookup and listing understand.
///
/// XML is stored as text, so this is resolved separately from
/// [`ContentClass`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Xml,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_string_lossy().to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(DocumentFormat::Json),
            "xml" => Some(DocumentFormat::Xml),
            _ => None,
        }
    }
}

/// Turns on-disk bytes into the canonical payload handed to the cipher.
///
/// Documents are parsed and re-serialised in pretty form with two-space
/// indentation; text is checked for UTF-8; binary content is returned as-is.
pub fn encode(class: ContentClass, raw: &[u8]) -> Result<Vec<u8>> {
    match class {
        ContentClass::Document => canonicalize(&parse_document(raw)?),
        ContentClass::Text => {
            check_utf8(raw)?;
            Ok(raw.to_vec())
        }
        ContentClass::Binary => Ok(raw.to_vec()),
    }
}

/// Turns a decrypted payload back into the bytes written to disk.
pub fn decode(class: ContentClass, payload: &[u8]) -> Result<Vec<u8>> {
    match class {
        ContentClass::Document => canonicalize(&parse_document(payload)?),
        ContentClass::Text => {
            check_utf8(payload)?;
            Ok(payload.to_vec())
        }
        ContentClass::Binary => Ok(payload.to_vec()),
    }
}

/// Parses a structured document, preserving key order.
pub fn parse_document(bytes: &[u8]) -> Result<Value> {
    serde_json::from_slice(bytes).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedDocument,
            format!("document is not valid JSON: {}", e),
            e,
        )
    })
}

fn canonicalize(value: &Value) -> Result<Vec<u8>> {
    serde_json::to_vec_pretty(value).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::InternalInvariant,
            "failed to serialise document",
            e,
        )
    })
}

fn check_utf8(bytes: &[u8]) -> Result<()> {
    std::str::from_utf8(bytes).map(|_| ()).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::User,
            ErrorKind::MalformedDocument,
            format!("text is not valid UTF-8: {}", e),
            e,
        )
    })
}

/// XORs `data` with the key repeated to the length of `data`.
///
/// Applying it twice with the same key returns the original bytes. This
/// is obfuscation, not encryption: once the data is longer than the key
/// the keystream repeats, and nothing detects tampering.
pub fn xor_with_key(data: &[u8], key: &Key) -> Vec<u8> {
    data.iter()
        .zip(key.as_bytes().iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}
