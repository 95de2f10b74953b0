//! Key material and the sources it can be read from

use std::fmt;
use std::io::{self, IsTerminal, Read, Write};
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use zeroize::Zeroizing;

use crate::error::{CryptError, ErrorCategory, ErrorKind, Result};

/// Key lengths accepted by the cipher (AES-128, AES-192, AES-256).
pub const KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// A symmetric key, validated for length and wiped from memory on drop.
#[derive(Clone)]
pub struct Key {
    bytes: Zeroizing<Vec<u8>>,
}

impl Key {
    /// Wraps raw key bytes, rejecting lengths the cipher cannot use.
    pub fn new(bytes: Zeroizing<Vec<u8>>) -> Result<Self> {
        if !KEY_LENGTHS.contains(&bytes.len()) {
            return Err(CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyLength,
                format!(
                    "key must be 16, 24 or 32 bytes long, got {} bytes",
                    bytes.len()
                ),
            ));
        }
        Ok(Self { bytes })
    }

    /// Decodes key text according to `encoding`.
    pub fn from_text(text: &[u8], encoding: KeyEncoding) -> Result<Self> {
        match encoding {
            KeyEncoding::Utf8 => Self::new(Zeroizing::new(text.to_vec())),
            KeyEncoding::Base64 => {
                let decoded = STANDARD.decode(text).map_err(|e| {
                    CryptError::with_kind_and_source(
                        ErrorCategory::User,
                        ErrorKind::KeyUnavailable,
                        format!("key is not valid base64: {}", e),
                        e,
                    )
                })?;
                Self::new(Zeroizing::new(decoded))
            }
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key([REDACTED; {}])", self.bytes.len())
    }
}

/// How key text handed to us is turned into key bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyEncoding {
    /// The UTF-8 bytes of the text are the key.
    #[default]
    Utf8,
    /// The text is standard base64 of the key bytes.
    Base64,
}

impl FromStr for KeyEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" | "text" => Ok(KeyEncoding::Utf8),
            "base64" => Ok(KeyEncoding::Base64),
            other => Err(format!("unknown key encoding '{}'", other)),
        }
    }
}

/// Trait for reading key text from various sources
pub trait KeyReader {
    /// Read key text as arbitrary bytes (not necessarily UTF-8)
    ///
    /// Returns the text wrapped in `Zeroizing` to ensure it is securely
    /// wiped from memory when dropped.
    fn read_key(&mut self) -> Result<Zeroizing<Vec<u8>>>;
}

/// Returns fixed key text (command line, environment, tests)
pub struct ConstantKeyReader {
    text: Zeroizing<Vec<u8>>,
}

impl ConstantKeyReader {
    pub fn new(text: Vec<u8>) -> Self {
        Self {
            text: Zeroizing::new(text),
        }
    }
}

impl KeyReader for ConstantKeyReader {
    fn read_key(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new((*self.text).clone()))
    }
}

/// Reads key text from any io::Read source, dropping one trailing newline
pub struct ReaderKeyReader {
    reader: Box<dyn Read>,
}

impl ReaderKeyReader {
    pub fn new(reader: Box<dyn Read>) -> Self {
        Self { reader }
    }
}

impl KeyReader for ReaderKeyReader {
    fn read_key(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        let mut data = Zeroizing::new(Vec::new());
        self.reader.read_to_end(&mut data).map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyUnavailable,
                format!("error reading key: {}", e),
                e,
            )
        })?;
        if data.ends_with(b"\n") {
            data.pop();
            if data.ends_with(b"\r") {
                data.pop();
            }
        }
        Ok(data)
    }
}

/// Reads key text from terminal with no echo
#[derive(Default)]
pub struct TerminalKeyReader;

impl TerminalKeyReader {
    pub fn new() -> Self {
        Self
    }
}

impl KeyReader for TerminalKeyReader {
    /// Read key text from terminal.
    ///
    /// Note: Terminal input is limited to UTF-8 due to rpassword library constraints.
    /// For binary keys, use base64 encoding or --key-stdin instead.
    fn read_key(&mut self) -> Result<Zeroizing<Vec<u8>>> {
        if !io::stdin().is_terminal() {
            return Err(CryptError::with_kind(
                ErrorCategory::User,
                ErrorKind::KeyUnavailable,
                "cannot read key from terminal - stdin is not a terminal",
            ));
        }

        io::stderr().write_all(b"Key (filecrypt): ").map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to write prompt: {}", e),
                e,
            )
        })?;
        io::stderr().flush().map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::Io,
                format!("failed to flush prompt: {}", e),
                e,
            )
        })?;

        // rpassword hands back a plain String; move it into a zeroizing buffer at once
        let text = rpassword::read_password().map_err(|e| {
            CryptError::with_kind_and_source(
                ErrorCategory::Internal,
                ErrorKind::KeyUnavailable,
                format!("failure reading key: {}", e),
                e,
            )
        })?;

        Ok(Zeroizing::new(text.into_bytes()))
    }
}

/// Reads text from `reader` and decodes it into a key.
pub fn read_key(reader: &mut dyn KeyReader, encoding: KeyEncoding) -> Result<Key> {
    let text = reader.read_key()?;
    Key::from_text(&text, encoding)
}
