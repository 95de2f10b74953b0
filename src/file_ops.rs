//! Single-file operations
//!
//! Every operation here works in place: the file at `path` is read,
//! transformed, and atomically replaced. Lookups and listings decrypt into
//! memory only and never modify the file.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::cipher;
use crate::codec::{self, ContentClass, DocumentFormat};
use crate::config::EngineConfig;
use crate::document::{Document, FieldLookup};
use crate::error::{CryptError, ErrorCategory, ErrorKind, Result, io_error, short_path};
use crate::validate;

/// What the plaintext detector (and the extension table) made of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Plaintext,
    Ciphertext,
    Unsupported,
    Empty,
}

/// A file as it was before an operation touched it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub class: Option<ContentClass>,
    pub size: u64,
    pub classification: Classification,
}

struct Loaded {
    record: FileRecord,
    class: ContentClass,
    bytes: Vec<u8>,
}

/// Classifies `path` without modifying it.
pub fn inspect(path: &Path, config: &EngineConfig) -> Result<FileRecord> {
    let size = fs::metadata(path)
        .map_err(|e| io_error("open", path, e))?
        .len();
    let class = ContentClass::from_path(path).ok();
    let classification = if size == 0 {
        Classification::Empty
    } else if class.is_none() {
        Classification::Unsupported
    } else {
        let bytes = fs::read(path).map_err(|e| io_error("read", path, e))?;
        classify(config, &bytes)
    };
    Ok(FileRecord {
        path: path.to_path_buf(),
        class,
        size,
        classification,
    })
}

fn classify(config: &EngineConfig, bytes: &[u8]) -> Classification {
    if config.detector().looks_encrypted(bytes) {
        Classification::Ciphertext
    } else {
        Classification::Plaintext
    }
}

fn load(path: &Path, config: &EngineConfig) -> Result<Loaded> {
    debug!(path = %path.display(), "reading in data");
    let size = fs::metadata(path)
        .map_err(|e| io_error("open", path, e))?
        .len();
    if size == 0 {
        return Err(CryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::EmptyFile,
            format!("cannot process empty file '~/{}'", short_path(path)),
        ));
    }
    let class = ContentClass::from_path(path)?;
    let bytes = fs::read(path).map_err(|e| io_error("read", path, e))?;
    let record = FileRecord {
        path: path.to_path_buf(),
        class: Some(class),
        size,
        classification: classify(config, &bytes),
    };
    Ok(Loaded {
        record,
        class,
        bytes,
    })
}

fn state_error(kind: ErrorKind, path: &Path, state: &str) -> CryptError {
    CryptError::with_kind(
        ErrorCategory::User,
        kind,
        format!("file '{}' is already {}", short_path(path), state),
    )
}

fn invalid_key(path: &Path) -> CryptError {
    CryptError::with_kind(
        ErrorCategory::User,
        ErrorKind::InvalidKey,
        format!("invalid encryption key for '{}'", short_path(path)),
    )
}

/// Checks the guard and the key, then decrypts an authenticated blob in memory.
fn open_sealed(loaded: &Loaded, config: &EngineConfig) -> Result<Vec<u8>> {
    let path = &loaded.record.path;
    if loaded.record.classification != Classification::Ciphertext {
        return Err(state_error(ErrorKind::AlreadyDecrypted, path, "decrypted"));
    }
    debug!(path = %path.display(), "validating key");
    if !validate::validate_blob(config.key(), &loaded.bytes) {
        return Err(invalid_key(path));
    }
    debug!(path = %path.display(), "decrypting file");
    cipher::decrypt(config.key(), &loaded.bytes)
}

/// Upper bound on fresh-nonce attempts in [`seal`].
const MAX_SEAL_ATTEMPTS: usize = 256;

/// Encrypts `payload`, retrying with a fresh nonce until the detector reads
/// the blob as ciphertext.
///
/// A short blob can repeat a byte value by chance and then reads as
/// plaintext, which would make the decrypt guard refuse it forever.
fn seal(path: &Path, payload: &[u8], config: &EngineConfig) -> Result<Vec<u8>> {
    for attempt in 1..=MAX_SEAL_ATTEMPTS {
        let sealed = cipher::encrypt(config.key(), payload)?;
        if config.detector().looks_encrypted(&sealed) {
            if attempt > 1 {
                debug!(path = %path.display(), attempt, "resealed with a fresh nonce");
            }
            return Ok(sealed);
        }
    }
    Err(CryptError::with_kind(
        ErrorCategory::User,
        ErrorKind::UndetectableCiphertext,
        format!(
            "ciphertext for '{}' still reads as plaintext after {} attempts, refusing to write it",
            short_path(path),
            MAX_SEAL_ATTEMPTS
        ),
    ))
}

fn warn_unauthenticated(path: &Path) {
    warn!(
        path = %path.display(),
        "binary content is XOR-obfuscated with the key; \
         it is not authenticated and offers weak confidentiality"
    );
}

/// Encrypt a file in place
///
/// Empty files, unsupported extensions and files that already look
/// encrypted are refused before anything is written. Documents and text
/// are sealed with AES-EAX; binary media is XOR-obfuscated.
pub fn encrypt_file(path: &Path, config: &EngineConfig) -> Result<FileRecord> {
    let loaded = load(path, config)?;

    let output = match loaded.class {
        ContentClass::Document | ContentClass::Text => {
            if loaded.record.classification == Classification::Ciphertext {
                return Err(state_error(ErrorKind::AlreadyEncrypted, path, "encrypted"));
            }
            let payload = codec::encode(loaded.class, &loaded.bytes)?;
            debug!(path = %path.display(), "encrypting file");
            seal(path, &payload, config)?
        }
        ContentClass::Binary => {
            warn_unauthenticated(path);
            codec::xor_with_key(&loaded.bytes, config.key())
        }
    };

    write_atomic(path, &output)?;
    info!(path = %path.display(), class = %loaded.class, "encrypted file");
    Ok(loaded.record)
}

/// Decrypt a file in place
///
/// For documents and text the key is validated against the stored tag
/// before the file is touched, so a wrong key surfaces as `InvalidKey` and
/// leaves the file intact. When `open_result` is set the decrypted file is
/// handed to the platform's default application afterwards.
pub fn decrypt_file(path: &Path, config: &EngineConfig, open_result: bool) -> Result<FileRecord> {
    let loaded = load(path, config)?;

    let output = match loaded.class {
        ContentClass::Document | ContentClass::Text => {
            let payload = open_sealed(&loaded, config)?;
            codec::decode(loaded.class, &payload)?
        }
        ContentClass::Binary => {
            warn_unauthenticated(path);
            codec::xor_with_key(&loaded.bytes, config.key())
        }
    };

    write_atomic(path, &output)?;
    info!(path = %path.display(), class = %loaded.class, "decrypted file");

    if open_result {
        debug!(path = %path.display(), "opening file");
        if let Err(e) = open_in_default_app(path) {
            warn!(path = %path.display(), error = %e, "could not open decrypted file");
        }
    }
    Ok(loaded.record)
}

/// Decrypts an encrypted JSON or XML document into memory and parses it.
pub fn read_document(path: &Path, config: &EngineConfig) -> Result<Document> {
    let loaded = load(path, config)?;
    let Some(format) = DocumentFormat::from_path(path) else {
        return Err(CryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedExtension,
            format!(
                "field lookup requires a JSON or XML document, '{}' is {}",
                short_path(path),
                loaded.class
            ),
        ));
    };
    let payload = open_sealed(&loaded, config)?;
    Document::parse(format, &payload)
}

/// Looks up each of `fields` in the encrypted document at `path`.
///
/// A missing field is reported as `found: None` rather than an error so
/// that one miss does not hide the other results.
pub fn lookup_fields<S: AsRef<str>>(
    path: &Path,
    config: &EngineConfig,
    fields: &[S],
) -> Result<Vec<FieldLookup>> {
    let document = read_document(path, config)?;
    debug!(path = %path.display(), "searching for keyword");
    Ok(document.lookup_all(fields))
}

/// Lists the top-level field names of the encrypted document at `path`, sorted.
pub fn list_fields(path: &Path, config: &EngineConfig) -> Result<Vec<String>> {
    Ok(read_document(path, config)?.field_names())
}

/// Checks the configured key against the encrypted file at `path`.
///
/// Only authenticated classes carry a tag to check; binary files and files
/// that do not look encrypted are refused.
pub fn verify_key(path: &Path, config: &EngineConfig) -> Result<bool> {
    let loaded = load(path, config)?;
    if !loaded.class.is_authenticated() {
        return Err(CryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::UnsupportedExtension,
            format!(
                "key verification requires authenticated content, '{}' is {}",
                short_path(path),
                loaded.class
            ),
        ));
    }
    if loaded.record.classification != Classification::Ciphertext {
        return Err(state_error(ErrorKind::AlreadyDecrypted, path, "decrypted"));
    }
    debug!(path = %path.display(), "validating key");
    Ok(validate::validate(config.key(), path))
}

/// Atomically replaces the contents of `path`
///
/// Writes to a temporary file in the same directory, flushes and fsyncs it,
/// copies the original permissions, then renames it over the target. Either
/// the old file or the new file exists afterwards, never a partial one.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let permissions = fs::metadata(path)
        .map_err(|e| io_error("open", path, e))?
        .permissions();

    let mut temp_file = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to create tempfile next to '{}'", short_path(path)),
            e,
        )
    })?;
    temp_file.write_all(contents).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to write to tempfile",
            e,
        )
    })?;
    // Flush and fsync() such that the rename later, if it succeeds, will
    // always point to a valid file.
    temp_file.flush().map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to flush tempfile",
            e,
        )
    })?;
    temp_file.as_file().sync_all().map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to sync file prior to rename",
            e,
        )
    })?;
    temp_file.as_file().set_permissions(permissions).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            "failed to set tempfile permissions",
            e,
        )
    })?;
    temp_file.persist(path).map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to rename to target file '~/{}'", short_path(path)),
            e,
        )
    })?;
    Ok(())
}

/// Hands `path` to the desktop's default application without waiting for it.
pub fn open_in_default_app(path: &Path) -> Result<()> {
    #[cfg(target_os = "windows")]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    };
    #[cfg(target_os = "macos")]
    let mut command = Command::new("open");
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let mut command = Command::new("xdg-open");

    command.arg(path).spawn().map_err(|e| {
        CryptError::with_kind_and_source(
            ErrorCategory::Internal,
            ErrorKind::Io,
            format!("failed to launch opener for '{}'", short_path(path)),
            e,
        )
    })?;
    Ok(())
}
