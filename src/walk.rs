//! Recursive directory encryption and decryption
//!
//! Every regular file under the root gets the single-file operation. A
//! failure on one file is logged and recorded in the report; it never
//! stops the walk. Symlinks are not followed.

use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rayon::prelude::*;
use tracing::{debug, error, info};
use walkdir::{DirEntry, WalkDir};

use crate::config::EngineConfig;
use crate::error::{CryptError, ErrorCategory, ErrorKind, Result, io_error, short_path};
use crate::file_ops::{self, FileRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Encrypt,
    Decrypt,
}

impl Operation {
    fn apply(self, path: &Path, config: &EngineConfig) -> Result<FileRecord> {
        match self {
            Operation::Encrypt => file_ops::encrypt_file(path, config),
            Operation::Decrypt => file_ops::decrypt_file(path, config, false),
        }
    }

    fn progressive(self) -> &'static str {
        match self {
            Operation::Encrypt => "Encrypting",
            Operation::Decrypt => "Decrypting",
        }
    }

    fn noun(self) -> &'static str {
        match self {
            Operation::Encrypt => "Encryption",
            Operation::Decrypt => "Decryption",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Encrypt => f.write_str("encrypt"),
            Operation::Decrypt => f.write_str("decrypt"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Run the per-file operations on the rayon thread pool.
    pub parallel: bool,
}

/// The result of one file in a walk.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: Result<FileRecord>,
}

#[derive(Debug)]
pub struct WalkReport {
    pub operation: Operation,
    pub root: PathBuf,
    /// One entry per file (or unreadable entry), in traversal order.
    pub outcomes: Vec<FileOutcome>,
    pub elapsed: Duration,
}

impl WalkReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Path, &CryptError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.path.as_path(), e)))
    }

    /// Elapsed seconds, rounded up to two decimals.
    pub fn elapsed_secs(&self) -> f64 {
        (self.elapsed.as_secs_f64() * 100.0).ceil() / 100.0
    }
}

enum Pending {
    File(PathBuf),
    Unreadable(PathBuf, CryptError),
}

/// Encrypts every file under `root` in place.
pub fn walk_encrypt(
    root: &Path,
    config: &EngineConfig,
    options: WalkOptions,
) -> Result<WalkReport> {
    walk(root, config, options, Operation::Encrypt)
}

/// Decrypts every file under `root` in place.
pub fn walk_decrypt(
    root: &Path,
    config: &EngineConfig,
    options: WalkOptions,
) -> Result<WalkReport> {
    walk(root, config, options, Operation::Decrypt)
}

/// Applies `operation` to every regular file under `root`.
///
/// Only a root that is not a readable directory is an error; everything
/// below it is reported per file.
pub fn walk(
    root: &Path,
    config: &EngineConfig,
    options: WalkOptions,
    operation: Operation,
) -> Result<WalkReport> {
    let start = Instant::now();
    let meta = std::fs::metadata(root).map_err(|e| io_error("open", root, e))?;
    if !meta.is_dir() {
        return Err(CryptError::with_kind(
            ErrorCategory::User,
            ErrorKind::Io,
            format!("'{}' is not a directory", root.display()),
        ));
    }

    let pending = collect(root);
    let run = |item: Pending| -> FileOutcome {
        match item {
            Pending::File(path) => {
                info!("{} '{}' ...", operation.progressive(), short_path(&path));
                let result = operation.apply(&path, config);
                if let Err(e) = &result {
                    error!(path = %path.display(), kind = ?e.kind, "{}", e);
                }
                FileOutcome { path, result }
            }
            Pending::Unreadable(path, e) => FileOutcome {
                path,
                result: Err(e),
            },
        }
    };
    let outcomes: Vec<FileOutcome> = if options.parallel {
        pending.into_par_iter().map(run).collect()
    } else {
        pending.into_iter().map(run).collect()
    };

    let report = WalkReport {
        operation,
        root: root.to_path_buf(),
        outcomes,
        elapsed: start.elapsed(),
    };
    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "{} for directory '{}' completed",
        operation.noun(),
        root.display()
    );
    info!("Time elapsed: {:.2} sec(s)", report.elapsed_secs());
    Ok(report)
}

/// Lists a directory's own files before its subdirectories, each group by name.
fn files_first(a: &DirEntry, b: &DirEntry) -> Ordering {
    a.file_type()
        .is_dir()
        .cmp(&b.file_type().is_dir())
        .then_with(|| a.file_name().cmp(b.file_name()))
}

fn collect(root: &Path) -> Vec<Pending> {
    let mut pending = Vec::new();
    for entry in WalkDir::new(root).follow_links(false).sort_by(files_first) {
        match entry {
            Ok(entry) if entry.file_type().is_dir() => {
                let name = entry.file_name().to_string_lossy();
                info!("Working in folder '{}' ...", name);
            }
            Ok(entry) if entry.file_type().is_file() => {
                pending.push(Pending::File(entry.into_path()))
            }
            Ok(entry) => {
                debug!(
                    path = %entry.path().display(),
                    "skipping entry that is not a regular file"
                );
            }
            Err(e) => {
                let path = e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                let err = CryptError::with_kind_and_source(
                    ErrorCategory::User,
                    ErrorKind::Io,
                    format!(
                        "failed to read directory entry '~/{}': {}",
                        short_path(&path),
                        e
                    ),
                    e,
                );
                error!(path = %path.display(), "{}", err);
                pending.push(Pending::Unreadable(path, err));
            }
        }
    }
    pending
}
