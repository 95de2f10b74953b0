//! filecrypt CLI - in-place file encryption
//!
//! Command-line interface for encrypting, decrypting and querying files and
//! directory trees with a caller-supplied AES key.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;

use filecrypt::detect::{DEFAULT_SIGMA, Detector};
use filecrypt::document::format_field_tree;
use filecrypt::error::{CryptError, ErrorCategory, ErrorKind, Result};
use filecrypt::file_ops;
use filecrypt::key::{
    ConstantKeyReader, KeyEncoding, KeyReader, ReaderKeyReader, TerminalKeyReader, read_key,
};
use filecrypt::walk::{self, WalkOptions, WalkReport};
use filecrypt::EngineConfig;

#[derive(Parser)]
#[command(name = "filecrypt")]
#[command(version)]
#[command(about = "In-place file and directory encryption.", long_about = None)]
struct Cli {
    /// Read the key from stdin instead of from the terminal
    #[arg(long, global = true)]
    key_stdin: bool,

    /// Key text (prefer FILECRYPT_KEY or --key-stdin over passing it on the command line)
    #[arg(long, global = true, env = "FILECRYPT_KEY", hide_env_values = true)]
    key: Option<String>,

    /// How key text is turned into key bytes: utf8 or base64
    #[arg(long, global = true, value_name = "ENCODING", default_value = "utf8")]
    key_encoding: KeyEncoding,

    /// Sensitivity of the ciphertext detector (finite, greater than zero)
    #[arg(long, global = true, default_value_t = DEFAULT_SIGMA)]
    sigma: f64,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Encrypt a file in place
    #[command(alias = "e")]
    Encrypt {
        /// Path to the file whose contents is to be encrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Decrypt a file in place
    #[command(alias = "d")]
    Decrypt {
        /// Path to the file whose contents is to be decrypted
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Open the decrypted file with the default application
        #[arg(long)]
        open: bool,
    },

    /// Encrypt every file under a directory
    EncryptDir {
        /// Root of the tree to encrypt
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// Process files on a thread pool
        #[arg(long)]
        parallel: bool,
    },

    /// Decrypt every file under a directory
    DecryptDir {
        /// Root of the tree to decrypt
        #[arg(short, long, value_name = "DIR")]
        dir: PathBuf,

        /// Process files on a thread pool
        #[arg(long)]
        parallel: bool,
    },

    /// Look up fields in an encrypted JSON or XML document without decrypting it on disk
    #[command(alias = "q")]
    Lookup {
        /// Path to the encrypted document
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Field names to look up; dotted names descend into nested objects
        #[arg(short, long = "field", value_name = "FIELD", required = true, num_args = 1..)]
        fields: Vec<String>,
    },

    /// List the top-level fields of an encrypted JSON or XML document
    #[command(alias = "l")]
    List {
        /// Path to the encrypted document
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },

    /// Check whether the key decrypts a file, without modifying it
    VerifyKey {
        /// Path to the encrypted file
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(&cli.log_level, &cli.log_format);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut reader = get_key_reader(cli.key_stdin, cli.key);
    let key = read_key(&mut *reader, cli.key_encoding)?;
    let config = EngineConfig::new(key).with_detector(Detector::new(cli.sigma)?);

    match cli.command {
        Commands::Encrypt { input } => file_ops::encrypt_file(&input, &config).map(|_| ()),
        Commands::Decrypt { input, open } => {
            file_ops::decrypt_file(&input, &config, open).map(|_| ())
        }
        Commands::EncryptDir { dir, parallel } => {
            summarize(walk::walk_encrypt(&dir, &config, WalkOptions { parallel })?)
        }
        Commands::DecryptDir { dir, parallel } => {
            summarize(walk::walk_decrypt(&dir, &config, WalkOptions { parallel })?)
        }
        Commands::Lookup { input, fields } => {
            let results = file_ops::lookup_fields(&input, &config, &fields)?;
            let mut missing = 0;
            for lookup in results {
                match lookup.into_result() {
                    Ok(found) => println!("{}", found),
                    Err(e) => {
                        eprintln!("Error: {:#}", e);
                        missing += 1;
                    }
                }
            }
            if missing > 0 {
                return Err(CryptError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::AttributeNotFound,
                    format!("{} of {} field(s) not found", missing, fields.len()),
                ));
            }
            Ok(())
        }
        Commands::List { input } => {
            let names = file_ops::list_fields(&input, &config)?;
            let label = input
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| input.display().to_string());
            println!("{}", format_field_tree(&label, &names));
            Ok(())
        }
        Commands::VerifyKey { input } => {
            if file_ops::verify_key(&input, &config)? {
                println!("key is valid for '{}'", input.display());
                Ok(())
            } else {
                Err(CryptError::with_kind(
                    ErrorCategory::User,
                    ErrorKind::InvalidKey,
                    format!("key is not valid for '{}'", input.display()),
                ))
            }
        }
    }
}

fn summarize(report: WalkReport) -> Result<()> {
    println!(
        "{} '{}': {} succeeded, {} failed ({:.2} sec(s))",
        report.operation,
        report.root.display(),
        report.succeeded(),
        report.failed(),
        report.elapsed_secs()
    );
    if report.failed() > 0 {
        return Err(CryptError::new(
            ErrorCategory::User,
            format!(
                "{} of {} file(s) could not be processed",
                report.failed(),
                report.outcomes.len()
            ),
        ));
    }
    Ok(())
}

fn get_key_reader(use_stdin: bool, key: Option<String>) -> Box<dyn KeyReader> {
    if use_stdin {
        Box::new(ReaderKeyReader::new(Box::new(std::io::stdin())))
    } else if let Some(text) = key {
        Box::new(ConstantKeyReader::new(text.into_bytes()))
    } else {
        Box::new(TerminalKeyReader::new())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}
