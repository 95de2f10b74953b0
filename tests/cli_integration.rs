//! CLI integration tests
//!
//! Tests the command-line interface end-to-end.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

const KEY: &str = "0123456789abcdef";

/// Get path to the filecrypt binary
fn filecrypt_bin() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // Remove test binary name
    path.pop(); // Remove deps/
    path.push("filecrypt");
    path
}

/// Run filecrypt with the key from stdin
fn run_filecrypt_with_key(
    args: &[&str],
    key: &str,
) -> Result<std::process::Output, std::io::Error> {
    let mut child = Command::new(filecrypt_bin())
        .arg("--key-stdin")
        .args(args)
        .env_remove("FILECRYPT_KEY")
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    {
        let stdin = child.stdin.as_mut().expect("failed to open stdin");
        // Ignore BrokenPipe errors - the command may exit before reading stdin
        let _ = stdin.write_all(key.as_bytes());
    }

    child.wait_with_output()
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn stderr(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

// Large enough that ciphertext is reliably recognised as such.
fn sample_text() -> String {
    (0..2000)
        .map(|i| format!("line {}: pack my box with five dozen liquor jugs\n", i))
        .collect()
}

fn sample_json() -> String {
    let mut doc = serde_json::Map::new();
    doc.insert("`Name`".into(), "Ada".into());
    doc.insert(
        "server".into(),
        serde_json::json!({"host": "example.org", "port": 22}),
    );
    for i in 0..1500 {
        doc.insert(format!("field_{}", i), format!("value {}", i).into());
    }
    serde_json::to_string_pretty(&serde_json::Value::Object(doc)).unwrap()
}

#[test]
fn test_encrypt_decrypt_roundtrip() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    let original = sample_text();
    fs::write(&path, &original).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));
    assert_ne!(fs::read_to_string(&path).unwrap_or_default(), original);

    let result = run_filecrypt_with_key(&["decrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "decrypt failed: {}", stderr(&result));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_aliases() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    let original = sample_text();
    fs::write(&path, &original).unwrap();

    let result = run_filecrypt_with_key(&["e", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));
    let result = run_filecrypt_with_key(&["d", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "decrypt failed: {}", stderr(&result));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_key_trailing_newline_is_ignored() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, sample_text()).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));

    let with_newline = format!("{}\n", KEY);
    let result =
        run_filecrypt_with_key(&["decrypt", "-i", path_str(&path)], &with_newline).unwrap();
    assert!(result.status.success(), "decrypt failed: {}", stderr(&result));
}

#[test]
fn test_wrong_key_fails_and_preserves_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, sample_text()).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));
    let sealed = fs::read(&path).unwrap();

    let result =
        run_filecrypt_with_key(&["decrypt", "-i", path_str(&path)], "fedcba9876543210").unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("Error: invalid encryption key"));
    assert_eq!(fs::read(&path).unwrap(), sealed);
}

#[test]
fn test_bad_key_length_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    let original = sample_text();
    fs::write(&path, &original).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], "short").unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("Error:"));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_base64_key() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    let original = sample_text();
    fs::write(&path, &original).unwrap();

    // base64 of the 16 bytes "0123456789abcdef"
    let encoded = "MDEyMzQ1Njc4OWFiY2RlZg==";
    let result = run_filecrypt_with_key(
        &["--key-encoding", "base64", "encrypt", "-i", path_str(&path)],
        encoded,
    )
    .unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));

    // The same key bytes given as text decrypt the file.
    let result = run_filecrypt_with_key(&["decrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "decrypt failed: {}", stderr(&result));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}

#[test]
fn test_encrypt_twice_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, sample_text()).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("already encrypted"));
}

#[test]
fn test_lookup_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, sample_json()).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));
    let sealed = fs::read(&path).unwrap();

    let result = run_filecrypt_with_key(
        &["lookup", "-i", path_str(&path), "-f", "name", "server"],
        KEY,
    )
    .unwrap();
    assert!(result.status.success(), "lookup failed: {}", stderr(&result));
    let out = stdout(&result);
    assert!(out.contains("Pair found: [`Name` - Ada]"), "got: {}", out);
    assert!(
        out.contains("server pair(s) found: [host - example.org] <> [port - 22]"),
        "got: {}",
        out
    );

    let result = run_filecrypt_with_key(&["list", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "list failed: {}", stderr(&result));
    let out = stdout(&result);
    assert!(out.starts_with("config.json\n├── Name\n"), "got: {}", out);
    assert!(out.contains("└── server\n"), "got: {}", out);
    assert!(out.trim_end().ends_with("1 file, 1502 field(s)"), "got: {}", out);

    assert_eq!(fs::read(&path).unwrap(), sealed);
}

#[test]
fn test_xml_lookup_and_list() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nodes.xml");
    let mut doc = String::from("<?xml version=\"1.0\"?>\n<nodes>\n");
    doc.push_str("  <Name>Ada</Name>\n");
    doc.push_str("  <server><host>example.org</host><port>22</port></server>\n");
    for i in 0..300 {
        doc.push_str(&format!("  <entry{}>value {}</entry{}>\n", i, i, i));
    }
    doc.push_str("</nodes>\n");
    fs::write(&path, &doc).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));

    let result = run_filecrypt_with_key(
        &["lookup", "-i", path_str(&path), "-f", "name", "host"],
        KEY,
    )
    .unwrap();
    assert!(result.status.success(), "lookup failed: {}", stderr(&result));
    let out = stdout(&result);
    assert!(out.contains("Pair found: [Name - Ada]"), "got: {}", out);
    assert!(out.contains("Pair found: [host - example.org]"), "got: {}", out);

    let result = run_filecrypt_with_key(&["list", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "list failed: {}", stderr(&result));
    let out = stdout(&result);
    assert!(out.starts_with("nodes.xml\n├── Name\n"), "got: {}", out);
    assert!(out.trim_end().ends_with("1 file, 302 field(s)"), "got: {}", out);

    let result = run_filecrypt_with_key(&["decrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "decrypt failed: {}", stderr(&result));
    assert_eq!(fs::read_to_string(&path).unwrap(), doc);
}

#[test]
fn test_lookup_missing_field_fails() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    fs::write(&path, sample_json()).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));

    let result = run_filecrypt_with_key(
        &["q", "-i", path_str(&path), "-f", "name", "nonexistent"],
        KEY,
    )
    .unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stdout(&result).contains("Pair found: [`Name` - Ada]"));
    assert!(stderr(&result).contains("attribute 'nonexistent' not found in file"));
}

#[test]
fn test_verify_key() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, sample_text()).unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "encrypt failed: {}", stderr(&result));

    let result = run_filecrypt_with_key(&["verify-key", "-i", path_str(&path)], KEY).unwrap();
    assert!(result.status.success(), "verify-key failed: {}", stderr(&result));

    let result =
        run_filecrypt_with_key(&["verify-key", "-i", path_str(&path)], "0000000000000000").unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("key is not valid"));
}

#[test]
fn test_directory_walk_continues_past_empty_file() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("tree");
    fs::create_dir_all(root.join("nested")).unwrap();
    let valid = root.join("nested/valid.txt");
    let empty = root.join("empty.txt");
    let original = sample_text();
    fs::write(&valid, &original).unwrap();
    fs::write(&empty, b"").unwrap();

    let result = run_filecrypt_with_key(&["encrypt-dir", "-d", path_str(&root)], KEY).unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stdout(&result).contains("1 succeeded, 1 failed"), "got: {}", stdout(&result));
    assert_ne!(fs::read(&valid).unwrap(), original.as_bytes());
    assert!(fs::read(&empty).unwrap().is_empty());

    let result =
        run_filecrypt_with_key(&["decrypt-dir", "-d", path_str(&root), "--parallel"], KEY).unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert_eq!(fs::read_to_string(&valid).unwrap(), original);
}

#[test]
fn test_directory_walk_success() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().join("tree");
    fs::create_dir_all(root.join("a/b")).unwrap();
    let files = [root.join("one.txt"), root.join("a/two.csv"), root.join("a/b/three.xml")];
    for file in &files {
        fs::write(file, sample_text()).unwrap();
    }

    let result = run_filecrypt_with_key(&["encrypt-dir", "-d", path_str(&root)], KEY).unwrap();
    assert!(result.status.success(), "encrypt-dir failed: {}", stderr(&result));
    assert!(stdout(&result).contains("3 succeeded, 0 failed"));

    let result = run_filecrypt_with_key(&["decrypt-dir", "-d", path_str(&root)], KEY).unwrap();
    assert!(result.status.success(), "decrypt-dir failed: {}", stderr(&result));
    for file in &files {
        assert_eq!(fs::read_to_string(file).unwrap(), sample_text());
    }
}

#[test]
fn test_missing_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("nonexistent.txt");

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("Error: failed to open"));
}

#[test]
fn test_unsupported_extension() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("archive.zip");
    fs::write(&path, b"PK\x03\x04 not really a zip").unwrap();

    let result = run_filecrypt_with_key(&["encrypt", "-i", path_str(&path)], KEY).unwrap();
    assert_eq!(result.status.code(), Some(1));
    assert!(stderr(&result).contains("file extension was not supported: '.zip'"));
}

#[test]
fn test_invalid_sigma_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, sample_text()).unwrap();

    for sigma in ["--sigma=0", "--sigma=-1", "--sigma=NaN", "--sigma=inf"] {
        let result =
            run_filecrypt_with_key(&[sigma, "encrypt", "-i", path_str(&path)], KEY).unwrap();
        assert_eq!(result.status.code(), Some(1), "{} was accepted", sigma);
        assert!(stderr(&result).contains("sigma must be"), "got: {}", stderr(&result));
    }
    assert_eq!(fs::read_to_string(&path).unwrap(), sample_text());
}
