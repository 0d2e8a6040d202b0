//! Evidence persistence: deterministic JSON read/write with directory creation.
//!
//! Every evidence file is pretty-printed JSON with sorted keys and a trailing
//! newline, written via temp file + rename. Stage reports and the terminal
//! result use [`write_json_once`]: the temp file is hard-linked into place,
//! which the OS refuses when the target exists, so a second writer into the
//! same evidence directory fails loudly instead of replacing audit trail.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use serde_json::Value;

/// Error reading or writing an evidence file.
#[derive(Debug, thiserror::Error)]
pub enum EvidenceError {
    #[error("I/O error at {path}: {detail}")]
    Io { path: PathBuf, detail: String },

    #[error("JSON error at {path}: {detail}")]
    Json { path: PathBuf, detail: String },

    #[error("evidence file already exists: {path}")]
    AlreadyExists { path: PathBuf },
}

/// Create `dir` and all parents.
///
/// # Errors
///
/// Returns [`EvidenceError::Io`] if the directory cannot be created.
pub fn ensure_dir(dir: &Path) -> Result<(), EvidenceError> {
    std::fs::create_dir_all(dir).map_err(|e| EvidenceError::Io {
        path: dir.to_path_buf(),
        detail: format!("create_dir_all: {e}"),
    })
}

/// Read and parse a JSON file.
///
/// # Errors
///
/// [`EvidenceError::Io`] if unreadable, [`EvidenceError::Json`] if unparsable.
pub fn read_json(path: &Path) -> Result<Value, EvidenceError> {
    let bytes = std::fs::read(path).map_err(|e| EvidenceError::Io {
        path: path.to_path_buf(),
        detail: format!("read: {e}"),
    })?;
    serde_json::from_slice(&bytes).map_err(|e| EvidenceError::Json {
        path: path.to_path_buf(),
        detail: format!("{e}"),
    })
}

/// Render `value` as evidence bytes (sorted keys, 2-space indent, trailing newline).
///
/// # Errors
///
/// Returns [`EvidenceError::Json`] if `value` cannot be represented as JSON.
pub fn to_evidence_bytes<T: Serialize>(path: &Path, value: &T) -> Result<Vec<u8>, EvidenceError> {
    let json_err = |e: serde_json::Error| EvidenceError::Json {
        path: path.to_path_buf(),
        detail: format!("{e}"),
    };
    // Round-trip through Value: its map type keeps keys sorted.
    let tree = serde_json::to_value(value).map_err(json_err)?;
    let mut bytes = serde_json::to_vec_pretty(&tree).map_err(json_err)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Write `value` to `path`, creating parent directories.
///
/// # Errors
///
/// Returns [`EvidenceError`] on serialization or I/O failure.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), EvidenceError> {
    let bytes = to_evidence_bytes(path, value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    write_atomic(path, &bytes)
}

/// Like [`write_json`], but refuses to replace an existing file.
///
/// Existence is checked by the link itself, not beforehand, so two racing
/// writers cannot both succeed.
///
/// # Errors
///
/// Returns [`EvidenceError::AlreadyExists`] if `path` is already present.
pub fn write_json_once<T: Serialize>(path: &Path, value: &T) -> Result<(), EvidenceError> {
    let bytes = to_evidence_bytes(path, value)?;
    let dir = parent_dir(path);
    ensure_dir(&dir)?;
    let temp_path = write_temp(&dir, path, &bytes)?;

    let linked = std::fs::hard_link(&temp_path, path);
    let cleanup = std::fs::remove_file(&temp_path);
    match linked {
        Ok(()) => cleanup.map_err(|e| EvidenceError::Io {
            path: temp_path.clone(),
            detail: format!("remove: {e}"),
        }),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(EvidenceError::AlreadyExists {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(EvidenceError::Io {
            path: path.to_path_buf(),
            detail: format!("link from {}: {e}", temp_path.display()),
        }),
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Write `content` to a fresh temp file beside `path`.
fn write_temp(dir: &Path, path: &Path, content: &[u8]) -> Result<PathBuf, EvidenceError> {
    static SEQ: AtomicU64 = AtomicU64::new(0);
    let temp_name = format!(
        ".tmp_{}_{}_{}",
        std::process::id(),
        SEQ.fetch_add(1, Ordering::Relaxed),
        path.file_name().unwrap_or_default().to_string_lossy()
    );
    let temp_path = dir.join(temp_name);
    std::fs::write(&temp_path, content).map_err(|e| EvidenceError::Io {
        path: temp_path.clone(),
        detail: format!("write: {e}"),
    })?;
    Ok(temp_path)
}

/// Write bytes to a path via temp file + rename (best-effort atomicity on Unix).
fn write_atomic(path: &Path, content: &[u8]) -> Result<(), EvidenceError> {
    let temp_path = write_temp(&parent_dir(path), path, content)?;
    std::fs::rename(&temp_path, path).map_err(|e| EvidenceError::Io {
        path: path.to_path_buf(),
        detail: format!("rename from {}: {e}", temp_path.display()),
    })
}
