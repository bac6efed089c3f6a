//! Atomic file writes: temp file in the target directory, fsync, then rename.
//!
//! This is the mechanism that satisfies the "every stage writes atomically"
//! invariant for `WorkflowStore` records: a reader never observes a
//! partially-written JSON file, because the rename is the only operation
//! that makes the new content visible at the target path.

use camino::Utf8Path;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Maximum number of rename retries on Windows before giving up.
const WINDOWS_MAX_RENAME_RETRIES: u32 = 5;
const WINDOWS_INITIAL_DELAY_MS: u64 = 10;
const WINDOWS_MAX_TOTAL_DELAY_MS: u64 = 250;

#[derive(Debug, thiserror::Error)]
pub enum AtomicWriteError {
    #[error("failed to create parent directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to create temp file in {dir}: {source}")]
    TempFile {
        dir: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write temp file contents: {source}")]
    Write {
        #[source]
        source: std::io::Error,
    },
    #[error("failed to persist temp file to {path}: {source}")]
    Persist {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Outcome metadata for an atomic write; useful for receipts/logs.
#[derive(Debug, Default, Clone)]
pub struct AtomicWriteResult {
    pub rename_retry_count: u32,
    pub used_cross_filesystem_fallback: bool,
    pub warnings: Vec<String>,
}

fn normalize_line_endings(content: &str) -> String {
    content.replace("\r\n", "\n").replace('\r', "\n")
}

/// Write `content` to `path` atomically: all bytes become visible or none do.
pub fn write_file_atomic(
    path: &Utf8Path,
    content: &str,
) -> Result<AtomicWriteResult, AtomicWriteError> {
    let normalized = normalize_line_endings(content);

    let parent = path.parent().unwrap_or_else(|| Utf8Path::new("."));
    fs::create_dir_all(parent).map_err(|source| AtomicWriteError::CreateDir {
        path: parent.to_string(),
        source,
    })?;

    let mut temp_file =
        NamedTempFile::new_in(parent.as_std_path()).map_err(|source| AtomicWriteError::TempFile {
            dir: parent.to_string(),
            source,
        })?;

    temp_file
        .write_all(normalized.as_bytes())
        .map_err(|source| AtomicWriteError::Write { source })?;
    temp_file
        .as_file()
        .sync_all()
        .map_err(|source| AtomicWriteError::Write { source })?;

    let mut result = AtomicWriteResult::default();
    atomic_rename(temp_file, path, &mut result)?;
    Ok(result)
}

#[cfg(windows)]
fn atomic_rename(
    temp_file: NamedTempFile,
    target: &Utf8Path,
    result: &mut AtomicWriteResult,
) -> Result<(), AtomicWriteError> {
    let mut temp_file = temp_file;
    let mut delay_ms = WINDOWS_INITIAL_DELAY_MS;
    let mut total_delay_ms: u64 = 0;
    let mut retry = 0;

    loop {
        match temp_file.persist(target.as_std_path()) {
            Ok(_) => {
                if retry > 0 {
                    result.rename_retry_count = retry;
                }
                return Ok(());
            }
            Err(e) => {
                let is_retryable = matches!(
                    e.error.kind(),
                    std::io::ErrorKind::PermissionDenied | std::io::ErrorKind::Other
                );
                if !is_retryable || retry >= WINDOWS_MAX_RENAME_RETRIES {
                    return Err(AtomicWriteError::Persist {
                        path: target.to_string(),
                        source: e.error,
                    });
                }
                temp_file = e.file;
                retry += 1;
                total_delay_ms += delay_ms;
                if total_delay_ms > WINDOWS_MAX_TOTAL_DELAY_MS {
                    return Err(AtomicWriteError::Persist {
                        path: target.to_string(),
                        source: e.error,
                    });
                }
                std::thread::sleep(std::time::Duration::from_millis(delay_ms));
                delay_ms *= 2;
            }
        }
    }
}

#[cfg(not(windows))]
fn atomic_rename(
    temp_file: NamedTempFile,
    target: &Utf8Path,
    result: &mut AtomicWriteResult,
) -> Result<(), AtomicWriteError> {
    match temp_file.persist(target.as_std_path()) {
        Ok(_) => Ok(()),
        Err(e) if is_cross_filesystem_error(&e.error) => {
            result.used_cross_filesystem_fallback = true;
            result
                .warnings
                .push("used cross-filesystem copy fallback".to_string());
            cross_filesystem_copy(e.file, target)
        }
        Err(e) => Err(AtomicWriteError::Persist {
            path: target.to_string(),
            source: e.error,
        }),
    }
}

#[cfg(not(windows))]
fn is_cross_filesystem_error(err: &std::io::Error) -> bool {
    err.raw_os_error() == Some(libc::EXDEV)
}

#[cfg(not(windows))]
fn cross_filesystem_copy(
    mut temp_file: NamedTempFile,
    target: &Utf8Path,
) -> Result<(), AtomicWriteError> {
    use std::io::{Read, Seek, SeekFrom};

    let mut bytes = Vec::new();
    temp_file
        .seek(SeekFrom::Start(0))
        .map_err(|source| AtomicWriteError::Read {
            path: temp_file.path().to_string_lossy().into_owned(),
            source,
        })?;
    temp_file
        .read_to_end(&mut bytes)
        .map_err(|source| AtomicWriteError::Read {
            path: temp_file.path().to_string_lossy().into_owned(),
            source,
        })?;

    let parent = target.parent().unwrap_or_else(|| Utf8Path::new("."));
    let mut replacement =
        NamedTempFile::new_in(parent.as_std_path()).map_err(|source| AtomicWriteError::TempFile {
            dir: parent.to_string(),
            source,
        })?;
    replacement
        .write_all(&bytes)
        .map_err(|source| AtomicWriteError::Write { source })?;
    replacement
        .as_file()
        .sync_all()
        .map_err(|source| AtomicWriteError::Write { source })?;
    replacement
        .persist(target.as_std_path())
        .map_err(|e| AtomicWriteError::Persist {
            path: target.to_string(),
            source: e.error,
        })?;
    Ok(())
}

/// Read a file tolerating CRLF line endings (normalizes to LF).
pub fn read_file_with_crlf_tolerance(path: &Utf8Path) -> Result<String, AtomicWriteError> {
    let raw = fs::read_to_string(path.as_std_path()).map_err(|source| AtomicWriteError::Read {
        path: path.to_string(),
        source,
    })?;
    Ok(normalize_line_endings(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::tempdir;

    fn path_in(dir: &tempfile::TempDir, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::from_path_buf(dir.path().join(name)).unwrap()
    }

    #[test]
    fn writes_basic_content() {
        let dir = tempdir().unwrap();
        let path = path_in(&dir, "item.json");
        write_file_atomic(&path, "{\"a\":1}").unwrap();
        assert_eq!(read_file_with_crlf_tolerance(&path).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn normalizes_crlf_on_write() {
        let dir = tempdir().unwrap();
        let path = path_in(&dir, "item.json");
        write_file_atomic(&path, "line1\r\nline2\r\n").unwrap();
        assert_eq!(
            read_file_with_crlf_tolerance(&path).unwrap(),
            "line1\nline2\n"
        );
    }

    #[test]
    fn creates_parent_directories() {
        let dir = tempdir().unwrap();
        let path = path_in(&dir, "nested/deep/item.json");
        write_file_atomic(&path, "x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn overwrite_replaces_content() {
        let dir = tempdir().unwrap();
        let path = path_in(&dir, "item.json");
        write_file_atomic(&path, "first").unwrap();
        write_file_atomic(&path, "second").unwrap();
        assert_eq!(read_file_with_crlf_tolerance(&path).unwrap(), "second");
    }

    #[test]
    fn handles_unicode_content() {
        let dir = tempdir().unwrap();
        let path = path_in(&dir, "item.json");
        write_file_atomic(&path, "caf\u{e9} \u{2603} \u{1f3b5}").unwrap();
        assert_eq!(
            read_file_with_crlf_tolerance(&path).unwrap(),
            "caf\u{e9} \u{2603} \u{1f3b5}"
        );
    }

    #[test]
    fn handles_empty_content() {
        let dir = tempdir().unwrap();
        let path = path_in(&dir, "item.json");
        write_file_atomic(&path, "").unwrap();
        assert_eq!(read_file_with_crlf_tolerance(&path).unwrap(), "");
    }
}
