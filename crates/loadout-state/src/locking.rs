use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use fs2::FileExt;

const LOCK_RETRY_LIMIT: u32 = 20;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(100);

const MOVE_RETRY_LIMIT: u32 = 5;
const MOVE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Runs `action` while holding an exclusive lock on `lock_path`. The lock
/// spans the caller's whole read-modify-write cycle so concurrent SDK
/// invocations cannot lose updates. Acquisition retries with backoff and
/// surfaces an error after the bounded budget instead of hanging.
pub fn with_exclusive_lock<T>(lock_path: &Path, action: impl FnOnce() -> Result<T>) -> Result<T> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(lock_path)
        .with_context(|| format!("failed to open lock file: {}", lock_path.display()))?;

    let mut attempts = 0;
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => break,
            Err(_) if attempts < LOCK_RETRY_LIMIT => {
                attempts += 1;
                thread::sleep(LOCK_RETRY_DELAY);
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!(
                        "failed to acquire exclusive lock after {LOCK_RETRY_LIMIT} attempts: {}",
                        lock_path.display()
                    )
                });
            }
        }
    }

    let result = action();
    let _ = file.unlock();
    result
}

/// Writes `contents` to a temp file in the target directory and renames it
/// over `path`, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path has no parent directory: {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let temp_path = temp_sibling(path);
    fs::write(&temp_path, contents)
        .with_context(|| format!("failed to write temp file: {}", temp_path.display()))?;

    if let Err(err) = rename_with_retry(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    Ok(())
}

/// Renames `from` to `to`, retrying transient failures a bounded number of
/// times (Windows antivirus scanners and concurrent readers can hold the
/// destination briefly).
pub fn rename_with_retry(from: &Path, to: &Path) -> Result<()> {
    let mut attempts = 0;
    loop {
        match fs::rename(from, to) {
            Ok(()) => return Ok(()),
            Err(_) if attempts < MOVE_RETRY_LIMIT => {
                attempts += 1;
                thread::sleep(MOVE_RETRY_DELAY);
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to move {} to {}", from.display(), to.display())
                });
            }
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "state".to_string());
    path.with_file_name(format!(
        "{file_name}.tmp-{}-{nanos}",
        std::process::id()
    ))
}
