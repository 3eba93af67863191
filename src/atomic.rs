// 💾 Atomic Writer - Temp-file-then-rename persistence with an advisory lock
// Readers see either the whole old file or the whole new one, never a torn write.
// Writers serialise through a sibling `<target>.lock` file.

use crate::error::IoError;
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant, SystemTime};

// ============================================================================
// LOCK OPTIONS
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct LockOptions {
    /// Give up (retryable error) after waiting this long
    pub timeout: Duration,

    pub poll_interval: Duration,

    /// Lock files older than this are assumed left behind by a crashed writer.
    /// None never breaks a lock.
    pub stale_after: Option<Duration>,
}

impl LockOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        LockOptions {
            timeout,
            ..LockOptions::default()
        }
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        LockOptions {
            timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
            stale_after: Some(Duration::from_secs(300)),
        }
    }
}

// ============================================================================
// FILE LOCK
// ============================================================================

/// Exclusive advisory lock; released (lock file removed) on drop.
///
/// The lock file holds a token unique to this holder. Drop only removes the
/// file while it still carries that token, so a holder whose lock was broken
/// as stale cannot delete the next holder's lock.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    token: String,
}

impl FileLock {
    /// Block until the lock for `target` is ours or `options.timeout` elapses.
    pub fn acquire(target: &Path, options: &LockOptions) -> Result<FileLock, IoError> {
        let path = lock_path_for(target);
        ensure_parent(&path)?;

        let token = format!(
            "{} {} {}",
            std::process::id(),
            uuid::Uuid::new_v4(),
            Utc::now().to_rfc3339()
        );
        let started = Instant::now();
        let mut warned = false;

        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    if let Err(e) = file.write_all(token.as_bytes()).and_then(|_| file.sync_all()) {
                        let _ = fs::remove_file(&path);
                        return Err(IoError::io("write lock file", &path, e));
                    }
                    log::debug!("Acquired lock {}", path.display());
                    return Ok(FileLock { path, token });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if break_if_stale(&path, options.stale_after) {
                        continue;
                    }

                    let waited = started.elapsed();
                    if waited >= options.timeout {
                        return Err(IoError::LockTimeout { path, waited });
                    }

                    if !warned {
                        log::warn!("Waiting for lock {}", path.display());
                        warned = true;
                    }
                    thread::sleep(options.poll_interval.min(options.timeout - waited));
                }
                Err(e) => return Err(IoError::io("create lock file", &path, e)),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match fs::read_to_string(&self.path) {
            Ok(content) if content == self.token => match fs::remove_file(&self.path) {
                Ok(()) => log::debug!("Released lock {}", self.path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => log::warn!("Failed to remove lock {}: {}", self.path.display(), e),
            },
            Ok(_) => log::warn!(
                "Lock {} was broken and is now held by another writer; leaving it",
                self.path.display()
            ),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::warn!("Lock {} vanished before release", self.path.display())
            }
            Err(e) => log::warn!("Failed to read lock {}: {}", self.path.display(), e),
        }
    }
}

/// `data/log.csv` → `data/log.csv.lock`
pub fn lock_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn file_age(path: &Path) -> Option<Duration> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
}

/// True when a stale lock was removed and acquisition should be retried at once.
fn break_if_stale(lock_path: &Path, stale_after: Option<Duration>) -> bool {
    let stale_after = match stale_after {
        Some(d) => d,
        None => return false,
    };

    match file_age(lock_path) {
        Some(age) if age >= stale_after => {}
        _ => return false,
    }

    match fs::read_to_string(lock_path) {
        Ok(observed) => take_stale_lock(lock_path, &observed, stale_after),
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(_) => false,
    }
}

/// Move the lock aside under a unique name, then delete it only if it is still
/// the stale file we inspected. A lock that turns out to be fresh (another
/// waiter broke the stale one and re-acquired in between) is linked back into
/// place without overwriting anything.
fn take_stale_lock(lock_path: &Path, observed: &str, stale_after: Duration) -> bool {
    let mut aside = lock_path.as_os_str().to_os_string();
    aside.push(format!(".stale-{}", uuid::Uuid::new_v4().simple()));
    let aside = PathBuf::from(aside);

    match fs::rename(lock_path, &aside) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return true,
        Err(_) => return false,
    }

    let still_stale = fs::read_to_string(&aside).map_or(false, |content| content == observed)
        && file_age(&aside).map_or(false, |age| age >= stale_after);

    if still_stale {
        log::warn!(
            "Broke stale lock {} (held by {:?})",
            lock_path.display(),
            observed.trim()
        );
        let _ = fs::remove_file(&aside);
        return true;
    }

    // hard_link refuses to replace an existing path
    if let Err(e) = fs::hard_link(&aside, lock_path) {
        log::warn!("Could not restore live lock {}: {}", lock_path.display(), e);
    }
    let _ = fs::remove_file(&aside);
    false
}

// ============================================================================
// WRITE / READ
// ============================================================================

/// Write `data` to a temp file next to `target`, fsync, then rename over `target`.
/// On failure the temp file is removed and `target` keeps its previous content.
pub fn write_atomic(data: &[u8], target: &Path) -> Result<(), IoError> {
    let dir = ensure_parent(target)?;
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "data".to_string());

    let mut temp = tempfile::Builder::new()
        .prefix(&format!(".{}.", file_name))
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| IoError::io("create temp file in", &dir, e))?;

    temp.write_all(data)
        .and_then(|_| temp.as_file().sync_all())
        .map_err(|e| IoError::io("write temp file", temp.path(), e))?;

    // PersistError drops its NamedTempFile, which deletes the temp file
    temp.persist(target)
        .map_err(|e| IoError::io("rename temp file onto", target, e.error))?;

    Ok(())
}

/// `write_atomic` while holding the sibling lock; the lock is released even on error.
pub fn write_with_lock(data: &[u8], target: &Path, options: &LockOptions) -> Result<(), IoError> {
    let _lock = FileLock::acquire(target, options)?;
    write_atomic(data, target)
}

/// Read the whole file; a missing file reads as empty.
pub fn read_safe(path: &Path) -> Result<Vec<u8>, IoError> {
    match fs::read(path) {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(IoError::io("read", path, e)),
    }
}

fn ensure_parent(path: &Path) -> Result<PathBuf, IoError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| IoError::io("create directory", &dir, e))?;
    Ok(dir)
}
