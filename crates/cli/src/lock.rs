// SPDX-License-Identifier: MIT

//! Advisory, staleness-breaking file locks used to serialize access to a
//! shard's `stats` file and (loosely) to manifest writes.
//!
//! Grounded in the reference implementation's `Lockfile.cpp`: a lock on path
//! `P` is a sibling symlink `P.lock` whose *target* (not contents — symlinks
//! don't have contents) encodes `<hostname>:<pid>:<timestamp>`. Creating a
//! symlink is atomic on POSIX, which is what makes this safe between
//! unrelated processes without a kernel-level lock primitive.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// How long the same lock content may be observed before it's considered
/// stale and broken.
const STALENESS_LIMIT: Duration = Duration::from_secs(2);

const MIN_BACKOFF: Duration = Duration::from_micros(1_000);
const MAX_BACKOFF: Duration = Duration::from_micros(10_000);

/// A held lock. Dropping it releases the lock.
pub struct LockGuard {
    path: PathBuf,
    /// Best-effort fallback: the filesystem didn't support the atomic
    /// primitive, so nothing was actually created on disk.
    fallback: bool,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.fallback {
            let _ = std::fs::remove_file(lock_path(&self.path));
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

fn my_content() -> String {
    let hostname = hostname();
    let pid = std::process::id();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("{hostname}:{pid}:{now}")
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "localhost".to_string())
}

/// Cheap, dependency-free jitter in `[MIN_BACKOFF, MAX_BACKOFF]`, seeded off
/// the current instant so concurrent processes don't lock-step retry.
fn backoff_duration() -> Duration {
    let nanos = Instant::now().elapsed().subsec_nanos() as u64;
    let span = (MAX_BACKOFF - MIN_BACKOFF).as_micros() as u64;
    let jitter = if span == 0 { 0 } else { nanos % span };
    MIN_BACKOFF + Duration::from_micros(jitter)
}

#[cfg(unix)]
fn try_create(lockfile: &Path, content: &str) -> std::io::Result<()> {
    std::os::unix::fs::symlink(content, lockfile)
}

#[cfg(not(unix))]
fn try_create(lockfile: &Path, content: &str) -> std::io::Result<()> {
    use std::fs::OpenOptions;
    use std::io::Write;
    let mut f = OpenOptions::new().write(true).create_new(true).open(lockfile)?;
    f.write_all(content.as_bytes())
}

#[cfg(unix)]
fn read_content(lockfile: &Path) -> std::io::Result<String> {
    std::fs::read_link(lockfile).map(|p| p.to_string_lossy().into_owned())
}

#[cfg(not(unix))]
fn read_content(lockfile: &Path) -> std::io::Result<String> {
    std::fs::read_to_string(lockfile)
}

/// Acquire a lock on `path`. Blocks (with bounded sleeps) until the lock is
/// acquired, the staleness window elapses on a frozen lock (which breaks it
/// once), or the holder is observed to still be live after the window.
pub fn acquire(path: &Path) -> Option<LockGuard> {
    let lockfile = lock_path(path);
    let my_content = my_content();
    let mut observed_since: Option<(String, Instant)> = None;
    let mut broken_once = false;

    loop {
        match try_create(&lockfile, &my_content) {
            Ok(()) => return Some(LockGuard { path: path.to_path_buf(), fallback: false }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = lockfile.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                continue;
            }
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::warn!(
                    path = %lockfile.display(),
                    "filesystem does not support atomic lock creation; treating lock as acquired"
                );
                return Some(LockGuard { path: path.to_path_buf(), fallback: true });
            }
            Err(e) if e.kind() != std::io::ErrorKind::AlreadyExists => {
                tracing::debug!(path = %lockfile.display(), error = %e, "lock acquisition failed");
                return None;
            }
            Err(_) => {
                // AlreadyExists: fall through to staleness handling below.
            }
        }

        let current = match read_content(&lockfile) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(_) => return None,
        };

        if current == my_content {
            // We apparently already hold it (e.g. lost reply on a networked
            // filesystem). Treat as acquired.
            return Some(LockGuard { path: path.to_path_buf(), fallback: false });
        }

        match &observed_since {
            Some((seen, since)) if *seen == current => {
                if since.elapsed() >= STALENESS_LIMIT {
                    if broken_once {
                        // We already broke it once this call; a holder that
                        // is still live after that is not stale, it's busy.
                        return None;
                    }
                    if let Some(_inner_guard) = acquire_inner_once(&lockfile) {
                        let _ = std::fs::remove_file(&lockfile);
                        broken_once = true;
                        observed_since = None;
                        continue;
                    }
                    return None;
                }
            }
            _ => observed_since = Some((current, Instant::now())),
        }

        std::thread::sleep(backoff_duration());
    }
}

/// Acquire a lock on the lock file itself, one level of recursion only, used
/// to arbitrate who gets to break a stale lock.
fn acquire_inner_once(lockfile: &Path) -> Option<LockGuard> {
    let inner = lock_path(lockfile);
    let content = my_content();
    match try_create(&inner, &content) {
        Ok(()) => Some(LockGuard { path: lockfile.to_path_buf(), fallback: false }),
        Err(_) => None,
    }
}

#[cfg(test)]
#[path = "lock_tests.rs"]
mod tests;
