//! Non-clobbering file moves between curation directories.
//!
//! A destination is only ever created exclusively, either as a hard link
//! (same volume) or with `create_new` (cross-volume copy). An existing file
//! therefore can never be overwritten, even by a concurrent worker; the loser
//! of a race sees `AlreadyExists` and moves on to a disambiguated name.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{Result, SieveError};

use super::decision::CollisionNote;

/// Shared source of disambiguation suffixes.
///
/// One counter is owned per run and handed to every worker, so two workers
/// never derive the same suffix.
#[derive(Debug, Default)]
pub struct CollisionCounter(AtomicU64);

impl CollisionCounter {
    /// Create a counter starting at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next suffix (starting at 1).
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Number of suffixes handed out so far.
    pub fn issued(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry bounds for moves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MovePolicy {
    /// Attempts per destination on transient I/O failure.
    pub attempts: u32,
    /// Disambiguated names to try before giving up with a conflict.
    pub max_collisions: u32,
    /// Pause between I/O retries, in milliseconds.
    pub backoff_ms: u64,
}

impl Default for MovePolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            max_collisions: 64,
            backoff_ms: 50,
        }
    }
}

impl MovePolicy {
    /// Check the retry bounds.
    pub fn validate(&self) -> Result<()> {
        if self.attempts == 0 || self.attempts > 5 {
            return Err(SieveError::Config(format!(
                "move attempts must be between 1 and 5, got {}",
                self.attempts
            )));
        }
        if self.max_collisions == 0 {
            return Err(SieveError::Config(
                "max_collisions must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// How a move was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveMethod {
    /// Hard link then unlink; same volume.
    Link,
    /// Copy, verify, then delete the source.
    Copy,
}

/// Where a file landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveReceipt {
    pub destination: PathBuf,
    pub method: MoveMethod,
    pub collision: Option<CollisionNote>,
}

/// Moves files into directories without ever overwriting.
#[derive(Debug, Clone)]
pub struct FileMover {
    counter: Arc<CollisionCounter>,
    policy: MovePolicy,
}

impl Default for FileMover {
    fn default() -> Self {
        Self::new(Arc::new(CollisionCounter::new()), MovePolicy::default())
    }
}

impl FileMover {
    /// Create a mover sharing `counter`.
    pub fn new(counter: Arc<CollisionCounter>, policy: MovePolicy) -> Self {
        Self { counter, policy }
    }

    /// The shared collision counter.
    pub fn counter(&self) -> &Arc<CollisionCounter> {
        &self.counter
    }

    /// Move `source` into `dir` as `file_name`.
    ///
    /// If the name is taken, `<stem>__<n>.<ext>` is tried with `n` from the
    /// shared counter until a free name is found or the collision budget runs
    /// out. On any failure the source is left where it was.
    pub fn move_into(&self, source: &Path, dir: &Path, file_name: &str) -> Result<MoveReceipt> {
        fs::create_dir_all(dir).map_err(|e| SieveError::io(dir, e))?;

        let requested = dir.join(file_name);
        let mut destination = requested.clone();
        let mut collisions = 0;

        loop {
            match self.place_with_retry(source, &destination) {
                Ok(method) => {
                    let collision = (collisions > 0).then(|| CollisionNote {
                        requested: requested.clone(),
                        attempts: collisions,
                    });
                    debug!(
                        from = %source.display(),
                        to = %destination.display(),
                        ?method,
                        "Moved file"
                    );
                    return Ok(MoveReceipt {
                        destination,
                        method,
                        collision,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    collisions += 1;
                    if collisions > self.policy.max_collisions {
                        return Err(SieveError::MoveConflict {
                            path: requested,
                            attempts: self.policy.max_collisions,
                        });
                    }
                    let next = dir.join(disambiguate(file_name, self.counter.next()));
                    warn!(
                        taken = %destination.display(),
                        next = %next.display(),
                        "Destination name taken, renaming"
                    );
                    destination = next;
                }
                Err(source_error) => {
                    return Err(SieveError::MoveIo {
                        from: source.to_path_buf(),
                        to: destination,
                        source: source_error,
                    });
                }
            }
        }
    }

    fn place_with_retry(&self, source: &Path, destination: &Path) -> io::Result<MoveMethod> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 1;
        loop {
            match place(source, destination) {
                Ok(method) => return Ok(method),
                Err(e) if !is_transient(&e) || attempt >= attempts => return Err(e),
                Err(e) => {
                    warn!(
                        from = %source.display(),
                        to = %destination.display(),
                        attempt,
                        attempts,
                        error = %e,
                        "Move attempt failed, retrying"
                    );
                    thread::sleep(Duration::from_millis(
                        self.policy.backoff_ms * u64::from(attempt),
                    ));
                    attempt += 1;
                }
            }
        }
    }
}

/// Errors worth retrying: not a name collision and not a missing source.
fn is_transient(e: &io::Error) -> bool {
    !matches!(
        e.kind(),
        io::ErrorKind::AlreadyExists | io::ErrorKind::NotFound
    )
}

/// Exclusively create `destination` from `source`, then remove `source`.
fn place(source: &Path, destination: &Path) -> io::Result<MoveMethod> {
    if !source.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source '{}' is not a regular file", source.display()),
        ));
    }

    match fs::hard_link(source, destination) {
        Ok(()) => {
            if let Err(e) = fs::remove_file(source) {
                let _ = fs::remove_file(destination);
                return Err(e);
            }
            Ok(MoveMethod::Link)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Err(e),
        // Cross-volume, or links unsupported by the filesystem.
        Err(_) => copy_verify_delete(source, destination).map(|()| MoveMethod::Copy),
    }
}

fn copy_verify_delete(source: &Path, destination: &Path) -> io::Result<()> {
    let mut output = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(destination)?;

    let copied = (|| {
        let mut input = File::open(source)?;
        let expected = copy_hashing(&mut input, &mut output)?;
        output.sync_all()?;
        let actual = digest_file(destination)?;
        if actual != expected {
            return Err(io::Error::other("copy verification failed"));
        }
        Ok(())
    })();

    drop(output);
    if let Err(e) = copied {
        let _ = fs::remove_file(destination);
        return Err(e);
    }

    if let Err(e) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(e);
    }
    Ok(())
}

fn copy_hashing(input: &mut impl Read, output: &mut impl Write) -> io::Result<Vec<u8>> {
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];
    loop {
        let read = input.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        output.write_all(&buffer[..read])?;
    }
    Ok(hasher.finalize().to_vec())
}

fn digest_file(path: &Path) -> io::Result<Vec<u8>> {
    copy_hashing(&mut File::open(path)?, &mut io::sink())
}

/// `name.ext` → `name__<n>.ext`; names without an extension get the suffix at the end.
pub fn disambiguate(file_name: &str, n: u64) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}__{n}.{ext}"),
        _ => format!("{file_name}__{n}"),
    }
}
