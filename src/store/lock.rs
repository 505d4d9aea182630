//! Named, timeout-bounded advisory file locks used to serialize access to a
//! tenant's on-disk records (`users/{tenant_id}/.locks/{name}.lock`).
//!
//! `fs4` exposes `try_lock_exclusive` but not a blocking-with-timeout
//! variant, so this polls it on a short interval until the timeout elapses —
//! the same strategy the Python original's `filelock` dependency uses under
//! the hood.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs4::FileExt;

use crate::error::{EngineError, EngineResult};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Blocks (by polling) until the lock is acquired or `timeout` elapses.
    pub fn acquire(locks_dir: &Path, name: &str, timeout_secs: u64) -> EngineResult<Self> {
        std::fs::create_dir_all(locks_dir).map_err(|e| EngineError::StoreCorrupt {
            path: locks_dir.display().to_string(),
            reason: e.to_string(),
        })?;
        let path = locks_dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)
            .map_err(|e| EngineError::StoreCorrupt {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let deadline = Instant::now() + Duration::from_secs(timeout_secs);
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => return Ok(Self { file, path }),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    return Err(EngineError::StoreCorrupt {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    })
                }
            }
            if Instant::now() >= deadline {
                return Err(EngineError::StoreBusy {
                    path: path.display().to_string(),
                    timeout_secs,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
