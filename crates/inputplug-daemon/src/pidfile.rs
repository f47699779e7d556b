//! PID file handling
//!
//! The file is opened and locked with `flock` before the daemon forks. The
//! lock is attached to the open file description, so it survives the fork
//! and is held for as long as the daemon runs; a second instance finds the
//! file locked and refuses to start.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidfileError {
    /// Another instance holds the lock
    #[error("Already running as {}", pid.map_or_else(|| "unknown pid".to_string(), |p| p.to_string()))]
    AlreadyRunning { pid: Option<u32> },

    #[error("Can't open or create pidfile {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Can't lock pidfile {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: Errno,
    },

    #[error("Failed to write pidfile {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A locked PID file, removed again on drop
pub struct Pidfile {
    lock: Flock<File>,
    path: PathBuf,
}

impl Pidfile {
    /// Open and lock `path`
    ///
    /// A relative `path` is anchored to the current directory now, so the
    /// file is still found for removal after the daemon changes to `/`.
    ///
    /// # Errors
    ///
    /// Returns `PidfileError::AlreadyRunning` when another live process
    /// holds the lock, with its PID if the file names one.
    pub fn open(path: &Path) -> Result<Self, PidfileError> {
        let open_error = |source| PidfileError::Open {
            path: path.to_path_buf(),
            source,
        };
        let path = &std::path::absolute(path).map_err(open_error)?;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(0o600)
            .open(path)
            .map_err(open_error)?;

        let lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(PidfileError::AlreadyRunning {
                    pid: read_pid(path),
                })
            }
            Err((_, errno)) => {
                return Err(PidfileError::Lock {
                    path: path.to_path_buf(),
                    source: errno,
                })
            }
        };

        Ok(Self {
            lock,
            path: path.to_path_buf(),
        })
    }

    /// Record the current process id
    ///
    /// Called after daemonizing, so the file names the daemon rather than
    /// the process that started it.
    pub fn write(&mut self) -> Result<(), PidfileError> {
        let pid = std::process::id();
        let write_error = |source| PidfileError::Write {
            path: self.path.clone(),
            source,
        };

        self.lock.set_len(0).map_err(write_error)?;
        self.lock.seek(SeekFrom::Start(0)).map_err(write_error)?;
        writeln!(*self.lock, "{}", pid).map_err(write_error)?;
        self.lock.sync_all().map_err(write_error)?;

        tracing::debug!("Wrote pid {} to {}", pid, self.path.display());
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for Pidfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pidfile").field("path", &self.path).finish()
    }
}

impl Drop for Pidfile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!("Failed to remove pidfile {}: {}", self.path.display(), e);
        }
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path).ok()?.trim().parse().ok()
}
