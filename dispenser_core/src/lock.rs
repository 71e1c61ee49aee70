//! Single-writer guard for the state file.
//!
//! The owner of the state writes a sibling `<state>.lock` sentinel naming its
//! PID. Anyone else that wants to write the state must take the same lock, so
//! a running control loop and a one-shot maintenance command never overwrite
//! each other's edits. A sentinel whose PID is no longer running is reclaimed.

use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::DispenserError;

/// Contents of the sentinel file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub holder: String,
}

/// Held for as long as the process may write the state file; released on drop.
#[derive(Debug)]
pub struct StateLock {
    path: PathBuf,
    owner: LockOwner,
}

/// `<dir>/<state file name>.lock`
pub fn lock_path(state: &Path) -> PathBuf {
    let mut name = state
        .file_name()
        .map_or_else(|| OsString::from("state"), OsString::from);
    name.push(".lock");
    state.with_file_name(name)
}

fn read_owner(path: &Path) -> Option<LockOwner> {
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Liveness via `/proc`; without `/proc` every holder is assumed alive.
fn is_pid_alive(pid: u32) -> bool {
    let proc = Path::new("/proc");
    if !proc.is_dir() {
        return true;
    }
    proc.join(pid.to_string()).exists()
}

fn lock_err(path: &Path, what: &str, e: &std::io::Error) -> DispenserError {
    DispenserError::Persistence(format!("{what} {}: {e}", path.display()))
}

impl StateLock {
    /// Claim the lock for `state`.
    ///
    /// Fails with [`DispenserError::StateLocked`] while a live process holds
    /// it, including this one.
    pub fn acquire(state: &Path, holder: &str) -> Result<Self, DispenserError> {
        let path = lock_path(state);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| lock_err(dir, "create", &e))?;
        }
        let owner = LockOwner {
            pid: std::process::id(),
            holder: holder.to_string(),
        };
        let body =
            serde_json::to_vec(&owner).map_err(|e| DispenserError::Persistence(e.to_string()))?;

        // Second pass only after a stale sentinel was removed.
        for _ in 0..2 {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut f) => {
                    if let Err(e) = f.write_all(&body).and_then(|()| f.sync_all()) {
                        let _ = fs::remove_file(&path);
                        return Err(lock_err(&path, "write", &e));
                    }
                    debug!(path = %path.display(), holder, "state lock acquired");
                    return Ok(Self { path, owner });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => match read_owner(&path) {
                    Some(existing) if is_pid_alive(existing.pid) => {
                        return Err(DispenserError::StateLocked {
                            pid: existing.pid,
                            holder: existing.holder,
                        });
                    }
                    stale => {
                        warn!(
                            path = %path.display(),
                            pid = stale.as_ref().map(|o| o.pid),
                            "reclaiming stale state lock"
                        );
                        match fs::remove_file(&path) {
                            Ok(()) => {}
                            Err(e) if e.kind() == ErrorKind::NotFound => {}
                            Err(e) => return Err(lock_err(&path, "remove", &e)),
                        }
                    }
                },
                Err(e) => return Err(lock_err(&path, "create", &e)),
            }
        }
        Err(DispenserError::Persistence(format!(
            "could not acquire {}",
            path.display()
        )))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        if read_owner(&self.path).as_ref() != Some(&self.owner) {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "state lock released"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "state lock not removed"),
        }
    }
}
