// SINGLE-INSTANCE LOCK
//
// AN EXCLUSIVE, NON-BLOCKING ADVISORY LOCK ON A PID FILE UNDER THE STATE
// DIRECTORY, HELD FOR THE LIFE OF THE `run` SUBCOMMAND: AT MOST ONE LIVE
// INSTANCE CAN OPERATE ON A GIVEN MOUNT AT A TIME. THE LOCK IS RELEASED
// AUTOMATICALLY ON DROP (ACQUIRED IN THE CONSTRUCTOR, RELEASED IN
// `Drop`), SO IT CAN NEVER OUTLIVE THE PROCESS EVEN ON AN EARLY RETURN.

use std::fs::{self, File};
use std::io::Write as _;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

pub struct PidFile {
    path: PathBuf,
    file: File,
}

impl PidFile {
    /// Acquire the lock at `path`, writing the current PID into it.
    /// Fails loudly (rather than blocking) if another instance already
    /// holds it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let file = File::create(&path).with_context(|| format!("failed to open {}", path.display()))?;

        // SAFETY: `file` owns a valid fd for the duration of this call;
        // LOCK_EX | LOCK_NB never blocks and reports EWOULDBLOCK via rc.
        let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
        if rc != 0 {
            bail!(
                "another disk-watchdog instance already holds the lock at {}",
                path.display()
            );
        }

        let mut file = file;
        file.set_len(0).ok();
        write!(file, "{}\n", std::process::id()).context("failed to write pid file")?;

        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        // SAFETY: `self.file`'s fd is valid until this struct is dropped;
        // unlocking a fd we hold the lock on cannot fail meaningfully.
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_writes_current_pid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk-watchdog.pid");
        let lock = PidFile::acquire(&path).unwrap();
        let contents = fs::read_to_string(lock.path()).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    #[test]
    fn second_acquire_on_same_path_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk-watchdog.pid");
        let _first = PidFile::acquire(&path).unwrap();
        assert!(PidFile::acquire(&path).is_err());
    }

    #[test]
    fn drop_releases_the_lock_and_removes_the_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("disk-watchdog.pid");
        {
            let _lock = PidFile::acquire(&path).unwrap();
        }
        assert!(!path.exists());
        let _reacquired = PidFile::acquire(&path).unwrap();
    }
}
