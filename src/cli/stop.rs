use std::fs;

use anyhow::{Context, Result};

use disk_watchdog::proc;

use super::{pid_file_path, GlobalOpts};

/// `stop`: signal the running daemon via its PID file, or remove the PID
/// file if the process it names is already gone (stale lock left behind
/// by an unclean shutdown).
pub fn run(_global: &GlobalOpts) -> Result<()> {
    let path = pid_file_path();
    let text = match fs::read_to_string(&path) {
        Ok(t) => t,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            println!("not running (no pid file at {})", path.display());
            return Ok(());
        }
        Err(e) => return Err(e).with_context(|| format!("failed to read {}", path.display())),
    };

    let pid: i32 = text
        .trim()
        .parse()
        .with_context(|| format!("pid file {} does not contain a valid pid", path.display()))?;

    if !proc::exists(pid) {
        println!("pid {pid} is gone, removing stale pid file");
        fs::remove_file(&path).ok();
        return Ok(());
    }

    // SAFETY: kill(2) with a validated pid parsed from our own pid file
    // and a fixed signal constant; failure is reported via errno.
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).with_context(|| format!("failed to signal pid {pid}"));
    }
    println!("sent TERM to pid {pid}");
    Ok(())
}
