// PROCESS INTROSPECTION
//
// THIN WRAPPER OVER THE `procfs` CRATE FOR THE FACTS THE WRITER DETECTOR
// AND RESUME MANAGER NEED: DOES A PID STILL EXIST, WHO OWNS IT, WHAT IS
// ITS COMM, AND IS IT CURRENTLY STOPPED (STATE `T`). KEPT AS ITS OWN
// MODULE SO BOTH CALL SITES SHARE ONE IMPLEMENTATION OF "READ /proc
// WITHOUT PANICKING ON A PROCESS THAT EXITED MID-READ".

use procfs::process::{Process, Stat};

/// Fallback writer discovery for when the tracer cannot be spawned or
/// fails mid-run: scan every process's cumulative `write_bytes` I/O
/// counter directly instead of watching tracer write events. Processes
/// whose I/O stats cannot be read (permission denied, already exited)
/// are silently skipped rather than treated as heavy writers.
pub fn heavy_writers(threshold_bytes: u64) -> Vec<(i32, String, u64)> {
    let mut out = Vec::new();
    let Ok(procs) = procfs::process::all_processes() else {
        return out;
    };
    for p in procs.flatten() {
        let Ok(io) = p.io() else { continue };
        if io.write_bytes < threshold_bytes {
            continue;
        }
        let Ok(stat) = p.stat() else { continue };
        out.push((p.pid(), stat.comm, io.write_bytes));
    }
    out
}

pub struct ProcSnapshot {
    pub pid: i32,
    pub comm: String,
    pub owner_uid: u32,
    pub stopped: bool,
}

/// Look up a PID's current comm/owner/state. Returns `None` if the
/// process has already exited or cannot be read (permission denied,
/// race with exit) rather than propagating an error -- a vanished
/// process is exactly the "drop this record" case callers want.
pub fn snapshot(pid: i32) -> Option<ProcSnapshot> {
    let process = Process::new(pid).ok()?;
    let owner_uid = process.owner;
    let stat: Stat = process.stat().ok()?;
    Some(ProcSnapshot {
        pid,
        comm: stat.comm,
        owner_uid,
        stopped: stat.state == 'T',
    })
}

/// Whether `pid` exists at all, regardless of readability of its stat.
pub fn exists(pid: i32) -> bool {
    Process::new(pid).is_ok()
}

/// comm for `pid`, if it can still be read.
pub fn comm(pid: i32) -> Option<String> {
    Process::new(pid).ok()?.stat().ok().map(|s| s.comm)
}

/// Resolve a username to a uid via `getpwnam_r`, for the config-file
/// `user` filter. `None` if the name does not resolve to
/// a passwd entry.
pub fn uid_for_username(name: &str) -> Option<u32> {
    let c_name = std::ffi::CString::new(name).ok()?;
    let mut pwd: libc::passwd = unsafe { std::mem::zeroed() };
    let mut buf = vec![0i8; 16384];
    let mut result: *mut libc::passwd = std::ptr::null_mut();

    // SAFETY: `buf` outlives the call and is large enough for typical
    // passwd entries; `result` is only read after checking the return
    // code, and only dereferenced while `buf`/`pwd` are still alive.
    let rc = unsafe {
        libc::getpwnam_r(
            c_name.as_ptr(),
            &mut pwd,
            buf.as_mut_ptr(),
            buf.len(),
            &mut result,
        )
    };
    if rc != 0 || result.is_null() {
        return None;
    }
    Some(pwd.pw_uid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_of_current_process_succeeds() {
        let pid = std::process::id() as i32;
        let snap = snapshot(pid).expect("current process must be readable");
        assert_eq!(snap.pid, pid);
        assert!(!snap.comm.is_empty());
    }

    #[test]
    fn exists_is_false_for_implausible_pid() {
        assert!(!exists(1 << 30));
    }

    #[test]
    fn comm_is_none_for_implausible_pid() {
        assert_eq!(comm(1 << 30), None);
    }

    #[test]
    fn uid_for_root_is_zero() {
        assert_eq!(uid_for_username("root"), Some(0));
    }

    #[test]
    fn uid_for_nonexistent_user_is_none() {
        assert_eq!(uid_for_username("no-such-user-disk-watchdog-test"), None);
    }

    #[test]
    fn heavy_writers_does_not_panic_with_impossible_threshold() {
        assert!(heavy_writers(u64::MAX).is_empty());
    }
}
