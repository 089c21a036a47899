// WRITER DETECTOR
//
// SPAWNS THE CONFIGURED TRACER (DEFAULT `biosnoop`) FOR A FIXED SAMPLING
// WINDOW WITH AN EXPLICIT ARGV LIST -- NEVER A SHELL STRING -- PARSES ITS
// TABULAR STDOUT, AND CROSS-CHECKS EVERY REPORTED PID AGAINST THE LIVE
// PROCESS TABLE AND THE PROTECTED-PROCESS SET BEFORE IT IS ALLOWED TO
// BECOME A SIGNALLING CANDIDATE.
//
// DELIBERATELY DOES NOT ATTACH A BPF PROGRAM DIRECTLY: THE TRACER BINARY
// ALREADY OWNS THAT RESPONSIBILITY AND IS EXPECTED TO BE INSTALLED
// SEPARATELY (bpftrace/bcc-tools PACKAGE), SO THIS MODULE'S JOB IS
// PROCESS SUPERVISION AND TEXT PARSING, NOT INSTRUMENTATION.

use std::io::Read;
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::protected::ProtectedSet;

/// One line of tracer output that named a write to the configured device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawHit {
    pub pid: i32,
    pub comm: String,
    pub bytes: u64,
}

/// Run the tracer for `window_secs` seconds against `device` (a bare
/// device name such as `sda` or `nvme0n1`, as resolved by
/// `sample::backing_device`) and return the raw hits. The caller merges
/// these into a `WriterDb` and applies the byte threshold.
pub fn trace(tracer_command: &str, device: &str, window_secs: u64) -> Result<Vec<RawHit>> {
    let mut child = Command::new(tracer_command)
        .arg("-d")
        .arg(device)
        .arg(window_secs.to_string())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("failed to spawn tracer {tracer_command:?}"))?;

    std::thread::sleep(Duration::from_secs(window_secs));

    let mut stdout = child.stdout.take().expect("stdout was piped");
    let mut output = String::new();
    stdout
        .read_to_string(&mut output)
        .context("failed to read tracer output")?;

    // Reap the child regardless of output readability; biosnoop-style
    // tracers run until killed, so this call blocks only as long as the
    // process takes to exit after its window elapses on its own, or is
    // already dead.
    let _ = child.wait();

    Ok(parse_tracer_output(&output))
}

/// Parse `biosnoop`-style tabular output. Expected columns (whitespace
/// separated, header line ignored): TIME, COMM, PID, DISK, T, SECTOR,
/// BYTES, LAT(ms). Only COMM, PID, and BYTES are used. Malformed or
/// unrecognized lines are skipped rather than treated as fatal -- tracer
/// output format drift must degrade to "no writers found this window",
/// not crash the daemon.
fn parse_tracer_output(text: &str) -> Vec<RawHit> {
    let mut hits = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 7 {
            continue;
        }
        let Ok(pid) = fields[2].parse::<i32>() else {
            continue;
        };
        let Ok(bytes) = fields[6].parse::<u64>() else {
            continue;
        };
        hits.push(RawHit {
            pid,
            comm: fields[1].to_string(),
            bytes,
        });
    }
    hits
}

/// A hit cleared for signalling: PID still exists, owner matches the
/// configured user filter (if any), and comm is not in the protected set.
pub fn cross_check(
    hit: &RawHit,
    configured_user_uid: Option<u32>,
    actual_owner_uid: Option<u32>,
    pid_exists: bool,
    protected: &ProtectedSet,
) -> bool {
    if !pid_exists {
        return false;
    }
    if protected.is_protected(&hit.comm) {
        return false;
    }
    if let Some(wanted) = configured_user_uid {
        match actual_owner_uid {
            Some(actual) if actual == wanted => {}
            _ => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_biosnoop_line() {
        let text = "TIME(s)     COMM   PID    DISK    T  SECTOR    BYTES   LAT(ms)\n\
                     0.000000    rsync  1234   sda     W  2048      65536   1.23\n";
        let hits = parse_tracer_output(text);
        assert_eq!(
            hits,
            vec![RawHit {
                pid: 1234,
                comm: "rsync".to_string(),
                bytes: 65536,
            }]
        );
    }

    #[test]
    fn skips_short_or_malformed_lines() {
        let text = "garbage\n1 2 notanumber 4 5 6 7\n";
        assert!(parse_tracer_output(text).is_empty());
    }

    #[test]
    fn cross_check_rejects_gone_pid() {
        let hit = RawHit {
            pid: 1,
            comm: "rsync".to_string(),
            bytes: 100,
        };
        let protected = ProtectedSet::new(&[]).unwrap();
        assert!(!cross_check(&hit, None, None, false, &protected));
    }

    #[test]
    fn cross_check_rejects_protected_comm() {
        let hit = RawHit {
            pid: 1,
            comm: "systemd".to_string(),
            bytes: 100,
        };
        let protected = ProtectedSet::new(&[]).unwrap();
        assert!(!cross_check(&hit, None, None, true, &protected));
    }

    #[test]
    fn cross_check_rejects_user_mismatch() {
        let hit = RawHit {
            pid: 1,
            comm: "rsync".to_string(),
            bytes: 100,
        };
        let protected = ProtectedSet::new(&[]).unwrap();
        assert!(!cross_check(&hit, Some(1000), Some(1001), true, &protected));
    }

    #[test]
    fn cross_check_passes_clean_hit() {
        let hit = RawHit {
            pid: 1,
            comm: "rsync".to_string(),
            bytes: 100,
        };
        let protected = ProtectedSet::new(&[]).unwrap();
        assert!(cross_check(&hit, Some(1000), Some(1000), true, &protected));
        assert!(cross_check(&hit, None, None, true, &protected));
    }
}
