// ACTION EXECUTOR
//
// FOR EACH LEVEL TRANSITION THAT WARRANTS ACTION: SEND THE SIGNAL
// APPROPRIATE TO THE LEVEL TO THE TOP-N WRITERS, AND (FOR `pause`) RECORD
// EACH IN PausedRecords WITH STRIKE-COUNT BOOKKEEPING.
//
// STRIKE/RECORD BOOKKEEPING IS PURE AND UNIT-TESTED WITHOUT TOUCHING A
// REAL PROCESS TABLE; `send_signal` IS THE THIN, DIRECTLY-TESTED SYSCALL
// WRAPPER, WITH EACH RAW CALL JUSTIFIED BY A ONE-LINE SAFETY COMMENT.

use anyhow::{Context, Result};

/// One hour, in seconds: the strike-reset window.
pub const STRIKE_WINDOW_SECS: u64 = 3600;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Pause,
    Stop,
    Kill,
}

impl Level {
    pub fn top_n(self) -> usize {
        match self {
            Level::Pause => 5,
            Level::Stop => 5,
            Level::Kill => 10,
        }
    }

    fn signal(self) -> i32 {
        match self {
            Level::Pause => libc::SIGSTOP,
            Level::Stop => libc::SIGTERM,
            Level::Kill => libc::SIGKILL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PausedRecord {
    pub pid: i32,
    pub comm: String,
    pub paused_at: u64,
    pub strikes: u32,
}

/// Compute the next strike count for a `(pid, comm)` pair being paused
/// again at `now`, given its previous record (if any). Strikes reset when
/// the interval since the previous pause exceeds `STRIKE_WINDOW_SECS`.
pub fn next_strike_count(previous: Option<&PausedRecord>, now: u64) -> u32 {
    match previous {
        Some(prev) if now.saturating_sub(prev.paused_at) <= STRIKE_WINDOW_SECS => prev.strikes + 1,
        _ => 1,
    }
}

/// Send the signal appropriate to `level` to `pid`. Never sent in
/// dry-run mode by the caller (see `control.rs`); this function always
/// signals when called.
pub fn send_signal(pid: i32, level: Level) -> Result<()> {
    // SAFETY: kill(2) with a validated positive pid and a fixed signal
    // constant from `libc`; failure is reported via errno, never UB.
    let rc = unsafe { libc::kill(pid, level.signal()) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context(format!("failed to signal pid {pid}"));
    }
    Ok(())
}

/// Send CONT to a previously-paused `pid`. Kept distinct from
/// `send_signal`/`Level` since CONT is never part of the graduated
/// pause/stop/kill response -- it only ever comes from the resume manager
/// or the manual `resume` subcommand.
pub fn send_cont(pid: i32) -> Result<()> {
    // SAFETY: same contract as `send_signal`.
    let rc = unsafe { libc::kill(pid, libc::SIGCONT) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        return Err(err).context(format!("failed to resume pid {pid}"));
    }
    Ok(())
}

/// Serialize paused records to the TAB-separated
/// `pid\tcomm\tpaused_at\tstrikes` format.
pub fn format_lines(records: &[PausedRecord]) -> String {
    let mut out = String::new();
    for r in records {
        out.push_str(&format!("{}\t{}\t{}\t{}\n", r.pid, r.comm, r.paused_at, r.strikes));
    }
    out
}

pub fn parse_lines(text: &str) -> Vec<PausedRecord> {
    let mut out = Vec::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 4 {
            continue;
        }
        let (Ok(pid), Ok(paused_at), Ok(strikes)) = (
            fields[0].parse::<i32>(),
            fields[2].parse::<u64>(),
            fields[3].parse::<u32>(),
        ) else {
            continue;
        };
        out.push(PausedRecord {
            pid,
            comm: fields[1].to_string(),
            paused_at,
            strikes,
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_pause_has_one_strike() {
        assert_eq!(next_strike_count(None, 100), 1);
    }

    #[test]
    fn repeat_pause_within_hour_increments() {
        let prev = PausedRecord {
            pid: 1,
            comm: "a".into(),
            paused_at: 0,
            strikes: 1,
        };
        assert_eq!(next_strike_count(Some(&prev), 1800), 2);
    }

    #[test]
    fn repeat_pause_after_hour_resets() {
        let prev = PausedRecord {
            pid: 1,
            comm: "a".into(),
            paused_at: 0,
            strikes: 2,
        };
        assert_eq!(next_strike_count(Some(&prev), 3601), 1);
    }

    #[test]
    fn pauses_thrice_within_hour_reach_strike_three() {
        // Paused at t=0, 1200, 2400 (each within the hour) -> strikes=3.
        let mut record: Option<PausedRecord> = None;
        for t in [0u64, 1200, 2400] {
            let strikes = next_strike_count(record.as_ref(), t);
            record = Some(PausedRecord {
                pid: 1,
                comm: "a".into(),
                paused_at: t,
                strikes,
            });
        }
        assert_eq!(record.unwrap().strikes, 3);
    }

    #[test]
    fn top_n_per_level() {
        assert_eq!(Level::Pause.top_n(), 5);
        assert_eq!(Level::Stop.top_n(), 5);
        assert_eq!(Level::Kill.top_n(), 10);
    }

    #[test]
    fn format_and_parse_roundtrip() {
        let records = vec![PausedRecord {
            pid: 5,
            comm: "cc1".into(),
            paused_at: 100,
            strikes: 2,
        }];
        let text = format_lines(&records);
        let parsed = parse_lines(&text);
        assert_eq!(parsed, records);
    }

    #[test]
    fn send_signal_to_nonexistent_pid_fails() {
        // PID 2^30 is exceedingly unlikely to exist; this exercises the
        // error path without depending on any real process.
        let result = send_signal(1 << 30, Level::Stop);
        assert!(result.is_err());
    }
}
