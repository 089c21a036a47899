// PERSISTED WRITERS TABLE
//
// BRIDGES GAPS BETWEEN TRACER SAMPLES: EVERY FRESHLY OBSERVED WRITER IS
// UPSERTED (first_seen PRESERVED, bytes/last_seen UPDATED); STALE ENTRIES
// (PID GONE OR COMM CHANGED) ARE PRUNED PERIODICALLY. THE FINAL RANKED
// LIST IS THE BYTE-DESC MERGE OF THE CURRENT TRACER WINDOW AND THIS
// TABLE, DE-DUPLICATED BY PID, CAPPED AT 10.
//
// EVICTION KEYS ON THE *PID* IDENTITY RATHER THAN COMM: A COMM CHANGE
// INVALIDATES THE PID'S ENTRY, NOT THE REVERSE, SINCE A REUSED PID WITH A
// NEW COMM IS A DIFFERENT PROCESS ENTIRELY.

use std::collections::HashMap;

pub const MAX_CANDIDATES: usize = 10;

/// Entries older than this (by last_seen) with no fresh tracer hit are
/// pruned. Implementation-defined; chosen to span a
/// few control-loop iterations at the `ok`/`notice` adaptive-sleep
/// interval so a writer isn't evicted merely because the loop is sleeping
/// for minutes between samples.
pub const STALE_TTL_SECS: u64 = 600;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriterCandidate {
    pub pid: i32,
    pub comm: String,
    /// Monotonically-updated ranking value: `max(bytes, window_bytes)` on
    /// every upsert. Never interchanged with `window_bytes` -- one is a
    /// ranking value carried across windows, the other is this window's
    /// raw tracer count, and the two are not the same unit.
    pub bytes: u64,
    /// Bytes observed in the most recent tracer window; 0 if this entry
    /// is currently only a gap-bridge hit from a prior window.
    pub window_bytes: u64,
    pub first_seen: u64,
    pub last_seen: u64,
}

pub struct WriterDb {
    entries: HashMap<i32, WriterCandidate>,
}

impl WriterDb {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn from_candidates(candidates: Vec<WriterCandidate>) -> Self {
        let mut db = Self::new();
        for c in candidates {
            db.entries.insert(c.pid, c);
        }
        db
    }

    /// Upsert one tracer observation. If an existing entry's `comm`
    /// differs from this PID, the old identity is gone, so the entry is
    /// replaced, not merged.
    pub fn upsert(&mut self, pid: i32, comm: &str, window_bytes: u64, now: u64) {
        match self.entries.get_mut(&pid) {
            Some(existing) if existing.comm == comm => {
                existing.bytes = existing.bytes.max(window_bytes);
                existing.window_bytes = window_bytes;
                existing.last_seen = now;
            }
            _ => {
                self.entries.insert(
                    pid,
                    WriterCandidate {
                        pid,
                        comm: comm.to_string(),
                        bytes: window_bytes,
                        window_bytes,
                        first_seen: now,
                        last_seen: now,
                    },
                );
            }
        }
    }

    /// Prune entries whose PID no longer exists, whose comm no longer
    /// matches the live process table, or that have not been refreshed
    /// within `STALE_TTL_SECS`. `pid_comm` returns `None` if the PID is
    /// gone.
    pub fn evict_stale<F>(&mut self, now: u64, mut pid_comm: F)
    where
        F: FnMut(i32) -> Option<String>,
    {
        self.entries.retain(|&pid, entry| {
            if now.saturating_sub(entry.last_seen) > STALE_TTL_SECS {
                return false;
            }
            match pid_comm(pid) {
                Some(comm) => comm == entry.comm,
                None => false,
            }
        });
    }

    /// Byte-descending list capped at `MAX_CANDIDATES`, merging table
    /// entries with a fresh tracer window (duplicates by PID resolved in
    /// favor of the freshest `window_bytes`).
    pub fn ranked(&self) -> Vec<WriterCandidate> {
        let mut all: Vec<WriterCandidate> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| b.bytes.cmp(&a.bytes).then(a.pid.cmp(&b.pid)));
        all.truncate(MAX_CANDIDATES);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &WriterCandidate> {
        self.entries.values()
    }
}

impl Default for WriterDb {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize to the TAB-separated `pid\tcomm\tbytes\tfirst_seen\tlast_seen`
/// format, one line per entry. Pure text transform so it
/// can be tested without touching the filesystem; see `state.rs` for the
/// atomic-rewrite wrapper.
pub fn format_lines(db: &WriterDb) -> String {
    let mut out = String::new();
    for c in db.entries.values() {
        out.push_str(&format!(
            "{}\t{}\t{}\t{}\t{}\n",
            c.pid, c.comm, c.bytes, c.first_seen, c.last_seen
        ));
    }
    out
}

/// Parse the TAB-separated format back into a `WriterDb`. Malformed lines
/// are skipped (best-effort; a corrupted state file must not crash the
/// daemon).
pub fn parse_lines(text: &str) -> WriterDb {
    let mut db = WriterDb::new();
    for line in text.lines() {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 5 {
            continue;
        }
        let (Ok(pid), Ok(bytes), Ok(first_seen), Ok(last_seen)) = (
            fields[0].parse::<i32>(),
            fields[2].parse::<u64>(),
            fields[3].parse::<u64>(),
            fields[4].parse::<u64>(),
        ) else {
            continue;
        };
        db.entries.insert(
            pid,
            WriterCandidate {
                pid,
                comm: fields[1].to_string(),
                bytes,
                window_bytes: 0,
                first_seen,
                last_seen,
            },
        );
    }
    db
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_preserves_first_seen_on_refresh() {
        let mut db = WriterDb::new();
        db.upsert(100, "rsync", 1000, 10);
        db.upsert(100, "rsync", 2000, 20);
        let c = db.entries.get(&100).unwrap();
        assert_eq!(c.first_seen, 10);
        assert_eq!(c.last_seen, 20);
        assert_eq!(c.bytes, 2000);
    }

    #[test]
    fn upsert_resets_identity_on_comm_change() {
        let mut db = WriterDb::new();
        db.upsert(100, "rsync", 1000, 10);
        db.upsert(100, "cp", 500, 30);
        let c = db.entries.get(&100).unwrap();
        assert_eq!(c.comm, "cp");
        assert_eq!(c.first_seen, 30);
        assert_eq!(c.bytes, 500);
    }

    #[test]
    fn bytes_tracks_cumulative_max_not_window() {
        let mut db = WriterDb::new();
        db.upsert(1, "a", 5000, 1);
        db.upsert(1, "a", 1000, 2); // smaller window sample
        let c = db.entries.get(&1).unwrap();
        assert_eq!(c.bytes, 5000);
        assert_eq!(c.window_bytes, 1000);
    }

    #[test]
    fn evict_stale_removes_gone_pids() {
        let mut db = WriterDb::new();
        db.upsert(1, "a", 100, 0);
        db.upsert(2, "b", 100, 0);
        db.evict_stale(10, |pid| if pid == 1 { Some("a".to_string()) } else { None });
        assert_eq!(db.len(), 1);
        assert!(db.entries.contains_key(&1));
    }

    #[test]
    fn evict_stale_removes_comm_mismatch() {
        let mut db = WriterDb::new();
        db.upsert(1, "a", 100, 0);
        db.evict_stale(10, |_| Some("different".to_string()));
        assert!(db.is_empty());
    }

    #[test]
    fn evict_stale_removes_ttl_expired() {
        let mut db = WriterDb::new();
        db.upsert(1, "a", 100, 0);
        db.evict_stale(STALE_TTL_SECS + 1, |_| Some("a".to_string()));
        assert!(db.is_empty());
    }

    #[test]
    fn ranked_is_byte_descending_and_capped() {
        let mut db = WriterDb::new();
        for i in 0..15 {
            db.upsert(i, "w", (i as u64 + 1) * 10, 0);
        }
        let ranked = db.ranked();
        assert_eq!(ranked.len(), MAX_CANDIDATES);
        for pair in ranked.windows(2) {
            assert!(pair[0].bytes >= pair[1].bytes);
        }
    }

    #[test]
    fn format_and_parse_roundtrip() {
        let mut db = WriterDb::new();
        db.upsert(42, "rsync", 123456, 10);
        db.upsert(7, "cp", 99, 20);
        let text = format_lines(&db);
        let parsed = parse_lines(&text);
        assert_eq!(parsed.len(), 2);
        let c = parsed.entries.get(&42).unwrap();
        assert_eq!(c.comm, "rsync");
        assert_eq!(c.bytes, 123456);
        assert_eq!(c.first_seen, 10);
    }

    #[test]
    fn parse_skips_malformed_lines() {
        let parsed = parse_lines("not-enough-fields\n1\t2\t3\t4\t5\n");
        assert_eq!(parsed.len(), 1);
    }
}
