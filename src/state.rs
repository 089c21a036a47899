// STATE DIRECTORY / ATOMIC PERSISTENCE
//
// EVERYTHING THE DAEMON MUST SURVIVE A RESTART WITH -- CURRENT LEVEL,
// RATE-ESTIMATOR SAMPLE, KNOWN WRITERS, PAUSED PIDS, LAST-NOTIFIED LEVEL
// PER CHANNEL -- LIVES UNDER ONE PRIVATE (0700) STATE DIRECTORY AS PLAIN
// TEXT FILES, EACH REWRITTEN ATOMICALLY: WRITE TO `<name>.tmp`, THEN
// RENAME OVER `<name>`, SO A CRASH MID-WRITE NEVER LEAVES A HALF-WRITTEN
// FILE BEHIND.

use std::fs;
use std::io::Write as _;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::action::{self, PausedRecord};
use crate::level::Level;
use crate::writerdb::{self, WriterDb};

pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Open (creating if necessary) the state directory, forcing mode
    /// 0700 since it may eventually hold destination addresses and other
    /// operator-supplied strings.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).with_context(|| format!("failed to create state dir {}", root.display()))?;
        fs::set_permissions(&root, fs::Permissions::from_mode(0o700))
            .with_context(|| format!("failed to set permissions on {}", root.display()))?;
        Ok(Self { root })
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Write `contents` to `<root>/<name>` atomically: write to a sibling
    /// `.tmp` file, fsync it, then rename over the destination.
    fn write_atomic(&self, name: &str, contents: &str) -> Result<()> {
        let dest = self.path(name);
        let tmp = dest.with_extension("tmp");
        {
            let mut f = fs::File::create(&tmp)
                .with_context(|| format!("failed to create {}", tmp.display()))?;
            f.write_all(contents.as_bytes())
                .with_context(|| format!("failed to write {}", tmp.display()))?;
            f.sync_all().ok();
        }
        fs::rename(&tmp, &dest)
            .with_context(|| format!("failed to rename {} to {}", tmp.display(), dest.display()))?;
        Ok(())
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.path(name)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("failed to read {}", self.path(name).display())),
        }
    }

    pub fn load_level(&self) -> Result<Option<Level>> {
        Ok(self
            .read_optional("state")?
            .and_then(|s| Level::from_label(s.trim())))
    }

    pub fn save_level(&self, level: Level) -> Result<()> {
        self.write_atomic("state", level.label())
    }

    /// Persisted rate-estimator sample: `free_bytes\twall_time`. Read back
    /// at startup to seed `RateEstimator` so a restart does not report a
    /// spurious zero rate on its first iteration.
    pub fn load_rate_sample(&self) -> Result<Option<(u64, u64)>> {
        let Some(text) = self.read_optional("rate")? else {
            return Ok(None);
        };
        let mut parts = text.trim().split('\t');
        let (Some(free), Some(time)) = (parts.next(), parts.next()) else {
            return Ok(None);
        };
        match (free.parse(), time.parse()) {
            (Ok(f), Ok(t)) => Ok(Some((f, t))),
            _ => Ok(None),
        }
    }

    pub fn save_rate_sample(&self, free_bytes: u64, wall_time: u64) -> Result<()> {
        self.write_atomic("rate", &format!("{free_bytes}\t{wall_time}\n"))
    }

    pub fn load_writers(&self) -> Result<WriterDb> {
        match self.read_optional("known_writers")? {
            Some(text) => Ok(writerdb::parse_lines(&text)),
            None => Ok(WriterDb::new()),
        }
    }

    pub fn save_writers(&self, db: &WriterDb) -> Result<()> {
        self.write_atomic("known_writers", &writerdb::format_lines(db))
    }

    pub fn load_paused(&self) -> Result<Vec<PausedRecord>> {
        match self.read_optional("paused_pids")? {
            Some(text) => Ok(action::parse_lines(&text)),
            None => Ok(Vec::new()),
        }
    }

    pub fn save_paused(&self, records: &[PausedRecord]) -> Result<()> {
        self.write_atomic("paused_pids", &action::format_lines(records))
    }

    /// Last wall-time (seconds) a notification was sent for `level`,
    /// used by the notification dispatcher's per-level cooldown gate.
    pub fn load_notify_time(&self, level: Level) -> Result<Option<u64>> {
        let name = format!("notify_{}", level.label());
        Ok(self.read_optional(&name)?.and_then(|s| s.trim().parse().ok()))
    }

    pub fn save_notify_time(&self, level: Level, now: u64) -> Result<()> {
        let name = format!("notify_{}", level.label());
        self.write_atomic(&name, &format!("{now}\n"))
    }

    /// Remove the persisted last-notified time for `level`, if any.
    /// Used when entering `ok` to clear every per-level cooldown.
    pub fn clear_notify_time(&self, level: Level) -> Result<()> {
        let path = self.path(&format!("notify_{}", level.label()));
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).context("failed to clear notification cooldown"),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn dir() -> (TempDir, StateDir) {
        let tmp = TempDir::new().unwrap();
        let state = StateDir::open(tmp.path().join("state")).unwrap();
        (tmp, state)
    }

    #[test]
    fn open_creates_directory_with_private_mode() {
        let (_tmp, state) = dir();
        let mode = fs::metadata(state.root()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
    }

    #[test]
    fn level_roundtrips() {
        let (_tmp, state) = dir();
        assert_eq!(state.load_level().unwrap(), None);
        state.save_level(Level::Harsh).unwrap();
        assert_eq!(state.load_level().unwrap(), Some(Level::Harsh));
    }

    #[test]
    fn rate_sample_roundtrips() {
        let (_tmp, state) = dir();
        state.save_rate_sample(123456, 789).unwrap();
        assert_eq!(state.load_rate_sample().unwrap(), Some((123456, 789)));
    }

    #[test]
    fn writers_roundtrip() {
        let (_tmp, state) = dir();
        let mut db = WriterDb::new();
        db.upsert(5, "rsync", 1000, 10);
        state.save_writers(&db).unwrap();
        let loaded = state.load_writers().unwrap();
        assert_eq!(loaded.len(), 1);
    }

    #[test]
    fn paused_roundtrip() {
        let (_tmp, state) = dir();
        let records = vec![PausedRecord {
            pid: 9,
            comm: "cc1".into(),
            paused_at: 10,
            strikes: 1,
        }];
        state.save_paused(&records).unwrap();
        assert_eq!(state.load_paused().unwrap(), records);
    }

    #[test]
    fn notify_time_roundtrips_per_level() {
        let (_tmp, state) = dir();
        assert_eq!(state.load_notify_time(Level::Warn).unwrap(), None);
        state.save_notify_time(Level::Warn, 500).unwrap();
        assert_eq!(state.load_notify_time(Level::Warn).unwrap(), Some(500));
        assert_eq!(state.load_notify_time(Level::Harsh).unwrap(), None);
    }

    #[test]
    fn clear_notify_time_removes_the_file() {
        let (_tmp, state) = dir();
        state.save_notify_time(Level::Warn, 500).unwrap();
        state.clear_notify_time(Level::Warn).unwrap();
        assert_eq!(state.load_notify_time(Level::Warn).unwrap(), None);
    }

    #[test]
    fn clear_notify_time_on_missing_file_is_not_an_error() {
        let (_tmp, state) = dir();
        assert!(state.clear_notify_time(Level::Kill).is_ok());
    }

    #[test]
    fn rewrite_does_not_leave_tmp_file_behind() {
        let (_tmp, state) = dir();
        state.save_level(Level::Ok).unwrap();
        state.save_level(Level::Warn).unwrap();
        assert!(!state.path("state.tmp").exists());
    }
}
