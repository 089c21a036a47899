// CONTROL LOOP
//
// SINGLE COOPERATIVE LOOP, NO PARALLEL WORKERS. EACH
// ITERATION RUNS, IN ORDER: SAMPLE -> RATE -> CLASSIFY -> RESUME-CHECK ->
// POSSIBLY-ACT -> NOTIFY -> PERSIST-STATE -> SLEEP. AN ACTION TRIGGERED IN
// ITERATION `i` IS OBSERVABLE TO THE CLASSIFIER ONLY IN ITERATION `i+1`,
// SINCE `self.level` IS ONLY UPDATED AT THE END OF THE ITERATION THAT
// PRODUCED IT.

use std::path::PathBuf;
use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::action::{self, PausedRecord};
use crate::config::Config;
use crate::level::{self, Level};
use crate::levellog;
use crate::notify::{self, Channel, Notification};
use crate::pidfile::PidFile;
use crate::proc;
use crate::protected::ProtectedSet;
use crate::rate::RateEstimator;
use crate::resume::{self, ProcessFacts, ResumeDecision};
use crate::sample;
use crate::state::StateDir;
use crate::threshold::{self, ResolvedThresholds};
use crate::writer;
use crate::writerdb::{WriterCandidate, WriterDb};

pub const DEFAULT_STATE_DIR: &str = "/var/lib/disk-watchdog";
pub const DEFAULT_PID_FILE: &str = "/run/disk-watchdog.pid";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/disk-watchdog.conf";

/// Environment variable a supervisor sets to request heartbeat emission
/// (systemd's `Type=notify` + `WatchdogSec=` convention); value itself is
/// unused, only presence matters.
const WATCHDOG_ENV: &str = "WATCHDOG_USEC";

fn wall_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Globally-shared shutdown/reload flags. One pair per process; installed
/// once at the top of `run`.
pub struct Signals {
    pub shutdown: Arc<AtomicBool>,
    pub reload: Arc<AtomicBool>,
}

impl Signals {
    pub fn install() -> Result<Self> {
        let shutdown = Arc::new(AtomicBool::new(false));
        let reload = Arc::new(AtomicBool::new(false));

        let flag = shutdown.clone();
        ctrlc::set_handler(move || {
            flag.store(true, Ordering::SeqCst);
        })
        .context("failed to install SIGINT/SIGTERM handler")?;

        signal_hook::flag::register(signal_hook::consts::SIGHUP, reload.clone())
            .context("failed to install SIGHUP handler")?;

        Ok(Self { shutdown, reload })
    }
}

/// Fail fast if the configured tracer binary cannot be located: the
/// writer detector has nothing to offer the action executor without it,
/// so there is no point starting the loop only to error on the first
/// escalation. Shells out to `which` rather than parsing `$PATH` itself.
fn ensure_tracer_available(tracer_command: &str) -> Result<()> {
    let found = Command::new("which")
        .arg(tracer_command)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !found {
        bail!("tracer command {tracer_command:?} not found on PATH");
    }
    Ok(())
}

/// Whether a level change from `prior` to `new` warrants running the
/// action/notification pipeline, and which branch: escalation fires on
/// every strict increase in severity; recovery fires only when the level
/// drops all the way to `ok`. A repeated classification
/// at the same level -- the case `iterate()` already filters out before
/// calling `run_transition` at all -- is `None` here too, so a process
/// paused at entry into `pause` is never re-signalled by subsequent
/// iterations that reclassify at the same level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TransitionKind {
    Escalate,
    Recover,
    None,
}

/// Compile `target_patterns` into a single anchored matcher, the same way
/// `ProtectedSet` compiles its own pattern list. `None` if the list is
/// empty -- preferential reordering is then a no-op.
fn build_target_matcher(patterns: &[String]) -> Result<Option<Regex>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let joined: Vec<String> = patterns.iter().map(|p| format!("^(?:{p})$")).collect();
    let matcher = Regex::new(&joined.join("|")).context("failed to compile target pattern set")?;
    Ok(Some(matcher))
}

/// Move candidates whose comm matches `target_patterns` to the front of
/// the list, preserving the existing byte-descending order within each
/// group (a stable partition, mirroring how a preferred-victim list is
/// favored ahead of the general candidate pool before falling back to
/// plain ranking).
fn prefer_targets(mut candidates: Vec<WriterCandidate>, matcher: &Regex) -> Vec<WriterCandidate> {
    candidates.sort_by_key(|c| !matcher.is_match(&c.comm));
    candidates
}

fn transition_kind(prior: Level, new: Level) -> TransitionKind {
    if new > prior {
        TransitionKind::Escalate
    } else if new < prior && new == Level::Ok {
        TransitionKind::Recover
    } else {
        TransitionKind::None
    }
}

pub struct Daemon {
    cfg: Config,
    thresholds: ResolvedThresholds,
    protected: ProtectedSet,
    target_matcher: Option<Regex>,
    state: StateDir,
    channels: Vec<Box<dyn Channel>>,
    rate_est: RateEstimator,
    writers: WriterDb,
    paused: Vec<PausedRecord>,
    level: Level,
    dry_run: bool,
    device: String,
    user_uid: Option<u32>,
    config_path: PathBuf,
    _pidfile: PidFile,
}

impl Daemon {
    pub fn start(cfg: Config, config_path: PathBuf) -> Result<Self> {
        let user_uid = cfg.user.as_deref().and_then(proc::uid_for_username);
        if cfg.user.is_some() && user_uid.is_none() {
            log::warn!("[WARNING] configured user {:?} does not resolve to a uid", cfg.user);
        }

        ensure_tracer_available(&cfg.tracer_command)?;

        let sample = sample::sample(&cfg.mount)
            .with_context(|| format!("failed to read free space for {}", cfg.mount.display()))?;
        let thresholds = threshold::resolve(cfg.thresholds, sample.total_gb())
            .context("failed to resolve thresholds at startup")?;
        let device = sample::backing_device(&cfg.mount)
            .with_context(|| format!("failed to resolve backing device for {}", cfg.mount.display()))?;

        let protected = ProtectedSet::new(&cfg.protected_patterns)?;
        let target_matcher = build_target_matcher(&cfg.target_patterns)?;
        let state = StateDir::open(DEFAULT_STATE_DIR)?;
        let channels = notify::build_channels(&cfg.notify);
        let pidfile = PidFile::acquire(DEFAULT_PID_FILE)?;

        let level = state.load_level()?.unwrap_or(Level::Ok);
        let writers = state.load_writers()?;
        let paused = state.load_paused()?;

        let mut rate_est = RateEstimator::new(cfg.rate_warn_gb_per_min);
        if let Some((free_bytes, wall_time)) = state.load_rate_sample()? {
            rate_est.seed(free_bytes, wall_time);
        }

        let dry_run = cfg.dry_run;

        Ok(Self {
            dry_run,
            device,
            user_uid,
            config_path,
            thresholds,
            protected,
            target_matcher,
            state,
            channels,
            rate_est,
            writers,
            paused,
            level,
            cfg,
            _pidfile: pidfile,
        })
    }

    pub fn run_forever(&mut self, signals: &Signals) -> Result<()> {
        loop {
            if signals.shutdown.load(Ordering::SeqCst) {
                levellog::info("shutdown requested, exiting at loop boundary");
                return Ok(());
            }
            if signals.reload.swap(false, Ordering::SeqCst) {
                self.reload();
            }

            let sleep_secs = match self.iterate() {
                Ok(secs) => secs,
                Err(e) => {
                    log::error!("[WARNING] iteration error: {e:#}");
                    60
                }
            };

            self.sleep_interruptible(sleep_secs, signals);
        }
    }

    fn sleep_interruptible(&self, total_secs: u64, signals: &Signals) {
        let deadline = Instant::now() + std::time::Duration::from_secs(total_secs);
        while Instant::now() < deadline {
            if signals.shutdown.load(Ordering::SeqCst) || signals.reload.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(200));
        }
    }

    fn reload(&mut self) {
        match Config::load(&self.config_path) {
            Ok(new_cfg) => {
                let disk_gb = sample::sample(&new_cfg.mount).map(|s| s.total_gb()).ok();
                let Some(disk_gb) = disk_gb else {
                    levellog::warning("reload: failed to re-sample disk size, retaining previous thresholds");
                    return;
                };
                match threshold::resolve(new_cfg.thresholds, disk_gb) {
                    Ok(resolved) => {
                        self.thresholds = resolved;
                        self.cfg = new_cfg;
                        levellog::info("configuration reloaded");
                    }
                    Err(e) => {
                        levellog::warning(&format!(
                            "reload: threshold validation failed ({e:#}), retaining previous thresholds"
                        ));
                    }
                }
            }
            Err(e) => {
                levellog::warning(&format!("reload: failed to re-parse config ({e:#}), retaining previous config"));
            }
        }
    }

    /// One iteration of sample -> rate -> classify -> resume-check ->
    /// possibly-act -> notify -> persist-state. Returns the adaptive sleep
    /// interval (seconds) for the level this iteration settled on.
    fn iterate(&mut self) -> Result<u64> {
        let sample = match sample::sample(&self.cfg.mount) {
            Ok(s) => s,
            Err(e) => {
                log::error!("[WARNING] sample failed: {e:#}");
                return Ok(60);
            }
        };
        let free_gb = sample.free_gb();
        let rate = self.rate_est.update(sample.free_bytes, wall_now());

        let base = level::base_level(free_gb, &self.thresholds);
        let classified = level::classify(free_gb, rate, &self.thresholds, self.cfg.rate_escalate_minutes);
        if classified != base {
            levellog::rate(&format!("fill rate {rate} GB/min at {free_gb} GB free"));
            levellog::escalate(&format!(
                "escalated {} -> {} due to projected fill rate",
                base.label(),
                classified.label()
            ));
        }

        if let Err(e) = self.run_resume(free_gb, classified) {
            log::warn!("[WARNING] resume check failed: {e:#}");
        }

        let prior = self.level;
        if classified != prior {
            if let Err(e) = self.run_transition(prior, classified, free_gb) {
                log::warn!("[WARNING] level transition handling failed: {e:#}");
            }
        }
        self.level = classified;

        if let Err(e) = self.persist(sample.free_bytes) {
            log::warn!("[WARNING] state persistence failed: {e:#}");
        }

        if std::env::var_os(WATCHDOG_ENV).is_some() {
            levellog::heartbeat(classified.label(), free_gb);
        }

        // Sampling failures are the only iteration-transient error that
        // forces the flat 60s backoff (handled by the early return above);
        // every other in-loop failure is contained here so the adaptive
        // interval for the level we did manage to classify still applies.
        Ok(level::sleep_interval_secs(classified))
    }

    fn persist(&mut self, free_bytes: u64) -> Result<()> {
        self.state.save_level(self.level)?;
        self.state.save_rate_sample(free_bytes, wall_now())?;
        self.state.save_writers(&self.writers)?;
        self.state.save_paused(&self.paused)?;
        Ok(())
    }

    fn run_resume(&mut self, free_gb: u64, current_level: Level) -> Result<()> {
        if !resume::should_attempt(self.cfg.auto_resume, free_gb, self.thresholds.resume) {
            return Ok(());
        }
        let now = wall_now();
        let mut kept = Vec::new();
        let mut resumed = Vec::new();
        for record in self.paused.drain(..) {
            let facts = match proc::snapshot(record.pid) {
                Some(s) => ProcessFacts {
                    exists: true,
                    comm_matches: s.comm == record.comm,
                    is_stopped: s.stopped,
                },
                None => ProcessFacts {
                    exists: false,
                    comm_matches: false,
                    is_stopped: false,
                },
            };
            match resume::decide(&record, now, self.cfg.resume_cooldown_secs, self.cfg.resume_max_strikes, facts) {
                ResumeDecision::Keep => kept.push(record),
                ResumeDecision::Drop => {}
                ResumeDecision::Resume => {
                    if self.dry_run {
                        levellog::dry_run(&format!("would resume pid {} ({})", record.pid, record.comm));
                        resumed.push(record);
                    } else if let Err(e) = action::send_cont(record.pid) {
                        log::warn!("[WARNING] resume signal failed for pid {}: {e:#}", record.pid);
                        kept.push(record);
                    } else {
                        resumed.push(record);
                    }
                }
            }
        }
        self.paused = kept;

        if !resumed.is_empty() {
            let names: Vec<&str> = resumed.iter().map(|r| r.comm.as_str()).collect();
            let msg = format!("resumed {} process(es): {}", resumed.len(), names.join(", "));
            levellog::resume(&msg);
            notify::dispatch(
                &self.channels,
                &Notification {
                    level: current_level,
                    free_gb,
                    message: &msg,
                },
            );
        }
        Ok(())
    }

    fn run_transition(&mut self, prior: Level, new: Level, free_gb: u64) -> Result<()> {
        match transition_kind(prior, new) {
            TransitionKind::None => Ok(()),
            TransitionKind::Recover => self.run_recovery(new, free_gb),
            TransitionKind::Escalate => match new {
                Level::Notice => {
                    levellog::notice(&format!("free space at {free_gb} GB"));
                    Ok(())
                }
                Level::Warn => {
                    let msg = format!("free space at {free_gb} GB");
                    levellog::warning(&msg);
                    self.notify_cooldown_gated(new, free_gb, &msg)
                }
                Level::Harsh => {
                    self.refresh_writers();
                    let snippet = self.top_writer_snippet();
                    let msg = format!("free space at {free_gb} GB; top writers: {snippet}");
                    levellog::critical(&msg);
                    self.notify_cooldown_gated(new, free_gb, &msg)
                }
                Level::Pause => self.execute_signal_action(action::Level::Pause, free_gb),
                Level::Stop => self.execute_signal_action(action::Level::Stop, free_gb),
                Level::Kill => self.execute_signal_action(action::Level::Kill, free_gb),
                Level::Ok => unreachable!("Ok cannot be an escalation target"),
            },
        }
    }

    fn run_recovery(&mut self, new: Level, free_gb: u64) -> Result<()> {
        let msg = format!("disk space recovered, free space at {free_gb} GB");
        levellog::notice(&msg);
        for level in [
            Level::Notice,
            Level::Warn,
            Level::Harsh,
            Level::Pause,
            Level::Stop,
            Level::Kill,
        ] {
            self.state.clear_notify_time(level)?;
        }
        notify::dispatch(
            &self.channels,
            &Notification {
                level: new,
                free_gb,
                message: &msg,
            },
        );
        Ok(())
    }

    fn notify_cooldown_gated(&mut self, level: Level, free_gb: u64, msg: &str) -> Result<()> {
        let last = self.state.load_notify_time(level)?;
        let now = wall_now();
        if notify::should_notify(last, now, self.cfg.notify.cooldown_secs) {
            notify::dispatch(
                &self.channels,
                &Notification {
                    level,
                    free_gb,
                    message: msg,
                },
            );
            self.state.save_notify_time(level, now)?;
        }
        Ok(())
    }

    fn execute_signal_action(&mut self, level: action::Level, free_gb: u64) -> Result<()> {
        self.refresh_writers();
        let mut ranked = self.writers.ranked();
        if self.cfg.smart_mode {
            if let Some(matcher) = &self.target_matcher {
                ranked = prefer_targets(ranked, matcher);
            }
        }
        let candidates: Vec<WriterCandidate> = ranked.into_iter().take(level.top_n()).collect();
        let now = wall_now();
        let mut acted = 0usize;

        for c in &candidates {
            if self.dry_run {
                levellog::dry_run(&format!("would send {level:?} to pid {} ({})", c.pid, c.comm));
            } else if let Err(e) = action::send_signal(c.pid, level) {
                log::warn!("[WARNING] signal delivery failed for pid {}: {e:#}", c.pid);
                continue;
            }
            acted += 1;

            if level == action::Level::Pause {
                let previous = self.paused.iter().find(|r| r.pid == c.pid && r.comm == c.comm);
                let strikes = action::next_strike_count(previous, now);
                self.paused.retain(|r| r.pid != c.pid);
                self.paused.push(PausedRecord {
                    pid: c.pid,
                    comm: c.comm.clone(),
                    paused_at: now,
                    strikes,
                });
            }
        }

        let label = match level {
            action::Level::Pause => "pause",
            action::Level::Stop => "stop",
            action::Level::Kill => "kill",
        };
        let msg = format!("{label}: signalled {acted} of {} candidates at {free_gb} GB free", candidates.len());
        levellog::action(&msg);

        let report_level = match level {
            action::Level::Pause => Level::Pause,
            action::Level::Stop => Level::Stop,
            action::Level::Kill => Level::Kill,
        };
        notify::dispatch(
            &self.channels,
            &Notification {
                level: report_level,
                free_gb,
                message: &msg,
            },
        );
        Ok(())
    }

    /// Run the tracer for a 1-second window, cross-check every hit, and
    /// upsert it into the persisted writers table; then prune stale
    /// entries. Only called when severity warrants knowing *who* is
    /// writing (harsh and above) -- at ok/notice/warn there is nothing to
    /// act on yet, so the window is skipped to avoid spawning the tracer
    /// every few seconds for no operational reason.
    fn refresh_writers(&mut self) {
        match writer::trace(&self.cfg.tracer_command, &self.device, 1) {
            Ok(hits) => {
                let now = wall_now();
                for hit in hits {
                    if hit.bytes < self.cfg.tracer_byte_threshold {
                        continue;
                    }
                    let exists = proc::exists(hit.pid);
                    let owner_uid = proc::snapshot(hit.pid).map(|s| s.owner_uid);
                    if !writer::cross_check(&hit, self.user_uid, owner_uid, exists, &self.protected) {
                        continue;
                    }
                    self.writers.upsert(hit.pid, &hit.comm, hit.bytes, now);
                }
            }
            Err(e) => {
                log::error!("[WARNING] tracer window failed: {e:#}, falling back to /proc I/O scan");
                self.refresh_writers_from_proc();
            }
        }
        self.writers.evict_stale(wall_now(), proc::comm);
    }

    /// Fallback path used when a running tracer invocation fails: scan
    /// `/proc` directly for processes whose cumulative write_bytes clear
    /// `heavy_writer_byte_threshold`, so a transient tracer hiccup does not
    /// leave the severity response blind to who is filling the disk.
    fn refresh_writers_from_proc(&mut self) {
        let now = wall_now();
        for (pid, comm, bytes) in proc::heavy_writers(self.cfg.heavy_writer_byte_threshold) {
            let hit = writer::RawHit { pid, comm, bytes };
            let owner_uid = proc::snapshot(pid).map(|s| s.owner_uid);
            if !writer::cross_check(&hit, self.user_uid, owner_uid, true, &self.protected) {
                continue;
            }
            self.writers.upsert(hit.pid, &hit.comm, hit.bytes, now);
        }
    }

    fn top_writer_snippet(&self) -> String {
        self.writers
            .ranked()
            .into_iter()
            .take(3)
            .map(|c| format!("{}({})", c.comm, crate::fmt::human_bytes(c.bytes)))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Entry point for the `run` subcommand. `cfg` is already fully resolved
/// (file, then `--mount`/`--user`/`--dry-run` overrides applied) by the
/// caller; `config_path` is retained only so `SIGHUP` reload re-reads the
/// same file.
pub fn run(cfg: Config, config_path: PathBuf) -> Result<()> {
    let signals = Signals::install()?;
    let mut daemon = Daemon::start(cfg, config_path)?;
    daemon.run_forever(&signals)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ok -> notice -> warn -> harsh -> pause escalates at every step, and
    // a second iteration landing on `pause` again does not re-fire the
    // action.
    #[test]
    fn escalation_fires_at_every_step_pause_does_not_refire() {
        let path = [Level::Ok, Level::Notice, Level::Warn, Level::Harsh, Level::Pause];
        for pair in path.windows(2) {
            assert_eq!(transition_kind(pair[0], pair[1]), TransitionKind::Escalate);
        }
        assert_eq!(transition_kind(Level::Pause, Level::Pause), TransitionKind::None);
    }

    #[test]
    fn recovery_only_fires_at_ok() {
        assert_eq!(transition_kind(Level::Warn, Level::Notice), TransitionKind::None);
        assert_eq!(transition_kind(Level::Pause, Level::Ok), TransitionKind::Recover);
        assert_eq!(transition_kind(Level::Kill, Level::Ok), TransitionKind::Recover);
    }

    #[test]
    fn ensure_tracer_available_fails_for_nonexistent_command() {
        assert!(ensure_tracer_available("no-such-tracer-disk-watchdog-test").is_err());
    }

    fn candidate(pid: i32, comm: &str, bytes: u64) -> WriterCandidate {
        WriterCandidate {
            pid,
            comm: comm.to_string(),
            bytes,
            window_bytes: bytes,
            first_seen: 0,
            last_seen: 0,
        }
    }

    #[test]
    fn empty_target_patterns_compile_to_no_matcher() {
        assert!(build_target_matcher(&[]).unwrap().is_none());
    }

    #[test]
    fn prefer_targets_moves_matches_ahead_without_disturbing_order() {
        let matcher = build_target_matcher(&["ffmpeg".to_string()]).unwrap().unwrap();
        let ranked = vec![candidate(1, "rsync", 300), candidate(2, "ffmpeg", 100), candidate(3, "cp", 200)];
        let preferred = prefer_targets(ranked, &matcher);
        let names: Vec<&str> = preferred.iter().map(|c| c.comm.as_str()).collect();
        assert_eq!(names, vec!["ffmpeg", "rsync", "cp"]);
    }
}
