// THRESHOLD RESOLVER
// PURE-RUST MODULE, ZERO I/O, ZERO PROCESS-TABLE DEPENDENCIES
// SHARED BETWEEN THE DAEMON BINARY AND THE TEST SUITE
//
// RESOLVES THE SIX FREE-SPACE LEVELS (NOTICE/WARN/HARSH/PAUSE/STOP/KILL)
// PLUS THE RESUME LEVEL FROM EITHER A FIXED GB VALUE OR `auto`, GIVEN THE
// MEASURED SIZE OF THE MONITORED DISK.

use anyhow::{bail, Result};

// --- DEFAULT PERCENTAGES (USED WHEN A THRESHOLD IS `AUTO`) ---

const NOTICE_PCT: f64 = 10.0;
const WARN_PCT: f64 = 7.0;
const HARSH_PCT: f64 = 4.0;
const PAUSE_PCT: f64 = 2.0;
const STOP_PCT: f64 = 1.0;
const KILL_PCT: f64 = 0.5;

// --- MINIMA (GB) ---

const NOTICE_MIN: u64 = 10;
const WARN_MIN: u64 = 5;
const HARSH_MIN: u64 = 3;
const PAUSE_MIN: u64 = 2;
const STOP_MIN: u64 = 1;
const KILL_MIN: u64 = 1;

// --- CAPS (GB) ---

pub const PAUSE_MAX: u64 = 30;
pub const STOP_MAX: u64 = 15;
pub const KILL_MAX: u64 = 5;

const RESUME_DEFAULT_CAP: u64 = 50;

/// A single threshold value as it appears in the config file: either a
/// fixed GB value or `auto` (resolved from measured disk size).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RawThreshold {
    Auto,
    Fixed(u64),
}

impl RawThreshold {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        let v: i64 = s
            .parse()
            .map_err(|_| anyhow::anyhow!("threshold value {s:?} is not an integer or `auto`"))?;
        if v <= 0 {
            bail!("threshold value {s:?} must be a positive integer");
        }
        Ok(Self::Fixed(v as u64))
    }
}

/// The six resolved free-space levels, plus the resume level, all in whole
/// GB. Strictly decreasing except `resume`, which must be `>= 2 * pause`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedThresholds {
    pub notice: u64,
    pub warn: u64,
    pub harsh: u64,
    pub pause: u64,
    pub stop: u64,
    pub kill: u64,
    pub resume: u64,
}

fn auto_pct(disk_gb: u64, pct: f64, min: u64) -> u64 {
    let raw = (disk_gb as f64 * pct / 100.0) as u64;
    raw.max(min)
}

fn resolve_one(raw: RawThreshold, disk_gb: u64, pct: f64, min: u64, cap: Option<u64>) -> u64 {
    let v = match raw {
        RawThreshold::Auto => auto_pct(disk_gb, pct, min),
        RawThreshold::Fixed(v) => v,
    };
    match cap {
        Some(cap) => v.min(cap),
        None => v,
    }
}

/// Raw, unresolved configuration values feeding the resolver. Mirrors the
/// six config-file threshold keys plus the optional resume override.
#[derive(Clone, Copy, Debug)]
pub struct ThresholdInputs {
    pub notice: RawThreshold,
    pub warn: RawThreshold,
    pub harsh: RawThreshold,
    pub pause: RawThreshold,
    pub stop: RawThreshold,
    pub kill: RawThreshold,
    pub resume: RawThreshold,
}

impl Default for ThresholdInputs {
    fn default() -> Self {
        Self {
            notice: RawThreshold::Auto,
            warn: RawThreshold::Auto,
            harsh: RawThreshold::Auto,
            pause: RawThreshold::Auto,
            stop: RawThreshold::Auto,
            kill: RawThreshold::Auto,
            resume: RawThreshold::Auto,
        }
    }
}

/// Resolve raw threshold inputs against a measured disk size, applying the
/// percentage/minimum/cap rules above, and validating the resulting
/// ordering invariants.
pub fn resolve(inputs: ThresholdInputs, disk_gb: u64) -> Result<ResolvedThresholds> {
    let notice = resolve_one(inputs.notice, disk_gb, NOTICE_PCT, NOTICE_MIN, None);
    let warn = resolve_one(inputs.warn, disk_gb, WARN_PCT, WARN_MIN, None);
    let harsh = resolve_one(inputs.harsh, disk_gb, HARSH_PCT, HARSH_MIN, None);
    let pause = resolve_one(inputs.pause, disk_gb, PAUSE_PCT, PAUSE_MIN, Some(PAUSE_MAX));
    let stop = resolve_one(inputs.stop, disk_gb, STOP_PCT, STOP_MIN, Some(STOP_MAX));
    // 0.5% is computed in floating point and truncated toward zero before
    // the minimum/cap clamp, consistent with every other percentage here.
    let kill = resolve_one(inputs.kill, disk_gb, KILL_PCT, KILL_MIN, Some(KILL_MAX));

    let resume = match inputs.resume {
        RawThreshold::Fixed(v) => v,
        RawThreshold::Auto => {
            let base = harsh.min(RESUME_DEFAULT_CAP);
            base.max(2 * pause)
        }
    };

    let resolved = ResolvedThresholds {
        notice,
        warn,
        harsh,
        pause,
        stop,
        kill,
        resume,
    };
    validate(&resolved)?;
    Ok(resolved)
}

/// Validate the ordering invariants that must hold for any resolved
/// threshold set, regardless of where it came from (auto-derivation,
/// fixed config, or a reload).
pub fn validate(t: &ResolvedThresholds) -> Result<()> {
    if !(t.kill < t.stop && t.stop < t.pause && t.pause < t.harsh && t.harsh < t.warn && t.warn < t.notice)
    {
        bail!(
            "resolved thresholds are not strictly decreasing: kill={} stop={} pause={} harsh={} warn={} notice={}",
            t.kill, t.stop, t.pause, t.harsh, t.warn, t.notice
        );
    }
    if t.pause > PAUSE_MAX {
        bail!("pause threshold {} exceeds cap {}", t.pause, PAUSE_MAX);
    }
    if t.stop > STOP_MAX {
        bail!("stop threshold {} exceeds cap {}", t.stop, STOP_MAX);
    }
    if t.kill > KILL_MAX {
        bail!("kill threshold {} exceeds cap {}", t.kill, KILL_MAX);
    }
    if t.resume < 2 * t.pause {
        bail!(
            "resume threshold {} must be >= 2 * pause ({})",
            t.resume,
            2 * t.pause
        );
    }
    Ok(())
}
