// LEVEL CLASSIFIER
// PURE-RUST MODULE, ZERO I/O. SHARED BETWEEN THE DAEMON BINARY AND THE
// TEST SUITE: PLAIN FUNCTIONS OVER EXPLICIT NUMERIC PARAMETERS, NO HIDDEN
// STATE.
//
// TWO-PHASE CLASSIFICATION:
//   1. BASE LEVEL BY STRICT COMPARISON AGAINST RESOLVED THRESHOLDS.
//   2. RATE-AWARE ESCALATION: ONE STEP UP IF THE CURRENT FILL RATE WOULD
//      CROSS THE NEXT THRESHOLD WITHIN THE CONFIGURED ESCALATION WINDOW.

use crate::threshold::ResolvedThresholds;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Ok = 0,
    Notice = 1,
    Warn = 2,
    Harsh = 3,
    Pause = 4,
    Stop = 5,
    Kill = 6,
}

impl Level {
    pub fn label(self) -> &'static str {
        match self {
            Level::Ok => "ok",
            Level::Notice => "notice",
            Level::Warn => "warn",
            Level::Harsh => "harsh",
            Level::Pause => "pause",
            Level::Stop => "stop",
            Level::Kill => "kill",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Some(match s {
            "ok" => Level::Ok,
            "notice" => Level::Notice,
            "warn" => Level::Warn,
            "harsh" => Level::Harsh,
            "pause" => Level::Pause,
            "stop" => Level::Stop,
            "kill" => Level::Kill,
            _ => return None,
        })
    }

    /// One step more severe, or `self` if already `Kill`. Used by the
    /// rate-aware escalation phase, which is limited to a single step.
    fn escalate_once(self) -> Level {
        match self {
            Level::Ok => Level::Notice,
            Level::Notice => Level::Warn,
            Level::Warn => Level::Harsh,
            Level::Harsh => Level::Pause,
            Level::Pause => Level::Stop,
            Level::Stop => Level::Kill,
            Level::Kill => Level::Kill,
        }
    }

    /// The free-space threshold (GB) that, once crossed going down,
    /// would move the system *into* this level from the level above it.
    /// `Ok` has no such threshold.
    fn entry_threshold(self, t: &ResolvedThresholds) -> Option<u64> {
        match self {
            Level::Ok => None,
            Level::Notice => Some(t.notice),
            Level::Warn => Some(t.warn),
            Level::Harsh => Some(t.harsh),
            Level::Pause => Some(t.pause),
            Level::Stop => Some(t.stop),
            Level::Kill => Some(t.kill),
        }
    }
}

/// Default escalation window, in minutes.
pub const DEFAULT_ESCALATE_MINUTES: u64 = 10;

/// Adaptive sleep interval after classifying this level, in seconds.
pub fn sleep_interval_secs(level: Level) -> u64 {
    match level {
        Level::Ok => 300,
        Level::Notice => 60,
        Level::Warn => 30,
        Level::Harsh => 10,
        Level::Pause => 3,
        Level::Stop => 1,
        Level::Kill => 1,
    }
}

/// Phase 1: strict comparison against resolved thresholds, lowest matching.
pub fn base_level(free_gb: u64, t: &ResolvedThresholds) -> Level {
    if free_gb <= t.kill {
        Level::Kill
    } else if free_gb <= t.stop {
        Level::Stop
    } else if free_gb <= t.pause {
        Level::Pause
    } else if free_gb <= t.harsh {
        Level::Harsh
    } else if free_gb <= t.warn {
        Level::Warn
    } else if free_gb <= t.notice {
        Level::Notice
    } else {
        Level::Ok
    }
}

/// Full two-phase classification: base level, then at most one rate-aware
/// escalation step.
pub fn classify(free_gb: u64, rate_gb_per_min: i64, t: &ResolvedThresholds, escalate_minutes: u64) -> Level {
    let base = base_level(free_gb, t);
    if rate_gb_per_min <= 0 || escalate_minutes == 0 || base == Level::Kill {
        return base;
    }
    let next = base.escalate_once();
    let Some(next_threshold) = next.entry_threshold(t) else {
        return base;
    };
    if free_gb <= next_threshold {
        // Already at or below the next level's own threshold; base_level
        // would have placed us there already, so there is nothing to do.
        return base;
    }
    let minutes_to_next = (free_gb - next_threshold) as f64 / rate_gb_per_min as f64;
    if minutes_to_next < escalate_minutes as f64 {
        next
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threshold::{resolve, ThresholdInputs};

    fn sample_thresholds() -> ResolvedThresholds {
        resolve(ThresholdInputs::default(), 1700).unwrap()
    }

    // === BASE LEVEL ===

    #[test]
    fn base_level_ok_above_notice() {
        let t = sample_thresholds();
        assert_eq!(base_level(t.notice + 1, &t), Level::Ok);
    }

    #[test]
    fn base_level_boundary_is_inclusive_low_side() {
        let t = sample_thresholds();
        assert_eq!(base_level(t.notice, &t), Level::Notice);
        assert_eq!(base_level(t.kill, &t), Level::Kill);
    }

    #[test]
    fn base_level_kill_at_zero() {
        let t = sample_thresholds();
        assert_eq!(base_level(0, &t), Level::Kill);
    }

    // === RATE ESCALATION ===

    #[test]
    fn high_fill_rate_escalates_one_level_early() {
        let t = sample_thresholds(); // harsh = 68
        let level = classify(70, 10, &t, DEFAULT_ESCALATE_MINUTES);
        assert_eq!(level, Level::Harsh);
    }

    #[test]
    fn no_escalation_when_rate_is_zero() {
        let t = sample_thresholds();
        assert_eq!(classify(70, 0, &t, DEFAULT_ESCALATE_MINUTES), Level::Warn);
    }

    #[test]
    fn no_escalation_when_window_disabled() {
        let t = sample_thresholds();
        assert_eq!(classify(70, 10, &t, 0), Level::Warn);
    }

    #[test]
    fn no_escalation_when_time_to_next_exceeds_window() {
        let t = sample_thresholds();
        // (70 - 68) / 1 = 2 minutes... use a slow rate so it's >= 10 min.
        assert_eq!(classify(70, 1, &t, DEFAULT_ESCALATE_MINUTES), Level::Warn);
    }

    #[test]
    fn escalation_is_at_most_one_step() {
        let t = sample_thresholds();
        // An enormous rate must not jump more than one level past base.
        let level = classify(70, 100_000, &t, DEFAULT_ESCALATE_MINUTES);
        assert_eq!(level, Level::Harsh);
    }

    #[test]
    fn kill_never_escalates_further() {
        let t = sample_thresholds();
        assert_eq!(classify(0, 1_000_000, &t, DEFAULT_ESCALATE_MINUTES), Level::Kill);
    }

    #[test]
    fn level_ordering_is_total_and_monotonic() {
        assert!(Level::Ok < Level::Notice);
        assert!(Level::Notice < Level::Warn);
        assert!(Level::Warn < Level::Harsh);
        assert!(Level::Harsh < Level::Pause);
        assert!(Level::Pause < Level::Stop);
        assert!(Level::Stop < Level::Kill);
    }

    #[test]
    fn sleep_interval_matches_table() {
        assert_eq!(sleep_interval_secs(Level::Ok), 300);
        assert_eq!(sleep_interval_secs(Level::Notice), 60);
        assert_eq!(sleep_interval_secs(Level::Warn), 30);
        assert_eq!(sleep_interval_secs(Level::Harsh), 10);
        assert_eq!(sleep_interval_secs(Level::Pause), 3);
        assert_eq!(sleep_interval_secs(Level::Stop), 1);
        assert_eq!(sleep_interval_secs(Level::Kill), 1);
    }

    #[test]
    fn label_roundtrip() {
        for level in [
            Level::Ok,
            Level::Notice,
            Level::Warn,
            Level::Harsh,
            Level::Pause,
            Level::Stop,
            Level::Kill,
        ] {
            assert_eq!(Level::from_label(level.label()), Some(level));
        }
    }
}
