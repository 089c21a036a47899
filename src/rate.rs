// RATE ESTIMATOR
// PURE-RUST MODULE: HOLDS THE PREVIOUS (free_bytes, wall_time) SAMPLE AND
// YIELDS A SIGNED FILL RATE IN GB/MINUTE. NO I/O OF ITS OWN -- THE CALLER
// SUPPLIES BOTH THE CURRENT SAMPLE AND A MONOTONIC CLOCK READING.

const GIB: f64 = 1u64.wrapping_shl(30) as f64;

/// Holds the previous sample for delta computation. `wall_time` is a
/// wall-clock reading in whole seconds (the same clock used for resume
/// cooldowns and persisted state), so a restarted daemon can seed the
/// estimator from its last persisted sample instead of reporting a
/// spurious zero rate on its first iteration.
pub struct RateEstimator {
    prev_free_bytes: Option<u64>,
    prev_wall_time: u64,
    warn_floor_gb_per_min: u64,
}

impl RateEstimator {
    pub fn new(warn_floor_gb_per_min: u64) -> Self {
        Self {
            prev_free_bytes: None,
            prev_wall_time: 0,
            warn_floor_gb_per_min,
        }
    }

    /// Seed the previous sample from persisted state (e.g. after a
    /// restart) without reporting a rate for it.
    pub fn seed(&mut self, free_bytes: u64, wall_time: u64) {
        self.prev_free_bytes = Some(free_bytes);
        self.prev_wall_time = wall_time;
    }

    /// Update with a new sample and return the estimated fill rate in
    /// whole GB/minute (0 if space is not shrinking, if elapsed time is
    /// non-positive, or if the computed rate is below the configured
    /// warning floor). The sample is always stored regardless of the
    /// returned rate.
    pub fn update(&mut self, free_bytes: u64, wall_time: u64) -> i64 {
        let rate = match self.prev_free_bytes {
            None => 0,
            Some(prev_free) => {
                compute_rate(prev_free, self.prev_wall_time, free_bytes, wall_time, self.warn_floor_gb_per_min)
            }
        };
        self.prev_free_bytes = Some(free_bytes);
        self.prev_wall_time = wall_time;
        rate
    }
}

/// Pure computation extracted so it can be property-tested independently
/// of `RateEstimator`'s stateful bookkeeping.
pub fn compute_rate(
    prev_free_bytes: u64,
    prev_wall_time: u64,
    free_bytes: u64,
    wall_time: u64,
    warn_floor_gb_per_min: u64,
) -> i64 {
    if wall_time <= prev_wall_time {
        return 0;
    }
    if free_bytes >= prev_free_bytes {
        return 0;
    }
    let delta_bytes = (prev_free_bytes - free_bytes) as f64;
    let delta_seconds = (wall_time - prev_wall_time) as f64;
    let gb_per_min = (delta_bytes / delta_seconds) * 60.0 / GIB;
    let truncated = gb_per_min as i64;
    if (truncated as u64) < warn_floor_gb_per_min {
        return 0;
    }
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_sample_reports_zero() {
        let mut est = RateEstimator::new(2);
        assert_eq!(est.update(100 * (1u64 << 30), 1000), 0);
    }

    #[test]
    fn zero_elapsed_reports_zero() {
        assert_eq!(compute_rate(100, 1000, 50, 1000, 0), 0);
    }

    #[test]
    fn negative_elapsed_reports_zero() {
        assert_eq!(compute_rate(100, 1000, 50, 900, 0), 0);
    }

    #[test]
    fn space_increasing_reports_zero() {
        let prev = 10 * (1u64 << 30);
        let now = 11 * (1u64 << 30);
        assert_eq!(compute_rate(prev, 1000, now, 1060, 0), 0);
    }

    #[test]
    fn space_unchanged_reports_zero() {
        let free = 10 * (1u64 << 30);
        assert_eq!(compute_rate(free, 1000, free, 1060, 0), 0);
    }

    #[test]
    fn below_warn_floor_reports_zero_but_updates_sample() {
        // 1 GB drop over 60s = 1 GB/min, below the default 2 GB/min floor.
        let prev = 100 * (1u64 << 30);
        let now = 99 * (1u64 << 30);
        assert_eq!(compute_rate(prev, 1000, now, 1060, 2), 0);
    }

    #[test]
    fn rate_above_floor_is_reported() {
        // 10 GB drop over 60s = 10 GB/min.
        let prev = 100 * (1u64 << 30);
        let now = 90 * (1u64 << 30);
        assert_eq!(compute_rate(prev, 1000, now, 1060, 2), 10);
    }

    #[test]
    fn rate_truncates_not_rounds() {
        // 19 GB drop over 60s = 19.0 GB/min exactly at 1x; use a case that
        // truncates: 25 GB over 600s = 2.5 GB/min -> truncates to 2.
        let prev = 100 * (1u64 << 30);
        let now = 75 * (1u64 << 30);
        assert_eq!(compute_rate(prev, 0, now, 600, 0), 2);
    }

    #[test]
    fn stateful_estimator_tracks_across_calls() {
        let mut est = RateEstimator::new(2);
        let prev = 100 * (1u64 << 30);
        let now = 90 * (1u64 << 30);
        assert_eq!(est.update(prev, 1000), 0); // first sample
        assert_eq!(est.update(now, 1060), 10);
    }
}
