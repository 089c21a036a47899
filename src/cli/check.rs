use anyhow::{Context, Result};

use disk_watchdog::level::{self, Level};
use disk_watchdog::sample;
use disk_watchdog::threshold;

use super::{load_config, GlobalOpts};

/// `check`: compute level once; exit 0 if level is ok/notice/warn, 1
/// otherwise. Rate-aware escalation is intentionally not applied here --
/// a single-shot health check has no prior sample to derive a rate from.
pub fn run(global: &GlobalOpts) -> Result<bool> {
    let cfg = load_config(global)?;
    let sample = sample::sample(&cfg.mount)
        .with_context(|| format!("failed to read free space for {}", cfg.mount.display()))?;
    let thresholds = threshold::resolve(cfg.thresholds, sample.total_gb())?;
    let lvl = level::base_level(sample.free_gb(), &thresholds);

    println!("{}", lvl.label());
    Ok(matches!(lvl, Level::Ok | Level::Notice | Level::Warn))
}
