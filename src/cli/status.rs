use anyhow::{Context, Result};

use disk_watchdog::fmt::human_bytes;
use disk_watchdog::level::{self, Level};
use disk_watchdog::sample;
use disk_watchdog::threshold;

use super::{load_config, open_state, GlobalOpts};

/// `status`: mount, disk size, free GB + %, current level, saved level,
/// next interval, resolved thresholds, paused processes, top 5 writers.
/// Always exits 0 -- this is a report, not a health check (`check` owns
/// the exit-code contract).
pub fn run(global: &GlobalOpts) -> Result<()> {
    let cfg = load_config(global)?;
    let state = open_state()?;

    let sample = sample::sample(&cfg.mount)
        .with_context(|| format!("failed to read free space for {}", cfg.mount.display()))?;
    let thresholds = threshold::resolve(cfg.thresholds, sample.total_gb())?;
    let free_gb = sample.free_gb();
    let free_pct = if sample.total_bytes == 0 {
        0.0
    } else {
        sample.free_bytes as f64 / sample.total_bytes as f64 * 100.0
    };

    let live_level = level::base_level(free_gb, &thresholds);
    let saved_level = state.load_level()?.unwrap_or(Level::Ok);

    println!("mount:            {}", cfg.mount.display());
    println!("disk size:        {} GB", sample.total_gb());
    println!("free:             {free_gb} GB ({free_pct:.1}%)");
    println!("level (current):  {}", live_level.label());
    println!("level (saved):    {}", saved_level.label());
    println!("next interval:    {}s", level::sleep_interval_secs(live_level));
    println!(
        "thresholds:       notice={} warn={} harsh={} pause={} stop={} kill={} resume={}",
        thresholds.notice, thresholds.warn, thresholds.harsh, thresholds.pause, thresholds.stop,
        thresholds.kill, thresholds.resume
    );

    let paused = state.load_paused()?;
    if paused.is_empty() {
        println!("paused processes: none");
    } else {
        println!("paused processes:");
        for p in &paused {
            println!("  pid={} comm={} strikes={}", p.pid, p.comm, p.strikes);
        }
    }

    let writers = state.load_writers()?;
    let top: Vec<_> = writers.ranked().into_iter().take(5).collect();
    if top.is_empty() {
        println!("top writers:      none");
    } else {
        println!("top writers:");
        for w in &top {
            println!("  pid={} comm={} bytes={}", w.pid, w.comm, human_bytes(w.bytes));
        }
    }

    Ok(())
}
