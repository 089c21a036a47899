use anyhow::{bail, Result};

use disk_watchdog::level::Level;
use disk_watchdog::notify::{self, Notification};
use disk_watchdog::sample;

use super::{load_config, GlobalOpts};

/// `test [level]`: drive notification fan-out for a chosen level without
/// acting on any process -- an operator-facing dry run of the dispatch
/// path itself (channel configuration, not the control loop).
pub fn run(global: &GlobalOpts, level_name: &str) -> Result<()> {
    let Some(level) = Level::from_label(&level_name.to_ascii_lowercase()) else {
        bail!("unknown level {level_name:?}; expected one of ok/notice/warn/harsh/pause/stop/kill");
    };

    let cfg = load_config(global)?;
    let channels = notify::build_channels(&cfg.notify);
    if channels.is_empty() {
        println!("no notification channels enabled in {}", global.config.display());
        return Ok(());
    }

    let free_gb = sample::sample(&cfg.mount).map(|s| s.free_gb()).unwrap_or(0);
    let message = format!("test notification for level {}", level.label());
    notify::dispatch(
        &channels,
        &Notification {
            level,
            free_gb,
            message: &message,
        },
    );
    println!("dispatched test notification for level {} to {} channel(s)", level.label(), channels.len());
    Ok(())
}
