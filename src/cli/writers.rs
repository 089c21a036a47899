use anyhow::Result;

use disk_watchdog::fmt::human_bytes;

use super::{open_state, GlobalOpts};

/// `writers`: print the persisted top writers with formatted byte counts.
pub fn run(_global: &GlobalOpts) -> Result<()> {
    let state = open_state()?;
    let writers = state.load_writers()?;
    let ranked = writers.ranked();

    if ranked.is_empty() {
        println!("no known writers");
        return Ok(());
    }

    for w in &ranked {
        println!(
            "pid={:<8} comm={:<16} bytes={:>10} first_seen={} last_seen={}",
            w.pid,
            w.comm,
            human_bytes(w.bytes),
            w.first_seen,
            w.last_seen
        );
    }
    Ok(())
}
