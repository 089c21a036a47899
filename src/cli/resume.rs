use anyhow::Result;

use disk_watchdog::{action, proc};

use super::{open_state, GlobalOpts};

/// `resume`: manually resume every tracked paused PID still in state `T`,
/// bypassing the cooldown and strike-cap that gate automatic resumption --
/// an operator invoking this subcommand has already decided resumption is
/// safe.
pub fn run(global: &GlobalOpts) -> Result<()> {
    let state = open_state()?;
    let paused = state.load_paused()?;

    if paused.is_empty() {
        println!("no paused processes");
        return Ok(());
    }

    let mut remaining = Vec::new();
    for record in paused {
        let Some(snap) = proc::snapshot(record.pid) else {
            println!("pid={} ({}): gone, dropping record", record.pid, record.comm);
            continue;
        };
        if snap.comm != record.comm || !snap.stopped {
            println!(
                "pid={} ({}): no longer stopped or comm changed, dropping record",
                record.pid, record.comm
            );
            continue;
        }
        if global.dry_run {
            println!("pid={} ({}): would resume (dry-run)", record.pid, record.comm);
            remaining.push(record);
            continue;
        }
        match action::send_cont(record.pid) {
            Ok(()) => println!("pid={} ({}): resumed", record.pid, record.comm),
            Err(e) => {
                println!("pid={} ({}): resume failed: {e:#}", record.pid, record.comm);
                remaining.push(record);
            }
        }
    }

    state.save_paused(&remaining)?;
    Ok(())
}
