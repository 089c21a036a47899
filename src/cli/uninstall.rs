use std::fs;
use std::process::Command;

use anyhow::Result;

use super::GlobalOpts;

const UNIT_PATH: &str = "/etc/systemd/system/disk-watchdog.service";
const BINARY_PATH: &str = "/usr/local/bin/disk-watchdog";

/// `uninstall`: stop/disable the supervisor unit, remove the installed
/// binary and unit file. Config, logs, and state are deliberately left in
/// place -- an operator reinstalling later should not lose tuning history.
/// The supervisor integration itself is an external collaborator (only its
/// `systemctl` interface matters here, not unit-file authoring).
pub fn run(_global: &GlobalOpts) -> Result<()> {
    let _ = Command::new("systemctl").args(["stop", "disk-watchdog"]).status();
    let _ = Command::new("systemctl").args(["disable", "disk-watchdog"]).status();

    for path in [BINARY_PATH, UNIT_PATH] {
        match fs::remove_file(path) {
            Ok(()) => println!("removed {path}"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => println!("failed to remove {path}: {e}"),
        }
    }

    let _ = Command::new("systemctl").arg("daemon-reload").status();
    println!("uninstalled; config, logs, and state preserved");
    Ok(())
}
