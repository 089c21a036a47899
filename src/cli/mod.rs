// CLI SUBCOMMANDS
//
// EACH SUBCOMMAND IS A THIN, INDEPENDENT ENTRY POINT: PARSE GLOBAL
// OVERRIDES ONTO A LOADED CONFIG, OPEN WHATEVER IT NEEDS (STATE DIR,
// THRESHOLDS, PIDFILE), PRINT, AND RETURN AN EXIT-FRIENDLY `Result`.
// `main.rs` MAPS ANY `Err` TO THE `[FATAL]` BRACKET AND EXIT CODE 1.

pub mod check;
pub mod resume;
pub mod status;
pub mod stop;
pub mod test_notify;
pub mod uninstall;
pub mod writers;

use std::path::PathBuf;

use anyhow::Result;

use disk_watchdog::config::Config;
use disk_watchdog::control::{DEFAULT_PID_FILE, DEFAULT_STATE_DIR};
use disk_watchdog::state::StateDir;

/// Global flags every subcommand accepts, per the CLI surface.
#[derive(Clone, Debug)]
pub struct GlobalOpts {
    pub config: PathBuf,
    pub mount: Option<PathBuf>,
    pub user: Option<String>,
    pub dry_run: bool,
}

/// Load the config file and apply `--mount`/`--user`/`--dry-run` on top,
/// the same precedence order a config-reload applies env overrides: file,
/// then command-line overrides, last.
pub fn load_config(global: &GlobalOpts) -> Result<Config> {
    let mut cfg = Config::load(&global.config)?;
    if let Some(mount) = &global.mount {
        cfg.mount = mount.clone();
    }
    if let Some(user) = &global.user {
        cfg.user = Some(user.clone());
    }
    if global.dry_run {
        cfg.dry_run = true;
    }
    Ok(cfg)
}

pub fn open_state() -> Result<StateDir> {
    StateDir::open(DEFAULT_STATE_DIR)
}

pub fn pid_file_path() -> PathBuf {
    PathBuf::from(DEFAULT_PID_FILE)
}
