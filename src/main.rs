// DISK-WATCHDOG -- ADAPTIVE FREE-SPACE MONITOR AND GRADUATED PROCESS
// RESPONDER FOR A SINGLE MOUNT POINT.
//
// STARTUP-FATAL ERRORS ARE SURFACED AS ONE `anyhow::Error` CHAIN, PRINTED
// WITH THE `[FATAL]` BRACKET AND THE FULL `.context()` CHAIN, THEN THE
// PROCESS EXITS 1 EXPLICITLY RATHER THAN RELYING ON THE DEFAULT
// EXIT-CODE-FROM-Err BEHAVIOR OF `fn main() -> Result<()>`.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cli::GlobalOpts;
use disk_watchdog::control;
use disk_watchdog::levellog;

#[derive(Parser)]
#[command(name = "disk-watchdog", version)]
#[command(about = "Adaptive disk-space watchdog")]
struct Cli {
    #[command(subcommand)]
    command: Option<SubCmd>,

    /// Path to the config file
    #[arg(long, global = true, default_value = "/etc/disk-watchdog.conf")]
    config: PathBuf,

    /// Override the monitored mount point
    #[arg(long, global = true)]
    mount: Option<PathBuf>,

    /// Override the user filter
    #[arg(long, global = true)]
    user: Option<String>,

    /// Classify and log actions without signalling any process
    #[arg(long, global = true)]
    dry_run: bool,
}

#[derive(Subcommand)]
enum SubCmd {
    /// Start the control loop (default)
    Run,
    /// Signal the running daemon, or clear a stale pid file
    Stop,
    /// Print mount, disk size, level, thresholds, paused processes, writers
    Status,
    /// Compute level once; exit 0 if ok/notice/warn, 1 otherwise
    Check,
    /// Print top writers with formatted byte counts
    Writers,
    /// Manually resume all tracked paused processes still stopped
    Resume,
    /// Drive notification fan-out for a level without acting
    Test {
        /// ok, notice, warn, harsh, pause, stop, or kill
        level: String,
    },
    /// Stop/disable the supervisor unit; remove binary and unit file
    Uninstall,
}

fn main() {
    if let Err(e) = run() {
        levellog::fatal(&format!("{e:#}"));
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    levellog::init();

    // `clap`'s own parse-error exit code is 2; an unrecognized flag must
    // exit 1 here, so errors (including `--help`/`--version`, which clap
    // also routes through this path) are handled explicitly rather than
    // via `Cli::parse()`.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            use clap::error::ErrorKind;
            let code = match e.kind() {
                ErrorKind::DisplayHelp
                | ErrorKind::DisplayVersion
                | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
                _ => 1,
            };
            std::process::exit(code);
        }
    };

    let global = GlobalOpts {
        config: cli.config,
        mount: cli.mount,
        user: cli.user,
        dry_run: cli.dry_run,
    };

    match cli.command.unwrap_or(SubCmd::Run) {
        SubCmd::Run => {
            let config_path = global.config.clone();
            let cfg = cli::load_config(&global)?;
            control::run(cfg, config_path)
        }
        SubCmd::Stop => cli::stop::run(&global),
        SubCmd::Status => cli::status::run(&global),
        SubCmd::Check => {
            let healthy = cli::check::run(&global)?;
            if !healthy {
                std::process::exit(1);
            }
            Ok(())
        }
        SubCmd::Writers => cli::writers::run(&global),
        SubCmd::Resume => cli::resume::run(&global),
        SubCmd::Test { level } => cli::test_notify::run(&global, &level),
        SubCmd::Uninstall => cli::uninstall::run(&global),
    }
}
