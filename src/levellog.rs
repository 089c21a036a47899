// BRACKETED LOG LEVELS
//
// THE EXTERNAL LOG FORMAT MANDATES BRACKET TAGS -- `[INFO]`, `[NOTICE]`,
// `[WARNING]`, `[CRITICAL]`, `[EMERGENCY]`, `[ACTION]`, `[RATE]`,
// `[ESCALATE]`, `[RESUME]`, `[DRY-RUN]`, `[FATAL]` -- INDEPENDENT OF THE FIVE
// UNDERLYING `log`/`env_logger` SEVERITIES. THE BRACKET
// TEXT IS WRITTEN BY THE CALL SITE, NOT BY `env_logger`'S OWN FORMATTER, SO
// `init()` INSTALLS A FORMAT FUNCTION THAT PRINTS THE RECORD'S MESSAGE
// VERBATIM AND LETS `RUST_LOG` KEEP DOING MODULE/LEVEL FILTERING UNDERNEATH.

/// Initialize `env_logger` with a bare formatter: one line per record, no
/// formatter-added prefix, since every call site already embeds its own
/// `[TAG]` via the helpers below.
pub fn init() {
    env_logger::Builder::from_default_env()
        .format(|buf, record| {
            use std::io::Write as _;
            writeln!(buf, "{}", record.args())
        })
        .init();
}

pub fn info(msg: &str) {
    log::info!("[INFO] {msg}");
}

pub fn notice(msg: &str) {
    log::info!("[NOTICE] {msg}");
}

pub fn warning(msg: &str) {
    log::warn!("[WARNING] {msg}");
}

pub fn critical(msg: &str) {
    log::warn!("[CRITICAL] {msg}");
}

pub fn emergency(msg: &str) {
    log::error!("[EMERGENCY] {msg}");
}

pub fn action(msg: &str) {
    log::info!(target: "action", "[ACTION] {msg}");
}

pub fn rate(msg: &str) {
    log::info!(target: "rate", "[RATE] {msg}");
}

pub fn escalate(msg: &str) {
    log::info!(target: "escalate", "[ESCALATE] {msg}");
}

pub fn resume(msg: &str) {
    log::info!(target: "resume", "[RESUME] {msg}");
}

pub fn dry_run(msg: &str) {
    log::info!(target: "dry-run", "[DRY-RUN] {msg}");
}

pub fn fatal(msg: &str) {
    log::error!(target: "fatal", "[FATAL] {msg}");
}

/// Emit a heartbeat line at every iteration so an operator watching logs can
/// distinguish "quiet and healthy" from "stopped logging".
/// Only called by the control loop when a supervisor watchdog-timeout
/// environment variable is present.
pub fn heartbeat(level_label: &str, free_gb: u64) {
    log::info!(target: "heartbeat", "[INFO] heartbeat level={level_label} free_gb={free_gb}");
}

#[cfg(test)]
mod tests {
    // These helpers are thin formatting wrappers over `log` macros; their
    // only testable behavior is that they compile and do not panic, which
    // the call in every other module's test suite already exercises.
    use super::*;

    #[test]
    fn helpers_do_not_panic() {
        info("x");
        notice("x");
        warning("x");
        critical("x");
        emergency("x");
        action("x");
        rate("x");
        escalate("x");
        resume("x");
        dry_run("x");
        fatal("x");
        heartbeat("ok", 10);
    }
}
