// CONFIGURATION LOADER
//
// PARSES THE KEY=VALUE CONFIG FILE, APPLIES
// `DISK_WATCHDOG_<KEY>` ENVIRONMENT OVERRIDES ON TOP, THEN VALIDATES.
// PIPELINE: READ THE FILE, THEN APPLY-ENV-OVERRIDES, THEN VALIDATE --
// DELIBERATELY IN THAT ORDER SO AN OPERATOR CAN OVERRIDE ANY SINGLE KEY
// AT INVOCATION TIME WITHOUT EDITING THE FILE ON DISK.

use std::collections::HashMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use regex::Regex;

use crate::threshold::{RawThreshold, ThresholdInputs};

#[derive(Clone, Debug)]
pub struct NotifyConfig {
    pub desktop_enabled: bool,
    pub broadcast_enabled: bool,
    pub email_enabled: bool,
    pub webhook_enabled: bool,
    pub email_to: Option<String>,
    pub email_sendmail: String,
    pub webhook_url: Option<String>,
    pub cooldown_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            desktop_enabled: true,
            broadcast_enabled: false,
            email_enabled: false,
            webhook_enabled: false,
            email_to: None,
            email_sendmail: "/usr/sbin/sendmail".to_string(),
            webhook_url: None,
            cooldown_secs: 300,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub mount: PathBuf,
    pub user: Option<String>,

    pub thresholds: ThresholdInputs,

    pub auto_resume: bool,
    pub resume_threshold: RawThreshold,
    pub resume_cooldown_secs: u64,
    pub resume_max_strikes: u32,

    pub rate_warn_gb_per_min: u64,
    pub rate_escalate_minutes: u64,

    pub smart_mode: bool,

    pub tracer_command: String,
    pub tracer_byte_threshold: u64,
    pub heavy_writer_byte_threshold: u64,

    pub target_patterns: Vec<String>,
    pub protected_patterns: Vec<String>,

    pub notify: NotifyConfig,

    pub dry_run: bool,
    pub max_log_size: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount: PathBuf::from("/"),
            user: None,
            thresholds: ThresholdInputs::default(),
            auto_resume: true,
            resume_threshold: RawThreshold::Auto,
            resume_cooldown_secs: 300,
            resume_max_strikes: 3,
            rate_warn_gb_per_min: 2,
            rate_escalate_minutes: 10,
            smart_mode: true,
            tracer_command: "biosnoop".to_string(),
            tracer_byte_threshold: 1024 * 1024, // 1 MiB
            heavy_writer_byte_threshold: 50 * 1024 * 1024,
            target_patterns: Vec::new(),
            protected_patterns: Vec::new(),
            notify: NotifyConfig::default(),
            dry_run: false,
            max_log_size: 10 * 1024 * 1024,
        }
    }
}

/// Parse `key=value` lines, skipping blanks and `#`-comments, into a map.
/// Duplicate keys: last one wins.
fn parse_kv(text: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            out.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    out
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("invalid boolean value {other:?}"),
    }
}

fn parse_threshold(s: &str) -> Result<RawThreshold> {
    RawThreshold::parse(s)
}

impl Config {
    /// Load from a config file path, then apply `DISK_WATCHDOG_<KEY>`
    /// environment overrides, then validate.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        warn_if_world_writable(path);

        let mut map = parse_kv(&text);
        apply_env_overrides(&mut map);

        let mut cfg = Config::default();
        cfg.apply(&map)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, map: &HashMap<String, String>) -> Result<()> {
        macro_rules! get {
            ($key:literal) => {
                map.get($key).map(|s| s.as_str())
            };
        }

        if let Some(v) = get!("mount") {
            self.mount = PathBuf::from(v);
        }
        if let Some(v) = get!("user") {
            self.user = if v.is_empty() { None } else { Some(v.to_string()) };
        }

        if let Some(v) = get!("notice_threshold_gb") {
            self.thresholds.notice = parse_threshold(v)?;
        }
        if let Some(v) = get!("warn_threshold_gb") {
            self.thresholds.warn = parse_threshold(v)?;
        }
        if let Some(v) = get!("harsh_threshold_gb") {
            self.thresholds.harsh = parse_threshold(v)?;
        }
        if let Some(v) = get!("pause_threshold_gb") {
            self.thresholds.pause = parse_threshold(v)?;
        }
        if let Some(v) = get!("stop_threshold_gb") {
            self.thresholds.stop = parse_threshold(v)?;
        }
        if let Some(v) = get!("kill_threshold_gb") {
            self.thresholds.kill = parse_threshold(v)?;
        }

        if let Some(v) = get!("auto_resume") {
            self.auto_resume = parse_bool(v)?;
        }
        if let Some(v) = get!("resume_threshold") {
            self.resume_threshold = parse_threshold(v)?;
            self.thresholds.resume = self.resume_threshold;
        }
        if let Some(v) = get!("resume_cooldown") {
            self.resume_cooldown_secs = v.parse().context("resume_cooldown must be an integer")?;
        }
        if let Some(v) = get!("resume_max_strikes") {
            self.resume_max_strikes = v.parse().context("resume_max_strikes must be an integer")?;
        }

        if let Some(v) = get!("rate_warn_gb_per_min") {
            self.rate_warn_gb_per_min = v.parse().context("rate_warn_gb_per_min must be an integer")?;
        }
        if let Some(v) = get!("rate_escalate_minutes") {
            self.rate_escalate_minutes = v.parse().context("rate_escalate_minutes must be an integer")?;
        }
        if let Some(v) = get!("smart_mode") {
            self.smart_mode = parse_bool(v)?;
        }

        if let Some(v) = get!("tracer_command") {
            self.tracer_command = v.to_string();
        }
        if let Some(v) = get!("tracer_byte_threshold") {
            self.tracer_byte_threshold = v.parse().context("tracer_byte_threshold must be an integer")?;
        }
        if let Some(v) = get!("heavy_writer_byte_threshold") {
            self.heavy_writer_byte_threshold =
                v.parse().context("heavy_writer_byte_threshold must be an integer")?;
        }

        if let Some(v) = get!("target_patterns") {
            self.target_patterns = split_patterns(v);
        }
        if let Some(v) = get!("protected_patterns") {
            self.protected_patterns = split_patterns(v);
        }

        if let Some(v) = get!("notify_desktop") {
            self.notify.desktop_enabled = parse_bool(v)?;
        }
        if let Some(v) = get!("notify_broadcast") {
            self.notify.broadcast_enabled = parse_bool(v)?;
        }
        if let Some(v) = get!("notify_email") {
            self.notify.email_enabled = parse_bool(v)?;
        }
        if let Some(v) = get!("notify_webhook") {
            self.notify.webhook_enabled = parse_bool(v)?;
        }
        if let Some(v) = get!("notify_email_to") {
            self.notify.email_to = Some(v.to_string());
        }
        if let Some(v) = get!("notify_email_sendmail") {
            self.notify.email_sendmail = v.to_string();
        }
        if let Some(v) = get!("notify_webhook_url") {
            self.notify.webhook_url = Some(v.to_string());
        }
        if let Some(v) = get!("notify_cooldown") {
            self.notify.cooldown_secs = v.parse().context("notify_cooldown must be an integer")?;
        }

        if let Some(v) = get!("dry_run") {
            self.dry_run = parse_bool(v)?;
        }
        if let Some(v) = get!("max_log_size") {
            self.max_log_size = v.parse().context("max_log_size must be an integer")?;
        }

        Ok(())
    }

    /// Validate configuration values that are not already enforced by
    /// parsing (e.g. threshold ordering is validated after resolution
    /// against a measured disk size, not here).
    pub fn validate(&self) -> Result<()> {
        if self.resume_max_strikes == 0 {
            bail!("resume_max_strikes must be a positive integer");
        }
        if self.tracer_command.trim().is_empty() {
            bail!("tracer_command must not be empty");
        }
        for pattern in self.target_patterns.iter().chain(self.protected_patterns.iter()) {
            Regex::new(pattern).with_context(|| format!("invalid regex pattern {pattern:?}"))?;
        }
        if self.notify.email_enabled && self.notify.email_to.is_none() {
            log::warn!("notify_email is enabled but notify_email_to is unset");
        }
        if self.notify.webhook_enabled && self.notify.webhook_url.is_none() {
            log::warn!("notify_webhook is enabled but notify_webhook_url is unset");
        }
        Ok(())
    }
}

fn split_patterns(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Mirror every `DISK_WATCHDOG_<KEY>` environment variable onto the parsed
/// key/value map, overriding whatever the config file said.
fn apply_env_overrides(map: &mut HashMap<String, String>) {
    const PREFIX: &str = "DISK_WATCHDOG_";
    for (name, value) in std::env::vars() {
        if let Some(key) = name.strip_prefix(PREFIX) {
            map.insert(key.to_ascii_lowercase(), value);
        }
    }
}

fn warn_if_world_writable(path: &Path) {
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o002 != 0 {
            log::warn!(
                "config file {} is world-writable (mode {:o}); this is a security risk",
                path.display(),
                mode & 0o777
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kv_skips_blanks_and_comments() {
        let map = parse_kv("# comment\n\nmount=/data\nuser=\n");
        assert_eq!(map.get("mount").map(String::as_str), Some("/data"));
        assert_eq!(map.get("user").map(String::as_str), Some(""));
    }

    #[test]
    fn parse_kv_last_duplicate_wins() {
        let map = parse_kv("mount=/a\nmount=/b\n");
        assert_eq!(map.get("mount").map(String::as_str), Some("/b"));
    }

    #[test]
    fn parse_bool_accepts_common_spellings() {
        assert!(parse_bool("true").unwrap());
        assert!(parse_bool("YES").unwrap());
        assert!(!parse_bool("off").unwrap());
        assert!(parse_bool("maybe").is_err());
    }

    #[test]
    fn split_patterns_trims_and_drops_empty() {
        assert_eq!(split_patterns(" a, b ,,c"), vec!["a", "b", "c"]);
    }

    #[test]
    fn apply_overrides_threshold_fields() {
        let mut cfg = Config::default();
        let mut map = HashMap::new();
        map.insert("pause_threshold_gb".to_string(), "15".to_string());
        cfg.apply(&map).unwrap();
        assert_eq!(cfg.thresholds.pause, RawThreshold::Fixed(15));
    }

    #[test]
    fn validate_rejects_invalid_regex() {
        let mut cfg = Config::default();
        cfg.protected_patterns.push("(unclosed".to_string());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_max_strikes() {
        let mut cfg = Config::default();
        cfg.resume_max_strikes = 0;
        assert!(cfg.validate().is_err());
    }
}
