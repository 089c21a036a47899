// NOTIFICATION DISPATCH
//
// A SMALL SET OF BEST-EFFORT FAN-OUT CHANNELS, EACH INDEPENDENT OF THE
// OTHERS: A FAILURE IN ONE MUST NEVER BLOCK OR FAIL THE REST, AND NO
// CHANNEL FAILURE EVER PROPAGATES BACK TO THE CONTROL LOOP. DESKTOP AND
// WEBHOOK CHANNELS ARE FEATURE-GATED SINCE THEY PULL IN OPTIONAL
// DEPENDENCIES THE DAEMON DOES NOT NEED IN A HEADLESS/SERVER DEPLOYMENT.

use std::io::Write as _;
use std::process::{Command, Stdio};

use anyhow::{Context, Result};

use crate::config::NotifyConfig;
use crate::level::Level;

pub struct Notification<'a> {
    pub level: Level,
    pub free_gb: u64,
    pub message: &'a str,
}

pub trait Channel {
    fn name(&self) -> &'static str;
    fn send(&self, note: &Notification) -> Result<()>;
}

pub struct BroadcastChannel;

impl Channel for BroadcastChannel {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    fn send(&self, note: &Notification) -> Result<()> {
        let mut child = Command::new("wall")
            .stdin(Stdio::piped())
            .spawn()
            .context("failed to spawn wall")?;
        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin
            .write_all(format!("disk-watchdog [{}]: {}\n", note.level.label(), note.message).as_bytes())
            .context("failed to write to wall stdin")?;
        drop(stdin);
        child.wait().context("wall did not exit cleanly")?;
        Ok(())
    }
}

pub struct EmailChannel {
    pub sendmail_path: String,
    pub to: String,
}

impl Channel for EmailChannel {
    fn name(&self) -> &'static str {
        "email"
    }

    fn send(&self, note: &Notification) -> Result<()> {
        let body = format!(
            "To: {}\nSubject: disk-watchdog [{}] on {} free\n\n{}\n",
            self.to,
            note.level.label(),
            note.free_gb,
            note.message
        );
        let mut child = Command::new(&self.sendmail_path)
            .arg("-t")
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.sendmail_path))?;
        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin.write_all(body.as_bytes()).context("failed to write sendmail body")?;
        drop(stdin);
        child.wait().context("sendmail did not exit cleanly")?;
        Ok(())
    }
}

#[cfg(feature = "desktop")]
pub struct DesktopChannel;

#[cfg(feature = "desktop")]
impl Channel for DesktopChannel {
    fn name(&self) -> &'static str {
        "desktop"
    }

    fn send(&self, note: &Notification) -> Result<()> {
        notify_rust::Notification::new()
            .summary(&format!("disk-watchdog: {}", note.level.label()))
            .body(note.message)
            .show()
            .context("failed to show desktop notification")?;
        Ok(())
    }
}

#[cfg(feature = "webhook")]
pub struct WebhookChannel {
    pub url: String,
}

#[cfg(feature = "webhook")]
impl Channel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn send(&self, note: &Notification) -> Result<()> {
        let payload = ureq::json!({
            "level": note.level.label(),
            "free_gb": note.free_gb,
            "message": note.message,
        });
        ureq::post(&self.url)
            .send_json(payload)
            .context("webhook request failed")?;
        Ok(())
    }
}

/// Build the channel list from configuration. Channels whose feature is
/// compiled out are silently omitted even if enabled in config; `validate`
/// in `config.rs` only warns about missing destinations, so an operator
/// who enables a channel without the feature gets no notification rather
/// than a build error.
pub fn build_channels(cfg: &NotifyConfig) -> Vec<Box<dyn Channel>> {
    let mut channels: Vec<Box<dyn Channel>> = Vec::new();

    if cfg.broadcast_enabled {
        channels.push(Box::new(BroadcastChannel));
    }
    if cfg.email_enabled {
        if let Some(to) = &cfg.email_to {
            channels.push(Box::new(EmailChannel {
                sendmail_path: cfg.email_sendmail.clone(),
                to: to.clone(),
            }));
        }
    }
    #[cfg(feature = "desktop")]
    if cfg.desktop_enabled {
        channels.push(Box::new(DesktopChannel));
    }
    #[cfg(feature = "webhook")]
    if cfg.webhook_enabled {
        if let Some(url) = &cfg.webhook_url {
            channels.push(Box::new(WebhookChannel { url: url.clone() }));
        }
    }

    channels
}

/// Send `note` to every channel, logging (never propagating) each
/// failure so one broken channel never suppresses the rest.
pub fn dispatch(channels: &[Box<dyn Channel>], note: &Notification) {
    for channel in channels {
        if let Err(e) = channel.send(note) {
            log::warn!("notification channel {} failed: {e:#}", channel.name());
        }
    }
}

/// Whether a notification for `level` should fire given the last time
/// (wall seconds) this level was notified, per the configured cooldown.
pub fn should_notify(last_notified: Option<u64>, now: u64, cooldown_secs: u64) -> bool {
    match last_notified {
        None => true,
        Some(last) => now.saturating_sub(last) >= cooldown_secs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_notify_first_time_always_fires() {
        assert!(should_notify(None, 100, 300));
    }

    #[test]
    fn should_notify_respects_cooldown() {
        assert!(!should_notify(Some(100), 200, 300));
        assert!(should_notify(Some(100), 400, 300));
    }

    #[test]
    fn build_channels_omits_email_without_destination() {
        let mut cfg = NotifyConfig::default();
        cfg.email_enabled = true;
        cfg.email_to = None;
        cfg.broadcast_enabled = false;
        cfg.desktop_enabled = false;
        let channels = build_channels(&cfg);
        assert!(channels.iter().all(|c| c.name() != "email"));
    }

    #[test]
    fn build_channels_includes_broadcast_when_enabled() {
        let mut cfg = NotifyConfig::default();
        cfg.broadcast_enabled = true;
        cfg.desktop_enabled = false;
        let channels = build_channels(&cfg);
        assert!(channels.iter().any(|c| c.name() == "broadcast"));
    }
}
