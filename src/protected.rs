// PROTECTED PROCESS SET
//
// A COMPILED REGULAR EXPRESSION COVERING INIT, SUPERVISORS, DISPLAY
// SERVERS, SESSION AND POLICY DAEMONS, PACKAGE MANAGERS, AUDIO/BLUETOOTH/
// PRINT STACKS, AND THE DAEMON ITSELF. COMPILED ONCE INTO A SINGLE
// MATCHER ANCHORED TO THE FULL COMM; THE SOURCE PATTERNS STAY A PLAIN
// LIST SO AN OPERATOR CAN EXTEND THEM ADDITIVELY VIA CONFIG RATHER THAN
// EDITING ONE OPAQUE ALTERNATION.

use anyhow::{Context, Result};
use regex::Regex;

/// Default protected-process comm patterns. Anchored to the full name at
/// match time, not here, so they remain plain fragments an operator can
/// extend additively via config.
pub const DEFAULT_PATTERNS: &[&str] = &[
    "init",
    "systemd.*",
    "upstart",
    "launchd",
    "Xorg",
    "Xwayland",
    "wayland.*",
    "gnome-shell",
    "plasmashell",
    "kwin.*",
    "sddm.*",
    "gdm.*",
    "lightdm.*",
    "logind",
    "systemd-logind",
    "polkit.*",
    "dbus-daemon",
    "dbus-broker.*",
    "NetworkManager",
    "packagekitd",
    "dpkg",
    "apt.*",
    "pacman",
    "rpm",
    "pulseaudio",
    "pipewire.*",
    "wireplumber",
    "bluetoothd",
    "cupsd",
    "disk-watchdog",
];

pub struct ProtectedSet {
    matcher: Regex,
}

impl ProtectedSet {
    /// Build the matcher from the default patterns plus any additional
    /// patterns supplied by configuration. Each pattern is wrapped so the
    /// match is anchored to the *entire* comm string.
    pub fn new(extra_patterns: &[String]) -> Result<Self> {
        let mut anchored: Vec<String> = Vec::with_capacity(DEFAULT_PATTERNS.len() + extra_patterns.len());
        for p in DEFAULT_PATTERNS {
            anchored.push(format!("^(?:{p})$"));
        }
        for p in extra_patterns {
            anchored.push(format!("^(?:{p})$"));
        }
        let combined = anchored.join("|");
        let matcher = Regex::new(&combined).context("failed to compile protected-process pattern set")?;
        Ok(Self { matcher })
    }

    pub fn is_protected(&self, comm: &str) -> bool {
        self.matcher.is_match(comm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_set_matches_systemd_family() {
        let set = ProtectedSet::new(&[]).unwrap();
        assert!(set.is_protected("systemd"));
        assert!(set.is_protected("systemd-logind"));
        assert!(set.is_protected("Xorg"));
        assert!(set.is_protected("disk-watchdog"));
    }

    #[test]
    fn default_set_does_not_match_ordinary_processes() {
        let set = ProtectedSet::new(&[]).unwrap();
        assert!(!set.is_protected("rsync"));
        assert!(!set.is_protected("bash"));
        assert!(!set.is_protected("cc1"));
    }

    #[test]
    fn match_is_anchored_to_full_comm() {
        let set = ProtectedSet::new(&[]).unwrap();
        // A comm that merely *contains* "init" must not match.
        assert!(!set.is_protected("myinitscript"));
    }

    #[test]
    fn additive_patterns_extend_the_default_set() {
        let set = ProtectedSet::new(&["myguard".to_string()]).unwrap();
        assert!(set.is_protected("myguard"));
        assert!(set.is_protected("systemd")); // defaults still present
    }

    #[test]
    fn protected_entries_are_filtered_before_ranking() {
        // [systemd, bash, rsync] -> [rsync, bash]: systemd is dropped as
        // protected, the rest stay byte-descending.
        let set = ProtectedSet::new(&[]).unwrap();
        let candidates = [("systemd", 100u64), ("bash", 50), ("rsync", 200)];
        let mut filtered: Vec<_> = candidates
            .into_iter()
            .filter(|(comm, _)| !set.is_protected(comm))
            .collect();
        filtered.sort_by(|a, b| b.1.cmp(&a.1));
        let names: Vec<&str> = filtered.iter().map(|(c, _)| *c).collect();
        assert_eq!(names, vec!["rsync", "bash"]);
    }
}
