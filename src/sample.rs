// SPACE SAMPLER
//
// READS FREE/TOTAL BYTES FOR THE CONFIGURED MOUNT VIA statvfs(2), AND
// DERIVES THE BACKING BLOCK DEVICE NAME FROM THE MOUNT'S SOURCE ENTRY IN
// /proc/mounts FOR THE WRITER DETECTOR'S BYTE-THRESHOLD BOOKKEEPING.
// TRANSIENT statvfs FAILURES ARE REPORTED AS ERRORS AND HANDLED BY THE
// CONTROL LOOP'S RETRY/BACKOFF, NOT SWALLOWED HERE.

use std::ffi::CString;
use std::fs;
use std::mem::MaybeUninit;
use std::path::Path;
use std::sync::OnceLock;

use anyhow::{bail, Context, Result};
use regex::Regex;

pub struct SpaceSample {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

impl SpaceSample {
    pub fn free_gb(&self) -> u64 {
        self.free_bytes / (1u64 << 30)
    }

    pub fn total_gb(&self) -> u64 {
        self.total_bytes / (1u64 << 30)
    }
}

/// Sample free/total space on the filesystem containing `mount`.
pub fn sample(mount: &Path) -> Result<SpaceSample> {
    let c_path = CString::new(mount.as_os_str().as_encoded_bytes())
        .with_context(|| format!("mount path {} contains a NUL byte", mount.display()))?;

    // SAFETY: `buf` is fully initialized by statvfs on success before any
    // field is read; `c_path` is a valid NUL-terminated C string for the
    // duration of the call.
    let stat = unsafe {
        let mut buf = MaybeUninit::<libc::statvfs>::uninit();
        let rc = libc::statvfs(c_path.as_ptr(), buf.as_mut_ptr());
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).with_context(|| format!("statvfs failed for {}", mount.display()));
        }
        buf.assume_init()
    };

    let block_size = stat.f_frsize as u64;
    Ok(SpaceSample {
        free_bytes: stat.f_bavail as u64 * block_size,
        total_bytes: stat.f_blocks as u64 * block_size,
    })
}

/// Resolve the backing block device name (e.g. `sda1`, `nvme0n1p2`) for
/// `mount` by scanning `/proc/mounts`, then strip the partition suffix so
/// the writer detector can match the tracer's whole-disk device naming.
/// Falls back to the raw device basename if the partition suffix cannot
/// be confidently stripped.
pub fn backing_device(mount: &Path) -> Result<String> {
    let text = fs::read_to_string("/proc/mounts").context("failed to read /proc/mounts")?;
    let mount_str = mount.to_string_lossy();

    let mut best: Option<&str> = None;
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        let (Some(device), Some(mount_point)) = (fields.next(), fields.next()) else {
            continue;
        };
        if mount_point == mount_str {
            best = Some(device);
            break;
        }
    }

    let Some(device) = best else {
        bail!("no /proc/mounts entry found for {}", mount.display());
    };

    let name = device.strip_prefix("/dev/").unwrap_or(device);
    Ok(strip_partition_suffix(name))
}

/// Strip a trailing partition number: `sda1` -> `sda`, `nvme0n1p2` ->
/// `nvme0n1`, `mmcblk0p1` -> `mmcblk0`. Names with no recognized
/// partition suffix pass through unchanged.
fn strip_partition_suffix(name: &str) -> String {
    static NVME_STYLE: OnceLock<Regex> = OnceLock::new();
    static PLAIN_STYLE: OnceLock<Regex> = OnceLock::new();

    let nvme_style = NVME_STYLE.get_or_init(|| Regex::new(r"^(.*[0-9])p[0-9]+$").unwrap());
    if let Some(caps) = nvme_style.captures(name) {
        return caps[1].to_string();
    }

    let plain_style = PLAIN_STYLE.get_or_init(|| Regex::new(r"^(.*[a-zA-Z])[0-9]+$").unwrap());
    if let Some(caps) = plain_style.captures(name) {
        return caps[1].to_string();
    }

    name.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_plain_partition_suffix() {
        assert_eq!(strip_partition_suffix("sda1"), "sda");
        assert_eq!(strip_partition_suffix("sdb12"), "sdb");
    }

    #[test]
    fn strips_nvme_style_partition_suffix() {
        assert_eq!(strip_partition_suffix("nvme0n1p2"), "nvme0n1");
    }

    #[test]
    fn strips_mmcblk_style_partition_suffix() {
        assert_eq!(strip_partition_suffix("mmcblk0p1"), "mmcblk0");
    }

    #[test]
    fn whole_disk_name_passes_through() {
        assert_eq!(strip_partition_suffix("sda"), "sda");
        assert_eq!(strip_partition_suffix("nvme0n1"), "nvme0n1");
    }

    #[test]
    fn sample_root_mount_succeeds() {
        let sample = sample(Path::new("/")).unwrap();
        assert!(sample.total_bytes > 0);
        assert!(sample.free_bytes <= sample.total_bytes);
    }
}
