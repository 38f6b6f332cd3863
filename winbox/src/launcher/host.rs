//! Host facts the launcher reads at launch time.

use std::fs;
use std::path::{Path, PathBuf};

/// Used when the host has no usable resolver configuration.
pub const FALLBACK_DNS: &str = "8.8.4.4";

/// GPU family whose driver cannot map 32-bit address space for the translator.
pub const MALI_RENDERER: &str = "Mali";

/// Source of host properties that shape the guest environment.
pub trait HostProbe: Send + Sync {
    /// Renderer string of the host GPU, e.g. `Adreno (TM) 740` or `Mali-G710`.
    fn gpu_renderer(&self) -> String;

    /// First DNS server of the active network.
    fn primary_dns(&self) -> Option<String>;
}

/// Probe reading `/etc/resolv.conf` and the Mali device node.
#[derive(Debug, Clone)]
pub struct SystemHostProbe {
    resolv_conf: PathBuf,
    mali_device: PathBuf,
}

impl Default for SystemHostProbe {
    fn default() -> Self {
        Self {
            resolv_conf: PathBuf::from("/etc/resolv.conf"),
            mali_device: PathBuf::from("/dev/mali0"),
        }
    }
}

impl SystemHostProbe {
    pub fn with_paths(resolv_conf: impl Into<PathBuf>, mali_device: impl Into<PathBuf>) -> Self {
        Self {
            resolv_conf: resolv_conf.into(),
            mali_device: mali_device.into(),
        }
    }
}

impl HostProbe for SystemHostProbe {
    fn gpu_renderer(&self) -> String {
        if self.mali_device.exists() {
            MALI_RENDERER.to_string()
        } else {
            String::new()
        }
    }

    fn primary_dns(&self) -> Option<String> {
        first_nameserver(&self.resolv_conf)
    }
}

fn first_nameserver(path: &Path) -> Option<String> {
    let content = fs::read_to_string(path).ok()?;
    content.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        match (fields.next(), fields.next()) {
            (Some("nameserver"), Some(addr)) => Some(addr.to_string()),
            _ => None,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_first_nameserver() {
        let dir = TempDir::new().unwrap();
        let resolv = dir.path().join("resolv.conf");
        fs::write(
            &resolv,
            "# generated\nsearch lan\nnameserver 192.168.1.1\nnameserver 1.1.1.1\n",
        )
        .unwrap();
        let probe = SystemHostProbe::with_paths(&resolv, dir.path().join("mali0"));
        assert_eq!(probe.primary_dns().as_deref(), Some("192.168.1.1"));
        assert_eq!(probe.gpu_renderer(), "");
    }

    #[test]
    fn test_missing_resolv_conf() {
        let dir = TempDir::new().unwrap();
        let mali = dir.path().join("mali0");
        fs::write(&mali, "").unwrap();
        let probe = SystemHostProbe::with_paths(dir.path().join("none"), &mali);
        assert_eq!(probe.primary_dns(), None);
        assert!(probe.gpu_renderer().contains(MALI_RENDERER));
    }
}
