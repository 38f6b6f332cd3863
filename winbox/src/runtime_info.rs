//! Descriptor of an installed Windows-compatibility runtime ("wine").

use std::path::PathBuf;

use crate::errors::{WinboxError, WinboxResult};
use crate::options::WinboxOptions;

/// Identifier of the runtime bundled with the image.
pub const MAIN_RUNTIME: &str = "main";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    /// ARM64EC: guest code runs natively with an x86 interposition layer.
    Arm64ec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeInfo {
    pub identifier: String,
    /// Installation directory (contains `bin/` and `lib/wine/`).
    pub path: PathBuf,
    pub arch: Arch,
}

impl RuntimeInfo {
    pub fn main(options: &WinboxOptions) -> Self {
        Self {
            identifier: MAIN_RUNTIME.to_string(),
            path: options.main_runtime_dir(),
            arch: Arch::X86_64,
        }
    }

    /// Resolve a runtime by its identifier.
    ///
    /// `main` (or an empty string) maps to the bundled runtime. Any other
    /// identifier must be installed under `<image_root>/opt/runtimes/<id>`.
    pub fn from_identifier(options: &WinboxOptions, identifier: &str) -> WinboxResult<Self> {
        if is_main_identifier(identifier) {
            return Ok(Self::main(options));
        }
        if identifier.contains('/') || identifier == ".." {
            return Err(WinboxError::InvalidArgument(format!(
                "invalid runtime identifier: {}",
                identifier
            )));
        }

        let path = options.custom_runtimes_dir().join(identifier);
        if !path.is_dir() {
            return Err(WinboxError::NotFound(format!(
                "runtime {} is not installed at {}",
                identifier,
                path.display()
            )));
        }

        let arch = if identifier.to_ascii_lowercase().contains("arm64ec")
            || path.join("lib/wine/aarch64-windows").is_dir()
        {
            Arch::Arm64ec
        } else {
            Arch::X86_64
        };

        Ok(Self {
            identifier: identifier.to_string(),
            path,
            arch,
        })
    }

    pub fn is_main(&self) -> bool {
        is_main_identifier(&self.identifier)
    }

    pub fn is_arm64ec(&self) -> bool {
        self.arch == Arch::Arm64ec
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.path.join("bin")
    }

    /// Directory of 64-bit PE libraries shipped with the runtime.
    pub fn lib64_dir(&self) -> PathBuf {
        match self.arch {
            Arch::Arm64ec => self.path.join("lib/wine/aarch64-windows"),
            Arch::X86_64 => self.path.join("lib/wine/x86_64-windows"),
        }
    }

    /// Directory of 32-bit PE libraries shipped with the runtime.
    pub fn lib32_dir(&self) -> PathBuf {
        self.path.join("lib/wine/i386-windows")
    }
}

pub fn is_main_identifier(identifier: &str) -> bool {
    identifier.is_empty() || identifier == MAIN_RUNTIME
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> WinboxOptions {
        WinboxOptions::with_image_root(dir.path().join("imagefs"))
    }

    #[test]
    fn test_main_identifiers() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        for id in ["", "main"] {
            let info = RuntimeInfo::from_identifier(&opts, id).unwrap();
            assert!(info.is_main());
            assert_eq!(info.path, opts.main_runtime_dir());
        }
    }

    #[test]
    fn test_custom_runtime_arch_detection() {
        let dir = TempDir::new().unwrap();
        let opts = options(&dir);
        let runtimes = opts.custom_runtimes_dir();
        std::fs::create_dir_all(runtimes.join("proton-9.0-x86_64")).unwrap();
        std::fs::create_dir_all(runtimes.join("proton-9.0-arm64ec")).unwrap();
        std::fs::create_dir_all(runtimes.join("wine-10/lib/wine/aarch64-windows")).unwrap();

        let x86 = RuntimeInfo::from_identifier(&opts, "proton-9.0-x86_64").unwrap();
        assert_eq!(x86.arch, Arch::X86_64);
        assert!(!x86.is_main());

        let by_name = RuntimeInfo::from_identifier(&opts, "proton-9.0-arm64ec").unwrap();
        assert!(by_name.is_arm64ec());

        let by_layout = RuntimeInfo::from_identifier(&opts, "wine-10").unwrap();
        assert!(by_layout.is_arm64ec());
        assert!(by_layout.lib64_dir().ends_with("aarch64-windows"));
    }

    #[test]
    fn test_missing_runtime() {
        let dir = TempDir::new().unwrap();
        let err = RuntimeInfo::from_identifier(&options(&dir), "proton-0").unwrap_err();
        assert!(matches!(err, WinboxError::NotFound(_)));
    }
}
