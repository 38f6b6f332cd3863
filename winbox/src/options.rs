//! Runtime-wide configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{WinboxError, WinboxResult};

/// Environment variable overriding the default image root.
pub const IMAGE_ROOT_ENV: &str = "WINBOX_IMAGE_ROOT";

/// Default guest user name. Also the prefix of every container directory.
pub const DEFAULT_USER: &str = "xuser";

/// Options shared by the container registry and the execution environment.
///
/// Every path must be absolute. Paths left empty in a JSON options file are
/// derived from `image_root`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct WinboxOptions {
    /// Root of the shared runtime filesystem (usr/, opt/, etc/, home/).
    pub image_root: PathBuf,
    /// Directory holding one `<prefix>-<id>` subdirectory per container.
    pub home_dir: PathBuf,
    /// Bundled archives: container templates, translator builds, `common_dlls.json`.
    pub assets_dir: PathBuf,
    /// Scratch directory cleared on every environment start.
    pub tmp_dir: PathBuf,
    /// Guest user name.
    pub user: String,
    /// Prefix of container directory names.
    pub container_prefix: String,
    /// Optional directory for rolling log files.
    pub log_dir: Option<PathBuf>,
    /// Host path exposed as the reserved `D:` drive.
    pub external_storage_dir: PathBuf,
    /// Host path exposed as the reserved `E:` drive.
    pub app_storage_dir: PathBuf,
}

impl Default for WinboxOptions {
    fn default() -> Self {
        let image_root = std::env::var_os(IMAGE_ROOT_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::data_dir()
                    .unwrap_or_else(std::env::temp_dir)
                    .join("winbox")
                    .join("imagefs")
            });
        Self::with_image_root(image_root)
    }
}

impl WinboxOptions {
    /// Build options where every derived path lives under `image_root`.
    pub fn with_image_root(image_root: impl Into<PathBuf>) -> Self {
        let image_root = image_root.into();
        let data_root = image_root
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| image_root.clone());
        Self {
            home_dir: image_root.join("home"),
            assets_dir: data_root.join("assets"),
            tmp_dir: data_root.join("tmp"),
            user: DEFAULT_USER.to_string(),
            container_prefix: DEFAULT_USER.to_string(),
            log_dir: None,
            external_storage_dir: dirs::download_dir()
                .unwrap_or_else(|| data_root.join("downloads")),
            app_storage_dir: data_root.join("storage"),
            image_root,
        }
    }

    /// Load options from a JSON file, then validate them.
    pub fn from_file(path: &Path) -> WinboxResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WinboxError::Config(format!(
                "Failed to read options file {}: {}",
                path.display(),
                e
            ))
        })?;
        let mut options: WinboxOptions = serde_json::from_str(&content)?;
        options.fill_derived();
        options.validate()?;
        Ok(options)
    }

    /// Reject relative paths before any filesystem work happens.
    pub fn validate(&self) -> WinboxResult<()> {
        let paths = [
            ("image_root", &self.image_root),
            ("home_dir", &self.home_dir),
            ("assets_dir", &self.assets_dir),
            ("tmp_dir", &self.tmp_dir),
        ];
        for (name, path) in paths {
            if !path.is_absolute() {
                return Err(WinboxError::InvalidArgument(format!(
                    "{} must be absolute path, got: {}",
                    name,
                    path.display()
                )));
            }
        }
        if self.container_prefix.is_empty() {
            return Err(WinboxError::InvalidArgument(
                "container_prefix must not be empty".into(),
            ));
        }
        Ok(())
    }

    fn fill_derived(&mut self) {
        let derived = Self::with_image_root(self.image_root.clone());
        if self.home_dir.as_os_str().is_empty() {
            self.home_dir = derived.home_dir;
        }
        if self.assets_dir.as_os_str().is_empty() {
            self.assets_dir = derived.assets_dir;
        }
        if self.tmp_dir.as_os_str().is_empty() {
            self.tmp_dir = derived.tmp_dir;
        }
        if self.external_storage_dir.as_os_str().is_empty() {
            self.external_storage_dir = derived.external_storage_dir;
        }
        if self.app_storage_dir.as_os_str().is_empty() {
            self.app_storage_dir = derived.app_storage_dir;
        }
    }

    /// Directory of the container with the given id.
    pub fn container_dir(&self, id: &str) -> PathBuf {
        self.home_dir.join(format!("{}-{}", self.container_prefix, id))
    }

    /// The "current container" symlink.
    pub fn current_container_link(&self) -> PathBuf {
        self.home_dir.join(&self.container_prefix)
    }

    /// Guest home path as seen by the runtime (`HOME`).
    pub fn guest_home(&self) -> PathBuf {
        self.home_dir.join(&self.user)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.image_root.join("usr/bin")
    }

    pub fn lib_dir(&self) -> PathBuf {
        self.image_root.join("usr/lib")
    }

    /// Install location of the main runtime.
    pub fn main_runtime_dir(&self) -> PathBuf {
        self.image_root.join("opt/wine")
    }

    /// Install root of custom runtimes (`<root>/<identifier>`).
    pub fn custom_runtimes_dir(&self) -> PathBuf {
        self.image_root.join("opt/runtimes")
    }
}

/// Launcher-level user preferences.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "snake_case")]
pub struct LaunchPreferences {
    pub enable_translator_logs: bool,
    pub open_with_host_browser: bool,
    pub share_host_clipboard: bool,
    pub enable_peb_logs: bool,
}

impl Default for LaunchPreferences {
    fn default() -> Self {
        Self {
            enable_translator_logs: true,
            open_with_host_browser: false,
            share_host_clipboard: false,
            enable_peb_logs: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_derived_paths() {
        let options = WinboxOptions::with_image_root("/data/imagefs");
        assert_eq!(options.home_dir, PathBuf::from("/data/imagefs/home"));
        assert_eq!(options.assets_dir, PathBuf::from("/data/assets"));
        assert_eq!(
            options.container_dir("c1"),
            PathBuf::from("/data/imagefs/home/xuser-c1")
        );
        assert_eq!(
            options.current_container_link(),
            PathBuf::from("/data/imagefs/home/xuser")
        );
    }

    #[test]
    fn test_relative_root_rejected() {
        let options = WinboxOptions::with_image_root("relative/imagefs");
        let err = options.validate().unwrap_err();
        assert!(err.to_string().contains("must be absolute"));
    }

    #[test]
    fn test_from_file_fills_missing_paths() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("options.json");
        let root = dir.path().join("imagefs");
        std::fs::write(
            &path,
            format!(r#"{{"image_root": "{}", "user": "guest"}}"#, root.display()),
        )
        .unwrap();

        let options = WinboxOptions::from_file(&path).unwrap();
        assert_eq!(options.user, "guest");
        assert_eq!(options.home_dir, root.join("home"));
    }
}
