//! Desktop shortcuts (`.desktop` files) inside a container.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::errors::WinboxResult;

const DESKTOP_ENTRY_SECTION: &str = "Desktop Entry";
const EXTRA_DATA_SECTION: &str = "Extra Data";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shortcut {
    pub container_id: String,
    pub file: PathBuf,
    pub name: String,
    pub exec: String,
    pub icon: Option<String>,
    /// Working directory.
    pub path: Option<String>,
    pub extra: BTreeMap<String, String>,
}

impl Shortcut {
    /// Parse a shortcut file. The name falls back to the file stem.
    pub fn parse(container_id: &str, file: &Path) -> WinboxResult<Self> {
        let content = fs::read_to_string(file)?;
        let mut entry = BTreeMap::new();
        let mut extra = BTreeMap::new();
        let mut section = String::new();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.to_string();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let target = match section.as_str() {
                DESKTOP_ENTRY_SECTION => &mut entry,
                EXTRA_DATA_SECTION => &mut extra,
                _ => continue,
            };
            target.insert(key.trim().to_string(), value.trim().to_string());
        }

        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            container_id: container_id.to_string(),
            file: file.to_path_buf(),
            name: entry
                .remove("Name")
                .filter(|n| !n.is_empty())
                .unwrap_or(stem),
            exec: entry.remove("Exec").unwrap_or_default(),
            icon: entry.remove("Icon"),
            path: entry.remove("Path"),
            extra,
        })
    }

    pub fn get_extra(&self, name: &str) -> Option<&str> {
        self.extra.get(name).map(String::as_str)
    }
}

/// Every `.desktop` file in `desktop_dir`. A missing directory yields none;
/// unreadable files are logged and skipped.
pub(crate) fn scan_desktop_dir(container_id: &str, desktop_dir: &Path) -> Vec<Shortcut> {
    let Ok(entries) = fs::read_dir(desktop_dir) else {
        return Vec::new();
    };
    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "desktop"))
        .filter_map(|p| match Shortcut::parse(container_id, &p) {
            Ok(shortcut) => Some(shortcut),
            Err(e) => {
                tracing::warn!(file = %p.display(), error = %e, "Skipping unreadable shortcut");
                None
            }
        })
        .collect()
}
