//! Drive table parsing and dosdevices materialization.
//!
//! The table is a concatenation of `<letter>:<host path>` entries with no
//! separator, e.g. `D:/sdcard/DownloadE:/data/storage`. Each `:` marks a new
//! entry whose letter is the character just before it.

use std::fs;
use std::path::{Path, PathBuf};

use super::Container;
use crate::errors::{WinboxError, WinboxResult};
use crate::options::WinboxOptions;
use crate::util::fs::{CONTAINER_DIR_MODE, chmod, replace_symlink};

/// Drive letter backed by external (shared) storage.
pub const EXTERNAL_STORAGE_LETTER: char = 'D';
/// Drive letter backed by app-private storage.
pub const APP_STORAGE_LETTER: char = 'E';

/// Iterator over `(letter, path)` pairs of a drive table.
pub struct DriveIter<'a> {
    drives: &'a str,
    colon: Option<usize>,
}

pub fn drives_iter(drives: &str) -> DriveIter<'_> {
    // A leading ':' has no letter before it; start at the first usable one.
    let colon = drives
        .char_indices()
        .find(|(i, c)| *c == ':' && *i > 0)
        .map(|(i, _)| i);
    DriveIter { drives, colon }
}

impl<'a> Iterator for DriveIter<'a> {
    type Item = (char, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        let colon = self.colon?;
        let letter = self.drives[..colon].chars().next_back()?;
        let rest = &self.drives[colon + 1..];

        let next_colon = rest.find(':').map(|i| colon + 1 + i);
        let path_end = match next_colon {
            // The char before the next ':' is that entry's letter.
            Some(next) => self.drives[..next]
                .char_indices()
                .next_back()
                .map(|(i, _)| i)
                .unwrap_or(next)
                .max(colon + 1),
            None => self.drives.len(),
        };
        self.colon = next_colon;
        Some((letter, &self.drives[colon + 1..path_end]))
    }
}

/// First letter in `A..=Z` not used by `drives`.
pub fn next_available_drive_letter(drives: &str) -> WinboxResult<char> {
    let used: Vec<char> = drives_iter(drives)
        .map(|(letter, _)| letter.to_ascii_uppercase())
        .collect();
    ('A'..='Z')
        .find(|letter| !used.contains(letter))
        .ok_or_else(|| WinboxError::InvalidState("All drive letters taken".into()))
}

fn has_letter(drives: &str, letter: char) -> bool {
    drives_iter(drives).any(|(l, _)| l.eq_ignore_ascii_case(&letter))
}

/// Prepend whichever reserved letters are missing. Returns the repaired
/// table, or `None` when both are already present.
pub fn repair_reserved_drives(drives: &str, options: &WinboxOptions) -> Option<String> {
    let mut missing = String::new();
    if !has_letter(drives, EXTERNAL_STORAGE_LETTER) {
        missing.push_str(&format!(
            "{}:{}",
            EXTERNAL_STORAGE_LETTER,
            options.external_storage_dir.display()
        ));
    }
    if !has_letter(drives, APP_STORAGE_LETTER) {
        missing.push_str(&format!(
            "{}:{}",
            APP_STORAGE_LETTER,
            options.app_storage_dir.display()
        ));
    }
    (!missing.is_empty()).then(|| missing + drives)
}

fn is_drive_entry(name: &str) -> bool {
    let bytes = name.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_lowercase() && bytes[1] == b':'
}

impl Container {
    /// Rebuild `.wine/dosdevices` from the drive table.
    ///
    /// Every existing `[a-z]:` entry is removed first, so stale letters never
    /// survive. `c:` and `z:` are fixed. A table missing a reserved letter is
    /// repaired and saved before linking.
    pub fn create_dosdevices_symlinks(&mut self, options: &WinboxOptions) -> WinboxResult<()> {
        let dosdevices = self.dosdevices_dir();
        fs::create_dir_all(&dosdevices)?;

        for entry in fs::read_dir(&dosdevices)? {
            let entry = entry?;
            if entry.file_name().to_str().is_some_and(is_drive_entry) {
                crate::util::fs::remove_if_exists(&entry.path())?;
            }
        }

        replace_symlink(Path::new("../drive_c"), &dosdevices.join("c:"))?;
        replace_symlink(&self.root_dir().join("../.."), &dosdevices.join("z:"))?;

        if let Some(repaired) = repair_reserved_drives(&self.config.drives, options) {
            tracing::info!(
                container_id = %self.id(),
                drives = %repaired,
                "Added missing reserved drives"
            );
            self.config.drives = repaired;
            self.save()?;
        }

        let links: Vec<(char, PathBuf)> = self
            .drives()
            .map(|(letter, path)| (letter, PathBuf::from(path)))
            .collect();
        for (letter, target) in links {
            if target == options.app_storage_dir && !target.is_dir() {
                fs::create_dir_all(&target)?;
                chmod(&target, CONTAINER_DIR_MODE)?;
            }
            let link = dosdevices.join(format!("{}:", letter.to_ascii_lowercase()));
            replace_symlink(&target, &link)?;
        }

        tracing::debug!(container_id = %self.id(), "Created dosdevices symlinks");
        Ok(())
    }
}
