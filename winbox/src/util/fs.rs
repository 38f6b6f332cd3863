//! Filesystem helpers used by container provisioning.

use std::fs;
use std::os::unix::fs::{PermissionsExt, symlink};
use std::path::Path;

use walkdir::WalkDir;

use crate::errors::{WinboxError, WinboxResult};

/// Permission mode applied to every entry of a duplicated container tree.
pub const CONTAINER_DIR_MODE: u32 = 0o771;

/// Remove a file, symlink or directory tree if present.
///
/// Broken symlinks are removed too: `symlink_metadata` does not follow them.
pub fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Point `link` at `target`, removing whatever was at `link` first.
pub fn replace_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    remove_if_exists(link)?;
    symlink(target, link)
}

/// Delete the contents of `dir`, keeping the directory itself.
pub fn clear_dir(dir: &Path) -> std::io::Result<()> {
    if !dir.exists() {
        return fs::create_dir_all(dir);
    }
    for entry in fs::read_dir(dir)? {
        remove_if_exists(&entry?.path())?;
    }
    Ok(())
}

pub fn chmod(path: &Path, mode: u32) -> std::io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

/// Recursively copy `src` into `dst`, applying `mode` to every copied
/// directory and regular file. Symlinks are recreated verbatim, and file
/// modification times are kept.
pub fn copy_tree(src: &Path, dst: &Path, mode: u32) -> WinboxResult<()> {
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry
            .map_err(|e| WinboxError::Storage(format!("Failed to walk directory: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| WinboxError::Internal(format!("walk escaped source root: {}", e)))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            chmod(&target, mode)?;
        } else if file_type.is_symlink() {
            let link_target = fs::read_link(entry.path())?;
            replace_symlink(&link_target, &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            chmod(&target, mode)?;
            let meta = entry
                .metadata()
                .map_err(|e| WinboxError::Storage(format!("Failed to stat entry: {}", e)))?;
            let mtime = filetime::FileTime::from_last_modification_time(&meta);
            filetime::set_file_mtime(&target, mtime)?;
        }
    }
    Ok(())
}

/// Copy every regular file directly inside `src_dir` into `dst_dir`,
/// leaving files that already exist at the destination untouched.
///
/// Returns the number of files copied. A missing source directory copies
/// nothing.
pub fn copy_missing_files(src_dir: &Path, dst_dir: &Path) -> WinboxResult<usize> {
    if !src_dir.is_dir() {
        return Ok(0);
    }
    fs::create_dir_all(dst_dir)?;
    let mut copied = 0;
    for entry in fs::read_dir(src_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let target = dst_dir.join(entry.file_name());
        if target.exists() {
            continue;
        }
        fs::copy(entry.path(), &target)?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_replace_symlink_over_existing() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("current");
        replace_symlink(Path::new("./one"), &link).unwrap();
        replace_symlink(Path::new("./two"), &link).unwrap();
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("./two"));
    }

    #[test]
    fn test_remove_broken_symlink() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("dangling");
        symlink(dir.path().join("missing"), &link).unwrap();
        remove_if_exists(&link).unwrap();
        assert!(fs::symlink_metadata(&link).is_err());
    }

    #[test]
    fn test_clear_dir_keeps_root() {
        let dir = TempDir::new().unwrap();
        let tmp = dir.path().join("tmp");
        fs::create_dir_all(tmp.join("nested")).unwrap();
        fs::write(tmp.join("file"), "x").unwrap();

        clear_dir(&tmp).unwrap();
        assert!(tmp.is_dir());
        assert_eq!(fs::read_dir(&tmp).unwrap().count(), 0);
    }

    #[test]
    fn test_copy_tree_applies_mode() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("a/b/file.txt"), "hello").unwrap();
        symlink("../drive_c", src.join("a/c:")).unwrap();

        let dst = dir.path().join("dst");
        copy_tree(&src, &dst, 0o771).unwrap();

        assert_eq!(fs::read_to_string(dst.join("a/b/file.txt")).unwrap(), "hello");
        assert_eq!(fs::read_link(dst.join("a/c:")).unwrap(), Path::new("../drive_c"));
        let mode = fs::metadata(dst.join("a/b/file.txt")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o771);
    }

    #[test]
    fn test_copy_missing_files_skips_existing() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src");
        let dst = dir.path().join("dst");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dst).unwrap();
        fs::write(src.join("a.dll"), "new").unwrap();
        fs::write(src.join("b.dll"), "new").unwrap();
        fs::write(dst.join("a.dll"), "old").unwrap();

        assert_eq!(copy_missing_files(&src, &dst).unwrap(), 1);
        assert_eq!(fs::read_to_string(dst.join("a.dll")).unwrap(), "old");
        assert_eq!(fs::read_to_string(dst.join("b.dll")).unwrap(), "new");
    }
}
