//! Archive-extraction collaborator.
//!
//! Container templates and translator builds ship as compressed tarballs.
//! The core only needs "unpack this archive into that directory"; the
//! [`ArchiveExtractor`] trait is that seam, and [`TarExtractor`] is the
//! built-in implementation.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tar::Archive;
use xz2::read::XzDecoder;

use crate::errors::{WinboxError, WinboxResult};

/// Compression format of a tarball.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Zstd,
    Xz,
    Gzip,
}

impl ArchiveKind {
    /// Infer the format from the file name (`.tzst`, `.txz`, `.tgz`, `.tar.gz`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        if name.ends_with(".tzst") || name.ends_with(".tar.zst") {
            Some(Self::Zstd)
        } else if name.ends_with(".txz") || name.ends_with(".tar.xz") {
            Some(Self::Xz)
        } else if name.ends_with(".tgz") || name.ends_with(".tar.gz") {
            Some(Self::Gzip)
        } else {
            None
        }
    }
}

/// Unpacks a compressed archive into a destination directory.
pub trait ArchiveExtractor: Send + Sync {
    fn extract(&self, kind: ArchiveKind, archive: &Path, dest: &Path) -> WinboxResult<()>;

    /// Extract with the format inferred from the file name.
    fn extract_file(&self, archive: &Path, dest: &Path) -> WinboxResult<()> {
        let kind = ArchiveKind::from_path(archive).ok_or_else(|| {
            WinboxError::InvalidArgument(format!(
                "unrecognized archive format: {}",
                archive.display()
            ))
        })?;
        self.extract(kind, archive, dest)
    }
}

/// Tarball extractor backed by the `tar` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TarExtractor;

impl ArchiveExtractor for TarExtractor {
    fn extract(&self, kind: ArchiveKind, archive: &Path, dest: &Path) -> WinboxResult<()> {
        let file = File::open(archive).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to open archive {}: {}",
                archive.display(),
                e
            ))
        })?;
        let reader = BufReader::new(file);

        let decoder: Box<dyn Read> = match kind {
            ArchiveKind::Zstd => Box::new(zstd::stream::read::Decoder::new(reader).map_err(
                |e| WinboxError::Storage(format!("Failed to init zstd decoder: {}", e)),
            )?),
            ArchiveKind::Xz => Box::new(XzDecoder::new(reader)),
            ArchiveKind::Gzip => Box::new(GzDecoder::new(reader)),
        };

        fs::create_dir_all(dest)?;
        let mut tar = Archive::new(decoder);
        tar.set_preserve_permissions(true);
        tar.set_overwrite(true);
        tar.unpack(dest).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to extract {} into {}: {}",
                archive.display(),
                dest.display(),
                e
            ))
        })?;

        tracing::debug!(
            archive = %archive.display(),
            dest = %dest.display(),
            "Extracted archive"
        );
        Ok(())
    }
}
