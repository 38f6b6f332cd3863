//! Base filesystem template installation for new containers.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{ArchiveExtractor, ArchiveKind};
use crate::errors::{WinboxError, WinboxResult};
use crate::options::WinboxOptions;
use crate::runtime_info::RuntimeInfo;
use crate::util::fs::copy_missing_files;

/// Template bundled for the main runtime.
pub const MAIN_TEMPLATE: &str = "container_pattern_gamenative.tzst";
/// Manifest of shared libraries managed per destination dir.
pub const COMMON_DLLS_MANIFEST: &str = "common_dlls.json";

const SYSTEM32: &str = "system32";
const SYSWOW64: &str = "syswow64";

/// `{"system32": [...], "syswow64": [...]}`
#[derive(Debug, Clone, Default)]
pub struct CommonDllManifest {
    entries: HashMap<String, Vec<String>>,
}

impl CommonDllManifest {
    pub fn load(path: &Path) -> WinboxResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            WinboxError::Storage(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let entries = serde_json::from_str(&content).map_err(|e| {
            WinboxError::Config(format!("Invalid manifest {}: {}", path.display(), e))
        })?;
        Ok(Self { entries })
    }

    pub fn files(&self, dest_dir: &str) -> WinboxResult<&[String]> {
        self.entries
            .get(dest_dir)
            .map(Vec::as_slice)
            .ok_or_else(|| {
                WinboxError::Config(format!("manifest has no entry for {}", dest_dir))
            })
    }
}

/// Provisions a container directory from template archives.
pub struct TemplateInstaller {
    assets_dir: PathBuf,
    main_runtime: RuntimeInfo,
    extractor: Arc<dyn ArchiveExtractor>,
}

impl TemplateInstaller {
    pub fn new(options: &WinboxOptions, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        Self {
            assets_dir: options.assets_dir.clone(),
            main_runtime: RuntimeInfo::main(options),
            extractor,
        }
    }

    /// Install the template matching `runtime` into `container_dir`.
    ///
    /// Any failure leaves the directory half-populated; the caller removes it.
    pub fn install(&self, runtime: &RuntimeInfo, container_dir: &Path) -> WinboxResult<()> {
        if runtime.is_main() {
            self.install_main(container_dir)
        } else {
            self.install_custom(runtime, container_dir)
        }
    }

    fn manifest(&self) -> WinboxResult<CommonDllManifest> {
        CommonDllManifest::load(&self.assets_dir.join(COMMON_DLLS_MANIFEST))
    }

    fn install_main(&self, container_dir: &Path) -> WinboxResult<()> {
        let template = self.assets_dir.join(MAIN_TEMPLATE);
        tracing::debug!(template = %template.display(), "Extracting main template");
        self.extractor
            .extract(ArchiveKind::Zstd, &template, container_dir)?;

        let manifest = self.manifest()?;
        for (src, dest) in [("x86_64-windows", SYSTEM32), ("i386-windows", SYSWOW64)] {
            let src_dir = self.main_runtime.path.join("lib/wine").join(src);
            copy_manifest_files(&manifest, &src_dir, dest, container_dir)?;
        }
        Ok(())
    }

    fn install_custom(&self, runtime: &RuntimeInfo, container_dir: &Path) -> WinboxResult<()> {
        // The custom runtime's own copies of these libraries win.
        let manifest = self.manifest()?;
        for dest in [SYSTEM32, SYSWOW64] {
            for name in manifest.files(dest)? {
                let target = windows_dir(container_dir, dest).join(name);
                if target.exists() {
                    fs::remove_file(&target)?;
                }
            }
        }

        let template = self
            .assets_dir
            .join(format!("{}_container_pattern.tzst", runtime.identifier));
        let extracted = template.exists()
            && match self
                .extractor
                .extract(ArchiveKind::Zstd, &template, container_dir)
            {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        template = %template.display(),
                        error = %e,
                        "Runtime template failed, trying prefix pack"
                    );
                    false
                }
            };
        if !extracted {
            self.extract_prefix_pack(runtime, container_dir)?;
        }

        let system32 = windows_dir(container_dir, SYSTEM32);
        if runtime.is_arm64ec() {
            // The aarch64 tree has no usable iexplore; take the i386 one.
            let iexplore = system32.join("iexplore.exe");
            let fallback = runtime.lib32_dir().join("iexplore.exe");
            if !iexplore.exists() && fallback.is_file() {
                fs::create_dir_all(&system32)?;
                fs::copy(&fallback, &iexplore)?;
            }
        }
        copy_missing_files(&runtime.lib64_dir(), &system32)?;
        copy_missing_files(&runtime.lib32_dir(), &windows_dir(container_dir, SYSWOW64))?;

        tracing::debug!(runtime = %runtime.identifier, "Installed custom runtime template");
        Ok(())
    }

    /// `prefixPack.tzst`, then `prefixPack.txz`, from the runtime install.
    fn extract_prefix_pack(&self, runtime: &RuntimeInfo, container_dir: &Path) -> WinboxResult<()> {
        for (name, kind) in [
            ("prefixPack.tzst", ArchiveKind::Zstd),
            ("prefixPack.txz", ArchiveKind::Xz),
        ] {
            let pack = runtime.path.join(name);
            if pack.exists() {
                return self.extractor.extract(kind, &pack, container_dir);
            }
        }
        Err(WinboxError::Storage(format!(
            "no template or prefix pack for runtime {}",
            runtime.identifier
        )))
    }
}

fn windows_dir(container_dir: &Path, name: &str) -> PathBuf {
    container_dir.join(".wine/drive_c/windows").join(name)
}

/// Copy the manifest-listed files for `dest` from `src_dir`, skipping any
/// the container already has at the same age or newer.
fn copy_manifest_files(
    manifest: &CommonDllManifest,
    src_dir: &Path,
    dest: &str,
    container_dir: &Path,
) -> WinboxResult<()> {
    let dest_dir = windows_dir(container_dir, dest);
    fs::create_dir_all(&dest_dir)?;
    for name in manifest.files(dest)? {
        let src = src_dir.join(name);
        let Ok(src_meta) = fs::metadata(&src) else {
            tracing::trace!(file = %src.display(), "Common library missing from runtime");
            continue;
        };
        let target = dest_dir.join(name);
        if let Ok(target_meta) = fs::metadata(&target)
            && let (Ok(src_time), Ok(target_time)) = (src_meta.modified(), target_meta.modified())
            && target_time >= src_time
        {
            continue;
        }
        fs::copy(&src, &target)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::TarExtractor;
    use crate::archive::test_support::write_archive;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        options: WinboxOptions,
        installer: TemplateInstaller,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let options = WinboxOptions::with_image_root(dir.path().join("imagefs"));
        fs::create_dir_all(&options.assets_dir).unwrap();
        fs::write(
            options.assets_dir.join(COMMON_DLLS_MANIFEST),
            r#"{"system32": ["d3d11.dll"], "syswow64": ["d3d9.dll"]}"#,
        )
        .unwrap();
        let installer = TemplateInstaller::new(&options, Arc::new(TarExtractor));
        Fixture {
            _dir: dir,
            options,
            installer,
        }
    }

    #[test]
    fn test_main_template_copies_common_dlls() {
        let f = fixture();
        write_archive(
            &f.options.assets_dir.join(MAIN_TEMPLATE),
            ArchiveKind::Zstd,
            &[(".wine/system.reg", "WINE REGISTRY")],
        );
        let lib = f.options.main_runtime_dir().join("lib/wine");
        fs::create_dir_all(lib.join("x86_64-windows")).unwrap();
        fs::create_dir_all(lib.join("i386-windows")).unwrap();
        fs::write(lib.join("x86_64-windows/d3d11.dll"), "64").unwrap();
        fs::write(lib.join("i386-windows/d3d9.dll"), "32").unwrap();

        let container_dir = f.options.container_dir("c1");
        let main = RuntimeInfo::main(&f.options);
        f.installer.install(&main, &container_dir).unwrap();

        assert!(container_dir.join(".wine/system.reg").exists());
        assert_eq!(
            fs::read_to_string(windows_dir(&container_dir, SYSTEM32).join("d3d11.dll")).unwrap(),
            "64"
        );
        assert_eq!(
            fs::read_to_string(windows_dir(&container_dir, SYSWOW64).join("d3d9.dll")).unwrap(),
            "32"
        );
    }

    #[test]
    fn test_main_template_missing_fails() {
        let f = fixture();
        let main = RuntimeInfo::main(&f.options);
        assert!(
            f.installer
                .install(&main, &f.options.container_dir("c1"))
                .is_err()
        );
    }

    #[test]
    fn test_custom_runtime_prefix_pack_fallback() {
        let f = fixture();
        let runtime_dir = f.options.custom_runtimes_dir().join("proton-9.0-arm64ec");
        let lib = runtime_dir.join("lib/wine");
        fs::create_dir_all(lib.join("aarch64-windows")).unwrap();
        fs::create_dir_all(lib.join("i386-windows")).unwrap();
        fs::write(lib.join("aarch64-windows/kernel32.dll"), "arm").unwrap();
        fs::write(lib.join("aarch64-windows/iexplore.exe"), "arm").unwrap();
        fs::write(lib.join("i386-windows/iexplore.exe"), "x86").unwrap();
        write_archive(
            &runtime_dir.join("prefixPack.txz"),
            ArchiveKind::Xz,
            &[(".wine/drive_c/windows/system32/d3d11.dll", "stale")],
        );

        let runtime = RuntimeInfo::from_identifier(&f.options, "proton-9.0-arm64ec").unwrap();
        let container_dir = f.options.container_dir("c2");
        f.installer.install(&runtime, &container_dir).unwrap();

        let system32 = windows_dir(&container_dir, SYSTEM32);
        assert_eq!(fs::read_to_string(system32.join("kernel32.dll")).unwrap(), "arm");
        assert_eq!(fs::read_to_string(system32.join("iexplore.exe")).unwrap(), "x86");
        assert_eq!(fs::read_to_string(system32.join("d3d11.dll")).unwrap(), "stale");
    }

    #[test]
    fn test_custom_runtime_without_any_template_fails() {
        let f = fixture();
        fs::create_dir_all(f.options.custom_runtimes_dir().join("wine-10")).unwrap();
        let runtime = RuntimeInfo::from_identifier(&f.options, "wine-10").unwrap();
        let err = f
            .installer
            .install(&runtime, &f.options.container_dir("c3"))
            .unwrap_err();
        assert!(matches!(err, WinboxError::Storage(_)));
    }
}
