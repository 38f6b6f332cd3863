//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tempfile::TempDir;
use winbox::WinboxOptions;
use winbox::manager::{COMMON_DLLS_MANIFEST, MAIN_TEMPLATE};

pub const FAKE_BOX64: &str = "#!/bin/sh\nexec \"$@\"\n";

/// Write a zstd tarball holding `files` (path, content, mode).
pub fn write_tzst(path: &Path, files: &[(&str, &str, u32)]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let file = File::create(path).unwrap();
    let mut encoder = zstd::stream::write::Encoder::new(file, 3).unwrap();
    {
        let mut builder = tar::Builder::new(&mut encoder);
        for (name, content, mode) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder
                .append_data(&mut header, name, content.as_bytes())
                .unwrap();
        }
        builder.finish().unwrap();
    }
    encoder.finish().unwrap().flush().unwrap();
}

/// An image root with a main-runtime template and a translator archive.
pub fn test_image() -> (TempDir, WinboxOptions) {
    let dir = TempDir::new().unwrap();
    let mut options = WinboxOptions::with_image_root(dir.path().join("imagefs"));
    options.external_storage_dir = dir.path().join("downloads");
    options.app_storage_dir = dir.path().join("storage");

    write_tzst(
        &options.assets_dir.join(MAIN_TEMPLATE),
        &[
            (".wine/system.reg", "WINE REGISTRY Version 2\n", 0o644),
            (".wine/drive_c/windows/system32/kernel32.dll", "k32", 0o644),
        ],
    );
    fs::write(
        options.assets_dir.join(COMMON_DLLS_MANIFEST),
        r#"{"system32": ["d3d11.dll"], "syswow64": ["d3d11.dll"]}"#,
    )
    .unwrap();

    let wine_lib = options.main_runtime_dir().join("lib/wine");
    fs::create_dir_all(wine_lib.join("x86_64-windows")).unwrap();
    fs::create_dir_all(wine_lib.join("i386-windows")).unwrap();
    fs::write(wine_lib.join("x86_64-windows/d3d11.dll"), "d3d11-64").unwrap();
    fs::write(wine_lib.join("i386-windows/d3d11.dll"), "d3d11-32").unwrap();

    write_tzst(
        &options.assets_dir.join("box86_64/box64-0.3.6-bionic.tzst"),
        &[("usr/bin/box64", FAKE_BOX64, 0o755)],
    );

    (dir, options)
}
