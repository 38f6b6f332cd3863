//! Registry-editing collaborator and the startup-selection policy.
//!
//! Registry hive files are edited by an external implementation. The core
//! only decides which values to write.

use std::path::Path;

use crate::container::{Container, ExtraValue, StartupSelection};
use crate::errors::WinboxResult;

/// Scoped editor for one registry hive file.
///
/// An editor is opened on a path and flushes its changes when dropped.
pub trait RegistryEditor {
    fn set_string_value(&mut self, key: &str, name: Option<&str>, value: &str) -> WinboxResult<()>;

    fn set_dword_value(&mut self, key: &str, name: &str, value: u32) -> WinboxResult<()>;

    fn set_hex_value(&mut self, key: &str, name: &str, value: &[u8]) -> WinboxResult<()>;

    fn remove_key(&mut self, key: &str) -> WinboxResult<()>;

    fn remove_value(&mut self, key: &str, name: &str) -> WinboxResult<()>;

    /// Whether writes to a missing key create it.
    fn set_create_key_if_missing(&mut self, create: bool);
}

/// Opens a [`RegistryEditor`] on a hive file.
pub trait RegistryOpener: Send + Sync {
    fn open(&self, hive: &Path) -> WinboxResult<Box<dyn RegistryEditor>>;
}

/// Extra-bag key holding the selection last written to the registry.
const APPLIED_SELECTION_KEY: &str = "startupSelection";

const SERVICES_KEY: &str = "System\\CurrentControlSet\\Services";

/// Start type written for a disabled service.
const SERVICE_DISABLED: u32 = 4;

/// Background services and their stock start type (2 automatic, 3 manual).
const BACKGROUND_SERVICES: &[(&str, u32)] = &[
    ("BITS", 3),
    ("Eventlog", 2),
    ("HTTP", 3),
    ("LanmanServer", 3),
    ("NDIS", 2),
    ("PlugPlay", 2),
    ("RpcSs", 3),
    ("scardsvr", 3),
    ("Schedule", 3),
    ("Spooler", 3),
    ("StiSvc", 3),
    ("TermService", 3),
    ("winebus", 3),
    ("winehid", 3),
    ("Winmgmt", 3),
    ("wuauserv", 3),
];

/// Write the service start types implied by `selection`.
///
/// Existing service keys only; nothing is created.
pub fn apply_startup_selection(
    editor: &mut dyn RegistryEditor,
    selection: StartupSelection,
) -> WinboxResult<()> {
    editor.set_create_key_if_missing(false);
    for (name, stock) in BACKGROUND_SERVICES {
        let value = match selection {
            StartupSelection::Normal => *stock,
            StartupSelection::Essential | StartupSelection::Aggressive => SERVICE_DISABLED,
        };
        editor.set_dword_value(&format!("{}\\{}", SERVICES_KEY, name), "Start", value)?;
    }
    tracing::debug!(?selection, "Applied startup selection");
    Ok(())
}

/// Apply the container's startup selection to its `system.reg` when it
/// differs from the one applied last.
///
/// Records the applied level in the extra bag; the caller saves the
/// container. Returns whether anything was written.
pub fn sync_startup_selection(
    container: &mut Container,
    opener: &dyn RegistryOpener,
) -> WinboxResult<bool> {
    let selection = container.config.startup_selection;
    let level = selection.as_u8().to_string();
    if container.get_extra(APPLIED_SELECTION_KEY, "") == level {
        return Ok(false);
    }

    let hive = container.root_dir().join(".wine/system.reg");
    {
        let mut editor = opener.open(&hive)?;
        apply_startup_selection(editor.as_mut(), selection)?;
    }
    container.put_extra(APPLIED_SELECTION_KEY, Some(ExtraValue::from(level)));
    Ok(true)
}
