//! Container data model.
//!
//! A [`Container`] is the in-memory copy of one execution environment's
//! persisted configuration plus its root directory. The document under
//! `<root>/.container` is the source of truth; nothing here auto-saves.

mod controller;
mod drives;
mod extra;
mod store;
mod wincomponents;

pub use controller::{ControllerButton, ControllerMapping};
pub use drives::{DriveIter, drives_iter, next_available_drive_letter};
pub use extra::{ExtraData, ExtraValue};
pub use store::{CONFIG_FILE_NAME, migrate_document, parse_document, read_document};
pub use wincomponents::{KeyValueSet, merge_onto_defaults};

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::errors::WinboxResult;
use crate::options::WinboxOptions;
use crate::runtime_info::{MAIN_RUNTIME, is_main_identifier};

// ============================================================================
// Defaults
// ============================================================================

pub const DEFAULT_ENV_VARS: &str = "WRAPPER_MAX_IMAGE_COUNT=0 ZINK_DESCRIPTORS=lazy ZINK_DEBUG=compact MESA_SHADER_CACHE_DISABLE=false MESA_SHADER_CACHE_MAX_SIZE=512MB mesa_glthread=true WINEESYNC=1 MESA_VK_WSI_PRESENT_MODE=mailbox TU_DEBUG=noconform DXVK_FRAME_RATE=60 PULSE_LATENCY_MSEC=144";
pub const DEFAULT_SCREEN_SIZE: &str = "1280x720";
pub const DEFAULT_GRAPHICS_DRIVER: &str = "turnip";
pub const DEFAULT_GRAPHICS_DRIVER_VERSION: &str = "25.1.0";
pub const DEFAULT_AUDIO_DRIVER: &str = "pulseaudio";
pub const DEFAULT_DXWRAPPER: &str = "dxvk";
pub const DEFAULT_DXWRAPPER_CONFIG: &str = "version=2.4.1,framerate=0,maxDeviceMemory=0,async=0,asyncCache=0,vkd3dVersion=2.14.1,vkd3dLevel=12_1,ddrawrapper=none,csmt=3,gpuName=NVIDIA GeForce GTX 480,videoMemorySize=2048,strict_shader_math=1,OffscreenRenderingMode=fbo,renderer=gl";
pub const DEFAULT_GRAPHICS_DRIVER_CONFIG: &str = "vulkanVersion=1.3,version=System,blacklistedExtensions=,maxDeviceMemory=0,presentMode=mailbox,syncFrame=0,disablePresentWait=0,resourceType=auto,bcnEmulation=auto,bcnEmulationType=software,bcnEmulationCache=0";
pub const DEFAULT_WINCOMPONENTS: &str = "direct3d=1,directsound=1,directmusic=0,directshow=0,directplay=0,vcrun2010=1,wmdecoder=1,opengl=0";
pub const DEFAULT_DESKTOP_THEME: &str = "LIGHT,IMAGE,#0277bd";
pub const DEFAULT_LC_ALL: &str = "en_US.utf8";
pub const DEFAULT_LANGUAGE: &str = "english";
pub const DEFAULT_BOX86_VERSION: &str = "0.3.2";
pub const DEFAULT_BOX64_VERSION: &str = "0.3.6";
pub const DEFAULT_FEXCORE_VERSION: &str = "2508";
pub const DEFAULT_BOX64_PRESET: &str = "PERFORMANCE";
pub const DEFAULT_FEXCORE_PRESET: &str = "INTERMEDIATE";

/// Preferred input API: both DirectInput and XInput.
pub const DEFAULT_INPUT_TYPE: i32 = 3;

// ============================================================================
// Closed value sets
// ============================================================================

/// How many background Windows services start with the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartupSelection {
    Normal,
    Essential,
    #[default]
    Aggressive,
}

impl StartupSelection {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Essential),
            2 => Some(Self::Aggressive),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::Normal => 0,
            Self::Essential => 1,
            Self::Aggressive => 2,
        }
    }
}

/// Steam client flavor, selects the translator rc profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SteamType {
    #[default]
    Normal,
    Light,
    Ultralight,
}

impl SteamType {
    /// Case-insensitive parse; unknown values normalize to `Normal`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "light" => Self::Light,
            "ultralight" => Self::Ultralight,
            _ => Self::Normal,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Light => "light",
            Self::Ultralight => "ultralight",
        }
    }
}

/// C library flavor of the runtime image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainerVariant {
    Glibc,
    #[default]
    Bionic,
}

impl ContainerVariant {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("glibc") {
            Self::Glibc
        } else {
            Self::Bionic
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Glibc => "glibc",
            Self::Bionic => "bionic",
        }
    }
}

/// Binary-translation backend used for 64-bit guest code.
///
/// Native ARM64EC execution is not a variant here: it follows from the
/// container's runtime (see [`crate::RuntimeInfo::is_arm64ec`]), and this
/// setting then only picks the interposition library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Emulator {
    Box64,
    #[default]
    Fexcore,
}

impl Emulator {
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("fexcore") {
            Self::Fexcore
        } else {
            Self::Box64
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Box64 => "Box64",
            Self::Fexcore => "FEXCore",
        }
    }
}

// ============================================================================
// ContainerConfig
// ============================================================================

/// Persisted per-container settings.
///
/// Fields are public; the few with normalization rules (CPU lists,
/// language) also have setters on [`Container`].
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerConfig {
    // === Identity & display ===
    pub name: String,
    pub screen_size: String,
    pub desktop_theme: String,
    pub lc_all: String,
    pub language: String,

    // === Runtime ===
    /// Runtime identifier, `main` for the bundled one.
    pub wine_version: String,
    pub env_vars: String,
    pub wincomponents: String,
    pub drives: String,
    pub wow64_mode: bool,
    pub startup_selection: StartupSelection,
    pub container_variant: ContainerVariant,
    pub cpu_list: Option<String>,
    pub cpu_list_wow64: Option<String>,

    // === Graphics & audio ===
    pub graphics_driver: String,
    pub graphics_driver_version: String,
    pub graphics_driver_config: String,
    pub dxwrapper: String,
    pub dxwrapper_config: String,
    pub audio_driver: String,
    pub midi_sound_font: String,
    pub show_fps: bool,
    pub use_dri3: bool,
    pub gstreamer_workaround: bool,

    // === Translation backend ===
    pub emulator: Emulator,
    pub box86_version: String,
    pub box64_version: String,
    pub box86_preset: String,
    pub box64_preset: String,
    pub fexcore_version: String,
    pub fexcore_preset: String,
    pub rcfile_id: i32,

    // === Input ===
    pub input_type: i32,
    /// 1 = standard, 2 = XInput mapper.
    pub dinput_mapper_type: u8,
    pub primary_controller: i32,
    pub controller_mapping: ControllerMapping,
    pub sdl_controller_api: bool,
    pub disable_mouse_input: bool,
    pub touchscreen_mode: bool,

    // === Launch target ===
    pub exec_args: String,
    pub executable_path: String,
    pub install_path: String,
    pub launch_real_steam: bool,
    pub allow_steam_updates: bool,
    pub steam_type: SteamType,
    pub needs_unpacking: bool,
    pub unpack_files: bool,
    pub force_dlc: bool,
    pub use_legacy_drm: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            screen_size: DEFAULT_SCREEN_SIZE.into(),
            desktop_theme: DEFAULT_DESKTOP_THEME.into(),
            lc_all: DEFAULT_LC_ALL.into(),
            language: DEFAULT_LANGUAGE.into(),
            wine_version: MAIN_RUNTIME.into(),
            env_vars: DEFAULT_ENV_VARS.into(),
            wincomponents: DEFAULT_WINCOMPONENTS.into(),
            drives: String::new(),
            wow64_mode: true,
            startup_selection: StartupSelection::default(),
            container_variant: ContainerVariant::default(),
            cpu_list: None,
            cpu_list_wow64: None,
            graphics_driver: DEFAULT_GRAPHICS_DRIVER.into(),
            graphics_driver_version: DEFAULT_GRAPHICS_DRIVER_VERSION.into(),
            graphics_driver_config: DEFAULT_GRAPHICS_DRIVER_CONFIG.into(),
            dxwrapper: DEFAULT_DXWRAPPER.into(),
            dxwrapper_config: DEFAULT_DXWRAPPER_CONFIG.into(),
            audio_driver: DEFAULT_AUDIO_DRIVER.into(),
            midi_sound_font: String::new(),
            show_fps: false,
            use_dri3: true,
            gstreamer_workaround: false,
            emulator: Emulator::default(),
            box86_version: DEFAULT_BOX86_VERSION.into(),
            box64_version: DEFAULT_BOX64_VERSION.into(),
            box86_preset: DEFAULT_BOX64_PRESET.into(),
            box64_preset: DEFAULT_BOX64_PRESET.into(),
            fexcore_version: DEFAULT_FEXCORE_VERSION.into(),
            fexcore_preset: DEFAULT_FEXCORE_PRESET.into(),
            rcfile_id: 0,
            input_type: DEFAULT_INPUT_TYPE,
            dinput_mapper_type: 1,
            primary_controller: 1,
            controller_mapping: ControllerMapping::default(),
            sdl_controller_api: false,
            disable_mouse_input: false,
            touchscreen_mode: false,
            exec_args: String::new(),
            executable_path: String::new(),
            install_path: String::new(),
            launch_real_steam: false,
            allow_steam_updates: false,
            steam_type: SteamType::default(),
            needs_unpacking: true,
            unpack_files: false,
            force_dlc: false,
            use_legacy_drm: false,
        }
    }
}

// ============================================================================
// Container
// ============================================================================

/// One execution environment: identity, root directory and settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    id: String,
    root_dir: PathBuf,
    user: String,
    pub config: ContainerConfig,
    extra: ExtraData,
    session: Option<ExtraData>,
}

impl Container {
    /// A container with default settings rooted at `options.container_dir(id)`.
    pub fn new(id: impl Into<String>, options: &WinboxOptions) -> Self {
        let id = id.into();
        let config = ContainerConfig {
            name: format!("Container-{}", id),
            drives: default_drives(options),
            ..Default::default()
        };
        Self {
            root_dir: options.container_dir(&id),
            user: options.user.clone(),
            id,
            config,
            extra: ExtraData::default(),
            session: None,
        }
    }

    /// Build a container from a persisted document (see [`Container::load_document`]).
    pub fn from_document(
        id: impl Into<String>,
        options: &WinboxOptions,
        document: Map<String, Value>,
    ) -> WinboxResult<Self> {
        let mut container = Self::new(id, options);
        container.load_document(document)?;
        Ok(container)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn set_root_dir(&mut self, root_dir: impl Into<PathBuf>) {
        self.root_dir = root_dir.into();
    }

    // ------------------------------------------------------------------------
    // Derived paths
    // ------------------------------------------------------------------------

    pub fn config_file(&self) -> PathBuf {
        self.root_dir.join(CONFIG_FILE_NAME)
    }

    pub fn desktop_dir(&self) -> PathBuf {
        self.root_dir
            .join(".wine/drive_c/users")
            .join(&self.user)
            .join("Desktop")
    }

    pub fn start_menu_dir(&self) -> PathBuf {
        self.root_dir
            .join(".wine/drive_c/ProgramData/Microsoft/Windows/Start Menu")
    }

    pub fn icons_dir(&self, size: u32) -> PathBuf {
        self.root_dir
            .join(format!(".local/share/icons/hicolor/{size}x{size}/apps"))
    }

    pub fn dosdevices_dir(&self) -> PathBuf {
        self.root_dir.join(".wine/dosdevices")
    }

    /// `C:\windows\<name>` inside the prefix (system32, syswow64).
    pub fn windows_dir(&self, name: &str) -> PathBuf {
        self.root_dir.join(".wine/drive_c/windows").join(name)
    }

    // ------------------------------------------------------------------------
    // Normalized settings
    // ------------------------------------------------------------------------

    pub fn is_main_runtime(&self) -> bool {
        is_main_identifier(&self.config.wine_version)
    }

    /// CPU affinity for 64-bit processes, falling back to every logical CPU.
    pub fn cpu_list(&self) -> String {
        self.config
            .cpu_list
            .clone()
            .unwrap_or_else(fallback_cpu_list)
    }

    /// CPU affinity for WoW64 processes, falling back to the upper half.
    pub fn cpu_list_wow64(&self) -> String {
        self.config
            .cpu_list_wow64
            .clone()
            .unwrap_or_else(fallback_cpu_list_wow64)
    }

    /// An empty list clears the setting.
    pub fn set_cpu_list(&mut self, cpu_list: &str) {
        self.config.cpu_list = non_empty(cpu_list);
    }

    pub fn set_cpu_list_wow64(&mut self, cpu_list: &str) {
        self.config.cpu_list_wow64 = non_empty(cpu_list);
    }

    /// An empty language resets to the default.
    pub fn set_language(&mut self, language: &str) {
        self.config.language = if language.is_empty() {
            DEFAULT_LANGUAGE.to_string()
        } else {
            language.to_string()
        };
    }

    pub fn drives(&self) -> DriveIter<'_> {
        drives_iter(&self.config.drives)
    }

    // ------------------------------------------------------------------------
    // Extra and session bags
    // ------------------------------------------------------------------------

    pub fn extra(&self) -> &ExtraData {
        &self.extra
    }

    /// String form of an extra value, or `fallback` when absent.
    pub fn get_extra(&self, name: &str, fallback: &str) -> String {
        self.extra
            .get_string(name)
            .unwrap_or_else(|| fallback.to_string())
    }

    /// Set or (with `None`) remove an extra value.
    pub fn put_extra(&mut self, name: &str, value: Option<ExtraValue>) {
        match value {
            Some(value) => self.extra.insert(name, value),
            None => self.extra.remove(name),
        }
    }

    pub fn get_session_metadata(&self, name: &str, fallback: &str) -> String {
        self.session
            .as_ref()
            .and_then(|s| s.get_string(name))
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn put_session_metadata(&mut self, name: &str, value: Option<ExtraValue>) {
        let session = self.session.get_or_insert_with(ExtraData::default);
        match value {
            Some(value) => session.insert(name, value),
            None => session.remove(name),
        }
    }

    pub fn clear_session_metadata(&mut self) {
        self.session = None;
    }
}

/// Default drive table: `D:` external storage, `E:` app storage.
pub fn default_drives(options: &WinboxOptions) -> String {
    format!(
        "D:{}E:{}",
        options.external_storage_dir.display(),
        options.app_storage_dir.display()
    )
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn logical_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// `0,1,...,n-1` over all logical CPUs.
pub fn fallback_cpu_list() -> String {
    cpu_range(0, logical_cpus())
}

/// `n/2,...,n-1`: the upper half of the logical CPUs.
pub fn fallback_cpu_list_wow64() -> String {
    let n = logical_cpus();
    cpu_range(n / 2, n)
}

fn cpu_range(start: usize, end: usize) -> String {
    (start..end)
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> WinboxOptions {
        let mut options = WinboxOptions::with_image_root("/data/imagefs");
        options.external_storage_dir = "/sdcard/Download".into();
        options.app_storage_dir = "/data/storage".into();
        options
    }

    #[test]
    fn test_new_container_defaults() {
        let container = Container::new("c1", &options());
        assert_eq!(container.id(), "c1");
        assert_eq!(container.config.name, "Container-c1");
        assert_eq!(container.config.drives, "D:/sdcard/DownloadE:/data/storage");
        assert_eq!(container.config.wincomponents, DEFAULT_WINCOMPONENTS);
        assert_eq!(
            container.config.startup_selection,
            StartupSelection::Aggressive
        );
        assert!(container.is_main_runtime());
        assert_eq!(
            container.root_dir(),
            Path::new("/data/imagefs/home/xuser-c1")
        );
    }

    #[test]
    fn test_derived_paths() {
        let container = Container::new("c1", &options());
        assert!(
            container
                .desktop_dir()
                .ends_with(".wine/drive_c/users/xuser/Desktop")
        );
        assert!(
            container
                .icons_dir(64)
                .ends_with(".local/share/icons/hicolor/64x64/apps")
        );
        assert!(container.config_file().ends_with(".container"));
    }

    #[test]
    fn test_cpu_list_fallbacks() {
        let mut container = Container::new("c1", &options());
        let n = logical_cpus();
        assert_eq!(container.cpu_list().split(',').count(), n);
        assert!(container.cpu_list().starts_with('0'));
        assert_eq!(
            container.cpu_list_wow64().split(',').count(),
            n - n / 2
        );

        container.set_cpu_list("0,1");
        assert_eq!(container.cpu_list(), "0,1");
        container.set_cpu_list("");
        assert_eq!(container.config.cpu_list, None);
    }

    #[test]
    fn test_language_normalization() {
        let mut container = Container::new("c1", &options());
        container.set_language("german");
        assert_eq!(container.config.language, "german");
        container.set_language("");
        assert_eq!(container.config.language, DEFAULT_LANGUAGE);
    }

    #[test]
    fn test_steam_type_parse() {
        assert_eq!(SteamType::parse("LIGHT"), SteamType::Light);
        assert_eq!(SteamType::parse("ultralight"), SteamType::Ultralight);
        assert_eq!(SteamType::parse("bogus"), SteamType::Normal);
    }

    #[test]
    fn test_session_metadata_clear() {
        let mut container = Container::new("c1", &options());
        container.put_session_metadata("appId", Some(ExtraValue::Int(440)));
        assert_eq!(container.get_session_metadata("appId", ""), "440");
        container.clear_session_metadata();
        assert_eq!(container.get_session_metadata("appId", "none"), "none");
    }
}
