//! Persisted container document: field table, migration, load and save.
//!
//! Every persisted key is one row of [`FIELDS`]. Loading walks the table and
//! decodes the keys that are present, so a missing key keeps its default
//! and an unknown key is never looked at.

use std::fs;
use std::path::Path;

use serde_json::{Map, Value};

use super::{
    Container, ContainerVariant, ControllerMapping, DEFAULT_DXWRAPPER, DEFAULT_WINCOMPONENTS,
    Emulator, ExtraData, StartupSelection, SteamType, merge_onto_defaults,
};
use crate::errors::{WinboxError, WinboxResult};
use crate::runtime_info::{MAIN_RUNTIME, is_main_identifier};

pub const CONFIG_FILE_NAME: &str = ".container";

type Decode = fn(&mut Container, &Value) -> Result<(), String>;
type Encode = fn(&Container) -> Option<Value>;

struct Field {
    key: &'static str,
    decode: Decode,
    encode: Encode,
}

// ============================================================================
// Value coercion
// ============================================================================

fn to_string(value: &Value) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("expected string, got {}", other)),
    }
}

fn to_bool(value: &Value) -> Result<bool, String> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        Value::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        other => Err(format!("expected bool, got {}", other)),
    }
}

fn to_int(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .ok_or_else(|| format!("expected int, got {}", n)),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("expected int, got {:?}", s)),
        other => Err(format!("expected int, got {}", other)),
    }
}

fn to_object(value: &Value) -> Result<&Map<String, Value>, String> {
    value
        .as_object()
        .ok_or_else(|| format!("expected object, got {}", value))
}

macro_rules! string_field {
    ($key:literal, $field:ident) => {
        Field {
            key: $key,
            decode: |c, v| {
                c.config.$field = to_string(v)?;
                Ok(())
            },
            encode: |c| Some(Value::from(c.config.$field.as_str())),
        }
    };
}

macro_rules! bool_field {
    ($key:literal, $field:ident) => {
        Field {
            key: $key,
            decode: |c, v| {
                c.config.$field = to_bool(v)?;
                Ok(())
            },
            encode: |c| Some(Value::from(c.config.$field)),
        }
    };
}

macro_rules! int_field {
    ($key:literal, $field:ident, $ty:ty) => {
        Field {
            key: $key,
            decode: |c, v| {
                c.config.$field = to_int(v)? as $ty;
                Ok(())
            },
            encode: |c| Some(Value::from(c.config.$field)),
        }
    };
}

// ============================================================================
// Field table
// ============================================================================

static FIELDS: &[Field] = &[
    Field {
        key: "id",
        // The id comes from the directory name and never changes.
        decode: |_, _| Ok(()),
        encode: |c| Some(Value::from(c.id())),
    },
    string_field!("name", name),
    string_field!("screenSize", screen_size),
    string_field!("envVars", env_vars),
    Field {
        key: "cpuList",
        decode: |c, v| {
            c.set_cpu_list(&to_string(v)?);
            Ok(())
        },
        encode: |c| c.config.cpu_list.as_deref().map(Value::from),
    },
    Field {
        key: "cpuListWoW64",
        decode: |c, v| {
            c.set_cpu_list_wow64(&to_string(v)?);
            Ok(())
        },
        encode: |c| c.config.cpu_list_wow64.as_deref().map(Value::from),
    },
    string_field!("graphicsDriver", graphics_driver),
    string_field!("graphicsDriverVersion", graphics_driver_version),
    Field {
        key: "graphicsDriverConfig",
        decode: |c, v| {
            c.config.graphics_driver_config = to_string(v)?;
            Ok(())
        },
        encode: |c| {
            let config = &c.config.graphics_driver_config;
            (!config.is_empty()).then(|| Value::from(config.as_str()))
        },
    },
    string_field!("dxwrapper", dxwrapper),
    Field {
        key: "dxwrapperConfig",
        decode: |c, v| {
            c.config.dxwrapper_config = to_string(v)?;
            Ok(())
        },
        encode: |c| {
            let config = &c.config.dxwrapper_config;
            (!config.is_empty()).then(|| Value::from(config.as_str()))
        },
    },
    string_field!("audioDriver", audio_driver),
    string_field!("wincomponents", wincomponents),
    string_field!("drives", drives),
    bool_field!("showFPS", show_fps),
    bool_field!("launchRealSteam", launch_real_steam),
    bool_field!("allowSteamUpdates", allow_steam_updates),
    int_field!("inputType", input_type, i32),
    int_field!("dinputMapperType", dinput_mapper_type, u8),
    bool_field!("wow64Mode", wow64_mode),
    Field {
        key: "startupSelection",
        decode: |c, v| {
            let raw = to_int(v)?;
            c.config.startup_selection = u8::try_from(raw)
                .ok()
                .and_then(StartupSelection::from_u8)
                .ok_or_else(|| format!("unknown startup selection {}", raw))?;
            Ok(())
        },
        encode: |c| Some(Value::from(c.config.startup_selection.as_u8())),
    },
    string_field!("box86Version", box86_version),
    string_field!("box64Version", box64_version),
    string_field!("box86Preset", box86_preset),
    string_field!("box64Preset", box64_preset),
    string_field!("fexcorePreset", fexcore_preset),
    string_field!("desktopTheme", desktop_theme),
    Field {
        key: "extraData",
        decode: |c, v| {
            c.extra = ExtraData::from_json(to_object(v)?);
            Ok(())
        },
        encode: |c| (!c.extra.is_empty()).then(|| Value::Object(c.extra.to_json())),
    },
    Field {
        key: "sessionMetadata",
        // Malformed session data is dropped, never fatal.
        decode: |c, v| {
            c.session = v.as_object().map(ExtraData::from_json);
            Ok(())
        },
        encode: |c| c.session.as_ref().map(|s| Value::Object(s.to_json())),
    },
    int_field!("rcfileId", rcfile_id, i32),
    string_field!("midiSoundFont", midi_sound_font),
    string_field!("lc_all", lc_all),
    int_field!("primaryController", primary_controller, i32),
    Field {
        key: "controllerMapping",
        decode: |c, v| {
            c.config.controller_mapping = ControllerMapping::decode(&to_string(v)?);
            Ok(())
        },
        encode: |c| Some(Value::from(c.config.controller_mapping.encode())),
    },
    string_field!("execArgs", exec_args),
    string_field!("executablePath", executable_path),
    bool_field!("needsUnpacking", needs_unpacking),
    bool_field!("sdlControllerAPI", sdl_controller_api),
    bool_field!("disableMouseInput", disable_mouse_input),
    bool_field!("touchscreenMode", touchscreen_mode),
    bool_field!("useDRI3", use_dri3),
    string_field!("installPath", install_path),
    Field {
        key: "steamType",
        decode: |c, v| {
            c.config.steam_type = SteamType::parse(&to_string(v)?);
            Ok(())
        },
        encode: |c| Some(Value::from(c.config.steam_type.as_str())),
    },
    Field {
        key: "language",
        decode: |c, v| {
            c.set_language(&to_string(v)?);
            Ok(())
        },
        encode: |c| Some(Value::from(c.config.language.as_str())),
    },
    Field {
        key: "containerVariant",
        decode: |c, v| {
            c.config.container_variant = ContainerVariant::parse(&to_string(v)?);
            Ok(())
        },
        encode: |c| Some(Value::from(c.config.container_variant.as_str())),
    },
    Field {
        key: "emulator",
        decode: |c, v| {
            c.config.emulator = Emulator::parse(&to_string(v)?);
            Ok(())
        },
        encode: |c| Some(Value::from(c.config.emulator.as_str())),
    },
    string_field!("fexcoreVersion", fexcore_version),
    bool_field!("gstreamerWorkaround", gstreamer_workaround),
    bool_field!("forceDlc", force_dlc),
    bool_field!("useLegacyDRM", use_legacy_drm),
    bool_field!("unpackFiles", unpack_files),
    Field {
        key: "wineVersion",
        decode: |c, v| {
            c.config.wine_version = to_string(v)?;
            Ok(())
        },
        // The main runtime is the implicit default and is never written.
        encode: |c| {
            (!is_main_identifier(&c.config.wine_version))
                .then(|| Value::from(c.config.wine_version.as_str()))
        },
    },
];

// ============================================================================
// Migration
// ============================================================================

/// Bring a stored document up to the current schema.
///
/// Runs before any field is decoded. A malformed field is logged and
/// dropped so its default applies; migration never fails the load.
pub fn migrate_document(document: &mut Map<String, Value>) {
    if let Some(legacy) = document.remove("dxcomponents") {
        document.insert("wincomponents".into(), legacy);
    }

    if let Some(Value::String(dxwrapper)) = document.get("dxwrapper")
        && dxwrapper == "original-wined3d"
    {
        document.insert("dxwrapper".into(), Value::from(DEFAULT_DXWRAPPER));
    }

    if let Some(Value::String(driver)) = document.get("graphicsDriver") {
        let replacement = match driver.as_str() {
            "turnip-zink" => Some("turnip"),
            "llvmpipe" => Some("virgl"),
            _ => None,
        };
        if let Some(replacement) = replacement {
            document.insert("graphicsDriver".into(), Value::from(replacement));
        }
    }

    let stored = match document.get("wincomponents") {
        None => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            tracing::warn!(value = %other, "Ignoring malformed wincomponents");
            String::new()
        }
    };
    document.insert(
        "wincomponents".into(),
        Value::from(merge_onto_defaults(DEFAULT_WINCOMPONENTS, &stored)),
    );
}

// ============================================================================
// Load / save
// ============================================================================

/// Parse a document, stripping raw NUL characters first.
///
/// Escaped `\u0000` inside strings is legal JSON and stays: the controller
/// mapping uses it for unmapped slots.
pub fn parse_document(content: &str) -> WinboxResult<Map<String, Value>> {
    let cleaned = content.replace('\0', "");
    if cleaned.trim().is_empty() {
        return Err(WinboxError::Config("container document is empty".into()));
    }
    match serde_json::from_str(&cleaned)? {
        Value::Object(map) => Ok(map),
        other => Err(WinboxError::Config(format!(
            "container document is not an object: {}",
            other
        ))),
    }
}

/// Read and parse the document at `path`.
pub fn read_document(path: &Path) -> WinboxResult<Map<String, Value>> {
    let content = fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            WinboxError::NotFound(format!("container document {}", path.display()))
        } else {
            WinboxError::Io(e)
        }
    })?;
    parse_document(&content)
}

/// Strip raw and escaped NULs, for display.
fn strip_nuls(content: &str) -> String {
    content.replace("\\u0000", "").replace('\0', "")
}

impl Container {
    /// Apply a stored document on top of the current settings.
    ///
    /// The runtime version and wrapper config are reset first: a document
    /// without them means "main runtime" and "no wrapper config".
    pub fn load_document(&mut self, mut document: Map<String, Value>) -> WinboxResult<()> {
        self.config.wine_version = MAIN_RUNTIME.to_string();
        self.config.dxwrapper_config.clear();
        migrate_document(&mut document);

        for field in FIELDS {
            match document.get(field.key) {
                None | Some(Value::Null) => {}
                Some(value) => (field.decode)(self, value).map_err(|e| {
                    WinboxError::Config(format!(
                        "container {}: field {}: {}",
                        self.id(),
                        field.key,
                        e
                    ))
                })?,
            }
        }
        Ok(())
    }

    /// Serialize every persisted field.
    pub fn to_document(&self) -> Map<String, Value> {
        let mut document = Map::new();
        for field in FIELDS {
            if let Some(value) = (field.encode)(self) {
                document.insert(field.key.to_string(), value);
            }
        }
        document
    }

    /// Write the document to `<root>/.container`.
    pub fn save(&self) -> WinboxResult<()> {
        let content = serde_json::to_string(&Value::Object(self.to_document()))?;
        fs::write(self.config_file(), content).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to save container {}: {}",
                self.id(),
                e
            ))
        })?;
        tracing::trace!(container_id = %self.id(), "Saved container document");
        Ok(())
    }

    /// Re-read the stored document, replacing the in-memory settings.
    pub fn reload(&mut self) -> WinboxResult<()> {
        let document = read_document(&self.config_file())?;
        self.load_document(document)
    }

    /// Stored document text with NULs stripped, or `{}` when unreadable.
    pub fn raw_document(&self) -> String {
        match fs::read_to_string(self.config_file()) {
            Ok(content) => strip_nuls(&content),
            Err(e) => {
                tracing::warn!(container_id = %self.id(), error = %e, "Failed to read container document");
                "{}".to_string()
            }
        }
    }
}
