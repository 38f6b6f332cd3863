//! Guest program launcher.
//!
//! Turns a container's configuration plus a target executable into one
//! supervised OS process. One process is tracked per launcher instance;
//! starting again replaces it.

mod env;
mod host;
pub mod presets;
mod spawn;

pub use env::EnvVars;
pub use host::{FALLBACK_DNS, HostProbe, MALI_RENDERER, SystemHostProbe};
pub use spawn::{ExitCallback, OsProcessSpawner, ProcessSpawner, SpawnSpec};

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::archive::{ArchiveExtractor, ArchiveKind, TarExtractor};
use crate::container::{Container, Emulator, ExtraValue};
use crate::environment::{AuxToolFlag, EnvironmentComponent};
use crate::errors::WinboxResult;
use crate::options::{LaunchPreferences, WinboxOptions};
use crate::registry::{RegistryOpener, sync_startup_selection};
use crate::runtime_info::RuntimeInfo;
use crate::util::fs::chmod;
use crate::util::process::{kill_process_tree, resume_process, suspend_process};

/// Replaces the whole constructed command; parts are separated by `;`.
pub const COMMAND_OVERRIDE_ENV: &str = "GUEST_PROGRAM_LAUNCHER_COMMAND";

const SYSVSHM_LIB: &str = "libandroid-sysvshm.so";
const EVSHIM_LIB: &str = "libevshim.so";
const REDIRECT_BIONIC_LIB: &str = "libredirect-bionic.so";
const GAMEPAD_MEM_SIZE: u64 = 64;
const MAX_PLAYERS: u32 = 1;

/// C library flavor of the image the guest runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LauncherFlavor {
    #[default]
    Bionic,
    Glibc,
}

/// Caller-controlled launch inputs.
#[derive(Debug, Clone, Default)]
pub struct LaunchSettings {
    /// Command run under the runtime, e.g. `wine explorer /desktop=shell game.exe`.
    pub guest_executable: String,
    /// Merged last; wins over every generated variable.
    pub env_overrides: EnvVars,
    /// Defaults to the image root.
    pub working_dir: Option<PathBuf>,
    pub preferences: LaunchPreferences,
}

/// Receives the guest's exit status.
pub type TerminationCallback = Arc<dyn Fn(i32) + Send + Sync>;

struct LauncherState {
    pid: Option<u32>,
    /// Bumped per spawn; exits of replaced processes are ignored.
    generation: u64,
    container: Container,
}

/// Launches and supervises the guest program of one container.
pub struct GuestLauncher {
    flavor: LauncherFlavor,
    options: Arc<WinboxOptions>,
    spawner: Arc<dyn ProcessSpawner>,
    extractor: Arc<dyn ArchiveExtractor>,
    host: Arc<dyn HostProbe>,
    registry: Option<Arc<dyn RegistryOpener>>,
    aux_tool: Mutex<AuxToolFlag>,

    // start/stop/suspend serialize on this lock
    state: Arc<Mutex<LauncherState>>,
    settings: Mutex<LaunchSettings>,
    on_terminate: Arc<Mutex<Option<TerminationCallback>>>,
}

impl std::fmt::Debug for GuestLauncher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("GuestLauncher")
            .field("flavor", &self.flavor)
            .field("container_id", &state.container.id())
            .field("pid", &state.pid)
            .finish()
    }
}

impl GuestLauncher {
    pub fn new(flavor: LauncherFlavor, options: Arc<WinboxOptions>, container: Container) -> Self {
        Self {
            flavor,
            options,
            spawner: Arc::new(OsProcessSpawner),
            extractor: Arc::new(TarExtractor),
            host: Arc::new(SystemHostProbe::default()),
            registry: None,
            aux_tool: Mutex::new(AuxToolFlag::default()),
            state: Arc::new(Mutex::new(LauncherState {
                pid: None,
                generation: 0,
                container,
            })),
            settings: Mutex::new(LaunchSettings::default()),
            on_terminate: Arc::new(Mutex::new(None)),
        }
    }

    pub fn with_spawner(mut self, spawner: Arc<dyn ProcessSpawner>) -> Self {
        self.spawner = spawner;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArchiveExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_host_probe(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = host;
        self
    }

    /// Apply the container's startup selection to its registry at launch.
    pub fn with_registry_opener(mut self, opener: Arc<dyn RegistryOpener>) -> Self {
        self.registry = Some(opener);
        self
    }

    /// Use `flag` as the auxiliary-tool flag. Registering the launcher with
    /// [`crate::Environment::add_component`] does this automatically.
    pub fn with_aux_tool_flag(mut self, flag: AuxToolFlag) -> Self {
        *self.aux_tool.get_mut() = flag;
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn flavor(&self) -> LauncherFlavor {
        self.flavor
    }

    pub fn pid(&self) -> Option<u32> {
        self.state.lock().pid
    }

    /// Snapshot of the container, including versions recorded at launch.
    pub fn container(&self) -> Container {
        self.state.lock().container.clone()
    }

    pub fn set_container(&self, container: Container) {
        self.state.lock().container = container;
    }

    pub fn set_guest_executable(&self, guest_executable: impl Into<String>) {
        self.settings.lock().guest_executable = guest_executable.into();
    }

    pub fn set_env_overrides(&self, env_overrides: EnvVars) {
        self.settings.lock().env_overrides = env_overrides;
    }

    pub fn set_working_dir(&self, working_dir: Option<PathBuf>) {
        self.settings.lock().working_dir = working_dir;
    }

    pub fn set_preferences(&self, preferences: LaunchPreferences) {
        self.settings.lock().preferences = preferences;
    }

    pub fn set_termination_callback(&self, callback: Option<TerminationCallback>) {
        *self.on_terminate.lock() = callback;
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Launch the guest program, replacing any tracked process.
    ///
    /// Provisioning or spawn failures propagate; nothing is retried.
    pub fn start(&self) -> WinboxResult<u32> {
        let mut state = self.state.lock();
        self.stop_locked(&mut state);

        if let Some(opener) = &self.registry
            && sync_startup_selection(&mut state.container, opener.as_ref())?
        {
            state.container.save()?;
        }

        let runtime =
            RuntimeInfo::from_identifier(&self.options, &state.container.config.wine_version)?;
        self.provision(&runtime, &mut state.container)?;

        let settings = self.settings.lock().clone();
        let mut env = self.guest_env(&runtime, &state.container, &settings);
        let command = match command_override(&env) {
            Some(command) => command,
            None => self.launch_command(
                &runtime,
                &state.container,
                &mut env,
                &settings.guest_executable,
            ),
        };

        state.generation += 1;
        let generation = state.generation;
        let spec = SpawnSpec {
            command,
            env: env.to_strings(),
            working_dir: settings
                .working_dir
                .clone()
                .unwrap_or_else(|| self.options.image_root.clone()),
        };
        tracing::debug!(command = %spec.command, env = %env, "Launching guest program");

        let pid = self.spawner.spawn(spec, self.exit_callback(generation))?;
        state.pid = Some(pid);
        tracing::info!(
            container_id = %state.container.id(),
            pid,
            flavor = ?self.flavor,
            "Guest program started"
        );
        Ok(pid)
    }

    /// Kill the tracked process tree, then the runtime's server.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        self.stop_locked(&mut state);
    }

    fn stop_locked(&self, state: &mut LauncherState) {
        if let Some(pid) = state.pid.take() {
            kill_process_tree(pid);
            tracing::info!(container_id = %state.container.id(), pid, "Stopped guest program");
        }
        let output = self.shell_command(&state.container, "wineserver -k", true);
        tracing::trace!(output = %output, "wineserver -k");
    }

    fn exit_callback(&self, generation: u64) -> ExitCallback {
        let state = Arc::clone(&self.state);
        let on_terminate = Arc::clone(&self.on_terminate);
        let aux_tool = self.aux_tool.lock().clone();
        Box::new(move |status| {
            {
                let mut state = state.lock();
                if state.generation != generation {
                    return;
                }
                state.pid = None;
            }
            tracing::debug!(status, "Guest program terminated");
            if aux_tool.is_set() {
                return;
            }
            let callback = on_terminate.lock().clone();
            if let Some(callback) = callback {
                callback(status);
            }
        })
    }

    /// SIGSTOP the tracked process; no-op when nothing is tracked.
    pub fn suspend_process(&self) {
        if let Some(pid) = self.state.lock().pid {
            suspend_process(pid);
        }
    }

    /// SIGCONT the tracked process; no-op when nothing is tracked.
    pub fn resume_process(&self) {
        if let Some(pid) = self.state.lock().pid {
            resume_process(pid);
        }
    }

    // ========================================================================
    // Provisioning
    // ========================================================================

    fn provision(&self, runtime: &RuntimeInfo, container: &mut Container) -> WinboxResult<()> {
        let assets = &self.options.assets_dir;
        let config = &container.config;

        if self.flavor == LauncherFlavor::Bionic && runtime.is_arm64ec() {
            let box64_version = config.box64_version.clone();
            let fexcore_version = config.fexcore_version.clone();
            let system32 = container.windows_dir("system32");
            tracing::debug!(box64_version = %box64_version, fexcore_version = %fexcore_version, "Extracting emulator libraries");

            self.extractor.extract(
                ArchiveKind::Zstd,
                &assets.join(format!("wowbox64/wowbox64-{}.tzst", box64_version)),
                &system32,
            )?;
            self.extractor.extract(
                ArchiveKind::Zstd,
                &assets.join(format!("fexcore/fexcore-{}.tzst", fexcore_version)),
                &system32,
            )?;
            container.put_extra("box64Version", Some(ExtraValue::from(box64_version)));
            container.put_extra("fexcoreVersion", Some(ExtraValue::from(fexcore_version)));
            return container.save();
        }

        let box64_version = config.box64_version.clone();
        let archive = match self.flavor {
            LauncherFlavor::Bionic => format!("box86_64/box64-{}-bionic.tzst", box64_version),
            LauncherFlavor::Glibc => format!("box86_64/box64-{}.tzst", box64_version),
        };
        tracing::debug!(box64_version = %box64_version, "Extracting translator");
        self.extractor
            .extract(ArchiveKind::Zstd, &assets.join(archive), &self.options.image_root)?;
        container.put_extra("box64Version", Some(ExtraValue::from(box64_version)));
        container.save()?;

        let box64 = self.box64_path();
        if box64.exists() {
            chmod(&box64, 0o755)?;
        }
        Ok(())
    }

    fn box64_path(&self) -> PathBuf {
        match self.flavor {
            LauncherFlavor::Bionic => self.options.bin_dir().join("box64"),
            LauncherFlavor::Glibc => self.options.image_root.join("usr/local/bin/box64"),
        }
    }

    // ========================================================================
    // Environment assembly
    // ========================================================================

    /// Full guest environment, in precedence order: translator tuning,
    /// GPU override, derived placement flag, fixed runtime variables, then
    /// the container overlay, preference flags and caller overrides.
    pub(crate) fn guest_env(
        &self,
        runtime: &RuntimeInfo,
        container: &Container,
        settings: &LaunchSettings,
    ) -> EnvVars {
        let mut env = EnvVars::new();
        let logs = settings.preferences.enable_translator_logs;

        env.put("BOX64_NOBANNER", if logs { "0" } else { "1" });
        env.put("BOX64_DYNAREC", "1");
        if logs {
            env.put("BOX64_LOG", "1");
            env.put("BOX64_DYNAREC_MISSING", "1");
        }
        env.put_all(&presets::box64_env_vars(&container.config.box64_preset));
        env.put("BOX64_X11GLX", "1");
        env.put(
            "BOX64_RCFILE",
            path_str(&self.options.image_root.join("etc/config.box64rc")),
        );
        if self.flavor == LauncherFlavor::Bionic {
            env.put_all(&presets::fexcore_env_vars(&container.config.fexcore_preset));
        }

        if self.host.gpu_renderer().contains(MALI_RENDERER) {
            env.put("BOX64_MMAP32", "0");
        }
        if env.get("BOX64_MMAP32") == Some("1") && !runtime.is_arm64ec() {
            env.put("WRAPPER_DISABLE_PLACED", "1");
        }

        match self.flavor {
            LauncherFlavor::Bionic => {
                self.prepare_gamepad_memory();
                self.put_bionic_vars(&mut env, runtime, false);
            }
            LauncherFlavor::Glibc => self.put_glibc_vars(&mut env, runtime),
        }
        env.put(
            "ANDROID_RESOLV_DNS",
            self.host
                .primary_dns()
                .unwrap_or_else(|| FALLBACK_DNS.to_string()),
        );

        env.put_all(&EnvVars::parse(&container.config.env_vars));
        let prefs = &settings.preferences;
        if prefs.open_with_host_browser {
            env.put("WINE_OPEN_WITH_ANDROID_BROWSER", "1");
        }
        if prefs.share_host_clipboard {
            env.put("WINE_FROM_ANDROID_CLIPBOARD", "1");
            env.put("WINE_TO_ANDROID_CLIPBOARD", "1");
        }
        if prefs.enable_peb_logs {
            env.put("WINE_LOG_PEB_DATA", "1");
        }
        env.put_all(&settings.env_overrides);
        env
    }

    fn put_bionic_vars(&self, env: &mut EnvVars, runtime: &RuntimeInfo, shell: bool) {
        let root = &self.options.image_root;
        let usr = root.join("usr");
        let lib_dir = self.options.lib_dir();

        env.put("HOME", path_str(&self.options.guest_home()));
        env.put("USER", self.options.user.as_str());
        env.put(
            "TMPDIR",
            path_str(&if shell { root.join("tmp") } else { usr.join("tmp") }),
        );
        env.put("DISPLAY", ":0");
        env.put(
            "PATH",
            format!(
                "{}:{}",
                runtime.bin_dir().display(),
                self.options.bin_dir().display()
            ),
        );
        env.put("LD_LIBRARY_PATH", format!("{}:/system/lib64", lib_dir.display()));
        env.put(
            "ANDROID_SYSVSHM_SERVER",
            path_str(&root.join("tmp/.sysvshm/SM0")),
        );
        env.put("WINE_NO_DUPLICATE_EXPLORER", "1");
        env.put("PREFIX", path_str(&usr));
        env.put("WINE_DISABLE_FULLSCREEN_HACK", "1");
        env.put("SteamGameId", "0");

        let preload: &[&str] = if shell {
            &[SYSVSHM_LIB, REDIRECT_BIONIC_LIB]
        } else {
            &[SYSVSHM_LIB, EVSHIM_LIB, REDIRECT_BIONIC_LIB]
        };
        let preload = preload
            .iter()
            .map(|name| lib_dir.join(name))
            .filter(|path| path.exists())
            .map(|path| path_str(&path))
            .collect::<Vec<_>>()
            .join(":");
        if !preload.is_empty() {
            env.put("LD_PRELOAD", preload);
        }
        if shell {
            return;
        }

        env.put("EVSHIM_MAX_PLAYERS", MAX_PLAYERS.to_string());
        env.put("EVSHIM_SHM_ID", "1");
        env.put("EVSHIM_SHM_NAME", "controller-shm0");
        env.put("FONTCONFIG_PATH", path_str(&usr.join("etc/fonts")));
        env.put("XDG_DATA_DIRS", path_str(&usr.join("share")));
        env.put("XDG_CONFIG_DIRS", path_str(&usr.join("etc/xdg")));
        env.put("GST_PLUGIN_PATH", path_str(&lib_dir.join("gstreamer-1.0")));
        env.put(
            "VK_LAYER_PATH",
            format!(
                "{}:{}",
                usr.join("share/vulkan/implicit_layer.d").display(),
                usr.join("share/vulkan/explicit_layer.d").display()
            ),
        );
        env.put("ENABLE_UTIL_LAYER", "1");
        env.put("GST_PLUGIN_FEATURE_RANK", "ximagesink:3000");
        env.put(
            "ALSA_CONFIG_PATH",
            format!(
                "{}:{}",
                usr.join("share/alsa/alsa.conf").display(),
                usr.join("etc/alsa/conf.d/android_aserver.conf").display()
            ),
        );
        env.put("ALSA_PLUGIN_DIR", path_str(&lib_dir.join("alsa-lib")));
        env.put("OPENSSL_CONF", path_str(&usr.join("etc/tls/openssl.cnf")));
        env.put("SSL_CERT_FILE", path_str(&usr.join("etc/tls/cert.pem")));
        env.put("SSL_CERT_DIR", path_str(&usr.join("etc/tls/certs")));
        env.put("WINE_X11FORCEGLX", "1");
        env.put("WINE_GST_NO_GL", "1");
        env.put("WINE_NEW_NDIS", "1");
    }

    fn put_glibc_vars(&self, env: &mut EnvVars, runtime: &RuntimeInfo) {
        let root = &self.options.image_root;
        let lib_dir = self.options.lib_dir();

        env.put("HOME", path_str(&self.options.guest_home()));
        env.put("USER", self.options.user.as_str());
        env.put("TMPDIR", path_str(&root.join("tmp")));
        env.put("DISPLAY", ":0");
        env.put(
            "PATH",
            format!(
                "{}:{}:{}",
                runtime.bin_dir().display(),
                self.options.bin_dir().display(),
                root.join("usr/local/bin").display()
            ),
        );
        env.put("LD_LIBRARY_PATH", path_str(&lib_dir));
        env.put(
            "BOX64_LD_LIBRARY_PATH",
            path_str(&lib_dir.join("x86_64-linux-gnu")),
        );
        env.put(
            "ANDROID_SYSVSHM_SERVER",
            path_str(&root.join("tmp/.sysvshm/SM0")),
        );
        env.put("FONTCONFIG_PATH", path_str(&root.join("usr/etc/fonts")));

        let has_sysvshm = ["x86_64-linux-gnu", "i386-linux-gnu"]
            .iter()
            .any(|dir| lib_dir.join(dir).join(SYSVSHM_LIB).exists());
        if has_sysvshm {
            env.put("LD_PRELOAD", format!("libredirect.so {}", SYSVSHM_LIB));
        }
        env.put("WINEESYNC_WINLATOR", "1");
    }

    /// Shared-memory files the input shim maps, one per player.
    fn prepare_gamepad_memory(&self) {
        let tmp = self.options.image_root.join("tmp");
        for player in 0..MAX_PLAYERS {
            let name = if player == 0 {
                "gamepad.mem".to_string()
            } else {
                format!("gamepad{}.mem", player)
            };
            let path = tmp.join(name);
            let result = fs::create_dir_all(&tmp).and_then(|_| {
                OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(false)
                    .open(&path)?
                    .set_len(GAMEPAD_MEM_SIZE)
            });
            if let Err(e) = result {
                tracing::warn!(path = %path.display(), error = %e, "Failed to create gamepad memory file");
            }
        }
    }

    /// Command for `executable` given the runtime's execution mode.
    ///
    /// ARM64EC runs the binary directly and selects the interposition
    /// library through `HODLL`; everything else goes through box64.
    pub(crate) fn launch_command(
        &self,
        runtime: &RuntimeInfo,
        container: &Container,
        env: &mut EnvVars,
        executable: &str,
    ) -> String {
        if self.flavor == LauncherFlavor::Bionic && runtime.is_arm64ec() {
            let hodll = match container.config.emulator {
                Emulator::Fexcore => "libwow64fex.dll",
                Emulator::Box64 => "wowbox64.dll",
            };
            env.put("HODLL", hodll);
            return format!("{}/{}", runtime.bin_dir().display(), executable);
        }
        format!("{} {}", self.box64_path().display(), executable)
    }

    // ========================================================================
    // Shell commands
    // ========================================================================

    /// Run `command` under the runtime to completion and return its trimmed
    /// output. Failures are reported inline as `Error: <message>`.
    pub fn exec_shell_command(&self, command: &str, include_stderr: bool) -> String {
        let container = self.container();
        self.shell_command(&container, command, include_stderr)
    }

    fn shell_command(&self, container: &Container, command: &str, include_stderr: bool) -> String {
        let runtime = match RuntimeInfo::from_identifier(&self.options, &container.config.wine_version) {
            Ok(runtime) => runtime,
            Err(e) => return format!("Error: {}", e),
        };
        let settings = self.settings.lock().clone();

        let mut env = EnvVars::new();
        match self.flavor {
            LauncherFlavor::Bionic => self.put_bionic_vars(&mut env, &runtime, true),
            LauncherFlavor::Glibc => self.put_glibc_vars(&mut env, &runtime),
        }
        env.put_all(&settings.env_overrides);
        let final_command = self.launch_command(&runtime, container, &mut env, command);

        let spec = SpawnSpec {
            command: final_command,
            env: env.to_strings(),
            working_dir: settings
                .working_dir
                .unwrap_or_else(|| self.options.image_root.clone()),
        };
        tracing::debug!(command = %spec.command, "Running shell command");

        let mut output = String::new();
        let result = spawn::build_command(&spec).and_then(|mut cmd| {
            cmd.stdin(Stdio::null());
            Ok(cmd.output()?)
        });
        match result {
            Ok(out) => {
                output.push_str(&String::from_utf8_lossy(&out.stdout));
                if include_stderr {
                    output.push_str(&String::from_utf8_lossy(&out.stderr));
                }
            }
            Err(e) => {
                output.push_str("Error: ");
                output.push_str(&e.to_string());
            }
        }
        output.trim().to_string()
    }
}

impl EnvironmentComponent for GuestLauncher {
    fn name(&self) -> &str {
        "guest-launcher"
    }

    fn attach(&self, aux_tool: &AuxToolFlag) {
        *self.aux_tool.lock() = aux_tool.clone();
    }

    fn start(&self) -> WinboxResult<()> {
        GuestLauncher::start(self).map(|_| ())
    }

    fn stop(&self) -> WinboxResult<()> {
        GuestLauncher::stop(self);
        Ok(())
    }

    fn try_suspend(&self) {
        self.suspend_process();
    }

    fn try_resume(&self) {
        self.resume_process();
    }
}

/// `GUEST_PROGRAM_LAUNCHER_COMMAND` with `;` turned into argument breaks.
fn command_override(env: &EnvVars) -> Option<String> {
    let raw = env.get(COMMAND_OVERRIDE_ENV)?;
    let command = raw
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    (!command.is_empty()).then_some(command)
}

fn path_str(path: &Path) -> String {
    path.display().to_string()
}
