//! Thread-safe container registry.
//!
//! Discovers, creates, duplicates, removes and activates containers under
//! the home directory, where each lives as `<prefix>-<id>`.

mod callback;
mod shortcut;
mod template;

pub use callback::CallbackQueue;
pub use shortcut::Shortcut;
pub use template::{COMMON_DLLS_MANIFEST, CommonDllManifest, MAIN_TEMPLATE, TemplateInstaller};

use std::fs;
use std::os::unix::fs::symlink;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::{Map, Value};
use tokio::task::JoinHandle;

use crate::archive::{ArchiveExtractor, TarExtractor};
use crate::container::{
    Container, DEFAULT_AUDIO_DRIVER, DEFAULT_DESKTOP_THEME, DEFAULT_DXWRAPPER, DEFAULT_ENV_VARS,
    DEFAULT_GRAPHICS_DRIVER, DEFAULT_SCREEN_SIZE, DEFAULT_WINCOMPONENTS, StartupSelection,
    fallback_cpu_list, fallback_cpu_list_wow64, read_document,
};
use crate::errors::{WinboxError, WinboxResult};
use crate::options::WinboxOptions;
use crate::runtime_info::RuntimeInfo;
use crate::util::fs::{CONTAINER_DIR_MODE, copy_tree, remove_if_exists};

/// Box64 preset used for containers created with default settings.
const DEFAULT_CONTAINER_PRESET: &str = "COMPATIBILITY";

/// Registry of containers on durable storage.
///
/// # Design
///
/// - **Shared ownership**: cloneable via `Arc`, handed to background workers
/// - **Concurrent access**: `RwLock` over the loaded records
/// - **Disk-first**: every change lands on disk before the cache is touched
/// - **Snapshots**: lookups return clones; write changes back with [`ContainerManager::update`]
#[derive(Clone)]
pub struct ContainerManager {
    inner: Arc<RwLock<ManagerInner>>,
    options: Arc<WinboxOptions>,
    installer: Arc<TemplateInstaller>,
}

struct ManagerInner {
    containers: Vec<Container>,
}

impl std::fmt::Debug for ContainerManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerManager")
            .field("home_dir", &self.options.home_dir)
            .finish()
    }
}

impl ContainerManager {
    /// Open the registry and load every container under the home directory.
    pub fn new(options: WinboxOptions) -> WinboxResult<Self> {
        Self::with_extractor(options, Arc::new(TarExtractor))
    }

    pub fn with_extractor(
        options: WinboxOptions,
        extractor: Arc<dyn ArchiveExtractor>,
    ) -> WinboxResult<Self> {
        options.validate()?;
        let installer = TemplateInstaller::new(&options, extractor);
        let manager = Self {
            inner: Arc::new(RwLock::new(ManagerInner {
                containers: Vec::new(),
            })),
            options: Arc::new(options),
            installer: Arc::new(installer),
        };
        manager.load_all()?;
        Ok(manager)
    }

    pub fn options(&self) -> &WinboxOptions {
        &self.options
    }

    fn read(&self) -> WinboxResult<RwLockReadGuard<'_, ManagerInner>> {
        self.inner
            .read()
            .map_err(|e| WinboxError::Internal(format!("manager lock poisoned: {}", e)))
    }

    fn write(&self) -> WinboxResult<RwLockWriteGuard<'_, ManagerInner>> {
        self.inner
            .write()
            .map_err(|e| WinboxError::Internal(format!("manager lock poisoned: {}", e)))
    }

    // ========================================================================
    // Discovery
    // ========================================================================

    /// Rebuild the in-memory set from disk.
    ///
    /// Directories whose document is missing, empty or malformed are logged
    /// and skipped. Returns the number of containers loaded.
    pub fn load_all(&self) -> WinboxResult<usize> {
        let prefix = format!("{}-", self.options.container_prefix);
        let mut loaded = Vec::new();

        let entries = match fs::read_dir(&self.options.home_dir) {
            Ok(entries) => entries.filter_map(Result::ok).collect::<Vec<_>>(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            if !entry.file_type().is_ok_and(|t| t.is_dir()) {
                continue;
            }
            let file_name = entry.file_name();
            let Some(id) = file_name.to_str().and_then(|n| n.strip_prefix(&prefix)) else {
                continue;
            };

            let mut container = Container::new(id, &self.options);
            container.set_root_dir(entry.path());
            match read_document(&container.config_file())
                .and_then(|document| container.load_document(document))
            {
                Ok(()) => loaded.push(container),
                Err(e) => {
                    tracing::warn!(container_id = %id, error = %e, "Could not load container");
                }
            }
        }

        loaded.sort_by(|a, b| a.id().cmp(b.id()));
        let count = loaded.len();
        self.write()?.containers = loaded;
        tracing::info!(count, "Loaded containers");
        Ok(count)
    }

    pub fn containers(&self) -> WinboxResult<Vec<Container>> {
        Ok(self.read()?.containers.clone())
    }

    pub fn has_id(&self, id: &str) -> WinboxResult<bool> {
        Ok(self.read()?.containers.iter().any(|c| c.id() == id))
    }

    pub fn find_by_id(&self, id: &str) -> WinboxResult<Option<Container>> {
        tracing::trace!(container_id = %id, "Looking up container");
        Ok(self
            .read()?
            .containers
            .iter()
            .find(|c| c.id() == id)
            .cloned())
    }

    /// Make `container` current by re-pointing the `<home>/<prefix>` link.
    pub fn activate(&self, container: &Container) -> WinboxResult<()> {
        let link = self.options.current_container_link();
        remove_if_exists(&link)?;
        let target = format!("./{}-{}", self.options.container_prefix, container.id());
        symlink(&target, &link).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to link {} -> {}: {}",
                link.display(),
                target,
                e
            ))
        })?;
        tracing::debug!(container_id = %container.id(), "Activated container");
        Ok(())
    }

    /// Persist a mutated record, then refresh the cached copy.
    pub fn update(&self, container: &Container) -> WinboxResult<()> {
        let mut inner = self.write()?;
        let slot = inner
            .containers
            .iter_mut()
            .find(|c| c.id() == container.id())
            .ok_or_else(|| WinboxError::NotFound(format!("container {}", container.id())))?;
        container.save()?;
        *slot = container.clone();
        Ok(())
    }

    // ========================================================================
    // Creation
    // ========================================================================

    /// Create, provision and register a container.
    ///
    /// On any failure after the directory was made, the directory is
    /// removed again: a failed create leaves nothing behind.
    pub fn create_container(
        &self,
        id: &str,
        mut document: Map<String, Value>,
    ) -> WinboxResult<Container> {
        if self.has_id(id)? {
            return Err(WinboxError::AlreadyExists(format!("container {}", id)));
        }
        document.insert("id".into(), Value::from(id));

        let container_dir = self.options.container_dir(id);
        fs::create_dir_all(&self.options.home_dir)?;
        fs::create_dir(&container_dir).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to create container directory {}: {}",
                container_dir.display(),
                e
            ))
        })?;

        let result = self.provision(id, document);
        let container = match result {
            Ok(container) => container,
            Err(e) => {
                tracing::warn!(
                    container_id = %id,
                    error = %e,
                    "Container provisioning failed, deleting directory"
                );
                if let Err(cleanup) = fs::remove_dir_all(&container_dir) {
                    tracing::warn!(container_id = %id, error = %cleanup, "Failed to clean up container directory");
                }
                return Err(e);
            }
        };

        self.write()?.containers.push(container.clone());
        tracing::info!(container_id = %id, runtime = %container.config.wine_version, "Created container");
        Ok(container)
    }

    fn provision(&self, id: &str, document: Map<String, Value>) -> WinboxResult<Container> {
        let container = Container::from_document(id, &self.options, document)?;
        let runtime = RuntimeInfo::from_identifier(&self.options, &container.config.wine_version)?;
        self.installer.install(&runtime, container.root_dir())?;
        container.save()?;
        Ok(container)
    }

    /// Run [`ContainerManager::create_container`] on the blocking pool.
    ///
    /// Must be called from within a tokio runtime.
    pub fn create_container_future(
        &self,
        id: &str,
        document: Map<String, Value>,
    ) -> WinboxResult<JoinHandle<WinboxResult<Container>>> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| WinboxError::InvalidState(format!("no tokio runtime: {}", e)))?;
        let manager = self.clone();
        let id = id.to_string();
        Ok(handle.spawn_blocking(move || manager.create_container(&id, document)))
    }

    /// Create a container from default settings named `container_<id>`.
    pub fn create_default_container_future(
        &self,
        runtime: &RuntimeInfo,
        id: &str,
    ) -> WinboxResult<JoinHandle<WinboxResult<Container>>> {
        self.create_container_future(id, default_document(runtime, id))
    }

    /// Create on a single-use worker thread; `callback` is posted to `queue`.
    pub fn create_container_async<F>(
        &self,
        id: &str,
        document: Map<String, Value>,
        queue: &CallbackQueue,
        callback: F,
    ) -> WinboxResult<()>
    where
        F: FnOnce(WinboxResult<Container>) + Send + 'static,
    {
        let manager = self.clone();
        let id = id.to_string();
        let work = move || manager.create_container(&id, document);
        self.run_on_worker("winbox-create", queue, work, callback)
    }

    // ========================================================================
    // Duplication / removal
    // ========================================================================

    /// First free id among `base`, `base(1)`, `base(2)`, ...
    fn unique_id(&self, base: &str) -> WinboxResult<String> {
        let inner = self.read()?;
        let taken = |id: &str| {
            inner.containers.iter().any(|c| c.id() == id)
                || self.options.container_dir(id).exists()
        };
        if !taken(base) {
            return Ok(base.to_string());
        }
        let mut counter = 1u32;
        loop {
            let candidate = format!("{}({})", base, counter);
            if !taken(&candidate) {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Copy `src` into a new container with a fresh id.
    ///
    /// Only a curated set of settings is carried over; the extra and session
    /// bags start empty.
    pub fn duplicate_container(&self, src: &Container) -> WinboxResult<Container> {
        let new_id = self.unique_id(src.id())?;
        let dst_dir = self.options.container_dir(&new_id);
        fs::create_dir(&dst_dir).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to create container directory {}: {}",
                dst_dir.display(),
                e
            ))
        })?;

        let copied = copy_tree(src.root_dir(), &dst_dir, CONTAINER_DIR_MODE).and_then(|()| {
            let mut dst = Container::new(new_id.clone(), &self.options);
            dst.set_root_dir(&dst_dir);
            copy_settings(src, &mut dst);
            dst.save()?;
            Ok(dst)
        });
        let dst = match copied {
            Ok(dst) => dst,
            Err(e) => {
                tracing::warn!(container_id = %new_id, error = %e, "Duplication failed, deleting directory");
                if let Err(cleanup) = fs::remove_dir_all(&dst_dir) {
                    tracing::warn!(container_id = %new_id, error = %cleanup, "Failed to clean up container directory");
                }
                return Err(e);
            }
        };

        self.write()?.containers.push(dst.clone());
        tracing::info!(src_id = %src.id(), container_id = %new_id, "Duplicated container");
        Ok(dst)
    }

    pub fn duplicate_container_async<F>(
        &self,
        src: &Container,
        queue: &CallbackQueue,
        callback: F,
    ) -> WinboxResult<()>
    where
        F: FnOnce(WinboxResult<Container>) + Send + 'static,
    {
        let manager = self.clone();
        let src = src.clone();
        let work = move || manager.duplicate_container(&src);
        self.run_on_worker("winbox-duplicate", queue, work, callback)
    }

    /// Delete the container's directory, then forget it.
    ///
    /// A failed delete keeps the record.
    pub fn remove_container(&self, container: &Container) -> WinboxResult<()> {
        fs::remove_dir_all(container.root_dir()).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to delete container {}: {}",
                container.id(),
                e
            ))
        })?;
        self.write()?
            .containers
            .retain(|c| c.id() != container.id());
        tracing::info!(container_id = %container.id(), "Removed container");
        Ok(())
    }

    pub fn remove_container_async<F>(
        &self,
        container: &Container,
        queue: &CallbackQueue,
        callback: F,
    ) -> WinboxResult<()>
    where
        F: FnOnce(WinboxResult<()>) + Send + 'static,
    {
        let manager = self.clone();
        let container = container.clone();
        let work = move || manager.remove_container(&container);
        self.run_on_worker("winbox-remove", queue, work, callback)
    }

    fn run_on_worker<T, W, F>(
        &self,
        name: &str,
        queue: &CallbackQueue,
        work: W,
        callback: F,
    ) -> WinboxResult<()>
    where
        T: Send + 'static,
        W: FnOnce() -> WinboxResult<T> + Send + 'static,
        F: FnOnce(WinboxResult<T>) + Send + 'static,
    {
        let queue = queue.clone();
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let result = work();
                queue.post(move || callback(result));
            })
            .map_err(|e| WinboxError::Internal(format!("Failed to spawn {} worker: {}", name, e)))?;
        Ok(())
    }

    // ========================================================================
    // Shortcuts
    // ========================================================================

    /// Shortcuts of every container, sorted by display name.
    pub fn list_shortcuts(&self) -> WinboxResult<Vec<Shortcut>> {
        let inner = self.read()?;
        let mut shortcuts: Vec<Shortcut> = inner
            .containers
            .iter()
            .flat_map(|c| shortcut::scan_desktop_dir(c.id(), &c.desktop_dir()))
            .collect();
        shortcuts.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(shortcuts)
    }
}

fn copy_settings(src: &Container, dst: &mut Container) {
    let from = &src.config;
    let to = &mut dst.config;
    to.name = format!("{} (copy)", from.name);
    to.screen_size = from.screen_size.clone();
    to.env_vars = from.env_vars.clone();
    to.cpu_list = from.cpu_list.clone();
    to.cpu_list_wow64 = from.cpu_list_wow64.clone();
    to.graphics_driver = from.graphics_driver.clone();
    to.dxwrapper = from.dxwrapper.clone();
    to.dxwrapper_config = from.dxwrapper_config.clone();
    to.audio_driver = from.audio_driver.clone();
    to.wincomponents = from.wincomponents.clone();
    to.drives = from.drives.clone();
    to.show_fps = from.show_fps;
    to.wow64_mode = from.wow64_mode;
    to.startup_selection = from.startup_selection;
    to.box86_preset = from.box86_preset.clone();
    to.box64_preset = from.box64_preset.clone();
    to.box86_version = from.box86_version.clone();
    to.box64_version = from.box64_version.clone();
    to.desktop_theme = from.desktop_theme.clone();
    to.rcfile_id = from.rcfile_id;
    to.wine_version = from.wine_version.clone();
}

/// Settings document for a container created without user input.
pub fn default_document(runtime: &RuntimeInfo, id: &str) -> Map<String, Value> {
    let mut document = Map::new();
    let mut put = |key: &str, value: Value| {
        document.insert(key.to_string(), value);
    };
    put("name", Value::from(format!("container_{}", id)));
    put("screenSize", Value::from(DEFAULT_SCREEN_SIZE));
    put("envVars", Value::from(DEFAULT_ENV_VARS));
    put("cpuList", Value::from(fallback_cpu_list()));
    put("cpuListWoW64", Value::from(fallback_cpu_list_wow64()));
    put("graphicsDriver", Value::from(DEFAULT_GRAPHICS_DRIVER));
    put("dxwrapper", Value::from(DEFAULT_DXWRAPPER));
    put("dxwrapperConfig", Value::from(""));
    put("audioDriver", Value::from(DEFAULT_AUDIO_DRIVER));
    put("wincomponents", Value::from(DEFAULT_WINCOMPONENTS));
    put("drives", Value::from(""));
    put("showFPS", Value::from(false));
    put("wow64Mode", Value::from(runtime.is_main()));
    put(
        "startupSelection",
        Value::from(StartupSelection::Essential.as_u8()),
    );
    put("box86Preset", Value::from(DEFAULT_CONTAINER_PRESET));
    put("box64Preset", Value::from(DEFAULT_CONTAINER_PRESET));
    put("desktopTheme", Value::from(DEFAULT_DESKTOP_THEME));
    if !runtime.is_main() {
        put("wineVersion", Value::from(runtime.identifier.as_str()));
    }
    document
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveKind;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Extractor that writes a marker file instead of unpacking.
    struct FakeExtractor {
        calls: AtomicUsize,
        fail: bool,
    }

    impl ArchiveExtractor for FakeExtractor {
        fn extract(&self, _: ArchiveKind, archive: &Path, dest: &Path) -> WinboxResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail || !archive.exists() {
                return Err(WinboxError::Storage("extraction failed".into()));
            }
            fs::create_dir_all(dest.join(".wine/drive_c/windows/system32"))?;
            fs::write(dest.join(".wine/system.reg"), "WINE REGISTRY")?;
            Ok(())
        }
    }

    struct Fixture {
        _dir: TempDir,
        manager: ContainerManager,
    }

    fn create_test_manager(fail: bool) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut options = WinboxOptions::with_image_root(dir.path().join("imagefs"));
        options.external_storage_dir = dir.path().join("downloads");
        options.app_storage_dir = dir.path().join("storage");
        fs::create_dir_all(&options.assets_dir).unwrap();
        fs::write(options.assets_dir.join(MAIN_TEMPLATE), "").unwrap();
        fs::write(
            options.assets_dir.join(COMMON_DLLS_MANIFEST),
            r#"{"system32": [], "syswow64": []}"#,
        )
        .unwrap();
        let extractor = Arc::new(FakeExtractor {
            calls: AtomicUsize::new(0),
            fail,
        });
        let manager = ContainerManager::with_extractor(options, extractor).unwrap();
        Fixture { _dir: dir, manager }
    }

    fn document(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_create_and_find() {
        let f = create_test_manager(false);
        let container = f
            .manager
            .create_container("c1", document(serde_json::json!({"name": "Game"})))
            .unwrap();

        assert_eq!(container.config.name, "Game");
        assert!(container.config_file().exists());
        assert!(f.manager.has_id("c1").unwrap());
        assert_eq!(f.manager.find_by_id("c1").unwrap().unwrap(), container);
        assert!(f.manager.find_by_id("c9").unwrap().is_none());
    }

    #[test]
    fn test_create_duplicate_id_rejected() {
        let f = create_test_manager(false);
        f.manager.create_container("c1", Map::new()).unwrap();
        let err = f.manager.create_container("c1", Map::new()).unwrap_err();
        assert!(matches!(err, WinboxError::AlreadyExists(_)));
    }

    #[test]
    fn test_failed_extraction_leaves_no_trace() {
        let f = create_test_manager(true);
        let err = f.manager.create_container("c1", Map::new()).unwrap_err();
        assert!(matches!(err, WinboxError::Storage(_)));
        assert!(!f.manager.options().container_dir("c1").exists());
        assert!(!f.manager.has_id("c1").unwrap());
    }

    #[test]
    fn test_missing_custom_runtime_rolls_back() {
        let f = create_test_manager(false);
        let result = f.manager.create_container(
            "c1",
            document(serde_json::json!({"wineVersion": "proton-0"})),
        );
        assert!(result.is_err());
        assert!(!f.manager.options().container_dir("c1").exists());
    }

    #[test]
    fn test_load_all_skips_broken_documents() {
        let f = create_test_manager(false);
        f.manager.create_container("good", Map::new()).unwrap();
        let home = &f.manager.options().home_dir;
        fs::create_dir_all(home.join("xuser-empty")).unwrap();
        fs::write(home.join("xuser-empty/.container"), "  ").unwrap();
        fs::create_dir_all(home.join("xuser-corrupt")).unwrap();
        fs::write(home.join("xuser-corrupt/.container"), "{not json").unwrap();
        fs::create_dir_all(home.join("xuser-nodoc")).unwrap();
        fs::create_dir_all(home.join("unrelated")).unwrap();

        assert_eq!(f.manager.load_all().unwrap(), 1);
        let ids: Vec<String> = f
            .manager
            .containers()
            .unwrap()
            .iter()
            .map(|c| c.id().to_string())
            .collect();
        assert_eq!(ids, vec!["good"]);
    }

    #[test]
    fn test_update_persists_then_caches() {
        let f = create_test_manager(false);
        let mut container = f.manager.create_container("c1", Map::new()).unwrap();
        container.config.show_fps = true;
        f.manager.update(&container).unwrap();

        assert!(f.manager.find_by_id("c1").unwrap().unwrap().config.show_fps);
        f.manager.load_all().unwrap();
        assert!(f.manager.find_by_id("c1").unwrap().unwrap().config.show_fps);
    }

    #[test]
    fn test_unique_id_probes_suffixes() {
        let f = create_test_manager(false);
        let x = f.manager.create_container("X", Map::new()).unwrap();
        f.manager.create_container("X(1)", Map::new()).unwrap();

        let copy = f.manager.duplicate_container(&x).unwrap();
        assert_eq!(copy.id(), "X(2)");
    }

    #[test]
    fn test_duplicate_copies_curated_settings() {
        let f = create_test_manager(false);
        let mut src = f
            .manager
            .create_container("src", document(serde_json::json!({"name": "Game", "showFPS": true})))
            .unwrap();
        src.put_extra("appId", Some(crate::container::ExtraValue::Int(440)));
        src.config.exec_args = "-novid".into();
        f.manager.update(&src).unwrap();

        let copy = f.manager.duplicate_container(&src).unwrap();
        assert_eq!(copy.id(), "src(1)");
        assert_eq!(copy.config.name, "Game (copy)");
        assert!(copy.config.show_fps);
        assert_eq!(copy.config.exec_args, "");
        assert!(copy.extra().is_empty());
        assert!(copy.root_dir().join(".wine/system.reg").exists());

        let reloaded = read_document(&copy.config_file()).unwrap();
        assert_eq!(reloaded["id"], serde_json::json!("src(1)"));
    }

    #[test]
    fn test_failed_duplicate_save_leaves_no_trace() {
        let f = create_test_manager(false);
        let src = f.manager.create_container("src", Map::new()).unwrap();
        // A directory where the copy's document belongs makes the save fail
        fs::remove_file(src.config_file()).unwrap();
        fs::create_dir(src.config_file()).unwrap();

        let err = f.manager.duplicate_container(&src).unwrap_err();
        assert!(matches!(err, WinboxError::Storage(_)));
        assert!(!f.manager.options().container_dir("src(1)").exists());
        assert!(!f.manager.has_id("src(1)").unwrap());
    }

    #[test]
    fn test_remove_container() {
        let f = create_test_manager(false);
        let container = f.manager.create_container("c1", Map::new()).unwrap();
        f.manager.remove_container(&container).unwrap();
        assert!(!container.root_dir().exists());
        assert!(!f.manager.has_id("c1").unwrap());

        // Deleting again fails and the registry is unchanged
        assert!(f.manager.remove_container(&container).is_err());
    }

    #[test]
    fn test_activate_replaces_link() {
        let f = create_test_manager(false);
        let c1 = f.manager.create_container("c1", Map::new()).unwrap();
        let c2 = f.manager.create_container("c2", Map::new()).unwrap();
        f.manager.activate(&c1).unwrap();
        f.manager.activate(&c2).unwrap();

        let link = f.manager.options().current_container_link();
        assert_eq!(fs::read_link(&link).unwrap(), Path::new("./xuser-c2"));
        assert_eq!(fs::canonicalize(&link).unwrap(), fs::canonicalize(c2.root_dir()).unwrap());
    }

    #[test]
    fn test_list_shortcuts_sorted() {
        let f = create_test_manager(false);
        let c1 = f.manager.create_container("c1", Map::new()).unwrap();
        let c2 = f.manager.create_container("c2", Map::new()).unwrap();
        fs::create_dir_all(c1.desktop_dir()).unwrap();
        fs::create_dir_all(c2.desktop_dir()).unwrap();
        fs::write(c1.desktop_dir().join("z.desktop"), "[Desktop Entry]\nName=Zeta\n").unwrap();
        fs::write(c2.desktop_dir().join("a.desktop"), "[Desktop Entry]\nName=Alpha\n").unwrap();

        let names: Vec<String> = f
            .manager
            .list_shortcuts()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["Alpha", "Zeta"]);
    }

    #[test]
    fn test_create_async_posts_callback() {
        let f = create_test_manager(false);
        let queue = CallbackQueue::new();
        let created = Arc::new(std::sync::Mutex::new(None));

        let slot = created.clone();
        f.manager
            .create_container_async("c1", Map::new(), &queue, move |result| {
                *slot.lock().unwrap() = Some(result.map(|c| c.id().to_string()));
            })
            .unwrap();

        assert_eq!(queue.wait_and_run(std::time::Duration::from_secs(10)), 1);
        let id = created.lock().unwrap().take().unwrap().unwrap();
        assert_eq!(id, "c1");
    }

    #[tokio::test]
    async fn test_create_default_container_future() {
        let f = create_test_manager(false);
        let runtime = RuntimeInfo::main(f.manager.options());
        let container = f
            .manager
            .create_default_container_future(&runtime, "42")
            .unwrap()
            .await
            .unwrap()
            .unwrap();

        assert_eq!(container.config.name, "container_42");
        assert_eq!(container.config.startup_selection, StartupSelection::Essential);
        assert_eq!(container.config.box64_preset, "COMPATIBILITY");
        assert!(container.config.wow64_mode);
        assert!(container.config.cpu_list.is_some());
    }
}
