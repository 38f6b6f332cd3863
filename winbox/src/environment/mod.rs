//! Execution environment: an ordered set of components started and stopped
//! together.

mod audio;
mod component;

pub use audio::{
    AudioDevice, AudioDeviceHub, AudioServerComponent, AudioTopologyMonitor,
    PulseAudioComponent, Subscription, TopologyCallback,
};
pub use component::EnvironmentComponent;

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::errors::{WinboxError, WinboxResult};
use crate::options::WinboxOptions;
use crate::util::fs::{CONTAINER_DIR_MODE, chmod, clear_dir};

type ComponentList = RwLock<Vec<Arc<dyn EnvironmentComponent>>>;

/// "A long-running auxiliary tool is in progress" flag.
///
/// While set, the guest launcher does not report process exits: the tool is
/// expected to relaunch the guest itself. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct AuxToolFlag(Arc<Mutex<bool>>);

impl AuxToolFlag {
    pub fn is_set(&self) -> bool {
        *self.0.lock()
    }

    pub fn set(&self, running: bool) {
        *self.0.lock() = running;
    }
}

/// Components in registration order plus the environment-wide state they share.
pub struct Environment {
    options: Arc<WinboxOptions>,
    components: Arc<ComponentList>,
    aux_tool: AuxToolFlag,
    // Held for the environment's lifetime; dropping it unregisters.
    _audio_subscription: Option<Subscription>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .components
            .read()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        f.debug_struct("Environment")
            .field("components", &names)
            .field("aux_tool_running", &self.aux_tool.is_set())
            .finish()
    }
}

impl Environment {
    pub fn new(options: Arc<WinboxOptions>) -> Self {
        Self {
            options,
            components: Arc::new(RwLock::new(Vec::new())),
            aux_tool: AuxToolFlag::default(),
            _audio_subscription: None,
        }
    }

    /// Environment that restarts its audio components when `monitor`
    /// reports a change in output devices.
    pub fn with_audio_monitor(
        options: Arc<WinboxOptions>,
        monitor: &dyn AudioTopologyMonitor,
    ) -> Self {
        let mut environment = Self::new(options);
        let components: Weak<ComponentList> = Arc::downgrade(&environment.components);
        environment._audio_subscription = Some(monitor.subscribe(Arc::new(move || {
            if let Some(components) = components.upgrade() {
                restart_audio(&components);
            }
        })));
        environment
    }

    pub fn options(&self) -> &WinboxOptions {
        &self.options
    }

    /// Register a component; the returned handle stays usable by the caller.
    ///
    /// The component is attached to this environment's auxiliary-tool flag.
    pub fn add_component<T>(&self, component: T) -> Arc<T>
    where
        T: EnvironmentComponent + 'static,
    {
        component.attach(&self.aux_tool);
        let handle = Arc::new(component);
        self.components
            .write()
            .push(Arc::clone(&handle) as Arc<dyn EnvironmentComponent>);
        handle
    }

    pub fn component_count(&self) -> usize {
        self.components.read().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EnvironmentComponent>> {
        self.components.read().clone()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Clear the scratch directory, then start components in registration
    /// order. The first failure is returned; components already started keep
    /// running.
    pub fn start(&self) -> WinboxResult<()> {
        let tmp_dir = &self.options.tmp_dir;
        clear_dir(tmp_dir).map_err(|e| {
            WinboxError::Storage(format!(
                "Failed to clear scratch directory {}: {}",
                tmp_dir.display(),
                e
            ))
        })?;
        chmod(tmp_dir, CONTAINER_DIR_MODE)?;

        for component in self.snapshot() {
            tracing::debug!(component = %component.name(), "Starting component");
            component.start()?;
        }
        tracing::info!(count = self.component_count(), "Environment started");
        Ok(())
    }

    /// Stop every component. Failures are logged and do not stop the sweep.
    pub fn stop(&self) {
        for component in self.snapshot() {
            if let Err(e) = component.stop() {
                tracing::warn!(component = %component.name(), error = %e, "Failed to stop component");
            }
        }
        tracing::info!("Environment stopped");
    }

    pub fn pause(&self) {
        for component in self.snapshot() {
            component.try_suspend();
        }
    }

    pub fn resume(&self) {
        for component in self.snapshot() {
            component.try_resume();
        }
    }

    pub fn restart_audio(&self) {
        restart_audio(&self.components);
    }

    // ========================================================================
    // Auxiliary tool flag
    // ========================================================================

    pub fn is_aux_tool_running(&self) -> bool {
        self.aux_tool.is_set()
    }

    pub fn set_aux_tool_running(&self, running: bool) {
        self.aux_tool.set(running);
    }

    /// Shared handle to the flag, for components that consult it.
    pub fn aux_tool_flag(&self) -> AuxToolFlag {
        self.aux_tool.clone()
    }
}

fn restart_audio(components: &ComponentList) {
    let snapshot = components.read().clone();
    tracing::debug!("Audio devices changed, restarting audio components");
    for component in snapshot {
        component.on_audio_topology_changed();
    }
}
