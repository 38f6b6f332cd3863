//! Lifecycle contract shared by environment components.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::environment::AuxToolFlag;
use crate::errors::WinboxResult;
use crate::launcher::{ProcessSpawner, SpawnSpec};
use crate::util::process::kill_process_tree;

/// A unit of the execution environment (audio server, guest launcher, ...).
///
/// `stop` must be safe on a component that never started. Suspension is
/// optional: the defaults do nothing.
pub trait EnvironmentComponent: Send + Sync {
    fn name(&self) -> &str;

    /// Called once when the component is registered with an environment.
    fn attach(&self, _aux_tool: &AuxToolFlag) {}

    fn start(&self) -> WinboxResult<()>;

    fn stop(&self) -> WinboxResult<()>;

    fn try_suspend(&self) {}

    fn try_resume(&self) {}

    /// Host audio devices changed.
    fn on_audio_topology_changed(&self) {}
}

#[derive(Default)]
struct HelperState {
    pid: Option<u32>,
    generation: u64,
}

/// One supervised helper process.
///
/// The exit watcher only clears the pid of the run it was spawned for, so a
/// late exit of a replaced process never untracks its successor.
pub(crate) struct HelperProcess {
    name: String,
    spec: SpawnSpec,
    spawner: Arc<dyn ProcessSpawner>,
    state: Arc<Mutex<HelperState>>,
}

impl HelperProcess {
    pub(crate) fn new(name: &str, spec: SpawnSpec, spawner: Arc<dyn ProcessSpawner>) -> Self {
        Self {
            name: name.to_string(),
            spec,
            spawner,
            state: Arc::new(Mutex::new(HelperState::default())),
        }
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.state.lock().pid
    }

    pub(crate) fn is_running(&self) -> bool {
        self.pid().is_some()
    }

    pub(crate) fn start(&self) -> WinboxResult<()> {
        let mut state = self.state.lock();
        state.generation += 1;
        let generation = state.generation;

        let watched = Arc::clone(&self.state);
        let name = self.name.clone();
        let pid = self.spawner.spawn(
            self.spec.clone(),
            Box::new(move |status| {
                let mut state = watched.lock();
                if state.generation == generation {
                    state.pid = None;
                }
                tracing::debug!(component = %name, status, "Helper process exited");
            }),
        )?;
        state.pid = Some(pid);
        tracing::info!(component = %self.name, pid, "Started helper process");
        Ok(())
    }

    pub(crate) fn stop(&self) {
        let pid = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.pid.take()
        };
        if let Some(pid) = pid {
            kill_process_tree(pid);
            tracing::info!(component = %self.name, pid, "Stopped helper process");
        }
    }
}
