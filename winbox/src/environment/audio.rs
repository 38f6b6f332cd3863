//! Audio components and host audio-topology notifications.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::component::{EnvironmentComponent, HelperProcess};
use crate::errors::WinboxResult;
use crate::launcher::{ProcessSpawner, SpawnSpec};
use crate::options::WinboxOptions;

// ============================================================================
// Topology notifications
// ============================================================================

/// A host audio endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioDevice {
    pub id: u32,
    pub name: String,
    /// Output device (speaker, headphones).
    pub is_sink: bool,
}

pub type TopologyCallback = Arc<dyn Fn() + Send + Sync>;

/// Host source of "audio devices changed" events.
pub trait AudioTopologyMonitor: Send + Sync {
    /// Register `callback`; it stays registered until the returned
    /// [`Subscription`] is dropped.
    fn subscribe(&self, callback: TopologyCallback) -> Subscription;
}

/// Registration handle. Dropping it unregisters the callback.
#[must_use = "dropping a Subscription unregisters its callback"]
pub struct Subscription {
    unsubscribe: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(unsubscribe: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish()
    }
}

#[derive(Default)]
struct HubInner {
    next_id: u64,
    listeners: BTreeMap<u64, TopologyCallback>,
}

/// In-process [`AudioTopologyMonitor`] fed by host glue code.
#[derive(Clone, Default)]
pub struct AudioDeviceHub {
    inner: Arc<Mutex<HubInner>>,
}

impl AudioDeviceHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn devices_added(&self, devices: &[AudioDevice]) {
        self.notify_for(devices);
    }

    pub fn devices_removed(&self, devices: &[AudioDevice]) {
        self.notify_for(devices);
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }

    // Input-only changes don't affect playback.
    fn notify_for(&self, devices: &[AudioDevice]) {
        if !devices.iter().any(|d| d.is_sink) {
            return;
        }
        // Snapshot so a callback may subscribe or drop without deadlocking
        let listeners: Vec<TopologyCallback> =
            self.inner.lock().listeners.values().cloned().collect();
        for listener in listeners {
            listener();
        }
    }
}

impl AudioTopologyMonitor for AudioDeviceHub {
    fn subscribe(&self, callback: TopologyCallback) -> Subscription {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.listeners.insert(id, callback);
            id
        };
        let weak = Arc::downgrade(&self.inner);
        Subscription::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.lock().listeners.remove(&id);
            }
        })
    }
}

// ============================================================================
// Components
// ============================================================================

/// Audio-server helper process; restarted on topology changes.
pub struct AudioServerComponent {
    process: HelperProcess,
}

impl AudioServerComponent {
    pub fn new(spawner: Arc<dyn ProcessSpawner>, spec: SpawnSpec) -> Self {
        Self {
            process: HelperProcess::new("audio-server", spec, spawner),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }
}

impl EnvironmentComponent for AudioServerComponent {
    fn name(&self) -> &str {
        "audio-server"
    }

    fn start(&self) -> WinboxResult<()> {
        if self.process.is_running() {
            return Ok(());
        }
        self.process.start()
    }

    fn stop(&self) -> WinboxResult<()> {
        self.process.stop();
        Ok(())
    }

    fn on_audio_topology_changed(&self) {
        self.process.stop();
        if let Err(e) = self.process.start() {
            tracing::warn!(error = %e, "Failed to restart audio server");
        }
    }
}

/// User-space audio bridge. `start` always replaces a running instance.
pub struct PulseAudioComponent {
    process: HelperProcess,
}

impl PulseAudioComponent {
    /// Bridge binary shipped in the image, configured under `tmp_dir`.
    pub fn new(options: &WinboxOptions, spawner: Arc<dyn ProcessSpawner>) -> Self {
        let root = &options.image_root;
        let command = format!(
            "{} --system=false --disable-shm=true --fail=false -n --file={} \
             --daemonize=false --use-pid-file=false --exit-idle-time=-1",
            root.join("usr/bin/pulseaudio").display(),
            options.tmp_dir.join("pulseaudio.conf").display(),
        );
        let env = vec![
            format!("LD_LIBRARY_PATH={}", options.lib_dir().display()),
            format!("HOME={}", options.tmp_dir.display()),
            format!("TMPDIR={}", options.tmp_dir.display()),
            format!("PULSE_RUNTIME_PATH={}", options.tmp_dir.join("pulse").display()),
        ];
        Self::with_spec(
            spawner,
            SpawnSpec {
                command,
                env,
                working_dir: options.tmp_dir.clone(),
            },
        )
    }

    pub fn with_spec(spawner: Arc<dyn ProcessSpawner>, spec: SpawnSpec) -> Self {
        Self {
            process: HelperProcess::new("pulseaudio", spec, spawner),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.pid()
    }
}

impl EnvironmentComponent for PulseAudioComponent {
    fn name(&self) -> &str {
        "pulseaudio"
    }

    fn start(&self) -> WinboxResult<()> {
        self.process.stop();
        self.process.start()
    }

    fn stop(&self) -> WinboxResult<()> {
        self.process.stop();
        Ok(())
    }

    fn on_audio_topology_changed(&self) {
        if let Err(e) = self.start() {
            tracing::warn!(error = %e, "Failed to restart audio bridge");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::OsProcessSpawner;
    use crate::util::process::is_process_alive;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn sleep_spec() -> SpawnSpec {
        SpawnSpec {
            command: "/bin/sleep 30".into(),
            env: Vec::new(),
            working_dir: std::env::temp_dir(),
        }
    }

    fn wait_until_dead(pid: u32) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if !is_process_alive(pid) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        false
    }

    fn sink(id: u32) -> AudioDevice {
        AudioDevice {
            id,
            name: format!("speaker-{}", id),
            is_sink: true,
        }
    }

    #[test]
    fn test_only_sinks_notify() {
        let hub = AudioDeviceHub::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let _sub = hub.subscribe(Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        hub.devices_added(&[AudioDevice {
            id: 1,
            name: "mic".into(),
            is_sink: false,
        }]);
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        hub.devices_removed(&[sink(2)]);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_subscription_drop_unregisters() {
        let hub = AudioDeviceHub::new();
        let sub = hub.subscribe(Arc::new(|| {}));
        assert_eq!(hub.listener_count(), 1);
        drop(sub);
        assert_eq!(hub.listener_count(), 0);
    }

    #[test]
    fn test_pulse_start_replaces_prior_instance() {
        let pulse = PulseAudioComponent::with_spec(Arc::new(OsProcessSpawner), sleep_spec());
        pulse.start().unwrap();
        let first = pulse.pid().unwrap();
        pulse.start().unwrap();
        let second = pulse.pid().unwrap();

        assert_ne!(first, second);
        assert!(wait_until_dead(first));
        pulse.stop().unwrap();
        assert!(wait_until_dead(second));
        assert_eq!(pulse.pid(), None);
    }

    #[test]
    fn test_audio_server_restart_on_topology_change() {
        let server = AudioServerComponent::new(Arc::new(OsProcessSpawner), sleep_spec());
        server.stop().unwrap();
        server.start().unwrap();
        let first = server.pid().unwrap();
        server.start().unwrap();
        assert_eq!(server.pid(), Some(first));

        server.on_audio_topology_changed();
        let second = server.pid().unwrap();
        assert_ne!(first, second);
        assert!(wait_until_dead(first));
        server.stop().unwrap();
        assert!(wait_until_dead(second));
    }
}
