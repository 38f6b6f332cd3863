//! Environment and guest launcher against real processes.

mod common;

use std::sync::Arc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use serde_json::Map;
use winbox::util::process::is_process_alive;
use winbox::{
    AudioDeviceHub, ContainerManager, EnvVars, Environment, GuestLauncher, LauncherFlavor,
    environment::AudioDevice, launcher::COMMAND_OVERRIDE_ENV,
};

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

fn sleep_override() -> EnvVars {
    let mut overrides = EnvVars::new();
    overrides.put(COMMAND_OVERRIDE_ENV, "/bin/sleep;30");
    overrides
}

#[test]
fn environment_drives_guest_lifecycle() {
    let (_dir, options) = common::test_image();
    let manager = ContainerManager::new(options.clone()).unwrap();
    let container = manager.create_container("game", Map::new()).unwrap();

    let hub = AudioDeviceHub::new();
    let options = Arc::new(options);
    let environment = Environment::with_audio_monitor(options.clone(), &hub);
    let launcher = environment.add_component(
        GuestLauncher::new(LauncherFlavor::Bionic, options.clone(), container),
    );
    launcher.set_env_overrides(sleep_override());

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    launcher.set_termination_callback(Some(Arc::new(move |status| {
        tx.lock().unwrap().send(status).unwrap();
    })));

    environment.start().unwrap();
    let first = launcher.pid().unwrap();
    environment.pause();
    environment.resume();

    // Restart replaces the guest without reporting the old one
    launcher.start().unwrap();
    let second = launcher.pid().unwrap();
    assert_ne!(first, second);
    assert!(wait_until_dead(first));

    hub.devices_added(&[AudioDevice {
        id: 1,
        name: "speaker".into(),
        is_sink: true,
    }]);

    environment.stop();
    assert!(wait_until_dead(second));
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)).unwrap(), 128 + libc::SIGKILL);
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(launcher.pid(), None);

    // Launch recorded the installed translator version
    let saved = manager.find_by_id("game").unwrap().unwrap();
    let mut reloaded = saved.clone();
    reloaded.reload().unwrap();
    assert_eq!(reloaded.get_extra("box64Version", ""), "0.3.6");
}

#[test]
fn registered_launcher_follows_environment_aux_flag() {
    let (_dir, options) = common::test_image();
    let manager = ContainerManager::new(options.clone()).unwrap();
    let container = manager.create_container("tool", Map::new()).unwrap();

    let options = Arc::new(options);
    let environment = Environment::new(options.clone());
    let launcher =
        environment.add_component(GuestLauncher::new(LauncherFlavor::Bionic, options, container));
    launcher.set_env_overrides(sleep_override());

    let (tx, rx) = mpsc::channel();
    let tx = std::sync::Mutex::new(tx);
    launcher.set_termination_callback(Some(Arc::new(move |status| {
        tx.lock().unwrap().send(status).unwrap();
    })));

    environment.start().unwrap();
    let pid = launcher.pid().unwrap();
    environment.set_aux_tool_running(true);
    environment.stop();

    assert!(wait_until_dead(pid));
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err());
}
