//! winbox: per-application execution environments for translated Windows
//! binaries.
//!
//! - [`ContainerManager`] discovers, creates, duplicates and removes
//!   containers on disk.
//! - [`Environment`] starts and stops the components a running container
//!   needs, including the [`GuestLauncher`] that supervises the guest process.

pub mod archive;
pub mod container;
pub mod environment;
pub mod errors;
pub mod launcher;
pub mod manager;
pub mod options;
pub mod registry;
pub mod runtime_info;
pub mod util;

pub use archive::{ArchiveExtractor, ArchiveKind, TarExtractor};
pub use container::{Container, ContainerConfig, ExtraValue, StartupSelection};
pub use environment::{
    AudioDeviceHub, AudioServerComponent, AuxToolFlag, Environment, EnvironmentComponent,
    PulseAudioComponent,
};
pub use errors::{WinboxError, WinboxResult};
pub use launcher::{
    EnvVars, GuestLauncher, LaunchSettings, LauncherFlavor, OsProcessSpawner, ProcessSpawner,
    SpawnSpec,
};
pub use manager::{CallbackQueue, ContainerManager, Shortcut};
pub use options::{LaunchPreferences, WinboxOptions};
pub use runtime_info::RuntimeInfo;

use std::sync::atomic::{AtomicBool, Ordering};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "winbox=info";
const LOG_FILE_NAME: &str = "winbox.log";

static LOGGING_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the default `winbox=info` filter. With
/// `options.log_dir` set, output goes to a daily rolling file and the
/// returned guard must be kept alive to flush it. Only the first call has
/// any effect; later calls return `None`.
pub fn init_logging(options: &WinboxOptions) -> Option<WorkerGuard> {
    if LOGGING_INITIALIZED.swap(true, Ordering::SeqCst) {
        return None;
    }

    let filter = || {
        EnvFilter::builder().parse_lossy(
            std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_owned()),
        )
    };

    match &options.log_dir {
        Some(log_dir) => {
            let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let installed = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(true)
                .with_ansi(false)
                .with_writer(non_blocking)
                .try_init()
                .is_ok();
            if installed {
                tracing::info!(log_dir = %log_dir.display(), "File logging enabled");
            }
            Some(guard)
        }
        None => {
            // Another subscriber may already be installed by the host
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter())
                .with_target(true)
                .try_init();
            None
        }
    }
}
