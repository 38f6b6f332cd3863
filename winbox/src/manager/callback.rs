//! Completion queue for background registry work.
//!
//! Workers post closures; the thread that started the work drains them, so
//! callbacks always run on the caller's own thread.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

type Task = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct Shared {
    tasks: Mutex<VecDeque<Task>>,
    ready: Condvar,
}

/// A message queue owned by one thread.
#[derive(Clone, Default)]
pub struct CallbackQueue {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("pending", &self.shared.tasks.lock().len())
            .finish()
    }
}

impl CallbackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a callback. Safe to call from any thread.
    pub fn post(&self, task: impl FnOnce() + Send + 'static) {
        self.shared.tasks.lock().push_back(Box::new(task));
        self.shared.ready.notify_all();
    }

    pub fn pending(&self) -> usize {
        self.shared.tasks.lock().len()
    }

    /// Run every callback queued so far. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<Task> = self.shared.tasks.lock().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        count
    }

    /// Block until a callback is queued or `timeout` passes, then run
    /// everything pending.
    pub fn wait_and_run(&self, timeout: Duration) -> usize {
        let deadline = Instant::now() + timeout;
        {
            let mut tasks = self.shared.tasks.lock();
            while tasks.is_empty() {
                if self.shared.ready.wait_until(&mut tasks, deadline).timed_out() {
                    break;
                }
            }
        }
        self.run_pending()
    }
}
