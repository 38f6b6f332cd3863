//! Signal helpers for guest and helper processes.
//!
//! Every function treats a pid that no longer exists as success: killing or
//! pausing a process that already exited is a no-op.

use sysinfo::{Pid, System};

/// Kill a process with SIGKILL.
///
/// # Returns
/// * `true` - Process was killed or doesn't exist
/// * `false` - Failed to kill (permission denied)
pub fn kill_process(pid: u32) -> bool {
    send_signal(pid, libc::SIGKILL)
}

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
/// Zombies still count as alive until reaped.
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Stop a process with SIGSTOP.
pub fn suspend_process(pid: u32) -> bool {
    send_signal(pid, libc::SIGSTOP)
}

/// Continue a stopped process with SIGCONT.
pub fn resume_process(pid: u32) -> bool {
    send_signal(pid, libc::SIGCONT)
}

fn send_signal(pid: u32, signal: libc::c_int) -> bool {
    // pid 0 and values wrapping to negative address process groups
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    unsafe { libc::kill(pid as i32, signal) == 0 || !is_process_alive(pid) }
}

/// List every descendant of `pid`, children first.
pub fn list_sub_processes(pid: u32) -> Vec<u32> {
    let mut sys = System::new();
    sys.refresh_processes();

    let mut descendants = Vec::new();
    let mut frontier = vec![Pid::from_u32(pid)];
    while let Some(parent) = frontier.pop() {
        for (child_pid, process) in sys.processes() {
            if process.parent() == Some(parent) && !descendants.contains(&child_pid.as_u32()) {
                descendants.push(child_pid.as_u32());
                frontier.push(*child_pid);
            }
        }
    }
    descendants
}

/// Kill `pid` and every process it spawned.
///
/// Descendants are collected before the parent dies so reparented
/// grandchildren are still found.
pub fn kill_process_tree(pid: u32) {
    let children = list_sub_processes(pid);
    kill_process(pid);
    for child in children {
        if !kill_process(child) {
            tracing::warn!(pid = child, "Failed to kill sub-process");
        }
    }
}
