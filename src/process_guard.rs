//! Process lifecycle management for install subprocesses
//!
//! Install commands run in their own process group so that the whole tree
//! (`sh`, `npm`, `node-gyp`, the compiler) can be signalled at once, and each
//! child is tracked in a global registry so a quit can stop whatever is
//! still running.
//!
//! - Spawn children in their own process group with a parent-death signal
//! - Track all child PIDs in a global registry
//! - On abort, send SIGTERM to every group, then SIGKILL after a grace period
//! - The first termination signal asks the controller to quit; a second one
//!   kills the children and exits immediately

use nix::libc;
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::collections::HashSet;
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use crate::control::{ControlCommand, Event};

/// Global registry of child process IDs
static CHILD_REGISTRY: OnceLock<Arc<Mutex<ChildRegistry>>> = OnceLock::new();

/// Registry tracking all spawned child processes
#[derive(Debug, Default)]
pub struct ChildRegistry {
    /// Set of child PIDs currently running
    pids: HashSet<u32>,
    /// Whether cleanup has already been initiated (prevent double-cleanup)
    cleanup_initiated: bool,
}

impl ChildRegistry {
    /// Get or create the global child registry
    pub fn global() -> Arc<Mutex<ChildRegistry>> {
        CHILD_REGISTRY
            .get_or_init(|| Arc::new(Mutex::new(ChildRegistry::default())))
            .clone()
    }

    /// Register a child with the global registry.
    pub fn register_global(pid: u32) {
        Self::global()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .register(pid);
    }

    /// Remove a child from the global registry.
    pub fn unregister_global(pid: u32) {
        Self::global()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister(pid);
    }

    /// Register a new child process
    pub fn register(&mut self, pid: u32) {
        self.pids.insert(pid);
        tracing::debug!("Registered child process PID {}", pid);
    }

    /// Unregister a child process (called when it exits normally)
    pub fn unregister(&mut self, pid: u32) {
        self.pids.remove(&pid);
        tracing::debug!("Unregistered child process PID {}", pid);
    }

    /// Get count of tracked children
    pub fn count(&self) -> usize {
        self.pids.len()
    }

    /// Terminate all tracked child processes
    /// Sends SIGTERM first, waits up to `grace_period`, then SIGKILL
    pub fn terminate_all(&mut self, grace_period: Duration) {
        if self.cleanup_initiated {
            tracing::debug!("Cleanup already initiated, skipping");
            return;
        }
        self.cleanup_initiated = true;

        if self.pids.is_empty() {
            tracing::debug!("No child processes to terminate");
            return;
        }

        tracing::info!("Terminating {} child process(es)...", self.pids.len());

        let pids_to_kill: Vec<u32> = self.pids.iter().copied().collect();
        for &pid in &pids_to_kill {
            signal_group_or_process(pid, Signal::SIGTERM);
        }

        if wait_for_exit(&pids_to_kill, grace_period) {
            tracing::info!("All child processes terminated gracefully");
            self.pids.clear();
            return;
        }

        for &pid in &pids_to_kill {
            if is_process_alive(pid) {
                tracing::warn!("Process group {} did not terminate, sending SIGKILL", pid);
                signal_group_or_process(pid, Signal::SIGKILL);
            }
        }

        self.pids.clear();
        tracing::info!("Child process cleanup complete");
    }
}

/// Terminate one process group: SIGTERM, then SIGKILL after `grace_period`.
pub fn terminate_group(pid: u32, grace_period: Duration) {
    signal_group_or_process(pid, Signal::SIGTERM);
    if !wait_for_exit(&[pid], grace_period) {
        tracing::warn!("Process group {} did not terminate, sending SIGKILL", pid);
        signal_group_or_process(pid, Signal::SIGKILL);
    }
}

/// Signal the whole group, falling back to the leader alone.
fn signal_group_or_process(pid: u32, sig: Signal) {
    if let Err(e) = send_signal_to_group(pid, sig) {
        tracing::warn!("Failed to send {} to process group {}: {}", sig, pid, e);
        if let Err(e2) = send_signal(pid, sig) {
            tracing::warn!("Failed to send {} to PID {}: {}", sig, pid, e2);
        }
    } else {
        tracing::debug!("Sent {} to process group {}", sig, pid);
    }
}

/// Poll until every PID is gone or the grace period ends.
fn wait_for_exit(pids: &[u32], grace_period: Duration) -> bool {
    let start = Instant::now();
    loop {
        if pids.iter().all(|&pid| !is_process_alive(pid)) {
            return true;
        }
        if start.elapsed() >= grace_period {
            return false;
        }
        std::thread::sleep(Duration::from_millis(100));
    }
}

/// Send a signal to a process
fn send_signal(pid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(pid as i32), signal)
}

/// Send a signal to an entire process group
/// Uses negative PID to signal all processes in the group, so the package
/// manager's own children (node-gyp, compilers) receive it too
fn send_signal_to_group(pgid: u32, signal: Signal) -> Result<(), nix::Error> {
    signal::kill(Pid::from_raw(-(pgid as i32)), signal)
}

/// Check if a process is still alive (not dead or zombie)
fn is_process_alive(pid: u32) -> bool {
    if signal::kill(Pid::from_raw(pid as i32), None).is_err() {
        return false;
    }

    // Field 3 of /proc/pid/stat is the state; zombies are dead for our purposes
    if let Ok(stat) = std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        let fields: Vec<&str> = stat.split_whitespace().collect();
        if fields.len() > 2 {
            return !matches!(fields[2], "Z" | "X");
        }
    }

    // If we can't read /proc, assume alive (safe default)
    true
}

/// Turn SIGINT, SIGTERM and SIGHUP into quit requests
///
/// The first signal sends [`ControlCommand::Quit`] so the controller can
/// write the final snapshot. A second signal, or a signal after the
/// controller is gone, terminates all children and exits with `128 + sig`.
pub fn init_signal_handlers(events: Sender<Event>) -> Result<(), std::io::Error> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::thread;

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGHUP])?;

    thread::spawn(move || {
        let mut quit_requested = false;
        for sig in signals.forever() {
            let signal_name = match sig {
                SIGINT => "SIGINT",
                SIGTERM => "SIGTERM",
                SIGHUP => "SIGHUP",
                _ => "UNKNOWN",
            };

            if !quit_requested && events.send(Event::Command(ControlCommand::Quit)).is_ok() {
                tracing::info!("Received {} signal, finishing up...", signal_name);
                quit_requested = true;
                continue;
            }

            tracing::info!("Received {} signal again, exiting now", signal_name);
            ChildRegistry::global()
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .terminate_all(Duration::from_secs(3));
            crate::input::restore_terminal();
            std::process::exit(128 + sig);
        }
    });

    Ok(())
}

/// Extension trait for std::process::Command to set up process groups
pub trait CommandProcessGroup {
    /// Configure the command to run in its own process group
    /// This allows us to kill the entire process tree with a single signal
    fn in_new_process_group(&mut self) -> &mut Self;
}

impl CommandProcessGroup for std::process::Command {
    fn in_new_process_group(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt;
        unsafe {
            self.pre_exec(|| {
                // Leader of a new process group, PGID = child PID
                nix::unistd::setpgid(Pid::from_raw(0), Pid::from_raw(0))
                    .map_err(std::io::Error::other)?;

                // Die with the parent so a crashed sweep leaves no installs running
                if libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) == -1 {
                    return Err(std::io::Error::last_os_error());
                }

                Ok(())
            });
        }
        self
    }
}
