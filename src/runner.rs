//! Bounded-concurrency install queue
//!
//! `jobs` worker threads pull package identifiers from a shared FIFO in load
//! order. Each finished install is classified, appended to the result store,
//! logged if it is an unrecognised failure, counted, and handed to the
//! completion hooks. A coordinator thread joins the workers and reports
//! [`Event::Drained`] once nothing is pending or in flight.
//!
//! # Cancellation
//!
//! - [`RunHandle::cancel`] stops dispatch; installs already running finish
//!   and are recorded normally.
//! - [`RunHandle::abort`] additionally terminates running installs. Their
//!   results are discarded rather than recorded as failures.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::classifier::{Classification, classify};
use crate::console::Console;
use crate::control::Event;
use crate::failure_log::FailureLog;
use crate::installer::PackageInstaller;
use crate::process_guard::ChildRegistry;
use crate::store::ResultStore;
use crate::types::{JobRecord, OutcomeKind};

/// Grace period for installs terminated by an abort
const ABORT_GRACE: Duration = Duration::from_secs(3);

/// Observer called after every recorded job
///
/// `completed` is the progress counter after this job, starting at 1.
pub trait CompletionHook: Send + Sync {
    fn on_complete(&self, completed: usize, record: &JobRecord);
}

/// Queue state guarded by one lock so that taking a job and counting it as
/// in flight happen together
#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<String>,
    in_flight: usize,
    cancelled: bool,
}

impl QueueState {
    fn is_idle(&self) -> bool {
        self.in_flight == 0 && (self.pending.is_empty() || self.cancelled)
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    idle: Condvar,
    total: usize,
    completed: AtomicUsize,
    aborted: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the next package, counting it as in flight.
    fn next_job(&self) -> Option<String> {
        let mut state = self.lock();
        if state.cancelled {
            return None;
        }
        let package = state.pending.pop_front()?;
        state.in_flight += 1;
        Some(package)
    }
}

/// Marks one job as finished when dropped, even if the install panicked
struct InFlight<'a>(&'a Shared);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut state = self.0.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        self.0.idle.notify_all();
    }
}

/// Everything a worker needs to process one job
struct Worker {
    shared: Arc<Shared>,
    installer: Arc<dyn PackageInstaller>,
    store: Arc<ResultStore>,
    failure_log: Arc<FailureLog>,
    console: Console,
    hooks: Vec<Arc<dyn CompletionHook>>,
}

impl Worker {
    fn run(&self) {
        while let Some(package) = self.shared.next_job() {
            let _in_flight = InFlight(&self.shared);
            self.process(&package);
        }
    }

    fn process(&self, package: &str) {
        let command = self.installer.command_for(package);
        let output = self.installer.install(&command);

        if self.shared.aborted.load(Ordering::SeqCst) {
            tracing::debug!("Discarding result for {} after abort", package);
            return;
        }

        // A cut-off install never counts as a known issue.
        let classification = if output.timed_out {
            Classification::failed()
        } else {
            classify(output.error, &output.stdout, &output.stderr)
        };
        if let Some((issue, stream)) = classification.signature {
            tracing::debug!("{}: known issue '{}' in {:?}", package, issue.label, stream);
        }

        let record = JobRecord::from_classification(
            package,
            command,
            output.stdout,
            output.stderr,
            &classification,
        );
        self.store.append(record.clone());

        if record.result == OutcomeKind::Failed {
            self.failure_log
                .append(&record.cmd, &record.stderr, &record.stdout);
        }

        let completed = self.shared.completed.fetch_add(1, Ordering::SeqCst) + 1;
        self.console
            .line(format!("{}/{}: {}", completed, self.shared.total, record.cmd));

        for hook in &self.hooks {
            hook.on_complete(completed, &record);
        }
    }
}

/// Builder for a run over a list of packages
pub struct Runner {
    jobs: usize,
    recorded: usize,
    installer: Arc<dyn PackageInstaller>,
    store: Arc<ResultStore>,
    failure_log: Arc<FailureLog>,
    console: Console,
    hooks: Vec<Arc<dyn CompletionHook>>,
}

impl Runner {
    /// A runner with one worker and no hooks.
    pub fn new(
        installer: Arc<dyn PackageInstaller>,
        store: Arc<ResultStore>,
        failure_log: Arc<FailureLog>,
        console: Console,
    ) -> Self {
        Self {
            jobs: 1,
            recorded: 0,
            installer,
            store,
            failure_log,
            console,
            hooks: Vec::new(),
        }
    }

    /// Maximum number of concurrent installs, at least 1.
    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Count `recorded` earlier results towards progress, so a resumed run
    /// numbers its jobs against the whole package list.
    pub fn already_recorded(mut self, recorded: usize) -> Self {
        self.recorded = recorded;
        self
    }

    /// Add a completion hook. Hooks run in the order they were added.
    pub fn hook(mut self, hook: Arc<dyn CompletionHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Queue `packages` and start the workers.
    ///
    /// `events` receives [`Event::Drained`] when the queue empties, unless
    /// the run was cancelled first.
    pub fn start(self, packages: Vec<String>, events: Sender<Event>) -> RunHandle {
        let queued = packages.len();
        let total = self.recorded + queued;
        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                pending: packages.into(),
                ..Default::default()
            }),
            idle: Condvar::new(),
            total,
            completed: AtomicUsize::new(self.recorded),
            aborted: AtomicBool::new(false),
        });

        let worker = Arc::new(Worker {
            shared: shared.clone(),
            installer: self.installer,
            store: self.store,
            failure_log: self.failure_log,
            console: self.console,
            hooks: self.hooks,
        });

        let workers = self.jobs.min(queued);
        tracing::info!("Starting {} worker(s) for {} package(s)", workers, queued);

        let handles: Vec<JoinHandle<()>> = (0..workers)
            .map(|_| {
                let worker = worker.clone();
                thread::spawn(move || worker.run())
            })
            .collect();

        let coordinator_shared = shared.clone();
        thread::spawn(move || {
            for handle in handles {
                if handle.join().is_err() {
                    tracing::error!("An install worker panicked");
                }
            }
            if coordinator_shared.lock().cancelled {
                tracing::debug!("Run cancelled, not reporting drain");
                return;
            }
            tracing::info!("Install queue drained");
            if events.send(Event::Drained).is_err() {
                tracing::debug!("Controller gone before the queue drained");
            }
        });

        RunHandle { shared }
    }
}

/// Control handle for a started run
#[derive(Debug, Clone)]
pub struct RunHandle {
    shared: Arc<Shared>,
}

impl RunHandle {
    /// Stop dispatching new installs.
    pub fn cancel(&self) {
        let mut state = self.shared.lock();
        if !state.cancelled {
            tracing::info!(
                "Cancelling run: {} pending, {} in flight",
                state.pending.len(),
                state.in_flight
            );
            state.cancelled = true;
        }
        self.shared.idle.notify_all();
    }

    /// Wait until nothing is in flight and nothing more will start.
    ///
    /// Returns false if `timeout` passed first.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let state = self.shared.lock();
        let (state, _) = self
            .shared
            .idle
            .wait_timeout_while(state, timeout, |s| !s.is_idle())
            .unwrap_or_else(PoisonError::into_inner);
        state.is_idle()
    }

    /// Whether the run is idle right now.
    pub fn is_idle(&self) -> bool {
        self.shared.lock().is_idle()
    }

    /// Cancel, then terminate every running install and discard its result.
    pub fn abort(&self) {
        self.shared.aborted.store(true, Ordering::SeqCst);
        self.cancel();
        ChildRegistry::global()
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .terminate_all(ABORT_GRACE);
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.lock().cancelled
    }

    /// Jobs recorded so far.
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Size of the whole package list, including earlier results.
    pub fn total(&self) -> usize {
        self.shared.total
    }

    pub fn in_flight(&self) -> usize {
        self.shared.lock().in_flight
    }
}
