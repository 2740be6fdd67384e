//! Interactive control surface
//!
//! Keyboard input, termination signals and the runner's drain notification
//! all arrive as [`Event`]s on one channel. The [`Controller`] reacts to them
//! on its own thread, so printing a summary or writing the results file
//! never holds up install dispatch.
//!
//! | Key      | Command                    |
//! |----------|----------------------------|
//! | `p`      | print the summary          |
//! | `w`      | write results, print summary |
//! | `Ctrl+C` | finish up and quit         |

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::console::Console;
use crate::runner::RunHandle;
use crate::snapshot::SnapshotWriter;
use crate::store::ResultStore;

/// How often the controller checks on a pending quit
const TICK: Duration = Duration::from_millis(100);

/// Commands a user can issue while the queue runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlCommand {
    /// Print the current summary
    PrintSummary,
    /// Write the results file and print the summary
    WriteSnapshot,
    /// Stop dispatching, write the results file, print the summary, exit
    Quit,
}

impl ControlCommand {
    /// Map a key press to a command. Releases and unbound keys map to nothing.
    pub fn from_key(key: &KeyEvent) -> Option<Self> {
        if key.kind == KeyEventKind::Release {
            return None;
        }
        match key.code {
            KeyCode::Char('c') | KeyCode::Char('C')
                if key.modifiers.contains(KeyModifiers::CONTROL) =>
            {
                Some(Self::Quit)
            }
            KeyCode::Char('p') | KeyCode::Char('P') => Some(Self::PrintSummary),
            KeyCode::Char('w') | KeyCode::Char('W') => Some(Self::WriteSnapshot),
            _ => None,
        }
    }
}

/// Key hints shown when the keyboard is live
pub const KEY_HELP: &[(&str, &str)] = &[
    ("p", "print summary"),
    ("w", "write results and print summary"),
    ("Ctrl+C", "write results, print summary and quit"),
];

/// Format [`KEY_HELP`] as one line.
pub fn key_help_line() -> String {
    let keys: Vec<String> = KEY_HELP
        .iter()
        .map(|(key, action)| format!("{} = {}", key, action))
        .collect();
    format!("Keys: {}", keys.join(", "))
}

/// Everything the controller reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Command(ControlCommand),
    /// The runner finished every queued job
    Drained,
}

/// Whether the controller wants to keep going
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Reacts to control events against the shared result store
pub struct Controller {
    store: Arc<ResultStore>,
    writer: SnapshotWriter,
    console: Console,
    run: Option<RunHandle>,
    quit_grace: Duration,
    exit_on_drain: bool,
    /// Set once a quit is waiting for in-flight installs
    quitting_since: Option<Instant>,
}

impl Controller {
    pub fn new(store: Arc<ResultStore>, writer: SnapshotWriter, console: Console) -> Self {
        Self {
            store,
            writer,
            console,
            run: None,
            quit_grace: Duration::from_secs(30),
            exit_on_drain: false,
            quitting_since: None,
        }
    }

    /// Attach the run that Quit should stop.
    pub fn with_run(mut self, run: RunHandle) -> Self {
        self.run = Some(run);
        self
    }

    /// How long Quit waits for in-flight installs before terminating them.
    pub fn quit_grace(mut self, grace: Duration) -> Self {
        self.quit_grace = grace;
        self
    }

    /// Exit after the final drain report instead of waiting for Quit.
    pub fn exit_on_drain(mut self, exit: bool) -> Self {
        self.exit_on_drain = exit;
        self
    }

    pub fn is_quitting(&self) -> bool {
        self.quitting_since.is_some()
    }

    /// React to one event.
    pub fn handle(&mut self, event: Event) -> Flow {
        match event {
            Event::Command(ControlCommand::PrintSummary) => {
                self.print_summary();
                Flow::Continue
            }
            Event::Command(ControlCommand::WriteSnapshot) => {
                self.writer.write_or_report();
                self.print_summary();
                Flow::Continue
            }
            Event::Command(ControlCommand::Quit) => self.quit(),
            Event::Drained => self.drained(),
        }
    }

    /// Periodic check while a quit waits for in-flight installs.
    pub fn tick(&mut self) -> Flow {
        let Some(since) = self.quitting_since else {
            return Flow::Continue;
        };
        let idle = self.run.as_ref().is_none_or(RunHandle::is_idle);
        if idle {
            return self.finish();
        }
        if since.elapsed() >= self.quit_grace {
            self.abort_in_flight();
            return self.finish();
        }
        Flow::Continue
    }

    /// Process events until the controller decides to exit.
    ///
    /// If every sender goes away the controller quits on its own.
    pub fn run(&mut self, events: &Receiver<Event>) {
        let mut connected = true;
        loop {
            let flow = if connected {
                match events.recv_timeout(TICK) {
                    Ok(event) => self.handle(event),
                    Err(RecvTimeoutError::Timeout) => self.tick(),
                    Err(RecvTimeoutError::Disconnected) => {
                        tracing::debug!("All event sources closed, quitting");
                        connected = false;
                        self.handle(Event::Command(ControlCommand::Quit))
                    }
                }
            } else {
                std::thread::sleep(TICK);
                self.tick()
            };

            if flow == Flow::Exit {
                return;
            }
        }
    }

    fn quit(&mut self) -> Flow {
        if self.is_quitting() {
            // Second request: stop waiting.
            self.abort_in_flight();
            return self.finish();
        }

        let Some(run) = &self.run else {
            return self.finish();
        };
        run.cancel();
        if run.is_idle() {
            return self.finish();
        }

        self.console.line(format!(
            "Waiting up to {}s for {} running install(s); press Ctrl+C again to stop them now",
            self.quit_grace.as_secs(),
            run.in_flight()
        ));
        self.quitting_since = Some(Instant::now());
        Flow::Continue
    }

    fn drained(&mut self) -> Flow {
        if self.is_quitting() {
            return self.finish();
        }
        self.writer.write_or_report();
        self.print_summary();
        if self.exit_on_drain {
            Flow::Exit
        } else {
            self.console.line("All packages processed. Press Ctrl+C to quit.");
            Flow::Continue
        }
    }

    fn abort_in_flight(&self) {
        if let Some(run) = &self.run {
            self.console.line(format!(
                "Stopping {} running install(s)",
                run.in_flight()
            ));
            run.abort();
        }
    }

    /// Final snapshot and summary.
    fn finish(&mut self) -> Flow {
        self.quitting_since = None;
        self.writer.write_or_report();
        self.print_summary();
        Flow::Exit
    }

    fn print_summary(&self) {
        self.console.block(self.store.summarize().to_string());
    }
}
