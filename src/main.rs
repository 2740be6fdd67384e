//! native-sweep - main entry point
//!
//! Loads the package list, wires the runner, snapshot writer, failure log
//! and keyboard controller together, then hands control to the controller
//! until the user quits (or the queue drains with `--exit-on-drain`).

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::sync::Arc;
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

use native_sweep::cli::Cli;
use native_sweep::console::{Console, RawSafe};
use native_sweep::control::{self, Controller};
use native_sweep::environment::RunConfig;
use native_sweep::failure_log::FailureLog;
use native_sweep::input::{self, RawModeGuard};
use native_sweep::installer::ShellInstaller;
use native_sweep::runner::Runner;
use native_sweep::snapshot::{PeriodicSnapshot, SnapshotWriter};
use native_sweep::store::ResultStore;
use native_sweep::{package_list, process_guard, resume};

/// Initialize tracing; `RUST_LOG` overrides the verbosity flag
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(|| RawSafe(std::io::stderr()))
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.log_level());
    let config = cli.to_config()?;
    tracing::debug!("Configuration: {:?}", config);

    let console = Console::stdout();

    let packages = package_list::load(&config.packages_path)
        .context("Cannot start without a package list")?;
    console.line(format!("Number of native modules: {}", packages.len()));

    let run_config = RunConfig::detect(&config.runtime);
    let store = Arc::new(ResultStore::new());

    let packages = if config.resume {
        resume::resume_from(&config.results_path, &store, packages, &run_config)
            .with_context(|| format!("Cannot resume from {}", config.results_path.display()))?
    } else {
        packages
    };

    let (events_tx, events_rx) = mpsc::channel();

    if let Err(e) = process_guard::init_signal_handlers(events_tx.clone()) {
        tracing::warn!("Failed to initialize signal handlers: {}", e);
    }

    let raw_mode = if std::io::stdin().is_terminal() {
        match RawModeGuard::enable() {
            Ok(guard) => {
                input::spawn_key_reader(events_tx.clone());
                console.line(control::key_help_line());
                Some(guard)
            }
            Err(e) => {
                tracing::warn!("Keyboard commands unavailable: {}", e);
                None
            }
        }
    } else {
        None
    };

    let writer = SnapshotWriter::new(
        &config.results_path,
        run_config,
        store.clone(),
        console.clone(),
    );
    let failure_log = Arc::new(FailureLog::new(&config.log_path, console.clone()));
    let installer = Arc::new(ShellInstaller::new(config.command.clone(), config.timeout));
    let periodic = Arc::new(PeriodicSnapshot::new(
        config.batch_size,
        writer.clone(),
        console.clone(),
    ));

    let recorded = store.len();
    let run = Runner::new(installer, store.clone(), failure_log, console.clone())
        .jobs(config.jobs)
        .already_recorded(recorded)
        .hook(periodic)
        .start(packages, events_tx);

    // Without a keyboard nobody can press Ctrl+C after the queue drains.
    let mut controller = Controller::new(store, writer, console)
        .with_run(run)
        .quit_grace(config.quit_grace)
        .exit_on_drain(config.exit_on_drain || raw_mode.is_none());
    controller.run(&events_rx);

    drop(raw_mode);
    Ok(())
}
