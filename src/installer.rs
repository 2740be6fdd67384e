//! Install command execution
//!
//! This module provides the seam between the job runner and the package
//! manager. The runner only knows the [`PackageInstaller`] trait; the
//! [`ShellInstaller`] implementation runs the rendered command through
//! `sh -c`, the same way a user would type it.
//!
//! # Failure Modes
//!
//! None of these escape as errors. Each becomes an [`InstallOutput`] with
//! `error = true` so the classifier can record it:
//!
//! - Spawn failure: the spawn error text is reported as stderr
//! - Non-zero exit or death by signal: captured output as-is
//! - Timeout: the process group is terminated and a note is appended to stderr

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::error::{Result, SweepError};
use crate::process_guard::{ChildRegistry, CommandProcessGroup, terminate_group};

/// Placeholder replaced by the package identifier
pub const PACKAGE_PLACEHOLDER: &str = "{package}";

/// Install command used when none is configured
pub const DEFAULT_COMMAND: &str = "npm install {package} --msvs_version=2015 --loglevel error";

/// How often a running install is polled when a timeout is set
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Grace period between SIGTERM and SIGKILL for a timed-out install
const KILL_GRACE: Duration = Duration::from_secs(5);

/// Shell command template with a `{package}` placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    template: String,
}

impl CommandTemplate {
    /// Validate a template. It must mention `{package}` at least once.
    pub fn parse(template: impl Into<String>) -> Result<Self> {
        let template = template.into();
        if !template.contains(PACKAGE_PLACEHOLDER) {
            return Err(SweepError::config(format!(
                "command template '{}' has no {} placeholder",
                template, PACKAGE_PLACEHOLDER
            )));
        }
        Ok(Self { template })
    }

    /// The command line for one package.
    pub fn render(&self, package: &str) -> String {
        self.template.replace(PACKAGE_PLACEHOLDER, package)
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }
}

impl Default for CommandTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_COMMAND.to_string(),
        }
    }
}

/// What an install attempt produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallOutput {
    /// The command failed to launch, exited non-zero, was killed, or timed out
    pub error: bool,
    /// Standard output from the install.
    pub stdout: String,
    /// Standard error from the install.
    pub stderr: String,
    /// The install was terminated for running past its timeout
    pub timed_out: bool,
}

impl InstallOutput {
    pub fn success(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            error: false,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    pub fn failure(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            error: true,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
        }
    }

    /// A failure whose output stopped at the timeout; never a known issue.
    pub fn timeout(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            timed_out: true,
            ..Self::failure(stdout, stderr)
        }
    }
}

/// Something that can install a package and report what happened.
///
/// # Contract
///
/// - `command_for()` returns the exact command line recorded for the package.
/// - `install()` runs to completion and never panics on a failed install;
///   every failure is reported through `InstallOutput::error`.
pub trait PackageInstaller: Send + Sync {
    /// Command line used to install `package`.
    fn command_for(&self, package: &str) -> String;

    /// Run a command line produced by `command_for`.
    fn install(&self, command: &str) -> InstallOutput;
}

/// Runs install commands through `sh -c`
#[derive(Debug, Clone, Default)]
pub struct ShellInstaller {
    template: CommandTemplate,
    timeout: Option<Duration>,
}

impl ShellInstaller {
    pub fn new(template: CommandTemplate, timeout: Option<Duration>) -> Self {
        Self { template, timeout }
    }
}

impl PackageInstaller for ShellInstaller {
    fn command_for(&self, package: &str) -> String {
        self.template.render(package)
    }

    fn install(&self, command: &str) -> InstallOutput {
        tracing::debug!("Spawning install: {}", command);

        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .in_new_process_group();

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!("Failed to spawn '{}': {}", command, e);
                return InstallOutput::failure(
                    "",
                    format!("failed to launch install command: {}", e),
                );
            }
        };

        let pid = child.id();
        ChildRegistry::register_global(pid);

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let waited = wait_for(&mut child, pid, self.timeout);

        ChildRegistry::unregister_global(pid);

        let stdout = stdout.join().unwrap_or_default();
        let mut stderr = stderr.join().unwrap_or_default();

        match waited {
            Waited::Exited(status) => {
                tracing::debug!("'{}' exited with {:?}", command, status.code());
                InstallOutput {
                    error: !status.success(),
                    stdout,
                    stderr,
                    timed_out: false,
                }
            }
            Waited::TimedOut(limit) => {
                tracing::warn!("'{}' timed out after {:?}", command, limit);
                if !stderr.is_empty() && !stderr.ends_with('\n') {
                    stderr.push('\n');
                }
                stderr.push_str(&format!(
                    "install timed out after {} seconds and was terminated",
                    limit.as_secs()
                ));
                InstallOutput::timeout(stdout, stderr)
            }
            Waited::Failed(e) => {
                tracing::warn!("Failed waiting for '{}': {}", command, e);
                stderr.push_str(&format!("failed waiting for install command: {}", e));
                InstallOutput::failure(stdout, stderr)
            }
        }
    }
}

enum Waited {
    Exited(ExitStatus),
    TimedOut(Duration),
    Failed(std::io::Error),
}

/// Wait for the child, terminating its group if `timeout` passes first.
fn wait_for(child: &mut Child, pid: u32, timeout: Option<Duration>) -> Waited {
    let Some(limit) = timeout else {
        return match child.wait() {
            Ok(status) => Waited::Exited(status),
            Err(e) => Waited::Failed(e),
        };
    };

    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Waited::Exited(status),
            Ok(None) if start.elapsed() >= limit => {
                terminate_group(pid, KILL_GRACE);
                // Reap the leader; its status no longer matters.
                let _ = child.wait();
                return Waited::TimedOut(limit);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => return Waited::Failed(e),
        }
    }
}

/// Read a pipe to the end on its own thread so a chatty install cannot
/// fill one pipe while we block on the other.
fn drain<R: Read + Send + 'static>(stream: Option<R>) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut bytes = Vec::new();
        if let Some(mut stream) = stream {
            if let Err(e) = stream.read_to_end(&mut bytes) {
                tracing::debug!("Error reading install output: {}", e);
            }
        }
        String::from_utf8_lossy(&bytes).into_owned()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_requires_placeholder() {
        let err = CommandTemplate::parse("npm install").unwrap_err();
        assert!(matches!(err, SweepError::Config(_)));
    }

    #[test]
    fn test_default_template_renders_original_command() {
        let template = CommandTemplate::default();
        assert_eq!(
            template.render("bcrypt"),
            "npm install bcrypt --msvs_version=2015 --loglevel error"
        );
    }

    #[test]
    fn test_template_replaces_every_placeholder() {
        let template = CommandTemplate::parse("echo {package} && echo {package}").unwrap();
        assert_eq!(template.render("x"), "echo x && echo x");
    }

    #[test]
    fn test_shell_success_captures_streams() {
        let installer = ShellInstaller::new(
            CommandTemplate::parse("echo out-{package}; echo err-{package} >&2").unwrap(),
            None,
        );
        let output = installer.install(&installer.command_for("a"));
        assert!(!output.error);
        assert_eq!(output.stdout, "out-a\n");
        assert_eq!(output.stderr, "err-a\n");
    }

    #[test]
    fn test_shell_nonzero_exit_is_error() {
        let installer = ShellInstaller::default();
        let output = installer.install("echo boom >&2; exit 3");
        assert!(output.error);
        assert!(!output.timed_out);
        assert_eq!(output.stderr, "boom\n");
    }

    #[test]
    fn test_shell_unknown_command_is_error() {
        let installer = ShellInstaller::default();
        let output = installer.install("definitely-not-a-package-manager install x");
        assert!(output.error);
        assert!(!output.stderr.is_empty());
    }

    #[test]
    fn test_shell_timeout_is_error_with_note() {
        let installer = ShellInstaller::new(CommandTemplate::default(), Some(Duration::from_secs(1)));
        let start = Instant::now();
        let output = installer.install("echo started; sleep 30");
        assert!(output.error);
        assert!(output.timed_out);
        assert!(output.stdout.contains("started"));
        assert!(output.stderr.contains("timed out after 1 seconds"));
        assert!(start.elapsed() < Duration::from_secs(20));
    }
}
