//! Run environment capture
//!
//! Records the runtime and OS the packages were built against. Captured once
//! at startup and embedded in every results snapshot.
//!
//! # Design
//!
//! - **Never fails**: a runtime that is missing or prints nothing is recorded
//!   as `unknown` rather than aborting the run
//! - **Runtime naming**: architecture and platform use the package ecosystem's
//!   names (`x64`, `arm64`, `darwin`, `win32`), not Rust's target constants

use serde::{Deserialize, Serialize};
use std::fmt;
use std::process::{Command, Stdio};

/// Placeholder for values that could not be detected
pub const UNKNOWN: &str = "unknown";

/// Environment block of the results file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(rename = "node-version")]
    pub runtime_version: String,
    #[serde(rename = "node-arch")]
    pub runtime_arch: String,
    #[serde(rename = "os-arch")]
    pub os_arch: String,
    #[serde(rename = "os-plat")]
    pub os_platform: String,
    #[serde(rename = "os-release")]
    pub os_release: String,
}

impl RunConfig {
    /// Detect the environment using `runtime` as the package runtime binary.
    ///
    /// Runs `<runtime> --version` and `<runtime> -p process.arch` once each.
    pub fn detect(runtime: &str) -> Self {
        let runtime_version = query_runtime(runtime, &["--version"]);
        let runtime_arch = query_runtime(runtime, &["-p", "process.arch"]);

        let config = Self {
            runtime_version,
            runtime_arch,
            os_arch: runtime_arch_name(std::env::consts::ARCH).to_string(),
            os_platform: runtime_platform_name(std::env::consts::OS).to_string(),
            os_release: detect_os_release(),
        };

        tracing::info!("Environment detection: {}", config);
        config
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "runtime {} ({}), {} {} ({})",
            self.runtime_version, self.runtime_arch, self.os_platform, self.os_release, self.os_arch
        )
    }
}

// ============================================================================
// Detection Functions
// ============================================================================

/// Run the runtime binary and return its trimmed stdout, or `unknown`.
fn query_runtime(runtime: &str, args: &[&str]) -> String {
    let output = Command::new(runtime)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output();

    match output {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if text.is_empty() {
                UNKNOWN.to_string()
            } else {
                text
            }
        }
        Ok(output) => {
            tracing::warn!(
                "{} {:?} exited with {:?}, recording '{}'",
                runtime,
                args,
                output.status.code(),
                UNKNOWN
            );
            UNKNOWN.to_string()
        }
        Err(e) => {
            tracing::warn!("Failed to run {} {:?}: {}", runtime, args, e);
            UNKNOWN.to_string()
        }
    }
}

/// Kernel release as reported by `uname -r`.
fn detect_os_release() -> String {
    match nix::sys::utsname::uname() {
        Ok(uts) => uts.release().to_string_lossy().into_owned(),
        Err(e) => {
            tracing::warn!("uname failed: {}", e);
            UNKNOWN.to_string()
        }
    }
}

/// Map a Rust `target_arch` to the runtime's architecture name.
pub fn runtime_arch_name(arch: &str) -> &str {
    match arch {
        "x86_64" => "x64",
        "x86" => "ia32",
        "aarch64" => "arm64",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        other => other,
    }
}

/// Map a Rust `target_os` to the runtime's platform name.
pub fn runtime_platform_name(os: &str) -> &str {
    match os {
        "macos" => "darwin",
        "windows" => "win32",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_names() {
        assert_eq!(runtime_arch_name("x86_64"), "x64");
        assert_eq!(runtime_arch_name("aarch64"), "arm64");
        assert_eq!(runtime_arch_name("x86"), "ia32");
        assert_eq!(runtime_arch_name("arm"), "arm");
    }

    #[test]
    fn test_platform_names() {
        assert_eq!(runtime_platform_name("linux"), "linux");
        assert_eq!(runtime_platform_name("macos"), "darwin");
        assert_eq!(runtime_platform_name("windows"), "win32");
    }

    #[test]
    fn test_serialized_keys() {
        let config = RunConfig {
            runtime_version: "v4.4.7".into(),
            runtime_arch: "x64".into(),
            os_arch: "x64".into(),
            os_platform: "linux".into(),
            os_release: "6.1.0".into(),
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"node-version":"v4.4.7","node-arch":"x64","os-arch":"x64","os-plat":"linux","os-release":"6.1.0"}"#
        );
    }

    #[test]
    fn test_missing_runtime_is_unknown() {
        let config = RunConfig::detect("definitely-not-a-runtime-binary");
        assert_eq!(config.runtime_version, UNKNOWN);
        assert_eq!(config.runtime_arch, UNKNOWN);
        assert!(!config.os_release.is_empty());
    }
}
