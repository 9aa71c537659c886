//! Types for the runner module.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Exit code a test command uses to say the build cannot be tested.
pub const UNTESTABLE_EXIT_CODE: i32 = 125;

/// Environment variable holding the path of the extracted runtime binary.
pub const BINARY_ENV: &str = "NIGHTLY_BISECT_BINARY";

/// One test run of one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Full nightly version string.
    pub version: String,
    /// Target matched from the build's file list.
    pub target: String,
    /// Program to run. `None` runs the extracted runtime binary itself.
    pub command: Option<String>,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Directory the build is extracted into.
    pub scratch_dir: PathBuf,
}

impl RunRequest {
    /// Human readable form of the command line, for logs.
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.command.clone().unwrap_or_else(|| "<runtime>".to_string())];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// How the test command exited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    /// Exit code, if the process exited normally.
    pub exit_code: Option<i32>,
    /// Signal number, if the process was terminated by a signal.
    pub signal: Option<i32>,
}

impl RunStatus {
    pub fn exited(code: i32) -> Self {
        Self {
            exit_code: Some(code),
            signal: None,
        }
    }

    pub fn signaled(signal: i32) -> Self {
        Self {
            exit_code: None,
            signal: Some(signal),
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.exit_code, self.signal) {
            (_, Some(signal)) => write!(f, "terminated by signal {}", signal),
            (Some(code), None) => write!(f, "exit code {}", code),
            (None, None) => write!(f, "no exit code"),
        }
    }
}

impl From<std::process::ExitStatus> for RunStatus {
    fn from(status: std::process::ExitStatus) -> Self {
        #[cfg(unix)]
        let signal = {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        };
        #[cfg(not(unix))]
        let signal = None;

        Self {
            exit_code: status.code(),
            signal,
        }
    }
}
