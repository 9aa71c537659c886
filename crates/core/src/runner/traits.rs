//! Trait definitions for the runner module.

use async_trait::async_trait;

use super::error::RunnerError;
use super::types::{RunRequest, RunStatus};

/// Runs a test command against one nightly build.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Prepare the build described by `request` and run the command.
    ///
    /// A command that runs and exits, whatever its status, is `Ok`.
    async fn run(&self, request: &RunRequest) -> Result<RunStatus, RunnerError>;
}
