//! Mock build runner for testing.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::runner::{BuildRunner, RunRequest, RunStatus, RunnerError};

/// A recorded run for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedRun {
    /// The request that was submitted.
    pub request: RunRequest,
    /// The status that was reported.
    pub status: RunStatus,
}

/// Mock implementation of the BuildRunner trait.
///
/// Provides controllable behavior for testing:
/// - Per-build exit status, matched by a substring of the version (usually
///   the commit)
/// - A default status for unlisted builds
/// - Simulated failures
/// - Recorded runs, in order
#[derive(Debug)]
pub struct MockBuildRunner {
    /// Version substring to status, checked in insertion order.
    statuses: Arc<RwLock<Vec<(String, RunStatus)>>>,
    /// Status for builds not listed in `statuses`.
    default_status: Arc<RwLock<RunStatus>>,
    /// If set, the next run will fail with this error.
    next_error: Arc<RwLock<Option<RunnerError>>>,
    /// Recorded runs.
    runs: Arc<RwLock<Vec<RecordedRun>>>,
}

impl Default for MockBuildRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuildRunner {
    /// Create a mock where every build exits with 0.
    pub fn new() -> Self {
        Self {
            statuses: Arc::new(RwLock::new(Vec::new())),
            default_status: Arc::new(RwLock::new(RunStatus::exited(0))),
            next_error: Arc::new(RwLock::new(None)),
            runs: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Report `status` for builds whose version contains `key`.
    ///
    /// Setting an existing key replaces its status. When several keys match
    /// a version, the one set first wins.
    pub async fn set_status(&self, key: &str, status: RunStatus) {
        let mut statuses = self.statuses.write().await;
        match statuses.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = status,
            None => statuses.push((key.to_string(), status)),
        }
    }

    /// Report `status` for builds without a specific status.
    pub async fn set_default_status(&self, status: RunStatus) {
        *self.default_status.write().await = status;
    }

    /// Configure the next run to fail with the given error.
    pub async fn set_next_error(&self, error: RunnerError) {
        *self.next_error.write().await = Some(error);
    }

    /// Get all recorded runs.
    pub async fn recorded_runs(&self) -> Vec<RecordedRun> {
        self.runs.read().await.clone()
    }

    /// Get the number of runs performed.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Versions tested, in order.
    pub async fn tested_versions(&self) -> Vec<String> {
        self.runs
            .read()
            .await
            .iter()
            .map(|r| r.request.version.clone())
            .collect()
    }
}

#[async_trait]
impl BuildRunner for MockBuildRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(&self, request: &RunRequest) -> Result<RunStatus, RunnerError> {
        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        let status = self
            .statuses
            .read()
            .await
            .iter()
            .find(|(key, _)| request.version.contains(key.as_str()))
            .map(|(_, status)| *status);
        let status = match status {
            Some(status) => status,
            None => *self.default_status.read().await,
        };

        self.runs.write().await.push(RecordedRun {
            request: request.clone(),
            status,
        });

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(version: &str) -> RunRequest {
        RunRequest {
            version: version.to_string(),
            target: "linux-x64".to_string(),
            command: None,
            args: Vec::new(),
            scratch_dir: PathBuf::from("/tmp"),
        }
    }

    #[tokio::test]
    async fn test_mock_runner_statuses() {
        let runner = MockBuildRunner::new();
        runner.set_status("bbbb", RunStatus::exited(1)).await;

        let good = runner.run(&request("v16.0.0-nightly20210216aaaa")).await.unwrap();
        let bad = runner.run(&request("v16.0.0-nightly20210217bbbb")).await.unwrap();

        assert_eq!(good, RunStatus::exited(0));
        assert_eq!(bad, RunStatus::exited(1));
        assert_eq!(runner.run_count().await, 2);
        assert_eq!(
            runner.tested_versions().await,
            vec!["v16.0.0-nightly20210216aaaa", "v16.0.0-nightly20210217bbbb"]
        );
    }

    #[tokio::test]
    async fn test_mock_runner_overlapping_keys_use_first_set() {
        let runner = MockBuildRunner::new();
        runner.set_status("nightly2021", RunStatus::exited(1)).await;
        runner.set_status("aaaa", RunStatus::exited(2)).await;
        runner.set_status("nightly2021", RunStatus::exited(3)).await;

        for _ in 0..8 {
            let status = runner.run(&request("v16.0.0-nightly20210216aaaa")).await.unwrap();
            assert_eq!(status, RunStatus::exited(3));
        }
    }

    #[tokio::test]
    async fn test_mock_runner_next_error() {
        let runner = MockBuildRunner::new();
        runner
            .set_next_error(RunnerError::Timeout { timeout_secs: 5 })
            .await;

        assert!(runner.run(&request("v1")).await.is_err());
        assert!(runner.run(&request("v1")).await.is_ok());
        assert_eq!(runner.run_count().await, 1);
    }
}
