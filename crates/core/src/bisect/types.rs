//! Types for the bisection orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::builds::{BuildInfo, IndexError, OrderError, OrderMode};
use crate::runner::{RunStatus, RunnerError};
use crate::search::SearchError;

/// Errors that can occur during a bisection.
#[derive(Debug, Error)]
pub enum BisectError {
    /// Date bounds are malformed or out of order.
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Fetching or normalizing the build index failed.
    #[error("build index error: {0}")]
    Index(#[from] IndexError),

    /// Ordering the builds failed.
    #[error("build ordering error: {0}")]
    Order(#[from] OrderError),

    /// No build lies strictly between the bounds.
    #[error("no builds in range {range}")]
    NoBuildsInRange { range: String },

    /// No build in range publishes any of the requested targets.
    #[error("no builds in range {range} for targets {}", .targets.join(", "))]
    NoBuildsForTargets { range: String, targets: Vec<String> },

    /// Preparing or running a build failed.
    #[error("failed to test {version}: {source}")]
    Runner {
        version: String,
        #[source]
        source: RunnerError,
    },

    /// The test command asked to skip a build.
    #[error("build {version} was reported untestable (exit code 125); skipping builds is not supported")]
    Untestable { version: String },

    /// The test command exited with a status that is neither good nor bad.
    #[error("build {version} returned ambiguous result: {status}")]
    AmbiguousResult { version: String, status: String },

    /// The search stopped on an unusable build.
    #[error("bisection was inconclusive")]
    Inconclusive,

    /// Invalid search bounds.
    #[error("search error: {0}")]
    Search(#[from] SearchError),

    /// Scratch directory could not be created.
    #[error("failed to create scratch directory: {0}")]
    Scratch(#[source] std::io::Error),
}

/// A build paired with the target that will be tested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BisectionCandidate {
    pub build: BuildInfo,
    /// First requested target present in the build's file list.
    pub target: String,
}

impl fmt::Display for BisectionCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.build, self.target)
    }
}

/// Parameters for one bisection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BisectRequest {
    /// Known good date; only later builds are tested. Must be midnight UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub good: Option<DateTime<Utc>>,
    /// Known bad date; only earlier builds are tested. Must be midnight UTC.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bad: Option<DateTime<Utc>>,
    /// Targets in order of preference.
    pub targets: Vec<String>,
    /// Program to run; `None` runs the runtime binary itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extraction directory. A temporary one is created and removed when
    /// not set; a supplied directory is left in place.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
    #[serde(default)]
    pub order_mode: OrderMode,
}

impl BisectRequest {
    /// A request over the whole index for `targets`.
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            good: None,
            bad: None,
            targets,
            command: None,
            args: Vec::new(),
            scratch_dir: None,
            order_mode: OrderMode::Strict,
        }
    }

    /// `(good, bad)` with open ends spelled out, for messages.
    pub fn describe_range(&self) -> String {
        let fmt = |d: &Option<DateTime<Utc>>, open: &str| {
            d.map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| open.to_string())
        };
        format!(
            "({}, {})",
            fmt(&self.good, "first build"),
            fmt(&self.bad, "latest build")
        )
    }
}

/// One tested build and how its test exited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestedBuild {
    pub candidate: BisectionCandidate,
    pub status: RunStatus,
}

/// Result of a bisection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BisectOutcome {
    /// Latest build found good; `None` if every tested build was bad.
    pub last_good: Option<BisectionCandidate>,
    /// Earliest build found bad; `None` if every tested build was good.
    pub first_bad: Option<BisectionCandidate>,
    /// Builds tested, in test order.
    pub tested: Vec<TestedBuild>,
    /// Size of the search domain.
    pub candidates: usize,
}

/// Called with `(low, high)` before each probe.
pub type RangeCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Called after each tested build.
pub type ResultCallback = Arc<dyn Fn(&BisectionCandidate, &RunStatus) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_describe_range() {
        let mut request = BisectRequest::new(vec!["linux-x64".to_string()]);
        assert_eq!(request.describe_range(), "(first build, latest build)");

        request.good = Some(Utc.with_ymd_and_hms(2021, 2, 15, 0, 0, 0).unwrap());
        request.bad = Some(Utc.with_ymd_and_hms(2021, 2, 20, 0, 0, 0).unwrap());
        assert_eq!(request.describe_range(), "(2021-02-15, 2021-02-20)");
    }

    #[test]
    fn test_untestable_message_names_exit_code() {
        let err = BisectError::Untestable {
            version: "v16.0.0-nightly202102189a2ac2c615".to_string(),
        };
        assert!(err.to_string().contains("125"));
    }
}
