//! Bisection orchestrator.
//!
//! One run goes through: validate bounds → fetch and order builds → filter
//! by date → pick a target per build → search → map the insertion point to
//! the (last good, first bad) pair. Nothing is kept between runs.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::builds::{fetch_builds, resolve_order, BuildIndexSource, BuildInfo, BuildOverrides};
use crate::runner::{BuildRunner, RunRequest, RunStatus, UNTESTABLE_EXIT_CODE};
use crate::search::{binary_search_async, Probe, SearchOutcome, SearchRange};

use super::types::{
    BisectError, BisectOutcome, BisectRequest, BisectionCandidate, RangeCallback, ResultCallback,
    TestedBuild,
};

/// Drives a bisection over the nightly builds.
pub struct Bisector {
    index: Arc<dyn BuildIndexSource>,
    runner: Arc<dyn BuildRunner>,
    overrides: BuildOverrides,
    range_callback: Option<RangeCallback>,
    result_callback: Option<ResultCallback>,
}

impl Bisector {
    pub fn new(
        index: Arc<dyn BuildIndexSource>,
        runner: Arc<dyn BuildRunner>,
        overrides: BuildOverrides,
    ) -> Self {
        Self {
            index,
            runner,
            overrides,
            range_callback: None,
            result_callback: None,
        }
    }

    /// Set a callback fired with the remaining `(low, high)` before each probe.
    pub fn with_range_callback(mut self, callback: RangeCallback) -> Self {
        self.range_callback = Some(callback);
        self
    }

    /// Set a callback fired after each tested build.
    pub fn with_result_callback(mut self, callback: ResultCallback) -> Self {
        self.result_callback = Some(callback);
        self
    }

    /// Run one bisection.
    pub async fn run(&self, request: &BisectRequest) -> Result<BisectOutcome, BisectError> {
        validate_bounds(request.good, request.bad)?;

        let builds = fetch_builds(self.index.as_ref(), &self.overrides).await?;
        let ordered = resolve_order(builds, &self.overrides, request.order_mode)?;

        let in_range = filter_by_date(ordered, request.good, request.bad);
        if in_range.is_empty() {
            return Err(BisectError::NoBuildsInRange {
                range: request.describe_range(),
            });
        }

        let candidates = select_targets(in_range, &request.targets);
        if candidates.is_empty() {
            return Err(BisectError::NoBuildsForTargets {
                range: request.describe_range(),
                targets: request.targets.clone(),
            });
        }

        info!(
            candidates = candidates.len(),
            range = %request.describe_range(),
            first = %candidates[0].build.version,
            last = %candidates[candidates.len() - 1].build.version,
            "Starting bisection"
        );

        let scratch = ScratchDir::acquire(request.scratch_dir.as_deref()).await?;
        let searched = self.search(&candidates, request, scratch.path()).await;
        scratch.release();
        let (outcome, tested) = searched?;

        let insert_at = match outcome {
            SearchOutcome::Missing { insert_at } => insert_at,
            SearchOutcome::Found(index) => index,
            SearchOutcome::Inconclusive => return Err(BisectError::Inconclusive),
        };

        let last_good = insert_at
            .checked_sub(1)
            .and_then(|i| candidates.get(i))
            .cloned();
        let first_bad = candidates.get(insert_at).cloned();

        info!(
            last_good = %last_good.as_ref().map(|c| c.build.version.as_str()).unwrap_or("none"),
            first_bad = %first_bad.as_ref().map(|c| c.build.version.as_str()).unwrap_or("none"),
            tested = tested.len(),
            "Bisection complete"
        );

        Ok(BisectOutcome {
            last_good,
            first_bad,
            tested,
            candidates: candidates.len(),
        })
    }

    async fn search(
        &self,
        candidates: &[BisectionCandidate],
        request: &BisectRequest,
        scratch: &Path,
    ) -> Result<(SearchOutcome, Vec<TestedBuild>), BisectError> {
        let tested = Mutex::new(Vec::new());

        let outcome = binary_search_async(
            candidates,
            SearchRange::full(),
            |candidate| self.probe(candidate, request, scratch, &tested),
            |low, high| self.report_range(low, high),
        )
        .await?;

        Ok((outcome, tested.into_inner()))
    }

    async fn probe(
        &self,
        candidate: &BisectionCandidate,
        request: &BisectRequest,
        scratch: &Path,
        tested: &Mutex<Vec<TestedBuild>>,
    ) -> Result<Probe, BisectError> {
        let run = RunRequest {
            version: candidate.build.version.clone(),
            target: candidate.target.clone(),
            command: request.command.clone(),
            args: request.args.clone(),
            scratch_dir: scratch.to_path_buf(),
        };

        let status = self
            .runner
            .run(&run)
            .await
            .map_err(|source| BisectError::Runner {
                version: candidate.build.version.clone(),
                source,
            })?;

        if let Some(callback) = &self.result_callback {
            callback(candidate, &status);
        }
        tested.lock().await.push(TestedBuild {
            candidate: candidate.clone(),
            status,
        });

        let probe = classify_status(&candidate.build.version, &status)?;
        debug!(
            version = %candidate.build.version,
            verdict = if probe == Probe::After { "good" } else { "bad" },
            "Build tested"
        );
        Ok(probe)
    }

    fn report_range(&self, low: usize, high: usize) {
        let remaining = high - low + 1;
        let steps = usize::BITS - remaining.leading_zeros();
        info!(
            low = low,
            high = high,
            remaining = remaining,
            steps = steps,
            "{} builds left to test (roughly {} steps)",
            remaining,
            steps
        );
        if let Some(callback) = &self.range_callback {
            callback(low, high);
        }
    }
}

/// Map a test command's exit status to a search direction.
///
/// Exit code 0 means good: the first bad build lies later. Codes 1 to 127
/// (except 125) mean bad: it lies here or earlier. Code 125 asks to skip the
/// build, which is not supported. Anything else aborts the bisection.
pub fn classify_status(version: &str, status: &RunStatus) -> Result<Probe, BisectError> {
    let code = match (status.exit_code, status.signal) {
        (Some(code), None) => code,
        _ => {
            return Err(BisectError::AmbiguousResult {
                version: version.to_string(),
                status: status.to_string(),
            })
        }
    };

    match code {
        0 => Ok(Probe::After),
        UNTESTABLE_EXIT_CODE => Err(BisectError::Untestable {
            version: version.to_string(),
        }),
        1..=127 => Ok(Probe::Before),
        _ => Err(BisectError::AmbiguousResult {
            version: version.to_string(),
            status: status.to_string(),
        }),
    }
}

/// Check that bounds are midnight UTC and that `good` precedes `bad`.
pub fn validate_bounds(
    good: Option<DateTime<Utc>>,
    bad: Option<DateTime<Utc>>,
) -> Result<(), BisectError> {
    for (name, bound) in [("good", good), ("bad", bad)] {
        if let Some(bound) = bound {
            if bound.time() != NaiveTime::MIN {
                return Err(BisectError::InvalidRange(format!(
                    "{} date {} is not midnight UTC",
                    name,
                    bound.to_rfc3339()
                )));
            }
        }
    }

    if let (Some(good), Some(bad)) = (good, bad) {
        if good >= bad {
            return Err(BisectError::InvalidRange(format!(
                "good date {} must precede bad date {}",
                good.format("%Y-%m-%d"),
                bad.format("%Y-%m-%d")
            )));
        }
    }

    Ok(())
}

/// Parse a `YYYY-MM-DD` bound into midnight UTC.
pub fn parse_bound_date(value: &str) -> Result<DateTime<Utc>, BisectError> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| {
        BisectError::InvalidRange(format!("'{}' is not a YYYY-MM-DD date: {}", value, e))
    })?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

/// Keep builds dated strictly after `good` and strictly before `bad`.
pub fn filter_by_date(
    builds: Vec<BuildInfo>,
    good: Option<DateTime<Utc>>,
    bad: Option<DateTime<Utc>>,
) -> Vec<BuildInfo> {
    let after = good.map(|d| d.date_naive());
    let before = bad.map(|d| d.date_naive());

    builds
        .into_iter()
        .filter(|b| after.map_or(true, |g| b.date > g))
        .filter(|b| before.map_or(true, |d| b.date < d))
        .collect()
}

/// Pair each build with the first of `targets` it publishes; builds with
/// none of them are dropped.
pub fn select_targets(builds: Vec<BuildInfo>, targets: &[String]) -> Vec<BisectionCandidate> {
    builds
        .into_iter()
        .filter_map(|build| {
            let target = targets.iter().find(|t| build.has_target(t))?.clone();
            Some(BisectionCandidate { build, target })
        })
        .collect()
}

/// Extraction directory for one run.
enum ScratchDir {
    Temporary(TempDir),
    Provided(PathBuf),
}

impl ScratchDir {
    async fn acquire(provided: Option<&Path>) -> Result<Self, BisectError> {
        match provided {
            Some(path) => {
                tokio::fs::create_dir_all(path)
                    .await
                    .map_err(BisectError::Scratch)?;
                Ok(Self::Provided(path.to_path_buf()))
            }
            None => {
                let dir = tempfile::Builder::new()
                    .prefix("nightly-bisect-")
                    .tempdir()
                    .map_err(BisectError::Scratch)?;
                debug!(path = %dir.path().display(), "Created scratch directory");
                Ok(Self::Temporary(dir))
            }
        }
    }

    fn path(&self) -> &Path {
        match self {
            Self::Temporary(dir) => dir.path(),
            Self::Provided(path) => path,
        }
    }

    /// Remove a temporary directory. Failures are logged only.
    fn release(self) {
        if let Self::Temporary(dir) = self {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(path = %path.display(), "Removed scratch directory"),
                Err(e) => warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to remove scratch directory"
                ),
            }
        }
    }
}
