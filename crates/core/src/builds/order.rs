//! Total ordering of normalized builds.
//!
//! The index lists builds newest first, but several nightlies can share a
//! calendar date and the date alone says nothing about their ancestry. Such
//! clusters are reordered from the curated same-day table, then the whole
//! list is reversed so the oldest build comes first.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::overrides::BuildOverrides;
use super::types::BuildInfo;

/// How to treat a same-date cluster missing from the same-day table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    /// Fail.
    #[default]
    Strict,
    /// Log a warning and keep the index order.
    Lenient,
}

/// Errors raised while ordering builds.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The index is not sorted newest first.
    #[error("build {version} dated {date} appears after a build dated {previous}")]
    DateOrder {
        version: String,
        date: NaiveDate,
        previous: NaiveDate,
    },

    /// Several builds share a date with no curated ordering.
    #[error("unknown ordering for {} builds published on {date}: {}", .commits.len(), .commits.join(", "))]
    UnknownSameDayOrder { date: NaiveDate, commits: Vec<String> },

    /// The curated entry lists a different number of builds than the index.
    #[error("same-day ordering for {date} lists {expected} builds but the index has {found}")]
    StaleSameDayOrder {
        date: NaiveDate,
        expected: usize,
        found: usize,
    },

    /// A build of the cluster is absent from the curated entry.
    #[error("same-day ordering for {date} does not list commit {commit}")]
    UnlistedCommit { date: NaiveDate, commit: String },
}

/// Order newest-first `builds` by ancestry and return them oldest first.
pub fn resolve_order(
    builds: Vec<BuildInfo>,
    overrides: &BuildOverrides,
    mode: OrderMode,
) -> Result<Vec<BuildInfo>, OrderError> {
    let mut ordered: Vec<BuildInfo> = Vec::with_capacity(builds.len());
    let mut cluster: Vec<BuildInfo> = Vec::new();

    for build in builds {
        if let Some(last) = cluster.last() {
            if build.date > last.date {
                return Err(OrderError::DateOrder {
                    version: build.version,
                    date: build.date,
                    previous: last.date,
                });
            }
            if build.date < last.date {
                flush_cluster(&mut cluster, &mut ordered, overrides, mode)?;
            }
        }
        cluster.push(build);
    }
    flush_cluster(&mut cluster, &mut ordered, overrides, mode)?;

    ordered.reverse();
    Ok(ordered)
}

/// Move a same-date cluster (newest first) into `ordered`, applying the
/// curated order when the cluster has more than one build.
fn flush_cluster(
    cluster: &mut Vec<BuildInfo>,
    ordered: &mut Vec<BuildInfo>,
    overrides: &BuildOverrides,
    mode: OrderMode,
) -> Result<(), OrderError> {
    if cluster.len() < 2 {
        ordered.append(cluster);
        return Ok(());
    }

    let date = cluster[0].date;
    let Some(curated) = overrides.same_day(date) else {
        let commits: Vec<String> = cluster.iter().map(|b| b.commit.clone()).collect();
        match mode {
            OrderMode::Strict => {
                return Err(OrderError::UnknownSameDayOrder { date, commits });
            }
            OrderMode::Lenient => {
                warn!(
                    %date,
                    commits = %commits.join(", "),
                    "Unknown ordering for builds sharing a date, keeping index order"
                );
                ordered.append(cluster);
                return Ok(());
            }
        }
    };

    if curated.len() != cluster.len() {
        return Err(OrderError::StaleSameDayOrder {
            date,
            expected: curated.len(),
            found: cluster.len(),
        });
    }

    if let Some(missing) = cluster.iter().find(|b| !curated.contains(&b.commit)) {
        return Err(OrderError::UnlistedCommit {
            date,
            commit: missing.commit.clone(),
        });
    }

    // Curated order is oldest first; `ordered` is still newest first here.
    for commit in curated.iter().rev() {
        if let Some(pos) = cluster.iter().position(|b| &b.commit == commit) {
            ordered.push(cluster.remove(pos));
        }
    }
    debug!(%date, builds = curated.len(), "Applied same-day ordering");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::build_info;

    fn table() -> BuildOverrides {
        BuildOverrides::from_toml_str(
            r#"
[same_day_order]
"2021-02-17" = ["1111111111", "2222222222", "3333333333"]
"#,
        )
        .unwrap()
    }

    fn commits(builds: &[BuildInfo]) -> Vec<&str> {
        builds.iter().map(|b| b.commit.as_str()).collect()
    }

    #[test]
    fn test_reverses_to_oldest_first() {
        let builds = vec![
            build_info("2021-02-18", "9a2ac2c615", &[]),
            build_info("2021-02-17", "8353854ed7", &[]),
            build_info("2021-02-16", "eec20ed5c1", &[]),
        ];
        let ordered = resolve_order(builds, &BuildOverrides::default(), OrderMode::Strict).unwrap();
        assert_eq!(commits(&ordered), ["eec20ed5c1", "8353854ed7", "9a2ac2c615"]);
    }

    #[test]
    fn test_empty_input() {
        let ordered =
            resolve_order(Vec::new(), &BuildOverrides::default(), OrderMode::Strict).unwrap();
        assert!(ordered.is_empty());
    }

    #[test]
    fn test_same_day_cluster_uses_table() {
        let builds = vec![
            build_info("2021-02-18", "ffffffffff", &[]),
            build_info("2021-02-17", "1111111111", &[]),
            build_info("2021-02-17", "3333333333", &[]),
            build_info("2021-02-17", "2222222222", &[]),
            build_info("2021-02-16", "0000000000", &[]),
        ];
        let ordered = resolve_order(builds, &table(), OrderMode::Strict).unwrap();
        assert_eq!(
            commits(&ordered),
            ["0000000000", "1111111111", "2222222222", "3333333333", "ffffffffff"]
        );
    }

    #[test]
    fn test_unknown_cluster_strict_fails() {
        let builds = vec![
            build_info("2021-02-18", "aaaaaaaaaa", &[]),
            build_info("2021-02-18", "bbbbbbbbbb", &[]),
        ];
        let err = resolve_order(builds, &table(), OrderMode::Strict).unwrap_err();
        assert!(matches!(err, OrderError::UnknownSameDayOrder { ref commits, .. } if commits.len() == 2));
    }

    #[test]
    fn test_unknown_cluster_lenient_keeps_index_order() {
        let builds = vec![
            build_info("2021-02-19", "cccccccccc", &[]),
            build_info("2021-02-18", "aaaaaaaaaa", &[]),
            build_info("2021-02-18", "bbbbbbbbbb", &[]),
        ];
        let ordered = resolve_order(builds, &table(), OrderMode::Lenient).unwrap();
        assert_eq!(commits(&ordered), ["bbbbbbbbbb", "aaaaaaaaaa", "cccccccccc"]);
    }

    #[test]
    fn test_stale_table_entry_fails() {
        let builds = vec![
            build_info("2021-02-17", "1111111111", &[]),
            build_info("2021-02-17", "2222222222", &[]),
        ];
        let err = resolve_order(builds, &table(), OrderMode::Lenient).unwrap_err();
        assert!(matches!(
            err,
            OrderError::StaleSameDayOrder {
                expected: 3,
                found: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_unlisted_commit_fails() {
        let builds = vec![
            build_info("2021-02-17", "1111111111", &[]),
            build_info("2021-02-17", "2222222222", &[]),
            build_info("2021-02-17", "4444444444", &[]),
        ];
        let err = resolve_order(builds, &table(), OrderMode::Strict).unwrap_err();
        assert!(matches!(err, OrderError::UnlistedCommit { ref commit, .. } if commit == "4444444444"));
    }

    #[test]
    fn test_increasing_date_fails() {
        let builds = vec![
            build_info("2021-02-16", "aaaaaaaaaa", &[]),
            build_info("2021-02-17", "bbbbbbbbbb", &[]),
        ];
        let err = resolve_order(builds, &BuildOverrides::default(), OrderMode::Lenient).unwrap_err();
        assert!(matches!(err, OrderError::DateOrder { .. }));
        assert!(err.to_string().contains("2021-02-17"));
    }
}
