//! Fetching and normalizing the nightly build index.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use super::overrides::BuildOverrides;
use super::types::{BuildInfo, NightlyVersion, RawBuild};
use super::IndexError;

/// Source of the raw build index.
#[async_trait]
pub trait BuildIndexSource: Send + Sync {
    /// Returns the raw index, newest build first.
    async fn fetch_index(&self) -> Result<Vec<RawBuild>, IndexError>;
}

/// Build index fetched over HTTP as a JSON array.
pub struct HttpIndexSource {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpIndexSource {
    /// Create a source reading `url` with the shared `client`.
    pub fn new(client: Client, url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            url: url.into(),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BuildIndexSource for HttpIndexSource {
    async fn fetch_index(&self) -> Result<Vec<RawBuild>, IndexError> {
        debug!(url = %self.url, "Fetching build index");

        let response = self
            .client
            .get(&self.url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| IndexError::Request {
                url: self.url.clone(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IndexError::Http {
                url: self.url.clone(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let body = response.text().await.map_err(|e| IndexError::Request {
            url: self.url.clone(),
            source: e,
        })?;
        let builds: Vec<RawBuild> = serde_json::from_str(&body)
            .map_err(|e| IndexError::Parse(format!("{}: {}", self.url, e)))?;

        debug!(url = %self.url, entries = builds.len(), "Build index fetched");
        Ok(builds)
    }
}

/// Fetch the index from `source` and normalize it.
pub async fn fetch_builds(
    source: &dyn BuildIndexSource,
    overrides: &BuildOverrides,
) -> Result<Vec<BuildInfo>, IndexError> {
    let raw = source.fetch_index().await?;
    normalize_builds(raw, overrides)
}

/// Filter the raw index down to bisectable trunk builds.
///
/// Entries are dropped, in this order, when they belong to the legacy `v0.x`
/// family, come from a release branch (minor or patch not zero), were built
/// from a rebased or non-trunk commit, or repeat a commit already seen. A
/// version that is not a nightly version fails the whole call. Relative
/// order of the input is preserved.
pub fn normalize_builds(
    raw: Vec<RawBuild>,
    overrides: &BuildOverrides,
) -> Result<Vec<BuildInfo>, IndexError> {
    let total = raw.len();
    let mut seen_commits: HashSet<String> = HashSet::new();
    let mut builds = Vec::with_capacity(total);

    for entry in raw {
        if entry.version.starts_with("v0.") {
            debug!(version = %entry.version, "Dropping legacy v0.x build");
            continue;
        }

        let parsed = NightlyVersion::parse(&entry.version).map_err(|reason| {
            IndexError::InvalidVersion {
                version: entry.version.clone(),
                reason,
            }
        })?;

        if !parsed.is_trunk() {
            debug!(version = %entry.version, "Dropping release branch build");
            continue;
        }

        if overrides.is_rebased(&parsed.commit) {
            debug!(
                version = %entry.version,
                commit = %parsed.commit,
                "Dropping build of rebased commit"
            );
            continue;
        }

        if overrides.is_non_trunk(&parsed.commit) {
            debug!(
                version = %entry.version,
                commit = %parsed.commit,
                "Dropping build of non-trunk commit"
            );
            continue;
        }

        if !seen_commits.insert(parsed.commit.clone()) {
            debug!(
                version = %entry.version,
                commit = %parsed.commit,
                "Dropping rebuild of an already listed commit"
            );
            continue;
        }

        builds.push(BuildInfo {
            version: entry.version,
            files: entry.files,
            commit: parsed.commit,
            date: parsed.date,
        });
    }

    info!(
        total = total,
        kept = builds.len(),
        "Normalized nightly build index"
    );

    Ok(builds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures::raw_build;
    use crate::testing::{serve_once, MockIndexSource};

    async fn serve_index(status_line: &'static str, body: &'static str) -> String {
        let addr = serve_once(status_line, body).await;
        format!("http://{}/download/nightly/index.json", addr)
    }

    fn http_source(url: &str) -> HttpIndexSource {
        let client = Client::builder().no_proxy().build().unwrap();
        HttpIndexSource::new(client, url, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_http_source_reads_index() {
        let url = serve_index(
            "200 OK",
            r#"[{"version":"v16.0.0-nightly202102189a2ac2c615","date":"2021-02-18","files":["linux-x64"]}]"#,
        )
        .await;

        let builds = http_source(&url).fetch_index().await.unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].version, "v16.0.0-nightly202102189a2ac2c615");
        assert_eq!(builds[0].files, vec!["linux-x64"]);
    }

    #[tokio::test]
    async fn test_http_source_maps_error_status() {
        let url = serve_index("503 Service Unavailable", "").await;

        let err = http_source(&url).fetch_index().await.unwrap_err();
        match err {
            IndexError::Http {
                url: failed_url,
                status,
                status_text,
            } => {
                assert_eq!(failed_url, url);
                assert_eq!(status, 503);
                assert_eq!(status_text, "Service Unavailable");
            }
            other => panic!("expected Http error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_http_source_rejects_malformed_body() {
        let url = serve_index("200 OK", r#"{"not": "an array"#).await;

        let err = http_source(&url).fetch_index().await.unwrap_err();
        match err {
            IndexError::Parse(message) => assert!(message.contains(&url)),
            other => panic!("expected Parse error, got {:?}", other),
        }
    }

    fn overrides() -> BuildOverrides {
        BuildOverrides::from_toml_str(
            r#"
rebased_commits = ["deadbeef01"]
non_trunk_commits = ["badc0ffee0"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_filters_in_order() {
        let raw = vec![
            raw_build("v16.0.0-nightly20210219aaaaaaaaaa", &["linux-x64"]),
            raw_build("v15.9.0-nightly20210219bbbbbbbbbb", &["linux-x64"]),
            raw_build("v16.0.0-nightly20210218deadbeef01", &["linux-x64"]),
            raw_build("v16.0.0-nightly20210217badc0ffee0", &["linux-x64"]),
            raw_build("v16.0.0-nightly20210216cccccccccc", &["linux-x64"]),
            raw_build("v0.12.0-nightly20150101dddddddddd", &["linux-x64"]),
        ];

        let builds = normalize_builds(raw, &overrides()).unwrap();
        let commits: Vec<_> = builds.iter().map(|b| b.commit.as_str()).collect();
        assert_eq!(commits, ["aaaaaaaaaa", "cccccccccc"]);
    }

    #[test]
    fn test_legacy_versions_dropped_before_validation() {
        let raw = vec![
            raw_build("v16.0.0-nightly20210219aaaaaaaaaa", &[]),
            raw_build("v0.10.48", &[]),
        ];
        let builds = normalize_builds(raw, &BuildOverrides::default()).unwrap();
        assert_eq!(builds.len(), 1);
    }

    #[test]
    fn test_malformed_version_fails_whole_index() {
        let raw = vec![
            raw_build("v16.0.0-nightly20210219aaaaaaaaaa", &[]),
            raw_build("v16.0.0-rc.1", &[]),
        ];
        let result = normalize_builds(raw, &BuildOverrides::default());
        match result {
            Err(IndexError::InvalidVersion { version, .. }) => assert_eq!(version, "v16.0.0-rc.1"),
            other => panic!("expected InvalidVersion, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_commit_keeps_first() {
        let raw = vec![
            raw_build("v16.0.0-nightly20210219aaaaaaaaaa", &["linux-x64"]),
            raw_build("v16.0.0-nightly20210218AAAAAAAAAA", &["osx-x64-tar"]),
            raw_build("v16.0.0-nightly20210217bbbbbbbbbb", &["linux-x64"]),
        ];
        let builds = normalize_builds(raw, &BuildOverrides::default()).unwrap();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].version, "v16.0.0-nightly20210219aaaaaaaaaa");
        assert_eq!(builds[1].commit, "bbbbbbbbbb");
    }

    #[test]
    fn test_output_is_unique_and_date_ordered() {
        let raw = vec![
            raw_build("v16.0.0-nightly20210219aaaaaaaaaa", &[]),
            raw_build("v16.0.0-nightly20210219bbbbbbbbbb", &[]),
            raw_build("v16.0.0-nightly20210218aaaaaaaaaa", &[]),
            raw_build("v16.0.0-nightly20210217cccccccccc", &[]),
            raw_build("v15.1.0-nightly20210216dddddddddd", &[]),
            raw_build("v16.0.0-nightly20210215eeeeeeeeee", &[]),
        ];
        let builds = normalize_builds(raw, &BuildOverrides::default()).unwrap();

        let unique: HashSet<_> = builds.iter().map(|b| &b.commit).collect();
        assert_eq!(unique.len(), builds.len());
        assert!(builds.iter().rev().collect::<Vec<_>>().windows(2).all(|w| w[0].date <= w[1].date));
    }

    #[tokio::test]
    async fn test_fetch_builds_uses_source() {
        let source = MockIndexSource::new();
        source
            .set_builds(vec![raw_build("v16.0.0-nightly20210219aaaaaaaaaa", &["linux-x64"])])
            .await;

        let builds = fetch_builds(&source, &BuildOverrides::default()).await.unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_fetch_builds_propagates_http_error() {
        let source = MockIndexSource::new();
        source
            .set_next_error(IndexError::Http {
                url: "https://example.invalid/index.json".to_string(),
                status: 503,
                status_text: "Service Unavailable".to_string(),
            })
            .await;

        let err = fetch_builds(&source, &BuildOverrides::default())
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("503"));
        assert!(message.contains("Service Unavailable"));
        assert!(message.contains("https://example.invalid/index.json"));
    }
}
