//! Persistent download cache.
//!
//! Files are stored under the cache root at the path of their URL, so
//! `https://host/download/nightly/v16.0.0-nightly…/node-…-linux-x64.tar.xz`
//! lands in `<root>/download/nightly/v16.0.0-nightly…/node-…-linux-x64.tar.xz`.
//! Downloads stream into a `.part` sibling that is renamed once complete. On
//! failure the partial file and any directories created for it are removed.
//! Nothing guards against two processes filling the same entry at once.

use reqwest::{Client, Url};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

/// Errors that can occur while filling the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("invalid download URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} {status_text} downloading {url}")]
    Http {
        url: String,
        status: u16,
        status_text: String,
    },

    #[error("I/O error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CacheError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Download cache rooted at a local directory.
#[derive(Debug, Clone)]
pub struct DownloadCache {
    root: PathBuf,
    client: Client,
}

impl DownloadCache {
    /// Create a cache under `root` that downloads with `client`.
    pub fn new(root: impl Into<PathBuf>, client: Client) -> Self {
        Self {
            root: root.into(),
            client,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of the cached copy of `url`.
    pub fn path_for(&self, url: &str) -> Result<PathBuf, CacheError> {
        let parsed = Url::parse(url).map_err(|e| CacheError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let relative = PathBuf::from(parsed.path().trim_start_matches('/'));
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if !safe || relative.as_os_str().is_empty() || parsed.path().ends_with('/') {
            return Err(CacheError::InvalidUrl {
                url: url.to_string(),
                reason: "path does not name a file".to_string(),
            });
        }

        Ok(self.root.join(relative))
    }

    /// Return the cached file for `url`, downloading it first if needed.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, CacheError> {
        let path = self.path_for(url)?;
        if is_file(&path).await {
            debug!(url = url, path = %path.display(), "Cache hit");
            return Ok(path);
        }

        let created = create_parents(&path).await?;
        let part = part_path(&path);

        let filled = match self.download(url, &part).await {
            Ok(bytes) => fs::rename(&part, &path)
                .await
                .map(|()| bytes)
                .map_err(|e| CacheError::io(&path, e)),
            Err(e) => Err(e),
        };

        match filled {
            Ok(bytes) => {
                info!(url = url, bytes = bytes, "Downloaded");
                Ok(path)
            }
            Err(e) => {
                discard(&part, &created).await;
                Err(e)
            }
        }
    }

    async fn download(&self, url: &str, part: &Path) -> Result<u64, CacheError> {
        debug!(url = url, "Downloading");

        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CacheError::Request {
                url: url.to_string(),
                source: e,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Http {
                url: url.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        let file = File::create(part)
            .await
            .map_err(|e| CacheError::io(part, e))?;
        let mut writer = BufWriter::new(file);
        let mut total = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(|e| CacheError::Request {
            url: url.to_string(),
            source: e,
        })? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| CacheError::io(part, e))?;
            total += chunk.len() as u64;
        }

        writer.flush().await.map_err(|e| CacheError::io(part, e))?;
        Ok(total)
    }
}

async fn is_file(path: &Path) -> bool {
    fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

/// Remove a partial download and the directories created for it.
async fn discard(part: &Path, created: &[PathBuf]) {
    if let Err(e) = fs::remove_file(part).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %part.display(), error = %e, "Failed to remove partial download");
        }
    }
    for dir in created.iter().rev() {
        // Only succeeds when empty.
        if fs::remove_dir(dir).await.is_err() {
            break;
        }
    }
}

/// `<file>.part` next to `path`.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

/// Create the missing parent directories of `path`, returning the ones
/// created, outermost first.
async fn create_parents(path: &Path) -> Result<Vec<PathBuf>, CacheError> {
    let mut missing = Vec::new();
    let mut current = path.parent();
    while let Some(dir) = current {
        if dir.as_os_str().is_empty() || fs::try_exists(dir).await.unwrap_or(false) {
            break;
        }
        missing.push(dir.to_path_buf());
        current = dir.parent();
    }
    missing.reverse();

    for dir in &missing {
        match fs::create_dir(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(CacheError::io(dir, e)),
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::serve_once;
    use tempfile::TempDir;

    fn cache(root: &Path) -> DownloadCache {
        DownloadCache::new(root, Client::builder().no_proxy().build().unwrap())
    }

    #[test]
    fn test_path_for_uses_url_path() {
        let temp = TempDir::new().unwrap();
        let path = cache(temp.path())
            .path_for("https://nodejs.org/download/nightly/v16.0.0-nightly202102189a2ac2c615/SHASUMS256.txt")
            .unwrap();
        assert_eq!(
            path,
            temp.path()
                .join("download/nightly/v16.0.0-nightly202102189a2ac2c615/SHASUMS256.txt")
        );
    }

    #[test]
    fn test_path_for_rejects_directories_and_traversal() {
        let temp = TempDir::new().unwrap();
        let cache = cache(temp.path());
        assert!(cache.path_for("https://nodejs.org/").is_err());
        assert!(cache.path_for("https://nodejs.org/download/").is_err());
        assert!(cache.path_for("not a url").is_err());
    }

    #[test]
    fn test_part_path() {
        assert_eq!(
            part_path(Path::new("/cache/a/b.tar.xz")),
            PathBuf::from("/cache/a/b.tar.xz.part")
        );
    }

    #[tokio::test]
    async fn test_create_parents_reports_new_dirs() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("a")).await.unwrap();

        let created = create_parents(&temp.path().join("a/b/c/file.txt"))
            .await
            .unwrap();
        assert_eq!(
            created,
            vec![temp.path().join("a/b"), temp.path().join("a/b/c")]
        );
        assert!(temp.path().join("a/b/c").is_dir());
    }

    #[tokio::test]
    async fn test_fetch_returns_cached_file_without_network() {
        let temp = TempDir::new().unwrap();
        let cache = cache(temp.path());
        let url = "http://127.0.0.1:9/download/nightly/index.json";
        let path = cache.path_for(url).unwrap();
        fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        fs::write(&path, b"[]").await.unwrap();

        let fetched = cache.fetch(url).await.unwrap();
        assert_eq!(fetched, path);
    }

    #[tokio::test]
    async fn test_failed_fetch_cleans_up_created_dirs() {
        let temp = TempDir::new().unwrap();
        let cache = cache(temp.path());
        // Port 9 (discard) is not expected to accept HTTP connections.
        let url = "http://127.0.0.1:9/download/nightly/v1/archive.tar.gz";

        let result = cache.fetch(url).await;
        assert!(result.is_err());
        assert!(!temp.path().join("download").exists());
        assert!(temp.path().exists());
    }

    #[tokio::test]
    async fn test_fetch_downloads_and_renames() {
        let temp = TempDir::new().unwrap();
        let cache = cache(temp.path());
        let addr = serve_once("200 OK", "archive bytes").await;
        let url = format!("http://{}/download/nightly/v1/archive.tar.gz", addr);

        let path = cache.fetch(&url).await.unwrap();

        assert_eq!(path, temp.path().join("download/nightly/v1/archive.tar.gz"));
        assert_eq!(fs::read_to_string(&path).await.unwrap(), "archive bytes");
        assert!(!part_path(&path).exists());
    }

    #[tokio::test]
    async fn test_failed_rename_removes_part_file() {
        let temp = TempDir::new().unwrap();
        let cache = cache(temp.path());
        let addr = serve_once("200 OK", "archive bytes").await;
        let url = format!("http://{}/download/nightly/v1/archive.tar.gz", addr);

        // A non-empty directory where the file should go makes the rename fail.
        let path = cache.path_for(&url).unwrap();
        fs::create_dir_all(path.join("blocker")).await.unwrap();

        let err = cache.fetch(&url).await.unwrap_err();

        assert!(matches!(err, CacheError::Io { .. }));
        assert!(!part_path(&path).exists());
        assert!(path.join("blocker").is_dir());
    }

    #[tokio::test]
    async fn test_http_error_cleans_up_created_dirs() {
        let temp = TempDir::new().unwrap();
        let cache = cache(temp.path());
        let addr = serve_once("404 Not Found", "").await;
        let url = format!("http://{}/download/nightly/v1/archive.tar.gz", addr);

        let err = cache.fetch(&url).await.unwrap_err();

        assert!(matches!(err, CacheError::Http { status: 404, .. }));
        assert!(!temp.path().join("download").exists());
    }
}
