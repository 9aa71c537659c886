//! Mock build index source for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::builds::{BuildIndexSource, IndexError, RawBuild};

/// Mock implementation of the BuildIndexSource trait.
///
/// Returns a configurable index and counts fetches, so tests can assert
/// that a run failed before touching the network.
#[derive(Debug, Default)]
pub struct MockIndexSource {
    /// Index returned by every fetch.
    builds: Arc<RwLock<Vec<RawBuild>>>,
    /// If set, the next fetch will fail with this error.
    next_error: Arc<RwLock<Option<IndexError>>>,
    /// Number of fetches performed.
    fetches: AtomicUsize,
}

impl MockIndexSource {
    /// Create a mock with an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock returning `builds`.
    pub fn with_builds(builds: Vec<RawBuild>) -> Self {
        Self {
            builds: Arc::new(RwLock::new(builds)),
            ..Self::default()
        }
    }

    /// Replace the index.
    pub async fn set_builds(&self, builds: Vec<RawBuild>) {
        *self.builds.write().await = builds;
    }

    /// Configure the next fetch to fail with the given error.
    pub async fn set_next_error(&self, error: IndexError) {
        *self.next_error.write().await = Some(error);
    }

    /// Number of fetches performed so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildIndexSource for MockIndexSource {
    async fn fetch_index(&self) -> Result<Vec<RawBuild>, IndexError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.next_error.write().await.take() {
            return Err(error);
        }

        Ok(self.builds.read().await.clone())
    }
}
