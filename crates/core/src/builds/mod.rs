//! Nightly build catalog.
//!
//! Turns the published build index into a strictly ordered, de-duplicated
//! list of trunk builds, oldest first:
//!
//! raw index → [`normalize_builds`] (filter + parse) → [`resolve_order`]
//! (same-day repair + reverse)

mod fetcher;
mod order;
mod overrides;
mod types;

pub use fetcher::{fetch_builds, normalize_builds, BuildIndexSource, HttpIndexSource};
pub use order::{resolve_order, OrderError, OrderMode};
pub use overrides::{BuildOverrides, OverridesError};
pub use types::{BuildInfo, NightlyVersion, RawBuild};

use thiserror::Error;

/// Errors that can occur while fetching or normalizing the build index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// The request could not be sent or the connection failed.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("HTTP {status} {status_text} fetching {url}")]
    Http {
        url: String,
        status: u16,
        status_text: String,
    },

    /// The body was not a JSON array of build descriptors.
    #[error("failed to parse build index: {0}")]
    Parse(String),

    /// A version string did not follow the nightly layout.
    #[error("malformed nightly version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },
}
