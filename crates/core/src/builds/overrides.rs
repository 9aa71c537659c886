//! Curated corrections for the nightly build index.
//!
//! The index alone cannot tell which nightlies were built from commits that
//! later vanished from the main branch, nor in which order several nightlies
//! published on the same day were committed. These facts live in a TOML
//! table shipped with the crate and can be extended with a user file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use thiserror::Error;

const EMBEDDED_OVERRIDES: &str = include_str!("../../data/build_overrides.toml");

/// Errors loading an overrides table.
#[derive(Debug, Error)]
pub enum OverridesError {
    #[error("failed to read overrides file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse overrides: {0}")]
    Parse(String),

    #[error("invalid same-day entry '{key}': {reason}")]
    InvalidDate { key: String, reason: String },
}

/// Curated fact base consulted while normalizing and ordering builds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOverrides {
    /// Commits rebased out of history after their nightly was built.
    #[serde(default)]
    pub rebased_commits: BTreeSet<String>,
    /// Commits that are not ancestors of the main branch.
    #[serde(default)]
    pub non_trunk_commits: BTreeSet<String>,
    /// Date (`YYYY-MM-DD`) to commits in ancestry order, oldest first.
    #[serde(default)]
    pub same_day_order: BTreeMap<String, Vec<String>>,
}

impl BuildOverrides {
    /// The table shipped with this crate.
    pub fn embedded() -> Result<Self, OverridesError> {
        Self::from_toml_str(EMBEDDED_OVERRIDES)
    }

    /// Parse a table from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, OverridesError> {
        let parsed: Self =
            toml::from_str(text).map_err(|e| OverridesError::Parse(e.to_string()))?;
        parsed.normalized()
    }

    /// Load a table from a TOML file.
    pub fn from_path(path: &Path) -> Result<Self, OverridesError> {
        let text = std::fs::read_to_string(path).map_err(|e| OverridesError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&text)
    }

    /// Add the entries of `other`. Same-day entries in `other` replace ours.
    pub fn merge(mut self, other: BuildOverrides) -> Self {
        self.rebased_commits.extend(other.rebased_commits);
        self.non_trunk_commits.extend(other.non_trunk_commits);
        self.same_day_order.extend(other.same_day_order);
        self
    }

    pub fn is_rebased(&self, commit: &str) -> bool {
        self.rebased_commits.contains(commit)
    }

    pub fn is_non_trunk(&self, commit: &str) -> bool {
        self.non_trunk_commits.contains(commit)
    }

    /// Commits published on `date`, oldest first, if curated.
    pub fn same_day(&self, date: NaiveDate) -> Option<&[String]> {
        self.same_day_order
            .get(&date.format("%Y-%m-%d").to_string())
            .map(Vec::as_slice)
    }

    /// Lower-case every commit and check that every same-day key is a date.
    fn normalized(self) -> Result<Self, OverridesError> {
        let lower = |set: BTreeSet<String>| -> BTreeSet<String> {
            set.into_iter().map(|c| c.to_lowercase()).collect()
        };

        let mut same_day_order = BTreeMap::new();
        for (key, commits) in self.same_day_order {
            let date = NaiveDate::parse_from_str(&key, "%Y-%m-%d").map_err(|e| {
                OverridesError::InvalidDate {
                    key: key.clone(),
                    reason: e.to_string(),
                }
            })?;
            same_day_order.insert(
                date.format("%Y-%m-%d").to_string(),
                commits.into_iter().map(|c| c.to_lowercase()).collect(),
            );
        }

        Ok(Self {
            rebased_commits: lower(self.rebased_commits),
            non_trunk_commits: lower(self.non_trunk_commits),
            same_day_order,
        })
    }
}
