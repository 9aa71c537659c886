//! Types for the nightly build catalog.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `vMAJOR.MINOR.PATCH-nightlyYYYYMMDDCOMMIT`
static NIGHTLY_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^v(\d+)\.(\d+)\.(\d+)-nightly(\d{4})(\d{2})(\d{2})([0-9a-fA-F]+)$")
        .expect("nightly version pattern is valid")
});

/// A build descriptor as published in the index, before any filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBuild {
    /// Version string, e.g. `v16.0.0-nightly202102178353854ed7`.
    pub version: String,
    /// Publication date as reported by the index (informational only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Targets for which an artifact was published.
    #[serde(default)]
    pub files: Vec<String>,
}

/// The components encoded in a nightly version string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightlyVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    /// Nightly date component.
    pub date: NaiveDate,
    /// Short commit hash, lower-case.
    pub commit: String,
}

impl NightlyVersion {
    /// Parse a nightly version string.
    ///
    /// Returns a human readable reason when the string does not follow the
    /// nightly layout.
    pub fn parse(version: &str) -> Result<Self, String> {
        let caps = NIGHTLY_VERSION
            .captures(version)
            .ok_or_else(|| "does not match vMAJOR.MINOR.PATCH-nightlyYYYYMMDDCOMMIT".to_string())?;

        let number = |i: usize| -> Result<u64, String> {
            caps[i]
                .parse::<u64>()
                .map_err(|e| format!("invalid version component '{}': {}", &caps[i], e))
        };

        let major = number(1)?;
        let minor = number(2)?;
        let patch = number(3)?;

        let (year, month, day) = (
            caps[4].parse::<i32>().map_err(|e| e.to_string())?,
            caps[5].parse::<u32>().map_err(|e| e.to_string())?,
            caps[6].parse::<u32>().map_err(|e| e.to_string())?,
        );
        let date = NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| {
            format!(
                "invalid nightly date {}-{}-{}",
                &caps[4], &caps[5], &caps[6]
            )
        })?;

        Ok(Self {
            major,
            minor,
            patch,
            date,
            commit: caps[7].to_lowercase(),
        })
    }

    /// Whether this is a trunk build (`X.0.0`).
    pub fn is_trunk(&self) -> bool {
        self.minor == 0 && self.patch == 0
    }
}

/// A normalized nightly build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Full version string as published.
    pub version: String,
    /// Targets for which an artifact exists.
    pub files: Vec<String>,
    /// Short commit hash, lower-case.
    pub commit: String,
    /// Nightly date.
    pub date: NaiveDate,
}

impl BuildInfo {
    /// Whether an artifact exists for `target`.
    pub fn has_target(&self, target: &str) -> bool {
        self.files.iter().any(|f| f == target)
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.version, self.date, self.commit)
    }
}
