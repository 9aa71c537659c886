use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::builds::OrderMode;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub bisect: BisectConfig,
}

/// Build index configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IndexConfig {
    /// URL of the JSON build index
    #[serde(default = "default_index_url")]
    pub url: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            url: default_index_url(),
            timeout_secs: default_timeout(),
        }
    }
}

fn default_index_url() -> String {
    "https://nodejs.org/download/nightly/index.json".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Download cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

/// `nightly-bisect` under the platform cache directory, or under the
/// temporary directory when the platform has none.
fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("nightly-bisect")
}

/// Single-build runner configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RunnerConfig {
    /// Base URL under which `<version>/<archive>` is published
    #[serde(default = "default_dist_url")]
    pub dist_url: String,
    /// Name of the runtime binary inside the archives
    #[serde(default = "default_binary_name")]
    pub binary_name: String,
    /// Kill the test command after this many seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Check archives against the published SHASUMS256.txt
    #[serde(default = "default_true")]
    pub verify_checksums: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            dist_url: default_dist_url(),
            binary_name: default_binary_name(),
            timeout_secs: None,
            verify_checksums: true,
        }
    }
}

fn default_dist_url() -> String {
    "https://nodejs.org/download/nightly".to_string()
}

fn default_binary_name() -> String {
    "node".to_string()
}

fn default_true() -> bool {
    true
}

/// Bisection defaults
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BisectConfig {
    /// Targets to try, in order of preference
    #[serde(default = "default_targets")]
    pub targets: Vec<String>,
    /// Fail on same-date builds missing from the ordering table
    #[serde(default = "default_true")]
    pub strict_ordering: bool,
    /// Extra overrides table merged over the embedded one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides_path: Option<PathBuf>,
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self {
            targets: default_targets(),
            strict_ordering: true,
            overrides_path: None,
        }
    }
}

impl BisectConfig {
    pub fn order_mode(&self) -> OrderMode {
        if self.strict_ordering {
            OrderMode::Strict
        } else {
            OrderMode::Lenient
        }
    }
}

/// Targets matching the host platform.
pub fn default_targets() -> Vec<String> {
    let arch = match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "x86",
        "arm" => "armv7l",
        "powerpc64" => "ppc64",
        "s390x" => "s390x",
        other => other,
    };
    match std::env::consts::OS {
        "macos" => vec![format!("osx-{}-tar", arch)],
        "windows" => vec![format!("win-{}-zip", arch)],
        "aix" => vec![format!("aix-{}", arch)],
        "solaris" | "illumos" => vec![format!("sunos-{}", arch)],
        _ => vec![format!("linux-{}", arch)],
    }
}
