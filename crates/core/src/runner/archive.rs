//! Mapping build targets to published archives.
//!
//! Index targets look like `platform-arch[-format]`: `linux-x64`,
//! `osx-arm64-tar`, `win-x64-zip`, `aix-ppc64`. Installer-only formats
//! (`pkg`, `msi`, `exe`, `7z`) and the `headers`/`src` pseudo-targets have
//! no extractable binary.

use serde::{Deserialize, Serialize};

use super::error::RunnerError;

/// Archive container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    TarGz,
    TarXz,
    Zip,
}

impl ArchiveFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::TarGz => "tar.gz",
            Self::TarXz => "tar.xz",
            Self::Zip => "zip",
        }
    }
}

/// Where to find the runtime binary for one build and target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSpec {
    /// Archive file name, e.g. `node-v16.0.0-nightly…-linux-x64.tar.xz`.
    pub file_name: String,
    pub format: ArchiveFormat,
    /// Path of the binary inside the archive.
    pub binary_member: String,
}

impl ArchiveSpec {
    /// Resolve the archive for `binary_name` at `version` on `target`.
    pub fn resolve(binary_name: &str, version: &str, target: &str) -> Result<Self, RunnerError> {
        let unsupported = || RunnerError::UnsupportedTarget {
            target: target.to_string(),
        };

        let mut parts = target.split('-');
        let platform = parts.next().filter(|p| !p.is_empty()).ok_or_else(unsupported)?;
        let arch = parts.next().filter(|a| !a.is_empty()).ok_or_else(unsupported)?;
        let format = parts.next();
        if parts.next().is_some() {
            return Err(unsupported());
        }

        let (platform, format) = match (platform, format) {
            ("linux", None) => ("linux", ArchiveFormat::TarXz),
            ("osx", Some("tar")) => ("darwin", ArchiveFormat::TarGz),
            ("win", Some("zip")) => ("win", ArchiveFormat::Zip),
            ("aix" | "sunos", None) => (platform, ArchiveFormat::TarGz),
            _ => return Err(unsupported()),
        };

        let dir_name = format!("{}-{}-{}-{}", binary_name, version, platform, arch);
        let binary_member = match format {
            ArchiveFormat::Zip => format!("{}/{}.exe", dir_name, binary_name),
            ArchiveFormat::TarGz | ArchiveFormat::TarXz => {
                format!("{}/bin/{}", dir_name, binary_name)
            }
        };

        Ok(Self {
            file_name: format!("{}.{}", dir_name, format.extension()),
            format,
            binary_member,
        })
    }
}

/// Parse a `SHASUMS256.txt` body into `(file name, hex digest)` pairs.
pub(crate) fn parse_checksums(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let digest = fields.next()?;
            let name = fields.next()?.trim_start_matches('*');
            Some((name.to_string(), digest.to_lowercase()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERSION: &str = "v16.0.0-nightly202102189a2ac2c615";

    #[test]
    fn test_linux_uses_xz() {
        let spec = ArchiveSpec::resolve("node", VERSION, "linux-x64").unwrap();
        assert_eq!(
            spec.file_name,
            "node-v16.0.0-nightly202102189a2ac2c615-linux-x64.tar.xz"
        );
        assert_eq!(spec.format, ArchiveFormat::TarXz);
        assert_eq!(
            spec.binary_member,
            "node-v16.0.0-nightly202102189a2ac2c615-linux-x64/bin/node"
        );
    }

    #[test]
    fn test_osx_maps_to_darwin() {
        let spec = ArchiveSpec::resolve("node", VERSION, "osx-arm64-tar").unwrap();
        assert_eq!(
            spec.file_name,
            "node-v16.0.0-nightly202102189a2ac2c615-darwin-arm64.tar.gz"
        );
    }

    #[test]
    fn test_windows_zip() {
        let spec = ArchiveSpec::resolve("node", VERSION, "win-x64-zip").unwrap();
        assert_eq!(spec.format, ArchiveFormat::Zip);
        assert_eq!(
            spec.binary_member,
            "node-v16.0.0-nightly202102189a2ac2c615-win-x64/node.exe"
        );
    }

    #[test]
    fn test_aix() {
        let spec = ArchiveSpec::resolve("node", VERSION, "aix-ppc64").unwrap();
        assert_eq!(
            spec.file_name,
            "node-v16.0.0-nightly202102189a2ac2c615-aix-ppc64.tar.gz"
        );
    }

    #[test]
    fn test_installers_and_pseudo_targets_unsupported() {
        for target in ["osx-x64-pkg", "win-x64-msi", "win-x64-7z", "headers", "src", "linux"] {
            let result = ArchiveSpec::resolve("node", VERSION, target);
            assert!(
                matches!(result, Err(RunnerError::UnsupportedTarget { .. })),
                "{target}"
            );
        }
    }

    #[test]
    fn test_parse_checksums() {
        let text = "\
0123abcd  node-v16.0.0-nightly202102189a2ac2c615-linux-x64.tar.xz
FEDC9876 *node-v16.0.0-nightly202102189a2ac2c615-win-x64.zip

";
        let sums = parse_checksums(text);
        assert_eq!(sums.len(), 2);
        assert_eq!(sums[0].1, "0123abcd");
        assert_eq!(sums[1].0, "node-v16.0.0-nightly202102189a2ac2c615-win-x64.zip");
        assert_eq!(sums[1].1, "fedc9876");
    }
}
