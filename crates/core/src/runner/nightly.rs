//! Runner that downloads, extracts and executes published nightly builds.

use async_trait::async_trait;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, info, warn};

use crate::cache::DownloadCache;
use crate::config::RunnerConfig;

use super::archive::{parse_checksums, ArchiveFormat, ArchiveSpec};
use super::error::RunnerError;
use super::traits::BuildRunner;
use super::types::{RunRequest, RunStatus, BINARY_ENV};

const CHECKSUM_FILE: &str = "SHASUMS256.txt";
const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Runs nightly builds published under `dist_url/<version>/`.
pub struct NightlyRunner {
    cache: DownloadCache,
    config: RunnerConfig,
}

impl NightlyRunner {
    /// Creates a runner downloading through `cache`.
    pub fn new(config: RunnerConfig, cache: DownloadCache) -> Self {
        Self { cache, config }
    }

    /// Creates a runner with its own cache rooted at `cache_dir`.
    pub fn with_client(config: RunnerConfig, client: Client, cache_dir: PathBuf) -> Self {
        Self::new(config, DownloadCache::new(cache_dir, client))
    }

    fn build_url(&self, version: &str, file: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.dist_url.trim_end_matches('/'),
            version,
            file
        )
    }

    /// Check the archive against the published checksum list. A corrupt
    /// archive is evicted from the cache.
    async fn verify(
        &self,
        version: &str,
        spec: &ArchiveSpec,
        archive: &Path,
    ) -> Result<(), RunnerError> {
        let sums_path = self
            .cache
            .fetch(&self.build_url(version, CHECKSUM_FILE))
            .await?;
        let sums = fs::read_to_string(&sums_path).await?;

        let expected = parse_checksums(&sums)
            .into_iter()
            .find(|(name, _)| name == &spec.file_name)
            .map(|(_, digest)| digest)
            .ok_or_else(|| RunnerError::ChecksumMissing {
                file: spec.file_name.clone(),
            })?;

        let actual = sha256_file(archive).await?;
        if actual != expected {
            if let Err(e) = fs::remove_file(archive).await {
                warn!(path = %archive.display(), error = %e, "Failed to evict corrupt archive");
            }
            return Err(RunnerError::ChecksumMismatch {
                file: spec.file_name.clone(),
                expected,
                actual,
            });
        }

        debug!(file = %spec.file_name, "Checksum verified");
        Ok(())
    }

    /// Extract the runtime binary into `dest`, returning its path.
    async fn extract(
        &self,
        archive: &Path,
        spec: &ArchiveSpec,
        dest: &Path,
    ) -> Result<PathBuf, RunnerError> {
        let binary = dest.join(&spec.binary_member);
        if fs::try_exists(&binary).await.unwrap_or(false) {
            debug!(binary = %binary.display(), "Binary already extracted");
            return Ok(binary);
        }

        debug!(archive = %archive.display(), member = %spec.binary_member, "Extracting");
        match spec.format {
            ArchiveFormat::TarGz | ArchiveFormat::TarXz => {
                let output = Command::new("tar")
                    .arg("-xf")
                    .arg(archive)
                    .arg("-C")
                    .arg(dest)
                    .arg(&spec.binary_member)
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(|e| {
                        RunnerError::extraction_failed(archive, &spec.binary_member, e.to_string())
                    })?;

                if !output.status.success() {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    return Err(RunnerError::extraction_failed(
                        archive,
                        &spec.binary_member,
                        stderr.trim().to_string(),
                    ));
                }
            }
            ArchiveFormat::Zip => {
                let (zip_path, member, target) = (
                    archive.to_path_buf(),
                    spec.binary_member.clone(),
                    binary.clone(),
                );
                tokio::task::spawn_blocking(move || extract_zip_member(&zip_path, &member, &target))
                    .await
                    .map_err(|e| {
                        RunnerError::extraction_failed(archive, &spec.binary_member, e.to_string())
                    })??;
            }
        }

        if !fs::try_exists(&binary).await.unwrap_or(false) {
            return Err(RunnerError::extraction_failed(
                archive,
                &spec.binary_member,
                "binary missing after extraction",
            ));
        }

        Ok(binary)
    }

    /// Run the test command with `binary` first on `PATH`.
    async fn execute(&self, request: &RunRequest, binary: &Path) -> Result<RunStatus, RunnerError> {
        let program = request
            .command
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| binary.to_path_buf());

        let mut command = Command::new(&program);
        command
            .args(&request.args)
            .env(BINARY_ENV, binary)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(bin_dir) = binary.parent() {
            let existing = std::env::var_os("PATH").unwrap_or_default();
            let paths =
                std::iter::once(bin_dir.to_path_buf()).chain(std::env::split_paths(&existing));
            if let Ok(joined) = std::env::join_paths(paths) {
                command.env("PATH", joined);
            }
        }

        let mut child = command.spawn().map_err(|e| RunnerError::SpawnFailed {
            command: program.display().to_string(),
            source: e,
        })?;

        let forwarding = futures::future::join(
            forward_output(child.stdout.take(), "stdout"),
            forward_output(child.stderr.take(), "stderr"),
        );

        let status = match self.config.timeout_secs {
            Some(secs) => {
                let waited = timeout(Duration::from_secs(secs), async {
                    let (status, _) = tokio::join!(child.wait(), forwarding);
                    status
                })
                .await;
                match waited {
                    Ok(status) => status?,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!(error = %e, "Failed to kill timed out test command");
                        }
                        return Err(RunnerError::Timeout { timeout_secs: secs });
                    }
                }
            }
            None => {
                let (status, _) = tokio::join!(child.wait(), forwarding);
                status?
            }
        };

        Ok(RunStatus::from(status))
    }
}

#[async_trait]
impl BuildRunner for NightlyRunner {
    fn name(&self) -> &str {
        "nightly"
    }

    async fn run(&self, request: &RunRequest) -> Result<RunStatus, RunnerError> {
        let spec = ArchiveSpec::resolve(&self.config.binary_name, &request.version, &request.target)?;

        let archive = self
            .cache
            .fetch(&self.build_url(&request.version, &spec.file_name))
            .await?;

        if self.config.verify_checksums {
            self.verify(&request.version, &spec, &archive).await?;
        }

        let dest = request
            .scratch_dir
            .join(format!("{}-{}", request.version, request.target));
        fs::create_dir_all(&dest).await?;
        let binary = self.extract(&archive, &spec, &dest).await?;

        info!(
            version = %request.version,
            target = %request.target,
            command = %request.command_line(),
            "Running test command"
        );
        let status = self.execute(request, &binary).await?;
        info!(
            version = %request.version,
            exit_code = ?status.exit_code,
            signal = ?status.signal,
            "Test command finished"
        );

        Ok(status)
    }
}

/// Forward the lines of a child's output stream to the log.
///
/// Lines are decoded lossily and the pipe is drained until EOF, so a child
/// printing invalid UTF-8 never hits a closed pipe.
async fn forward_output<R>(reader: Option<R>, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut line = Vec::new();
    loop {
        line.clear();
        match reader.read_until(b'\n', &mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let text = String::from_utf8_lossy(&line);
                info!(stream = stream, "{}", text.trim_end_matches(['\r', '\n']));
            }
            Err(e) => {
                warn!(stream = stream, error = %e, "Failed to read test command output");
                break;
            }
        }
    }
}

/// Copy one member of a zip archive to `target`.
fn extract_zip_member(archive: &Path, member: &str, target: &Path) -> Result<(), RunnerError> {
    let fail = |reason: String| RunnerError::extraction_failed(archive, member, reason);

    let file = std::fs::File::open(archive)?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| fail(e.to_string()))?;
    let mut entry = zip.by_name(member).map_err(|e| fail(e.to_string()))?;

    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut out = std::fs::File::create(target)?;
    std::io::copy(&mut entry, &mut out)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Some(mode) = entry.unix_mode() {
            std::fs::set_permissions(target, std::fs::Permissions::from_mode(mode))?;
        }
    }

    Ok(())
}

async fn sha256_file(path: &Path) -> Result<String, RunnerError> {
    let file = File::open(path).await?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    let mut hasher = Sha256::new();

    loop {
        let bytes_read = reader.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
