//! Running a single nightly build.
//!
//! A [`BuildRunner`] takes a build version and target, makes the runtime
//! binary available and runs the test command against it, reporting how
//! the command exited. [`NightlyRunner`] is the real implementation: it
//! downloads the archive through the [`DownloadCache`](crate::cache::DownloadCache),
//! verifies it against the published checksums, extracts the binary with
//! the system archive tools and spawns the command.

mod archive;
mod error;
mod nightly;
mod traits;
mod types;

pub use archive::{ArchiveFormat, ArchiveSpec};
pub use error::RunnerError;
pub use nightly::NightlyRunner;
pub use traits::BuildRunner;
pub use types::{RunRequest, RunStatus, BINARY_ENV, UNTESTABLE_EXIT_CODE};
