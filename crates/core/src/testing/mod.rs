//! Testing utilities and mock implementations.
//!
//! Mock implementations of the index source and the build runner let a
//! whole bisection run without network access or real builds.
//!
//! # Example
//!
//! ```rust,ignore
//! use nightly_bisect_core::testing::{fixtures, MockBuildRunner, MockIndexSource};
//! use nightly_bisect_core::RunStatus;
//!
//! let index = MockIndexSource::new();
//! index.set_builds(fixtures::regression_index()).await;
//!
//! let runner = MockBuildRunner::new();
//! runner.set_status("8353854ed7", RunStatus::exited(0)).await;
//! ```

mod mock_index_source;
mod mock_runner;

pub use mock_index_source::MockIndexSource;
pub use mock_runner::{MockBuildRunner, RecordedRun};

/// Serve a single HTTP response on a local port.
///
/// The request is read up to the end of its headers, answered with
/// `HTTP/1.1 <status_line>` and `body`, and the connection is closed.
pub async fn serve_once(status_line: &'static str, body: &'static str) -> std::net::SocketAddr {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind local listener");
    let addr = listener.local_addr().expect("local address");

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match socket.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );
        let _ = socket.write_all(response.as_bytes()).await;
        let _ = socket.shutdown().await;
    });

    addr
}

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::NaiveDate;

    use crate::builds::{BuildInfo, RawBuild};

    /// Nightly version string for `date` (`YYYY-MM-DD`) and `commit`.
    pub fn nightly_version(major: u64, date: &str, commit: &str) -> String {
        format!("v{}.0.0-nightly{}{}", major, date.replace('-', ""), commit)
    }

    /// A raw index entry.
    pub fn raw_build(version: &str, files: &[&str]) -> RawBuild {
        RawBuild {
            version: version.to_string(),
            date: None,
            files: files.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// A normalized build on `date` (`YYYY-MM-DD`).
    pub fn build_info(date: &str, commit: &str, files: &[&str]) -> BuildInfo {
        BuildInfo {
            version: nightly_version(16, date, commit),
            files: files.iter().map(|f| f.to_string()).collect(),
            commit: commit.to_string(),
            date: NaiveDate::parse_from_str(date, "%Y-%m-%d").expect("fixture date"),
        }
    }

    /// Three consecutive trunk nightlies, newest first, as the index lists
    /// them. Only the middle one publishes `aix-ppc64`.
    pub fn regression_index() -> Vec<RawBuild> {
        vec![
            raw_build(
                &nightly_version(16, "2021-02-18", "9a2ac2c615"),
                &["linux-x64", "osx-x64-tar", "win-x64-zip"],
            ),
            raw_build(
                &nightly_version(16, "2021-02-17", "8353854ed7"),
                &["aix-ppc64", "linux-x64", "osx-x64-tar", "win-x64-zip"],
            ),
            raw_build(
                &nightly_version(16, "2021-02-16", "eec20ed5c1"),
                &["linux-x64", "osx-x64-tar", "win-x64-zip"],
            ),
        ]
    }
}
