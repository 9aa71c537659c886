//! Shared HTTP client.
//!
//! One client is built per run and handed to the index source and the
//! download cache, so every request of the run reuses the same connection
//! pool. Dropping the last clone closes the pooled connections.

use reqwest::Client;
use std::time::Duration;

const USER_AGENT: &str = concat!("nightly-bisect/", env!("CARGO_PKG_VERSION"));
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Build the keep-alive client for one run.
///
/// No overall request timeout is set since archive downloads can be
/// large; the index source applies its own per-request timeout.
pub fn build_http_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .tcp_keepalive(POOL_IDLE_TIMEOUT)
        .build()
}
