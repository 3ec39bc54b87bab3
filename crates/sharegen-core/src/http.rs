//! Shared HTTP client construction and the runtime that drives it.
//!
//! Requests use async reqwest internally but are issued through
//! [`SHARED_RUNTIME`] so callers keep a blocking, thread-per-worker model.

use std::sync::LazyLock;
use std::time::Duration;

/// Connect timeout
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default upper bound for a whole request (send + body)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build an HTTP client with connection pooling and bounded timeouts.
///
/// `pool_size` should match the number of workers issuing requests.
pub fn http_client(
    request_timeout: Duration,
    pool_size: usize,
) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .pool_max_idle_per_host(pool_size.max(1))
        .user_agent(concat!("sharegen/", env!("CARGO_PKG_VERSION")))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_builds_with_timeouts() {
        assert!(http_client(DEFAULT_REQUEST_TIMEOUT, 4).is_ok());
    }

    #[test]
    fn runtime_drives_futures() {
        let v = SHARED_RUNTIME.handle().block_on(async { 40 + 2 });
        assert_eq!(v, 42);
    }
}
