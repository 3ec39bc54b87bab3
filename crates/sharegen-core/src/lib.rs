//! Sharegen Core - batch execution engine for rate-limited API pipelines
//!
//! This crate provides the provider-agnostic pieces: pacing, retry,
//! checkpointing, HTTP plumbing, shutdown and progress reporting.

pub mod checkpoint;
pub mod http;
pub mod logging;
pub mod progress;
pub mod rate_limit;
pub mod retry;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use checkpoint::{
    CheckpointStore, TerminalOutcome, TerminalSet, checkpoint_path, trim_torn_tail,
};
pub use http::{SHARED_RUNTIME, http_client};
pub use logging::{ProgressLogger, init_logging, register_secret};
pub use progress::{ProgressContext, RecordProgress, SharedProgress, Tally};
pub use rate_limit::RateLimiter;
pub use retry::{Classify, ErrorClass, RetryPolicy, RetryState, Step, Terminal, retry_with_backoff};
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown, shutdown_flag};
pub use work_queue::WorkQueue;
