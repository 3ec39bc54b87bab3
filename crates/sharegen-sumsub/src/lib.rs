//! Sharegen Sumsub - share-token batch pipeline
//!
//! This crate reads applicant records, issues one signed share-token
//! request per record and writes the results incrementally, with
//! checkpointed resume.

pub mod api;
pub mod config;
pub mod executor;
pub mod output;
pub mod record;
pub mod runner;
pub mod state;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports
pub use api::{ApiError, ClientConfig, Credentials, ShareToken, SumsubClient, TokenApi};
pub use config::{Config, ConfigError, RunArgs};
pub use executor::RequestExecutor;
pub use output::{OutputRow, ResultSink};
pub use record::{InputError, InputRecord, read_records};
pub use runner::{Orchestrator, run};
pub use state::{ProcessingOutcome, RunMode};
pub use stats::RunSummary;
