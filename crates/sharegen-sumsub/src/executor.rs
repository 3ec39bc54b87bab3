//! Request executor: one record → one [`ProcessingOutcome`]

use std::sync::Arc;

use sharegen_core::{RateLimiter, RetryPolicy, Terminal, retry_with_backoff};

use crate::api::TokenApi;
use crate::record::InputRecord;
use crate::state::ProcessingOutcome;

/// Issues tokens through `api`, pacing every attempt through the limiter.
pub struct RequestExecutor<A> {
    api: A,
    limiter: Arc<RateLimiter>,
    policy: RetryPolicy,
}

impl<A: TokenApi> RequestExecutor<A> {
    pub fn new(api: A, limiter: Arc<RateLimiter>, policy: RetryPolicy) -> Self {
        Self {
            api,
            limiter,
            policy,
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the retry state machine for one record.
    pub fn execute(&self, record: &InputRecord) -> ProcessingOutcome {
        let key = record.external_id.as_str();
        let terminal = retry_with_backoff(key, &self.policy, &self.limiter, |attempt| {
            log::debug!(
                "{key}: attempt {attempt}/{} for applicant {}",
                self.policy.max_attempts,
                record.applicant_id
            );
            self.api.issue(&record.applicant_id)
        });

        match terminal {
            Terminal::Succeeded { value, attempts } => {
                log::debug!("{key}: token issued after {attempts} attempt(s)");
                ProcessingOutcome::Success {
                    token: value.token,
                    issuer_id: value.for_client_id,
                }
            }
            Terminal::Failed {
                error,
                attempts,
                exhausted,
            } => {
                let reason = if exhausted {
                    format!("{} (gave up after {attempts} attempts)", error.reason())
                } else {
                    error.reason()
                };
                log::error!("{key}: failed: {reason}");
                ProcessingOutcome::PermanentFailure { reason }
            }
            Terminal::Fatal { error, .. } => {
                log::error!("{key}: authentication rejected: {error}");
                ProcessingOutcome::Aborted {
                    reason: error.to_string(),
                }
            }
        }
    }
}
