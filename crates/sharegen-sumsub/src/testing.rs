//! Scripted in-process `TokenApi` for unit tests

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use rustc_hash::FxHashMap;
use sharegen_core::RetryPolicy;

use crate::api::{ApiError, ShareToken, TokenApi};

type Response = Result<ShareToken, ApiError>;

/// Replays queued responses per applicant and records every call.
pub struct ScriptedApi {
    scripts: Mutex<FxHashMap<String, VecDeque<Response>>>,
    fallback: Response,
    calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    /// Applicants without a script get a token named after them
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(FxHashMap::default()),
            fallback: Ok(token("")),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn respond(self, applicant_id: &str, responses: Vec<Response>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(applicant_id.to_string(), responses.into());
        self
    }

    /// Response once an applicant's script runs out (or has none)
    pub fn fallback(mut self, response: Response) -> Self {
        self.fallback = response;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, applicant_id: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| *c == applicant_id)
            .count()
    }
}

impl TokenApi for ScriptedApi {
    fn issue(&self, applicant_id: &str) -> Result<ShareToken, ApiError> {
        self.calls.lock().unwrap().push(applicant_id.to_string());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(applicant_id)
            .and_then(VecDeque::pop_front);
        match scripted.unwrap_or_else(|| self.fallback.clone()) {
            Ok(t) if t.token.is_empty() => Ok(token(&format!("tok-{applicant_id}"))),
            other => other,
        }
    }
}

pub fn token(value: &str) -> ShareToken {
    ShareToken {
        token: value.to_string(),
        for_client_id: "client-1".to_string(),
    }
}

pub fn http_err(status: u16) -> ApiError {
    ApiError::Http {
        status,
        description: None,
        retry_after: None,
    }
}

pub fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        factor: 2.0,
        max_delay: Some(Duration::from_millis(5)),
    }
}
