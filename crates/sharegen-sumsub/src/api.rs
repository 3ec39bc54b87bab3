//! Sumsub API client: signed share-token requests

use std::time::Duration;

use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sharegen_core::{Classify, ErrorClass, SHARED_RUNTIME};

type HmacSha256 = Hmac<Sha256>;

/// Share token issuance endpoint
pub const SHARE_TOKEN_PATH: &str = "/resources/accessTokens/shareToken";

pub const DEFAULT_BASE_URL: &str = "https://api.sumsub.com";

/// Recipient client the tokens are issued for
pub const DEFAULT_CLIENT_ID: &str = "reap.global_116803";

/// Token lifetime: 21 days
pub const DEFAULT_TTL_SECS: u64 = 1_814_400;

/// App credentials used to sign every request
#[derive(Clone)]
pub struct Credentials {
    pub app_token: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("app_token", &"<redacted>")
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Where and for whom tokens are issued
#[derive(Clone, Debug, PartialEq)]
pub struct ClientConfig {
    pub base_url: String,
    pub client_id: String,
    pub ttl_secs: u64,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            ttl_secs: DEFAULT_TTL_SECS,
            request_timeout: sharegen_core::http::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

/// Request body; field order is part of the signed payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareTokenRequest<'a> {
    pub applicant_id: &'a str,
    pub for_client_id: &'a str,
    pub ttl_in_secs: u64,
}

/// Successful issuance
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareToken {
    pub token: String,
    pub for_client_id: String,
}

/// Error body returned by the provider
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    description: Option<String>,
    error_name: Option<String>,
}

/// Failure of a single share-token request
#[derive(Clone, Debug, PartialEq)]
pub enum ApiError {
    /// Non-success HTTP status
    Http {
        status: u16,
        description: Option<String>,
        retry_after: Option<Duration>,
    },
    /// No response: connect failure, reset, timeout
    Network { message: String, timeout: bool },
    /// Success status but unusable body
    Decode(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status,
                description: Some(d),
                ..
            } => write!(f, "HTTP {status}: {d}"),
            Self::Http { status, .. } => write!(f, "HTTP {status}"),
            Self::Network {
                message,
                timeout: true,
            } => write!(f, "timeout: {message}"),
            Self::Network { message, .. } => write!(f, "network error: {message}"),
            Self::Decode(msg) => write!(f, "invalid response: {msg}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl Classify for ApiError {
    fn class(&self) -> ErrorClass {
        match self {
            Self::Http {
                status: 401 | 403, ..
            } => ErrorClass::Fatal,
            Self::Http {
                status: 429 | 500..=599,
                ..
            } => ErrorClass::Transient,
            Self::Http { .. } => ErrorClass::Permanent,
            Self::Network { .. } => ErrorClass::Transient,
            Self::Decode(_) => ErrorClass::Permanent,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Http { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl ApiError {
    /// Create error from a reqwest failure (URL stripped)
    pub fn from_reqwest(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Http {
                status: status.as_u16(),
                description: None,
                retry_after: None,
            },
            None => Self::Network {
                timeout: e.is_timeout(),
                message: e.without_url().to_string(),
            },
        }
    }

    /// Build from an error response's status, body and `Retry-After`
    pub fn from_response(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
        let description = parsed
            .description
            .or(parsed.error_name)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Self::Http {
            status,
            description,
            retry_after,
        }
    }

    /// Text for the output `error` column
    pub fn reason(&self) -> String {
        match self {
            Self::Http {
                description: Some(d),
                ..
            } => d.clone(),
            Self::Http { status: 404, .. } => "Applicant not found".to_string(),
            Self::Http { status: 400, .. } => "Malformed request".to_string(),
            Self::Http { status, .. } => format!("HTTP {status}"),
            other => other.to_string(),
        }
    }
}

/// Parse `Retry-After` given in (possibly fractional) seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Decode a success body into a token
pub fn parse_share_token(body: &str, default_client_id: &str) -> Result<ShareToken, ApiError> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Raw {
        token: Option<String>,
        for_client_id: Option<String>,
    }
    let raw: Raw = serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let token = raw
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::Decode("missing token".to_string()))?;
    Ok(ShareToken {
        token,
        for_client_id: raw
            .for_client_id
            .unwrap_or_else(|| default_client_id.to_string()),
    })
}

/// Lowercase hex HMAC-SHA256 over `ts + METHOD + path + body`
pub fn sign_request(secret: &str, ts: i64, method: &str, path: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(ts.to_string().as_bytes());
    mac.update(method.to_ascii_uppercase().as_bytes());
    mac.update(path.as_bytes());
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Anything that can issue a share token for an applicant.
///
/// One call is one network attempt; retries and pacing live in the executor.
pub trait TokenApi: Send + Sync {
    fn issue(&self, applicant_id: &str) -> Result<ShareToken, ApiError>;

    /// One-line description of the request `issue` would send (dry-run)
    fn describe(&self, applicant_id: &str) -> String {
        format!("issue share token for {applicant_id}")
    }
}

/// Blocking Sumsub client over the shared runtime.
pub struct SumsubClient {
    http: reqwest::Client,
    credentials: Credentials,
    config: ClientConfig,
}

impl std::fmt::Debug for SumsubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SumsubClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SumsubClient {
    /// `pool_size` is the number of workers sharing the client.
    pub fn new(
        credentials: Credentials,
        mut config: ClientConfig,
        pool_size: usize,
    ) -> Result<Self, reqwest::Error> {
        config.base_url = config.base_url.trim_end_matches('/').to_string();
        let http = sharegen_core::http_client(config.request_timeout, pool_size)?;
        Ok(Self {
            http,
            credentials,
            config,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self) -> String {
        format!("{}{SHARE_TOKEN_PATH}", self.config.base_url)
    }

    fn body(&self, applicant_id: &str) -> Result<String, ApiError> {
        let request = ShareTokenRequest {
            applicant_id,
            for_client_id: &self.config.client_id,
            ttl_in_secs: self.config.ttl_secs,
        };
        serde_json::to_string(&request).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

impl TokenApi for SumsubClient {
    fn issue(&self, applicant_id: &str) -> Result<ShareToken, ApiError> {
        let body = self.body(applicant_id)?;
        let ts = chrono::Utc::now().timestamp();
        let signature = sign_request(&self.credentials.secret, ts, "POST", SHARE_TOKEN_PATH, &body);
        log::debug!("POST {} body={body}", self.url());

        SHARED_RUNTIME.handle().block_on(async {
            let response = self
                .http
                .post(self.url())
                .header("X-App-Token", &self.credentials.app_token)
                .header("X-App-Access-Ts", ts.to_string())
                .header("X-App-Access-Sig", signature)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await
                .map_err(ApiError::from_reqwest)?;

            let status = response.status();
            if status.is_success() {
                let text = response.text().await.map_err(ApiError::from_reqwest)?;
                return parse_share_token(&text, &self.config.client_id);
            }

            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            Err(ApiError::from_response(status.as_u16(), &text, retry_after))
        })
    }

    fn describe(&self, applicant_id: &str) -> String {
        let body = self
            .body(applicant_id)
            .unwrap_or_else(|e| format!("<unencodable: {e}>"));
        format!("POST {} payload={body}", self.url())
    }
}
