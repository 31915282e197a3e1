use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::blockchain::models::{BlockData, TransactionData};

/// JSON-RPC error code some providers use for "limit exceeded".
const RPC_LIMIT_EXCEEDED: i64 = -32005;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Rate limited by provider: {0}")]
    RateLimited(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn from_rpc(code: i64, message: String) -> Self {
        if code == RPC_LIMIT_EXCEEDED || mentions_rate_limit(&message) {
            ClientError::RateLimited(message)
        } else {
            ClientError::Rpc { code, message }
        }
    }

    /// Throttling by the provider; pollers answer this with a longer delay.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, ClientError::RateLimited(_))
    }

    /// Worth retrying right away: connection trouble, timeouts, 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Transport(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Unavailable(_) => true,
            _ => false,
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("too many requests") || message.contains("rate limit")
}

/// Per-chain RPC collaborator. `None` means the provider does not have the
/// item (yet); callers skip it instead of failing.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    type Block: BlockData;
    type Transaction: TransactionData;

    /// Lowercase chain identifier stored alongside every indexed row.
    fn blockchain(&self) -> &str;

    async fn get_latest_block_number(&self) -> Result<u64, ClientError>;

    async fn get_block(
        &self,
        number: u64,
        include_transactions: bool,
    ) -> Result<Option<Self::Block>, ClientError>;

    async fn get_transaction(&self, hash: &str) -> Result<Option<Self::Transaction>, ClientError>;
}

/// Retry schedule for transient transport failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_times: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_times: 3,
            min_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_times: 0,
            ..Self::default()
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_times)
    }

    /// Run `op`, retrying only transient errors. Rate limiting is returned
    /// to the caller untouched.
    pub async fn run<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        op.retry(self.backoff())
            .when(ClientError::is_transient)
            .notify(|err: &ClientError, dur: Duration| {
                warn!("Retrying RPC call in {:?}: {}", dur, err);
            })
            .await
    }
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Minimal JSON-RPC 2.0 over HTTP, shared by the chain clients.
pub struct JsonRpcTransport {
    http: reqwest::Client,
    url: String,
    auth: Option<(String, Option<String>)>,
    next_id: AtomicU64,
}

impl JsonRpcTransport {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            auth: None,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn with_basic_auth(mut self, user: String, password: Option<String>) -> Self {
        self.auth = Some((user, password));
        self
    }

    /// One request, no retries; callers wrap it in a `RetryPolicy`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, ClientError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let mut request = self.http.post(&self.url).json(&body);
        if let Some((user, password)) = &self.auth {
            request = request.basic_auth(user, password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited(format!("{} returned {}", method, status)));
        }

        // Some nodes answer RPC errors with a 5xx status and a JSON body,
        // so the body is parsed before the status is judged.
        let text = response.text().await?;
        match serde_json::from_str::<RpcResponse>(&text) {
            Ok(RpcResponse { error: Some(err), .. }) => Err(ClientError::from_rpc(err.code, err.message)),
            Ok(RpcResponse { result, .. }) => {
                debug!("{} #{} answered", method, id);
                serde_json::from_value(result.unwrap_or(Value::Null))
                    .map_err(|e| ClientError::Decode(format!("{}: {}", method, e)))
            }
            Err(_) if mentions_rate_limit(&text) => Err(ClientError::RateLimited(text)),
            Err(_) if status.is_server_error() => {
                Err(ClientError::Unavailable(format!("{} returned {}", method, status)))
            }
            Err(e) => Err(ClientError::Decode(format!("{}: {}", method, e))),
        }
    }
}
