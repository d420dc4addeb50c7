//! Fault-tolerant request execution across endpoints and credentials.
//!
//! Every remote operation (upload, signed URL, OCR) runs through
//! [`ResilientExecutor::execute`], which drives a small state machine:
//!
//! ```text
//!            ┌──────────────┐  none left   ┌───────────┐
//!   start ──▶│ TryEndpoint  │─────────────▶│ Exhausted │──▶ Err(last error)
//!            └──────┬───────┘              └───────────┘
//!                   │ untried endpoint            ▲
//!                   ▼                             │ policy off
//!            ┌──────────────┐  401/403, other ┌───┴──────────┐
//!            │   Attempt    │────────────────▶│ NextEndpoint │
//!            └──┬────────┬──┘                 └──────────────┘
//!        200    │        │ transport / 503 / 504
//!               ▼        ▼
//!         ┌─────────┐  ┌───────────────────┐  retries left: sleep, Attempt
//!         │ Success │  │ RetrySameEndpoint │  none left:    NextEndpoint
//!         └─────────┘  └───────────────────┘
//! ```
//!
//! A fresh credential is drawn for every attempt unless the caller pins one.
//! Retry `n` on an endpoint waits `backoff_base * 2^(n-1)` first. Any other
//! non-success status either moves to the next endpoint or, with
//! `retry_different_endpoint` off, is returned at once. The request budget
//! is `endpoints × (max_retries + 1)`.

use crate::config::{mask_credential, OcrConfig};
use crate::error::{OcrError, Operation};
use crate::pipeline::rotator::{credential_pool, endpoint_pool, CredentialPool, EndpointPool};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// What one request attempt should target.
#[derive(Clone, PartialEq, Eq)]
pub struct Attempt {
    /// Base URL ending in `/`.
    pub endpoint: String,
    /// Credential for the `Authorization: Bearer` header.
    pub credential: String,
    /// Zero-based attempt number on this endpoint.
    pub number: u32,
}

impl fmt::Debug for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attempt")
            .field("endpoint", &self.endpoint)
            .field("credential", &mask_credential(&self.credential))
            .field("number", &self.number)
            .finish()
    }
}

/// A 200 reply and the attempt that produced it.
#[derive(Debug, Clone)]
pub struct Exchange {
    pub reply: HttpReply,
    pub attempt: Attempt,
}

/// A decoded 200 body, its raw bytes, and the credential that was accepted.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    pub value: T,
    pub raw: Vec<u8>,
    pub credential: String,
}

/// Retry knobs taken from [`OcrConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub retry_different_endpoint: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_base: Duration::from_secs(1),
            retry_different_endpoint: true,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &OcrConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            backoff_base: Duration::from_millis(config.retry_backoff_ms),
            retry_different_endpoint: config.retry_different_endpoint,
        }
    }

    /// Delay before attempt `attempt` (zero for the first attempt).
    pub fn backoff(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        self.backoff_base
            .saturating_mul(2u32.saturating_pow(attempt - 1))
    }
}

/// Where a response status sends the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// 200: decode and return.
    Success,
    /// 503/504: retry on the same endpoint.
    RetrySameEndpoint,
    /// 401/403, or any other status with endpoint switching on.
    NextEndpoint,
    /// Any other status with endpoint switching off: fail now.
    Abort,
}

/// Map a status code and the endpoint-switching policy to a transition.
pub fn classify(status: u16, retry_different_endpoint: bool) -> Transition {
    match status {
        200 => Transition::Success,
        503 | 504 => Transition::RetrySameEndpoint,
        401 | 403 => Transition::NextEndpoint,
        _ if retry_different_endpoint => Transition::NextEndpoint,
        _ => Transition::Abort,
    }
}

#[derive(Debug)]
enum State {
    TryEndpoint,
    Attempt { endpoint: String, attempt: u32 },
    RetrySameEndpoint { endpoint: String, attempt: u32 },
    NextEndpoint,
    Success(Exchange),
    Exhausted,
}

/// Runs one logical operation with endpoint and credential rotation.
#[derive(Debug)]
pub struct ResilientExecutor {
    credentials: CredentialPool,
    endpoints: EndpointPool,
    policy: RetryPolicy,
}

impl ResilientExecutor {
    pub fn new(credentials: CredentialPool, endpoints: EndpointPool, policy: RetryPolicy) -> Self {
        Self {
            credentials,
            endpoints,
            policy,
        }
    }

    /// Build pools (random offsets) and policy from a validated config.
    pub fn from_config(config: &OcrConfig) -> Result<Self, OcrError> {
        Ok(Self::new(
            credential_pool(&config.api_keys)?,
            endpoint_pool(&config.base_urls),
            RetryPolicy::from_config(config),
        ))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn credentials(&self) -> &CredentialPool {
        &self.credentials
    }

    pub fn endpoints(&self) -> &EndpointPool {
        &self.endpoints
    }

    /// Execute `send` under the retry policy and return the 200 reply.
    ///
    /// `send` performs exactly one HTTP exchange. An `Err` from it is a
    /// transport failure and is retried on the same endpoint.
    pub async fn execute<F, Fut>(&self, operation: Operation, send: F) -> Result<HttpReply, OcrError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<HttpReply, OcrError>>,
    {
        self.execute_as(operation, None, send)
            .await
            .map(|exchange| exchange.reply)
    }

    /// Like [`Self::execute`], optionally pinned to one credential.
    ///
    /// With `credential` set every attempt uses it and the credential pool is
    /// left untouched; files uploaded with a key can only be read with that
    /// key. With `None` a fresh credential is drawn for every attempt.
    pub async fn execute_as<F, Fut>(
        &self,
        operation: Operation,
        credential: Option<&str>,
        mut send: F,
    ) -> Result<Exchange, OcrError>
    where
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<HttpReply, OcrError>>,
    {
        let mut tried: HashSet<String> = HashSet::new();
        let mut last_err: Option<OcrError> = None;
        let mut state = State::TryEndpoint;

        loop {
            state = match state {
                State::TryEndpoint => match self.select_endpoint(&tried) {
                    Some(endpoint) => {
                        info!(%operation, endpoint = %endpoint, "Trying endpoint");
                        tried.insert(endpoint.clone());
                        State::Attempt {
                            endpoint,
                            attempt: 0,
                        }
                    }
                    None => State::Exhausted,
                },

                State::RetrySameEndpoint { endpoint, attempt } => {
                    let delay = self.policy.backoff(attempt);
                    warn!(
                        %operation,
                        "Retry {}/{} on {} after {:?}",
                        attempt, self.policy.max_retries, endpoint, delay
                    );
                    sleep(delay).await;
                    State::Attempt { endpoint, attempt }
                }

                State::Attempt { endpoint, attempt } => {
                    let credential = match credential {
                        Some(pinned) => pinned.to_string(),
                        None => self.credentials.next(),
                    };
                    debug!(
                        %operation,
                        endpoint = %endpoint,
                        key = %mask_credential(&credential),
                        attempt = attempt + 1,
                        "Sending request"
                    );

                    let current = Attempt {
                        endpoint: endpoint.clone(),
                        credential,
                        number: attempt,
                    };
                    let outcome = send(current.clone()).await;

                    match outcome {
                        Err(e) => {
                            warn!(%operation, "Attempt {} failed: {}", attempt + 1, e);
                            last_err = Some(e);
                            self.after_retryable(endpoint, attempt)
                        }
                        Ok(reply) => {
                            debug!(%operation, status = reply.status, "Received response");
                            match classify(reply.status, self.policy.retry_different_endpoint) {
                                Transition::Success => State::Success(Exchange {
                                    reply,
                                    attempt: current,
                                }),
                                Transition::RetrySameEndpoint => {
                                    warn!(%operation, status = reply.status, "Service unavailable");
                                    last_err = Some(status_error(operation, &reply));
                                    self.after_retryable(endpoint, attempt)
                                }
                                Transition::NextEndpoint => {
                                    warn!(
                                        %operation,
                                        status = reply.status,
                                        "Request rejected; moving to another endpoint"
                                    );
                                    last_err = Some(status_error(operation, &reply));
                                    State::NextEndpoint
                                }
                                Transition::Abort => {
                                    return Err(status_error(operation, &reply));
                                }
                            }
                        }
                    }
                }

                State::NextEndpoint => {
                    if self.policy.retry_different_endpoint {
                        State::TryEndpoint
                    } else {
                        State::Exhausted
                    }
                }

                State::Success(exchange) => return Ok(exchange),

                State::Exhausted => {
                    let err = last_err.unwrap_or_else(|| OcrError::Transport {
                        operation,
                        detail: "no endpoint could be tried".into(),
                    });
                    warn!(%operation, "All attempts failed: {}", err);
                    return Err(err);
                }
            };
        }
    }

    /// [`Self::execute_as`], then decode the 200 body as JSON.
    ///
    /// Decode failures are returned as-is and not retried.
    pub async fn execute_json<T, F, Fut>(
        &self,
        operation: Operation,
        credential: Option<&str>,
        send: F,
    ) -> Result<Decoded<T>, OcrError>
    where
        T: DeserializeOwned,
        F: FnMut(Attempt) -> Fut,
        Fut: Future<Output = Result<HttpReply, OcrError>>,
    {
        let Exchange { reply, attempt } = self.execute_as(operation, credential, send).await?;
        let value = serde_json::from_slice(&reply.body)
            .map_err(|source| OcrError::Decode { operation, source })?;
        Ok(Decoded {
            value,
            raw: reply.body,
            credential: attempt.credential,
        })
    }

    fn after_retryable(&self, endpoint: String, attempt: u32) -> State {
        if attempt < self.policy.max_retries {
            State::RetrySameEndpoint {
                endpoint,
                attempt: attempt + 1,
            }
        } else {
            State::NextEndpoint
        }
    }

    /// The endpoint under the cursor, advancing past ones already tried.
    fn select_endpoint(&self, tried: &HashSet<String>) -> Option<String> {
        for _ in 0..self.endpoints.len() {
            let endpoint = self.endpoints.current();
            if !tried.contains(&endpoint) {
                return Some(endpoint);
            }
            self.endpoints.next();
        }
        None
    }
}

fn status_error(operation: Operation, reply: &HttpReply) -> OcrError {
    OcrError::HttpStatus {
        operation,
        status: reply.status,
        body: reply.body_text(),
    }
}
