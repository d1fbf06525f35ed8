//! A small retrying HTTP client shared by both provider adapters, in the
//! shape of the teacher's `lexe_api::rest::RestClient`: a thin wrapper
//! around one shared `reqwest::Client`, a `from`/`to` pair for logging, and
//! a `send_with_retries` that layers backoff over plain `send`.

use std::borrow::Cow;
use std::time::Duration;

use billing_common::backoff::BackoffPolicy;
use billing_common::error::{ProviderError, ProviderErrorCode};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    from: Cow<'static, str>,
    to: &'static str,
    backoff: BackoffPolicy,
}

impl RestClient {
    pub fn new(from: impl Into<Cow<'static, str>>, to: &'static str, timeout: Duration) -> Self {
        let from = from.into();
        let client = reqwest::Client::builder()
            .user_agent(from.to_string())
            .timeout(timeout)
            .build()
            .expect("failed to build reqwest client");
        Self { client, from, to, backoff: BackoffPolicy::CARD_PROVIDER }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn post_json<T: Serialize + ?Sized>(&self, url: &str, body: &T) -> reqwest::RequestBuilder {
        self.client.post(url).json(body)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url)
    }

    /// Sends `request_builder`, retrying on network errors, 5xx, and 429 per
    /// [`BackoffPolicy::CARD_PROVIDER`] (spec §4.4). Non-retryable 4xx
    /// surface immediately as `ProviderError{code=client_error}`.
    pub async fn send_with_retries<T: DeserializeOwned>(
        &self,
        request_builder: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let request = request_builder
            .build()
            .map_err(|e| ProviderError::new(ProviderErrorCode::ClientError, e.to_string()))?;

        let mut delays = self.backoff.iter();
        let mut last_err = None;

        loop {
            let attempt = request.try_clone().ok_or_else(|| {
                ProviderError::new(ProviderErrorCode::ClientError, "request body not cloneable")
            })?;

            match self.client.execute(attempt).await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json::<T>()
                            .await
                            .map_err(|e| ProviderError::new(ProviderErrorCode::ServerError, e.to_string()));
                    }
                    let retry_after = retry_after_delay(&response);
                    let code = classify_status(status);
                    let body = response.text().await.unwrap_or_default();
                    if !code.is_retryable() {
                        return Err(ProviderError::new(code, body));
                    }
                    last_err = Some(ProviderError::new(code, body));
                    match delays.next() {
                        Some(delay) => {
                            let delay = retry_after.unwrap_or(delay);
                            debug!(from = %self.from, to = self.to, ?delay, %status, "retrying provider call");
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            warn!(from = %self.from, to = self.to, "exhausted provider retries");
                            return Err(ProviderError::new(
                                ProviderErrorCode::MaxRetries,
                                last_err.map(|e| e.message).unwrap_or_default(),
                            ));
                        }
                    }
                }
                Err(e) if e.is_timeout() => {
                    last_err = Some(ProviderError::new(ProviderErrorCode::Timeout, e.to_string()));
                    match delays.next() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            return Err(ProviderError::new(
                                ProviderErrorCode::MaxRetries,
                                "timed out on every attempt".into(),
                            ))
                        }
                    }
                }
                Err(e) => {
                    last_err = Some(ProviderError::new(ProviderErrorCode::ServerError, e.to_string()));
                    match delays.next() {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            return Err(ProviderError::new(
                                ProviderErrorCode::MaxRetries,
                                last_err.map(|e| e.message).unwrap_or_default(),
                            ))
                        }
                    }
                }
            }
        }
    }
}

fn classify_status(status: StatusCode) -> ProviderErrorCode {
    if status == StatusCode::TOO_MANY_REQUESTS {
        ProviderErrorCode::ServerError
    } else if status.is_server_error() {
        ProviderErrorCode::ServerError
    } else if status == StatusCode::NOT_FOUND {
        ProviderErrorCode::NotFound
    } else {
        ProviderErrorCode::ClientError
    }
}

fn retry_after_delay(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_secs)
}
