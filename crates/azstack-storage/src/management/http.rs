//! HTTP layer: status mapping and retry.
//!
//! This is the ONLY place for status code handling. management/mod.rs never
//! interprets status codes.

use std::time::Duration;

use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use tracing::{debug, warn};

use crate::auth::TokenProvider;
use crate::error::{StorageError, StorageResult};
use crate::types::ManagementConfig;

/// Longest single wait between retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// HTTP backend for making requests (holds reqwest client, auth, config).
#[derive(Debug, Clone)]
pub(crate) struct HttpBackend {
    pub(crate) client: reqwest::Client,
    pub(crate) base_url: String,
    pub(crate) token_provider: TokenProvider,
    pub(crate) config: ManagementConfig,
}

impl HttpBackend {
    /// GET a JSON document.
    pub(crate) async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> StorageResult<T> {
        let response = self.request(reqwest::Method::GET, url).await?;
        decode(response).await
    }

    /// POST with an empty body, decoding the JSON response.
    pub(crate) async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
    ) -> StorageResult<T> {
        let response = self.request(reqwest::Method::POST, url).await?;
        decode(response).await
    }

    /// Make a request, retrying transient failures.
    pub(crate) async fn request(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> StorageResult<reqwest::Response> {
        use rand::Rng;

        let mut retries = 0;
        let max_retries = self.config.max_retries;

        loop {
            let result = self.request_once(method.clone(), url).await;

            match result {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && retries < max_retries => {
                    retries += 1;

                    let backoff = match &e {
                        StorageError::RateLimited {
                            retry_after: Some(retry_after),
                        } => {
                            let capped = (*retry_after).min(MAX_BACKOFF);
                            let base_ms = capped.as_millis() as u64;
                            let jitter_factor: f64 =
                                rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
                            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
                            Duration::from_millis(jittered_ms.max(100))
                        }
                        _ => {
                            let base_backoff = exponential_backoff(retries);
                            let jittered_ms =
                                rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
                            Duration::from_millis(jittered_ms.max(10))
                        }
                    };

                    warn!(
                        error = %e,
                        retry = retries,
                        max_retries = max_retries,
                        backoff_ms = backoff.as_millis(),
                        "retrying management request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_once(
        &self,
        method: reqwest::Method,
        url: &str,
    ) -> StorageResult<reqwest::Response> {
        debug!(%method, url, "management request");

        let mut request = self.client.request(method, url);

        if let Some(token) = self.token_provider.get_token().await? {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await?;
        let status = response.status();

        match status.as_u16() {
            200..=299 => Ok(response),

            401 | 403 => {
                let body = response.text().await.unwrap_or_default();
                Err(StorageError::Unauthorized {
                    message: format!("HTTP {}: {}", status.as_u16(), truncate(&body)),
                })
            }

            404 => Err(StorageError::NotFound {
                resource: resource_path(url),
            }),

            429 => {
                let retry_after = response
                    .headers()
                    .get(reqwest::header::RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(StorageError::RateLimited { retry_after })
            }

            500..=599 => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(StorageError::Network {
                    message: format!("HTTP {}: {}", status.as_u16(), truncate(&message)),
                })
            }

            _ => {
                let message = response.text().await.unwrap_or_else(|_| status.to_string());
                Err(StorageError::InvalidResponse {
                    message: format!("HTTP {}: {}", status.as_u16(), truncate(&message)),
                })
            }
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> StorageResult<T> {
    if response.status() == StatusCode::NO_CONTENT {
        return Err(StorageError::InvalidResponse {
            message: "empty response body".to_string(),
        });
    }

    response
        .json()
        .await
        .map_err(|e| StorageError::InvalidResponse {
            message: format!("failed to parse response: {}", e),
        })
}

/// Base delay before jitter for retry number `retries`: 2^retries seconds, capped at [`MAX_BACKOFF`].
fn exponential_backoff(retries: u32) -> Duration {
    let secs = 1u64.checked_shl(retries).unwrap_or(u64::MAX);
    Duration::from_secs(secs).min(MAX_BACKOFF)
}

/// Path portion of a URL, without the query string.
pub(crate) fn resource_path(url: &str) -> String {
    let without_query = url.split('?').next().unwrap_or(url);
    match url::Url::parse(without_query) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => without_query.to_string(),
    }
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
