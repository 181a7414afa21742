//! HttpCoachBackend -- concrete [`CoachBackend`] over HTTP.
//!
//! Posts the prompt request as JSON. The backend answers either with a
//! JSON body `{"text": "..."}` or, when it chooses to stream, with a
//! chunked `text/event-stream` body that the core's reconstructor parses.
//! Status codes are classified into the error taxonomy here; retry policy
//! lives in the pipeline.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and never appears
//! in Debug output or logs.

use std::time::Duration;

use futures_util::TryStreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use amity_core::backend::{BackendResponse, CoachBackend};
use amity_types::backend::BackendRequest;
use amity_types::error::{BackendError, DispatchError, TransportError};

/// HTTP client for the coaching backend.
pub struct HttpCoachBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

/// Non-streaming response body.
#[derive(Debug, Deserialize)]
struct CompleteBody {
    text: String,
}

impl HttpCoachBackend {
    /// Connect-level timeout only; the pipeline owns the per-attempt
    /// dispatch timeout.
    pub fn new(base_url: String, api_key: SecretString) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn url(&self) -> String {
        format!("{}/v1/replies", self.base_url.trim_end_matches('/'))
    }
}

impl CoachBackend for HttpCoachBackend {
    async fn dispatch(&self, request: &BackendRequest) -> Result<BackendResponse, DispatchError> {
        let response = self
            .client
            .post(self.url())
            .bearer_auth(self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = parse_retry_after(&response);
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status.as_u16(), retry_after_ms, body).into());
        }

        let streaming = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("text/event-stream"));

        if streaming {
            // Chunk boundaries carry no meaning; the reconstructor
            // re-frames into lines. Event lines are ASCII, so the lossy
            // conversion never mangles protocol text.
            let chunks = response
                .bytes_stream()
                .map_ok(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .map_err(|e| TransportError::Interrupted(e.to_string()));
            Ok(BackendResponse::Streaming(Box::pin(chunks)))
        } else {
            let body: CompleteBody = response
                .json()
                .await
                .map_err(|e| BackendError::InvalidRequest(format!("malformed reply body: {e}")))?;
            Ok(BackendResponse::Complete(body.text))
        }
    }
}

/// Map reqwest send errors into the transport taxonomy.
fn classify_reqwest(err: reqwest::Error) -> DispatchError {
    if err.is_timeout() {
        TransportError::Timeout(Duration::from_secs(10)).into()
    } else {
        TransportError::Connection(err.to_string()).into()
    }
}

/// Map an HTTP status into the backend taxonomy.
fn classify_status(status: u16, retry_after_ms: Option<u64>, body: String) -> BackendError {
    match status {
        429 => BackendError::RateLimited { retry_after_ms },
        401 | 403 => BackendError::AuthFailed,
        500..=599 => BackendError::Server {
            status,
            message: body,
        },
        _ => BackendError::InvalidRequest(format!("status {status}: {body}")),
    }
}

/// `Retry-After` header in seconds, when present and numeric.
fn parse_retry_after(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|secs| secs * 1_000)
}
