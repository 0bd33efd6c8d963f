//! Streaming HTTP download shared by the HTTP-backed sources

use frr_core::progress::ProgressTracker;
use frr_core::{ProgressFn, SourceError};
use futures::StreamExt;
use reqwest::StatusCode;
use std::time::Duration;

const USER_AGENT: &str = "f1-race-replay/0.1";

/// Upper bound on the up-front buffer reservation
const MAX_PREALLOCATE: u64 = 64 * 1024 * 1024;

pub(crate) fn default_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Send `request` and collect the body as text, reporting progress as
/// chunks arrive.
pub(crate) async fn download(
    request: reqwest::RequestBuilder,
    progress: ProgressFn<'_>,
) -> Result<String, SourceError> {
    let response = request
        .send()
        .await
        .map_err(|e| SourceError::Transport(e.to_string()))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(SourceError::NotFound(response.url().to_string()));
    }
    if !status.is_success() {
        return Err(SourceError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        });
    }

    let total = response.content_length();
    let mut tracker = ProgressTracker::new();
    let mut body = Vec::with_capacity(total.unwrap_or(0).min(MAX_PREALLOCATE) as usize);

    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| SourceError::Transport(e.to_string()))?;
        body.extend_from_slice(&chunk);
        if let Some(percent) = tracker.observe(body.len() as u64, total) {
            progress(percent);
        }
    }
    if let Some(percent) = tracker.finish() {
        progress(percent);
    }

    String::from_utf8(body).map_err(|_| SourceError::Encoding)
}
