//! Long-running operation polling
//!
//! Mutating calls may answer `202 Accepted` with a `Location` to poll. The
//! operation status payload reports its state under either `Status` or `State`.

use crate::client::FabricClient;
use crate::error::{FabricError, Result};
use reqwest::Response;
use reqwest::header::{LOCATION, RETRY_AFTER};
use serde::Deserialize;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct OperationStatus {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "State", default)]
    state: String,
    #[serde(rename = "Error", default)]
    error: Option<OperationError>,
}

#[derive(Debug, Default, Deserialize)]
struct OperationError {
    #[serde(rename = "Message", default)]
    message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Progress {
    Succeeded,
    Failed(String),
    Pending,
}

impl OperationStatus {
    fn state(&self) -> &str {
        if self.status.is_empty() {
            &self.state
        } else {
            &self.status
        }
    }

    pub(crate) fn progress(&self) -> Progress {
        match self.state().to_ascii_lowercase().as_str() {
            "succeeded" | "success" | "completed" | "complete" => Progress::Succeeded,
            "failed" | "faulted" => Progress::Failed(
                self.error
                    .as_ref()
                    .map(|e| e.message.clone())
                    .unwrap_or_default(),
            ),
            _ => Progress::Pending,
        }
    }
}

/// Whole seconds from a `Retry-After` header, ignoring zero and unparseable values.
pub(crate) fn retry_after(value: Option<&str>) -> Option<Duration> {
    let secs: u64 = value?.trim().parse().ok()?;
    (secs > 0).then(|| Duration::from_secs(secs))
}

pub(crate) fn location_of(response: &Response) -> Option<String> {
    response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

impl FabricClient {
    /// Settle a mutating response: poll on `202 Accepted`, otherwise drain.
    pub(crate) async fn complete(&self, cancel: &CancellationToken, response: Response) -> Result<()> {
        if response.status() == reqwest::StatusCode::ACCEPTED {
            let location = location_of(&response).unwrap_or_default();
            self.drain(cancel, response).await?;
            return self.poll_operation(cancel, &location).await;
        }
        self.drain(cancel, response).await
    }

    /// Poll `location` until the operation reaches a terminal state.
    ///
    /// An empty location means the cluster finished synchronously.
    pub async fn poll_operation(&self, cancel: &CancellationToken, location: &str) -> Result<()> {
        if location.is_empty() {
            return Ok(());
        }

        let mut delay = self.timings().operation_poll_delay;
        loop {
            let target = self.resolve_location(location)?;
            tracing::debug!(location = %target, "polling operation");

            let response = self.dispatch(cancel, self.get_url(target)).await?;
            let status = response.status();
            let retry = retry_after(
                response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok()),
            );
            let body = self.read_body(cancel, response).await?;

            if status.as_u16() >= 400 {
                return Err(FabricError::PollFailed {
                    status,
                    body: String::from_utf8_lossy(&body).trim().to_string(),
                });
            }

            let operation: OperationStatus = serde_json::from_slice(&body)
                .map_err(|e| FabricError::decode("operation status", e, &body))?;

            match operation.progress() {
                Progress::Succeeded => {
                    tracing::debug!(state = operation.state(), "operation completed");
                    return Ok(());
                }
                Progress::Failed(message) => return Err(FabricError::OperationFailed(message)),
                Progress::Pending => {}
            }

            if let Some(retry) = retry {
                delay = retry;
            }
            tracing::debug!(state = operation.state(), delay_secs = delay.as_secs_f64(), "operation pending");

            tokio::select! {
                _ = cancel.cancelled() => return Err(FabricError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(json: &str) -> OperationStatus {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_terminal_states() {
        for state in ["Succeeded", "success", "COMPLETED", "complete"] {
            let payload = format!(r#"{{"Status":"{}"}}"#, state);
            assert_eq!(status(&payload).progress(), Progress::Succeeded);
        }
        assert_eq!(
            status(r#"{"State":"Faulted","Error":{"Code":"X","Message":"disk full"}}"#).progress(),
            Progress::Failed("disk full".to_string())
        );
        assert_eq!(status(r#"{"Status":"failed"}"#).progress(), Progress::Failed(String::new()));
    }

    #[test]
    fn test_status_wins_over_state() {
        assert_eq!(
            status(r#"{"Status":"Running","State":"Succeeded"}"#).progress(),
            Progress::Pending
        );
        assert_eq!(
            status(r#"{"Status":"","State":"Succeeded"}"#).progress(),
            Progress::Succeeded
        );
    }

    #[test]
    fn test_unknown_state_keeps_polling() {
        assert_eq!(status(r#"{"Status":"Provisioning"}"#).progress(), Progress::Pending);
        assert_eq!(status("{}").progress(), Progress::Pending);
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(retry_after(Some("2")), Some(Duration::from_secs(2)));
        assert_eq!(retry_after(Some(" 7 ")), Some(Duration::from_secs(7)));
        assert_eq!(retry_after(Some("0")), None);
        assert_eq!(retry_after(Some("-1")), None);
        assert_eq!(retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
        assert_eq!(retry_after(None), None);
    }
}
