//! JSON request helper shared by the handshake and token exchange.

use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;

use crate::error::ConnectError;

const MAX_BODY_IN_ERROR: usize = 200;

#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestError {
    #[error("cancelled")]
    Cancelled,

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Transport(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RequestError {
    /// Maps to a stage error, keeping cancellation distinct.
    pub(crate) fn into_connect(self, stage: fn(String) -> ConnectError) -> ConnectError {
        match self {
            Self::Cancelled => ConnectError::Cancelled,
            other => stage(other.to_string()),
        }
    }
}

/// Sends `req` and decodes a 2xx JSON body, bounded by `timeout` and `cancel`.
pub(crate) async fn send_json<R: DeserializeOwned>(
    req: reqwest::RequestBuilder,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<R, RequestError> {
    let exchange = async {
        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.bytes().await?;
        if !status.is_success() {
            let mut text = String::from_utf8_lossy(&body).into_owned();
            if text.len() > MAX_BODY_IN_ERROR {
                let mut cut = MAX_BODY_IN_ERROR;
                while !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            return Err(RequestError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok::<R, RequestError>(serde_json::from_slice(&body)?)
    };

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RequestError::Cancelled),
        r = tokio::time::timeout(timeout, exchange) => {
            r.unwrap_or_else(|_| Err(RequestError::Timeout(timeout)))
        }
    }
}
