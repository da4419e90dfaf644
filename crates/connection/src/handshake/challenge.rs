use fakts_protocol::EndpointDescriptor;
use fakts_protocol::constants::CHALLENGE_ROUTE;
use fakts_protocol::messages::{ChallengeRequest, ChallengeResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::DeviceCode;
use crate::error::ConnectError;
use crate::http::{RequestError, send_json};
use crate::types::ChallengeConfig;

/// Polls the challenge route until consent is decided.
///
/// Each poll is bounded by `challenge_timeout`. Pending answers, timeouts
/// and transport failures use up one of `max_retries` attempts; any other
/// answer ends polling immediately. Returns the issued token.
pub async fn challenge(
    http: &reqwest::Client,
    endpoint: &EndpointDescriptor,
    code: &DeviceCode,
    config: &ChallengeConfig,
    cancel: &CancellationToken,
) -> Result<String, ConnectError> {
    let url = endpoint.route(CHALLENGE_ROUTE);
    let body = ChallengeRequest {
        code: code.as_str().to_string(),
    };

    for attempt in 1..=config.max_retries {
        let result: Result<ChallengeResponse, RequestError> = send_json(
            http.post(&url).json(&body),
            config.challenge_timeout,
            cancel,
        )
        .await;

        match result {
            Ok(ChallengeResponse::Granted { token }) if !token.is_empty() => {
                info!(attempt, "consent granted");
                return Ok(token);
            }
            Ok(ChallengeResponse::Granted { .. }) => {
                return Err(ConnectError::ChallengeFailed("granted without a token".into()));
            }
            Ok(ChallengeResponse::Pending { .. }) => {
                debug!(attempt, max = config.max_retries, "consent pending");
            }
            Ok(ChallengeResponse::Denied { message }) => {
                return Err(ConnectError::ConsentRejected(message));
            }
            Ok(ChallengeResponse::Expired { .. }) => {
                return Err(ConnectError::ConsentTimeout { attempts: attempt });
            }
            Ok(ChallengeResponse::Error { message }) => {
                return Err(ConnectError::ChallengeFailed(message));
            }
            Err(RequestError::Cancelled) => return Err(ConnectError::Cancelled),
            Err(e @ (RequestError::Timeout(_) | RequestError::Transport(_))) => {
                warn!(attempt, error = %e, "challenge poll failed");
            }
            Err(RequestError::Status { status, .. }) if status >= 500 => {
                warn!(attempt, status, "challenge poll failed");
            }
            Err(e) => return Err(ConnectError::ChallengeFailed(e.to_string())),
        }

        if attempt < config.max_retries {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ConnectError::Cancelled),
                _ = tokio::time::sleep(config.poll_interval) => {}
            }
        }
    }

    Err(ConnectError::ConsentTimeout {
        attempts: config.max_retries,
    })
}
