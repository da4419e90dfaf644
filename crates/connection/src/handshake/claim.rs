use std::time::Duration;

use fakts_protocol::constants::CLAIM_ROUTE;
use fakts_protocol::messages::{ClaimRequest, ClaimResponse};
use fakts_protocol::{ActiveFakts, EndpointDescriptor, Validate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ConnectError;
use crate::http::send_json;

/// Exchanges an issued token for the session configuration.
pub async fn claim(
    http: &reqwest::Client,
    endpoint: &EndpointDescriptor,
    token: &str,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ActiveFakts, ConnectError> {
    let url = endpoint.route(CLAIM_ROUTE);
    debug!(%url, "claiming configuration");

    let body = ClaimRequest {
        token: token.to_string(),
        secure: false,
    };
    let resp: ClaimResponse = send_json(http.post(&url).json(&body), timeout, cancel)
        .await
        .map_err(|e| e.into_connect(ConnectError::ClaimFailed))?;

    let fakts = match resp {
        ClaimResponse::Granted { config } => *config,
        ClaimResponse::Error { message } => return Err(ConnectError::ClaimFailed(message)),
    };
    fakts
        .validate()
        .map_err(|e| ConnectError::ClaimFailed(format!("invalid configuration: {e}")))?;

    info!(
        deployment = fakts.deployment.deployment_name.as_deref().unwrap_or("-"),
        instances = fakts.instances.len(),
        "configuration claimed"
    );
    Ok(fakts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fakts_test_support::{MockServer, Reply};
    use serde_json::json;

    fn config() -> serde_json::Value {
        json!({
            "self": {"deployment_name": "lab"},
            "auth": {
                "client_id": "id",
                "client_secret": "secret",
                "token_url": "http://127.0.0.1:1/o/token/",
                "scopes": ["read"]
            },
            "instances": {
                "mikro": {
                    "service": "live.arkitekt.mikro",
                    "identifier": "mikro",
                    "aliases": [{"host": "127.0.0.1", "port": 8080, "ssl": false}]
                }
            }
        })
    }

    async fn run(server: &MockServer) -> Result<ActiveFakts, ConnectError> {
        let endpoint = EndpointDescriptor::new(server.url()).unwrap();
        claim(
            &reqwest::Client::new(),
            &endpoint,
            "T",
            Duration::from_secs(2),
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn granted_config_is_returned() {
        let server = MockServer::start(|req| {
            assert_eq!(req.path, "/claim/");
            assert_eq!(req.json()["token"], "T");
            assert_eq!(req.json()["secure"], false);
            Reply::json(json!({"status": "granted", "config": config()}))
        })
        .await;

        let fakts = run(&server).await.unwrap();
        assert_eq!(fakts.auth.client_id, "id");
        assert_eq!(fakts.instances["mikro"].aliases[0].port, Some(8080));
    }

    #[tokio::test]
    async fn rejected_token_fails() {
        let server = MockServer::start(|_| {
            Reply::json(json!({"status": "error", "message": "token already claimed"}))
        })
        .await;
        let err = run(&server).await.unwrap_err();
        assert!(matches!(err, ConnectError::ClaimFailed(ref m) if m.contains("already claimed")));
    }

    #[tokio::test]
    async fn invalid_config_fails_validation() {
        let server = MockServer::start(|_| {
            let mut cfg = config();
            cfg["auth"]["client_secret"] = json!("");
            Reply::json(json!({"status": "granted", "config": cfg}))
        })
        .await;
        let err = run(&server).await.unwrap_err();
        assert!(matches!(err, ConnectError::ClaimFailed(ref m) if m.contains("client_secret")));
    }

    #[tokio::test]
    async fn malformed_config_fails() {
        let server = MockServer::start(|_| {
            Reply::json(json!({"status": "granted", "config": {"instances": {}}}))
        })
        .await;
        let err = run(&server).await.unwrap_err();
        assert!(matches!(err, ConnectError::ClaimFailed(_)));
    }
}
