//! Client-credentials token exchange.

use std::time::Duration;

use fakts_protocol::messages::ClientCredentialsForm;
use fakts_protocol::{AuthConfig, Token, Validate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ConnectError;
use crate::http::send_json;

/// Obtains an access token with the credentials of a claimed configuration.
pub async fn login(
    http: &reqwest::Client,
    auth: &AuthConfig,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Token, ConnectError> {
    debug!(token_url = %auth.token_url, client_id = %auth.client_id, "requesting token");

    let scope = auth.scopes.join(" ");
    let form = ClientCredentialsForm {
        grant_type: "client_credentials",
        client_id: &auth.client_id,
        client_secret: &auth.client_secret,
        scope: &scope,
    };
    let token: Token = send_json(http.post(&auth.token_url).form(&form), timeout, cancel)
        .await
        .map_err(|e| e.into_connect(ConnectError::TokenExchangeFailed))?;

    token
        .validate()
        .map_err(|e| ConnectError::TokenExchangeFailed(e.to_string()))?;
    info!(expires_in = ?token.expires_in, "token issued");
    Ok(token)
}
