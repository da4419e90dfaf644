use std::fmt;
use std::time::Duration;

use fakts_protocol::EndpointDescriptor;
use fakts_protocol::constants::{REQUESTED_CLIENT_KIND, START_ROUTE};
use fakts_protocol::messages::{StartRequest, StartResponse};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::ConnectError;
use crate::http::send_json;
use crate::manifest::Manifest;

/// Opaque device code issued by the start route.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceCode(pub(crate) String);

impl DeviceCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DeviceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DeviceCode").field(&"<redacted>").finish()
    }
}

/// Requests a device code for `manifest`.
///
/// `expiration` is forwarded as whole seconds; the server picks its own
/// default when it is `None`.
pub async fn start(
    http: &reqwest::Client,
    endpoint: &EndpointDescriptor,
    manifest: &Manifest,
    expiration: Option<Duration>,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<DeviceCode, ConnectError> {
    let url = endpoint.route(START_ROUTE);
    debug!(%url, identifier = manifest.identifier(), "requesting device code");

    let body = StartRequest {
        manifest,
        expiration_time_seconds: expiration.map(|d| d.as_secs()),
        requested_client_kind: REQUESTED_CLIENT_KIND,
    };
    let resp: StartResponse = send_json(http.post(&url).json(&body), timeout, cancel)
        .await
        .map_err(|e| e.into_connect(ConnectError::AuthorizationStartFailed))?;

    match resp {
        StartResponse::Granted { code } if !code.is_empty() => {
            info!("device code issued");
            Ok(DeviceCode(code))
        }
        StartResponse::Granted { .. } => Err(ConnectError::AuthorizationStartFailed(
            "empty device code".into(),
        )),
        StartResponse::Error { message } => Err(ConnectError::AuthorizationStartFailed(message)),
    }
}
