use fakts_protocol::EndpointDescriptor;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{DeviceCode, challenge};
use crate::error::ConnectError;
use crate::surface::{ConsentSurface, SurfaceHandle};
use crate::types::ChallengeConfig;

/// Shows the consent URL for `code` and polls until consent is decided.
///
/// The surface is opened once and closed exactly once before this returns,
/// whatever the polling outcome. Close failures are logged. `opened` is
/// called with the URL once the surface is showing it.
pub async fn await_consent(
    surface: Option<&dyn ConsentSurface>,
    opened: impl FnOnce(&str),
    http: &reqwest::Client,
    endpoint: &EndpointDescriptor,
    code: &DeviceCode,
    config: &ChallengeConfig,
    cancel: &CancellationToken,
) -> Result<String, ConnectError> {
    let surface = surface.ok_or_else(|| {
        ConnectError::ConsentSurfaceUnavailable("no consent surface configured".into())
    })?;
    let url = endpoint.configure_url(code.as_str());
    let handle = surface
        .open(&url)
        .map_err(|e| ConnectError::ConsentSurfaceUnavailable(e.to_string()))?;
    opened(&url);

    let guard = SurfaceGuard(Some(handle));
    let outcome = challenge(http, endpoint, code, config, cancel).await;
    guard.close().await;
    outcome
}

/// Closes the wrapped surface once, on [`close`](Self::close) or on drop.
struct SurfaceGuard(Option<Box<dyn SurfaceHandle>>);

impl SurfaceGuard {
    async fn close(mut self) {
        if let Some(handle) = self.0.take() {
            close_handle(handle).await;
        }
    }
}

impl Drop for SurfaceGuard {
    fn drop(&mut self) {
        // Reached when the polling future is dropped mid-flight.
        if let Some(handle) = self.0.take()
            && let Ok(rt) = tokio::runtime::Handle::try_current()
        {
            rt.spawn(close_handle(handle));
        }
    }
}

async fn close_handle(handle: Box<dyn SurfaceHandle>) {
    match handle.close().await {
        Ok(()) => debug!("consent surface closed"),
        Err(e) => warn!(error = %e, "failed to close consent surface"),
    }
}
