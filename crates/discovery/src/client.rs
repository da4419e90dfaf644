use std::time::Duration;

use fakts_protocol::constants::WELL_KNOWN_PATH;
use fakts_protocol::{EndpointDescriptor, normalize_base_url};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::DiscoveryError;

/// Discovers fakts endpoints over HTTP.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone, Default)]
pub struct Client {
    pub(crate) http: reqwest::Client,
}

impl Client {
    /// Creates a discovery client with its own connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a discovery client sharing an existing `reqwest` pool.
    pub fn with_http(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// Resolves a user-supplied URL into an endpoint descriptor.
    ///
    /// Candidates from [`candidate_urls`] are tried in order until one
    /// answers; all of them share one `timeout`. Unreachable candidates
    /// fall through to the next one, a reachable candidate with a bad
    /// answer fails immediately.
    pub async fn discover(
        &self,
        url: &str,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<EndpointDescriptor, DiscoveryError> {
        let candidates = candidate_urls(url)?;
        let deadline = Instant::now() + timeout;
        let mut last_error = format!("timed out after {}ms", timeout.as_millis());

        for candidate in candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let well_known = format!("{candidate}{WELL_KNOWN_PATH}");
            debug!(url = %well_known, "querying discovery document");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                r = tokio::time::timeout(remaining, self.fetch(&well_known)) => r,
            };

            match result {
                Ok(Ok(endpoint)) => {
                    info!(base_url = %endpoint.base_url, "discovered endpoint");
                    return Ok(endpoint);
                }
                Ok(Err(DiscoveryError::Unreachable(reason))) => {
                    debug!(url = %candidate, %reason, "candidate unreachable");
                    last_error = reason;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    last_error = format!("timed out after {}ms", timeout.as_millis());
                    break;
                }
            }
        }

        Err(DiscoveryError::Unreachable(last_error))
    }

    async fn fetch(&self, url: &str) -> Result<EndpointDescriptor, DiscoveryError> {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DiscoveryError::InvalidResponse(format!("HTTP {status}")));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| DiscoveryError::Unreachable(e.to_string()))?;

        let mut endpoint: EndpointDescriptor = serde_json::from_slice(&body)
            .map_err(|e| DiscoveryError::InvalidResponse(e.to_string()))?;
        endpoint.base_url = normalize_base_url(&endpoint.base_url)
            .map_err(|e| {
                DiscoveryError::InvalidResponse(format!("base_url {:?}: {e}", endpoint.base_url))
            })?
            .to_string();
        Ok(endpoint)
    }
}

/// Expands user input into the absolute URLs discovery will try.
///
/// Input without a scheme is tried as `https://` first, then `http://`.
/// Every candidate ends in `/`.
pub fn candidate_urls(input: &str) -> Result<Vec<String>, DiscoveryError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(DiscoveryError::InvalidUrl {
            url: input.to_string(),
            reason: "empty".into(),
        });
    }

    let raw: Vec<String> = if trimmed.contains("://") {
        vec![trimmed.to_string()]
    } else {
        vec![format!("https://{trimmed}"), format!("http://{trimmed}")]
    };

    raw.iter()
        .map(|u| {
            normalize_base_url(u)
                .map(|url| url.to_string())
                .map_err(|e| DiscoveryError::InvalidUrl {
                    url: input.to_string(),
                    reason: e.to_string(),
                })
        })
        .collect()
}
