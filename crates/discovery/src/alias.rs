//! Alias reachability probing for [`Client`].

use std::time::Duration;

use fakts_protocol::{Alias, Instance};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::DiscoveryError;
use crate::client::Client;

impl Client {
    /// Returns the first alias of `instance` that answers its probe.
    ///
    /// Aliases are probed one at a time in declared order, each with its
    /// own `timeout`, so the result is deterministic for a given instance.
    pub async fn resolve_working_alias(
        &self,
        instance: &Instance,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Alias, DiscoveryError> {
        for alias in &instance.aliases {
            let url = alias.probe_url();
            trace!(service = %instance.service, %url, "probing alias");

            let reachable = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                r = tokio::time::timeout(timeout, self.probe(&url)) => matches!(r, Ok(true)),
            };

            if reachable {
                debug!(service = %instance.service, alias = %alias, "alias reachable");
                return Ok(alias.clone());
            }
            debug!(service = %instance.service, alias = %alias, "alias unreachable");
        }

        Err(DiscoveryError::NoReachableAlias {
            service: instance.service.clone(),
            tried: instance.aliases.len(),
        })
    }

    async fn probe(&self, url: &str) -> bool {
        match self.http.get(url).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                trace!(%url, error = %e, "probe failed");
                false
            }
        }
    }
}
