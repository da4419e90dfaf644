//! Service resolution fan-out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fakts_discovery::{Client as DiscoveryClient, DiscoveryError};
use fakts_protocol::{ActiveFakts, Alias, Token};
use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{ConnectError, ServiceError};
use crate::manifest::Manifest;
use crate::service::{BuilderInput, Service, ServiceDefinition, ServiceRegistry};

/// A service that resolved and built successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableService {
    pub key: String,
    pub service: String,
    pub resolved: Alias,
}

/// An optional service that could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedService {
    pub key: String,
    pub service: String,
    /// Candidate aliases the service had, empty when it had no instance.
    pub aliases: Vec<Alias>,
    pub reason: String,
}

/// Result of a successful connection.
///
/// Replaced as a whole on every connect, reconnect or disconnect.
#[derive(Debug)]
pub struct ConnectedContext {
    pub fakts: Arc<ActiveFakts>,
    pub token: Token,
    pub clients: HashMap<String, Service>,
    /// Sorted by key.
    pub available_services: Vec<AvailableService>,
    /// Sorted by key.
    pub unresolved_services: Vec<UnresolvedService>,
}

impl ConnectedContext {
    pub fn service(&self, key: &str) -> Option<&Service> {
        self.clients.get(key)
    }

    pub fn is_available(&self, key: &str) -> bool {
        self.clients.contains_key(key)
    }
}

/// Resolves and builds every registered service concurrently.
///
/// All services run to completion before the outcome is decided, so every
/// optional failure is recorded even when a required one aborts the batch.
/// The first failed required service in key order is reported.
pub async fn build_context(
    discovery: &DiscoveryClient,
    fakts: Arc<ActiveFakts>,
    manifest: Arc<Manifest>,
    registry: &ServiceRegistry,
    token: Token,
    alias_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<ConnectedContext, ConnectError> {
    let tasks = registry.iter().map(|definition| {
        let input = Resolution {
            discovery,
            fakts: &fakts,
            manifest: &manifest,
            token: &token,
            alias_timeout,
            cancel,
        };
        async move { (definition, input.resolve(definition).await) }
    });
    let outcomes = join_all(tasks).await;

    if outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, Err(e) if interrupted(e)))
    {
        return Err(ConnectError::Cancelled);
    }

    let mut clients = HashMap::new();
    let mut available_services = Vec::new();
    let mut unresolved_services = Vec::new();
    let mut required_failure = None;

    for (definition, outcome) in outcomes {
        match outcome {
            Ok((alias, client)) => {
                debug!(key = %definition.key, alias = %alias, kind = client.kind(), "service ready");
                available_services.push(AvailableService {
                    key: definition.key.clone(),
                    service: definition.service.clone(),
                    resolved: alias,
                });
                clients.insert(definition.key.clone(), client);
            }
            Err(e) if definition.optional => {
                warn!(key = %definition.key, error = %e, "optional service unavailable");
                unresolved_services.push(UnresolvedService {
                    key: definition.key.clone(),
                    service: definition.service.clone(),
                    aliases: fakts
                        .instances
                        .get(&definition.key)
                        .map(|i| i.aliases.clone())
                        .unwrap_or_default(),
                    reason: e.to_string(),
                });
            }
            Err(e) => {
                error!(key = %definition.key, error = %e, "required service unavailable");
                if required_failure.is_none() {
                    required_failure = Some((definition.key.clone(), e));
                }
            }
        }
    }

    if let Some((key, source)) = required_failure {
        return Err(ConnectError::RequiredServiceResolutionFailed {
            key,
            source,
            unresolved: unresolved_services,
        });
    }

    info!(
        available = available_services.len(),
        unresolved = unresolved_services.len(),
        "services resolved"
    );
    Ok(ConnectedContext {
        fakts,
        token,
        clients,
        available_services,
        unresolved_services,
    })
}

fn interrupted(error: &ServiceError) -> bool {
    matches!(
        error,
        ServiceError::Cancelled | ServiceError::Alias(DiscoveryError::Cancelled)
    )
}

/// Shared inputs for resolving one service.
#[derive(Clone, Copy)]
struct Resolution<'a> {
    discovery: &'a DiscoveryClient,
    fakts: &'a Arc<ActiveFakts>,
    manifest: &'a Arc<Manifest>,
    token: &'a Token,
    alias_timeout: Duration,
    cancel: &'a CancellationToken,
}

impl Resolution<'_> {
    async fn resolve(self, definition: &ServiceDefinition) -> Result<(Alias, Service), ServiceError> {
        let instance = self
            .fakts
            .instances
            .get(&definition.key)
            .ok_or_else(|| ServiceError::MissingInstance(definition.key.clone()))?;

        let alias = self
            .discovery
            .resolve_working_alias(instance, self.alias_timeout, self.cancel)
            .await?;

        let input = BuilderInput {
            manifest: Arc::clone(self.manifest),
            alias: alias.clone(),
            token: self.token.clone(),
            fakts: Arc::clone(self.fakts),
            instance: instance.clone(),
        };
        let client = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ServiceError::Cancelled),
            r = definition.builder().build(input) => r?,
        };
        Ok((alias, client))
    }
}
