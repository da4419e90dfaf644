//! Connection manager orchestrating discovery, the consent handshake and
//! service resolution.
//!
//! A successful connect runs discovery (for [`connect_url`]), the device
//! code handshake, token exchange and the service fan-out in order,
//! persisting the endpoint, configuration and token as each becomes
//! available. The resulting [`ConnectedContext`] is swapped in as a whole.
//!
//! [`connect_url`]: ConnectionManager::connect_url

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fakts_discovery::Client as DiscoveryClient;
use fakts_protocol::EndpointDescriptor;
use fakts_protocol::constants::{ENDPOINT_KEY, FAKTS_KEY, TOKEN_KEY};

use crate::context::{ConnectedContext, build_context};
use crate::error::ConnectError;
use crate::handshake;
use crate::login::login;
use crate::manifest::{AppIdentity, Manifest};
use crate::service::ServiceRegistry;
use crate::store::{SessionStore, StoreError};
use crate::surface::ConsentSurface;
use crate::types::{ConnectingStage, ConnectionConfig, ConnectionEvent, ConnectionState};

/// Owns the session lifecycle of one application.
pub struct ConnectionManager {
    pub(crate) manifest: Arc<Manifest>,
    pub(crate) registry: ServiceRegistry,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) surface: Option<Arc<dyn ConsentSurface>>,
    pub(crate) http: reqwest::Client,
    pub(crate) discovery: DiscoveryClient,
    pub(crate) config: ConnectionConfig,
    pub(crate) state: RwLock<ConnectionState>,
    pub(crate) connection: RwLock<Option<Arc<ConnectedContext>>>,
    pub(crate) events_tx: mpsc::Sender<ConnectionEvent>,
    pub(crate) events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager for `app`, declaring the services in `registry`.
    ///
    /// No consent surface is configured; see [`with_surface`](Self::with_surface).
    pub fn new(app: AppIdentity, registry: ServiceRegistry, store: Arc<dyn SessionStore>) -> Self {
        let (events_tx, events_rx) = mpsc::channel(64);
        let http = reqwest::Client::new();

        Self {
            manifest: Arc::new(Manifest::new(app, &registry)),
            registry,
            store,
            surface: None,
            discovery: DiscoveryClient::with_http(http.clone()),
            http,
            config: ConnectionConfig::default(),
            state: RwLock::new(ConnectionState::Disconnected),
            connection: RwLock::new(None),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    pub fn with_surface(mut self, surface: Arc<dyn ConsentSurface>) -> Self {
        self.surface = Some(surface);
        self
    }

    pub fn with_config(mut self, config: ConnectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Returns the current connection, if any.
    pub async fn connection(&self) -> Option<Arc<ConnectedContext>> {
        self.connection.read().await.clone()
    }

    /// True while a connect or reconnect attempt is running.
    pub async fn is_connecting(&self) -> bool {
        self.state.read().await.is_busy()
    }

    /// Discovers the endpoint behind `url`, then [`connect`](Self::connect)s to it.
    pub async fn connect_url(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Arc<ConnectedContext>, ConnectError> {
        self.clear_connection().await;
        self.set_state(ConnectionState::Connecting(ConnectingStage::Discovering))
            .await;

        match self
            .discovery
            .discover(url, self.config.discovery_timeout, cancel)
            .await
        {
            Ok(endpoint) => self.connect(endpoint, cancel).await,
            Err(e) => self.fail(e.into()).await,
        }
    }

    /// Runs the full handshake against `endpoint` and resolves all services.
    ///
    /// Records persisted before a failure are left in place.
    pub async fn connect(
        &self,
        endpoint: EndpointDescriptor,
        cancel: &CancellationToken,
    ) -> Result<Arc<ConnectedContext>, ConnectError> {
        info!(base_url = %endpoint.base_url, "connecting");
        self.clear_connection().await;

        match self.run_connect(&endpoint, cancel).await {
            Ok(ctx) => Ok(self.publish(ctx).await),
            Err(e) => self.fail(e).await,
        }
    }

    async fn run_connect(
        &self,
        endpoint: &EndpointDescriptor,
        cancel: &CancellationToken,
    ) -> Result<ConnectedContext, ConnectError> {
        self.set_state(ConnectionState::Connecting(ConnectingStage::Authorizing))
            .await;
        self.persist(ENDPOINT_KEY, endpoint).await?;
        let code = handshake::start(
            &self.http,
            endpoint,
            &self.manifest,
            self.config.expiration_time,
            self.config.request_timeout,
            cancel,
        )
        .await?;

        self.set_state(ConnectionState::Connecting(ConnectingStage::AwaitingConsent))
            .await;
        let issued = handshake::await_consent(
            self.surface.as_deref(),
            |url| {
                self.emit(ConnectionEvent::ConsentRequired {
                    url: url.to_string(),
                })
            },
            &self.http,
            endpoint,
            &code,
            &self.config.challenge,
            cancel,
        )
        .await?;

        self.set_state(ConnectionState::Connecting(ConnectingStage::Claiming))
            .await;
        let fakts = handshake::claim(
            &self.http,
            endpoint,
            &issued,
            self.config.request_timeout,
            cancel,
        )
        .await?;
        self.persist(FAKTS_KEY, &fakts).await?;

        self.set_state(ConnectionState::Connecting(ConnectingStage::LoggingIn))
            .await;
        let token = login(&self.http, &fakts.auth, self.config.request_timeout, cancel).await?;
        self.persist(TOKEN_KEY, &token).await?;

        self.set_state(ConnectionState::Connecting(ConnectingStage::ResolvingServices))
            .await;
        build_context(
            &self.discovery,
            Arc::new(fakts),
            Arc::clone(&self.manifest),
            &self.registry,
            token,
            self.config.alias_timeout,
            cancel,
        )
        .await
    }

    /// Drops the current connection and erases the persisted configuration
    /// and token. The endpoint record is kept.
    ///
    /// Calling this while disconnected is a no-op.
    pub async fn disconnect(&self) {
        let previous = self.connection.write().await.take();
        self.erase_session().await;
        if *self.state.read().await != ConnectionState::Disconnected {
            self.set_state(ConnectionState::Disconnected).await;
        }
        if previous.is_some() {
            info!("disconnected");
        }
    }

    /// Installs `ctx` as the current connection.
    pub(crate) async fn publish(&self, ctx: ConnectedContext) -> Arc<ConnectedContext> {
        for unresolved in &ctx.unresolved_services {
            self.emit(ConnectionEvent::ServiceUnresolved {
                key: unresolved.key.clone(),
                reason: unresolved.reason.clone(),
            });
        }
        let ctx = Arc::new(ctx);
        *self.connection.write().await = Some(Arc::clone(&ctx));
        self.set_state(ConnectionState::Connected).await;
        info!(
            services = ctx.clients.len(),
            unresolved = ctx.unresolved_services.len(),
            "connected"
        );
        ctx
    }

    async fn fail<T>(&self, error: ConnectError) -> Result<T, ConnectError> {
        warn!(stage = ?error.stage(), error = %error, "connection attempt failed");
        self.set_state(ConnectionState::Disconnected).await;
        Err(error)
    }

    async fn clear_connection(&self) {
        if self.connection.write().await.take().is_some() {
            debug!("previous connection dropped");
        }
    }

    async fn persist<T: Serialize>(&self, key: &str, value: &T) -> Result<(), ConnectError> {
        let raw = serde_json::to_string(value).map_err(StoreError::from)?;
        self.store.set(key, &raw).await?;
        debug!(key, "persisted session record");
        Ok(())
    }

    /// Removes the configuration and token records, logging failures.
    pub(crate) async fn erase_session(&self) {
        for key in [FAKTS_KEY, TOKEN_KEY] {
            if let Err(e) = self.store.remove(key).await {
                warn!(key, error = %e, "failed to erase session record");
            }
        }
    }

    pub(crate) fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!(error = %e, "connection event dropped");
        }
    }

    /// Updates the state and emits a `StateChanged` event.
    pub(crate) async fn set_state(&self, new_state: ConnectionState) {
        *self.state.write().await = new_state;
        debug!(state = %new_state, "state changed");
        self.emit(ConnectionEvent::StateChanged(new_state));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::ErrorKind;
    use crate::fixtures::{RecordingSurface, Script, fakts_server, fast_config, registry};
    use crate::store::MemoryStore;
    use fakts_test_support::{MockServer, closed_port};

    fn manager(store: Arc<MemoryStore>, surface: Arc<RecordingSurface>) -> ConnectionManager {
        ConnectionManager::new(AppIdentity::new("app", "1.0"), registry(), store)
            .with_surface(surface)
            .with_config(fast_config())
    }

    fn endpoint(server: &MockServer) -> EndpointDescriptor {
        EndpointDescriptor::new(&format!("{}f/", server.url())).unwrap()
    }

    fn drain(rx: &mut mpsc::Receiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn take_events_once() {
        let mgr = manager(Arc::new(MemoryStore::new()), Arc::default());
        assert!(mgr.take_events().await.is_some());
        assert!(mgr.take_events().await.is_none());
    }

    #[tokio::test]
    async fn new_manager_is_disconnected() {
        let mgr = manager(Arc::new(MemoryStore::new()), Arc::default());
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
        assert!(mgr.connection().await.is_none());
        assert!(!mgr.is_connecting().await);
        assert_eq!(mgr.manifest().requirements().len(), 2);
    }

    #[tokio::test]
    async fn connect_runs_every_stage() {
        let server = fakts_server(Script {
            pending_polls: 2,
            instances: vec!["mikro", "datalayer"],
            broken: vec!["datalayer"],
            ..Script::default()
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let surface = Arc::new(RecordingSurface::default());
        let mgr = manager(store.clone(), surface.clone());
        let mut events = mgr.take_events().await.unwrap();

        let ctx = mgr
            .connect(endpoint(&server), &CancellationToken::new())
            .await
            .unwrap();

        assert!(ctx.is_available("mikro"));
        assert_eq!(ctx.unresolved_services.len(), 1);
        assert_eq!(ctx.unresolved_services[0].key, "datalayer");
        assert_eq!(ctx.token.access_token, "ACCESS");
        assert_eq!(mgr.state().await, ConnectionState::Connected);
        assert!(Arc::ptr_eq(&mgr.connection().await.unwrap(), &ctx));

        assert_eq!(store.keys(), vec!["endpoint", "fakts", "token"]);
        assert_eq!(server.hits("/f/challenge/"), 3);
        assert_eq!(surface.closes(), 1);

        let events = drain(&mut events);
        assert!(events.contains(&ConnectionEvent::ConsentRequired {
            url: format!("{}f/configure/?device_code=DEVICE&grant=device_code", server.url()),
        }));
        assert!(events.iter().any(|e| matches!(
            e,
            ConnectionEvent::ServiceUnresolved { key, .. } if key == "datalayer"
        )));
        let states: Vec<ConnectionState> = events
            .iter()
            .filter_map(|e| match e {
                ConnectionEvent::StateChanged(s) => Some(*s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting(ConnectingStage::Authorizing),
                ConnectionState::Connecting(ConnectingStage::AwaitingConsent),
                ConnectionState::Connecting(ConnectingStage::Claiming),
                ConnectionState::Connecting(ConnectingStage::LoggingIn),
                ConnectionState::Connecting(ConnectingStage::ResolvingServices),
                ConnectionState::Connected,
            ]
        );
    }

    #[tokio::test]
    async fn connect_url_discovers_endpoint() {
        let server = fakts_server(Script::default()).await;
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), Arc::default());

        mgr.connect_url(server.url(), &CancellationToken::new())
            .await
            .unwrap();

        let saved: EndpointDescriptor =
            serde_json::from_str(&store.get(ENDPOINT_KEY).await.unwrap().unwrap()).unwrap();
        assert_eq!(saved.base_url, format!("{}f/", server.url()));
        assert_eq!(server.hits("/.well-known/fakts"), 1);
    }

    #[tokio::test]
    async fn connect_url_unreachable_fails() {
        let port = closed_port().await;
        let mgr = manager(Arc::new(MemoryStore::new()), Arc::default());

        let err = mgr
            .connect_url(&format!("http://127.0.0.1:{port}"), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DiscoveryUnreachable);
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn endpoint_is_persisted_before_handshake() {
        let server = fakts_test_support::MockServer::start(|_| {
            fakts_test_support::Reply::json(serde_json::json!({"status": "error", "message": "closed"}))
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), Arc::default());

        let err = mgr
            .connect(endpoint(&server), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::AuthorizationStartFailed);
        assert_eq!(err.stage(), Some(ConnectingStage::Authorizing));
        assert_eq!(store.keys(), vec!["endpoint"]);
    }

    #[tokio::test]
    async fn failed_login_keeps_earlier_records() {
        let server = fakts_server(Script {
            token_status: 401,
            ..Script::default()
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), Arc::default());

        let err = mgr
            .connect(endpoint(&server), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::TokenExchangeFailed);
        assert_eq!(store.keys(), vec!["endpoint", "fakts"]);
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
        assert!(mgr.connection().await.is_none());
    }

    #[tokio::test]
    async fn required_service_failure_leaves_disconnected() {
        let server = fakts_server(Script {
            instances: vec!["mikro", "datalayer"],
            broken: vec!["mikro"],
            ..Script::default()
        })
        .await;
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), Arc::default());

        let err = mgr
            .connect(endpoint(&server), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::RequiredServiceResolutionFailed);
        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
        assert!(mgr.connection().await.is_none());
        assert_eq!(store.keys(), vec!["endpoint", "fakts", "token"]);
    }

    #[tokio::test]
    async fn missing_surface_fails_before_polling() {
        let server = fakts_server(Script::default()).await;
        let mgr = ConnectionManager::new(
            AppIdentity::new("app", "1.0"),
            registry(),
            Arc::new(MemoryStore::new()),
        )
        .with_config(fast_config());
        let mut events = mgr.take_events().await.unwrap();

        let err = mgr
            .connect(endpoint(&server), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ConsentSurfaceUnavailable);
        assert_eq!(server.hits("/f/challenge/"), 0);
        assert!(
            !drain(&mut events)
                .iter()
                .any(|e| matches!(e, ConnectionEvent::ConsentRequired { .. }))
        );
    }

    #[tokio::test]
    async fn cancelled_connect_closes_surface() {
        let server = fakts_server(Script {
            pending_polls: usize::MAX,
            ..Script::default()
        })
        .await;
        let surface = Arc::new(RecordingSurface::default());
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), surface.clone());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = mgr.connect(endpoint(&server), &cancel).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(surface.closes(), 1);
        assert_eq!(store.keys(), vec!["endpoint"]);
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), Arc::default());
        let mut events = mgr.take_events().await.unwrap();

        mgr.disconnect().await;
        mgr.disconnect().await;

        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
        assert!(mgr.connection().await.is_none());
        assert!(drain(&mut events).is_empty());
    }

    #[tokio::test]
    async fn disconnect_keeps_endpoint() {
        let server = fakts_server(Script::default()).await;
        let store = Arc::new(MemoryStore::new());
        let mgr = manager(store.clone(), Arc::default());
        mgr.connect(endpoint(&server), &CancellationToken::new())
            .await
            .unwrap();

        mgr.disconnect().await;

        assert_eq!(mgr.state().await, ConnectionState::Disconnected);
        assert!(mgr.connection().await.is_none());
        assert_eq!(store.keys(), vec!["endpoint"]);
    }
}
