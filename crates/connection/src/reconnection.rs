//! Restoring sessions from persisted records.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use fakts_protocol::constants::{ENDPOINT_KEY, FAKTS_KEY, TOKEN_KEY};
use fakts_protocol::{ActiveFakts, EndpointDescriptor, Token, ValidationError, parse_validated};

use crate::context::{ConnectedContext, build_context};
use crate::error::ConnectError;
use crate::manager::ConnectionManager;
use crate::types::{ConnectingStage, ConnectionState};

impl ConnectionManager {
    /// Re-runs the full handshake against the persisted endpoint.
    pub async fn reconnect(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Arc<ConnectedContext>, ConnectError> {
        let raw = self
            .store
            .get(ENDPOINT_KEY)
            .await?
            .ok_or(ConnectError::NoPersistedEndpoint)?;
        let endpoint: EndpointDescriptor = parse_validated(&raw)?;
        info!(base_url = %endpoint.base_url, "reconnecting to persisted endpoint");
        self.connect(endpoint, cancel).await
    }

    /// Restores the persisted session without user interaction.
    ///
    /// Never fails: missing records leave the manager disconnected, invalid
    /// records or an unresolvable service batch are logged and erased.
    /// Returns the restored connection, if any.
    pub async fn try_reconnect(&self, cancel: &CancellationToken) -> Option<Arc<ConnectedContext>> {
        let records = (
            self.store.get(FAKTS_KEY).await,
            self.store.get(TOKEN_KEY).await,
        );
        let (fakts_raw, token_raw) = match records {
            (Ok(Some(fakts)), Ok(Some(token))) => (fakts, token),
            (Ok(_), Ok(_)) => {
                debug!("no persisted session");
                return None;
            }
            (Err(e), _) | (_, Err(e)) => {
                warn!(error = %e, "failed to read persisted session");
                return None;
            }
        };

        self.set_state(ConnectionState::Reconnecting).await;

        let (fakts, token) = match parse_session(&fakts_raw, &token_raw) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "persisted session invalid, erasing");
                self.erase_session().await;
                self.set_state(ConnectionState::Disconnected).await;
                return None;
            }
        };

        self.set_state(ConnectionState::Connecting(ConnectingStage::ResolvingServices))
            .await;
        let result = build_context(
            &self.discovery,
            Arc::new(fakts),
            Arc::clone(&self.manifest),
            &self.registry,
            token,
            self.config.alias_timeout,
            cancel,
        )
        .await;

        match result {
            Ok(ctx) => Some(self.publish(ctx).await),
            Err(ConnectError::Cancelled) => {
                debug!("session restore cancelled");
                self.set_state(ConnectionState::Disconnected).await;
                None
            }
            Err(e) => {
                warn!(error = %e, "session restore failed, erasing");
                self.erase_session().await;
                self.set_state(ConnectionState::Disconnected).await;
                None
            }
        }
    }
}

fn parse_session(fakts: &str, token: &str) -> Result<(ActiveFakts, Token), ValidationError> {
    Ok((parse_validated(fakts)?, parse_validated(token)?))
}
