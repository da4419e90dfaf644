//! Session bootstrap for fakts deployments.
//!
//! [`ConnectionManager`] takes an application from "no session" to a
//! [`ConnectedContext`] holding one authenticated client per declared
//! service: endpoint discovery, the device-code consent handshake, token
//! exchange and concurrent service resolution. Sessions are persisted
//! through a [`SessionStore`] and restored with
//! [`ConnectionManager::try_reconnect`].

pub mod context;
pub mod error;
pub mod handshake;
mod http;
pub mod login;
pub mod manager;
pub mod manifest;
mod reconnection;
pub mod service;
pub mod store;
pub mod surface;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use context::{AvailableService, ConnectedContext, UnresolvedService, build_context};
pub use error::{ConnectError, ErrorKind, ServiceError};
pub use manager::ConnectionManager;
pub use manifest::{AppIdentity, Manifest};
pub use service::{
    BuilderInput, GraphQlClient, RestClient, Service, ServiceBuilder, ServiceDefinition,
    ServiceRegistry, graphql_builder, rest_builder,
};
pub use store::{FileStore, MemoryStore, SessionStore, StoreError, default_session_path};
pub use surface::{BrowserSurface, ConsentSurface, LogSurface, SurfaceError, SurfaceHandle};
pub use types::{
    ChallengeConfig, ConnectingStage, ConnectionConfig, ConnectionEvent, ConnectionState,
};
