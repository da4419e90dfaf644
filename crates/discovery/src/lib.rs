//! Endpoint discovery and alias reachability probing.
//!
//! [`Client::discover`] turns a user-entered URL into an
//! [`EndpointDescriptor`](fakts_protocol::EndpointDescriptor);
//! [`Client::resolve_working_alias`] picks the first reachable address of
//! a service instance.

mod alias;
pub mod client;

pub use client::{Client, candidate_urls};

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("endpoint unreachable: {0}")]
    Unreachable(String),

    #[error("invalid discovery response: {0}")]
    InvalidResponse(String),

    #[error("no reachable alias for {service} ({tried} tried)")]
    NoReachableAlias { service: String, tried: usize },

    #[error("cancelled")]
    Cancelled,
}
