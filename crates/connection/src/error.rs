//! Connection error types.

use fakts_discovery::DiscoveryError;
use fakts_protocol::ValidationError;

use crate::context::UnresolvedService;
use crate::store::StoreError;
use crate::types::ConnectingStage;

/// Errors produced while establishing or restoring a session.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    #[error("authorization start failed: {0}")]
    AuthorizationStartFailed(String),

    #[error("consent surface unavailable: {0}")]
    ConsentSurfaceUnavailable(String),

    #[error("consent not given after {attempts} poll(s)")]
    ConsentTimeout { attempts: u32 },

    #[error("consent rejected: {0}")]
    ConsentRejected(String),

    #[error("challenge failed: {0}")]
    ChallengeFailed(String),

    #[error("claim failed: {0}")]
    ClaimFailed(String),

    #[error("token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("required service {key:?} failed: {source}")]
    RequiredServiceResolutionFailed {
        key: String,
        #[source]
        source: ServiceError,
        /// Optional services that failed in the same batch.
        unresolved: Vec<UnresolvedService>,
    },

    #[error("persisted session invalid: {0}")]
    SessionValidationFailed(#[from] ValidationError),

    #[error("no persisted endpoint")]
    NoPersistedEndpoint,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("cancelled")]
    Cancelled,
}

/// Classification of [`ConnectError`] independent of its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidUrl,
    DiscoveryUnreachable,
    DiscoveryInvalidResponse,
    AuthorizationStartFailed,
    ConsentSurfaceUnavailable,
    ConsentTimeout,
    ConsentRejected,
    ChallengeFailed,
    ClaimFailed,
    TokenExchangeFailed,
    NoReachableAlias,
    RequiredServiceResolutionFailed,
    SessionValidationFailed,
    NoPersistedEndpoint,
    Storage,
    Cancelled,
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Discovery(e) => match e {
                DiscoveryError::InvalidUrl { .. } => ErrorKind::InvalidUrl,
                DiscoveryError::Unreachable(_) => ErrorKind::DiscoveryUnreachable,
                DiscoveryError::InvalidResponse(_) => ErrorKind::DiscoveryInvalidResponse,
                DiscoveryError::NoReachableAlias { .. } => ErrorKind::NoReachableAlias,
                DiscoveryError::Cancelled => ErrorKind::Cancelled,
            },
            Self::AuthorizationStartFailed(_) => ErrorKind::AuthorizationStartFailed,
            Self::ConsentSurfaceUnavailable(_) => ErrorKind::ConsentSurfaceUnavailable,
            Self::ConsentTimeout { .. } => ErrorKind::ConsentTimeout,
            Self::ConsentRejected(_) => ErrorKind::ConsentRejected,
            Self::ChallengeFailed(_) => ErrorKind::ChallengeFailed,
            Self::ClaimFailed(_) => ErrorKind::ClaimFailed,
            Self::TokenExchangeFailed(_) => ErrorKind::TokenExchangeFailed,
            Self::RequiredServiceResolutionFailed { .. } => {
                ErrorKind::RequiredServiceResolutionFailed
            }
            Self::SessionValidationFailed(_) => ErrorKind::SessionValidationFailed,
            Self::NoPersistedEndpoint => ErrorKind::NoPersistedEndpoint,
            Self::Storage(_) => ErrorKind::Storage,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Pipeline stage that produced this error, when it is tied to one.
    pub fn stage(&self) -> Option<ConnectingStage> {
        match self.kind() {
            ErrorKind::InvalidUrl
            | ErrorKind::DiscoveryUnreachable
            | ErrorKind::DiscoveryInvalidResponse => Some(ConnectingStage::Discovering),
            ErrorKind::AuthorizationStartFailed => Some(ConnectingStage::Authorizing),
            ErrorKind::ConsentSurfaceUnavailable
            | ErrorKind::ConsentTimeout
            | ErrorKind::ConsentRejected
            | ErrorKind::ChallengeFailed => Some(ConnectingStage::AwaitingConsent),
            ErrorKind::ClaimFailed => Some(ConnectingStage::Claiming),
            ErrorKind::TokenExchangeFailed => Some(ConnectingStage::LoggingIn),
            ErrorKind::NoReachableAlias | ErrorKind::RequiredServiceResolutionFailed => {
                Some(ConnectingStage::ResolvingServices)
            }
            _ => None,
        }
    }
}

/// Failure of a single service during resolution.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("no instance declared for service {0:?}")]
    MissingInstance(String),

    #[error(transparent)]
    Alias(#[from] DiscoveryError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("access token is not a valid header value")]
    InvalidToken,

    #[error("service error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("build failed: {0}")]
    Build(String),

    #[error("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_errors_keep_their_kind() {
        let err = ConnectError::from(DiscoveryError::Unreachable("refused".into()));
        assert_eq!(err.kind(), ErrorKind::DiscoveryUnreachable);
        assert_eq!(err.stage(), Some(ConnectingStage::Discovering));
        assert_eq!(err.to_string(), "endpoint unreachable: refused");
    }

    #[test]
    fn consent_errors_belong_to_consent_stage() {
        for err in [
            ConnectError::ConsentTimeout { attempts: 3 },
            ConnectError::ConsentRejected("no".into()),
            ConnectError::ConsentSurfaceUnavailable("none".into()),
        ] {
            assert_eq!(err.stage(), Some(ConnectingStage::AwaitingConsent));
        }
    }

    #[test]
    fn required_failure_exposes_source() {
        use std::error::Error;

        let err = ConnectError::RequiredServiceResolutionFailed {
            key: "mikro".into(),
            source: ServiceError::MissingInstance("mikro".into()),
            unresolved: vec![],
        };
        assert_eq!(err.kind(), ErrorKind::RequiredServiceResolutionFailed);
        assert!(err.source().is_some());
        assert!(err.to_string().contains("mikro"));
    }

    #[test]
    fn cancelled_has_no_stage() {
        assert_eq!(ConnectError::Cancelled.stage(), None);
        assert_eq!(
            ConnectError::from(DiscoveryError::Cancelled).kind(),
            ErrorKind::Cancelled
        );
    }
}
