//! Public types for the connection manager.

use std::fmt;
use std::time::Duration;

use fakts_protocol::constants::{
    DEFAULT_ALIAS_TIMEOUT, DEFAULT_CHALLENGE_TIMEOUT, DEFAULT_DISCOVERY_TIMEOUT,
    DEFAULT_MAX_RETRIES, DEFAULT_POLL_INTERVAL,
};

/// Sub-stage of an in-flight connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectingStage {
    Discovering,
    Authorizing,
    /// Consent surface is open and the challenge is being polled.
    AwaitingConsent,
    Claiming,
    LoggingIn,
    ResolvingServices,
}

impl fmt::Display for ConnectingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Discovering => "discovering",
            Self::Authorizing => "authorizing",
            Self::AwaitingConsent => "awaiting consent",
            Self::Claiming => "claiming",
            Self::LoggingIn => "logging in",
            Self::ResolvingServices => "resolving services",
        })
    }
}

/// Lifecycle state of the connection manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting(ConnectingStage),
    /// Restoring a persisted session without user interaction.
    Reconnecting,
    Connected,
}

impl ConnectionState {
    /// True while a connect or reconnect attempt is running.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Connecting(_) | Self::Reconnecting)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => f.write_str("disconnected"),
            Self::Connecting(stage) => write!(f, "connecting ({stage})"),
            Self::Reconnecting => f.write_str("reconnecting"),
            Self::Connected => f.write_str("connected"),
        }
    }
}

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    StateChanged(ConnectionState),
    /// The user must approve the request at `url`.
    ConsentRequired { url: String },
    /// An optional service could not be resolved.
    ServiceUnresolved { key: String, reason: String },
}

/// Polling behaviour while waiting for consent.
#[derive(Debug, Clone)]
pub struct ChallengeConfig {
    /// Upper bound for a single challenge request.
    pub challenge_timeout: Duration,
    /// Number of polls before giving up.
    pub max_retries: u32,
    /// Pause between two polls.
    pub poll_interval: Duration,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            challenge_timeout: DEFAULT_CHALLENGE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Timeouts and limits for one connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub discovery_timeout: Duration,
    /// Per-alias probe timeout.
    pub alias_timeout: Duration,
    /// Timeout for start, claim and token requests.
    pub request_timeout: Duration,
    /// Requested lifetime of the issued client, if any.
    pub expiration_time: Option<Duration>,
    pub challenge: ChallengeConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            alias_timeout: DEFAULT_ALIAS_TIMEOUT,
            request_timeout: Duration::from_secs(10),
            expiration_time: None,
            challenge: ChallengeConfig::default(),
        }
    }
}
