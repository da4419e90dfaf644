use serde::{Deserialize, Serialize};

use crate::types::ActiveFakts;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Requests a device code for a manifest.
#[derive(Debug, Clone, Serialize)]
pub struct StartRequest<'a, M: Serialize> {
    pub manifest: &'a M,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiration_time_seconds: Option<u64>,
    pub requested_client_kind: &'a str,
}

/// Polls the consent decision for a device code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeRequest {
    pub code: String,
}

/// Exchanges an issued token for the session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub token: String,
    #[serde(default)]
    pub secure: bool,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Answer of the start route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StartResponse {
    Granted { code: String },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Answer of the challenge route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChallengeResponse {
    /// The user approved; `token` can be claimed.
    Granted { token: String },
    /// The user has not decided yet.
    #[serde(alias = "waiting")]
    Pending {
        #[serde(default)]
        message: String,
    },
    /// The user refused the request.
    Denied {
        #[serde(default)]
        message: String,
    },
    /// The device code is no longer valid.
    Expired {
        #[serde(default)]
        message: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Answer of the claim route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ClaimResponse {
    Granted { config: Box<ActiveFakts> },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Form body of the OAuth2 client-credentials exchange.
#[derive(Debug, Clone, Serialize)]
pub struct ClientCredentialsForm<'a> {
    pub grant_type: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    #[serde(skip_serializing_if = "str::is_empty")]
    pub scope: &'a str,
}
