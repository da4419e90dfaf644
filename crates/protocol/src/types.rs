use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::constants::{CONFIGURE_ROUTE, DEFAULT_ALIAS_CHALLENGE};

/// Entry point of a fakts deployment, produced by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Absolute http(s) URL, always ending in `/`.
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
}

impl EndpointDescriptor {
    /// Creates a descriptor for `base_url`, normalising the trailing slash.
    pub fn new(base_url: &str) -> Result<Self, url::ParseError> {
        Ok(Self {
            name: None,
            base_url: normalize_base_url(base_url)?.to_string(),
            description: None,
            capabilities: Vec::new(),
        })
    }

    /// Joins a route onto the base URL.
    pub fn route(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    /// URL rendered on the consent surface for a device code.
    pub fn configure_url(&self, device_code: &str) -> String {
        format!(
            "{}?device_code={device_code}&grant=device_code",
            self.route(CONFIGURE_ROUTE)
        )
    }
}

/// Parses `raw` as an absolute http(s) URL whose path ends in `/`.
pub fn normalize_base_url(raw: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(raw.trim())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(url::ParseError::EmptyHost);
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// One declared service dependency as sent inside the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub service: String,
    #[serde(default)]
    pub optional: bool,
}

/// A concrete address of a service instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default)]
    pub ssl: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub challenge: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Alias {
    fn base(&self, scheme: &str) -> String {
        let mut out = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("{scheme}://[{}]", self.host)
        } else {
            format!("{scheme}://{}", self.host)
        };
        if let Some(port) = self.port {
            out.push_str(&format!(":{port}"));
        }
        if let Some(path) = self.path.as_deref().map(|p| p.trim_matches('/'))
            && !path.is_empty()
        {
            out.push('/');
            out.push_str(path);
        }
        out
    }

    /// HTTP base URL, without trailing slash.
    pub fn http_url(&self) -> String {
        self.base(if self.ssl { "https" } else { "http" })
    }

    /// WebSocket base URL, without trailing slash.
    pub fn ws_url(&self) -> String {
        self.base(if self.ssl { "wss" } else { "ws" })
    }

    /// URL probed to decide whether this alias is reachable.
    pub fn probe_url(&self) -> String {
        let challenge = self
            .challenge
            .as_deref()
            .map(|c| c.trim_matches('/'))
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_ALIAS_CHALLENGE);
        format!("{}/{challenge}", self.http_url())
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.http_url())
    }
}

/// Candidate aliases for one declared service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub service: String,
    #[serde(default)]
    pub identifier: String,
    #[serde(default)]
    pub aliases: Vec<Alias>,
}

/// OAuth client credentials issued by a successful claim.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("token_url", &self.token_url)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Deployment metadata carried in the claimed configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_name: Option<String>,
}

/// Session configuration obtained by claiming an approved device code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveFakts {
    #[serde(rename = "self", default)]
    pub deployment: SelfConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub instances: HashMap<String, Instance>,
}

/// Access token returned by the token exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl Token {
    /// Creates a bearer token with no metadata.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: Some("Bearer".into()),
            expires_in: None,
            refresh_token: None,
            scope: None,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}
