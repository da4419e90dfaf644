//! Service definitions and the clients built for them.
//!
//! Applications register one [`ServiceDefinition`] per dependency. The
//! registry is the single source of truth for both the manifest sent to
//! the server and the builders run once a session is established.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fakts_protocol::{ActiveFakts, Alias, Instance, Requirement, Token};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::error::ServiceError;
use crate::manifest::Manifest;

/// Everything a builder gets to construct a client.
#[derive(Debug, Clone)]
pub struct BuilderInput {
    pub manifest: Arc<Manifest>,
    pub alias: Alias,
    pub token: Token,
    pub fakts: Arc<ActiveFakts>,
    pub instance: Instance,
}

/// Boxed future returned by [`ServiceBuilder::build`].
pub type BuildFuture = Pin<Box<dyn Future<Output = Result<Service, ServiceError>> + Send>>;

/// Constructs a service client from a resolved alias.
///
/// Implemented for any `Fn(BuilderInput) -> impl Future<Output = Result<Service, ServiceError>>`.
pub trait ServiceBuilder: Send + Sync {
    fn build(&self, input: BuilderInput) -> BuildFuture;
}

impl<F, Fut> ServiceBuilder for F
where
    F: Fn(BuilderInput) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Service, ServiceError>> + Send + 'static,
{
    fn build(&self, input: BuilderInput) -> BuildFuture {
        Box::pin(self(input))
    }
}

/// Builder producing a [`GraphQlClient`].
pub fn graphql_builder() -> impl ServiceBuilder {
    |input: BuilderInput| async move {
        GraphQlClient::new(input.alias, &input.token).map(Service::GraphQl)
    }
}

/// Builder producing a [`RestClient`].
pub fn rest_builder() -> impl ServiceBuilder {
    |input: BuilderInput| async move {
        RestClient::new(input.alias, &input.token).map(Service::Rest)
    }
}

/// A built service client.
#[derive(Debug, Clone)]
pub enum Service {
    GraphQl(GraphQlClient),
    Rest(RestClient),
}

impl Service {
    /// Alias the client talks to.
    pub fn alias(&self) -> &Alias {
        match self {
            Self::GraphQl(c) => &c.alias,
            Self::Rest(c) => &c.alias,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::GraphQl(_) => "graphql",
            Self::Rest(_) => "rest",
        }
    }

    pub fn as_graphql(&self) -> Option<&GraphQlClient> {
        match self {
            Self::GraphQl(c) => Some(c),
            Self::Rest(_) => None,
        }
    }

    pub fn as_rest(&self) -> Option<&RestClient> {
        match self {
            Self::Rest(c) => Some(c),
            Self::GraphQl(_) => None,
        }
    }
}

/// Creates a `reqwest` client sending the bearer token on every request.
fn authorized_http(token: &Token) -> Result<reqwest::Client, ServiceError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
        .map_err(|_| ServiceError::InvalidToken)?;
    value.set_sensitive(true);
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, value);
    Ok(reqwest::Client::builder()
        .default_headers(headers)
        .build()?)
}

async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ServiceError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ServiceError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(resp.json().await?)
}

/// Authenticated GraphQL client for one service alias.
#[derive(Clone)]
pub struct GraphQlClient {
    alias: Alias,
    http: reqwest::Client,
    http_url: String,
    ws_url: String,
}

impl GraphQlClient {
    pub fn new(alias: Alias, token: &Token) -> Result<Self, ServiceError> {
        Ok(Self {
            http: authorized_http(token)?,
            http_url: format!("{}/graphql", alias.http_url()),
            ws_url: format!("{}/graphql", alias.ws_url()),
            alias,
        })
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Query and mutation endpoint.
    pub fn http_url(&self) -> &str {
        &self.http_url
    }

    /// Subscription endpoint.
    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// Runs a GraphQL operation and returns its `data`.
    pub async fn execute(&self, query: &str, variables: Value) -> Result<Value, ServiceError> {
        let resp = self
            .http
            .post(&self.http_url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let mut body: Value = read_json(resp).await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(ServiceError::GraphQl(messages.join("; ")));
        }
        Ok(body.get_mut("data").map(Value::take).unwrap_or(Value::Null))
    }
}

impl fmt::Debug for GraphQlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphQlClient")
            .field("http_url", &self.http_url)
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

/// Authenticated REST client for one service alias.
#[derive(Clone)]
pub struct RestClient {
    alias: Alias,
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(alias: Alias, token: &Token) -> Result<Self, ServiceError> {
        Ok(Self {
            http: authorized_http(token)?,
            base_url: alias.http_url(),
            alias,
        })
    }

    pub fn alias(&self) -> &Alias {
        &self.alias
    }

    /// Absolute URL for `path` on this alias.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// GETs `path` and decodes the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let resp = self.http.get(self.url(path)).send().await?;
        read_json(resp).await
    }
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// One declared service dependency.
#[derive(Clone)]
pub struct ServiceDefinition {
    pub key: String,
    /// Service type identifier, e.g. `live.arkitekt.mikro`.
    pub service: String,
    pub name: String,
    pub description: Option<String>,
    pub optional: bool,
    builder: Arc<dyn ServiceBuilder>,
}

impl ServiceDefinition {
    /// A required service named after its key.
    pub fn new(
        key: impl Into<String>,
        service: impl Into<String>,
        builder: impl ServiceBuilder + 'static,
    ) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            service: service.into(),
            description: None,
            optional: false,
            builder: Arc::new(builder),
        }
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Manifest entry for this definition.
    pub fn requirement(&self) -> Requirement {
        Requirement {
            key: self.key.clone(),
            service: self.service.clone(),
            optional: self.optional,
        }
    }

    pub(crate) fn builder(&self) -> &dyn ServiceBuilder {
        self.builder.as_ref()
    }
}

impl fmt::Debug for ServiceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDefinition")
            .field("key", &self.key)
            .field("service", &self.service)
            .field("optional", &self.optional)
            .finish()
    }
}

/// Service definitions keyed by service key, iterated in key order.
#[derive(Debug, Clone, Default)]
pub struct ServiceRegistry {
    definitions: BTreeMap<String, ServiceDefinition>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `definition`, replacing any previous one with the same key.
    pub fn register(mut self, definition: ServiceDefinition) -> Self {
        self.insert(definition);
        self
    }

    pub fn insert(&mut self, definition: ServiceDefinition) {
        self.definitions.insert(definition.key.clone(), definition);
    }

    pub fn get(&self, key: &str) -> Option<&ServiceDefinition> {
        self.definitions.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Manifest requirements, one per definition, in key order.
    pub fn requirements(&self) -> Vec<Requirement> {
        self.iter().map(ServiceDefinition::requirement).collect()
    }
}
