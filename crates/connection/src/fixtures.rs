//! Shared test fixtures.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fakts_protocol::{ActiveFakts, Alias, AuthConfig, Instance, SelfConfig};
use fakts_test_support::{MockServer, Reply, Request};
use serde_json::json;

use crate::error::ServiceError;
use crate::service::{
    BuilderInput, RestClient, Service, ServiceBuilder, ServiceDefinition, ServiceRegistry,
    graphql_builder, rest_builder,
};
use crate::surface::{ConsentSurface, SurfaceError, SurfaceFuture, SurfaceHandle};
use crate::types::{ChallengeConfig, ConnectionConfig};

/// Required `mikro` (GraphQL) and optional `datalayer` (REST).
pub(crate) fn registry() -> ServiceRegistry {
    ServiceRegistry::new()
        .register(ServiceDefinition::new("mikro", "live.arkitekt.mikro", graphql_builder()))
        .register(
            ServiceDefinition::new("datalayer", "live.arkitekt.s3", rest_builder()).optional(true),
        )
}

/// Short timeouts and a fast poll loop.
pub(crate) fn fast_config() -> ConnectionConfig {
    ConnectionConfig {
        discovery_timeout: Duration::from_secs(2),
        alias_timeout: Duration::from_millis(500),
        request_timeout: Duration::from_secs(2),
        expiration_time: None,
        challenge: ChallengeConfig {
            challenge_timeout: Duration::from_millis(500),
            max_retries: 10,
            poll_interval: Duration::from_millis(5),
        },
    }
}

/// Configuration with one instance per key, each with a single alias at
/// `127.0.0.1:{port}/{key}`.
pub(crate) fn fakts(port: u16, keys: &[&str]) -> ActiveFakts {
    let instances = keys
        .iter()
        .map(|key| {
            let instance = Instance {
                service: format!("svc.{key}"),
                identifier: key.to_string(),
                aliases: vec![Alias {
                    id: Some(format!("{key}-local")),
                    host: "127.0.0.1".into(),
                    port: Some(port),
                    ssl: false,
                    path: Some(key.to_string()),
                    challenge: None,
                    kind: None,
                }],
            };
            (key.to_string(), instance)
        })
        .collect::<HashMap<_, _>>();

    ActiveFakts {
        deployment: SelfConfig {
            deployment_name: Some("test".into()),
        },
        auth: AuthConfig {
            client_id: "cid".into(),
            client_secret: "csecret".into(),
            token_url: format!("http://127.0.0.1:{port}/o/token/"),
            scopes: vec!["openid".into()],
            report_url: None,
        },
        instances,
    }
}

/// Builder that always fails.
pub(crate) fn failing_builder() -> impl ServiceBuilder {
    |_: BuilderInput| async { Err::<Service, _>(ServiceError::Build("broken builder".into())) }
}

/// REST builder that takes `delay` to finish.
pub(crate) fn slow_builder(delay: Duration) -> impl ServiceBuilder {
    move |input: BuilderInput| async move {
        tokio::time::sleep(delay).await;
        RestClient::new(input.alias, &input.token).map(Service::Rest)
    }
}

/// Consent surface recording every open and close.
#[derive(Default)]
pub(crate) struct RecordingSurface {
    opened: Mutex<Vec<String>>,
    closes: Arc<AtomicUsize>,
    fail_open: bool,
    fail_close: bool,
}

impl RecordingSurface {
    pub(crate) fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub(crate) fn failing_close() -> Self {
        Self {
            fail_close: true,
            ..Self::default()
        }
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub(crate) fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl ConsentSurface for RecordingSurface {
    fn open(&self, url: &str) -> Result<Box<dyn SurfaceHandle>, SurfaceError> {
        if self.fail_open {
            return Err(SurfaceError::Open("no display".into()));
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(Box::new(RecordingHandle {
            closes: self.closes.clone(),
            fail: self.fail_close,
        }))
    }
}

struct RecordingHandle {
    closes: Arc<AtomicUsize>,
    fail: bool,
}

impl SurfaceHandle for RecordingHandle {
    fn close(self: Box<Self>) -> SurfaceFuture {
        self.closes.fetch_add(1, Ordering::SeqCst);
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                Err(SurfaceError::Close("window already gone".into()))
            } else {
                Ok(())
            }
        })
    }
}

/// Behaviour of [`fakts_server`].
pub(crate) struct Script {
    /// Pending answers before the challenge is granted.
    pub pending_polls: usize,
    /// Instances declared in the claimed configuration.
    pub instances: Vec<&'static str>,
    /// Keys whose alias probe answers 503.
    pub broken: Vec<&'static str>,
    /// Status of the token route.
    pub token_status: u16,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            pending_polls: 0,
            instances: vec!["mikro"],
            broken: Vec::new(),
            token_status: 200,
        }
    }
}

/// A complete fakts deployment on one port: discovery document, handshake
/// routes under `/f/`, token route and service aliases.
pub(crate) async fn fakts_server(script: Script) -> MockServer {
    let port = Arc::new(AtomicU16::new(0));
    let polls = Arc::new(AtomicUsize::new(0));
    let server = {
        let port = port.clone();
        MockServer::start(move |req| route(&script, port.load(Ordering::SeqCst), &polls, req)).await
    };
    port.store(server.port(), Ordering::SeqCst);
    server
}

fn route(script: &Script, port: u16, polls: &AtomicUsize, req: &Request) -> Reply {
    match req.path.as_str() {
        "/.well-known/fakts" => Reply::json(json!({
            "name": "test",
            "base_url": format!("http://127.0.0.1:{port}/f/"),
        })),
        "/f/start/" => Reply::json(json!({"status": "granted", "code": "DEVICE"})),
        "/f/challenge/" => {
            if polls.fetch_add(1, Ordering::SeqCst) < script.pending_polls {
                Reply::json(json!({"status": "pending"}))
            } else {
                Reply::json(json!({"status": "granted", "token": "CLAIM-TOKEN"}))
            }
        }
        "/f/claim/" => {
            let config = fakts(port, &script.instances);
            Reply::json(json!({"status": "granted", "config": config}))
        }
        "/o/token/" if script.token_status == 200 => Reply::json(json!({
            "access_token": "ACCESS",
            "token_type": "Bearer",
            "expires_in": 3600,
        })),
        "/o/token/" => Reply::status(script.token_status, r#"{"error": "invalid_client"}"#),
        path if path.ends_with("/ht") => {
            let key = path.trim_start_matches('/').trim_end_matches("/ht");
            if script.broken.contains(&key) {
                Reply::status(503, "down")
            } else {
                Reply::status(200, "ok")
            }
        }
        _ => Reply::status(404, "not found"),
    }
}
