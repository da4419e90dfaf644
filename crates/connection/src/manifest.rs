use fakts_protocol::Requirement;
use serde::{Deserialize, Serialize};

use crate::service::ServiceRegistry;

/// Identity of the application requesting access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppIdentity {
    pub identifier: String,
    pub version: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
}

impl AppIdentity {
    pub fn new(identifier: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            version: version.into(),
            scopes: Vec::new(),
            logo: None,
        }
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }
}

/// What the application sends when requesting a device code.
///
/// Requirements are always derived from the [`ServiceRegistry`], so the
/// manifest cannot declare a service the application cannot build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    #[serde(flatten)]
    app: AppIdentity,
    requirements: Vec<Requirement>,
}

impl Manifest {
    pub fn new(app: AppIdentity, registry: &ServiceRegistry) -> Self {
        Self {
            app,
            requirements: registry.requirements(),
        }
    }

    pub fn app(&self) -> &AppIdentity {
        &self.app
    }

    pub fn identifier(&self) -> &str {
        &self.app.identifier
    }

    pub fn version(&self) -> &str {
        &self.app.version
    }

    pub fn scopes(&self) -> &[String] {
        &self.app.scopes
    }

    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{ServiceDefinition, graphql_builder, rest_builder};

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new()
            .register(ServiceDefinition::new("mikro", "live.arkitekt.mikro", graphql_builder()))
            .register(
                ServiceDefinition::new("datalayer", "live.arkitekt.s3", rest_builder())
                    .optional(true),
            )
    }

    #[test]
    fn requirements_mirror_registry() {
        let registry = registry();
        let manifest = Manifest::new(AppIdentity::new("github.io.jhnnsrs.orkestrator", "1.0"), &registry);

        assert_eq!(manifest.requirements().len(), registry.len());
        for def in registry.iter() {
            let req = manifest
                .requirements()
                .iter()
                .find(|r| r.key == def.key)
                .unwrap();
            assert_eq!(req.service, def.service);
            assert_eq!(req.optional, def.optional);
        }
    }

    #[test]
    fn serializes_flat() {
        let app = AppIdentity::new("app", "0.1").with_scopes(["openid", "read"]);
        let value = serde_json::to_value(Manifest::new(app, &registry())).unwrap();

        assert_eq!(value["identifier"], "app");
        assert_eq!(value["version"], "0.1");
        assert_eq!(value["scopes"][1], "read");
        assert!(value.get("logo").is_none());
        assert_eq!(value["requirements"][0]["key"], "datalayer");
        assert_eq!(value["requirements"][0]["optional"], true);
    }

    #[test]
    fn empty_registry_has_no_requirements() {
        let manifest = Manifest::new(AppIdentity::new("app", "0.1"), &ServiceRegistry::new());
        assert!(manifest.requirements().is_empty());
        assert!(manifest.scopes().is_empty());
    }
}
