//! Schema checks applied before trusting data from the wire or from storage.
//!
//! Deserialization already enforces shape and types; these checks enforce
//! the value-level rules serde cannot express.

use serde::de::DeserializeOwned;

use crate::types::{
    ActiveFakts, Alias, AuthConfig, EndpointDescriptor, Instance, Token, normalize_base_url,
};

/// A value failed schema validation.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{field}: {reason}")]
    Invalid { field: String, reason: String },
}

impl ValidationError {
    fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Value-level schema rules.
pub trait Validate {
    fn validate(&self) -> Result<(), ValidationError>;
}

/// Parses `raw` as JSON and validates the result.
pub fn parse_validated<T: DeserializeOwned + Validate>(raw: &str) -> Result<T, ValidationError> {
    let value: T = serde_json::from_str(raw)?;
    value.validate()?;
    Ok(value)
}

fn require_url(field: &str, value: &str) -> Result<(), ValidationError> {
    url::Url::parse(value)
        .map(|_| ())
        .map_err(|e| ValidationError::invalid(field, format!("not an absolute URL ({e})")))
}

impl Validate for EndpointDescriptor {
    fn validate(&self) -> Result<(), ValidationError> {
        let normalized = normalize_base_url(&self.base_url)
            .map_err(|e| ValidationError::invalid("base_url", e.to_string()))?;
        if normalized.as_str() != self.base_url {
            return Err(ValidationError::invalid("base_url", "not normalized"));
        }
        Ok(())
    }
}

impl Validate for Alias {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.host.trim().is_empty() {
            return Err(ValidationError::invalid("host", "empty"));
        }
        if self.port == Some(0) {
            return Err(ValidationError::invalid("port", "zero"));
        }
        Ok(())
    }
}

impl Validate for Instance {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.service.is_empty() {
            return Err(ValidationError::invalid("service", "empty"));
        }
        for (i, alias) in self.aliases.iter().enumerate() {
            alias.validate().map_err(|e| prefix(&format!("aliases[{i}]"), e))?;
        }
        Ok(())
    }
}

impl Validate for AuthConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.client_id.is_empty() {
            return Err(ValidationError::invalid("client_id", "empty"));
        }
        if self.client_secret.is_empty() {
            return Err(ValidationError::invalid("client_secret", "empty"));
        }
        require_url("token_url", &self.token_url)
    }
}

impl Validate for ActiveFakts {
    fn validate(&self) -> Result<(), ValidationError> {
        self.auth.validate().map_err(|e| prefix("auth", e))?;
        for (key, instance) in &self.instances {
            instance
                .validate()
                .map_err(|e| prefix(&format!("instances.{key}"), e))?;
        }
        Ok(())
    }
}

impl Validate for Token {
    fn validate(&self) -> Result<(), ValidationError> {
        if self.access_token.is_empty() {
            return Err(ValidationError::invalid("access_token", "empty"));
        }
        Ok(())
    }
}

fn prefix(path: &str, err: ValidationError) -> ValidationError {
    match err {
        ValidationError::Invalid { field, reason } => ValidationError::Invalid {
            field: format!("{path}.{field}"),
            reason,
        },
        other => other,
    }
}
