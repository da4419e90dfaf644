//! Wire and persistence types for the fakts device-authorization handshake.
//!
//! Shared by discovery, the handshake and the session store so that every
//! stage agrees on one JSON shape.

pub mod constants;
pub mod messages;
pub mod types;
pub mod validation;

pub use types::{
    ActiveFakts, Alias, AuthConfig, EndpointDescriptor, Instance, Requirement, SelfConfig, Token,
    normalize_base_url,
};
pub use validation::{Validate, ValidationError, parse_validated};
