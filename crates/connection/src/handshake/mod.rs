//! Device-code authorization handshake.
//!
//! [`start`] obtains a device code, [`await_consent`] shows the consent
//! surface and polls [`challenge`] until the user decides, and [`claim`]
//! trades the issued token for the session configuration.

mod challenge;
mod claim;
mod consent;
mod start;

pub use challenge::challenge;
pub use claim::claim;
pub use consent::await_consent;
pub use start::{DeviceCode, start};
