use std::time::Duration;

/// Path of the discovery document relative to a user-supplied base URL.
pub const WELL_KNOWN_PATH: &str = ".well-known/fakts";

/// Route that issues a device code.
pub const START_ROUTE: &str = "start/";

/// Route polled while the user decides on the consent surface.
pub const CHALLENGE_ROUTE: &str = "challenge/";

/// Route that exchanges an issued token for the session configuration.
pub const CLAIM_ROUTE: &str = "claim/";

/// Route rendered on the consent surface.
pub const CONFIGURE_ROUTE: &str = "configure/";

/// Client kind requested when starting a device-code grant.
pub const REQUESTED_CLIENT_KIND: &str = "development";

/// Path probed on an alias when the instance declares no challenge.
pub const DEFAULT_ALIAS_CHALLENGE: &str = "ht";

/// Deadline for the discovery query.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Deadline for a single alias probe.
pub const DEFAULT_ALIAS_TIMEOUT: Duration = Duration::from_secs(1);

/// Deadline for a single challenge poll.
pub const DEFAULT_CHALLENGE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of challenge polls before the handshake gives up.
pub const DEFAULT_MAX_RETRIES: u32 = 60;

/// Pause between two challenge polls while consent is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Storage key of the persisted [`EndpointDescriptor`](crate::EndpointDescriptor).
pub const ENDPOINT_KEY: &str = "endpoint";

/// Storage key of the persisted [`ActiveFakts`](crate::ActiveFakts).
pub const FAKTS_KEY: &str = "fakts";

/// Storage key of the persisted [`Token`](crate::Token).
pub const TOKEN_KEY: &str = "token";
