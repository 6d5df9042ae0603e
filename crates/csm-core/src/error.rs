// ── Core error types ──
//
// Every variant names the entity it concerns (network, subnet,
// reservation, node, backup file) so a partial-failure report can be read
// without re-deriving which entity failed. Transport-layer errors are kept
// as the `source` of a `Service` error rather than flattened.

use std::fmt;

use thiserror::Error;

/// Which remote system a failed call went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceKind {
    Topology,
    BootParameters,
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Topology => f.write_str("SLS"),
            Self::BootParameters => f.write_str("BSS"),
        }
    }
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid IPv6 CIDR {value:?} for network {network}: {reason}")]
    InvalidCidr {
        network: String,
        value: String,
        reason: String,
    },

    #[error("Invalid IPv6 gateway {value:?} for network {network}: {reason}")]
    InvalidGateway {
        network: String,
        value: String,
        reason: String,
    },

    // ── Planning errors ──────────────────────────────────────────────
    #[error("Network {network}: subnets need {required} addresses, which do not fit in {supernet}")]
    CapacityExceeded {
        network: String,
        supernet: String,
        required: u128,
    },

    #[error("Unparseable IPv4 address {value:?} on reservation {network}/{subnet}/{reservation}")]
    UnparseableAddress {
        network: String,
        subnet: String,
        reservation: String,
        value: String,
    },

    #[error("Network {network} not found in SLS")]
    NetworkNotFound { network: String },

    #[error("Owner tag {owner:?} does not contain a hardware identifier")]
    UnknownIdentity { owner: String },

    /// `applied` lists networks committed in the same run.
    #[error("Planning failed for network(s): {}{}", networks.join(", "), applied_note(applied))]
    PlanningFailed {
        networks: Vec<String>,
        applied: Vec<String>,
    },

    // ── Remote service errors ────────────────────────────────────────
    #[error("{service} {operation} failed for {entity}: {source}")]
    Service {
        service: ServiceKind,
        operation: &'static str,
        entity: String,
        #[source]
        source: csm_api::Error,
    },

    #[error("{failed} BSS writes failed, first: {first}")]
    BootWritesFailed {
        failed: usize,
        #[source]
        first: Box<CoreError>,
    },

    // ── Backup errors ────────────────────────────────────────────────
    #[error("Cannot write backup {path}: {source}")]
    Backup {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{entity} was written, but its committed backup failed: {source}")]
    UnrecordedWrite {
        entity: String,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Cannot encode backup {name}: {source}")]
    BackupEncode {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

fn applied_note(applied: &[String]) -> String {
    if applied.is_empty() {
        String::new()
    } else {
        format!(" (other networks were committed: {})", applied.join(", "))
    }
}

impl CoreError {
    /// Wrap a client error with the service, operation and entity it hit.
    pub fn service(
        service: ServiceKind,
        operation: &'static str,
        entity: impl Into<String>,
        source: csm_api::Error,
    ) -> Self {
        Self::Service {
            service,
            operation,
            entity: entity.into(),
            source,
        }
    }

    /// `true` for errors raised before any remote call is made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config { .. } | Self::InvalidCidr { .. } | Self::InvalidGateway { .. }
        )
    }
}
