//! Error taxonomy for the position engine.
//!
//! Transient data errors are absorbed locally via counters; execution errors
//! are retried a bounded number of times then escalated; inconsistencies are
//! healed by reconciliation; configuration errors are fatal at setup.

use thiserror::Error;

/// Errors returned by the execution gateway collaborator.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Not enough free margin to open at the requested size.
    #[error("insufficient margin: requested {requested}, available {available}")]
    InsufficientMargin {
        requested: String,
        available: String,
    },

    /// Requested leverage exceeds the venue cap for the asset.
    #[error("leverage {requested}x exceeds max {max}x for {asset}")]
    LeverageExceeded {
        asset: String,
        requested: u8,
        max: u8,
    },

    /// Order rejected by the venue for any other reason.
    #[error("order rejected: {0}")]
    Rejected(String),

    /// The position was already closed. Treated as success by callers.
    #[error("position already closed: {asset}")]
    AlreadyClosed { asset: String },

    /// Network-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// Request exceeded the fetch timeout.
    #[error("request timeout: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// True when a retry may succeed without any state change on our side.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// True when the error means the desired end state already holds.
    #[must_use]
    pub const fn is_already_closed(&self) -> bool {
        matches!(self, Self::AlreadyClosed { .. })
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::Rejected(format!("malformed response: {err}"))
    }
}

/// Top-level error classification used across the engine.
#[derive(Debug, Error)]
pub enum TrailguardError {
    /// A data fetch failed; retryable and counted against a bound.
    #[error("transient data error: {0}")]
    TransientData(String),

    /// An open/close was rejected by the gateway.
    #[error("execution error: {0}")]
    Execution(#[from] GatewayError),

    /// Orphaned or missing risk state; healed by reconciliation.
    #[error("state inconsistency for {asset}: {detail}")]
    StateInconsistency { asset: String, detail: String },

    /// Invalid budget, leverage bounds, or tier ladder. Fatal at setup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// All slots are reserved; the caller must fail fast, not wait.
    #[error("capacity exceeded: {reserved}/{max} slots reserved")]
    CapacityExceeded { reserved: u32, max: u32 },
}

impl TrailguardError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::TransientData(_) => true,
            Self::Execution(e) => e.is_transient(),
            _ => false,
        }
    }
}
