//! Error types for request aggregation.

use thiserror::Error;

use crate::bus::BusError;

/// Why an aggregated request ended unsuccessfully.
///
/// Running out of time is not an error: a request that collects nothing
/// before its deadline succeeds with an empty result.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("failed to encode request payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Subscribe(BusError),

    #[error(transparent)]
    Publish(BusError),

    #[error("failed to decompress reply on '{subject}': {source}")]
    Decompress {
        subject: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no responders available for request")]
    NoResponders,

    #[error("server request failed, ensure the account used has system privileges and appropriate permissions")]
    SystemPermission,
}

impl RequestError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest { reason: reason.into() }
    }

    /// Whether this is a "nobody answered" condition, including the
    /// permission hint it is rewritten to on system subjects.
    pub fn is_no_responders(&self) -> bool {
        matches!(self, RequestError::NoResponders | RequestError::SystemPermission)
    }
}
