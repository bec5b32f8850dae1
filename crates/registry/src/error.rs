use std::io;

use microsh_engine::RequestError;
use microsh_types::ParameterError;
use thiserror::Error;

/// Failure to turn a discovered endpoint into a command.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("endpoint '{subject}' has unusable parameters: {source}")]
    Parameters {
        subject: String,
        #[source]
        source: ParameterError,
    },

    #[error("endpoint '{subject}' declares parameter '{name}' more than once")]
    DuplicateParameter { subject: String, name: String },

    #[error("endpoint '{subject}' declares parameter '{name}', which is reserved for the shell")]
    ReservedParameter { subject: String, name: String },

    #[error("endpoint '{subject}' declares a parameter without a name")]
    UnnamedParameter { subject: String },
}

/// Failure to discover the services available on the bus.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to get API info: {0}")]
    Request(#[from] RequestError),

    #[error("failed to unmarshal API info: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Failure of a single command invocation.
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error("parameter required: --{name}")]
    MissingParameter { name: String },

    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("failed to write reply: {0}")]
    Output(#[from] io::Error),
}

impl InvocationError {
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }
}
