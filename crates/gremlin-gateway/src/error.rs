//! Error types for the query gateway.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::ResponseStatus;

/// Errors raised while talking to the graph engine or validating a caller's
/// request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// A response frame could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// A request could not be framed.
    #[error("failed to serialize request: {0}")]
    Serialization(String),

    /// WebSocket or TLS handshake with the engine failed.
    #[error("unable to connect to gremlin server: {0}")]
    Connection(String),

    /// The transport failed after the connection was established.
    #[error("{0}")]
    Transport(String),

    /// The password carried in the caller's session could not be decrypted.
    #[error("authentication extraction from session failed")]
    CredentialRecovery(String),

    /// Element type other than `V` or `E`.
    #[error("Invalid element type: {0}")]
    InvalidElementType(String),

    /// Property lookup without any id.
    #[error("Missing ids")]
    MissingIds,

    /// Property lookup above the configured ceiling.
    #[error("Maximum number of ids exceeded")]
    TooManyIds { requested: usize, max: usize },

    /// The engine answered with an error status.
    #[error("gremlin server returned {}: {}", .status.code, .status.message)]
    EngineQuery { status: ResponseStatus },

    /// Credentials were rejected, or the engine asked for credentials we do
    /// not have.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The engine did not answer within the request deadline.
    #[error("gremlin server did not respond within {}s", .0.as_secs())]
    Timeout(Duration),

    /// One batch of a multi-batch fetch failed.
    #[error("batch {index} failed: {source}")]
    PartialBatchFailure {
        index: usize,
        #[source]
        source: Box<GatewayError>,
    },

    /// Result payload was not a GraphSON collection.
    #[error("error when parsing gson response: {0}")]
    Gson(String),
}

impl GatewayError {
    /// True for errors raised before any network activity.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            GatewayError::InvalidElementType(_)
                | GatewayError::MissingIds
                | GatewayError::TooManyIds { .. }
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}
