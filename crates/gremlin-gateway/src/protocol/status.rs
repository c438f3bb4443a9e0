//! Gremlin server response status codes.

/// Coarse classification of a response status code.
///
/// The gateway branches on this, never on the status message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// Final frame carrying data (200).
    Success,
    /// Final frame without data (204).
    NoContent,
    /// More frames follow for the same request (206).
    PartialContent,
    /// Server challenges the client for SASL credentials (407).
    Authenticate,
    /// Request rejected by the server (4xx other than 407).
    ClientError,
    /// Evaluation or server failure (5xx).
    ServerError,
    /// Anything outside the documented ranges.
    Unknown,
}

impl StatusClass {
    /// True when no further frames will arrive for the request.
    pub fn is_terminal(self) -> bool {
        !matches!(self, StatusClass::PartialContent | StatusClass::Authenticate)
    }

    /// True when the request failed.
    pub fn is_error(self) -> bool {
        matches!(
            self,
            StatusClass::ClientError | StatusClass::ServerError | StatusClass::Unknown
        )
    }
}

pub const SUCCESS: u16 = 200;
pub const NO_CONTENT: u16 = 204;
pub const PARTIAL_CONTENT: u16 = 206;
pub const UNAUTHORIZED: u16 = 401;
pub const AUTHENTICATE: u16 = 407;
pub const MALFORMED_REQUEST: u16 = 498;
pub const INVALID_REQUEST_ARGUMENTS: u16 = 499;
pub const SERVER_ERROR: u16 = 500;
pub const SCRIPT_EVALUATION_ERROR: u16 = 597;
pub const SERVER_TIMEOUT: u16 = 598;
pub const SERVER_SERIALIZATION_ERROR: u16 = 599;

/// Classify a raw status code.
pub fn classify(code: u16) -> StatusClass {
    match code {
        SUCCESS => StatusClass::Success,
        NO_CONTENT => StatusClass::NoContent,
        PARTIAL_CONTENT => StatusClass::PartialContent,
        AUTHENTICATE => StatusClass::Authenticate,
        // Other 2xx codes are not part of the protocol but are not failures.
        201..=299 => StatusClass::Success,
        400..=499 => StatusClass::ClientError,
        500..=599 => StatusClass::ServerError,
        _ => StatusClass::Unknown,
    }
}
