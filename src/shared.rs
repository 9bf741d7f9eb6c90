use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// Coarse classification of a failed API request, mirroring the
/// `errorType` field the backend attaches to non-2xx responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorType {
    Network,
    Validation,
    Unauthorized,
    Forbidden,
    NotFound,
    Conflict,
    Server,
}

/// Typed failure raised by the authenticated request client for any
/// non-2xx response (or a failure to reach the backend at all).
///
/// A 401 here means the caller must re-authenticate; this core does not
/// manage sessions, so it treats 401 like every other failure: the
/// triggering mutation rolls back and the error is surfaced.
#[derive(Debug, Clone, Error)]
#[error("{error_type} ({status_code}): {message}")]
pub struct ApiError {
    pub status_code: u16,
    pub message: String,
    pub error_type: ErrorType,
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>, error_type: ErrorType) -> Self {
        Self {
            status_code,
            message: message.into(),
            error_type,
        }
    }

    /// The transport could not reach the backend at all.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(0, message, ErrorType::Network)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(400, message, ErrorType::Validation)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(401, message, ErrorType::Unauthorized)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, message, ErrorType::NotFound)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(500, message, ErrorType::Server)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn error_type_round_trips_wire_spelling() {
        assert_eq!(ErrorType::NotFound.to_string(), "NOT_FOUND");
        assert_eq!(ErrorType::from_str("SERVER").unwrap(), ErrorType::Server);
    }

    #[test]
    fn display_includes_status_and_type() {
        let err = ApiError::unauthorized("token expired");
        assert_eq!(err.to_string(), "UNAUTHORIZED (401): token expired");
    }
}
