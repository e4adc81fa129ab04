use serde::{Deserialize, Serialize};

/// Status code carried inside a response's embedded error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WireStatusCode {
    InvalidArgument,
    NotFound,
    AlreadyPresent,
    IllegalState,
    TimedOut,
    ServiceUnavailable,
    RuntimeError,
}

/// A semantic failure reported by the master or a tablet server inside
/// an otherwise-successful RPC response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireStatus {
    pub code: WireStatusCode,
    pub message: String,
}

impl WireStatus {
    pub fn new(code: WireStatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(WireStatusCode::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(WireStatusCode::NotFound, message)
    }

    pub fn already_present(message: impl Into<String>) -> Self {
        Self::new(WireStatusCode::AlreadyPresent, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(WireStatusCode::ServiceUnavailable, message)
    }
}

impl std::fmt::Display for WireStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}
