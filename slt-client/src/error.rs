use std::fmt;

use slt_wire::{WireStatus, WireStatusCode};

/// Errors surfaced by client operations.
#[derive(Debug)]
pub enum ClientError {
    /// Failed to establish a connection to a master or tablet server
    ConnectionFailed(std::io::Error),
    /// Connection was closed by the remote side
    ConnectionClosed,
    /// I/O error during communication
    Io(std::io::Error),
    /// Protocol-level error (malformed frame, bad codec state)
    Protocol(String),
    /// Received an unexpected or undecodable response
    InvalidResponse(String),
    /// A caller-supplied argument was rejected
    InvalidArgument(String),
    /// The operation is forbidden in the current state
    IllegalState(String),
    /// The requested entity does not exist
    NotFound(String),
    /// The entity being created already exists
    AlreadyPresent(String),
    /// A deadline or per-RPC timeout elapsed
    TimedOut(String),
    /// Server-side failure passed through verbatim
    Server(WireStatus),
}

impl ClientError {
    /// Re-materialize an embedded wire error as the matching native
    /// variant, so callers can pattern-match on the status kind.
    /// Unmapped codes pass through as `Server`.
    pub fn from_wire(status: WireStatus) -> Self {
        match status.code {
            WireStatusCode::InvalidArgument => Self::InvalidArgument(status.message),
            WireStatusCode::NotFound => Self::NotFound(status.message),
            WireStatusCode::AlreadyPresent => Self::AlreadyPresent(status.message),
            WireStatusCode::IllegalState => Self::IllegalState(status.message),
            WireStatusCode::TimedOut => Self::TimedOut(status.message),
            WireStatusCode::ServiceUnavailable | WireStatusCode::RuntimeError => {
                Self::Server(status)
            }
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(e) => write!(f, "Connection failed: {}", e),
            Self::ConnectionClosed => write!(f, "Connection closed by remote"),
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Self::IllegalState(msg) => write!(f, "Illegal state: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::AlreadyPresent(msg) => write!(f, "Already present: {}", msg),
            Self::TimedOut(msg) => write!(f, "Timed out: {}", msg),
            Self::Server(status) => write!(f, "Server error: {}", status),
        }
    }
}

// Statuses fan out to every mutation in a failed batch, so they must be
// cloneable; io::Error is rebuilt from its kind and message.
impl Clone for ClientError {
    fn clone(&self) -> Self {
        match self {
            Self::ConnectionFailed(e) => {
                Self::ConnectionFailed(std::io::Error::new(e.kind(), e.to_string()))
            }
            Self::ConnectionClosed => Self::ConnectionClosed,
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Protocol(msg) => Self::Protocol(msg.clone()),
            Self::InvalidResponse(msg) => Self::InvalidResponse(msg.clone()),
            Self::InvalidArgument(msg) => Self::InvalidArgument(msg.clone()),
            Self::IllegalState(msg) => Self::IllegalState(msg.clone()),
            Self::NotFound(msg) => Self::NotFound(msg.clone()),
            Self::AlreadyPresent(msg) => Self::AlreadyPresent(msg.clone()),
            Self::TimedOut(msg) => Self::TimedOut(msg.clone()),
            Self::Server(status) => Self::Server(status.clone()),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ConnectionFailed(e) | Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<slt_core::SlateError> for ClientError {
    fn from(err: slt_core::SlateError) -> Self {
        Self::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
