use sqlbridge_client::protocol::BridgeError;
use thiserror::Error;

use crate::backend::BackendError;

/// Kind of object a handle refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    Connection,
    Statement,
    ResultSet,
}

impl std::fmt::Display for HandleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandleKind::Connection => write!(f, "Connection"),
            HandleKind::Statement => write!(f, "Statement"),
            HandleKind::ResultSet => write!(f, "Result set"),
        }
    }
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{kind} '{id}' not found")]
    HandleNotFound { kind: HandleKind, id: String },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Driver error: {0}")]
    DriverError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    pub fn not_found(kind: HandleKind, id: &str) -> Self {
        GatewayError::HandleNotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Failure while opening a session
    pub fn connection(err: BackendError) -> Self {
        GatewayError::ConnectionError(err.to_string())
    }

    /// Failure of a session mutator or metadata read
    pub fn driver(err: BackendError) -> Self {
        GatewayError::DriverError(err.to_string())
    }

    /// Failure while preparing, executing or fetching
    pub fn execution(err: BackendError) -> Self {
        GatewayError::ExecutionError(err.to_string())
    }
}

impl From<GatewayError> for BridgeError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::HandleNotFound { kind, id } => {
                BridgeError::HandleNotFound(format!("{} '{}'", kind, id))
            }
            GatewayError::ConnectionError(msg) => BridgeError::ConnectionError(msg),
            GatewayError::DriverError(msg) => BridgeError::DriverError(msg),
            GatewayError::ExecutionError(msg) => BridgeError::ExecutionError(msg),
            GatewayError::EncodingError(msg) => BridgeError::EncodingError(msg),
            GatewayError::ProtocolError(msg) => BridgeError::ProtocolError(msg),
            GatewayError::Io(e) => BridgeError::TransportError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = GatewayError::not_found(HandleKind::Statement, "abc");
        assert_eq!(err.to_string(), "Statement 'abc' not found");

        let err = GatewayError::not_found(HandleKind::ResultSet, "r1");
        assert_eq!(err.to_string(), "Result set 'r1' not found");

        let err = GatewayError::ProtocolError("parameter index 0 out of range".to_string());
        assert_eq!(
            err.to_string(),
            "Protocol error: parameter index 0 out of range"
        );

        let err = GatewayError::DriverError("no transaction is active".to_string());
        assert_eq!(err.to_string(), "Driver error: no transaction is active");
    }

    #[test]
    fn test_backend_error_mapping() {
        let err = GatewayError::execution(BackendError::Cancelled);
        assert!(matches!(err, GatewayError::ExecutionError(_)));

        let err = GatewayError::execution(BackendError::InvalidState("closed".into()));
        assert!(matches!(err, GatewayError::ExecutionError(ref m) if m == "Invalid state: closed"));

        let err = GatewayError::connection(BackendError::Unsupported("url".into()));
        assert!(matches!(err, GatewayError::ConnectionError(_)));
    }

    #[test]
    fn test_into_wire_error() {
        let wire: BridgeError = GatewayError::not_found(HandleKind::Connection, "c9").into();
        assert_eq!(wire.code(), "HANDLE_NOT_FOUND");
        assert_eq!(wire.description(), "Connection 'c9'");

        let wire: BridgeError = GatewayError::EncodingError("bad utf-8".into()).into();
        assert_eq!(wire, BridgeError::EncodingError("bad utf-8".into()));
    }
}
