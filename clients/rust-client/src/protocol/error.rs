use serde::{Deserialize, Serialize};

/// Structured error carried in `Response::Error`.
///
/// The variant is the error category (the code on the wire) and the payload
/// is a human readable description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeError {
    /// A connection, statement or result set handle is unknown or closed
    HandleNotFound(String),
    /// The backend refused to open a session
    ConnectionError(String),
    /// The backend rejected a session mutator (catalog, isolation, commit...)
    DriverError(String),
    /// Preparing or executing a statement failed
    ExecutionError(String),
    /// A value could not be encoded into (or decoded from) the row format
    EncodingError(String),
    /// Malformed request or protocol violation
    ProtocolError(String),
    /// Frame larger than `MAX_MESSAGE_SIZE`
    MessageTooLarge,
    /// Client-side I/O failure talking to the gateway
    TransportError(String),
}

impl BridgeError {
    /// Stable error code for the category
    pub fn code(&self) -> &'static str {
        match self {
            BridgeError::HandleNotFound(_) => "HANDLE_NOT_FOUND",
            BridgeError::ConnectionError(_) => "CONNECTION_ERROR",
            BridgeError::DriverError(_) => "DRIVER_ERROR",
            BridgeError::ExecutionError(_) => "EXECUTION_ERROR",
            BridgeError::EncodingError(_) => "ENCODING_ERROR",
            BridgeError::ProtocolError(_) => "PROTOCOL_ERROR",
            BridgeError::MessageTooLarge => "MESSAGE_TOO_LARGE",
            BridgeError::TransportError(_) => "TRANSPORT_ERROR",
        }
    }

    /// Description without the category prefix
    pub fn description(&self) -> &str {
        match self {
            BridgeError::HandleNotFound(msg)
            | BridgeError::ConnectionError(msg)
            | BridgeError::DriverError(msg)
            | BridgeError::ExecutionError(msg)
            | BridgeError::EncodingError(msg)
            | BridgeError::ProtocolError(msg)
            | BridgeError::TransportError(msg) => msg,
            BridgeError::MessageTooLarge => "message too large",
        }
    }
}

impl std::fmt::Display for BridgeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BridgeError::HandleNotFound(msg) => write!(f, "Handle not found: {}", msg),
            BridgeError::ConnectionError(msg) => write!(f, "Connection error: {}", msg),
            BridgeError::DriverError(msg) => write!(f, "Driver error: {}", msg),
            BridgeError::ExecutionError(msg) => write!(f, "Execution error: {}", msg),
            BridgeError::EncodingError(msg) => write!(f, "Encoding error: {}", msg),
            BridgeError::ProtocolError(msg) => write!(f, "Protocol error: {}", msg),
            BridgeError::MessageTooLarge => write!(f, "Message too large"),
            BridgeError::TransportError(msg) => write!(f, "Transport error: {}", msg),
        }
    }
}

impl std::error::Error for BridgeError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(
            BridgeError::HandleNotFound("x".into()).code(),
            "HANDLE_NOT_FOUND"
        );
        assert_eq!(BridgeError::MessageTooLarge.code(), "MESSAGE_TOO_LARGE");
        assert_eq!(
            BridgeError::ProtocolError("bad".into()).description(),
            "bad"
        );
    }

    #[test]
    fn test_display() {
        let err = BridgeError::DriverError("no active transaction".to_string());
        assert_eq!(err.to_string(), "Driver error: no active transaction");
    }
}
