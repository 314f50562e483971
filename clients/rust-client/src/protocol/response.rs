use super::error::BridgeError;
use super::types::{ExecuteResult, OpenConnectionResult, ResultSetResult};
use serde::{Deserialize, Serialize};

/// Response from the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    /// Success with no payload
    Ok,

    /// Pong response (for Ping)
    Pong { timestamp: i64 },

    /// Connection opened
    Connection(OpenConnectionResult),

    /// Statement prepared
    Statement { statement_id: String },

    /// Statement executed
    Executed(ExecuteResult),

    /// Metadata result set opened
    ResultSet(ResultSetResult),

    /// One frame of encoded rows
    Chunk {
        #[serde(with = "serde_bytes")]
        rows: Vec<u8>,
        is_completed: bool,
    },

    /// The result set had no rows left; no frame was produced
    Completed,

    /// Transaction isolation code
    Isolation { level: i32 },

    /// Answer to a boolean capability question
    Flag { value: bool },

    /// Error response
    Error { error: BridgeError },
}

impl Response {
    /// Create a success response with no data
    pub fn ok_empty() -> Self {
        Response::Ok
    }

    /// Create an error response
    pub fn error(err: BridgeError) -> Self {
        Response::Error { error: err }
    }

    /// Create a pong response
    pub fn pong() -> Self {
        Response::Pong {
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Create a row frame
    pub fn chunk(rows: Vec<u8>, is_completed: bool) -> Self {
        Response::Chunk { rows, is_completed }
    }
}
