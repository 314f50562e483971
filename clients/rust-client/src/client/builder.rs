use super::{BridgeClient, DEFAULT_CHUNK_SIZE, DEFAULT_FETCH_SIZE};
use crate::protocol::BridgeError;

pub struct BridgeClientBuilder {
    addr: String,
    fetch_size: i32,
    chunk_size: i32,
}

impl BridgeClientBuilder {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            fetch_size: DEFAULT_FETCH_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Row prefetch hint forwarded on every execute (`-1` means "max rows")
    pub fn fetch_size(mut self, rows: i32) -> Self {
        self.fetch_size = rows;
        self
    }

    /// Target frame size in bytes when streaming result sets
    pub fn chunk_size(mut self, bytes: i32) -> Self {
        self.chunk_size = bytes;
        self
    }

    pub async fn build(self) -> Result<BridgeClient, BridgeError> {
        if self.chunk_size <= 0 {
            return Err(BridgeError::ProtocolError(format!(
                "chunk size must be positive, got {}",
                self.chunk_size
            )));
        }
        BridgeClient::connect_with(&self.addr, self.fetch_size, self.chunk_size).await
    }
}
