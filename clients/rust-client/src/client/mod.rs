mod builder;
mod connection;
mod metadata;
mod reader;
mod statement;

pub use builder::BridgeClientBuilder;
pub use reader::ResultReader;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use super::protocol::{
    decode_message, encode_command, BridgeError, Command, Response, BRIDGE_MAGIC,
    MAX_MESSAGE_SIZE,
};

pub(crate) const DEFAULT_FETCH_SIZE: i32 = 10;
pub(crate) const DEFAULT_CHUNK_SIZE: i32 = 64 * 1024;

/// One TCP session with the gateway.
///
/// Requests are strictly sequential; use a second client to cancel a
/// statement that is executing on this one.
pub struct BridgeClient {
    read: OwnedReadHalf,
    write: OwnedWriteHalf,
    fetch_size: i32,
    chunk_size: i32,
}

impl BridgeClient {
    pub async fn connect(addr: &str) -> Result<Self, BridgeError> {
        Self::connect_with(addr, DEFAULT_FETCH_SIZE, DEFAULT_CHUNK_SIZE).await
    }

    pub(crate) async fn connect_with(
        addr: &str,
        fetch_size: i32,
        chunk_size: i32,
    ) -> Result<Self, BridgeError> {
        let stream = TcpStream::connect(addr).await.map_err(|e| {
            BridgeError::TransportError(format!("Failed to connect to {}: {}", addr, e))
        })?;

        stream.set_nodelay(true).map_err(|e| {
            BridgeError::TransportError(format!("Failed to set TCP_NODELAY: {}", e))
        })?;

        let (read, mut write) = stream.into_split();

        write.write_all(BRIDGE_MAGIC).await.map_err(|e| {
            BridgeError::TransportError(format!("Failed to send magic header: {}", e))
        })?;

        tracing::debug!("Connected to gateway at {}", addr);

        Ok(Self {
            read,
            write,
            fetch_size,
            chunk_size,
        })
    }

    /// Fetch size sent with `execute`
    pub fn fetch_size(&self) -> i32 {
        self.fetch_size
    }

    /// Chunk size used by `ResultReader`
    pub fn chunk_size(&self) -> i32 {
        self.chunk_size
    }

    pub(crate) async fn send_command(&mut self, command: Command) -> Result<Response, BridgeError> {
        let data = encode_command(&command)?;
        self.write
            .write_all(&data)
            .await
            .map_err(|e| BridgeError::TransportError(format!("Write failed: {}", e)))?;
        self.write
            .flush()
            .await
            .map_err(|e| BridgeError::TransportError(format!("Flush failed: {}", e)))?;

        let mut len_buf = [0u8; 4];
        self.read
            .read_exact(&mut len_buf)
            .await
            .map_err(|e| BridgeError::TransportError(format!("Read length failed: {}", e)))?;

        let msg_len = u32::from_be_bytes(len_buf) as usize;
        if msg_len > MAX_MESSAGE_SIZE {
            return Err(BridgeError::MessageTooLarge);
        }

        let mut payload = vec![0u8; msg_len];
        self.read
            .read_exact(&mut payload)
            .await
            .map_err(|e| BridgeError::TransportError(format!("Read payload failed: {}", e)))?;

        decode_message(&payload)
    }

    pub(crate) fn unexpected(response: Response, expected: &str) -> BridgeError {
        match response {
            Response::Error { error } => error,
            other => BridgeError::ProtocolError(format!(
                "Expected {} response, got {:?}",
                expected, other
            )),
        }
    }

    pub(crate) async fn send_expect_ok(&mut self, command: Command) -> Result<(), BridgeError> {
        match self.send_command(command).await? {
            Response::Ok => Ok(()),
            other => Err(Self::unexpected(other, "ok")),
        }
    }

    pub(crate) async fn send_expect_flag(&mut self, command: Command) -> Result<bool, BridgeError> {
        match self.send_command(command).await? {
            Response::Flag { value } => Ok(value),
            other => Err(Self::unexpected(other, "flag")),
        }
    }

    pub async fn ping(&mut self) -> Result<i64, BridgeError> {
        match self.send_command(Command::Ping).await? {
            Response::Pong { timestamp } => Ok(timestamp),
            other => Err(Self::unexpected(other, "pong")),
        }
    }
}
