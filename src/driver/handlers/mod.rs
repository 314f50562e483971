//! Session handler for the gateway protocol
//!
//! Reads command frames, runs them against the shared [`Gateway`] and writes
//! one response frame per command.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use sqlbridge_client::protocol::{
    decode_message, encode_response, BridgeError, Command, Response, BRIDGE_MAGIC,
    MAX_MESSAGE_SIZE,
};

use crate::error::{GatewayError, GatewayResult};
use crate::gateway::Gateway;

pub mod connection;
pub mod metadata;
pub mod reader;
pub mod statement;

/// Handler for a single client session
pub struct GatewayHandler {
    pub(crate) gateway: Arc<Gateway>,
    /// Connections opened through this session
    pub(crate) opened: HashSet<String>,
    close_on_disconnect: bool,
}

impl GatewayHandler {
    pub fn new(gateway: Arc<Gateway>, close_on_disconnect: bool) -> Self {
        Self {
            gateway,
            opened: HashSet::new(),
            close_on_disconnect,
        }
    }

    /// Serve one client session until it disconnects
    pub async fn handle_connection<S>(&mut self, mut stream: S, addr: String)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        tracing::info!("Client session from {}", addr);

        let mut magic = [0u8; BRIDGE_MAGIC.len()];
        if let Err(e) = stream.read_exact(&mut magic).await {
            tracing::debug!("Client {} left before the handshake: {}", addr, e);
            return;
        }
        if magic != BRIDGE_MAGIC {
            tracing::warn!("Rejected client {}: bad protocol header", addr);
            return;
        }

        loop {
            // Read message length (4 bytes, big-endian)
            let mut len_buf = [0u8; 4];
            match stream.read_exact(&mut len_buf).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::debug!("Client session closed: {}", addr);
                    break;
                }
                Err(e) => {
                    tracing::warn!("Read error from {}: {}", addr, e);
                    break;
                }
            }

            let msg_len = u32::from_be_bytes(len_buf) as usize;

            if msg_len > MAX_MESSAGE_SIZE {
                let resp = Response::error(BridgeError::MessageTooLarge);
                if let Err(e) = send_response(&mut stream, &resp).await {
                    tracing::warn!("Failed to send error response: {}", e);
                }
                break;
            }

            let mut payload = vec![0u8; msg_len];
            if let Err(e) = stream.read_exact(&mut payload).await {
                tracing::warn!("Read payload error from {}: {}", addr, e);
                break;
            }

            let command: Command = match decode_message(&payload) {
                Ok(cmd) => cmd,
                Err(e) => {
                    let resp = Response::error(e);
                    if let Err(e) = send_response(&mut stream, &resp).await {
                        tracing::warn!("Failed to send error response: {}", e);
                    }
                    continue;
                }
            };

            tracing::debug!("{} -> {}", addr, command.name());
            let response = self.execute_command(command).await;

            if let Err(e) = send_response(&mut stream, &response).await {
                tracing::warn!("Failed to send response to {}: {}", addr, e);
                break;
            }
        }

        self.cleanup(&addr).await;
    }

    /// Close whatever this session left open
    async fn cleanup(&mut self, addr: &str) {
        let opened: Vec<String> = self.opened.drain().collect();
        if !self.close_on_disconnect || opened.is_empty() {
            return;
        }
        let gateway = self.gateway.clone();
        let addr = addr.to_string();
        let result = tokio::task::spawn_blocking(move || {
            for connection_id in opened {
                if !gateway.store().connections.contains(&connection_id) {
                    continue;
                }
                tracing::debug!("Closing connection {} left open by {}", connection_id, addr);
                if let Err(e) = gateway.connections().close(&connection_id) {
                    tracing::warn!("Failed to close connection {}: {}", connection_id, e);
                }
            }
        })
        .await;
        if let Err(e) = result {
            tracing::warn!("Session cleanup task failed: {}", e);
        }
    }

    /// Run a blocking gateway call on the blocking pool
    pub(crate) async fn run_blocking<T, F>(&self, f: F) -> GatewayResult<T>
    where
        F: FnOnce(&Gateway) -> GatewayResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let gateway = self.gateway.clone();
        tokio::task::spawn_blocking(move || f(&gateway))
            .await
            .map_err(|e| GatewayError::ExecutionError(format!("worker task failed: {}", e)))?
    }

    /// Execute a command and return a response
    pub async fn execute_command(&mut self, command: Command) -> Response {
        match command {
            // ==================== Utility ====================
            Command::Ping => Response::pong(),

            // ==================== Connections ====================
            Command::OpenConnection { url, properties } => {
                connection::handle_open_connection(self, url, properties).await
            }

            Command::CloseConnection { connection_id } => {
                connection::handle_close_connection(self, connection_id).await
            }

            Command::ChangeCatalog {
                connection_id,
                catalog,
            } => connection::handle_change_catalog(self, connection_id, catalog).await,

            Command::SetAutoCommit {
                connection_id,
                auto_commit,
            } => connection::handle_set_auto_commit(self, connection_id, auto_commit).await,

            Command::GetTransactionIsolation { connection_id } => {
                connection::handle_get_transaction_isolation(self, connection_id).await
            }

            Command::SetTransactionIsolation {
                connection_id,
                isolation,
            } => {
                connection::handle_set_transaction_isolation(self, connection_id, isolation).await
            }

            Command::Commit { connection_id } => {
                connection::handle_commit(self, connection_id).await
            }

            Command::Rollback { connection_id } => {
                connection::handle_rollback(self, connection_id).await
            }

            // ==================== Statements ====================
            Command::CreateStatement { connection_id, sql } => {
                statement::handle_create_statement(self, connection_id, sql).await
            }

            Command::SetParameter {
                statement_id,
                index,
                param_type,
                value,
            } => {
                statement::handle_set_parameter(self, statement_id, index, param_type, value).await
            }

            Command::ExecuteStatement {
                statement_id,
                fetch_size,
            } => statement::handle_execute_statement(self, statement_id, fetch_size).await,

            Command::CancelStatement { statement_id } => {
                statement::handle_cancel_statement(self, statement_id)
            }

            Command::CloseStatement { statement_id } => {
                statement::handle_close_statement(self, statement_id).await
            }

            // ==================== Result Sets ====================
            Command::ReadResultSet {
                result_set_id,
                chunk_size,
            } => reader::handle_read_result_set(self, result_set_id, chunk_size).await,

            Command::CloseResultSet { result_set_id } => {
                reader::handle_close_result_set(self, result_set_id).await
            }

            // ==================== Metadata ====================
            Command::GetTables {
                connection_id,
                catalog,
                schema_pattern,
                table_name_pattern,
                types,
            } => {
                metadata::handle_get_tables(
                    self,
                    connection_id,
                    catalog,
                    schema_pattern,
                    table_name_pattern,
                    types,
                )
                .await
            }

            Command::GetCatalogs { connection_id } => {
                metadata::handle_get_catalogs(self, connection_id).await
            }

            Command::GetProcedures {
                connection_id,
                catalog,
                schema_pattern,
                procedure_name_pattern,
            } => {
                metadata::handle_get_procedures(
                    self,
                    connection_id,
                    catalog,
                    schema_pattern,
                    procedure_name_pattern,
                )
                .await
            }

            Command::GetFunctions {
                connection_id,
                catalog,
                schema_pattern,
                function_name_pattern,
            } => {
                metadata::handle_get_functions(
                    self,
                    connection_id,
                    catalog,
                    schema_pattern,
                    function_name_pattern,
                )
                .await
            }

            Command::IsReadOnly { connection_id } => {
                metadata::handle_is_read_only(self, connection_id).await
            }

            Command::SupportsGroupBy { connection_id } => {
                metadata::handle_supports_group_by(self, connection_id).await
            }
        }
    }
}

/// Turn a gateway result into a response
pub(crate) fn respond<T>(result: GatewayResult<T>, ok: impl FnOnce(T) -> Response) -> Response {
    match result {
        Ok(value) => ok(value),
        Err(e) => Response::error(e.into()),
    }
}

/// Send a response to the client. A response that cannot be encoded is
/// replaced by an error response so the client is never left waiting.
async fn send_response<S>(stream: &mut S, response: &Response) -> Result<(), BridgeError>
where
    S: AsyncWrite + Unpin,
{
    let data = match encode_response(response) {
        Ok(data) => data,
        Err(e) => {
            tracing::warn!("Failed to encode response: {}", e);
            encode_response(&Response::error(e))?
        }
    };
    stream
        .write_all(&data)
        .await
        .map_err(|e| BridgeError::TransportError(e.to_string()))?;
    stream
        .flush()
        .await
        .map_err(|e| BridgeError::TransportError(e.to_string()))?;
    Ok(())
}

/// Spawn the session dispatcher. Accepted sockets sent on the returned
/// channel each get their own handler task.
pub fn spawn_gateway_handler(
    gateway: Arc<Gateway>,
    close_on_disconnect: bool,
) -> tokio::sync::mpsc::Sender<(TcpStream, String)> {
    let (tx, mut rx) = tokio::sync::mpsc::channel::<(TcpStream, String)>(100);

    tokio::spawn(async move {
        while let Some((stream, addr)) = rx.recv().await {
            let gateway = gateway.clone();
            tokio::spawn(async move {
                let mut handler = GatewayHandler::new(gateway, close_on_disconnect);
                handler.handle_connection(stream, addr).await;
            });
        }
    });

    tx
}

/// Accept clients on `listener` until `shutdown` resolves
pub async fn serve<F>(
    listener: TcpListener,
    gateway: Arc<Gateway>,
    close_on_disconnect: bool,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let sessions = spawn_gateway_handler(gateway, close_on_disconnect);
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        tracing::warn!("Accept failed: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream.set_nodelay(true) {
                    tracing::debug!("Failed to set TCP_NODELAY for {}: {}", addr, e);
                }
                if sessions.send((stream, addr.to_string())).await.is_err() {
                    tracing::warn!("Session dispatcher stopped");
                    break;
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Listener stopped");
                break;
            }
        }
    }

    Ok(())
}
