//! Session state shared by every protocol handler
//!
//! Connections, statements and result sets live in three independent handle
//! registries. Ownership is tracked by id so closing a parent releases its
//! children.

use std::collections::HashSet;

use parking_lot::Mutex;
use sqlbridge_client::protocol::ColumnDescriptor;

use crate::backend::{BackendConnection, BackendCursor, BackendStatement, CancellationToken};
use crate::error::{GatewayError, GatewayResult, HandleKind};
use crate::registry::HandleRegistry;
use crate::stream::{ResultSetEntry, ResultSetOwner};

pub mod connection;
pub mod metadata;
pub mod statement;

pub use connection::ConnectionManager;
pub use metadata::MetadataService;
pub use statement::StatementManager;

/// Child handles of a connection. `None` once the connection is closing, so
/// nothing can attach to it any more.
type Children = Mutex<Option<HashSet<String>>>;

pub struct ConnectionEntry {
    pub(crate) backend: Box<dyn BackendConnection>,
    statements: Children,
    result_sets: Children,
}

fn attach(children: &Children, id: &str) -> bool {
    match children.lock().as_mut() {
        Some(ids) => {
            ids.insert(id.to_string());
            true
        }
        None => false,
    }
}

fn detach(children: &Children, id: &str) {
    if let Some(ids) = children.lock().as_mut() {
        ids.remove(id);
    }
}

fn snapshot(children: &Children) -> Vec<String> {
    children
        .lock()
        .as_ref()
        .map(|ids| ids.iter().cloned().collect())
        .unwrap_or_default()
}

impl ConnectionEntry {
    pub fn new(backend: Box<dyn BackendConnection>) -> Self {
        Self {
            backend,
            statements: Mutex::new(Some(HashSet::new())),
            result_sets: Mutex::new(Some(HashSet::new())),
        }
    }

    pub fn statement_ids(&self) -> Vec<String> {
        snapshot(&self.statements)
    }

    pub fn result_set_ids(&self) -> Vec<String> {
        snapshot(&self.result_sets)
    }
}

pub(crate) struct StatementState {
    pub(crate) statement: Box<dyn BackendStatement>,
    /// Live cursor produced by the last execute
    pub(crate) result_set: Option<String>,
}

pub struct StatementEntry {
    connection_id: String,
    /// Kept outside the state lock so a cancel never waits on the execute
    token: CancellationToken,
    pub(crate) state: Mutex<StatementState>,
}

impl StatementEntry {
    pub fn new(connection_id: String, statement: Box<dyn BackendStatement>) -> Self {
        Self {
            connection_id,
            token: CancellationToken::new(),
            state: Mutex::new(StatementState {
                statement,
                result_set: None,
            }),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn result_set_id(&self) -> Option<String> {
        self.state.lock().result_set.clone()
    }
}

/// Description of a freshly opened result set
#[derive(Debug, Clone)]
pub struct OpenedResultSet {
    pub result_set_id: String,
    pub has_rows: bool,
    pub columns: Vec<ColumnDescriptor>,
}

pub struct SessionStore {
    pub connections: HandleRegistry<ConnectionEntry>,
    pub statements: HandleRegistry<StatementEntry>,
    pub result_sets: HandleRegistry<ResultSetEntry>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            connections: HandleRegistry::new(HandleKind::Connection),
            statements: HandleRegistry::new(HandleKind::Statement),
            result_sets: HandleRegistry::new(HandleKind::ResultSet),
        }
    }

    /// Register a cursor. Result sets owned by a connection are linked here;
    /// statement owners record the id themselves.
    pub fn open_result_set(
        &self,
        owner: ResultSetOwner,
        cursor: Box<dyn BackendCursor>,
    ) -> GatewayResult<OpenedResultSet> {
        let connection = match &owner {
            ResultSetOwner::Connection(id) => Some((id.clone(), self.connections.get(id)?)),
            ResultSetOwner::Statement(_) => None,
        };

        let entry = ResultSetEntry::open(owner, cursor)?;
        let has_rows = entry.has_rows();
        let columns = entry.columns().to_vec();
        let result_set_id = self.result_sets.put(entry);

        if let Some((connection_id, connection)) = connection {
            if !attach(&connection.result_sets, &result_set_id) {
                let _ = self.release_result_set(&result_set_id);
                return Err(GatewayError::not_found(HandleKind::Connection, &connection_id));
            }
        }

        Ok(OpenedResultSet {
            result_set_id,
            has_rows,
            columns,
        })
    }

    /// Remove the handle and release the cursor without touching the owner
    pub(crate) fn release_result_set(&self, id: &str) -> GatewayResult<()> {
        let entry = self.result_sets.remove(id)?;
        entry.close();
        Ok(())
    }

    pub fn close_result_set(&self, id: &str) -> GatewayResult<()> {
        let entry = self.result_sets.remove(id)?;
        entry.close();

        match entry.owner() {
            ResultSetOwner::Statement(statement_id) => {
                if let Ok(statement) = self.statements.get(statement_id) {
                    let mut state = statement.state.lock();
                    if state.result_set.as_deref() == Some(id) {
                        state.result_set = None;
                    }
                }
            }
            ResultSetOwner::Connection(connection_id) => {
                if let Ok(connection) = self.connections.get(connection_id) {
                    detach(&connection.result_sets, id);
                }
            }
        }
        tracing::debug!("Closed result set {}", id);
        Ok(())
    }

    /// Register a prepared statement under its connection. Fails, and drops
    /// the statement, when the connection closed after it was looked up.
    pub(crate) fn register_statement(
        &self,
        connection: &ConnectionEntry,
        connection_id: &str,
        statement: Box<dyn BackendStatement>,
    ) -> GatewayResult<String> {
        let statement_id = self
            .statements
            .put(StatementEntry::new(connection_id.to_string(), statement));
        if attach(&connection.statements, &statement_id) {
            return Ok(statement_id);
        }

        if let Ok(orphan) = self.statements.remove(&statement_id) {
            if let Err(e) = orphan.state.lock().statement.close() {
                tracing::warn!("Failed to close statement {}: {}", statement_id, e);
            }
        }
        Err(GatewayError::not_found(HandleKind::Connection, connection_id))
    }

    pub fn close_statement(&self, id: &str) -> GatewayResult<()> {
        let entry = self.statements.remove(id)?;
        {
            let mut state = entry.state.lock();
            if let Some(result_set_id) = state.result_set.take() {
                // already gone if the client closed it first
                let _ = self.release_result_set(&result_set_id);
            }
            if let Err(e) = state.statement.close() {
                tracing::warn!("Failed to close statement {}: {}", id, e);
            }
        }

        if let Ok(connection) = self.connections.get(&entry.connection_id) {
            detach(&connection.statements, id);
        }
        tracing::debug!("Closed statement {}", id);
        Ok(())
    }

    /// Close a connection together with its statements and result sets
    pub fn close_connection(&self, id: &str) -> GatewayResult<()> {
        let entry = self.connections.remove(id)?;

        let statements = entry.statements.lock().take().unwrap_or_default();
        for statement_id in statements {
            match self.close_statement(&statement_id) {
                Ok(()) | Err(GatewayError::HandleNotFound { .. }) => {}
                Err(e) => tracing::warn!("Failed to close statement {}: {}", statement_id, e),
            }
        }

        let result_sets = entry.result_sets.lock().take().unwrap_or_default();
        for result_set_id in result_sets {
            let _ = self.release_result_set(&result_set_id);
        }

        entry.backend.close().map_err(GatewayError::driver)?;
        tracing::info!(
            "Closed connection {} ({} connections open)",
            id,
            self.connections.len()
        );
        Ok(())
    }
}
