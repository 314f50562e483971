//! Backend driver capability
//!
//! A backend turns a connection URL into a live database session. The gateway
//! only talks to sessions through the traits below, so vendor drivers plug in
//! by implementing them and registering with a [`BackendRegistry`].
//!
//! All calls are blocking; the protocol handler runs them on tokio's
//! blocking pool.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlbridge_client::protocol::{ColumnDescriptor, TransactionIsolation};
use thiserror::Error;

pub mod sqlite;
mod value;

pub use sqlite::SqliteBackend;
pub use value::{BoundValue, NativeRow, NativeValue};

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Statement was cancelled")]
    Cancelled,

    #[error("Not supported: {0}")]
    Unsupported(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Cooperative cancellation flag shared between a statement and whoever
/// wants to stop it. Backends poll it at their own checkpoints.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Re-arm before a new execution
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// Product information reported when a session opens
#[derive(Debug, Clone, Default)]
pub struct DatabaseInfo {
    pub product_name: Option<String>,
    pub product_version: Option<String>,
    pub major_version: i32,
    pub minor_version: i32,
}

/// Filters for metadata queries. `None` means "no filter"; patterns use SQL
/// `LIKE` wildcards.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub catalog: Option<String>,
    pub schema_pattern: Option<String>,
    pub name_pattern: Option<String>,
    pub types: Option<Vec<String>>,
}

/// Result of executing a statement
pub enum ExecuteOutcome {
    UpdateCount(i64),
    Rows(Box<dyn BackendCursor>),
}

/// A vendor driver
pub trait Backend: Send + Sync {
    fn name(&self) -> &'static str;

    fn accepts_url(&self, url: &str) -> bool;

    fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> BackendResult<Box<dyn BackendConnection>>;
}

/// An open database session
pub trait BackendConnection: Send + Sync {
    fn database_info(&self) -> BackendResult<DatabaseInfo>;

    fn catalog(&self) -> BackendResult<Option<String>>;
    fn set_catalog(&self, catalog: &str) -> BackendResult<()>;

    fn set_auto_commit(&self, auto_commit: bool) -> BackendResult<()>;

    fn transaction_isolation(&self) -> BackendResult<TransactionIsolation>;
    fn set_transaction_isolation(&self, level: TransactionIsolation) -> BackendResult<()>;

    fn commit(&self) -> BackendResult<()>;
    fn rollback(&self) -> BackendResult<()>;

    /// Prepare `sql` for forward-only, read-only execution
    fn prepare(&self, sql: &str) -> BackendResult<Box<dyn BackendStatement>>;

    fn tables(&self, filter: &MetadataFilter) -> BackendResult<Box<dyn BackendCursor>>;
    fn catalogs(&self) -> BackendResult<Box<dyn BackendCursor>>;
    fn procedures(&self, filter: &MetadataFilter) -> BackendResult<Box<dyn BackendCursor>>;
    fn functions(&self, filter: &MetadataFilter) -> BackendResult<Box<dyn BackendCursor>>;

    fn is_read_only(&self) -> BackendResult<bool>;
    fn supports_group_by(&self) -> BackendResult<bool>;

    fn close(&self) -> BackendResult<()>;
}

/// A prepared statement
pub trait BackendStatement: Send {
    fn parameter_count(&self) -> usize;

    /// Bind a 1-based parameter
    fn bind(&mut self, index: usize, value: BoundValue) -> BackendResult<()>;

    fn set_fetch_size(&mut self, rows: usize);
    fn fetch_size(&self) -> usize;

    /// Row limit, 0 when unlimited
    fn max_rows(&self) -> usize;

    fn execute(&mut self, token: &CancellationToken) -> BackendResult<ExecuteOutcome>;

    fn close(&mut self) -> BackendResult<()>;
}

/// Forward-only row source
pub trait BackendCursor: Send {
    fn columns(&self) -> &[ColumnDescriptor];

    fn next_row(&mut self) -> BackendResult<Option<NativeRow>>;

    fn close(&mut self) -> BackendResult<()>;
}

/// Cursor over rows that were already fetched from the backend
pub struct MaterializedCursor {
    columns: Vec<ColumnDescriptor>,
    rows: VecDeque<NativeRow>,
}

impl MaterializedCursor {
    pub fn new(columns: Vec<ColumnDescriptor>, rows: Vec<NativeRow>) -> Self {
        Self {
            columns,
            rows: rows.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.rows.len()
    }
}

impl BackendCursor for MaterializedCursor {
    fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn next_row(&mut self) -> BackendResult<Option<NativeRow>> {
        Ok(self.rows.pop_front())
    }

    fn close(&mut self) -> BackendResult<()> {
        self.rows.clear();
        Ok(())
    }
}

/// Registered backends, tried in registration order
#[derive(Default, Clone)]
pub struct BackendRegistry {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in SQLite backend
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(SqliteBackend::new()));
        registry
    }

    pub fn register(&mut self, backend: Arc<dyn Backend>) {
        tracing::debug!("Registered backend: {}", backend.name());
        self.backends.push(backend);
    }

    pub fn find(&self, url: &str) -> Option<Arc<dyn Backend>> {
        self.backends.iter().find(|b| b.accepts_url(url)).cloned()
    }

    pub fn connect(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> BackendResult<Box<dyn BackendConnection>> {
        let backend = self
            .find(url)
            .ok_or_else(|| BackendError::Unsupported(format!("no backend accepts URL '{}'", url)))?;
        backend.connect(url, properties)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancellation_token() {
        let token = CancellationToken::new();
        let shared = token.clone();
        assert!(!token.is_cancelled());
        shared.cancel();
        assert!(token.is_cancelled());
        token.reset();
        assert!(!shared.is_cancelled());
    }

    #[test]
    fn test_materialized_cursor_order() {
        let mut cursor = MaterializedCursor::new(
            vec![],
            vec![vec![NativeValue::I32(1)], vec![NativeValue::I32(2)]],
        );
        assert!(matches!(
            cursor.next_row().unwrap().as_deref(),
            Some([NativeValue::I32(1)])
        ));
        assert_eq!(cursor.remaining(), 1);
        assert!(cursor.next_row().unwrap().is_some());
        assert!(cursor.next_row().unwrap().is_none());
    }

    #[test]
    fn test_registry_rejects_unknown_url() {
        let registry = BackendRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["sqlite"]);
        assert!(registry.find("postgres://localhost/db").is_none());
        assert!(matches!(
            registry.connect("postgres://localhost/db", &HashMap::new()),
            Err(BackendError::Unsupported(_))
        ));
    }
}
