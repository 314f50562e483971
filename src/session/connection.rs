use std::collections::HashMap;
use std::sync::Arc;

use sqlbridge_client::protocol::{OpenConnectionResult, TransactionIsolation};

use super::{ConnectionEntry, SessionStore};
use crate::backend::{BackendConnection, BackendRegistry};
use crate::error::{GatewayError, GatewayResult};

/// Opens database sessions and applies session-level settings
pub struct ConnectionManager {
    store: Arc<SessionStore>,
    backends: BackendRegistry,
}

impl ConnectionManager {
    pub fn new(store: Arc<SessionStore>, backends: BackendRegistry) -> Self {
        Self { store, backends }
    }

    pub fn open(
        &self,
        url: &str,
        properties: &HashMap<String, String>,
    ) -> GatewayResult<OpenConnectionResult> {
        let backend = self
            .backends
            .connect(url, properties)
            .map_err(GatewayError::connection)?;

        let info = backend.database_info().map_err(GatewayError::connection)?;
        let catalog = backend.catalog().map_err(GatewayError::connection)?;
        backend
            .set_auto_commit(true)
            .map_err(GatewayError::connection)?;

        let connection_id = self.store.connections.put(ConnectionEntry::new(backend));
        tracing::info!(
            "Opened connection {} to {} ({} connections open)",
            connection_id,
            info.product_name.as_deref().unwrap_or("unknown backend"),
            self.store.connections.len()
        );

        Ok(OpenConnectionResult {
            connection_id,
            catalog: catalog.unwrap_or_default(),
            product_name: info.product_name.unwrap_or_default(),
            product_version: info.product_version.unwrap_or_default(),
            major_version: info.major_version,
            minor_version: info.minor_version,
        })
    }

    pub fn close(&self, connection_id: &str) -> GatewayResult<()> {
        self.store.close_connection(connection_id)
    }

    pub fn change_catalog(&self, connection_id: &str, catalog: &str) -> GatewayResult<()> {
        self.with_backend(connection_id, |conn| conn.set_catalog(catalog))
    }

    pub fn set_auto_commit(&self, connection_id: &str, auto_commit: bool) -> GatewayResult<()> {
        self.with_backend(connection_id, |conn| conn.set_auto_commit(auto_commit))
    }

    pub fn get_transaction_isolation(&self, connection_id: &str) -> GatewayResult<i32> {
        self.with_backend(connection_id, |conn| conn.transaction_isolation())
            .map(TransactionIsolation::code)
    }

    pub fn set_transaction_isolation(&self, connection_id: &str, code: i32) -> GatewayResult<()> {
        let level = TransactionIsolation::from_code(code).ok_or_else(|| {
            GatewayError::ProtocolError(format!("unknown transaction isolation code {}", code))
        })?;
        self.with_backend(connection_id, |conn| conn.set_transaction_isolation(level))
    }

    pub fn commit(&self, connection_id: &str) -> GatewayResult<()> {
        self.with_backend(connection_id, |conn| conn.commit())
    }

    pub fn rollback(&self, connection_id: &str) -> GatewayResult<()> {
        self.with_backend(connection_id, |conn| conn.rollback())
    }

    fn with_backend<T>(
        &self,
        connection_id: &str,
        f: impl FnOnce(&dyn BackendConnection) -> crate::backend::BackendResult<T>,
    ) -> GatewayResult<T> {
        let entry = self.store.connections.get(connection_id)?;
        f(entry.backend.as_ref()).map_err(GatewayError::driver)
    }
}
