use std::sync::Arc;

use sqlbridge_client::protocol::ResultSetResult;

use super::SessionStore;
use crate::backend::{BackendConnection, BackendCursor, BackendResult, MetadataFilter};
use crate::error::{GatewayError, GatewayResult};
use crate::stream::ResultSetOwner;

/// Empty filters mean "no filter"
fn filter_value(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Catalog introspection. Every listing is returned as a regular result set
/// owned by the connection.
pub struct MetadataService {
    store: Arc<SessionStore>,
}

impl MetadataService {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn get_tables(
        &self,
        connection_id: &str,
        catalog: &str,
        schema_pattern: &str,
        table_name_pattern: &str,
        types: &[String],
    ) -> GatewayResult<ResultSetResult> {
        let filter = MetadataFilter {
            catalog: filter_value(catalog),
            schema_pattern: filter_value(schema_pattern),
            name_pattern: filter_value(table_name_pattern),
            types: if types.is_empty() {
                None
            } else {
                Some(types.to_vec())
            },
        };
        self.open_listing(connection_id, |conn| conn.tables(&filter))
    }

    pub fn get_catalogs(&self, connection_id: &str) -> GatewayResult<ResultSetResult> {
        self.open_listing(connection_id, |conn| conn.catalogs())
    }

    pub fn get_procedures(
        &self,
        connection_id: &str,
        catalog: &str,
        schema_pattern: &str,
        procedure_name_pattern: &str,
    ) -> GatewayResult<ResultSetResult> {
        let filter = MetadataFilter {
            catalog: filter_value(catalog),
            schema_pattern: filter_value(schema_pattern),
            name_pattern: filter_value(procedure_name_pattern),
            types: None,
        };
        self.open_listing(connection_id, |conn| conn.procedures(&filter))
    }

    pub fn get_functions(
        &self,
        connection_id: &str,
        catalog: &str,
        schema_pattern: &str,
        function_name_pattern: &str,
    ) -> GatewayResult<ResultSetResult> {
        let filter = MetadataFilter {
            catalog: filter_value(catalog),
            schema_pattern: filter_value(schema_pattern),
            name_pattern: filter_value(function_name_pattern),
            types: None,
        };
        self.open_listing(connection_id, |conn| conn.functions(&filter))
    }

    pub fn is_read_only(&self, connection_id: &str) -> GatewayResult<bool> {
        let entry = self.store.connections.get(connection_id)?;
        entry.backend.is_read_only().map_err(GatewayError::driver)
    }

    pub fn supports_group_by(&self, connection_id: &str) -> GatewayResult<bool> {
        let entry = self.store.connections.get(connection_id)?;
        entry.backend.supports_group_by().map_err(GatewayError::driver)
    }

    fn open_listing(
        &self,
        connection_id: &str,
        list: impl FnOnce(&dyn BackendConnection) -> BackendResult<Box<dyn BackendCursor>>,
    ) -> GatewayResult<ResultSetResult> {
        let entry = self.store.connections.get(connection_id)?;
        let cursor = list(entry.backend.as_ref()).map_err(GatewayError::driver)?;
        let opened = self
            .store
            .open_result_set(ResultSetOwner::Connection(connection_id.to_string()), cursor)?;
        Ok(ResultSetResult {
            result_set_id: opened.result_set_id,
            has_rows: opened.has_rows,
            columns: opened.columns,
        })
    }
}
