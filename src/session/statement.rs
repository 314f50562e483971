use std::sync::Arc;

use sqlbridge_client::protocol::{ExecuteResult, ParameterType};

use super::SessionStore;
use crate::backend::{BoundValue, ExecuteOutcome};
use crate::error::{GatewayError, GatewayResult};
use crate::stream::ResultSetOwner;

/// Fetch size hint asking for the statement's row limit
pub const FETCH_SIZE_MAX_ROWS: i32 = -1;

pub struct StatementManager {
    store: Arc<SessionStore>,
}

impl StatementManager {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn create(&self, connection_id: &str, sql: &str) -> GatewayResult<String> {
        let connection = self.store.connections.get(connection_id)?;
        let statement = connection
            .backend
            .prepare(sql)
            .map_err(GatewayError::execution)?;

        let statement_id = self
            .store
            .register_statement(&connection, connection_id, statement)?;
        tracing::debug!(
            "Prepared statement {} on connection {}",
            statement_id,
            connection_id
        );
        Ok(statement_id)
    }

    pub fn set_parameter(
        &self,
        statement_id: &str,
        index: i32,
        param_type: ParameterType,
        value: &str,
    ) -> GatewayResult<()> {
        let entry = self.store.statements.get(statement_id)?;
        let mut state = entry.state.lock();

        let count = state.statement.parameter_count();
        if index < 1 || index as usize > count {
            return Err(GatewayError::ProtocolError(format!(
                "parameter index {} out of range 1..={}",
                index, count
            )));
        }
        let bound = BoundValue::parse(param_type, value).map_err(GatewayError::ProtocolError)?;
        state
            .statement
            .bind(index as usize, bound)
            .map_err(GatewayError::execution)
    }

    pub fn execute(&self, statement_id: &str, fetch_size: i32) -> GatewayResult<ExecuteResult> {
        if fetch_size < FETCH_SIZE_MAX_ROWS {
            return Err(GatewayError::ProtocolError(format!(
                "invalid fetch size {}",
                fetch_size
            )));
        }

        let entry = self.store.statements.get(statement_id)?;
        let mut state = entry.state.lock();

        if let Some(previous) = state.result_set.take() {
            // superseded by this execution
            let _ = self.store.release_result_set(&previous);
        }

        match fetch_size {
            FETCH_SIZE_MAX_ROWS => {
                let max_rows = state.statement.max_rows();
                state.statement.set_fetch_size(max_rows);
            }
            0 => {}
            n => state.statement.set_fetch_size(n as usize),
        }

        entry.token().reset();
        let outcome = state
            .statement
            .execute(entry.token())
            .map_err(GatewayError::execution)?;

        match outcome {
            ExecuteOutcome::UpdateCount(count) => {
                tracing::debug!("Statement {} affected {} rows", statement_id, count);
                Ok(ExecuteResult {
                    result_set_id: None,
                    records_affected: count,
                    has_rows: false,
                    columns: Vec::new(),
                })
            }
            ExecuteOutcome::Rows(cursor) => {
                let opened = self
                    .store
                    .open_result_set(ResultSetOwner::Statement(statement_id.to_string()), cursor)?;
                state.result_set = Some(opened.result_set_id.clone());
                tracing::debug!(
                    "Statement {} opened result set {} ({} columns, fetch size {})",
                    statement_id,
                    opened.result_set_id,
                    opened.columns.len(),
                    state.statement.fetch_size()
                );
                Ok(ExecuteResult {
                    result_set_id: Some(opened.result_set_id),
                    records_affected: -1,
                    has_rows: opened.has_rows,
                    columns: opened.columns,
                })
            }
        }
    }

    /// Flag the statement for cancellation. Takes effect at the backend's
    /// next checkpoint; a statement that is not running is unaffected.
    pub fn cancel(&self, statement_id: &str) -> GatewayResult<()> {
        let entry = self.store.statements.get(statement_id)?;
        entry.token().cancel();
        tracing::info!("Cancel requested for statement {}", statement_id);
        Ok(())
    }

    pub fn close(&self, statement_id: &str) -> GatewayResult<()> {
        self.store.close_statement(statement_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::BackendRegistry;
    use crate::session::ConnectionManager;
    use std::collections::HashMap;

    fn setup() -> (Arc<SessionStore>, StatementManager, String) {
        let store = Arc::new(SessionStore::new());
        let connections = ConnectionManager::new(store.clone(), BackendRegistry::with_defaults());
        let connection_id = connections
            .open("sqlite::memory:", &HashMap::new())
            .unwrap()
            .connection_id;
        (store.clone(), StatementManager::new(store), connection_id)
    }

    fn run(manager: &StatementManager, connection_id: &str, sql: &str) -> ExecuteResult {
        let id = manager.create(connection_id, sql).unwrap();
        manager.execute(&id, 0).unwrap()
    }

    #[test]
    fn test_update_count() {
        let (_, manager, conn) = setup();
        let created = run(&manager, &conn, "CREATE TABLE t (id INTEGER, name TEXT)");
        assert_eq!(created.result_set_id, None);
        assert_eq!(created.records_affected, 0);

        let inserted = run(&manager, &conn, "INSERT INTO t VALUES (1, 'a'), (2, 'b')");
        assert_eq!(inserted.result_set_id, None);
        assert_eq!(inserted.records_affected, 2);
        assert!(!inserted.has_rows);
    }

    #[test]
    fn test_query_opens_result_set() {
        let (store, manager, conn) = setup();
        run(&manager, &conn, "CREATE TABLE t (id INTEGER)");
        let id = manager.create(&conn, "SELECT id FROM t").unwrap();

        let empty = manager.execute(&id, 10).unwrap();
        assert_eq!(empty.records_affected, -1);
        assert!(!empty.has_rows);
        assert_eq!(empty.columns.len(), 1);
        assert_eq!(empty.columns[0].column_name, "id");
        assert!(store.result_sets.contains(empty.result_set_id.as_deref().unwrap()));
    }

    #[test]
    fn test_syntax_error_is_execution_error() {
        let (_, manager, conn) = setup();
        assert!(matches!(
            manager.create(&conn, "SELEKT 1"),
            Err(GatewayError::ExecutionError(_))
        ));
    }

    #[test]
    fn test_parameter_validation() {
        let (_, manager, conn) = setup();
        let id = manager.create(&conn, "SELECT ? + ?").unwrap();

        for index in [0, 3, -1] {
            assert!(matches!(
                manager.set_parameter(&id, index, ParameterType::Int, "1"),
                Err(GatewayError::ProtocolError(_))
            ));
        }
        assert!(matches!(
            manager.set_parameter(&id, 1, ParameterType::Int, "one"),
            Err(GatewayError::ProtocolError(_))
        ));
        manager.set_parameter(&id, 1, ParameterType::Int, "1").unwrap();
        manager.set_parameter(&id, 2, ParameterType::Long, "41").unwrap();
        assert!(manager.execute(&id, 0).unwrap().has_rows);
    }

    #[test]
    fn test_fetch_size_hints() {
        let (_, manager, conn) = setup();
        let id = manager.create(&conn, "SELECT 1").unwrap();
        manager.execute(&id, 0).unwrap();
        manager.execute(&id, 50).unwrap();
        manager.execute(&id, FETCH_SIZE_MAX_ROWS).unwrap();
        assert!(matches!(
            manager.execute(&id, -2),
            Err(GatewayError::ProtocolError(_))
        ));
    }

    #[test]
    fn test_execute_supersedes_previous_result_set() {
        let (store, manager, conn) = setup();
        let id = manager.create(&conn, "SELECT 1").unwrap();
        let first = manager.execute(&id, 0).unwrap().result_set_id.unwrap();
        let second = manager.execute(&id, 0).unwrap().result_set_id.unwrap();

        assert_ne!(first, second);
        assert!(!store.result_sets.contains(&first));
        assert!(store.result_sets.contains(&second));
    }

    #[test]
    fn test_close_releases_result_set_and_unlinks() {
        let (store, manager, conn) = setup();
        let id = manager.create(&conn, "SELECT 1").unwrap();
        let result_set = manager.execute(&id, 0).unwrap().result_set_id.unwrap();

        manager.close(&id).unwrap();
        assert!(!store.result_sets.contains(&result_set));
        assert!(store.connections.get(&conn).unwrap().statement_ids().is_empty());
        assert!(matches!(
            manager.execute(&id, 0),
            Err(GatewayError::HandleNotFound { .. })
        ));
        assert!(matches!(
            manager.close(&id),
            Err(GatewayError::HandleNotFound { .. })
        ));
    }

    #[test]
    fn test_fetch_size_reaches_backend() {
        let (store, manager, conn) = setup();
        let id = manager.create(&conn, "SELECT 1").unwrap();
        manager.execute(&id, 25).unwrap();
        let entry = store.statements.get(&id).unwrap();
        assert_eq!(entry.state.lock().statement.fetch_size(), 25);
    }

    #[test]
    fn test_statement_on_closed_connection_is_dropped() {
        let (store, _, conn) = setup();
        let connection = store.connections.get(&conn).unwrap();
        let statement = connection.backend.prepare("SELECT 1").unwrap();
        store.close_connection(&conn).unwrap();

        assert!(matches!(
            store.register_statement(&connection, &conn, statement),
            Err(GatewayError::HandleNotFound { .. })
        ));
        assert!(store.statements.is_empty());
    }

    #[test]
    fn test_cancel_before_execute_is_cleared() {
        let (_, manager, conn) = setup();
        let id = manager.create(&conn, "SELECT 1").unwrap();
        manager.cancel(&id).unwrap();
        assert!(manager.execute(&id, 0).unwrap().has_rows);
    }

    #[test]
    fn test_unknown_statement() {
        let (_, manager, _) = setup();
        assert!(matches!(
            manager.cancel("missing"),
            Err(GatewayError::HandleNotFound { .. })
        ));
        assert!(matches!(
            manager.set_parameter("missing", 1, ParameterType::Int, "1"),
            Err(GatewayError::HandleNotFound { .. })
        ));
    }
}
