use super::BridgeClient;
use crate::protocol::{BridgeError, Command, ExecuteResult, ParameterType, Response};

impl BridgeClient {
    pub async fn create_statement(
        &mut self,
        connection_id: &str,
        sql: &str,
    ) -> Result<String, BridgeError> {
        let response = self
            .send_command(Command::CreateStatement {
                connection_id: connection_id.to_string(),
                sql: sql.to_string(),
            })
            .await?;
        match response {
            Response::Statement { statement_id } => Ok(statement_id),
            other => Err(Self::unexpected(other, "statement")),
        }
    }

    /// Bind a 1-based parameter; the value is parsed on the gateway per `param_type`
    pub async fn set_parameter(
        &mut self,
        statement_id: &str,
        index: i32,
        param_type: ParameterType,
        value: &str,
    ) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::SetParameter {
            statement_id: statement_id.to_string(),
            index,
            param_type,
            value: value.to_string(),
        })
        .await
    }

    /// Execute with the client's configured fetch size
    pub async fn execute(&mut self, statement_id: &str) -> Result<ExecuteResult, BridgeError> {
        let fetch_size = self.fetch_size;
        self.execute_with_fetch_size(statement_id, fetch_size).await
    }

    pub async fn execute_with_fetch_size(
        &mut self,
        statement_id: &str,
        fetch_size: i32,
    ) -> Result<ExecuteResult, BridgeError> {
        let response = self
            .send_command(Command::ExecuteStatement {
                statement_id: statement_id.to_string(),
                fetch_size,
            })
            .await?;
        match response {
            Response::Executed(result) => Ok(result),
            other => Err(Self::unexpected(other, "executed")),
        }
    }

    pub async fn cancel_statement(&mut self, statement_id: &str) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::CancelStatement {
            statement_id: statement_id.to_string(),
        })
        .await
    }

    pub async fn close_statement(&mut self, statement_id: &str) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::CloseStatement {
            statement_id: statement_id.to_string(),
        })
        .await
    }

    /// Run `sql` and return its update count. Fails if the statement produced rows.
    pub async fn execute_update(
        &mut self,
        connection_id: &str,
        sql: &str,
    ) -> Result<i64, BridgeError> {
        let statement_id = self.create_statement(connection_id, sql).await?;
        let result = self.execute(&statement_id).await;
        self.close_statement(&statement_id).await?;
        let result = result?;
        if result.result_set_id.is_some() {
            return Err(BridgeError::ProtocolError(
                "Statement returned rows, expected an update count".to_string(),
            ));
        }
        Ok(result.records_affected)
    }
}
