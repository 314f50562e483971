use super::BridgeClient;
use crate::protocol::{BridgeError, Command, Response, ResultSetResult};

impl BridgeClient {
    async fn send_expect_result_set(
        &mut self,
        command: Command,
    ) -> Result<ResultSetResult, BridgeError> {
        match self.send_command(command).await? {
            Response::ResultSet(result) => Ok(result),
            other => Err(Self::unexpected(other, "result_set")),
        }
    }

    /// Empty strings and an empty `types` slice mean "no filter"
    pub async fn get_tables(
        &mut self,
        connection_id: &str,
        catalog: &str,
        schema_pattern: &str,
        table_name_pattern: &str,
        types: &[&str],
    ) -> Result<ResultSetResult, BridgeError> {
        self.send_expect_result_set(Command::GetTables {
            connection_id: connection_id.to_string(),
            catalog: catalog.to_string(),
            schema_pattern: schema_pattern.to_string(),
            table_name_pattern: table_name_pattern.to_string(),
            types: types.iter().map(|t| t.to_string()).collect(),
        })
        .await
    }

    pub async fn get_catalogs(
        &mut self,
        connection_id: &str,
    ) -> Result<ResultSetResult, BridgeError> {
        self.send_expect_result_set(Command::GetCatalogs {
            connection_id: connection_id.to_string(),
        })
        .await
    }

    pub async fn get_procedures(
        &mut self,
        connection_id: &str,
        catalog: &str,
        schema_pattern: &str,
        procedure_name_pattern: &str,
    ) -> Result<ResultSetResult, BridgeError> {
        self.send_expect_result_set(Command::GetProcedures {
            connection_id: connection_id.to_string(),
            catalog: catalog.to_string(),
            schema_pattern: schema_pattern.to_string(),
            procedure_name_pattern: procedure_name_pattern.to_string(),
        })
        .await
    }

    pub async fn get_functions(
        &mut self,
        connection_id: &str,
        catalog: &str,
        schema_pattern: &str,
        function_name_pattern: &str,
    ) -> Result<ResultSetResult, BridgeError> {
        self.send_expect_result_set(Command::GetFunctions {
            connection_id: connection_id.to_string(),
            catalog: catalog.to_string(),
            schema_pattern: schema_pattern.to_string(),
            function_name_pattern: function_name_pattern.to_string(),
        })
        .await
    }

    pub async fn is_read_only(&mut self, connection_id: &str) -> Result<bool, BridgeError> {
        self.send_expect_flag(Command::IsReadOnly {
            connection_id: connection_id.to_string(),
        })
        .await
    }

    pub async fn supports_group_by(&mut self, connection_id: &str) -> Result<bool, BridgeError> {
        self.send_expect_flag(Command::SupportsGroupBy {
            connection_id: connection_id.to_string(),
        })
        .await
    }
}
