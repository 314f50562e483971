use super::types::ParameterType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    Ping,

    // Connections
    OpenConnection {
        url: String,
        #[serde(default)]
        properties: HashMap<String, String>,
    },
    CloseConnection {
        connection_id: String,
    },
    ChangeCatalog {
        connection_id: String,
        catalog: String,
    },
    SetAutoCommit {
        connection_id: String,
        auto_commit: bool,
    },
    GetTransactionIsolation {
        connection_id: String,
    },
    SetTransactionIsolation {
        connection_id: String,
        isolation: i32,
    },
    Commit {
        connection_id: String,
    },
    Rollback {
        connection_id: String,
    },

    // Statements
    CreateStatement {
        connection_id: String,
        sql: String,
    },
    SetParameter {
        statement_id: String,
        index: i32,
        #[serde(rename = "type")]
        param_type: ParameterType,
        value: String,
    },
    ExecuteStatement {
        statement_id: String,
        #[serde(default)]
        fetch_size: i32,
    },
    CancelStatement {
        statement_id: String,
    },
    CloseStatement {
        statement_id: String,
    },

    // Result sets
    ReadResultSet {
        result_set_id: String,
        chunk_size: i32,
    },
    CloseResultSet {
        result_set_id: String,
    },

    // Metadata
    GetTables {
        connection_id: String,
        #[serde(default)]
        catalog: String,
        #[serde(default)]
        schema_pattern: String,
        #[serde(default)]
        table_name_pattern: String,
        #[serde(default)]
        types: Vec<String>,
    },
    GetCatalogs {
        connection_id: String,
    },
    GetProcedures {
        connection_id: String,
        #[serde(default)]
        catalog: String,
        #[serde(default)]
        schema_pattern: String,
        #[serde(default)]
        procedure_name_pattern: String,
    },
    GetFunctions {
        connection_id: String,
        #[serde(default)]
        catalog: String,
        #[serde(default)]
        schema_pattern: String,
        #[serde(default)]
        function_name_pattern: String,
    },
    IsReadOnly {
        connection_id: String,
    },
    SupportsGroupBy {
        connection_id: String,
    },
}

impl Command {
    /// Name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Ping => "ping",
            Command::OpenConnection { .. } => "open_connection",
            Command::CloseConnection { .. } => "close_connection",
            Command::ChangeCatalog { .. } => "change_catalog",
            Command::SetAutoCommit { .. } => "set_auto_commit",
            Command::GetTransactionIsolation { .. } => "get_transaction_isolation",
            Command::SetTransactionIsolation { .. } => "set_transaction_isolation",
            Command::Commit { .. } => "commit",
            Command::Rollback { .. } => "rollback",
            Command::CreateStatement { .. } => "create_statement",
            Command::SetParameter { .. } => "set_parameter",
            Command::ExecuteStatement { .. } => "execute_statement",
            Command::CancelStatement { .. } => "cancel_statement",
            Command::CloseStatement { .. } => "close_statement",
            Command::ReadResultSet { .. } => "read_result_set",
            Command::CloseResultSet { .. } => "close_result_set",
            Command::GetTables { .. } => "get_tables",
            Command::GetCatalogs { .. } => "get_catalogs",
            Command::GetProcedures { .. } => "get_procedures",
            Command::GetFunctions { .. } => "get_functions",
            Command::IsReadOnly { .. } => "is_read_only",
            Command::SupportsGroupBy { .. } => "supports_group_by",
        }
    }
}
