use std::collections::HashMap;

use super::BridgeClient;
use crate::protocol::{BridgeError, Command, OpenConnectionResult, Response, TransactionIsolation};

impl BridgeClient {
    pub async fn open_connection(
        &mut self,
        url: &str,
        properties: HashMap<String, String>,
    ) -> Result<OpenConnectionResult, BridgeError> {
        let response = self
            .send_command(Command::OpenConnection {
                url: url.to_string(),
                properties,
            })
            .await?;
        match response {
            Response::Connection(result) => Ok(result),
            other => Err(Self::unexpected(other, "connection")),
        }
    }

    pub async fn close_connection(&mut self, connection_id: &str) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::CloseConnection {
            connection_id: connection_id.to_string(),
        })
        .await
    }

    pub async fn change_catalog(
        &mut self,
        connection_id: &str,
        catalog: &str,
    ) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::ChangeCatalog {
            connection_id: connection_id.to_string(),
            catalog: catalog.to_string(),
        })
        .await
    }

    pub async fn set_auto_commit(
        &mut self,
        connection_id: &str,
        auto_commit: bool,
    ) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::SetAutoCommit {
            connection_id: connection_id.to_string(),
            auto_commit,
        })
        .await
    }

    pub async fn get_transaction_isolation(
        &mut self,
        connection_id: &str,
    ) -> Result<TransactionIsolation, BridgeError> {
        let response = self
            .send_command(Command::GetTransactionIsolation {
                connection_id: connection_id.to_string(),
            })
            .await?;
        match response {
            Response::Isolation { level } => TransactionIsolation::from_code(level).ok_or_else(
                || BridgeError::ProtocolError(format!("Unknown isolation code {}", level)),
            ),
            other => Err(Self::unexpected(other, "isolation")),
        }
    }

    pub async fn set_transaction_isolation(
        &mut self,
        connection_id: &str,
        isolation: TransactionIsolation,
    ) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::SetTransactionIsolation {
            connection_id: connection_id.to_string(),
            isolation: isolation.code(),
        })
        .await
    }

    pub async fn commit(&mut self, connection_id: &str) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::Commit {
            connection_id: connection_id.to_string(),
        })
        .await
    }

    pub async fn rollback(&mut self, connection_id: &str) -> Result<(), BridgeError> {
        self.send_expect_ok(Command::Rollback {
            connection_id: connection_id.to_string(),
        })
        .await
    }
}
