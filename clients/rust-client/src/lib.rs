//! sqlbridge Rust client
//!
//! Wire protocol definitions and an async TCP client for the sqlbridge SQL
//! gateway.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::HashMap;
//! use sqlbridge_client::BridgeClientBuilder;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sqlbridge_client::BridgeError> {
//!     let mut client = BridgeClientBuilder::new("127.0.0.1:7788").build().await?;
//!
//!     let conn = client.open_connection("sqlite::memory:", HashMap::new()).await?;
//!     let stmt = client.create_statement(&conn.connection_id, "SELECT 1 AS one").await?;
//!     let result = client.execute(&stmt).await?;
//!
//!     if let Some(id) = result.result_set_id {
//!         let mut reader = client.reader(&id, result.columns);
//!         while let Some(row) = reader.next_row().await? {
//!             println!("{:?}", row);
//!         }
//!         reader.close().await?;
//!     }
//!     client.close_connection(&conn.connection_id).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod protocol;

pub use client::{BridgeClient, BridgeClientBuilder, ResultReader};
pub use protocol::{
    BigDecimal, BigInteger, BridgeError, ColumnDescriptor, Command, ParameterType, Response,
    SqlValue, TransactionIsolation,
};
