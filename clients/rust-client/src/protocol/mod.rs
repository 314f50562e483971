//! Wire protocol shared by the gateway and its clients.

mod bignum;
mod codec;
mod command;
mod error;
mod response;
mod types;
mod value;

pub use bignum::{BigDecimal, BigInteger};
pub use codec::{
    decode_message, encode_command, encode_message, encode_response, BRIDGE_MAGIC,
    MAX_MESSAGE_SIZE,
};
pub use command::Command;
pub use error::BridgeError;
pub use response::Response;
pub use types::{
    sql_types, ColumnDescriptor, ExecuteResult, OpenConnectionResult, ParameterType,
    ResultSetResult, TransactionIsolation, COLUMN_NO_NULLS, COLUMN_NULLABLE,
    COLUMN_NULLABLE_UNKNOWN,
};
pub use value::{
    date_to_millis, datetime_to_millis, decode_row, decode_value, time_to_millis, ItemType,
    RowIter, SqlValue,
};
