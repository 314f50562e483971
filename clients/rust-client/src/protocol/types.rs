use serde::{Deserialize, Serialize};

/// SQL type codes reported in `ColumnDescriptor::data_type_code`
/// (the JDBC `java.sql.Types` numbering).
pub mod sql_types {
    pub const BIT: i32 = -7;
    pub const TINYINT: i32 = -6;
    pub const SMALLINT: i32 = 5;
    pub const INTEGER: i32 = 4;
    pub const BIGINT: i32 = -5;
    pub const FLOAT: i32 = 6;
    pub const REAL: i32 = 7;
    pub const DOUBLE: i32 = 8;
    pub const NUMERIC: i32 = 2;
    pub const DECIMAL: i32 = 3;
    pub const CHAR: i32 = 1;
    pub const VARCHAR: i32 = 12;
    pub const LONGVARCHAR: i32 = -1;
    pub const DATE: i32 = 91;
    pub const TIME: i32 = 92;
    pub const TIMESTAMP: i32 = 93;
    pub const BINARY: i32 = -2;
    pub const VARBINARY: i32 = -3;
    pub const LONGVARBINARY: i32 = -4;
    pub const NULL: i32 = 0;
    pub const OTHER: i32 = 1111;
    pub const ARRAY: i32 = 2003;
    pub const BLOB: i32 = 2004;
    pub const CLOB: i32 = 2005;
    pub const BOOLEAN: i32 = 16;
}

/// `ColumnDescriptor::is_nullable` values
pub const COLUMN_NO_NULLS: i32 = 0;
pub const COLUMN_NULLABLE: i32 = 1;
pub const COLUMN_NULLABLE_UNKNOWN: i32 = 2;

/// Shape of one result column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Zero-based position in the row
    pub ordinal: i32,
    pub table_name: String,
    pub schema_name: String,
    pub catalog_name: String,
    pub column_name: String,
    pub column_label: String,
    pub display_size: i32,
    pub precision: i32,
    pub scale: i32,
    pub data_type_name: String,
    pub data_type_class_name: String,
    pub data_type_code: i32,
    pub is_auto_increment: bool,
    pub is_case_sensitive: bool,
    pub is_definitely_writable: bool,
    pub is_searchable: bool,
    pub is_nullable: i32,
    pub is_aliased: bool,
    pub is_writable: bool,
    pub is_currency: bool,
    pub is_read_only: bool,
    pub is_signed: bool,
}

impl ColumnDescriptor {
    /// Minimal descriptor; the remaining attributes keep their defaults
    pub fn new(ordinal: i32, name: &str, data_type_code: i32, data_type_name: &str) -> Self {
        Self {
            ordinal,
            column_name: name.to_string(),
            column_label: name.to_string(),
            data_type_code,
            data_type_name: data_type_name.to_string(),
            is_nullable: COLUMN_NULLABLE_UNKNOWN,
            ..Default::default()
        }
    }
}

/// Declared type of a bound statement parameter. The value itself always
/// travels as text and is parsed on the gateway at bind time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParameterType {
    Int,
    Long,
    Short,
    Float,
    Double,
    String,
    Boolean,
    Time,
    Date,
    Timestamp,
    Decimal,
    Null,
}

/// Transaction isolation levels with their integer wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionIsolation {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl TransactionIsolation {
    pub fn code(self) -> i32 {
        match self {
            TransactionIsolation::None => 0,
            TransactionIsolation::ReadUncommitted => 1,
            TransactionIsolation::ReadCommitted => 2,
            TransactionIsolation::RepeatableRead => 4,
            TransactionIsolation::Serializable => 8,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(TransactionIsolation::None),
            1 => Some(TransactionIsolation::ReadUncommitted),
            2 => Some(TransactionIsolation::ReadCommitted),
            4 => Some(TransactionIsolation::RepeatableRead),
            8 => Some(TransactionIsolation::Serializable),
            _ => None,
        }
    }
}

/// Result of `Command::OpenConnection`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenConnectionResult {
    pub connection_id: String,
    pub catalog: String,
    pub product_name: String,
    pub product_version: String,
    pub major_version: i32,
    pub minor_version: i32,
}

/// Result of `Command::ExecuteStatement`.
///
/// `result_set_id` is present only when the statement produced rows; in that
/// case `records_affected` is -1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_set_id: Option<String>,
    pub records_affected: i64,
    pub has_rows: bool,
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
}

/// Result set opened by a metadata query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSetResult {
    pub result_set_id: String,
    pub has_rows: bool,
    pub columns: Vec<ColumnDescriptor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_isolation_codes_round_trip() {
        for level in [
            TransactionIsolation::None,
            TransactionIsolation::ReadUncommitted,
            TransactionIsolation::ReadCommitted,
            TransactionIsolation::RepeatableRead,
            TransactionIsolation::Serializable,
        ] {
            assert_eq!(TransactionIsolation::from_code(level.code()), Some(level));
        }
        assert_eq!(TransactionIsolation::from_code(3), None);
    }

    #[test]
    fn test_column_descriptor_new() {
        let col = ColumnDescriptor::new(1, "name", sql_types::VARCHAR, "TEXT");
        assert_eq!(col.column_label, "name");
        assert!(!col.is_aliased);
        assert_eq!(col.is_nullable, COLUMN_NULLABLE_UNKNOWN);
    }
}
