use crate::types::DataType;

pub type MergeResult<T> = Result<T, MergeError>;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum MergeError {
    #[error("table {table} has {actual} columns, expected {expected}")]
    ColumnCountMismatch {
        table: usize,
        expected: usize,
        actual: usize,
    },

    #[error("table {table} column {column} has type {actual:?}, expected {expected:?}")]
    ColumnTypeMismatch {
        table: usize,
        column: usize,
        expected: DataType,
        actual: DataType,
    },

    #[error("at least one key column is required")]
    EmptyKeyColumns,

    #[error("{keys} key columns requested but tables only have {columns} columns")]
    TooManyKeyColumns { keys: usize, columns: usize },

    #[error("key column {key} is out of range for tables with {columns} columns")]
    KeyColumnOutOfRange { key: usize, columns: usize },

    #[error("{orders} column orders given for {keys} key columns")]
    ColumnOrderLengthMismatch { keys: usize, orders: usize },

    #[error("{orders} null orders given for {keys} key columns")]
    NullOrderLengthMismatch { keys: usize, orders: usize },

    #[error("column {column} has type {data_type:?}, which cannot be merged")]
    UnsupportedColumnType { column: usize, data_type: DataType },

    #[error("dictionary column {column} does not share its keys between the merged tables")]
    DictionaryKeysMismatch { column: usize },

    #[error("table {table} is not sorted by the merge keys")]
    UnsortedInput { table: usize },

    #[error("memory pool {pool} cannot grow by {requested} bytes ({available} available)")]
    MemoryLimitExceeded {
        pool: String,
        requested: usize,
        available: usize,
    },

    #[error("allocation of {bytes} bytes failed")]
    AllocationFailed { bytes: usize },

    #[error("validity merge requested but neither side carries a validity mask")]
    MissingValidity,

    #[error("column data type {actual:?} does not match declared type {expected:?}")]
    DataTypeMismatch { expected: DataType, actual: DataType },

    #[error("column buffers do not match the encoding of {data_type:?}")]
    EncodingMismatch { data_type: DataType },

    #[error("dictionary index {index} at row {row} is out of range for {keys} keys")]
    DictionaryIndexOutOfRange { row: usize, index: u32, keys: usize },

    #[error("row {row} is out of range for a column of {len} rows")]
    RowOutOfRange { row: usize, len: usize },

    #[error("length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("offsets are not monotonically increasing or exceed the value buffer")]
    InvalidOffsets,
}
