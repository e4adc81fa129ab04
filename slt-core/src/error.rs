use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid magic bytes - expected SLAT")]
    InvalidMagic,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("CRC mismatch: expected {expected:#x}, got {actual:#x}")]
    CrcMismatch { expected: u32, actual: u32 },

    #[error("Buffer too small: required {required} bytes, available {available}")]
    BufferTooSmall { required: usize, available: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid row data: {0}")]
    InvalidRow(String),

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Type mismatch for column {column}: expected {expected:?}")]
    TypeMismatch {
        column: String,
        expected: crate::DataType,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),
}

pub type Result<T> = std::result::Result<T, SlateError>;
