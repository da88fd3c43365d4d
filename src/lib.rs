pub mod accessor;
pub mod config;
pub mod error;
pub mod query;
pub mod session;
pub mod store;
pub mod types;

pub use accessor::{InputData, ReadAccessor, ReadOutcome, StoreAccessor, WriteAccessor};
pub use session::ConnectionManager;
pub use types::{ColumnDescriptor, Row, Value};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreBridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Fatal error: {0}")]
    Fatal(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid accessor state: {0}")]
    InvalidState(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreBridgeError>;

/// Error classes surfaced to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or invalid user configuration; never worth retrying
    Configuration,
    /// Connection or cache acquisition failure; the shared connection is left retryable
    Fatal,
    /// The host drove the accessor out of order
    Lifecycle,
}

impl StoreBridgeError {
    /// Get the error class for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreBridgeError::Configuration(_) => ErrorKind::Configuration,
            StoreBridgeError::Fatal(_) => ErrorKind::Fatal,
            StoreBridgeError::Sqlite(_) => ErrorKind::Fatal,
            StoreBridgeError::InvalidState(_) => ErrorKind::Lifecycle,
            StoreBridgeError::Io(_) => ErrorKind::Fatal,
        }
    }

    pub fn is_configuration(&self) -> bool {
        self.kind() == ErrorKind::Configuration
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }
}
