//! Error types for KiteDB core.
//!
//! Every error kind carries a small integer code that crosses the
//! foreign boundary unchanged; see [`Error::code`].

use thiserror::Error;

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error code for code `-1`: an operation was invoked on a handle that
/// does not denote a live engine.
pub const ERR_CODE_NOT_INITIALIZED: i32 = -1;

/// Errors that can occur in KiteDB operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Engine handle was zero or unknown.
    #[error("KiteDB engine has not been initialized")]
    NotInitialized,

    /// SQL text could not be parsed.
    #[error("{0}")]
    ParseSql(String),

    /// Query execution failed.
    #[error("{0}")]
    QueryExec(String),

    /// Invalid parameters supplied to an operation.
    #[error("{0}")]
    Params(String),

    /// Internal consistency violation or caller protocol breach.
    #[error("{0}")]
    Logic(String),

    /// JSON payload or definition could not be parsed.
    #[error("{0}")]
    ParseJson(String),

    /// Binary payload could not be parsed.
    #[error("{0}")]
    ParseBin(String),

    /// Conflicting write (e.g. insert over an existing item).
    #[error("{0}")]
    Conflict(String),

    /// Transport failure talking to a remote engine.
    #[error("{0}")]
    Network(String),

    /// Named entity does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Caller encoded a CJSON payload against a stale tags matcher.
    #[error("state token mismatch: {token:08X}, need {expected:08X}. Can't process item")]
    StateInvalidated {
        /// Token the caller assumed.
        token: i32,
        /// Token the engine currently holds.
        expected: i32,
    },

    /// Transaction handle is invalid or already terminated.
    #[error("{0}")]
    BadTransaction(String),

    /// The master's WAL no longer covers the requested LSN range.
    #[error("{0}")]
    OutdatedWal(String),

    /// The master namespace has no WAL at all.
    #[error("{0}")]
    NoWal(String),

    /// Slave content digest diverged from the master's.
    #[error("dataHash mismatch with master {master} != {slave}")]
    DataHashMismatch {
        /// Digest reported by the master.
        master: u64,
        /// Digest computed on the slave.
        slave: u64,
    },
}

impl Error {
    /// Creates a logic error.
    pub fn logic(message: impl Into<String>) -> Self {
        Self::Logic(message.into())
    }

    /// Creates a params error.
    pub fn params(message: impl Into<String>) -> Self {
        Self::Params(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse-SQL error.
    pub fn parse_sql(message: impl Into<String>) -> Self {
        Self::ParseSql(message.into())
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Creates an outdated-WAL error.
    pub fn outdated_wal(message: impl Into<String>) -> Self {
        Self::OutdatedWal(message.into())
    }

    /// Creates a no-WAL error.
    pub fn no_wal(message: impl Into<String>) -> Self {
        Self::NoWal(message.into())
    }

    /// Creates a bad-transaction error.
    pub fn bad_transaction(message: impl Into<String>) -> Self {
        Self::BadTransaction(message.into())
    }

    /// The integer code carried across the foreign boundary.
    pub fn code(&self) -> i32 {
        match self {
            Self::NotInitialized => ERR_CODE_NOT_INITIALIZED,
            Self::ParseSql(_) => 1,
            Self::QueryExec(_) => 2,
            Self::Params(_) => 3,
            Self::Logic(_) => 4,
            Self::ParseJson(_) => 5,
            Self::ParseBin(_) => 8,
            Self::Conflict(_) => 7,
            Self::Network(_) => 12,
            Self::NotFound(_) => 13,
            Self::StateInvalidated { .. } => 14,
            Self::BadTransaction(_) => 15,
            Self::OutdatedWal(_) => 16,
            Self::NoWal(_) => 17,
            Self::DataHashMismatch { .. } => 18,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::ParseJson(err.to_string())
    }
}

impl From<kitedb_codec::CodecError> for Error {
    fn from(err: kitedb_codec::CodecError) -> Self {
        Self::ParseBin(err.to_string())
    }
}
