//! Error taxonomy shared by every layer of the bank simulator.
//!
//! `BankError` is the client-facing taxonomy of `spec.md` §7: every
//! operation that reaches the database resolves to either a balance or one
//! of these three kinds. The lower layers (`DbError`, `LogError`,
//! `WireError`, `TellerError`) are internal and always converge into a
//! `BankError` before a response reaches a client.

use thiserror::Error;

/// Errors surfaced to clients, carried verbatim in a `ServerResponse`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BankError {
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("no such account")]
    NoAccount,
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl BankError {
    /// Numeric status code as carried on the wire (`spec.md` §4.3 / §6).
    pub fn status_code(&self) -> i32 {
        match self {
            BankError::InsufficientFunds => -1,
            BankError::InvalidOperation(_) => -2,
            BankError::NoAccount => -3,
        }
    }

    pub fn from_status_code(code: i32, message: &str) -> Option<Self> {
        match code {
            -1 => Some(BankError::InsufficientFunds),
            -2 => Some(BankError::InvalidOperation(message.to_string())),
            -3 => Some(BankError::NoAccount),
            _ => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            BankError::InsufficientFunds => "insufficient funds".to_string(),
            BankError::NoAccount => "no such account".to_string(),
            BankError::InvalidOperation(msg) => msg.clone(),
        }
    }
}

/// Errors raised by the in-memory account database (C2).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DbError {
    #[error("no such account")]
    NoAccount,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("amount must be positive")]
    InvalidAmount,
}

impl From<DbError> for BankError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NoAccount => BankError::NoAccount,
            DbError::InsufficientFunds => BankError::InsufficientFunds,
            DbError::InvalidAmount => BankError::InvalidOperation("amount must be positive".into()),
        }
    }
}

/// Errors raised by the write-ahead log store (C1).
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to open log file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to append to log: {0}")]
    Append(#[source] std::io::Error),
    #[error("failed to flush log: {0}")]
    Flush(#[source] std::io::Error),
}

/// Errors raised while encoding/decoding wire records (C3).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    #[error("record too short: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },
    #[error("field {field} exceeds its {limit}-byte bound")]
    FieldTooLong { field: &'static str, limit: usize },
    #[error("invalid utf8 in field {0}")]
    InvalidUtf8(&'static str),
    #[error("unknown operation code {0}")]
    UnknownOpCode(i32),
    #[error("malformed account id {0:?}")]
    MalformedAccountId(String),
}

/// Errors raised by a teller worker's transport to its client (C7).
#[derive(Debug, Error)]
pub enum TellerError {
    #[error("client fifo never opened for reading")]
    ClientFifoTimeout,
    #[error("arbiter did not respond in time")]
    ArbiterTimeout,
    #[error("io error talking to client: {0}")]
    Io(#[source] std::io::Error),
    #[error("arbiter channel closed")]
    ArbiterChannelClosed,
}

/// A teller's own transport failures never reach the client as a distinct
/// wire type; `spec.md` §4.7 still requires *some* response, so they fold
/// into the generic `InvalidOperation` kind, carrying their message along.
impl From<TellerError> for BankError {
    fn from(err: TellerError) -> Self {
        BankError::InvalidOperation(err.to_string())
    }
}
