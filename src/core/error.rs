use crate::core::card::ReaderStatus;
use crate::core::keys::KeyRole;
use crate::core::ledger::BalanceKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CardError {
    #[error("Authentication of sector {sector} with key {role} failed: {status}")]
    AuthFailed {
        sector: u8,
        role: KeyRole,
        status: ReaderStatus,
    },

    #[error("Reading block {block} failed: {status}")]
    ReadFailed { block: u8, status: ReaderStatus },

    #[error("Writing block {block} failed: {status}")]
    WriteFailed { block: u8, status: ReaderStatus },

    #[error("Halting the card failed: {0}")]
    HaltFailed(ReaderStatus),

    #[error("Insufficient {kind}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        kind: BalanceKind,
        balance: i32,
        requested: i32,
    },

    #[error("{kind} balance {balance} cannot absorb {amount} more")]
    BalanceOverflow {
        kind: BalanceKind,
        balance: i32,
        amount: i32,
    },

    #[error("Invalid amount: {0} (must not be negative)")]
    InvalidAmount(i32),

    #[error("No sequence game is active on this card")]
    GameNotActive,

    #[error("Stored sequence cursor {0} is outside the sequence buffer")]
    CorruptGameState(i32),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("Key version {0} has no registered secret key")]
    InvalidKeyVersion(i32),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CardError {
    /// The low-level reader status behind a hardware failure, if any.
    pub fn reader_status(&self) -> Option<ReaderStatus> {
        match self {
            CardError::AuthFailed { status, .. }
            | CardError::ReadFailed { status, .. }
            | CardError::WriteFailed { status, .. } => Some(*status),
            CardError::HaltFailed(status) => Some(*status),
            _ => None,
        }
    }

    /// True for failures that may have left the card partially written.
    pub fn is_card_fault(&self) -> bool {
        self.reader_status().is_some()
    }
}

impl From<toml::de::Error> for CardError {
    fn from(err: toml::de::Error) -> Self {
        CardError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CardError>;
