//! Status reporting
//!
//! [`CardStatusReader`] gathers balances and game state in one session.
//! [`Status`] is the flat, serializable result every operation surface
//! reports: a status code plus whichever counters the operation produced.

use crate::core::card::{CardMemory, ReaderStatus};
use crate::core::error::{CardError, Result};
use crate::core::game::{GameState, Outcome, SequenceCheck, SequenceGameEngine};
use crate::core::ledger::{BalanceKind, BalanceLedger};
use crate::core::provision::ProvisionSummary;
use crate::core::session::CardSession;
use serde::{Deserialize, Serialize};

/// Balances and game state of a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardStatus {
    pub points: i32,
    pub rewards: i32,
    pub game: GameState,
}

impl CardStatus {
    pub fn cursor(&self) -> i32 {
        self.game.cursor()
    }
}

pub struct CardStatusReader;

impl CardStatusReader {
    pub fn check_status<C: CardMemory>(session: &mut CardSession<'_, C>) -> Result<CardStatus> {
        let points = BalanceLedger::points().get(session)?;
        let rewards = BalanceLedger::rewards().get(session)?;
        let game = SequenceGameEngine::state(session)?;

        Ok(CardStatus {
            points,
            rewards,
            game,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Failure,
    InsufficientPoints,
    InsufficientRewards,
    InvalidKeyVersion,
    ErrorWithCard,
}

impl StatusCode {
    pub fn is_ok(&self) -> bool {
        matches!(self, StatusCode::Ok)
    }
}

impl CardError {
    /// Status code reported for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            CardError::InsufficientBalance {
                kind: BalanceKind::Points,
                ..
            } => StatusCode::InsufficientPoints,
            CardError::InsufficientBalance {
                kind: BalanceKind::Rewards,
                ..
            } => StatusCode::InsufficientRewards,
            CardError::InvalidKeyVersion(_) => StatusCode::InvalidKeyVersion,
            CardError::AuthFailed { .. }
            | CardError::ReadFailed { .. }
            | CardError::WriteFailed { .. }
            | CardError::HaltFailed(_) => StatusCode::ErrorWithCard,
            _ => StatusCode::Failure,
        }
    }
}

/// Result of one operation, ready to hand to a caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reader_status: Option<ReaderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewards: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Status {
    pub fn new(code: StatusCode) -> Self {
        Status {
            code,
            reader_status: None,
            points: None,
            rewards: None,
            cursor: None,
            outcome: None,
            message: None,
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::Ok)
    }

    pub fn with_points(mut self, points: i32) -> Self {
        self.points = Some(points);
        self
    }

    pub fn with_rewards(mut self, rewards: i32) -> Self {
        self.rewards = Some(rewards);
        self
    }

    pub fn with_balance(self, kind: BalanceKind, balance: i32) -> Self {
        match kind {
            BalanceKind::Points => self.with_points(balance),
            BalanceKind::Rewards => self.with_rewards(balance),
        }
    }

    pub fn with_cursor(mut self, cursor: i32) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    /// Failure status; an insufficient balance still reports the balance
    pub fn from_error(err: &CardError) -> Self {
        let mut status = Self::new(err.status_code());
        status.reader_status = err.reader_status();
        status.message = Some(err.to_string());

        match err {
            CardError::InsufficientBalance { kind, balance, .. } => {
                status.with_balance(*kind, *balance)
            }
            CardError::GameNotActive => status.with_cursor(-1),
            _ => status,
        }
    }

    /// Build a status from an operation result
    pub fn from_result<T, F>(result: Result<T>, on_ok: F) -> Self
    where
        F: FnOnce(T) -> Status,
    {
        match result {
            Ok(value) => on_ok(value),
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl From<CardStatus> for Status {
    fn from(status: CardStatus) -> Self {
        Status::ok()
            .with_points(status.points)
            .with_rewards(status.rewards)
            .with_cursor(status.cursor())
    }
}

impl From<ProvisionSummary> for Status {
    fn from(summary: ProvisionSummary) -> Self {
        Status::ok()
            .with_points(summary.points)
            .with_rewards(summary.rewards)
            .with_cursor(summary.cursor)
    }
}

impl From<SequenceCheck> for Status {
    fn from(check: SequenceCheck) -> Self {
        let status = Status::ok()
            .with_outcome(check.outcome)
            .with_cursor(check.cursor);
        match check.rewards {
            Some(rewards) => status.with_rewards(rewards),
            None => status,
        }
    }
}
