//! Sequence game
//!
//! The card stores an expected byte sequence (zero-terminated, 16 bytes),
//! a cursor and a reward. A reader proves it knows the sequence one byte at a
//! time; the first wrong byte ends the game, reaching the terminator wins it
//! and credits the reward to the rewards balance.
//!
//! ```text
//! Inactive (cursor -1) --init--> Active(0)
//! Active(i) --correct, seq[i+1] != 0--> Active(i+1)
//! Active(i) --correct, seq[i+1] == 0--> Inactive, reward credited
//! Active(i) --wrong--> Inactive
//! ```

use crate::core::audit::CardEvent;
use crate::core::card::{Block, CardMemory, BLOCK_SIZE};
use crate::core::error::{CardError, Result};
use crate::core::keys::Credential;
use crate::core::layout::{SEQ_CURSOR_BLOCK, SEQ_DATA_BLOCK, SEQ_GAME_SECTOR, SEQ_REWARD_BLOCK};
use crate::core::ledger::BalanceLedger;
use crate::core::session::CardSession;
use crate::core::value::ValueCounterStore;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Cursor value of a card with no active game
pub const INACTIVE_CURSOR: i32 = -1;

/// Longest sequence that still leaves room for the terminator
pub const MAX_SEQUENCE_LEN: usize = BLOCK_SIZE - 1;

pub type Sequence = [u8; BLOCK_SIZE];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "cursor", rename_all = "snake_case")]
pub enum GameState {
    Inactive,
    Active(u8),
}

impl GameState {
    /// Interpret a stored cursor value
    pub fn from_cursor(cursor: i32) -> Result<Self> {
        match cursor {
            INACTIVE_CURSOR => Ok(GameState::Inactive),
            0..=15 => Ok(GameState::Active(cursor as u8)),
            _ => Err(CardError::CorruptGameState(cursor)),
        }
    }

    pub fn cursor(&self) -> i32 {
        match self {
            GameState::Inactive => INACTIVE_CURSOR,
            GameState::Active(cursor) => *cursor as i32,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, GameState::Active(_))
    }
}

/// Result of checking one byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "reward", rename_all = "snake_case")]
pub enum Outcome {
    Correct,
    CorrectAndWon(i32),
    Wrong,
}

/// A checked byte together with the counters it left on the card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCheck {
    pub outcome: Outcome,
    pub cursor: i32,
    /// Rewards balance after a win
    pub rewards: Option<i32>,
}

/// Build a terminated sequence buffer from 1..=15 non-zero bytes
pub fn pad_sequence(bytes: &[u8]) -> Result<Sequence> {
    if bytes.is_empty() || bytes.len() > MAX_SEQUENCE_LEN {
        return Err(CardError::InvalidSequence(format!(
            "length {} is outside 1..={}",
            bytes.len(),
            MAX_SEQUENCE_LEN
        )));
    }
    if let Some(pos) = bytes.iter().position(|b| *b == 0) {
        return Err(CardError::InvalidSequence(format!(
            "byte {} is the 0x00 terminator",
            pos
        )));
    }

    let mut sequence = [0u8; BLOCK_SIZE];
    sequence[..bytes.len()].copy_from_slice(bytes);
    Ok(sequence)
}

/// A sequence must start with a real byte and end before the buffer does
fn validate_sequence(sequence: &Sequence) -> Result<()> {
    if sequence[0] == 0 {
        return Err(CardError::InvalidSequence(
            "sequence is empty".to_string(),
        ));
    }
    if !sequence.contains(&0) {
        return Err(CardError::InvalidSequence(
            "sequence has no 0x00 terminator".to_string(),
        ));
    }
    Ok(())
}

pub struct SequenceGameEngine;

impl SequenceGameEngine {
    /// Start a new game, replacing any game in progress
    pub fn init<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        sequence: &Sequence,
        reward: i32,
    ) -> Result<GameState> {
        validate_sequence(sequence)?;

        session.authenticate(SEQ_GAME_SECTOR, Credential::secret())?;
        ValueCounterStore::write(session, SEQ_CURSOR_BLOCK, 0)?;
        session.write_block(SEQ_DATA_BLOCK, sequence)?;
        ValueCounterStore::write(session, SEQ_REWARD_BLOCK, reward)?;

        info!(reward, "Sequence game started");
        Ok(GameState::Active(0))
    }

    /// Stored game state
    pub fn state<C: CardMemory>(session: &mut CardSession<'_, C>) -> Result<GameState> {
        session.authenticate(SEQ_GAME_SECTOR, Credential::secret())?;
        let cursor = ValueCounterStore::read(session, SEQ_CURSOR_BLOCK)?;
        GameState::from_cursor(cursor)
    }

    /// Check the next byte of the sequence
    pub fn check_next<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        input: u8,
    ) -> Result<Outcome> {
        Self::check_next_report(session, input).map(|check| check.outcome)
    }

    /// Check the next byte and report the resulting cursor and, on a win,
    /// the rewards balance
    ///
    /// A reward the rewards balance cannot absorb fails the move before the
    /// cursor is touched, so the game stays where it was.
    pub fn check_next_report<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        input: u8,
    ) -> Result<SequenceCheck> {
        let cursor = match Self::state(session)? {
            GameState::Inactive => return Err(CardError::GameNotActive),
            GameState::Active(cursor) => cursor as usize,
        };

        let sequence: Block = session.read_block(SEQ_DATA_BLOCK)?;

        if sequence[cursor] != input {
            ValueCounterStore::write(session, SEQ_CURSOR_BLOCK, INACTIVE_CURSOR)?;
            info!(correct_attempts = cursor, "Wrong sequence, game lost");
            return Ok(Self::finish(session, Outcome::Wrong, INACTIVE_CURSOR, None));
        }

        let next = cursor + 1;
        // Reaching the end of the buffer ends the game like a terminator
        let won = next >= BLOCK_SIZE || sequence[next] == 0x00;

        if !won {
            ValueCounterStore::write(session, SEQ_CURSOR_BLOCK, next as i32)?;
            return Ok(Self::finish(session, Outcome::Correct, next as i32, None));
        }

        let reward = ValueCounterStore::read(session, SEQ_REWARD_BLOCK)?;
        let ledger = BalanceLedger::rewards();
        let balance = ledger.get(session)?;
        if reward > 0 {
            ledger.credited(balance, reward)?;
        }

        session.authenticate(SEQ_GAME_SECTOR, Credential::secret())?;
        ValueCounterStore::write(session, SEQ_CURSOR_BLOCK, INACTIVE_CURSOR)?;
        info!(correct_attempts = next, reward, "Sequence complete, game won");

        let balance = if reward > 0 {
            ledger.add(session, reward)?
        } else {
            balance
        };

        Ok(Self::finish(
            session,
            Outcome::CorrectAndWon(reward),
            INACTIVE_CURSOR,
            Some(balance),
        ))
    }

    fn finish<C: CardMemory>(
        session: &CardSession<'_, C>,
        outcome: Outcome,
        cursor: i32,
        rewards: Option<i32>,
    ) -> SequenceCheck {
        session.emit(CardEvent::GameOutcome { outcome, cursor });
        SequenceCheck {
            outcome,
            cursor,
            rewards,
        }
    }
}
