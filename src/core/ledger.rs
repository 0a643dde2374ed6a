//! Points and rewards balances
//!
//! Both balances live in the player sector as value blocks. Every operation
//! authenticates the sector with the current secret key as Key B.

use crate::core::card::CardMemory;
use crate::core::error::{CardError, Result};
use crate::core::keys::Credential;
use crate::core::layout::{PLAYER_SECTOR, POINTS_BLOCK, REWARDS_BLOCK};
use crate::core::session::CardSession;
use crate::core::value::ValueCounterStore;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BalanceKind {
    Points,
    Rewards,
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceKind::Points => f.write_str("points"),
            BalanceKind::Rewards => f.write_str("rewards"),
        }
    }
}

/// A balance bound to its counter block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceLedger {
    kind: BalanceKind,
    sector: u8,
    block: u8,
}

impl BalanceLedger {
    pub const fn new(kind: BalanceKind, sector: u8, block: u8) -> Self {
        BalanceLedger {
            kind,
            sector,
            block,
        }
    }

    pub const fn points() -> Self {
        Self::new(BalanceKind::Points, PLAYER_SECTOR, POINTS_BLOCK)
    }

    pub const fn rewards() -> Self {
        Self::new(BalanceKind::Rewards, PLAYER_SECTOR, REWARDS_BLOCK)
    }

    pub fn kind(&self) -> BalanceKind {
        self.kind
    }

    pub fn block(&self) -> u8 {
        self.block
    }

    /// Current balance
    pub fn get<C: CardMemory>(&self, session: &mut CardSession<'_, C>) -> Result<i32> {
        session.authenticate(self.sector, Credential::secret())?;
        ValueCounterStore::read(session, self.block)
    }

    /// Apply `amount` (either sign) and return the new balance
    ///
    /// A result below zero is an `InsufficientBalance`; nothing is written.
    pub fn add<C: CardMemory>(&self, session: &mut CardSession<'_, C>, amount: i32) -> Result<i32> {
        let current = self.get(session)?;
        let updated = self.credited(current, amount)?;

        ValueCounterStore::write(session, self.block, updated)?;
        info!(kind = %self.kind, amount, balance = updated, "Balance credited");
        Ok(updated)
    }

    /// Balance after adding `amount` to `current`, without touching the card
    pub fn credited(&self, current: i32, amount: i32) -> Result<i32> {
        let updated = current
            .checked_add(amount)
            .ok_or(CardError::BalanceOverflow {
                kind: self.kind,
                balance: current,
                amount,
            })?;

        if updated < 0 {
            debug!(kind = %self.kind, balance = current, amount, "Balance would go negative");
            return Err(CardError::InsufficientBalance {
                kind: self.kind,
                balance: current,
                requested: amount.saturating_neg(),
            });
        }
        Ok(updated)
    }

    /// Debit `amount` and return the new balance
    ///
    /// A balance equal to `amount` is sufficient. When it is not, nothing is
    /// written.
    pub fn charge<C: CardMemory>(
        &self,
        session: &mut CardSession<'_, C>,
        amount: i32,
    ) -> Result<i32> {
        if amount < 0 {
            return Err(CardError::InvalidAmount(amount));
        }

        let current = self.get(session)?;
        if current < amount {
            debug!(kind = %self.kind, balance = current, requested = amount, "Balance too low");
            return Err(CardError::InsufficientBalance {
                kind: self.kind,
                balance: current,
                requested: amount,
            });
        }

        let updated = current - amount;
        ValueCounterStore::write(session, self.block, updated)?;
        info!(kind = %self.kind, amount, balance = updated, "Balance charged");
        Ok(updated)
    }
}
