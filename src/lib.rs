//! # PlayCard - Loyalty and Game State on Contactless Memory Cards
//!
//! `playcard-rs` keeps a points balance, a rewards balance and a
//! sequence-guessing game on a MIFARE Classic 1K style card. The card is the
//! only database; every operation authenticates the sector it touches and
//! releases the card when it is done.
//!
//! - **Key rotation**: cards record the secret key version they were
//!   provisioned with, so `reset` finds the right key after a rotation
//! - **One-way lockdown**: after provisioning only the secret Key B can
//!   write balances or re-key a sector
//! - **Scoped sessions**: halt and de-authentication run on every exit path
//! - **Structured events**: sessions, writes and game outcomes go to
//!   pluggable sinks (`tracing`, bounded audit trail)
//!
//! ## Quick Start
//!
//! ```rust
//! use playcard_rs::{InMemoryCard, PlayCard, Result};
//!
//! # fn main() -> Result<()> {
//! let card = InMemoryCard::new();
//! let uid = card.uid().clone();
//! let mut play = PlayCard::new(card, uid);
//!
//! play.configure(100)?;
//! assert_eq!(play.charge_points(30)?, 70);
//! assert!(play.charge_points(100).is_err());
//!
//! let status = play.check_status()?;
//! assert_eq!(status.points, 70);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sequence Game
//!
//! ```rust
//! use playcard_rs::{pad_sequence, InMemoryCard, Outcome, PlayCard, Result};
//!
//! # fn main() -> Result<()> {
//! let card = InMemoryCard::new();
//! let uid = card.uid().clone();
//! let mut play = PlayCard::new(card, uid);
//! play.configure(0)?;
//!
//! play.init_sequence(&pad_sequence(&[4, 2])?, 10)?;
//! assert_eq!(play.check_sequence(4)?, Outcome::Correct);
//! assert_eq!(play.check_sequence(2)?, Outcome::CorrectAndWon(10));
//! assert_eq!(play.get_rewards()?, 10);
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{
    access::{AccessBits, AccessPolicy, Grant, SectorAccessController, Trailer},
    audit::{AuditEntry, AuditTrail, CardEvent, EventSink, ReaderIdentity, TracingSink},
    card::{Block, CardMemory, ReaderStatus, Uid, BLOCK_SIZE},
    config::PlayCardConfig,
    error::{CardError, Result},
    game::{pad_sequence, GameState, Outcome, Sequence, SequenceCheck, SequenceGameEngine},
    keys::{Credential, Key, KeyRegistry, KeyRole, KeySource, FACTORY_KEY, SECRET_KEY_V1},
    ledger::{BalanceKind, BalanceLedger},
    memory::InMemoryCard,
    provision::{CardProvisioner, ProvisionMetadata, ProvisionSummary},
    session::CardSession,
    status::{CardStatus, CardStatusReader, Status, StatusCode},
    value::ValueCounterStore,
};

use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, warn};

/// One card plus the key material and sinks used to talk to it
///
/// Every operation runs in its own [`CardSession`]; the card is halted when
/// the operation returns, whatever the outcome.
pub struct PlayCard<C: CardMemory> {
    card: C,
    uid: Uid,
    keys: KeyRegistry,
    sinks: Vec<Arc<dyn EventSink>>,
    identity: ReaderIdentity,
    provision_date: Option<NaiveDate>,
}

impl<C: CardMemory> PlayCard<C> {
    /// Card with the default key registry and a `tracing` sink
    pub fn new(card: C, uid: Uid) -> Self {
        PlayCardBuilder::new().build(card, uid)
    }

    /// UID the card was selected with
    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Key material used for every authentication
    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    /// Store and device stamped on emitted events
    pub fn identity(&self) -> ReaderIdentity {
        self.identity
    }

    /// Underlying card reader
    pub fn card(&self) -> &C {
        &self.card
    }

    /// Mutable access to the card reader, outside any session
    pub fn card_mut(&mut self) -> &mut C {
        &mut self.card
    }

    /// Give the card reader back
    pub fn into_card(self) -> C {
        self.card
    }

    fn metadata_stamp(&self) -> ProvisionMetadata {
        match self.provision_date {
            Some(date) => ProvisionMetadata::for_date(date),
            None => ProvisionMetadata::today(),
        }
    }

    fn run<T, F>(&mut self, operation: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(&mut CardSession<'_, C>) -> Result<T>,
    {
        let mut session = CardSession::open(
            &mut self.card,
            &self.uid,
            &self.keys,
            &self.sinks,
            self.identity,
            operation,
        );

        let result = f(&mut session);
        if let Err(err) = &result {
            debug!(operation, "Operation failed: {}", err);
        }

        // The operation's writes are committed; a failed halt only affects the link
        if let Err(err) = session.close() {
            warn!(operation, "Card not halted: {}", err);
        }
        result
    }

    /// First-time provisioning with the default key
    pub fn configure(&mut self, initial_points: i32) -> Result<ProvisionSummary> {
        let metadata = self.metadata_stamp();
        self.run("configure", |s| {
            CardProvisioner::configure_factory(s, initial_points, metadata)
        })
    }

    /// Provisioning with an explicit credential for the player and game sectors
    pub fn configure_with(
        &mut self,
        initial_points: i32,
        credential: Credential,
    ) -> Result<ProvisionSummary> {
        let metadata = self.metadata_stamp();
        self.run("configure", |s| {
            CardProvisioner::configure(s, initial_points, credential, metadata)
        })
    }

    /// Re-provision a locked card using its recorded key version
    pub fn reset(&mut self, initial_points: i32) -> Result<ProvisionSummary> {
        let metadata = self.metadata_stamp();
        self.run("reset", |s| CardProvisioner::reset(s, initial_points, metadata))
    }

    /// Points, rewards and game state in one session
    pub fn check_status(&mut self) -> Result<CardStatus> {
        self.run("check_status", CardStatusReader::check_status)
    }

    /// Current points balance
    pub fn get_points(&mut self) -> Result<i32> {
        self.run("get_points", |s| BalanceLedger::points().get(s))
    }

    /// Add `amount` (either sign) to points; the result may not go below zero
    pub fn add_points(&mut self, amount: i32) -> Result<i32> {
        self.run("add_points", |s| BalanceLedger::points().add(s, amount))
    }

    /// Debit points, failing without a write when the balance is too low
    pub fn charge_points(&mut self, amount: i32) -> Result<i32> {
        self.run("charge_points", |s| BalanceLedger::points().charge(s, amount))
    }

    /// Current rewards balance
    pub fn get_rewards(&mut self) -> Result<i32> {
        self.run("get_rewards", |s| BalanceLedger::rewards().get(s))
    }

    /// Add `amount` (either sign) to rewards; the result may not go below zero
    pub fn add_rewards(&mut self, amount: i32) -> Result<i32> {
        self.run("add_rewards", |s| BalanceLedger::rewards().add(s, amount))
    }

    /// Debit rewards, failing without a write when the balance is too low
    pub fn charge_rewards(&mut self, amount: i32) -> Result<i32> {
        self.run("charge_rewards", |s| BalanceLedger::rewards().charge(s, amount))
    }

    /// Start a sequence game; `sequence` must be 0x00-terminated
    pub fn init_sequence(&mut self, sequence: &Sequence, reward: i32) -> Result<GameState> {
        self.run("init_sequence", |s| {
            SequenceGameEngine::init(s, sequence, reward)
        })
    }

    /// Check the next byte of the active game
    pub fn check_sequence(&mut self, input: u8) -> Result<Outcome> {
        self.run("check_sequence", |s| SequenceGameEngine::check_next(s, input))
    }

    /// Like [`check_sequence`](Self::check_sequence), also reporting the new
    /// cursor and the rewards balance after a win
    pub fn check_sequence_report(&mut self, input: u8) -> Result<SequenceCheck> {
        self.run("check_sequence", |s| {
            SequenceGameEngine::check_next_report(s, input)
        })
    }

    /// Stored game state
    pub fn game_state(&mut self) -> Result<GameState> {
        self.run("game_state", SequenceGameEngine::state)
    }

    /// Provisioning metadata, `None` on a card that was never configured
    pub fn metadata(&mut self) -> Result<Option<ProvisionMetadata>> {
        self.run("metadata", CardProvisioner::read_metadata)
    }

    /// Secret key version recorded on the card
    pub fn key_version(&mut self) -> Result<i32> {
        self.run("key_version", CardProvisioner::read_key_version)
    }

    /// Halt the card and drop any authentication, reporting a failed halt
    pub fn stop(&mut self) -> Result<()> {
        CardSession::open(
            &mut self.card,
            &self.uid,
            &self.keys,
            &self.sinks,
            self.identity,
            "stop",
        )
        .close()
    }
}

/// Builder for [`PlayCard`]
///
/// ```rust
/// use playcard_rs::{AuditTrail, InMemoryCard, PlayCardBuilder};
/// use std::sync::Arc;
///
/// let trail = Arc::new(AuditTrail::new(64));
/// let card = InMemoryCard::new();
/// let uid = card.uid().clone();
///
/// let play = PlayCardBuilder::new()
///     .sink(trail.clone())
///     .without_tracing()
///     .build(card, uid);
/// assert_eq!(play.keys().current_version(), 1);
/// ```
pub struct PlayCardBuilder {
    keys: KeyRegistry,
    sinks: Vec<Arc<dyn EventSink>>,
    tracing: bool,
    identity: ReaderIdentity,
    provision_date: Option<NaiveDate>,
}

impl PlayCardBuilder {
    /// Default keys, a `tracing` sink and today's date
    pub fn new() -> Self {
        PlayCardBuilder {
            keys: KeyRegistry::default(),
            sinks: Vec::new(),
            tracing: true,
            identity: ReaderIdentity::default(),
            provision_date: None,
        }
    }

    /// Keys, reader identity and an audit trail of the configured capacity
    pub fn from_config(config: &PlayCardConfig) -> Result<(Self, Arc<AuditTrail>)> {
        let trail = Arc::new(config.audit_trail());
        let builder = Self::new()
            .keys(config.key_registry()?)
            .identity(config.reader)
            .sink(trail.clone());
        Ok((builder, trail))
    }

    /// Replace the key registry
    pub fn keys(mut self, keys: KeyRegistry) -> Self {
        self.keys = keys;
        self
    }

    /// Add an event sink
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Drop the default `tracing` sink
    pub fn without_tracing(mut self) -> Self {
        self.tracing = false;
        self
    }

    /// Store and device stamped on events
    pub fn identity(mut self, identity: ReaderIdentity) -> Self {
        self.identity = identity;
        self
    }

    /// Date written to the metadata block; defaults to today
    pub fn provision_date(mut self, date: NaiveDate) -> Self {
        self.provision_date = Some(date);
        self
    }

    /// Bind the configuration to a selected card
    pub fn build<C: CardMemory>(self, card: C, uid: Uid) -> PlayCard<C> {
        let mut sinks = self.sinks;
        if self.tracing {
            sinks.insert(0, Arc::new(TracingSink));
        }

        PlayCard {
            card,
            uid,
            keys: self.keys,
            sinks,
            identity: self.identity,
            provision_date: self.provision_date,
        }
    }
}

impl Default for PlayCardBuilder {
    fn default() -> Self {
        Self::new()
    }
}
