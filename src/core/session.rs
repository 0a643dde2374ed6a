//! Scoped card sessions
//!
//! A [`CardSession`] owns the card for one logical operation. Sectors are
//! authenticated through it on demand, and the halt / stop-crypto sequence
//! runs when the session is closed or dropped, on every exit path.

use crate::core::access::SectorAccessController;
use crate::core::audit::{CardEvent, EventSink, ReaderIdentity};
use crate::core::card::{Block, CardMemory, Uid};
use crate::core::error::{CardError, Result};
use crate::core::keys::{Credential, KeyRegistry};
use std::sync::Arc;
use tracing::warn;

pub struct CardSession<'a, C: CardMemory> {
    card: &'a mut C,
    uid: &'a Uid,
    keys: &'a KeyRegistry,
    sinks: &'a [Arc<dyn EventSink>],
    identity: ReaderIdentity,
    operation: &'static str,
    authenticated: Option<(u8, Credential)>,
    released: bool,
}

impl<'a, C: CardMemory> CardSession<'a, C> {
    /// Start a session for `operation`
    pub fn open(
        card: &'a mut C,
        uid: &'a Uid,
        keys: &'a KeyRegistry,
        sinks: &'a [Arc<dyn EventSink>],
        identity: ReaderIdentity,
        operation: &'static str,
    ) -> Self {
        let session = CardSession {
            card,
            uid,
            keys,
            sinks,
            identity,
            operation,
            authenticated: None,
            released: false,
        };
        session.emit(CardEvent::SessionOpened {
            operation,
            uid: uid.clone(),
        });
        session
    }

    pub fn uid(&self) -> &Uid {
        self.uid
    }

    pub fn keys(&self) -> &KeyRegistry {
        self.keys
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Sector and credential of the last successful authentication
    pub fn authenticated(&self) -> Option<(u8, Credential)> {
        self.authenticated
    }

    pub(crate) fn card_mut(&mut self) -> &mut C {
        self.card
    }

    pub(crate) fn set_authenticated(&mut self, state: Option<(u8, Credential)>) {
        self.authenticated = state;
    }

    /// Authenticate `sector` with `credential`
    pub fn authenticate(&mut self, sector: u8, credential: Credential) -> Result<()> {
        SectorAccessController::authenticate(self, sector, credential)
    }

    /// Read a raw block of the authenticated sector
    pub fn read_block(&mut self, block: u8) -> Result<Block> {
        self.card
            .read_block(block)
            .map_err(|status| CardError::ReadFailed { block, status })
    }

    /// Write a raw block of the authenticated sector
    pub fn write_block(&mut self, block: u8, data: &Block) -> Result<()> {
        self.card
            .write_block(block, data)
            .map_err(|status| CardError::WriteFailed { block, status })?;
        self.emit(CardEvent::BlockWritten { block });
        Ok(())
    }

    pub fn emit(&self, event: CardEvent) {
        for sink in self.sinks {
            sink.record(self.identity, &event);
        }
    }

    /// Halt the card now, reporting a failed halt
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.authenticated = None;

        let halted = self.card.halt();
        self.card.stop_crypto();
        self.emit(CardEvent::SessionReleased {
            operation: self.operation,
            halted: halted.is_ok(),
        });

        halted.map_err(CardError::HaltFailed)
    }
}

impl<C: CardMemory> Drop for CardSession<'_, C> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(operation = self.operation, "Card session release failed: {}", err);
        }
    }
}
