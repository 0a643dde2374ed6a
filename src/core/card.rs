//! Card memory interface
//!
//! The radio driver that talks to the physical card is an external
//! collaborator. Everything in this crate reaches the card through the
//! [`CardMemory`] trait, which mirrors the primitives an MFRC522-class reader
//! exposes: sector authentication, 16-byte block read/write, value block
//! access and the halt sequence.

use crate::core::keys::{Key, KeyRole};
use crate::core::value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bytes per block
pub const BLOCK_SIZE: usize = 16;

/// A raw 16-byte block
pub type Block = [u8; BLOCK_SIZE];

/// Failure codes reported by the reader
///
/// Success is expressed as `Ok(..)`; these are the non-OK codes of an
/// MFRC522-style driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReaderStatus {
    /// Generic communication error
    Error,
    /// Collision detected on the field
    Collision,
    /// No answer from the card within the reader's timeout
    Timeout,
    /// Buffer too small for the response
    NoRoom,
    /// Internal reader fault
    InternalError,
    /// Invalid argument or malformed data
    Invalid,
    /// CRC mismatch on the response
    CrcWrong,
    /// Card NAK'd the command (for example, access denied)
    MifareNack,
}

impl ReaderStatus {
    pub fn name(&self) -> &'static str {
        match self {
            ReaderStatus::Error => "Error in communication",
            ReaderStatus::Collision => "Collision detected",
            ReaderStatus::Timeout => "Timeout in communication",
            ReaderStatus::NoRoom => "A buffer is not big enough",
            ReaderStatus::InternalError => "Internal error in the code",
            ReaderStatus::Invalid => "Invalid argument",
            ReaderStatus::CrcWrong => "The CRC_A does not match",
            ReaderStatus::MifareNack => "A MIFARE PICC responded with NAK",
        }
    }
}

impl fmt::Display for ReaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hardware unique identifier of a card (4, 7 or 10 bytes)
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Uid(Vec<u8>);

impl Uid {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Uid(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode_upper(&self.0))
    }
}

/// Primitive operations of the card reader
///
/// Implementations are blocking; each call is one round trip to the card.
/// `get_value` and `set_value` default to the standard value block encoding
/// on top of `read_block`/`write_block`; drivers with native value commands
/// can override them.
pub trait CardMemory {
    /// Authenticate the sector that owns `trailer_block` with the given key
    fn authenticate(
        &mut self,
        role: KeyRole,
        trailer_block: u8,
        key: &Key,
        uid: &Uid,
    ) -> std::result::Result<(), ReaderStatus>;

    /// Read one 16-byte block from the authenticated sector
    fn read_block(&mut self, block: u8) -> std::result::Result<Block, ReaderStatus>;

    /// Write one 16-byte block in the authenticated sector
    fn write_block(&mut self, block: u8, data: &Block) -> std::result::Result<(), ReaderStatus>;

    /// Send HLTA so the card stops answering until it is re-selected
    fn halt(&mut self) -> std::result::Result<(), ReaderStatus>;

    /// Leave the encrypted session on the reader side
    fn stop_crypto(&mut self);

    /// Read a value block as a signed 32-bit counter
    fn get_value(&mut self, block: u8) -> std::result::Result<i32, ReaderStatus> {
        let data = self.read_block(block)?;
        value::decode(&data).map(|(value, _addr)| value)
    }

    /// Overwrite a value block with `value`
    fn set_value(&mut self, block: u8, value: i32) -> std::result::Result<(), ReaderStatus> {
        let data = value::encode(value, block);
        self.write_block(block, &data)
    }
}

impl<T: CardMemory + ?Sized> CardMemory for &mut T {
    fn authenticate(
        &mut self,
        role: KeyRole,
        trailer_block: u8,
        key: &Key,
        uid: &Uid,
    ) -> std::result::Result<(), ReaderStatus> {
        (**self).authenticate(role, trailer_block, key, uid)
    }

    fn read_block(&mut self, block: u8) -> std::result::Result<Block, ReaderStatus> {
        (**self).read_block(block)
    }

    fn write_block(&mut self, block: u8, data: &Block) -> std::result::Result<(), ReaderStatus> {
        (**self).write_block(block, data)
    }

    fn halt(&mut self) -> std::result::Result<(), ReaderStatus> {
        (**self).halt()
    }

    fn stop_crypto(&mut self) {
        (**self).stop_crypto()
    }

    fn get_value(&mut self, block: u8) -> std::result::Result<i32, ReaderStatus> {
        (**self).get_value(block)
    }

    fn set_value(&mut self, block: u8, value: i32) -> std::result::Result<(), ReaderStatus> {
        (**self).set_value(block, value)
    }
}
