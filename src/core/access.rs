//! Sector access control
//!
//! Each sector's trailer block holds Key A, a 4-byte access-bits word and
//! Key B:
//!
//! ```text
//! 0..6    Key A
//! 6..10   access bits (bytes 6-8 conditions, byte 9 general purpose)
//! 10..16  Key B
//! ```
//!
//! The access bits carry one 3-bit condition (C1 C2 C3) per block of the
//! sector, each stored twice (plain and inverted):
//!
//! ```text
//! byte 6 = !C2[3..0] << 4 | !C1[3..0]
//! byte 7 =  C1[3..0] << 4 | !C3[3..0]
//! byte 8 =  C3[3..0] << 4 |  C2[3..0]
//! ```
//!
//! Provisioning relocks every player/game sector with [`AccessPolicy::Locked`]:
//! data blocks are readable with either key but writable only with Key B, and
//! the trailer itself can only be rewritten with Key B.

use crate::core::audit::CardEvent;
use crate::core::card::{Block, CardMemory, ReaderStatus, BLOCK_SIZE};
use crate::core::error::{CardError, Result};
use crate::core::keys::{Credential, Key, KeyRole, KEY_SIZE};
use crate::core::layout::{trailer_block, BLOCKS_PER_SECTOR};
use crate::core::session::CardSession;
use tracing::debug;

/// Who may perform an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grant {
    Never,
    KeyA,
    KeyB,
    Either,
}

impl Grant {
    pub fn permits(&self, role: KeyRole) -> bool {
        matches!(
            (self, role),
            (Grant::Either, _) | (Grant::KeyA, KeyRole::A) | (Grant::KeyB, KeyRole::B)
        )
    }
}

/// Permissions on a data or value block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataGrants {
    pub read: Grant,
    pub write: Grant,
    pub increment: Grant,
    /// Decrement, transfer and restore
    pub decrement: Grant,
}

/// Permissions on the trailer block itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailerGrants {
    pub key_a_write: Grant,
    pub access_bits_read: Grant,
    pub access_bits_write: Grant,
    pub key_b_read: Grant,
    pub key_b_write: Grant,
}

impl TrailerGrants {
    /// A readable Key B is plain data and cannot be used to authenticate
    pub fn key_b_usable(&self) -> bool {
        self.key_b_read == Grant::Never
    }
}

/// Per-block (C1, C2, C3) condition packed as `C1 << 2 | C2 << 1 | C3`
pub type Condition = u8;

/// Data blocks free for either key (factory state)
pub const DATA_OPEN: Condition = 0b000;
/// Data blocks: read A|B, write/increment B, decrement A|B
pub const DATA_VALUE_KEY_B: Condition = 0b110;
/// Trailer with keys and access bits rewritable by Key A (factory state)
pub const TRAILER_TRANSPORT: Condition = 0b001;
/// Trailer with keys and access bits rewritable only by Key B
pub const TRAILER_KEY_B: Condition = 0b011;

/// The 4-byte access-bits word of a trailer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessBits(pub [u8; 4]);

impl AccessBits {
    /// Pack conditions for blocks 0..=3 (index 3 is the trailer)
    pub fn from_conditions(conditions: [Condition; 4], user_byte: u8) -> Self {
        let mut c1 = 0u8;
        let mut c2 = 0u8;
        let mut c3 = 0u8;
        for (i, cond) in conditions.iter().enumerate() {
            c1 |= ((cond >> 2) & 1) << i;
            c2 |= ((cond >> 1) & 1) << i;
            c3 |= (cond & 1) << i;
        }

        AccessBits([
            ((!c2 & 0x0F) << 4) | (!c1 & 0x0F),
            (c1 << 4) | (!c3 & 0x0F),
            (c3 << 4) | c2,
            user_byte,
        ])
    }

    /// Unpack per-block conditions, checking the inverted copies
    pub fn conditions(&self) -> std::result::Result<[Condition; 4], ReaderStatus> {
        let [b6, b7, b8, _] = self.0;
        let c1 = b7 >> 4;
        let c2 = b8 & 0x0F;
        let c3 = b8 >> 4;

        if (!b6 & 0x0F) != c1 || (!b6 >> 4) != c2 || (!b7 & 0x0F) != c3 {
            return Err(ReaderStatus::Invalid);
        }

        let mut conditions = [0u8; 4];
        for (i, cond) in conditions.iter_mut().enumerate() {
            *cond = (((c1 >> i) & 1) << 2) | (((c2 >> i) & 1) << 1) | ((c3 >> i) & 1);
        }
        Ok(conditions)
    }

    /// Permissions of data block `index` (0..=2) of the sector
    pub fn data_grants(&self, index: u8) -> std::result::Result<DataGrants, ReaderStatus> {
        if index >= BLOCKS_PER_SECTOR - 1 {
            return Err(ReaderStatus::Invalid);
        }
        let cond = self.conditions()?[index as usize];
        Ok(data_grants(cond))
    }

    /// Permissions of the trailer block
    pub fn trailer_grants(&self) -> std::result::Result<TrailerGrants, ReaderStatus> {
        let cond = self.conditions()?[3];
        Ok(trailer_grants(cond))
    }
}

fn data_grants(cond: Condition) -> DataGrants {
    use Grant::*;
    let (read, write, increment, decrement) = match cond {
        0b000 => (Either, Either, Either, Either),
        0b010 => (Either, Never, Never, Never),
        0b100 => (Either, KeyB, Never, Never),
        0b110 => (Either, KeyB, KeyB, Either),
        0b001 => (Either, Never, Never, Either),
        0b011 => (KeyB, KeyB, Never, Never),
        0b101 => (KeyB, Never, Never, Never),
        _ => (Never, Never, Never, Never),
    };
    DataGrants {
        read,
        write,
        increment,
        decrement,
    }
}

fn trailer_grants(cond: Condition) -> TrailerGrants {
    use Grant::*;
    let (key_a_write, access_bits_read, access_bits_write, key_b_read, key_b_write) = match cond {
        0b000 => (KeyA, KeyA, Never, KeyA, KeyA),
        0b010 => (Never, KeyA, Never, KeyA, Never),
        0b100 => (KeyB, Either, Never, Never, KeyB),
        0b110 => (Never, Either, Never, Never, Never),
        0b001 => (KeyA, KeyA, KeyA, KeyA, KeyA),
        0b011 => (KeyB, Either, KeyB, Never, KeyB),
        0b101 => (Never, Either, KeyB, Never, Never),
        _ => (Never, Either, Never, Never, Never),
    };
    TrailerGrants {
        key_a_write,
        access_bits_read,
        access_bits_write,
        key_b_read,
        key_b_write,
    }
}

/// Access policies written by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPolicy {
    /// Factory delivery state: `FF 07 80 69`
    Transport,
    /// Provisioned player/game sector: `08 77 8F 69`
    Locked,
}

impl AccessPolicy {
    pub fn access_bits(&self) -> AccessBits {
        match self {
            AccessPolicy::Transport => AccessBits::from_conditions(
                [DATA_OPEN, DATA_OPEN, DATA_OPEN, TRAILER_TRANSPORT],
                0x69,
            ),
            AccessPolicy::Locked => AccessBits::from_conditions(
                [
                    DATA_VALUE_KEY_B,
                    DATA_VALUE_KEY_B,
                    DATA_VALUE_KEY_B,
                    TRAILER_KEY_B,
                ],
                0x69,
            ),
        }
    }
}

/// Decoded trailer block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub key_a: Key,
    pub access_bits: AccessBits,
    pub key_b: Key,
}

impl Trailer {
    pub fn new(key_a: Key, key_b: Key, policy: AccessPolicy) -> Self {
        Trailer {
            key_a,
            access_bits: policy.access_bits(),
            key_b,
        }
    }

    pub fn to_bytes(&self) -> Block {
        let mut block = [0u8; BLOCK_SIZE];
        block[0..6].copy_from_slice(self.key_a.as_bytes());
        block[6..10].copy_from_slice(&self.access_bits.0);
        block[10..16].copy_from_slice(self.key_b.as_bytes());
        block
    }

    pub fn from_bytes(block: &Block) -> Self {
        let mut key_a = [0u8; KEY_SIZE];
        let mut bits = [0u8; 4];
        let mut key_b = [0u8; KEY_SIZE];
        key_a.copy_from_slice(&block[0..6]);
        bits.copy_from_slice(&block[6..10]);
        key_b.copy_from_slice(&block[10..16]);

        Trailer {
            key_a: Key::new(key_a),
            access_bits: AccessBits(bits),
            key_b: Key::new(key_b),
        }
    }
}

/// Authentication and trailer management for sectors
pub struct SectorAccessController;

impl SectorAccessController {
    /// Authenticate `sector` using the key named by `credential`
    pub fn authenticate<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        sector: u8,
        credential: Credential,
    ) -> Result<()> {
        let key = session.keys().resolve(credential.source)?;
        let uid = session.uid().clone();
        let role = credential.role;

        debug!(sector, %role, "Authenticating");
        if let Err(status) = session
            .card_mut()
            .authenticate(role, trailer_block(sector), &key, &uid)
        {
            session.set_authenticated(None);
            return Err(CardError::AuthFailed {
                sector,
                role,
                status,
            });
        }

        session.set_authenticated(Some((sector, credential)));
        session.emit(CardEvent::Authenticated { sector, role });
        Ok(())
    }

    /// Assemble a trailer block from two keys and a policy
    pub fn build_trailer(key_a: Key, key_b: Key, policy: AccessPolicy) -> Block {
        Trailer::new(key_a, key_b, policy).to_bytes()
    }

    /// Authenticate `sector` and overwrite its trailer
    pub fn lock_sector<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        sector: u8,
        credential: Credential,
        trailer: &Block,
    ) -> Result<()> {
        Self::authenticate(session, sector, credential)?;
        session.write_block(trailer_block(sector), trailer)?;
        session.emit(CardEvent::SectorLocked { sector });
        Ok(())
    }
}
