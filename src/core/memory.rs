//! In-memory 1K card
//!
//! [`InMemoryCard`] implements [`CardMemory`] over 64 blocks held in memory
//! and enforces the access conditions stored in each sector trailer the way
//! the chip does: Key A / Key B comparison on authentication, per-block read
//! and write grants, a Key B that is unusable while it is readable, and a
//! manufacturer block that cannot be written.
//!
//! A halted card stops answering reads and writes. The next authentication
//! wakes it again, standing in for the presence loop that re-selects a card
//! on the next tap.
//!
//! The image can be dumped to and loaded from JSON, and faults can be injected
//! to exercise error paths.

use crate::core::access::{AccessPolicy, Trailer};
use crate::core::card::{Block, CardMemory, ReaderStatus, Uid, BLOCK_SIZE};
use crate::core::error::{CardError, Result};
use crate::core::keys::{Key, KeyRole, FACTORY_KEY};
use crate::core::layout::{
    first_block, is_trailer, sector_of, trailer_block, BLOCKS_PER_SECTOR, BLOCK_COUNT,
    SECTOR_COUNT,
};
use crate::core::value;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Reader-side state, not part of the card image
#[derive(Debug, Clone, Default)]
struct ReaderState {
    auth: Option<(u8, KeyRole)>,
    halted: bool,
    halt_count: usize,
    stop_crypto_count: usize,
    write_count: usize,
    fail_auth: Option<ReaderStatus>,
    fail_halt: Option<ReaderStatus>,
    /// Remaining successful writes before every write fails
    fail_writes_after: Option<(usize, ReaderStatus)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryCard {
    uid: Uid,
    blocks: Vec<Block>,
    #[serde(skip)]
    state: ReaderState,
}

impl InMemoryCard {
    /// Factory-fresh card with a random 4-byte UID
    pub fn new() -> Self {
        let uid: [u8; 4] = rand::thread_rng().gen();
        Self::with_uid(Uid::new(uid.to_vec()))
    }

    /// Factory-fresh card: transport trailers with the default key in both
    /// slots, zeroed data blocks
    pub fn with_uid(uid: Uid) -> Self {
        let mut blocks = vec![[0u8; BLOCK_SIZE]; BLOCK_COUNT as usize];

        blocks[0] = manufacturer_block(&uid);
        let trailer = Trailer::new(FACTORY_KEY, FACTORY_KEY, AccessPolicy::Transport).to_bytes();
        for sector in 0..SECTOR_COUNT {
            blocks[trailer_block(sector) as usize] = trailer;
        }

        InMemoryCard {
            uid,
            blocks,
            state: ReaderState::default(),
        }
    }

    pub fn uid(&self) -> &Uid {
        &self.uid
    }

    /// Raw block contents, bypassing access control
    pub fn peek_block(&self, block: u8) -> Block {
        self.blocks[block as usize]
    }

    /// Raw value block contents, bypassing access control
    pub fn peek_value(&self, block: u8) -> std::result::Result<i32, ReaderStatus> {
        value::decode(&self.blocks[block as usize]).map(|(value, _)| value)
    }

    /// Decoded trailer of `sector`
    pub fn trailer(&self, sector: u8) -> Trailer {
        Trailer::from_bytes(&self.blocks[trailer_block(sector) as usize])
    }

    /// Overwrite a block directly, as physical tampering would
    pub fn tamper_block(&mut self, block: u8, data: Block) {
        self.blocks[block as usize] = data;
    }

    /// Overwrite a value block directly, as physical tampering would
    pub fn tamper_value(&mut self, block: u8, value: i32) {
        self.blocks[block as usize] = value::encode(value, block);
    }

    pub fn halt_count(&self) -> usize {
        self.state.halt_count
    }

    pub fn stop_crypto_count(&self) -> usize {
        self.state.stop_crypto_count
    }

    /// Successful block writes since the card was created or loaded
    pub fn write_count(&self) -> usize {
        self.state.write_count
    }

    pub fn is_halted(&self) -> bool {
        self.state.halted
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.auth.is_some()
    }

    /// Fail every authentication with `status`
    pub fn fail_auth(&mut self, status: ReaderStatus) {
        self.state.fail_auth = Some(status);
    }

    /// Fail every halt with `status`
    pub fn fail_halt(&mut self, status: ReaderStatus) {
        self.state.fail_halt = Some(status);
    }

    /// Let `writes` more writes succeed, then fail every write with `status`
    pub fn fail_writes_after(&mut self, writes: usize, status: ReaderStatus) {
        self.state.fail_writes_after = Some((writes, status));
    }

    pub fn clear_faults(&mut self) {
        self.state.fail_auth = None;
        self.state.fail_halt = None;
        self.state.fail_writes_after = None;
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let card: InMemoryCard = serde_json::from_str(json)?;
        if card.blocks.len() != BLOCK_COUNT as usize {
            return Err(CardError::Config(format!(
                "card image has {} blocks, expected {}",
                card.blocks.len(),
                BLOCK_COUNT
            )));
        }
        Ok(card)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Role the reader is authenticated with for `block`'s sector
    fn session_role(&self, block: u8) -> std::result::Result<KeyRole, ReaderStatus> {
        if self.state.halted {
            return Err(ReaderStatus::Timeout);
        }
        if block >= BLOCK_COUNT {
            return Err(ReaderStatus::Invalid);
        }
        match self.state.auth {
            Some((sector, role)) if sector == sector_of(block) => Ok(role),
            _ => Err(ReaderStatus::MifareNack),
        }
    }

    fn key_matches(&self, sector: u8, role: KeyRole, key: &Key) -> bool {
        let trailer = self.trailer(sector);
        let grants = match trailer.access_bits.trailer_grants() {
            Ok(grants) => grants,
            Err(_) => return false,
        };

        match role {
            KeyRole::A => trailer.key_a == *key,
            KeyRole::B => grants.key_b_usable() && trailer.key_b == *key,
        }
    }
}

impl Default for InMemoryCard {
    fn default() -> Self {
        Self::new()
    }
}

fn manufacturer_block(uid: &Uid) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    let bytes = uid.as_bytes();
    let len = bytes.len().min(BLOCK_SIZE - 1);
    block[..len].copy_from_slice(&bytes[..len]);
    block[len] = bytes[..len].iter().fold(0, |bcc, b| bcc ^ b);
    block
}

impl CardMemory for InMemoryCard {
    fn authenticate(
        &mut self,
        role: KeyRole,
        trailer_block: u8,
        key: &Key,
        uid: &Uid,
    ) -> std::result::Result<(), ReaderStatus> {
        self.state.auth = None;
        if let Some(status) = self.state.fail_auth {
            return Err(status);
        }
        if trailer_block >= BLOCK_COUNT {
            return Err(ReaderStatus::Invalid);
        }
        if *uid != self.uid {
            return Err(ReaderStatus::Timeout);
        }

        // Re-selected by the presence loop
        self.state.halted = false;

        let sector = sector_of(trailer_block);
        if !self.key_matches(sector, role, key) {
            return Err(ReaderStatus::Timeout);
        }

        self.state.auth = Some((sector, role));
        Ok(())
    }

    fn read_block(&mut self, block: u8) -> std::result::Result<Block, ReaderStatus> {
        let role = self.session_role(block)?;
        let sector = sector_of(block);
        let trailer = self.trailer(sector);

        if is_trailer(block) {
            let grants = trailer.access_bits.trailer_grants()?;
            let mut data = [0u8; BLOCK_SIZE];
            // Key A never reads back
            if grants.access_bits_read.permits(role) {
                data[6..10].copy_from_slice(&trailer.access_bits.0);
            }
            if grants.key_b_read.permits(role) {
                data[10..16].copy_from_slice(trailer.key_b.as_bytes());
            }
            return Ok(data);
        }

        let grants = trailer
            .access_bits
            .data_grants(block - first_block(sector))?;
        if !grants.read.permits(role) {
            return Err(ReaderStatus::MifareNack);
        }
        Ok(self.blocks[block as usize])
    }

    fn write_block(&mut self, block: u8, data: &Block) -> std::result::Result<(), ReaderStatus> {
        let role = self.session_role(block)?;

        if let Some((remaining, status)) = self.state.fail_writes_after {
            if remaining == 0 {
                return Err(status);
            }
            self.state.fail_writes_after = Some((remaining - 1, status));
        }

        if block == 0 {
            return Err(ReaderStatus::MifareNack);
        }

        let sector = sector_of(block);
        let trailer = self.trailer(sector);

        if is_trailer(block) {
            let grants = trailer.access_bits.trailer_grants()?;
            if !(grants.key_a_write.permits(role)
                && grants.access_bits_write.permits(role)
                && grants.key_b_write.permits(role))
            {
                return Err(ReaderStatus::MifareNack);
            }
            // Refuse bits that would leave the sector unusable
            Trailer::from_bytes(data).access_bits.conditions()?;
        } else {
            let index = block - first_block(sector);
            debug_assert!(index < BLOCKS_PER_SECTOR - 1);
            let grants = trailer.access_bits.data_grants(index)?;
            if !grants.write.permits(role) {
                return Err(ReaderStatus::MifareNack);
            }
        }

        self.blocks[block as usize] = *data;
        self.state.write_count += 1;
        Ok(())
    }

    fn halt(&mut self) -> std::result::Result<(), ReaderStatus> {
        self.state.halt_count += 1;
        if let Some(status) = self.state.fail_halt {
            return Err(status);
        }
        self.state.halted = true;
        self.state.auth = None;
        Ok(())
    }

    fn stop_crypto(&mut self) {
        self.state.stop_crypto_count += 1;
        self.state.auth = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::keys::SECRET_KEY_V1;

    fn card() -> InMemoryCard {
        InMemoryCard::with_uid(Uid::new(vec![0x11, 0x22, 0x33, 0x44]))
    }

    fn locked_trailer() -> Block {
        Trailer::new(FACTORY_KEY, SECRET_KEY_V1, AccessPolicy::Locked).to_bytes()
    }

    #[test]
    fn test_factory_layout() {
        let card = card();
        assert_eq!(&card.peek_block(0)[..5], &[0x11, 0x22, 0x33, 0x44, 0x44]);
        for sector in 0..SECTOR_COUNT {
            let trailer = card.trailer(sector);
            assert_eq!(trailer.key_a, FACTORY_KEY);
            assert_eq!(trailer.access_bits, AccessPolicy::Transport.access_bits());
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let mut card = card();
        let uid = card.uid().clone();
        assert_eq!(
            card.authenticate(KeyRole::A, 27, &SECRET_KEY_V1, &uid),
            Err(ReaderStatus::Timeout)
        );
        assert!(!card.is_authenticated());
    }

    #[test]
    fn test_readable_key_b_cannot_authenticate() {
        let mut card = card();
        let uid = card.uid().clone();
        assert_eq!(
            card.authenticate(KeyRole::B, 27, &FACTORY_KEY, &uid),
            Err(ReaderStatus::Timeout)
        );
    }

    #[test]
    fn test_read_requires_authenticated_sector() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 3, &FACTORY_KEY, &uid).unwrap();
        assert!(card.read_block(1).is_ok());
        assert_eq!(card.read_block(24), Err(ReaderStatus::MifareNack));
    }

    #[test]
    fn test_locked_sector_rejects_key_a_writes() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 27, &FACTORY_KEY, &uid).unwrap();
        card.write_block(27, &locked_trailer()).unwrap();

        card.authenticate(KeyRole::A, 27, &FACTORY_KEY, &uid).unwrap();
        assert!(card.read_block(24).is_ok());
        assert_eq!(card.set_value(24, 5), Err(ReaderStatus::MifareNack));
        assert_eq!(
            card.write_block(27, &locked_trailer()),
            Err(ReaderStatus::MifareNack)
        );

        card.authenticate(KeyRole::B, 27, &SECRET_KEY_V1, &uid).unwrap();
        card.set_value(24, 5).unwrap();
        assert_eq!(card.get_value(24), Ok(5));
    }

    #[test]
    fn test_trailer_read_masks_keys() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 27, &FACTORY_KEY, &uid).unwrap();
        card.write_block(27, &locked_trailer()).unwrap();
        card.authenticate(KeyRole::B, 27, &SECRET_KEY_V1, &uid).unwrap();

        let data = card.read_block(27).unwrap();
        assert_eq!(&data[0..6], &[0; 6]);
        assert_eq!(&data[6..10], &[0x08, 0x77, 0x8F, 0x69]);
        assert_eq!(&data[10..16], &[0; 6]);
    }

    #[test]
    fn test_manufacturer_block_is_read_only() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 3, &FACTORY_KEY, &uid).unwrap();
        assert_eq!(
            card.write_block(0, &[0u8; BLOCK_SIZE]),
            Err(ReaderStatus::MifareNack)
        );
    }

    #[test]
    fn test_malformed_trailer_refused() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 27, &FACTORY_KEY, &uid).unwrap();
        let mut bad = locked_trailer();
        bad[8] = 0x00;
        assert_eq!(card.write_block(27, &bad), Err(ReaderStatus::Invalid));
        assert_eq!(card.trailer(6).access_bits, AccessPolicy::Transport.access_bits());
    }

    #[test]
    fn test_halted_card_ignores_reads_until_reauthenticated() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 3, &FACTORY_KEY, &uid).unwrap();
        card.halt().unwrap();
        assert_eq!(card.read_block(1), Err(ReaderStatus::Timeout));

        card.authenticate(KeyRole::A, 3, &FACTORY_KEY, &uid).unwrap();
        assert!(card.read_block(1).is_ok());
    }

    #[test]
    fn test_write_fault_injection() {
        let mut card = card();
        let uid = card.uid().clone();
        card.authenticate(KeyRole::A, 3, &FACTORY_KEY, &uid).unwrap();
        card.fail_writes_after(1, ReaderStatus::CrcWrong);

        assert!(card.set_value(2, 1).is_ok());
        assert_eq!(card.set_value(2, 2), Err(ReaderStatus::CrcWrong));
        assert_eq!(card.peek_value(2), Ok(1));
        assert_eq!(card.write_count(), 1);
    }

    #[test]
    fn test_json_image_round_trip_keeps_blocks() {
        let mut card = card();
        card.tamper_value(24, 42);
        let restored = InMemoryCard::from_json(&card.to_json().unwrap()).unwrap();
        assert_eq!(restored.uid(), card.uid());
        assert_eq!(restored.peek_value(24), Ok(42));
        assert_eq!(restored.write_count(), 0);
    }
}
