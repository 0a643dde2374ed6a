//! Signed 32-bit counters stored in value blocks
//!
//! Value block layout (16 bytes):
//!
//! ```text
//! 0..4    value (little endian)
//! 4..8    !value
//! 8..12   value
//! 12      addr   13  !addr   14  addr   15  !addr
//! ```
//!
//! The redundant copies let the card (and the codec here) detect a torn or
//! tampered write.

use crate::core::audit::CardEvent;
use crate::core::card::{Block, CardMemory, ReaderStatus, BLOCK_SIZE};
use crate::core::error::{CardError, Result};
use crate::core::session::CardSession;
use tracing::debug;

/// Encode `value` as a value block stored at `addr`
pub fn encode(value: i32, addr: u8) -> Block {
    let mut block = [0u8; BLOCK_SIZE];
    let bytes = value.to_le_bytes();
    let inverted = (!value).to_le_bytes();

    block[0..4].copy_from_slice(&bytes);
    block[4..8].copy_from_slice(&inverted);
    block[8..12].copy_from_slice(&bytes);
    block[12] = addr;
    block[13] = !addr;
    block[14] = addr;
    block[15] = !addr;

    block
}

/// Decode a value block, checking every redundant copy
pub fn decode(block: &Block) -> std::result::Result<(i32, u8), ReaderStatus> {
    let value = i32::from_le_bytes([block[0], block[1], block[2], block[3]]);
    let inverted = i32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let copy = i32::from_le_bytes([block[8], block[9], block[10], block[11]]);

    if inverted != !value || copy != value {
        return Err(ReaderStatus::Invalid);
    }

    let addr = block[12];
    if block[13] != !addr || block[14] != addr || block[15] != !addr {
        return Err(ReaderStatus::Invalid);
    }

    Ok((value, addr))
}

/// Counter access over an open session
pub struct ValueCounterStore;

impl ValueCounterStore {
    /// Read the counter at `block`
    pub fn read<C: CardMemory>(session: &mut CardSession<'_, C>, block: u8) -> Result<i32> {
        let value = session
            .card_mut()
            .get_value(block)
            .map_err(|status| CardError::ReadFailed { block, status })?;
        debug!(block, value, "Read counter");
        Ok(value)
    }

    /// Overwrite the counter at `block`
    pub fn write<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        block: u8,
        value: i32,
    ) -> Result<()> {
        session
            .card_mut()
            .set_value(block, value)
            .map_err(|status| CardError::WriteFailed { block, status })?;
        debug!(block, value, "Wrote counter");
        session.emit(CardEvent::CounterWritten { block, value });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let block = encode(1, 24);
        assert_eq!(&block[0..4], &[1, 0, 0, 0]);
        assert_eq!(&block[4..8], &[0xFE, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&block[8..12], &[1, 0, 0, 0]);
        assert_eq!(&block[12..16], &[24, !24u8, 24, !24u8]);
    }

    #[test]
    fn test_negative_values_decode() {
        let block = encode(-1, 32);
        assert_eq!(decode(&block), Ok((-1, 32)));

        let block = encode(i32::MIN, 2);
        assert_eq!(decode(&block), Ok((i32::MIN, 2)));
    }

    #[test]
    fn test_corrupted_value_copy_rejected() {
        let mut block = encode(70, 24);
        block[8] ^= 0x01;
        assert_eq!(decode(&block), Err(ReaderStatus::Invalid));
    }

    #[test]
    fn test_corrupted_inverse_rejected() {
        let mut block = encode(70, 24);
        block[5] = 0;
        assert_eq!(decode(&block), Err(ReaderStatus::Invalid));
    }

    #[test]
    fn test_corrupted_address_rejected() {
        let mut block = encode(70, 24);
        block[15] = 24;
        assert_eq!(decode(&block), Err(ReaderStatus::Invalid));
    }

    #[test]
    fn test_blank_block_is_not_a_value() {
        assert_eq!(decode(&[0u8; BLOCK_SIZE]), Err(ReaderStatus::Invalid));
    }
}
