//! Fixed sector map of a provisioned card
//!
//! ```text
//! Sector 0   global      block 1: provisioning metadata
//!                        block 2: key version (value block)
//! Sector 6   player      +0: points, +1: rewards
//! Sector 7   member      reserved
//! Sector 8   sequence    +0: cursor, +1: expected sequence, +2: reward
//! ```
//!
//! Every sector is 4 blocks; the last one is the trailer.

pub const BLOCKS_PER_SECTOR: u8 = 4;

/// Sectors on a 1K card
pub const SECTOR_COUNT: u8 = 16;

/// Blocks on a 1K card
pub const BLOCK_COUNT: u8 = SECTOR_COUNT * BLOCKS_PER_SECTOR;

pub const GLOBAL_SECTOR: u8 = 0;
pub const PLAYER_SECTOR: u8 = 6;
pub const MEMBER_SECTOR: u8 = 7;
pub const SEQ_GAME_SECTOR: u8 = 8;

pub const METADATA_BLOCK: u8 = 1;
pub const KEY_VERSION_BLOCK: u8 = 2;

pub const POINTS_BLOCK: u8 = first_block(PLAYER_SECTOR);
pub const REWARDS_BLOCK: u8 = first_block(PLAYER_SECTOR) + 1;

pub const SEQ_CURSOR_BLOCK: u8 = first_block(SEQ_GAME_SECTOR);
pub const SEQ_DATA_BLOCK: u8 = first_block(SEQ_GAME_SECTOR) + 1;
pub const SEQ_REWARD_BLOCK: u8 = first_block(SEQ_GAME_SECTOR) + 2;

/// First sector whose trailer is relocked during provisioning
pub const FIRST_LOCKED_SECTOR: u8 = PLAYER_SECTOR;

pub const fn first_block(sector: u8) -> u8 {
    sector * BLOCKS_PER_SECTOR
}

pub const fn trailer_block(sector: u8) -> u8 {
    sector * BLOCKS_PER_SECTOR + BLOCKS_PER_SECTOR - 1
}

pub const fn sector_of(block: u8) -> u8 {
    block / BLOCKS_PER_SECTOR
}

pub const fn is_trailer(block: u8) -> bool {
    block % BLOCKS_PER_SECTOR == BLOCKS_PER_SECTOR - 1
}

/// Sectors relocked by provisioning, player sector onward
pub fn locked_sectors() -> impl Iterator<Item = u8> {
    FIRST_LOCKED_SECTOR..SECTOR_COUNT
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_addresses() {
        assert_eq!(trailer_block(GLOBAL_SECTOR), 3);
        assert_eq!(POINTS_BLOCK, 24);
        assert_eq!(REWARDS_BLOCK, 25);
        assert_eq!(trailer_block(PLAYER_SECTOR), 27);
        assert_eq!(SEQ_CURSOR_BLOCK, 32);
        assert_eq!(SEQ_DATA_BLOCK, 33);
        assert_eq!(SEQ_REWARD_BLOCK, 34);
        assert_eq!(trailer_block(SEQ_GAME_SECTOR), 35);
    }

    #[test]
    fn test_locked_trailers_cover_player_sector_to_end() {
        let trailers: Vec<u8> = locked_sectors().map(trailer_block).collect();
        assert_eq!(trailers.first(), Some(&27));
        assert_eq!(trailers.last(), Some(&63));
        assert!(trailers.windows(2).all(|w| w[1] - w[0] == 4));
        assert!(!trailers.contains(&trailer_block(GLOBAL_SECTOR)));
    }

    #[test]
    fn test_sector_of_and_trailer_detection() {
        assert_eq!(sector_of(27), 6);
        assert!(is_trailer(27));
        assert!(!is_trailer(24));
        assert_eq!(BLOCK_COUNT, 64);
    }
}
