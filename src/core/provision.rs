//! Card provisioning
//!
//! `configure` takes a card from any keyable state to a freshly provisioned
//! one:
//! 1. Global sector (default key, Key A): metadata block, key-version counter
//! 2. Player sector: points, rewards = 0
//! 3. Sequence sector: cursor = -1
//! 4. Trailers of sectors 6..=15 rewritten with the locked policy and the
//!    current secret as Key B
//!
//! Sector 0 keeps its transport trailer so the default key can always read
//! the key version back. A failure at any step aborts with the card left as
//! far as it got.

use crate::core::access::{AccessPolicy, SectorAccessController};
use crate::core::card::{Block, CardMemory, BLOCK_SIZE};
use crate::core::error::Result;
use crate::core::game::INACTIVE_CURSOR;
use crate::core::keys::Credential;
use crate::core::layout::{
    locked_sectors, GLOBAL_SECTOR, KEY_VERSION_BLOCK, METADATA_BLOCK, PLAYER_SECTOR, POINTS_BLOCK,
    REWARDS_BLOCK, SEQ_CURSOR_BLOCK, SEQ_GAME_SECTOR,
};
use crate::core::session::CardSession;
use crate::core::value::ValueCounterStore;
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Version of the metadata block layout
pub const METADATA_LAYOUT_VERSION: u8 = 1;

/// Provisioning date and layout marker stored in global block 1
///
/// Layout: day, month, century (BCD), year of century (BCD), layout version,
/// then zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionMetadata {
    pub date: NaiveDate,
    pub layout_version: u8,
}

impl ProvisionMetadata {
    pub fn for_date(date: NaiveDate) -> Self {
        ProvisionMetadata {
            date,
            layout_version: METADATA_LAYOUT_VERSION,
        }
    }

    /// Metadata stamped with today's local date
    pub fn today() -> Self {
        Self::for_date(chrono::Local::now().date_naive())
    }

    pub fn to_block(&self) -> Block {
        let year = self.date.year().clamp(0, 9999) as u32;
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = self.date.day() as u8;
        block[1] = self.date.month() as u8;
        block[2] = to_bcd((year / 100) as u8);
        block[3] = to_bcd((year % 100) as u8);
        block[4] = self.layout_version;
        block
    }

    /// Decode a metadata block; `None` for blank or unrecognised contents
    pub fn from_block(block: &Block) -> Option<Self> {
        let century = from_bcd(block[2])? as i32;
        let year = from_bcd(block[3])? as i32;
        let date = NaiveDate::from_ymd_opt(century * 100 + year, block[1] as u32, block[0] as u32)?;

        // The first cards carried no layout byte
        let layout_version = block[4].max(1);
        Some(ProvisionMetadata {
            date,
            layout_version,
        })
    }
}

fn to_bcd(value: u8) -> u8 {
    ((value / 10) << 4) | (value % 10)
}

fn from_bcd(byte: u8) -> Option<u8> {
    let (high, low) = (byte >> 4, byte & 0x0F);
    if high > 9 || low > 9 {
        return None;
    }
    Some(high * 10 + low)
}

/// Card state after provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionSummary {
    pub points: i32,
    pub rewards: i32,
    pub cursor: i32,
    pub key_version: i32,
}

pub struct CardProvisioner;

impl CardProvisioner {
    /// Provision the card, authenticating player and game sectors with
    /// `credential`
    pub fn configure<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        initial_points: i32,
        credential: Credential,
        metadata: ProvisionMetadata,
    ) -> Result<ProvisionSummary> {
        let key_version = session.keys().current_version();
        let secret = session.keys().current_secret_key();
        let default_key = session.keys().default_key();

        info!(
            initial_points,
            key_version,
            role = %credential.role,
            "Configuring card"
        );

        session.authenticate(GLOBAL_SECTOR, Credential::factory())?;
        session.write_block(METADATA_BLOCK, &metadata.to_block())?;
        ValueCounterStore::write(session, KEY_VERSION_BLOCK, key_version)?;

        session.authenticate(PLAYER_SECTOR, credential)?;
        ValueCounterStore::write(session, POINTS_BLOCK, initial_points)?;
        ValueCounterStore::write(session, REWARDS_BLOCK, 0)?;

        session.authenticate(SEQ_GAME_SECTOR, credential)?;
        ValueCounterStore::write(session, SEQ_CURSOR_BLOCK, INACTIVE_CURSOR)?;

        let trailer = SectorAccessController::build_trailer(default_key, secret, AccessPolicy::Locked);
        for sector in locked_sectors() {
            debug!(sector, "Locking sector trailer");
            SectorAccessController::lock_sector(session, sector, credential, &trailer)?;
        }

        info!(initial_points, key_version, "Card configured");
        Ok(ProvisionSummary {
            points: initial_points,
            rewards: 0,
            cursor: INACTIVE_CURSOR,
            key_version,
        })
    }

    /// First-time provisioning of an untouched card with the default key
    pub fn configure_factory<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        initial_points: i32,
        metadata: ProvisionMetadata,
    ) -> Result<ProvisionSummary> {
        Self::configure(session, initial_points, Credential::factory(), metadata)
    }

    /// Key version recorded on the card at its last provisioning
    pub fn read_key_version<C: CardMemory>(session: &mut CardSession<'_, C>) -> Result<i32> {
        session.authenticate(GLOBAL_SECTOR, Credential::factory())?;
        ValueCounterStore::read(session, KEY_VERSION_BLOCK)
    }

    /// Re-provision a card locked with the secret of its recorded key version
    ///
    /// Trailers are rewritten with the current secret, so a card provisioned
    /// under an older version is rotated onto the current one.
    pub fn reset<C: CardMemory>(
        session: &mut CardSession<'_, C>,
        initial_points: i32,
        metadata: ProvisionMetadata,
    ) -> Result<ProvisionSummary> {
        let version = Self::read_key_version(session)?;
        if let Err(err) = session.keys().key_for_version(version) {
            warn!(version, "Card carries an unknown key version");
            return Err(err);
        }

        if version != session.keys().current_version() {
            info!(
                from = version,
                to = session.keys().current_version(),
                "Rotating card key"
            );
        }

        Self::configure(
            session,
            initial_points,
            Credential::secret_version(version),
            metadata,
        )
    }

    /// Decode the provisioning metadata block
    pub fn read_metadata<C: CardMemory>(
        session: &mut CardSession<'_, C>,
    ) -> Result<Option<ProvisionMetadata>> {
        session.authenticate(GLOBAL_SECTOR, Credential::factory())?;
        let block = session.read_block(METADATA_BLOCK)?;
        Ok(ProvisionMetadata::from_block(&block))
    }
}
