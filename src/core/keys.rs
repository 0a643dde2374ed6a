//! Key material
//!
//! A card is provisioned with the factory default key in Key A and the
//! current secret key in Key B. The global sector records which secret key
//! version was used so that a later `reset` can find it again after the
//! registry has been rotated.

use crate::core::error::{CardError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const KEY_SIZE: usize = 6;

/// Factory key shipped on every card (FF FF FF FF FF FF)
pub const FACTORY_KEY: Key = Key([0xFF; KEY_SIZE]);

/// Secret key version 1
pub const SECRET_KEY_V1: Key = Key([0xab, 0x28, 0x29, 0x44, 0x2b, 0xFF]);

/// A 6-byte sector key
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_SIZE]);

impl Key {
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        Key(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn is_factory(&self) -> bool {
        *self == FACTORY_KEY
    }
}

// Key bytes are never printed
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_factory() {
            f.write_str("Key(factory)")
        } else {
            f.write_str("Key(******)")
        }
    }
}

impl FromStr for Key {
    type Err = CardError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| CardError::InvalidKey(format!("'{}' is not hex: {}", s, e)))?;
        let bytes: [u8; KEY_SIZE] = bytes.try_into().map_err(|_| {
            CardError::InvalidKey(format!("'{}' must be {} bytes", s, KEY_SIZE))
        })?;
        Ok(Key(bytes))
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which of the sector's two keys to authenticate as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyRole {
    A,
    B,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyRole::A => f.write_str("A"),
            KeyRole::B => f.write_str("B"),
        }
    }
}

/// Where the key for an authentication comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    /// Factory default key
    Default,
    /// Current secret key of the registry
    Current,
    /// Secret key of a specific registry version
    Secret(i32),
}

/// Key source plus the role it is presented as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Credential {
    pub source: KeySource,
    pub role: KeyRole,
}

impl Credential {
    pub const fn new(source: KeySource, role: KeyRole) -> Self {
        Credential { source, role }
    }

    /// Factory key as Key A, used on untouched cards
    pub const fn factory() -> Self {
        Credential::new(KeySource::Default, KeyRole::A)
    }

    /// Current secret key as Key B, used for every runtime operation
    pub const fn secret() -> Self {
        Credential::new(KeySource::Current, KeyRole::B)
    }

    /// A historical secret key as Key B
    pub const fn secret_version(version: i32) -> Self {
        Credential::new(KeySource::Secret(version), KeyRole::B)
    }
}

/// Immutable table of key material
///
/// Versions are 1-indexed: version `v` is `secrets[v - 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRegistry {
    default_key: Key,
    secrets: Vec<Key>,
    current_version: i32,
}

impl KeyRegistry {
    /// Build a registry, checking that `current_version` names a key
    pub fn new(default_key: Key, secrets: Vec<Key>, current_version: i32) -> Result<Self> {
        if secrets.is_empty() {
            return Err(CardError::Config(
                "key registry needs at least one secret key".to_string(),
            ));
        }

        let registry = KeyRegistry {
            default_key,
            secrets,
            current_version,
        };
        registry.key_for_version(current_version).map_err(|_| {
            CardError::Config(format!(
                "current key version {} is outside 1..={}",
                current_version,
                registry.secrets.len()
            ))
        })?;

        Ok(registry)
    }

    pub fn default_key(&self) -> Key {
        self.default_key
    }

    pub fn current_version(&self) -> i32 {
        self.current_version
    }

    pub fn current_secret_key(&self) -> Key {
        // `new` guarantees the current version is in range
        self.secrets[(self.current_version - 1) as usize]
    }

    /// Number of registered secret keys
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }

    pub fn key_for_version(&self, version: i32) -> Result<Key> {
        if version < 1 || version as usize > self.secrets.len() {
            return Err(CardError::InvalidKeyVersion(version));
        }
        Ok(self.secrets[(version - 1) as usize])
    }

    pub fn resolve(&self, source: KeySource) -> Result<Key> {
        match source {
            KeySource::Default => Ok(self.default_key),
            KeySource::Current => Ok(self.current_secret_key()),
            KeySource::Secret(version) => self.key_for_version(version),
        }
    }
}

impl Default for KeyRegistry {
    fn default() -> Self {
        KeyRegistry {
            default_key: FACTORY_KEY,
            secrets: vec![SECRET_KEY_V1],
            current_version: 1,
        }
    }
}
