//! TOML configuration
//!
//! ```toml
//! [keys]
//! default = "ffffffffffff"
//! secrets = ["ab2829442bff"]
//! current_version = 1
//!
//! [reader]
//! store_id = 1
//! device_id = 7
//!
//! [audit]
//! capacity = 256
//! ```
//!
//! Every section and field is optional.

use crate::core::audit::{AuditTrail, ReaderIdentity};
use crate::core::error::Result;
use crate::core::keys::{Key, KeyRegistry, FACTORY_KEY, SECRET_KEY_V1};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeyConfig {
    pub default: Key,
    /// Secret keys, version 1 first
    pub secrets: Vec<Key>,
    pub current_version: Option<i32>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        KeyConfig {
            default: FACTORY_KEY,
            secrets: vec![SECRET_KEY_V1],
            current_version: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub capacity: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        AuditConfig { capacity: 256 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlayCardConfig {
    pub keys: KeyConfig,
    pub reader: ReaderIdentity,
    pub audit: AuditConfig,
}

impl PlayCardConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Key registry; the newest secret is current unless a version is given
    pub fn key_registry(&self) -> Result<KeyRegistry> {
        let current = self
            .keys
            .current_version
            .unwrap_or(self.keys.secrets.len() as i32);
        KeyRegistry::new(self.keys.default, self.keys.secrets.clone(), current)
    }

    pub fn audit_trail(&self) -> AuditTrail {
        AuditTrail::new(self.audit.capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::CardError;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PlayCardConfig::from_toml_str("").unwrap();
        assert_eq!(config, PlayCardConfig::default());

        let registry = config.key_registry().unwrap();
        assert_eq!(registry, KeyRegistry::default());
        assert_eq!(config.audit_trail().capacity(), 256);
    }

    #[test]
    fn test_newest_secret_is_current_by_default() {
        let config = PlayCardConfig::from_toml_str(
            r#"
            [keys]
            secrets = ["ab2829442bff", "0102030405a6"]
            "#,
        )
        .unwrap();

        let registry = config.key_registry().unwrap();
        assert_eq!(registry.current_version(), 2);
        assert_eq!(
            registry.current_secret_key(),
            Key::new([0x01, 0x02, 0x03, 0x04, 0x05, 0xa6])
        );
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [keys]
            secrets = ["ab2829442bff", "0102030405a6"]
            current_version = 1

            [reader]
            store_id = 12
            device_id = 3

            [audit]
            capacity = 8
            "#
        )
        .unwrap();

        let config = PlayCardConfig::load(file.path()).unwrap();
        assert_eq!(config.reader.store_id, 12);
        assert_eq!(config.reader.device_id, 3);
        assert_eq!(config.audit.capacity, 8);
        assert_eq!(config.key_registry().unwrap().current_version(), 1);
    }

    #[test]
    fn test_bad_key_rejected() {
        let err = PlayCardConfig::from_toml_str("[keys]\ndefault = \"ffff\"\n").unwrap_err();
        assert!(matches!(err, CardError::Config(_)));
    }

    #[test]
    fn test_out_of_range_version_rejected() {
        let config =
            PlayCardConfig::from_toml_str("[keys]\ncurrent_version = 3\n").unwrap();
        assert!(matches!(config.key_registry(), Err(CardError::Config(_))));
    }
}
