//! Structured card events
//!
//! Protocol code reports what happened as [`CardEvent`]s at fixed points
//! (session opened, authenticated, write committed, game outcome, session
//! released). Sinks decide what to do with them:
//! - [`TracingSink`] forwards them to `tracing`
//! - [`AuditTrail`] keeps a bounded, timestamped record in memory

use crate::core::card::Uid;
use crate::core::game::Outcome;
use crate::core::keys::KeyRole;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Reader installation identity stamped on every audit entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderIdentity {
    pub store_id: u32,
    pub device_id: u32,
}

/// Something that happened on the card
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CardEvent {
    SessionOpened { operation: &'static str, uid: Uid },
    Authenticated { sector: u8, role: KeyRole },
    BlockWritten { block: u8 },
    CounterWritten { block: u8, value: i32 },
    SectorLocked { sector: u8 },
    GameOutcome { outcome: Outcome, cursor: i32 },
    SessionReleased { operation: &'static str, halted: bool },
}

/// Receiver of card events
pub trait EventSink: Send + Sync {
    fn record(&self, identity: ReaderIdentity, event: &CardEvent);
}

/// Sink that logs events through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn record(&self, identity: ReaderIdentity, event: &CardEvent) {
        let ReaderIdentity {
            store_id,
            device_id,
        } = identity;

        match event {
            CardEvent::SessionOpened { operation, uid } => {
                debug!(store_id, device_id, %uid, operation, "Card session opened");
            }
            CardEvent::Authenticated { sector, role } => {
                debug!(store_id, device_id, sector, %role, "Sector authenticated");
            }
            CardEvent::BlockWritten { block } => {
                debug!(store_id, device_id, block, "Block written");
            }
            CardEvent::CounterWritten { block, value } => {
                debug!(store_id, device_id, block, value, "Counter written");
            }
            CardEvent::SectorLocked { sector } => {
                info!(store_id, device_id, sector, "Sector trailer locked");
            }
            CardEvent::GameOutcome { outcome, cursor } => {
                info!(store_id, device_id, ?outcome, cursor, "Sequence game move");
            }
            CardEvent::SessionReleased { operation, halted } => {
                debug!(store_id, device_id, operation, halted, "Card session released");
            }
        }
    }
}

/// One recorded event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    /// Microsecond timestamp since UNIX epoch
    pub timestamp_us: u64,
    pub store_id: u32,
    pub device_id: u32,
    pub event: CardEvent,
}

impl AuditEntry {
    /// Create a new audit entry with current timestamp
    pub fn new(identity: ReaderIdentity, event: CardEvent) -> Self {
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);

        AuditEntry {
            timestamp_us,
            store_id: identity.store_id,
            device_id: identity.device_id,
            event,
        }
    }
}

/// Bounded in-memory audit record; oldest entries are dropped first
pub struct AuditTrail {
    entries: Mutex<VecDeque<AuditEntry>>,
    capacity: usize,
}

impl AuditTrail {
    pub fn new(capacity: usize) -> Self {
        AuditTrail {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of the current entries, oldest first
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// Take every entry out of the trail
    pub fn drain(&self) -> Vec<AuditEntry> {
        self.entries.lock().drain(..).collect()
    }

    /// Events only, oldest first
    pub fn events(&self) -> Vec<CardEvent> {
        self.entries.lock().iter().map(|e| e.event.clone()).collect()
    }
}

impl EventSink for AuditTrail {
    fn record(&self, identity: ReaderIdentity, event: &CardEvent) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(AuditEntry::new(identity, event.clone()));
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn identity() -> ReaderIdentity {
        ReaderIdentity {
            store_id: 3,
            device_id: 9,
        }
    }

    #[test]
    fn test_audit_entry_creation() {
        let entry = AuditEntry::new(identity(), CardEvent::BlockWritten { block: 1 });

        assert_eq!(entry.store_id, 3);
        assert_eq!(entry.device_id, 9);
        assert_eq!(entry.event, CardEvent::BlockWritten { block: 1 });
        assert!(entry.timestamp_us > 0);
    }

    #[test]
    fn test_trail_drops_oldest_at_capacity() {
        let trail = AuditTrail::new(2);
        for block in 0..3 {
            trail.record(identity(), &CardEvent::BlockWritten { block });
        }

        assert_eq!(
            trail.events(),
            vec![
                CardEvent::BlockWritten { block: 1 },
                CardEvent::BlockWritten { block: 2 },
            ]
        );
    }

    #[test]
    fn test_drain_empties_trail() {
        let trail = AuditTrail::default();
        trail.record(identity(), &CardEvent::SectorLocked { sector: 6 });

        assert_eq!(trail.drain().len(), 1);
        assert!(trail.is_empty());
    }

    #[test]
    fn test_trail_shared_across_threads() {
        let trail = Arc::new(AuditTrail::new(1000));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let trail = Arc::clone(&trail);
                thread::spawn(move || {
                    for i in 0..50 {
                        trail.record(
                            identity(),
                            &CardEvent::CounterWritten {
                                block: t,
                                value: i,
                            },
                        );
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(trail.len(), 200);
    }

    #[test]
    fn test_events_serialize_with_tag() {
        let json = serde_json::to_string(&CardEvent::SectorLocked { sector: 8 }).unwrap();
        assert_eq!(json, r#"{"event":"sector_locked","sector":8}"#);
    }
}
