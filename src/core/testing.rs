//! Unit-test fixture: an emulated card plus the context a session borrows

use crate::core::audit::{AuditTrail, EventSink, ReaderIdentity};
use crate::core::card::Uid;
use crate::core::keys::KeyRegistry;
use crate::core::memory::InMemoryCard;
use crate::core::provision::{CardProvisioner, ProvisionMetadata};
use crate::core::session::CardSession;
use chrono::NaiveDate;
use std::sync::Arc;

pub struct Harness {
    pub card: InMemoryCard,
    pub uid: Uid,
    pub keys: KeyRegistry,
    pub trail: Arc<AuditTrail>,
    pub sinks: Vec<Arc<dyn EventSink>>,
}

impl Harness {
    pub fn factory() -> Self {
        let card = InMemoryCard::with_uid(Uid::new(vec![0xDE, 0xAD, 0xBE, 0xEF]));
        let uid = card.uid().clone();
        let trail = Arc::new(AuditTrail::new(1024));
        let sinks: Vec<Arc<dyn EventSink>> = vec![trail.clone()];

        Harness {
            card,
            uid,
            keys: KeyRegistry::default(),
            trail,
            sinks,
        }
    }

    /// Factory card configured with `points`
    pub fn provisioned(points: i32) -> Self {
        let mut harness = Self::factory();
        {
            let mut session = harness.session();
            CardProvisioner::configure_factory(
                &mut session,
                points,
                ProvisionMetadata::for_date(Self::provisioning_date()),
            )
            .unwrap();
        }
        harness.trail.drain();
        harness
    }

    pub fn provisioning_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()
    }

    pub fn session(&mut self) -> CardSession<'_, InMemoryCard> {
        CardSession::open(
            &mut self.card,
            &self.uid,
            &self.keys,
            &self.sinks,
            ReaderIdentity::default(),
            "test",
        )
    }
}
