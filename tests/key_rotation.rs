//! Reset after a key rotation moves cards onto the new secret

use playcard_rs::{
    CardError, InMemoryCard, Key, KeyRegistry, KeyRole, PlayCard, PlayCardBuilder, Uid,
    FACTORY_KEY, SECRET_KEY_V1,
};

const SECRET_V2: Key = Key::new([0x5c, 0x10, 0x77, 0xe2, 0x09, 0x3d]);

fn v1_card(points: i32) -> InMemoryCard {
    let card = InMemoryCard::with_uid(Uid::new(vec![0x88, 0x04, 0x1F, 0x6B]));
    let uid = card.uid().clone();
    let mut play = PlayCardBuilder::new().without_tracing().build(card, uid);
    play.configure(points).unwrap();
    play.into_card()
}

fn with_keys(card: InMemoryCard, keys: KeyRegistry) -> PlayCard<InMemoryCard> {
    let uid = card.uid().clone();
    PlayCardBuilder::new().without_tracing().keys(keys).build(card, uid)
}

fn rotated_registry() -> KeyRegistry {
    KeyRegistry::new(FACTORY_KEY, vec![SECRET_KEY_V1, SECRET_V2], 2).unwrap()
}

#[test]
fn test_rotated_registry_cannot_use_old_card_before_reset() {
    let mut play = with_keys(v1_card(40), rotated_registry());

    let err = play.get_points().unwrap_err();
    assert!(matches!(
        err,
        CardError::AuthFailed {
            sector: 6,
            role: KeyRole::B,
            ..
        }
    ));
}

#[test]
fn test_reset_rekeys_card_to_current_version() {
    let mut play = with_keys(v1_card(40), rotated_registry());

    let summary = play.reset(60).unwrap();
    assert_eq!(summary.key_version, 2);
    assert_eq!(play.key_version().unwrap(), 2);
    assert_eq!(play.get_points().unwrap(), 60);

    for sector in 6..16 {
        assert_eq!(play.card().trailer(sector).key_b, SECRET_V2);
    }

    // The version-1 secret no longer opens the card
    let mut old = with_keys(play.into_card(), KeyRegistry::default());
    assert!(matches!(
        old.get_points(),
        Err(CardError::AuthFailed { sector: 6, .. })
    ));
}

#[test]
fn test_reset_twice_after_rotation() {
    let mut play = with_keys(v1_card(1), rotated_registry());
    play.reset(2).unwrap();
    play.reset(3).unwrap();
    assert_eq!(play.get_points().unwrap(), 3);
}

#[test]
fn test_registry_missing_recorded_version() {
    // A registry built for a different deployment knows only one key
    let foreign = KeyRegistry::new(FACTORY_KEY, vec![SECRET_V2], 1).unwrap();
    let mut play = with_keys(v1_card(5), foreign);

    // Version 1 resolves, but to the wrong key
    assert!(matches!(
        play.reset(5),
        Err(CardError::AuthFailed { sector: 6, .. })
    ));
}
