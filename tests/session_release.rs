//! Every operation leaves the card halted and de-authenticated

use playcard_rs::{
    pad_sequence, AuditTrail, CardEvent, InMemoryCard, PlayCard, PlayCardBuilder, ReaderStatus, Uid,
};
use std::sync::Arc;

fn play() -> (PlayCard<InMemoryCard>, Arc<AuditTrail>) {
    let card = InMemoryCard::with_uid(Uid::new(vec![0x31, 0x41, 0x59, 0x26]));
    let uid = card.uid().clone();
    let trail = Arc::new(AuditTrail::new(8192));
    let play = PlayCardBuilder::new()
        .without_tracing()
        .sink(trail.clone())
        .build(card, uid);
    (play, trail)
}

fn assert_released(play: &PlayCard<InMemoryCard>, halts: usize) {
    assert_eq!(play.card().halt_count(), halts);
    assert_eq!(play.card().stop_crypto_count(), halts);
    assert!(play.card().is_halted());
    assert!(!play.card().is_authenticated());
}

#[test]
fn test_success_and_domain_errors_release_card() {
    let (mut play, _) = play();
    let mut halts = 0;

    play.configure(10).unwrap();
    halts += 1;
    assert_released(&play, halts);

    let results: Vec<bool> = vec![
        play.check_status().is_ok(),
        play.get_points().is_ok(),
        play.add_points(1).is_ok(),
        play.charge_points(1000).is_ok(),
        play.get_rewards().is_ok(),
        play.add_rewards(2).is_ok(),
        play.charge_rewards(3).is_ok(),
        play.check_sequence(1).is_ok(),
        play.init_sequence(&[1; 16], 1).is_ok(),
        play.init_sequence(&pad_sequence(&[1]).unwrap(), 1).is_ok(),
        play.check_sequence(1).is_ok(),
        play.add_points(-1).is_ok(),
        play.reset(10).is_ok(),
    ];
    halts += results.len();

    assert_eq!(
        results,
        vec![true, true, true, false, true, true, false, false, false, true, true, true, true]
    );
    assert_released(&play, halts);
}

#[test]
fn test_hardware_errors_release_card() {
    let (mut play, _) = play();
    play.configure(10).unwrap();

    play.card_mut().fail_writes_after(0, ReaderStatus::Error);
    assert!(play.add_points(5).is_err());
    assert_released(&play, 2);

    play.card_mut().clear_faults();
    play.card_mut().fail_auth(ReaderStatus::Collision);
    assert!(play.check_status().is_err());
    assert_released(&play, 3);

    play.card_mut().clear_faults();
    assert_eq!(play.get_points().unwrap(), 10);
}

#[test]
fn test_failed_halt_is_recorded() {
    let (mut play, trail) = play();
    play.configure(10).unwrap();
    play.card_mut().fail_halt(ReaderStatus::Timeout);

    // The operation itself completed
    assert_eq!(play.get_points().unwrap(), 10);
    assert!(matches!(
        trail.events().last(),
        Some(CardEvent::SessionReleased { halted: false, .. })
    ));
    assert_eq!(play.card().halt_count(), 2);
    assert!(!play.card().is_authenticated());
}

#[test]
fn test_every_session_is_bracketed() {
    let (mut play, trail) = play();
    play.configure(10).unwrap();
    play.charge_points(50).unwrap_err();
    play.get_rewards().unwrap();

    let mut open = 0;
    for event in trail.events() {
        match event {
            CardEvent::SessionOpened { .. } => {
                assert_eq!(open, 0, "sessions must not nest");
                open += 1;
            }
            CardEvent::SessionReleased { .. } => {
                assert_eq!(open, 1);
                open -= 1;
            }
            _ => assert_eq!(open, 1, "event outside a session"),
        }
    }
    assert_eq!(open, 0);
}
