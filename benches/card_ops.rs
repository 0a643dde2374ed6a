//! Benchmarks for card operations against the emulator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use playcard_rs::core::value;
use playcard_rs::{pad_sequence, InMemoryCard, PlayCard, PlayCardBuilder, Uid};

fn configured() -> PlayCard<InMemoryCard> {
    let card = InMemoryCard::with_uid(Uid::new(vec![0xB0, 0x0C, 0xAF, 0xE0]));
    let uid = card.uid().clone();
    let mut play = PlayCardBuilder::new().without_tracing().build(card, uid);
    play.configure(1_000_000).unwrap();
    play
}

fn benchmark_value_codec(c: &mut Criterion) {
    let block = value::encode(123_456, 24);

    c.bench_function("value_encode", |b| {
        b.iter(|| value::encode(black_box(-42), black_box(24)))
    });
    c.bench_function("value_decode", |b| b.iter(|| value::decode(black_box(&block))));
}

fn benchmark_configure(c: &mut Criterion) {
    c.bench_function("configure_factory_card", |b| {
        b.iter(|| {
            let card = InMemoryCard::with_uid(Uid::new(vec![1, 2, 3, 4]));
            let uid = card.uid().clone();
            let mut play = PlayCardBuilder::new().without_tracing().build(card, uid);
            black_box(play.configure(100).unwrap());
        })
    });
}

fn benchmark_ledger(c: &mut Criterion) {
    let mut play = configured();

    c.bench_function("add_then_charge_points", |b| {
        b.iter(|| {
            play.add_points(black_box(5)).unwrap();
            black_box(play.charge_points(5).unwrap())
        })
    });
    c.bench_function("check_status", |b| {
        b.iter(|| black_box(play.check_status().unwrap()))
    });
}

fn benchmark_sequence_game(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_game_win");

    for len in [1usize, 8, 15].iter() {
        let bytes: Vec<u8> = (1..=*len as u8).collect();
        let sequence = pad_sequence(&bytes).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, _| {
            let mut play = configured();
            b.iter(|| {
                play.init_sequence(&sequence, 1).unwrap();
                for byte in &bytes {
                    black_box(play.check_sequence(*byte).unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_value_codec,
    benchmark_configure,
    benchmark_ledger,
    benchmark_sequence_game
);
criterion_main!(benches);
