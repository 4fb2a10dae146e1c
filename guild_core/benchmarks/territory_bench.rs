use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use guild_core::{Cell, FactionId, ParticipantId, RaidConfig, RaidRegistry, SimInstant, TerritoryRegistry};

/// Square block of `side * side` cells owned by one faction.
fn claimed_block(side: i32) -> TerritoryRegistry {
    let owner = FactionId::new("bench");
    let mut territory = TerritoryRegistry::default();
    for x in 0..side {
        for z in 0..side {
            territory
                .claim(Cell::new(x, z), owner.clone())
                .expect("row-major claims stay adjacent");
        }
    }
    territory
}

fn bench_territory(c: &mut Criterion) {
    let mut group = c.benchmark_group("territory");

    for side in [8i32, 32, 128] {
        group.bench_with_input(BenchmarkId::new("claim_block", side), &side, |b, &side| {
            b.iter(|| claimed_block(black_box(side)))
        });

        let territory = claimed_block(side);
        group.bench_with_input(BenchmarkId::new("owner_of", side), &side, |b, &side| {
            b.iter(|| {
                let mut owned = 0usize;
                for x in -1..=side {
                    if territory.owner_of(Cell::new(x, side / 2)).is_some() {
                        owned += 1;
                    }
                }
                black_box(owned)
            })
        });

        group.bench_with_input(BenchmarkId::new("release_edge", side), &side, |b, &side| {
            b.iter_batched(
                || claimed_block(side),
                |mut territory| {
                    for z in (0..side).rev() {
                        territory.release(Cell::new(side - 1, z));
                    }
                    territory
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

fn bench_raid_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("raids");

    for count in [1usize, 16, 64] {
        group.bench_with_input(BenchmarkId::new("advance_all", count), &count, |b, &count| {
            let config = RaidConfig::default()
                .with_preparation_seconds(1)
                .with_max_concurrent_raids(count);
            b.iter_batched(
                || {
                    let mut raids = RaidRegistry::new(&config);
                    let attackers = FactionId::new("raiders");
                    for index in 0..count {
                        let id = raids
                            .create(
                                FactionId::new(format!("target{index}")),
                                ParticipantId(index as u64),
                                &attackers,
                            )
                            .expect("distinct defenders and attackers");
                        raids
                            .start(id, SimInstant::from_secs(0))
                            .expect("forming raid starts");
                    }
                    raids
                },
                |mut raids| black_box(raids.advance_all(SimInstant::from_secs(5))),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

criterion_group!(territory_benches, bench_territory, bench_raid_tick);
criterion_main!(territory_benches);
