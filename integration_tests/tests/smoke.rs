mod common;

use guild_core::{build_headless_app, run_tick, RaidConfigHandle, RaidRegistry, SimInstant};

#[test]
fn app_initializes_with_fixture_config() {
    common::ensure_test_config();
    let mut app = build_headless_app();
    assert!(run_tick(&mut app, SimInstant::from_secs(1)).is_empty());

    let config = app.world.resource::<RaidConfigHandle>().get();
    assert_eq!(config.preparation_seconds(), 2);
    assert_eq!(app.world.resource::<RaidRegistry>().limits().max_attackers, 4);
}
