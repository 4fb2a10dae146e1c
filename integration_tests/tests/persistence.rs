mod common;

use std::fs;
use std::sync::Arc;

use common::{claim_strip, faction, participant};
use guild_core::{
    build_headless_app_with, FactionDirectory, FactionRoster, RaidConfig, RaidRegistry,
    ServerConfig, SimInstant, SnapshotStore, TerritoryRegistry,
};

#[test]
fn saved_world_restores_into_new_app() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SnapshotStore::new(dir.path());
    let config = Arc::new(RaidConfig::default());
    let north = faction("north");

    let mut app = build_headless_app_with(
        ServerConfig::default(),
        Arc::clone(&config),
        store.load_all(),
    );
    {
        let world = &mut app.world;
        world
            .resource_mut::<FactionRoster>()
            .found(north.clone(), participant(1))?;
        world
            .resource_mut::<FactionRoster>()
            .found(faction("south"), participant(2))?;
        claim_strip(&mut world.resource_mut::<TerritoryRegistry>(), &north, 3);
        let mut raids = world.resource_mut::<RaidRegistry>();
        let raid = raids.create(north.clone(), participant(2), &faction("south"))?;
        raids.start(raid, SimInstant::from_secs(500))?;
    }
    store.save_world(&mut app.world)?;

    let restored = build_headless_app_with(ServerConfig::default(), config, store.load_all());
    let world = &restored.world;
    assert_eq!(world.resource::<TerritoryRegistry>().territory_count(&north), 3);
    assert_eq!(
        world.resource::<FactionRoster>().faction_of(participant(1)),
        Some(&north)
    );
    let raids = world.resource::<RaidRegistry>();
    let raid = raids
        .get_by_defender(&north)
        .expect("raid survives restart");
    assert_eq!(raid.phase().started_at(), Some(SimInstant::from_secs(500)));
    assert_eq!(raids.get_by_participant(participant(2)).map(|r| r.id()), Some(raid.id()));
    Ok(())
}

#[test]
fn unreadable_blobs_start_empty() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    for blob in ["territory.bin", "raids.bin", "factions.bin"] {
        fs::write(dir.path().join(blob), b"\x01\x02garbage")?;
    }
    let state = SnapshotStore::new(dir.path()).load_all();
    assert!(state.territory.is_empty());
    assert!(state.raids.raids.is_empty());
    assert!(state.roster.is_empty());
    Ok(())
}

#[test]
fn fixture_config_parses_like_the_loader_expects() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("raid.json");
    let document = serde_json::json!({ "preparation_seconds": 15, "max_concurrent_raids": 1 });
    fs::write(&path, serde_json::to_vec_pretty(&document)?)?;

    let config = RaidConfig::from_file(&path)?;
    assert_eq!(config.preparation_seconds(), 15);
    assert_eq!(config.max_concurrent_raids(), 1);
    assert_eq!(config.max_attackers(), RaidConfig::default().max_attackers());
    Ok(())
}
