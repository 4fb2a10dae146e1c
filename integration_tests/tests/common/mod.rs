#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Once;

use guild_core::{Cell, FactionId, ParticipantId, TerritoryRegistry};

static INIT: Once = Once::new();

pub fn ensure_test_config() {
    INIT.call_once(|| {
        let config_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join("test_raid_config.json");

        debug_assert!(
            config_path.exists(),
            "missing test raid config at {}",
            config_path.display()
        );

        std::env::set_var("RAID_CONFIG_PATH", &config_path);
    });
}

pub fn faction(name: &str) -> FactionId {
    FactionId::new(name)
}

pub fn participant(id: u64) -> ParticipantId {
    ParticipantId(id)
}

/// Claim a straight east-west strip of `len` cells starting at the origin.
pub fn claim_strip(territory: &mut TerritoryRegistry, owner: &FactionId, len: i32) {
    for x in 0..len {
        territory
            .claim(Cell::new(x, 0), owner.clone())
            .expect("strip claims are adjacent");
    }
}
