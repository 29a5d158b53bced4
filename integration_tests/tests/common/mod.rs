use atlas_store::MemoryStore;
use core_atlas::geometry::{IslandGeometry, WorldGrid};

/// Grid of five islands; island 5 carries the non-positive-points
/// sentinel and must never appear in output.
pub fn test_grid() -> WorldGrid {
    let islands = (1..=5).map(|id| IslandGeometry {
        id,
        world_x: 10_000.0 * id as f64,
        world_y: 20_000.0 * id as f64,
        radius: 500.0,
        points: if id == 5 { -1 } else { 10 * id },
    });
    WorldGrid::from_islands(1_400_000.0, 2, 2, islands)
}

pub fn claim_json(island_id: i64, owner: u64, owner_name: &str) -> String {
    format!(
        r#"{{"islandId":{island_id},"settlementFlagName":"Settlement {island_id}","ownerTribeId":{owner},"ownerName":"{owner_name}","combatPhaseStartTime":1700000000,"lastUTCTimeAdjustedCombatPhase":1699999000,"taxRate":0.15,"bIsContested":false,"numSettlers":8}}"#
    )
}

pub fn store_with_claims(claims: &[(i64, u64, &str)]) -> MemoryStore {
    let store = MemoryStore::new();
    for &(island, owner, name) in claims {
        store.set_hash_field("islands", &island.to_string(), &claim_json(island, owner, name));
    }
    store
}
