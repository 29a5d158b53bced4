use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use atlas_store::{Store, StoreError};
use tracing::{error, info, warn};

use crate::aggregate::aggregate_owners;
use crate::checksum::{sorted_values, ChangeDetector, PayloadDigest};
use crate::claims::{parse_claim, TerritoryClaim, WarDeclaration};
use crate::config::ServiceConfig;
use crate::fetch::fetch_matching;
use crate::geometry::WorldGrid;
use crate::hierarchy::OrphanFilter;
use crate::network::SnapshotServer;
use crate::ranking::{top_owners, RANK_COLORS};
use crate::records::EntityRecord;
use crate::snapshot::{
    build_snapshot, stamp_version, unix_now, EntityMap, Published, TribeNameMap, WorldSnapshot,
};

/// Hash key holding territory-claim JSON values, one field per island id.
pub const CLAIMS_KEY: &str = "islands";
/// Hash key holding war-declaration JSON values, same island-id fields.
pub const WARS_KEY: &str = "islands.war";
/// Scan pattern for per-entity hash records.
pub const ENTITY_PATTERN: &str = "entityinfo:*";
/// Scan pattern for tribe name records.
pub const TRIBE_PATTERN: &str = "tribedata:*";
/// Message published after a successful snapshot publish so game servers
/// re-read the ranking.
pub const RELOAD_NOTIFICATION: &str = "ReloadTopTribes";

/// Everything the service publishes, each surface behind its own slot.
#[derive(Debug, Default)]
pub struct WorldState {
    pub snapshot: Published<WorldSnapshot>,
    pub entities: Published<EntityMap>,
    pub tribes: Published<TribeNameMap>,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug)]
pub enum CycleOutcome {
    /// A new snapshot replaced the previous one.
    Published(Arc<WorldSnapshot>),
    /// The raw payloads were byte-identical to the previous cycle;
    /// aggregation and publish were skipped.
    Unchanged,
}

/// Run one full territory-claim cycle: fetch → parse/repair → war overlay →
/// change-detect → aggregate → rank → publish.
///
/// A claims-fetch failure aborts the cycle (previous snapshot retained); a
/// war-fetch failure only degrades the cycle to claims without war
/// overlays.
pub fn run_colony_cycle<S: Store + ?Sized>(
    store: &S,
    grid: &WorldGrid,
    config: &ServiceConfig,
    detector: &mut ChangeDetector,
    state: &WorldState,
) -> Result<CycleOutcome, StoreError> {
    info!("fetching territory claims");
    let raw_claims = store.hash_fields(CLAIMS_KEY)?;

    let mut digest = PayloadDigest::new();
    let mut claims: Vec<TerritoryClaim> = Vec::new();
    let mut by_island: HashMap<i64, usize> = HashMap::new();

    for (key, value) in sorted_values(&raw_claims) {
        digest.absorb(value.as_bytes());
        let raw = match parse_claim(value) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(island = %key, error = %err, "error parsing island claim");
                continue;
            }
        };
        let Some(geometry) = grid.island(raw.island_id) else {
            continue;
        };
        let Some(claim) = TerritoryClaim::resolve(raw, geometry) else {
            continue;
        };
        by_island.insert(claim.island_id, claims.len());
        claims.push(claim);
    }

    match store.hash_fields(WARS_KEY) {
        Ok(raw_wars) => {
            for (_, value) in sorted_values(&raw_wars) {
                digest.absorb(value.as_bytes());
                let war: WarDeclaration = match serde_json::from_str(value) {
                    Ok(war) => war,
                    Err(_) => {
                        warn!(payload = %value, "invalid war declaration json");
                        continue;
                    }
                };
                if !war.is_active() {
                    continue;
                }
                if let Some(&index) = by_island.get(&war.island_id) {
                    claims[index].apply_war(&war);
                }
            }
        }
        // Claims already gathered survive; the cycle publishes without
        // war overlays rather than aborting.
        Err(err) => {
            warn!(error = %err, "war declarations unavailable, continuing without war data");
        }
    }

    if !detector.observe(digest.finish()) {
        info!("no checksum changes detected");
        return Ok(CycleOutcome::Unchanged);
    }

    let owners = aggregate_owners(&claims);
    let top = top_owners(&owners, config.top_owner_count);
    for (rank, tribe_id) in top.iter().enumerate() {
        let Some(&color) = RANK_COLORS.get(rank) else {
            break;
        };
        if let Some(owner) = owners.get(tribe_id) {
            for &index in &owner.claims {
                claims[index].color_name = color;
            }
        }
    }

    let version = stamp_version(state.snapshot.get().version, unix_now());
    let snapshot = build_snapshot(&claims, &owners, grid.virtual_pixels(), version);
    let published = state.snapshot.replace(snapshot);
    info!(
        version,
        islands = published.islands.len(),
        companies = published.companies.len(),
        "published world snapshot"
    );

    if !config.disable_notifications {
        if let Err(err) = store.publish(&config.notify_channel, RELOAD_NOTIFICATION) {
            warn!(error = %err, "reload notification publish failed");
        }
    }

    Ok(CycleOutcome::Published(published))
}

/// Run one entity/tribe refresh: tribe names first, then the entity batch
/// with hierarchy validation. Either fetch failing aborts the cycle; the
/// surfaces published so far stay current.
pub fn run_entity_cycle<S: Store + ?Sized>(
    store: &S,
    filter: &mut OrphanFilter,
    state: &WorldState,
) -> Result<(), StoreError> {
    let mut tribes: TribeNameMap = HashMap::new();
    for (_, fields) in fetch_matching(store, TRIBE_PATTERN)? {
        let id = fields.get("TribeID").cloned().unwrap_or_default();
        let name = fields.get("TribeName").cloned().unwrap_or_default();
        tribes.insert(id, name);
    }
    state.tribes.replace(tribes);

    let mut entities: EntityMap = HashMap::new();
    for (_, fields) in fetch_matching(store, ENTITY_PATTERN)? {
        let record = EntityRecord::from_fields(&fields);
        entities.insert(record.entity_id.clone(), record);
    }
    filter.retain_valid(&mut entities);
    state.entities.replace(entities);
    Ok(())
}

/// Long-lived claim poller: one cycle per interval, no overlap, failed
/// cycles logged and retried at the next tick. Published snapshots are
/// also handed to the broadcast server when one is running.
pub fn spawn_colony_loop<S: Store + 'static>(
    store: Arc<S>,
    grid: Arc<WorldGrid>,
    config: ServiceConfig,
    state: Arc<WorldState>,
    broadcast: Option<Arc<SnapshotServer>>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let interval = Duration::from_secs(config.colony_fetch_rate_secs);
        let mut detector = ChangeDetector::new();
        loop {
            match run_colony_cycle(store.as_ref(), &grid, &config, &mut detector, &state) {
                Ok(CycleOutcome::Published(snapshot)) => {
                    if let Some(server) = &broadcast {
                        match serde_json::to_vec(snapshot.as_ref()) {
                            Ok(frame) => server.broadcast(&frame),
                            Err(err) => error!(error = %err, "failed to encode snapshot frame"),
                        }
                    }
                }
                Ok(CycleOutcome::Unchanged) => {}
                Err(err) => {
                    error!(error = %err, "colony cycle aborted, keeping previous snapshot");
                }
            }
            thread::sleep(interval);
        }
    })
}

/// Long-lived entity/tribe poller on its own interval.
pub fn spawn_entity_loop<S: Store + 'static>(
    store: Arc<S>,
    config: ServiceConfig,
    state: Arc<WorldState>,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let interval = Duration::from_secs(config.entity_fetch_rate_secs);
        let mut filter = OrphanFilter::new();
        loop {
            if let Err(err) = run_entity_cycle(store.as_ref(), &mut filter, &state) {
                error!(error = %err, "entity cycle aborted, keeping previous maps");
            }
            thread::sleep(interval);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_store::{MemoryStore, ScanPage};
    use crate::geometry::IslandGeometry;

    fn grid() -> WorldGrid {
        WorldGrid::from_islands(
            100.0,
            10,
            10,
            [
                island(1, 10),
                island(2, 20),
                island(3, 5),
                island(4, -1),
            ],
        )
    }

    fn island(id: i64, points: i64) -> IslandGeometry {
        IslandGeometry {
            id,
            world_x: 1000.0 * id as f64,
            world_y: 2000.0 * id as f64,
            radius: 50.0,
            points,
        }
    }

    fn claim_json(island_id: i64, owner: u64, name: &str) -> String {
        format!(
            r#"{{"islandId":{island_id},"settlementFlagName":"flag","ownerTribeId":{owner},"ownerName":"{name}","combatPhaseStartTime":1,"taxRate":0.1,"bIsContested":false,"numSettlers":3}}"#
        )
    }

    fn config() -> ServiceConfig {
        ServiceConfig::default()
    }

    fn seeded_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.set_hash_field(CLAIMS_KEY, "1", &claim_json(1, 100, "Alpha"));
        store.set_hash_field(CLAIMS_KEY, "2", &claim_json(2, 200, "Beta"));
        store.set_hash_field(CLAIMS_KEY, "3", &claim_json(3, 100, "Alpha"));
        store
    }

    #[test]
    fn full_cycle_publishes_consistent_snapshot() {
        let store = seeded_store();
        let state = WorldState::new();
        let mut detector = ChangeDetector::new();
        let outcome =
            run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();

        let snapshot = match outcome {
            CycleOutcome::Published(snapshot) => snapshot,
            CycleOutcome::Unchanged => panic!("first cycle must publish"),
        };
        assert_eq!(snapshot.islands.len(), 3);
        assert_eq!(snapshot.companies.len(), 2);
        // Owner totals equal the sum of their surviving claims' points.
        let alpha = snapshot
            .islands
            .iter()
            .filter(|i| i.tribe_id == 100)
            .map(|i| i.island_points)
            .sum::<i64>();
        assert_eq!(alpha, 15);
        // Both owners rank, so both get rank colors: Beta (20) over Alpha (15).
        let beta_island = snapshot.islands.iter().find(|i| i.tribe_id == 200).unwrap();
        assert_eq!(beta_island.color, "lime");
        assert!(snapshot
            .islands
            .iter()
            .filter(|i| i.tribe_id == 100)
            .all(|i| i.color == "blue"));
    }

    #[test]
    fn unchanged_payloads_skip_aggregation() {
        let store = seeded_store();
        let state = WorldState::new();
        let mut detector = ChangeDetector::new();
        let first =
            run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();
        assert!(matches!(first, CycleOutcome::Published(_)));
        let version = state.snapshot.get().version;

        let second =
            run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();
        assert!(matches!(second, CycleOutcome::Unchanged));
        assert_eq!(state.snapshot.get().version, version);

        // A content change re-publishes with a strictly larger version.
        store.set_hash_field(CLAIMS_KEY, "2", &claim_json(2, 300, "Gamma"));
        let third =
            run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();
        assert!(matches!(third, CycleOutcome::Published(_)));
        assert!(state.snapshot.get().version > version);
    }

    #[test]
    fn zero_point_and_unknown_islands_are_excluded() {
        let store = seeded_store();
        store.set_hash_field(CLAIMS_KEY, "4", &claim_json(4, 100, "Alpha"));
        store.set_hash_field(CLAIMS_KEY, "99", &claim_json(99, 100, "Alpha"));
        let state = WorldState::new();
        let mut detector = ChangeDetector::new();
        run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();

        let snapshot = state.snapshot.get();
        assert!(snapshot.islands.iter().all(|i| i.island_id != 4));
        assert!(snapshot.islands.iter().all(|i| i.island_id != 99));
        let alpha = snapshot
            .companies
            .iter()
            .find(|c| c.tribe_id == 100)
            .unwrap();
        // Alpha's total is unchanged by its excluded claims.
        let total: i64 = snapshot
            .islands
            .iter()
            .filter(|i| i.tribe_id == 100)
            .map(|i| i.island_points)
            .sum();
        assert_eq!(total, 15);
        assert_eq!(alpha.tribe_name, "Alpha");
    }

    #[test]
    fn war_overlays_merge_onto_claims() {
        let store = seeded_store();
        store.set_hash_field(
            WARS_KEY,
            "2",
            r#"{"islandId":2,"warringTribeID":555,"warStartUTC":10,"warEndUTC":20}"#,
        );
        store.set_hash_field(
            WARS_KEY,
            "1",
            r#"{"islandId":1,"warringTribeID":0,"warStartUTC":10,"warEndUTC":20}"#,
        );
        let state = WorldState::new();
        let mut detector = ChangeDetector::new();
        run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();

        let snapshot = state.snapshot.get();
        let island2 = snapshot.islands.iter().find(|i| i.island_id == 2).unwrap();
        assert_eq!(island2.warring_tribe_id, 555);
        assert_eq!(island2.war_start_utc, 10);
        // Zero-valued declarations are ignored entirely.
        let island1 = snapshot.islands.iter().find(|i| i.island_id == 1).unwrap();
        assert_eq!(island1.warring_tribe_id, 0);
    }

    /// Store whose war-key fetch always fails.
    struct WarlessStore(MemoryStore);

    impl Store for WarlessStore {
        fn scan_page(
            &self,
            cursor: u64,
            pattern: &str,
            count: usize,
        ) -> Result<ScanPage, StoreError> {
            self.0.scan_page(cursor, pattern, count)
        }

        fn hash_fields(
            &self,
            key: &str,
        ) -> Result<std::collections::HashMap<String, String>, StoreError> {
            if key == WARS_KEY {
                return Err(StoreError::Fetch {
                    key: key.to_string(),
                    reason: "connection reset".to_string(),
                });
            }
            self.0.hash_fields(key)
        }

        fn hash_fields_many(
            &self,
            keys: &[String],
        ) -> Result<Vec<std::collections::HashMap<String, String>>, StoreError> {
            self.0.hash_fields_many(keys)
        }

        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.0.get(key)
        }

        fn publish(&self, channel: &str, message: &str) -> Result<u64, StoreError> {
            self.0.publish(channel, message)
        }
    }

    #[test]
    fn war_fetch_failure_degrades_instead_of_aborting() {
        let store = WarlessStore(seeded_store());
        let state = WorldState::new();
        let mut detector = ChangeDetector::new();
        let outcome =
            run_colony_cycle(&store, &grid(), &config(), &mut detector, &state).unwrap();
        assert!(matches!(outcome, CycleOutcome::Published(_)));
        let snapshot = state.snapshot.get();
        assert_eq!(snapshot.islands.len(), 3);
        assert!(snapshot.islands.iter().all(|i| i.warring_tribe_id == 0));
    }

    #[test]
    fn claims_fetch_failure_aborts_and_retains_snapshot() {
        struct BrokenStore;
        impl Store for BrokenStore {
            fn scan_page(&self, _: u64, _: &str, _: usize) -> Result<ScanPage, StoreError> {
                Err(StoreError::Connection("down".to_string()))
            }
            fn hash_fields(
                &self,
                key: &str,
            ) -> Result<std::collections::HashMap<String, String>, StoreError> {
                Err(StoreError::Fetch {
                    key: key.to_string(),
                    reason: "down".to_string(),
                })
            }
            fn hash_fields_many(
                &self,
                _: &[String],
            ) -> Result<Vec<std::collections::HashMap<String, String>>, StoreError> {
                Err(StoreError::Connection("down".to_string()))
            }
            fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
                Ok(None)
            }
            fn publish(&self, _: &str, _: &str) -> Result<u64, StoreError> {
                Ok(0)
            }
        }

        let state = WorldState::new();
        let mut detector = ChangeDetector::new();

        // Seed a good snapshot first.
        let good = seeded_store();
        run_colony_cycle(&good, &grid(), &config(), &mut detector, &state).unwrap();
        let version = state.snapshot.get().version;

        let result = run_colony_cycle(&BrokenStore, &grid(), &config(), &mut detector, &state);
        assert!(result.is_err());
        assert_eq!(state.snapshot.get().version, version);
    }

    #[test]
    fn notification_publishes_after_snapshot() {
        let store = seeded_store();
        let state = WorldState::new();
        let mut detector = ChangeDetector::new();
        let mut config = config();
        config.disable_notifications = false;
        run_colony_cycle(&store, &grid(), &config, &mut detector, &state).unwrap();
        assert_eq!(
            store.published_messages(),
            vec![(config.notify_channel.clone(), RELOAD_NOTIFICATION.to_string())]
        );
    }

    #[test]
    fn entity_cycle_publishes_validated_maps() {
        let store = MemoryStore::new();
        store.set_hash_field("tribedata:7", "TribeID", "7");
        store.set_hash_field("tribedata:7", "TribeName", "Sea Dogs");
        for (id, parent) in [("10", "0"), ("11", "10"), ("12", "999")] {
            let key = format!("entityinfo:{id}");
            store.set_hash_field(&key, "EntityID", id);
            store.set_hash_field(&key, "ParentEntityID", parent);
            store.set_hash_field(&key, "EntityClass", "Ship_Sloop_C");
        }

        let state = WorldState::new();
        let mut filter = OrphanFilter::new();
        run_entity_cycle(&store, &mut filter, &state).unwrap();

        let tribes = state.tribes.get();
        assert_eq!(tribes.get("7").map(String::as_str), Some("Sea Dogs"));

        let entities = state.entities.get();
        assert!(entities.contains_key("10"));
        assert!(entities.contains_key("11"));
        assert!(!entities.contains_key("12"));
        assert_eq!(
            entities["10"].entity_sub_type,
            crate::records::VesselClass::Sloop
        );
    }
}
