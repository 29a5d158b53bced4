use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::aggregate::OwnerAggregate;
use crate::claims::TerritoryClaim;
use crate::records::EntityRecord;

/// Entity map as served to readers: entity id → record.
pub type EntityMap = HashMap<String, EntityRecord>;

/// Tribe id → display name, refreshed alongside the entity map.
pub type TribeNameMap = HashMap<String, String>;

/// One island in the published snapshot. Positions and size are divided by
/// the virtual-pixel scale at publish time, not stored pre-scaled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IslandInfo {
    #[serde(rename = "IslandID")]
    pub island_id: i64,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Size")]
    pub size: f64,
    #[serde(rename = "TribeId")]
    pub tribe_id: u64,
    #[serde(rename = "Color")]
    pub color: String,
    #[serde(rename = "IslandPoints")]
    pub island_points: i64,
    #[serde(rename = "SettlementName")]
    pub settlement_name: String,
    #[serde(rename = "TaxRate")]
    pub tax_rate: f64,
    #[serde(rename = "CombatPhaseStartTime")]
    pub combat_phase_start_time: i64,
    #[serde(rename = "WarringTribeID")]
    pub warring_tribe_id: u64,
    #[serde(rename = "WarStartUTC")]
    pub war_start_utc: u32,
    #[serde(rename = "WarEndUTC")]
    pub war_end_utc: u32,
    #[serde(rename = "NumSettlers")]
    pub num_settlers: i64,
}

/// One owning company in the published snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompanyInfo {
    #[serde(rename = "TribeId")]
    pub tribe_id: u64,
    #[serde(rename = "TribeName")]
    pub tribe_name: String,
    #[serde(rename = "FlagURL")]
    pub flag_url: Option<String>,
}

/// The complete published result of one aggregation cycle. Immutable once
/// built; readers always see a whole snapshot, never a partial one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct WorldSnapshot {
    pub version: i64,
    #[serde(rename = "Islands")]
    pub islands: Vec<IslandInfo>,
    #[serde(rename = "Companies")]
    pub companies: Vec<CompanyInfo>,
}

/// Version stamp for the next publish: wall-clock seconds, clamped so the
/// sequence stays strictly increasing even if the clock does not advance
/// (or steps backwards) between cycles.
pub fn stamp_version(previous: i64, now: i64) -> i64 {
    now.max(previous + 1)
}

pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

/// Assemble the output document from the cycle's claims and owner
/// aggregates. Owners are walked in id order so the document is
/// deterministic for identical input.
pub fn build_snapshot(
    claims: &[TerritoryClaim],
    owners: &HashMap<u64, OwnerAggregate>,
    virtual_pixels: f64,
    version: i64,
) -> WorldSnapshot {
    let mut islands = Vec::with_capacity(claims.len());
    let mut companies = Vec::with_capacity(owners.len());

    let mut owner_ids: Vec<u64> = owners.keys().copied().collect();
    owner_ids.sort_unstable();

    for tribe_id in owner_ids {
        let owner = &owners[&tribe_id];
        let mut name = owner.name.clone();
        for &index in &owner.claims {
            let claim = &claims[index];
            if name.is_empty() {
                name = claim.owner_name.clone();
            }
            islands.push(IslandInfo {
                island_id: claim.island_id,
                x: claim.world_x / virtual_pixels,
                y: claim.world_y / virtual_pixels,
                size: claim.radius / virtual_pixels,
                tribe_id: claim.owner_tribe_id,
                color: claim.color_name.to_string(),
                island_points: claim.island_points,
                settlement_name: claim.settlement_flag_name.clone(),
                tax_rate: claim.tax_rate,
                combat_phase_start_time: claim.combat_phase_start_time,
                warring_tribe_id: claim.warring_tribe_id,
                war_start_utc: claim.war_start_utc,
                war_end_utc: claim.war_end_utc,
                num_settlers: claim.num_settlers,
            });
        }
        companies.push(CompanyInfo {
            tribe_id,
            tribe_name: name,
            flag_url: owner.flag_url.clone(),
        });
    }

    WorldSnapshot {
        version,
        islands,
        companies,
    }
}

/// Reader-facing slot for a published value. Writers build the replacement
/// off to the side and hold the write lock only for the pointer swap, so
/// any number of concurrent readers see either the old complete value or
/// the new one.
#[derive(Debug)]
pub struct Published<T> {
    slot: RwLock<Arc<T>>,
}

impl<T: Default> Default for Published<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> Published<T> {
    pub fn new(initial: T) -> Self {
        Self {
            slot: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn get(&self) -> Arc<T> {
        self.slot
            .read()
            .expect("published slot lock poisoned")
            .clone()
    }

    pub fn replace(&self, value: T) -> Arc<T> {
        let next = Arc::new(value);
        let mut guard = self.slot.write().expect("published slot lock poisoned");
        *guard = next.clone();
        next
    }
}
