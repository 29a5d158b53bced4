use serde::Deserialize;

use crate::geometry::IslandGeometry;
use crate::repair::excise_field;

/// Claim payload as written by the game, parsed tolerantly: every field
/// has a default so partially-populated documents still decode.
/// `num_settlers` defaults to -1 to distinguish "absent" from "zero".
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawClaim {
    #[serde(rename = "islandId")]
    pub island_id: i64,
    #[serde(rename = "settlementFlagName")]
    pub settlement_flag_name: String,
    #[serde(rename = "ownerTribeId")]
    pub owner_tribe_id: u64,
    #[serde(rename = "ownerName")]
    pub owner_name: String,
    #[serde(rename = "combatPhaseStartTime")]
    pub combat_phase_start_time: i64,
    #[serde(rename = "lastUTCTimeAdjustedCombatPhase")]
    pub last_utc_time_adjusted_combat_phase: i64,
    #[serde(rename = "taxRate")]
    pub tax_rate: f64,
    #[serde(rename = "bIsContested")]
    pub is_contested: bool,
    #[serde(rename = "numSettlers")]
    pub num_settlers: i64,
}

impl Default for RawClaim {
    fn default() -> Self {
        Self {
            island_id: 0,
            settlement_flag_name: String::new(),
            owner_tribe_id: 0,
            owner_name: String::new(),
            combat_phase_start_time: 0,
            last_utc_time_adjusted_combat_phase: 0,
            tax_rate: 0.0,
            is_contested: false,
            num_settlers: -1,
        }
    }
}

/// Parse a claim document, falling back to the two-field excision repair
/// when the straight parse fails. The repaired parse reinserts the
/// sanitized excised text as the field value; a field that could not be
/// located becomes `"<unknown>"`. If the reduced document still does not
/// parse, the error is returned and the record is dropped by the caller.
pub fn parse_claim(raw: &str) -> Result<RawClaim, serde_json::Error> {
    match serde_json::from_str(raw) {
        Ok(claim) => Ok(claim),
        Err(_) => {
            let settlement = excise_field(raw, "settlementFlagName", "ownerTribeId");
            let owner = excise_field(&settlement.document, "ownerName", "combatPhaseStartTime");
            let mut claim: RawClaim = serde_json::from_str(&owner.document)?;
            claim.settlement_flag_name = settlement
                .value
                .unwrap_or_else(|| "<unknown>".to_string());
            claim.owner_name = owner.value.unwrap_or_else(|| "<unknown>".to_string());
            Ok(claim)
        }
    }
}

/// War-declaration payload, keyed by the same island id as the claim it
/// overlays. Declarations with a zero warring tribe or zero start/end are
/// ignored entirely.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct WarDeclaration {
    #[serde(rename = "islandId")]
    pub island_id: i64,
    #[serde(rename = "warringTribeID")]
    pub warring_tribe_id: u64,
    #[serde(rename = "warStartUTC")]
    pub war_start_utc: u32,
    #[serde(rename = "warEndUTC")]
    pub war_end_utc: u32,
}

impl WarDeclaration {
    pub fn is_active(&self) -> bool {
        self.warring_tribe_id != 0 && self.war_start_utc != 0 && self.war_end_utc != 0
    }
}

/// A surviving territory claim with its geometry joined in. Built once per
/// cycle; the only post-construction mutations are the war overlay and the
/// rank color, both applied before the snapshot is assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct TerritoryClaim {
    pub island_id: i64,
    pub owner_tribe_id: u64,
    pub owner_name: String,
    pub settlement_flag_name: String,
    pub combat_phase_start_time: i64,
    pub last_utc_time_adjusted_combat_phase: i64,
    pub tax_rate: f64,
    pub is_contested: bool,
    pub num_settlers: i64,
    pub world_x: f64,
    pub world_y: f64,
    pub radius: f64,
    pub island_points: i64,
    pub color_name: &'static str,
    pub warring_tribe_id: u64,
    pub war_start_utc: u32,
    pub war_end_utc: u32,
}

/// Color claims wear until a rank color is assigned.
pub const UNRANKED_COLOR: &str = "grey";

impl TerritoryClaim {
    /// Join a parsed claim with its island geometry. Returns `None` for
    /// unusable claims: no owner, or an island whose point value is not
    /// positive.
    pub fn resolve(raw: RawClaim, geometry: &IslandGeometry) -> Option<Self> {
        if raw.owner_tribe_id == 0 || geometry.points <= 0 {
            return None;
        }
        Some(TerritoryClaim {
            island_id: raw.island_id,
            owner_tribe_id: raw.owner_tribe_id,
            owner_name: raw.owner_name,
            settlement_flag_name: raw.settlement_flag_name,
            combat_phase_start_time: raw.combat_phase_start_time,
            last_utc_time_adjusted_combat_phase: raw.last_utc_time_adjusted_combat_phase,
            tax_rate: raw.tax_rate,
            is_contested: raw.is_contested,
            num_settlers: raw.num_settlers,
            world_x: geometry.world_x,
            world_y: geometry.world_y,
            radius: geometry.radius,
            island_points: geometry.points,
            color_name: UNRANKED_COLOR,
            warring_tribe_id: 0,
            war_start_utc: 0,
            war_end_utc: 0,
        })
    }

    pub fn apply_war(&mut self, war: &WarDeclaration) {
        self.warring_tribe_id = war.warring_tribe_id;
        self.war_start_utc = war.war_start_utc;
        self.war_end_utc = war.war_end_utc;
    }
}
