use std::collections::HashMap;
use std::num::ParseIntError;

use serde::ser::SerializeTuple;
use serde::{Serialize, Serializer};

/// Vessel subtype derived from the free-text entity class string.
///
/// The wire spelling `Dingy` is kept as-is: downstream consumers match on
/// it, typo and all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VesselClass {
    #[default]
    None,
    Brigantine,
    Dinghy,
    Raft,
    Sloop,
    Schooner,
    Galleon,
}

/// Substring classification table. Order matters: the first matching entry
/// wins, so `none` shadows anything that happens to contain it.
const CLASS_TABLE: [(&str, VesselClass); 7] = [
    ("none", VesselClass::None),
    ("brigantine", VesselClass::Brigantine),
    ("dinghy", VesselClass::Dinghy),
    ("raft", VesselClass::Raft),
    ("sloop", VesselClass::Sloop),
    ("schooner", VesselClass::Schooner),
    ("galleon", VesselClass::Galleon),
];

impl VesselClass {
    pub fn classify(class: &str) -> Self {
        let lowered = class.to_lowercase();
        for (needle, subtype) in CLASS_TABLE {
            if lowered.contains(needle) {
                return subtype;
            }
        }
        VesselClass::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VesselClass::None => "None",
            VesselClass::Brigantine => "Brigantine",
            VesselClass::Dinghy => "Dingy",
            VesselClass::Raft => "Raft",
            VesselClass::Sloop => "Sloop",
            VesselClass::Schooner => "Schooner",
            VesselClass::Galleon => "Galleon",
        }
    }
}

impl Serialize for VesselClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Two-part origin-server identifier. Servers sit on a 2D grid; the packed
/// form is a 32-bit value with the X coordinate in the high 16 bits and Y
/// in the low 16 bits, stored in the database as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerId {
    pub x: u16,
    pub y: u16,
}

impl ServerId {
    pub fn pack(self) -> u32 {
        (u32::from(self.x) << 16) | u32::from(self.y)
    }

    /// Unpack the stored decimal string: interpret it as a 32-bit
    /// little-endian value and split into the low (Y) and high (X) halves.
    pub fn unpack(packed: &str) -> Result<Self, ParseIntError> {
        let id: u32 = packed.parse()?;
        let bytes = id.to_le_bytes();
        Ok(ServerId {
            y: u16::from_le_bytes([bytes[0], bytes[1]]),
            x: u16::from_le_bytes([bytes[2], bytes[3]]),
        })
    }
}

// The wire form is a two-element array, low half first.
impl Serialize for ServerId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.y)?;
        tuple.serialize_element(&self.x)?;
        tuple.end()
    }
}

/// A mobile entity (vessel, bed, …) as published to readers. Rebuilt fresh
/// from raw field sets every poll cycle and never mutated afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntityRecord {
    #[serde(rename = "EntityID")]
    pub entity_id: String,
    #[serde(rename = "ParentEntityID")]
    pub parent_entity_id: String,
    #[serde(rename = "EntityName")]
    pub entity_name: String,
    #[serde(rename = "EntityType")]
    pub entity_type: String,
    #[serde(rename = "EntitySubType")]
    pub entity_sub_type: VesselClass,
    #[serde(rename = "TribeID")]
    pub tribe_id: String,
    #[serde(rename = "ServerXRelativeLocation")]
    pub server_x_relative_location: f64,
    #[serde(rename = "ServerYRelativeLocation")]
    pub server_y_relative_location: f64,
    #[serde(rename = "ServerID")]
    pub server_id: ServerId,
    #[serde(rename = "LastUpdatedDBAt")]
    pub last_updated_db_at: u64,
    #[serde(rename = "NextAllowedUseTime")]
    pub next_allowed_use_time: u64,
}

fn field<'a>(fields: &'a HashMap<String, String>, name: &str) -> &'a str {
    fields.get(name).map(String::as_str).unwrap_or_default()
}

/// Canonical field name first, then the legacy spelling, then empty.
fn field_aliased<'a>(
    fields: &'a HashMap<String, String>,
    canonical: &str,
    legacy: &str,
) -> &'a str {
    match fields.get(canonical) {
        Some(value) => value,
        None => field(fields, legacy),
    }
}

impl EntityRecord {
    /// Normalize a raw field set into a typed record. Never fails: missing
    /// fields become empty strings, unparseable numerics become zero, and
    /// an undecodable server id collapses to (0, 0).
    pub fn from_fields(fields: &HashMap<String, String>) -> Self {
        let class = fields
            .get("EntityClass")
            .map(String::as_str)
            .unwrap_or("none");

        EntityRecord {
            entity_id: field(fields, "EntityID").to_string(),
            parent_entity_id: field(fields, "ParentEntityID").to_string(),
            entity_name: field(fields, "EntityName").to_string(),
            entity_type: field(fields, "EntityType").to_string(),
            entity_sub_type: VesselClass::classify(class),
            tribe_id: field_aliased(fields, "TribeID", "TribeId").to_string(),
            server_x_relative_location: field(fields, "ServerXRelativeLocation")
                .parse()
                .unwrap_or_default(),
            server_y_relative_location: field(fields, "ServerYRelativeLocation")
                .parse()
                .unwrap_or_default(),
            server_id: ServerId::unpack(field_aliased(fields, "ServerID", "ServerId"))
                .unwrap_or_default(),
            last_updated_db_at: field(fields, "LastUpdatedDBAt").parse().unwrap_or_default(),
            next_allowed_use_time: field(fields, "NextAllowedUseTime")
                .parse()
                .unwrap_or_default(),
        }
    }
}
