//! Core aggregation crate for the Atlas world-state service.
//!
//! Polls raw per-entity and territory-claim state out of a key-value store,
//! reconciles it into a consistent snapshot with owner rankings, and
//! publishes the result for concurrent readers. One full poll cycle runs
//! fetch → normalize → validate → change-detect → aggregate → rank →
//! publish; see [`pipeline`] for the cycle drivers.

pub mod aggregate;
pub mod checksum;
pub mod claims;
pub mod config;
pub mod fetch;
pub mod geometry;
pub mod hierarchy;
pub mod network;
pub mod pipeline;
pub mod ranking;
pub mod records;
mod repair;
pub mod snapshot;

pub use aggregate::{aggregate_owners, OwnerAggregate};
pub use checksum::{ChangeDetector, PayloadDigest};
pub use claims::{parse_claim, TerritoryClaim, WarDeclaration};
pub use config::{ConfigError, ServiceConfig};
pub use fetch::{fetch_matching, MAX_FETCH_BATCH};
pub use geometry::{GeometryError, IslandGeometry, WorldGrid};
pub use hierarchy::OrphanFilter;
pub use pipeline::{run_colony_cycle, run_entity_cycle, CycleOutcome, WorldState};
pub use ranking::{top_owners, RANK_COLORS};
pub use records::{EntityRecord, ServerId, VesselClass};
pub use snapshot::{
    build_snapshot, stamp_version, CompanyInfo, EntityMap, IslandInfo, Published, TribeNameMap,
    WorldSnapshot,
};
