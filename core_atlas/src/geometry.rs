use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;

/// Static geometry for one island, resolved from the world-grid document.
///
/// `points` is the ranking weight of the island; islands whose configured
/// value is non-positive are marked with `-1` and never produce claims.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IslandGeometry {
    pub id: i64,
    pub world_x: f64,
    pub world_y: f64,
    pub radius: f64,
    pub points: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct RawIslandInstance {
    id: i64,
    #[serde(default, rename = "islandPoints")]
    island_points: i64,
    #[serde(default, rename = "islandWidth")]
    island_width: f64,
    #[serde(default, rename = "islandHeight")]
    island_height: f64,
    #[serde(default, rename = "worldX")]
    world_x: f64,
    #[serde(default, rename = "worldY")]
    world_y: f64,
}

#[derive(Debug, Clone, Deserialize)]
struct RawServerGrid {
    #[serde(default, rename = "serverIslandPointsMultiplier")]
    server_island_points_multiplier: f64,
    #[serde(default, rename = "islandInstances")]
    island_instances: Vec<RawIslandInstance>,
}

#[derive(Debug, Clone, Deserialize)]
struct RawWorldGrid {
    #[serde(default, rename = "gridSize")]
    grid_size: f64,
    #[serde(default, rename = "totalGridsX")]
    total_grids_x: i64,
    #[serde(default, rename = "totalGridsY")]
    total_grids_y: i64,
    #[serde(default)]
    servers: Vec<RawServerGrid>,
}

/// World-grid configuration: overall grid dimensions plus the island
/// geometry table keyed by island id.
#[derive(Debug, Clone)]
pub struct WorldGrid {
    grid_size: f64,
    total_grids_x: i64,
    total_grids_y: i64,
    islands: HashMap<i64, IslandGeometry>,
}

impl WorldGrid {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let raw: RawWorldGrid = serde_json::from_str(json)?;
        Ok(Self::from_raw(raw))
    }

    pub fn from_file(path: &Path) -> Result<Self, GeometryError> {
        let contents = fs::read_to_string(path).map_err(|source| GeometryError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let grid = Self::from_json_str(&contents)?;
        Ok(grid)
    }

    fn from_raw(raw: RawWorldGrid) -> Self {
        let mut islands = HashMap::new();
        for server in &raw.servers {
            for instance in &server.island_instances {
                let points = resolve_points(instance, server.server_island_points_multiplier);
                islands.insert(
                    instance.id,
                    IslandGeometry {
                        id: instance.id,
                        world_x: instance.world_x,
                        world_y: instance.world_y,
                        radius: (instance.island_width + instance.island_height) / 4.0,
                        points,
                    },
                );
            }
        }
        Self {
            grid_size: raw.grid_size,
            total_grids_x: raw.total_grids_x,
            total_grids_y: raw.total_grids_y,
            islands,
        }
    }

    pub fn island(&self, id: i64) -> Option<&IslandGeometry> {
        self.islands.get(&id)
    }

    pub fn island_count(&self) -> usize {
        self.islands.len()
    }

    /// Coordinate divisor turning raw world positions into virtual pixels.
    pub fn virtual_pixels(&self) -> f64 {
        (self.grid_size as i64 * self.total_grids_x.max(self.total_grids_y)) as f64
    }

    /// Build a grid directly from resolved island geometry. Intended for
    /// tests and embedders that compute geometry elsewhere.
    pub fn from_islands(
        grid_size: f64,
        total_grids_x: i64,
        total_grids_y: i64,
        islands: impl IntoIterator<Item = IslandGeometry>,
    ) -> Self {
        Self {
            grid_size,
            total_grids_x,
            total_grids_y,
            islands: islands.into_iter().map(|i| (i.id, i)).collect(),
        }
    }
}

/// Point fixup applied on load. Configured values above 1 pass through;
/// non-positive values become -1 (the claim-filter sentinel); the value 1
/// means "derive from island area", clamped to 1..=100 before the
/// per-server multiplier.
fn resolve_points(instance: &RawIslandInstance, multiplier: f64) -> i64 {
    if instance.island_points <= 0 {
        return -1;
    }
    if instance.island_points != 1 {
        return instance.island_points;
    }
    let area = instance.island_width * instance.island_height;
    let derived = (area.powf(0.6) * 0.000_015) as i64;
    let clamped = derived.clamp(1, 100);
    (multiplier * clamped as f64).ceil() as i64
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("failed to parse world grid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read world grid config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRID: &str = r#"{
        "gridSize": 1400000.0,
        "totalGridsX": 2,
        "totalGridsY": 3,
        "servers": [
            {
                "serverIslandPointsMultiplier": 2.0,
                "islandInstances": [
                    { "id": 1, "islandPoints": 7, "islandWidth": 100.0, "islandHeight": 100.0,
                      "worldX": 5000.0, "worldY": 6000.0 },
                    { "id": 2, "islandPoints": 0, "islandWidth": 10.0, "islandHeight": 10.0,
                      "worldX": 0.0, "worldY": 0.0 },
                    { "id": 3, "islandPoints": 1, "islandWidth": 40000.0, "islandHeight": 40000.0,
                      "worldX": 1.0, "worldY": 2.0 }
                ]
            }
        ]
    }"#;

    #[test]
    fn explicit_points_pass_through() {
        let grid = WorldGrid::from_json_str(GRID).unwrap();
        let island = grid.island(1).unwrap();
        assert_eq!(island.points, 7);
        assert_eq!(island.radius, 50.0);
        assert_eq!(island.world_x, 5000.0);
    }

    #[test]
    fn non_positive_points_become_sentinel() {
        let grid = WorldGrid::from_json_str(GRID).unwrap();
        assert_eq!(grid.island(2).unwrap().points, -1);
    }

    #[test]
    fn unit_points_derive_from_area() {
        let grid = WorldGrid::from_json_str(GRID).unwrap();
        // (40000*40000)^0.6 * 1.5e-5 = ~5.05e6 * 1.5e-5... derived then
        // clamped to at most 100, times the 2.0 multiplier.
        let island = grid.island(3).unwrap();
        assert!(island.points >= 2);
        assert!(island.points <= 200);
        let derived = ((40000.0f64 * 40000.0).powf(0.6) * 0.000_015) as i64;
        let expected = (2.0 * derived.clamp(1, 100) as f64).ceil() as i64;
        assert_eq!(island.points, expected);
    }

    #[test]
    fn virtual_pixels_use_larger_grid_axis() {
        let grid = WorldGrid::from_json_str(GRID).unwrap();
        assert_eq!(grid.virtual_pixels(), 1400000.0 * 3.0);
    }

    #[test]
    fn unknown_island_is_absent() {
        let grid = WorldGrid::from_json_str(GRID).unwrap();
        assert!(grid.island(99).is_none());
    }
}
