use std::collections::HashSet;

use tracing::warn;

use crate::snapshot::EntityMap;

/// Root sentinel: entities whose parent id is `"0"` have no parent.
const ROOT_PARENT: &str = "0";

/// Drops entity records whose declared parent is absent from the same
/// batch, logging each distinct orphan id at most once.
///
/// The dedup set persists across cycles so a persistently-orphaned record
/// does not flood the log. It is bounded: once it holds
/// [`ORPHAN_LOG_CAP`] ids it is cleared wholesale, so after an overflow a
/// still-orphaned id may be logged one extra time.
#[derive(Debug, Default)]
pub struct OrphanFilter {
    logged: HashSet<String>,
}

pub const ORPHAN_LOG_CAP: usize = 65_536;

impl OrphanFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove orphans from `entities` in a single pass. Parent presence is
    /// checked against the batch as fetched, so removing an orphan never
    /// cascades into its own children within the same cycle.
    pub fn retain_valid(&mut self, entities: &mut EntityMap) {
        let orphans: Vec<(String, String)> = entities
            .iter()
            .filter(|(_, record)| {
                record.parent_entity_id != ROOT_PARENT
                    && !entities.contains_key(&record.parent_entity_id)
            })
            .map(|(id, record)| (id.clone(), record.parent_entity_id.clone()))
            .collect();

        for (id, parent) in orphans {
            entities.remove(&id);
            if self.logged.len() >= ORPHAN_LOG_CAP {
                self.logged.clear();
            }
            if self.logged.insert(id.clone()) {
                warn!(
                    entity = %id,
                    parent = %parent,
                    "entity references a parent that does not exist, removing from list"
                );
            }
        }
    }
}
