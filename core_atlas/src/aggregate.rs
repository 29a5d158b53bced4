use std::collections::HashMap;

use crate::claims::TerritoryClaim;

/// Per-owner rollup for one cycle: summed island points plus an index of
/// the owner's claims (positions into the cycle's claim list). The flag
/// image reference is filled in outside this core.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnerAggregate {
    pub tribe_id: u64,
    pub name: String,
    pub points: i64,
    pub flag_url: Option<String>,
    pub claims: Vec<usize>,
}

/// Group surviving claims by owner, summing precomputed island points into
/// a per-owner total. The owner's display name is backfilled from the
/// first of its claims encountered.
pub fn aggregate_owners(claims: &[TerritoryClaim]) -> HashMap<u64, OwnerAggregate> {
    let mut owners: HashMap<u64, OwnerAggregate> = HashMap::new();
    for (index, claim) in claims.iter().enumerate() {
        match owners.get_mut(&claim.owner_tribe_id) {
            Some(owner) => {
                owner.points += claim.island_points;
                owner.claims.push(index);
            }
            None => {
                owners.insert(
                    claim.owner_tribe_id,
                    OwnerAggregate {
                        tribe_id: claim.owner_tribe_id,
                        name: claim.owner_name.clone(),
                        points: claim.island_points,
                        flag_url: None,
                        claims: vec![index],
                    },
                );
            }
        }
    }
    owners
}
