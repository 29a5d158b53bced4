use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::aggregate::OwnerAggregate;

/// Colors assigned to ranked owners' claims, best rank first. Owners
/// outside the top list keep the unranked grey.
pub const RANK_COLORS: [&str; 10] = [
    "lime", "blue", "yellow", "fuchsia", "aqua", "maroon", "red", "olive", "purple", "teal",
];

/// Heap key: an owner is "smaller" when it has fewer points, with ties
/// broken by the lower tribe id.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct OwnerScore {
    points: i64,
    tribe_id: u64,
}

/// Select at most `n` owner ids ordered by descending point total.
///
/// A fixed-capacity min-heap keeps the current top `n`, evicting its
/// smallest element whenever capacity is exceeded; draining the heap
/// ascending and reversing yields rank order. Net ordering: points
/// descending, and for exactly equal totals the higher tribe id ranks
/// first. That tie direction is an output-compatibility rule — the same
/// drain-and-reverse procedure applies even when no eviction occurs.
pub fn top_owners(owners: &HashMap<u64, OwnerAggregate>, n: usize) -> Vec<u64> {
    if n == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<Reverse<OwnerScore>> = BinaryHeap::with_capacity(n + 1);
    for owner in owners.values() {
        heap.push(Reverse(OwnerScore {
            points: owner.points,
            tribe_id: owner.tribe_id,
        }));
        if heap.len() > n {
            heap.pop();
        }
    }

    let mut ranked: Vec<u64> = Vec::with_capacity(heap.len());
    while let Some(Reverse(score)) = heap.pop() {
        ranked.push(score.tribe_id);
    }
    ranked.reverse();
    ranked
}
