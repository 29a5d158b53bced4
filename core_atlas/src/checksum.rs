use std::collections::HashMap;

/// Incremental CRC-32/IEEE digest over the raw payloads of one poll cycle.
///
/// The payloads come out of an unordered mapping, so callers must feed
/// them in a stable order (see [`sorted_values`]) — otherwise identical
/// content can hash differently between cycles and defeat the
/// change-detection fast path.
#[derive(Debug, Default)]
pub struct PayloadDigest {
    hasher: crc32fast::Hasher,
}

impl PayloadDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, payload: &[u8]) {
        self.hasher.update(payload);
    }

    pub fn finish(self) -> u32 {
        self.hasher.finalize()
    }
}

/// Borrow a raw payload mapping as `(key, value)` pairs sorted by key.
/// Sorting before hashing makes the digest independent of map iteration
/// order; this is a correctness requirement, not an optimization.
pub fn sorted_values(raw: &HashMap<String, String>) -> Vec<(&String, &String)> {
    let mut entries: Vec<(&String, &String)> = raw.iter().collect();
    entries.sort_by_key(|(key, _)| *key);
    entries
}

/// Remembers the previous cycle's digest and reports whether the current
/// one changed. The first observed digest always counts as changed.
#[derive(Debug, Default)]
pub struct ChangeDetector {
    previous: Option<u32>,
}

impl ChangeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `digest` and return true when it differs from the previous
    /// cycle's value.
    pub fn observe(&mut self, digest: u32) -> bool {
        let changed = self.previous != Some(digest);
        self.previous = Some(digest);
        changed
    }
}
