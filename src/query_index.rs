//! Closed-world index for longest-path queries
//!
//! The key universe is fixed before the first query, so it can be indexed by
//! a perfect hash: find the smallest mask `m ≥ |keys|` for which `hash & m`
//! is injective, then store entries in a dense table of length `m + 1`.
//! Queries hash the raw inputs and index straight into the table.
//!
//! The search is bounded by [`PerfectHashConfig`]. If no mask fits the
//! budget, [`build_index`] falls back to [`HashedPathIndex`]. Both
//! implementations compare the stored key on lookup, so a query outside the
//! universe returns an empty slice instead of a neighbour's answer.

use crate::config::PerfectHashConfig;
use crate::rules::Metric;
use std::collections::HashMap;

/// (caller, responder, minute string, metric)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathKey {
    pub caller: String,
    pub responder: String,
    pub minute: String,
    pub metric: Metric,
}

impl PathKey {
    pub fn new(caller: &str, responder: &str, minute: &str, metric: Metric) -> Self {
        Self {
            caller: caller.to_string(),
            responder: responder.to_string(),
            minute: minute.to_string(),
            metric,
        }
    }

    pub fn hash_code(&self) -> u32 {
        query_hash(&self.caller, &self.responder, &self.minute, self.metric)
    }

    fn matches(&self, caller: &str, responder: &str, minute: &str, metric: Metric) -> bool {
        self.metric == metric
            && self.caller == caller
            && self.responder == responder
            && self.minute == minute
    }
}

/// 31-polynomial over the bytes of `s`
fn string_hash(s: &str) -> u32 {
    s.bytes()
        .fold(0u32, |h, b| h.wrapping_mul(31).wrapping_add(u32::from(b)))
}

/// Hash of a query, folding the four field hashes with the same polynomial
pub fn query_hash(caller: &str, responder: &str, minute: &str, metric: Metric) -> u32 {
    [caller, responder, minute, metric.as_str()]
        .iter()
        .fold(0u32, |h, field| h.wrapping_mul(31).wrapping_add(string_hash(field)))
}

/// Read-only lookup from query key to annotated paths
pub trait PathIndex: Send + Sync {
    /// Paths for the key; empty if the key is not indexed
    fn lookup(&self, caller: &str, responder: &str, minute: &str, metric: Metric) -> &[String];

    /// Number of indexed keys
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Short name of the strategy, for logs and stats
    fn strategy(&self) -> &'static str;
}

type Entry = (PathKey, Vec<String>);

/// Dense table addressed by `hash & mask`
#[derive(Debug)]
pub struct MaskedPerfectHash {
    mask: u32,
    slots: Vec<Option<u32>>,
    entries: Vec<Entry>,
}

impl MaskedPerfectHash {
    /// Search for a collision-free mask; gives the entries back if none fits
    pub fn build(entries: Vec<Entry>, config: &PerfectHashConfig) -> Result<Self, Vec<Entry>> {
        let hashes: Vec<u32> = entries.iter().map(|(key, _)| key.hash_code()).collect();
        let Some((mask, attempts)) = find_mask(&hashes, config) else {
            return Err(entries);
        };

        let mut slots = vec![None; mask as usize + 1];
        for (idx, &hash) in hashes.iter().enumerate() {
            slots[(hash & mask) as usize] = Some(idx as u32);
        }
        tracing::info!(keys = entries.len(), mask, attempts, "perfect hash mask found");
        Ok(Self {
            mask,
            slots,
            entries,
        })
    }

    pub fn table_len(&self) -> usize {
        self.slots.len()
    }
}

impl PathIndex for MaskedPerfectHash {
    fn lookup(&self, caller: &str, responder: &str, minute: &str, metric: Metric) -> &[String] {
        let hash = query_hash(caller, responder, minute, metric);
        let Some(Some(idx)) = self.slots.get((hash & self.mask) as usize) else {
            return &[];
        };
        let (key, paths) = &self.entries[*idx as usize];
        if key.matches(caller, responder, minute, metric) {
            paths
        } else {
            &[]
        }
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn strategy(&self) -> &'static str {
        "perfect-hash"
    }
}

/// Smallest injective mask ≥ `hashes.len()` within budget, plus attempts used
pub fn find_mask(hashes: &[u32], config: &PerfectHashConfig) -> Option<(u32, u32)> {
    let max_mask = config.max_table_len.saturating_sub(1).min(u32::MAX as usize) as u64;
    let mut mask = hashes.len() as u64;
    if mask > max_mask {
        return None;
    }

    // Equal full hashes collide under every mask
    let mut distinct = hashes.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    if distinct.len() != hashes.len() {
        tracing::debug!("duplicate key hashes, no mask can separate them");
        return None;
    }

    // Generation stamps avoid clearing the table between attempts
    let mut stamps: Vec<u32> = Vec::new();
    let mut attempts = 0u32;
    while attempts < config.max_attempts && mask <= max_mask {
        attempts += 1;
        let generation = attempts;
        let m = mask as u32;
        if stamps.len() <= mask as usize {
            stamps.resize(mask as usize + 1, 0);
        }

        let injective = hashes.iter().all(|&hash| {
            let slot = &mut stamps[(hash & m) as usize];
            if *slot == generation {
                false
            } else {
                *slot = generation;
                true
            }
        });
        if injective {
            return Some((m, attempts));
        }
        mask += 1;
    }
    None
}

/// Fallback index: hash buckets with key comparison
#[derive(Debug, Default)]
pub struct HashedPathIndex {
    buckets: HashMap<u32, Vec<u32>>,
    entries: Vec<Entry>,
}

impl HashedPathIndex {
    pub fn new(entries: Vec<Entry>) -> Self {
        let mut buckets: HashMap<u32, Vec<u32>> = HashMap::with_capacity(entries.len());
        for (idx, (key, _)) in entries.iter().enumerate() {
            buckets.entry(key.hash_code()).or_default().push(idx as u32);
        }
        Self { buckets, entries }
    }
}

impl PathIndex for HashedPathIndex {
    fn lookup(&self, caller: &str, responder: &str, minute: &str, metric: Metric) -> &[String] {
        let hash = query_hash(caller, responder, minute, metric);
        self.buckets
            .get(&hash)
            .into_iter()
            .flatten()
            .map(|&idx| &self.entries[idx as usize])
            .find(|(key, _)| key.matches(caller, responder, minute, metric))
            .map(|(_, paths)| paths.as_slice())
            .unwrap_or(&[])
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn strategy(&self) -> &'static str {
        "hash-map"
    }
}

/// Perfect hash when the budget allows, hash map otherwise
pub fn build_index(entries: Vec<Entry>, config: &PerfectHashConfig) -> Box<dyn PathIndex> {
    match MaskedPerfectHash::build(entries, config) {
        Ok(index) => Box::new(index),
        Err(entries) => {
            tracing::warn!(
                keys = entries.len(),
                max_attempts = config.max_attempts,
                max_table_len = config.max_table_len,
                "no perfect-hash mask within budget, falling back to hash map"
            );
            Box::new(HashedPathIndex::new(entries))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(caller: &str, responder: &str, minute: &str, metric: Metric) -> Entry {
        (
            PathKey::new(caller, responder, minute, metric),
            vec![format!("{}->{}|{}", caller, responder, metric)],
        )
    }

    fn universe(n: usize) -> Vec<Entry> {
        (0..n)
            .flat_map(|i| {
                Metric::ALL.into_iter().map(move |metric| {
                    entry(
                        &format!("svc_{}", i % 7),
                        &format!("svc_{}", i),
                        &format!("2020-06-23 00:{:02}", i % 60),
                        metric,
                    )
                })
            })
            .collect()
    }

    #[test]
    fn test_string_hash_polynomial() {
        assert_eq!(string_hash(""), 0);
        assert_eq!(string_hash("a"), 97);
        assert_eq!(string_hash("ab"), 97 * 31 + 98);
    }

    #[test]
    fn test_round_trip_single_key() {
        let index = build_index(
            vec![entry("A", "B", "2020-01-01 00:00", Metric::P99)],
            &PerfectHashConfig::default(),
        );
        assert_eq!(index.strategy(), "perfect-hash");
        assert_eq!(
            index.lookup("A", "B", "2020-01-01 00:00", Metric::P99),
            &["A->B|P99".to_string()]
        );
        assert!(index.lookup("B", "A", "2020-01-01 00:00", Metric::P99).is_empty());
        assert!(index.lookup("A", "B", "2020-01-01 00:00", Metric::SuccessRate).is_empty());
        assert!(index.lookup("A", "B", "2020-01-01 00:01", Metric::P99).is_empty());
    }

    #[test]
    fn test_mask_is_injective_over_universe() {
        let entries = universe(200);
        let hashes: Vec<u32> = entries.iter().map(|(k, _)| k.hash_code()).collect();
        let (mask, _) = find_mask(&hashes, &PerfectHashConfig::default()).unwrap();
        assert!(mask as usize >= hashes.len());

        let mut slots: Vec<u32> = hashes.iter().map(|h| h & mask).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), hashes.len());
    }

    #[test]
    fn test_every_key_found() {
        let entries = universe(120);
        let index = MaskedPerfectHash::build(entries.clone(), &PerfectHashConfig::default()).unwrap();
        assert_eq!(index.len(), entries.len());
        assert!(index.table_len() > entries.len());
        for (key, paths) in &entries {
            assert_eq!(
                index.lookup(&key.caller, &key.responder, &key.minute, key.metric),
                paths.as_slice()
            );
        }
    }

    #[test]
    fn test_budget_exhaustion_falls_back() {
        let entries = universe(50);
        let tight = PerfectHashConfig {
            max_attempts: 1,
            max_table_len: 101,
        };
        let hashes: Vec<u32> = entries.iter().map(|(k, _)| k.hash_code()).collect();
        // a single attempt at m = n only succeeds by luck; force the table cap instead
        let capped = PerfectHashConfig {
            max_attempts: 1_000,
            max_table_len: hashes.len(),
        };
        assert!(find_mask(&hashes, &capped).is_none());

        let index = build_index(entries.clone(), &capped);
        assert_eq!(index.strategy(), "hash-map");
        for (key, paths) in &entries {
            assert_eq!(
                index.lookup(&key.caller, &key.responder, &key.minute, key.metric),
                paths.as_slice()
            );
        }
        assert!(index.lookup("nope", "nope", "nope", Metric::P99).is_empty());

        // whatever strategy a tight budget lands on, lookups still agree
        let index = build_index(entries.clone(), &tight);
        let (key, paths) = &entries[0];
        assert_eq!(
            index.lookup(&key.caller, &key.responder, &key.minute, key.metric),
            paths.as_slice()
        );
    }

    #[test]
    fn test_duplicate_hash_never_finds_mask() {
        let hashes = vec![7, 7];
        assert!(find_mask(&hashes, &PerfectHashConfig::default()).is_none());
    }

    #[test]
    fn test_empty_universe() {
        let index = build_index(Vec::new(), &PerfectHashConfig::default());
        assert!(index.is_empty());
        assert!(index.lookup("A", "B", "x", Metric::P99).is_empty());
    }
}
