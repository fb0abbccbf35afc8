//! Per-minute latency aggregation
//!
//! [`LatencySamples`] accumulates elapsed times and a success counter for one
//! IP pair (or one rolled-up service pair) during one minute. [`MinuteBucket`]
//! maps every IP pair to its samples for exactly one minute, and
//! [`BucketPool`] recycles buckets across minutes so steady-state ingestion
//! does not allocate.
//!
//! # Order statistic
//!
//! P99 is the nearest-rank 99th percentile: sorting descending, it is the
//! element at 0-based index `⌊n / 100⌋`. It is found with a randomized
//! three-way quickselect in expected O(n), which also copes with the heavy
//! duplication typical of millisecond latencies.
//!
//! # Reset-on-read
//!
//! [`LatencySamples::success_rate`] clears the samples after computing the
//! rate so that the same storage can be refilled next minute. Values that
//! are read more than once go through [`LatencySamples::safe_p99`] and
//! [`LatencySamples::safe_success_rate`], which cache and never reset.

use crate::record::IpPairKey;
use crate::topology::IpPair;
use fnv::FnvHashMap;
use rand::Rng;
use std::cmp::Ordering;

/// Success rates are integers scaled by this factor (two decimal digits)
pub const SUCCESS_RATE_SCALE: u64 = 10_000;

/// Samples per percentile step: P99 sits at descending index `n / 100`
const P99_RANK_DIVISOR: usize = 100;

/// Elapsed-time samples plus success counter
#[derive(Debug, Clone, Default)]
pub struct LatencySamples {
    elapsed: Vec<u32>,
    successes: u64,
    cached_p99: Option<u32>,
    cached_rate: Option<u32>,
}

impl LatencySamples {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            elapsed: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// Record one call
    pub fn add(&mut self, elapsed_ms: u32, success: bool) {
        self.elapsed.push(elapsed_ms);
        self.successes += u64::from(success);
        self.cached_p99 = None;
        self.cached_rate = None;
    }

    /// Bulk-merge another sample set into this one
    pub fn add_all(&mut self, other: &LatencySamples) {
        self.elapsed.extend_from_slice(&other.elapsed);
        self.successes += other.successes;
        self.cached_p99 = None;
        self.cached_rate = None;
    }

    pub fn size(&self) -> usize {
        self.elapsed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed.is_empty()
    }

    pub fn successes(&self) -> u64 {
        self.successes
    }

    /// P99 latency, or `None` when there are no samples
    ///
    /// Reorders the samples in place.
    pub fn p99(&mut self) -> Option<u32> {
        if self.elapsed.is_empty() {
            return None;
        }
        let rank = self.elapsed.len() / P99_RANK_DIVISOR;
        Some(select_descending(
            &mut self.elapsed,
            rank,
            &mut rand::thread_rng(),
        ))
    }

    /// Success rate ×10000, then clears all samples and counters
    ///
    /// Post-condition: `size() == 0`.
    pub fn success_rate(&mut self) -> Option<u32> {
        let rate = self.rate();
        self.reset();
        rate
    }

    /// Cached P99 that can be read any number of times
    pub fn safe_p99(&mut self) -> Option<u32> {
        if self.cached_p99.is_none() {
            self.cached_p99 = self.p99();
        }
        self.cached_p99
    }

    /// Cached success rate that leaves the samples intact
    pub fn safe_success_rate(&mut self) -> Option<u32> {
        if self.cached_rate.is_none() {
            self.cached_rate = self.rate();
        }
        self.cached_rate
    }

    /// Drop all samples, keeping the allocation
    pub fn reset(&mut self) {
        self.elapsed.clear();
        self.successes = 0;
        self.cached_p99 = None;
        self.cached_rate = None;
    }

    fn rate(&self) -> Option<u32> {
        if self.elapsed.is_empty() {
            return None;
        }
        Some((self.successes * SUCCESS_RATE_SCALE / self.elapsed.len() as u64) as u32)
    }
}

/// Element at 0-based index `k` of `data` sorted in descending order
///
/// `data` is partially reordered. `k` must be less than `data.len()`.
pub fn select_descending<R: Rng + ?Sized>(data: &mut [u32], k: usize, rng: &mut R) -> u32 {
    debug_assert!(k < data.len());
    let mut lo = 0;
    let mut hi = data.len() - 1;

    loop {
        if lo == hi {
            return data[lo];
        }
        let pivot = data[rng.gen_range(lo..=hi)];

        // [lo, lt) > pivot, [lt, i) == pivot, [gt, hi] < pivot
        let mut lt = lo;
        let mut i = lo;
        let mut gt = hi + 1;
        while i < gt {
            match data[i].cmp(&pivot) {
                Ordering::Greater => {
                    data.swap(lt, i);
                    lt += 1;
                    i += 1;
                }
                Ordering::Less => {
                    gt -= 1;
                    data.swap(i, gt);
                }
                Ordering::Equal => i += 1,
            }
        }

        if k < lt {
            hi = lt - 1;
        } else if k >= gt {
            lo = gt;
        } else {
            return pivot;
        }
    }
}

/// Samples of one IP pair inside a bucket
#[derive(Debug, Clone)]
pub struct PairSlot {
    pub pair: IpPair,
    pub samples: LatencySamples,
}

/// All IP-pair samples for one minute
#[derive(Debug, Clone, Default)]
pub struct MinuteBucket {
    slots: FnvHashMap<IpPairKey, PairSlot>,
}

impl MinuteBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bucket with an (empty) slot for every given pair
    pub fn with_pairs(pairs: &[IpPair]) -> Self {
        let mut slots = FnvHashMap::with_capacity_and_hasher(pairs.len(), Default::default());
        for pair in pairs {
            slots.insert(
                pair.key(),
                PairSlot {
                    pair: *pair,
                    samples: LatencySamples::new(),
                },
            );
        }
        Self { slots }
    }

    /// Samples of `pair`, creating its slot if needed
    pub fn slot(&mut self, pair: IpPair) -> &mut LatencySamples {
        &mut self
            .slots
            .entry(pair.key())
            .or_insert_with(|| PairSlot {
                pair,
                samples: LatencySamples::new(),
            })
            .samples
    }

    /// Slots holding at least one sample
    pub fn filled_slots_mut(&mut self) -> impl Iterator<Item = &mut PairSlot> {
        self.slots.values_mut().filter(|slot| !slot.samples.is_empty())
    }

    /// Number of pairs with a slot (filled or not)
    pub fn pair_count(&self) -> usize {
        self.slots.len()
    }

    /// Total samples across all pairs
    pub fn sample_count(&self) -> usize {
        self.slots.values().map(|slot| slot.samples.size()).sum()
    }

    /// Clear every slot's samples, keeping slots and allocations
    pub fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.samples.reset();
        }
    }
}

/// Fixed-capacity recycling pool of minute buckets
///
/// The pool has exactly one owner (the parser stage). Buckets come back to
/// it through [`BucketPool::release`] after whoever drained them hands them
/// over; nothing else ever touches the free list.
#[derive(Debug)]
pub struct BucketPool {
    free: Vec<MinuteBucket>,
    capacity: usize,
    allocated: usize,
    acquired: usize,
}

impl BucketPool {
    /// # Panics
    ///
    /// Panics if capacity is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Bucket pool capacity must be > 0");
        Self {
            free: Vec::with_capacity(capacity),
            capacity,
            allocated: 0,
            acquired: 0,
        }
    }

    /// Take a free bucket, allocating one with `make` while under capacity
    ///
    /// Returns `None` when every bucket is in flight; the caller must wait
    /// for one to be released.
    pub fn acquire(&mut self, make: impl FnOnce() -> MinuteBucket) -> Option<MinuteBucket> {
        if let Some(bucket) = self.free.pop() {
            self.acquired += 1;
            return Some(bucket);
        }
        if self.allocated < self.capacity {
            self.allocated += 1;
            self.acquired += 1;
            return Some(make());
        }
        None
    }

    /// Return a bucket to the free list (cleared)
    pub fn release(&mut self, mut bucket: MinuteBucket) {
        bucket.reset();
        if self.free.len() < self.capacity {
            self.free.push(bucket);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            available: self.free.len(),
            allocated: self.allocated,
            acquired: self.acquired,
        }
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub available: usize,
    pub allocated: usize,
    pub acquired: usize,
}

impl PoolStats {
    /// Percentage of acquires served by recycling instead of allocation
    pub fn reuse_rate(&self) -> f64 {
        if self.acquired == 0 {
            return 0.0;
        }
        let reused = self.acquired - self.allocated;
        (reused as f64 / self.acquired as f64) * 100.0
    }
}
