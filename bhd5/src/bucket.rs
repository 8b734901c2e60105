//! Bucket strategy.
//!
//! `BucketInfo` pairs a count strategy (`total_files -> bucket_count`) with an
//! index strategy (`hash -> bucket_index`). Both default strategies are pure
//! functions; they are boxed as small single-method trait objects (design
//! note 4.9: "small interfaces with one method each") so the packer can be
//! generalized to alternate hash-table shapes without touching it.

use crate::hash::PathHash;

/// Chooses how many buckets an archive's hash table should have.
pub trait CountStrategy: std::fmt::Debug {
    fn bucket_count(&self, total_files: usize) -> usize;
}

/// Chooses which bucket a given hash falls into.
pub trait IndexStrategy: std::fmt::Debug {
    fn bucket_index(&self, hash: PathHash, count: usize) -> usize;
}

/// `next_prime(total_files / distribution)`, with `distribution` defaulting
/// to 7.
#[derive(Debug, Clone, Copy)]
pub struct DistributionCount {
    pub distribution: usize,
}

impl Default for DistributionCount {
    fn default() -> Self {
        Self { distribution: 7 }
    }
}

impl CountStrategy for DistributionCount {
    fn bucket_count(&self, total_files: usize) -> usize {
        next_prime(total_files / self.distribution.max(1))
    }
}

/// `hash mod count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModulusIndex;

impl IndexStrategy for ModulusIndex {
    fn bucket_index(&self, hash: PathHash, count: usize) -> usize {
        (hash.as_u64() % count as u64) as usize
    }
}

/// Pair of strategies governing how an archive's hash table is shaped.
pub struct BucketInfo {
    pub count_strategy: Box<dyn CountStrategy + Send + Sync>,
    pub index_strategy: Box<dyn IndexStrategy + Send + Sync>,
}

impl std::fmt::Debug for BucketInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketInfo")
            .field("count_strategy", &self.count_strategy)
            .field("index_strategy", &self.index_strategy)
            .finish()
    }
}

impl Default for BucketInfo {
    fn default() -> Self {
        Self {
            count_strategy: Box::new(DistributionCount::default()),
            index_strategy: Box::new(ModulusIndex),
        }
    }
}

impl BucketInfo {
    pub fn bucket_count(&self, total_files: usize) -> usize {
        self.count_strategy.bucket_count(total_files).max(1)
    }

    pub fn bucket_index(&self, hash: PathHash, count: usize) -> usize {
        self.index_strategy.bucket_index(hash, count)
    }
}

fn is_prime(n: usize) -> bool {
    if n < 2 {
        return false;
    }
    if n == 2 {
        return true;
    }
    if n % 2 == 0 {
        return false;
    }
    // `i*i <= n` rather than a linear `i < n` trial-division loop, which is
    // gratuitously slow for the bucket counts this function is called with.
    let mut i = 3usize;
    while i.saturating_mul(i) <= n {
        if n % i == 0 {
            return false;
        }
        i += 2;
    }
    true
}

/// Smallest prime `>= n`.
pub fn next_prime(n: usize) -> usize {
    let mut candidate = n.max(2);
    while !is_prime(candidate) {
        candidate += 1;
    }
    candidate
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn next_prime_table() {
        assert_eq!(next_prime(0), 2);
        assert_eq!(next_prime(1), 2);
        assert_eq!(next_prime(4), 5);
        assert_eq!(next_prime(10), 11);
        assert_eq!(next_prime(14), 17);
    }

    #[test]
    fn distribution_count_matches_spec_scenario() {
        let strategy = DistributionCount { distribution: 7 };
        assert_eq!(strategy.bucket_count(100), 17);
        assert_eq!(strategy.bucket_count(1000), 149);
    }

    #[test]
    fn modulus_index_is_in_range() {
        let count = 17;
        for raw in [0u64, 1, 16, 17, 18, 1_000_003] {
            let idx = ModulusIndex.bucket_index(PathHash::W64(raw), count);
            assert!(idx < count);
        }
    }
}
