//! Default constants for bts-dedup configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Signature Defaults
// =============================================================================

/// Default record field that holds the document text.
pub const DEFAULT_TEXT_KEY: &str = "text";

/// Default shingle width in tokens.
pub const DEFAULT_WINDOW_SIZE: usize = 5;

/// Default number of MinHash permutations.
/// More permutations tighten the similarity estimate at linear cost.
pub const DEFAULT_NUM_PERMUTATIONS: usize = 256;

/// Default Jaccard similarity threshold for near-duplicates.
pub const DEFAULT_JACCARD_THRESHOLD: f64 = 0.7;

/// Default seed for permutation coefficients and document ids.
pub const DEFAULT_SEED: u64 = 42;

/// Mersenne prime 2^61 - 1, modulus of the affine permutations.
pub const MERSENNE_PRIME: u64 = (1 << 61) - 1;

/// Largest 32-bit hash value; also the sentinel for empty shingle sets.
pub const MAX_HASH: u32 = u32::MAX;

/// Weight of the false-positive probability in the band/row search.
pub const FALSE_POSITIVE_WEIGHT: f64 = 0.5;

/// Weight of the false-negative probability in the band/row search.
pub const FALSE_NEGATIVE_WEIGHT: f64 = 0.5;

/// Number of Simpson subintervals used when integrating LSH error curves.
/// Must be even.
pub const INTEGRATION_STEPS: usize = 128;

// =============================================================================
// Union-Find Sharding Defaults
// =============================================================================

/// Default number of union-find shards.
pub const DEFAULT_NUM_SHARDS: usize = 16;

/// Default merge fan-in. Accepted for compatibility, not consulted.
pub const DEFAULT_MERGE_FANIN: usize = 2;

/// Bound on each shard actor's inbox.
/// The coordinator never has more than one command in flight per shard,
/// so this only needs headroom for direct callers.
pub const DEFAULT_SHARD_QUEUE_CAPACITY: usize = 64;

/// Environment variable prefix for configuration overrides.
pub const ENV_PREFIX: &str = "BTS_DEDUP_";
