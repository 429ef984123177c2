//! # Data Model
//!
//! Core data structures shared by the signature, grouping and union-find stages:
//! document ids, edges between them, band signatures, and the records that flow
//! through the pipeline.

use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Globally unique document id, minted once per record per run.
///
/// Backed by a 128-bit UUID. Ordering is numeric, which matches the
/// lexicographic order of the 32-character hex rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u128);

impl NodeId {
    /// Mint an id from the given random source.
    pub fn mint<R: Rng>(rng: &mut R) -> Self {
        let bytes: [u8; 16] = rng.random();
        NodeId(uuid::Builder::from_random_bytes(bytes).into_uuid().as_u128())
    }

    pub fn as_uuid(&self) -> Uuid {
        Uuid::from_u128(self.0)
    }

    /// The shard that canonically owns this id: the last eight hex digits
    /// of the id, modulo the shard count.
    #[inline]
    pub fn shard(&self, shard_count: usize) -> usize {
        debug_assert!(shard_count > 0);
        (self.0 as u32 as usize) % shard_count
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_uuid().simple())
    }
}

impl From<u128> for NodeId {
    fn from(value: u128) -> Self {
        NodeId(value)
    }
}

/// Directed link `(u, v)`: u and v belong to the same component.
pub type Edge = (NodeId, NodeId);

/// Edges grouped by destination shard.
pub type EdgeBatches = FxHashMap<usize, Vec<Edge>>;

/// Merge several per-shard edge batches into one, concatenating by destination.
pub fn merge_edge_batches<I>(batches: I) -> EdgeBatches
where
    I: IntoIterator<Item = EdgeBatches>,
{
    let mut merged = EdgeBatches::default();
    for batch in batches {
        for (shard, mut edges) in batch {
            merged.entry(shard).or_default().append(&mut edges);
        }
    }
    merged
}

/// One LSH band of a signature: the band index (4 bytes, big-endian)
/// followed by each row value (4 bytes, big-endian).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BandValue(pub Vec<u8>);

impl BandValue {
    pub fn encode(band: usize, rows: &[u32]) -> Self {
        let mut bytes = Vec::with_capacity(4 + rows.len() * 4);
        bytes.extend_from_slice(&(band as u32).to_be_bytes());
        for row in rows {
            bytes.extend_from_slice(&row.to_be_bytes());
        }
        BandValue(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Banded MinHash signature of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub bands: Vec<BandValue>,
}

impl Signature {
    pub fn num_bands(&self) -> usize {
        self.bands.len()
    }

    /// Fraction of bands on which two signatures agree.
    ///
    /// A coarse diagnostic; LSH itself only needs one matching band.
    pub fn estimated_similarity(&self, other: &Signature) -> f64 {
        if self.bands.is_empty() || self.bands.len() != other.bands.len() {
            return 0.0;
        }
        let matches = self
            .bands
            .iter()
            .zip(other.bands.iter())
            .filter(|(a, b)| a == b)
            .count();
        matches as f64 / self.bands.len() as f64
    }
}

/// A document id paired with its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedDocument {
    pub id: NodeId,
    pub signature: Signature,
}

/// An input row: arbitrary JSON fields, one of which holds the text.
pub type Record = serde_json::Map<String, serde_json::Value>;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_display_is_simple_hex() {
        let id = NodeId(0x0123_4567_89ab_cdef_0011_2233_4455_6677);
        assert_eq!(id.to_string(), "0123456789abcdef0011223344556677");
    }

    #[test]
    fn test_ordering_matches_hex_ordering() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut ids: Vec<NodeId> = (0..64).map(|_| NodeId::mint(&mut rng)).collect();
        ids.sort();
        let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let mut sorted = rendered.clone();
        sorted.sort();
        assert_eq!(rendered, sorted);
    }

    #[test]
    fn test_shard_uses_low_32_bits() {
        let id = NodeId(0xffff_ffff_ffff_ffff_ffff_ffff_0000_000a);
        assert_eq!(id.shard(4), 10 % 4);
        assert_eq!(id.shard(1), 0);
    }

    #[test]
    fn test_minting_is_seeded() {
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for _ in 0..8 {
            assert_eq!(NodeId::mint(&mut a), NodeId::mint(&mut b));
        }
    }

    #[test]
    fn test_band_value_layout() {
        let band = BandValue::encode(3, &[1, 0x0a0b0c0d]);
        assert_eq!(
            band.as_bytes(),
            &[0, 0, 0, 3, 0, 0, 0, 1, 0x0a, 0x0b, 0x0c, 0x0d]
        );
    }

    #[test]
    fn test_merge_edge_batches_concatenates() {
        let a = NodeId(1);
        let b = NodeId(2);
        let c = NodeId(3);
        let mut first = EdgeBatches::default();
        first.insert(0, vec![(a, b)]);
        let mut second = EdgeBatches::default();
        second.insert(0, vec![(b, c)]);
        second.insert(1, vec![(c, a)]);

        let merged = merge_edge_batches([first, second]);
        assert_eq!(merged[&0], vec![(a, b), (b, c)]);
        assert_eq!(merged[&1], vec![(c, a)]);
    }
}
