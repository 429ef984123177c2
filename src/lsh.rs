//! # Bucket Grouper
//!
//! Groups documents that share a band value into buckets and turns every
//! bucket with more than one member into a union-list request for a single,
//! pseudo-randomly chosen shard.
//!
//! ```text
//!   band 0: {v -> [u1, u2]} {w -> [u4, u5]}      xxh3(band bytes) % P
//!   band 1: ...                           ──────────────────────────────▶ shard k
//!   band 3: {x -> [u2, u3]}
//! ```
//!
//! The chosen shard usually does not own most of the ids it unions; the
//! convergence protocol moves them to their owners later.

use crate::model::{BandValue, NodeId, SignedDocument};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_64;

/// Union lists grouped by the shard that performs the initial union.
pub type UnionLists = FxHashMap<usize, Vec<Vec<NodeId>>>;

/// Result of grouping: per-shard union lists plus bucket statistics.
#[derive(Debug, Default)]
pub struct BucketPlan {
    pub union_lists: UnionLists,
    /// Buckets with at least two members.
    pub buckets: usize,
    /// Sum of members over those buckets.
    pub members: usize,
}

/// Shard that receives the union list for a bucket.
#[inline]
pub fn bucket_shard(band: &BandValue, shard_count: usize) -> usize {
    (xxh3_64(band.as_bytes()) % shard_count as u64) as usize
}

/// Candidate buckets for one band, members in input order.
fn band_buckets(documents: &[SignedDocument], band: usize) -> Vec<(&BandValue, Vec<NodeId>)> {
    let mut groups: FxHashMap<&BandValue, Vec<NodeId>> = FxHashMap::default();
    let mut order = Vec::new();
    for doc in documents {
        let Some(value) = doc.signature.bands.get(band) else {
            continue;
        };
        let members = groups.entry(value).or_insert_with(|| {
            order.push(value);
            Vec::new()
        });
        members.push(doc.id);
    }
    order
        .into_iter()
        .filter_map(|value| {
            let members = groups.remove(value)?;
            (members.len() > 1).then_some((value, members))
        })
        .collect()
}

/// Group all signed documents into buckets and route each bucket.
pub fn group_buckets(documents: &[SignedDocument], shard_count: usize) -> BucketPlan {
    let num_bands = documents
        .iter()
        .map(|doc| doc.signature.num_bands())
        .max()
        .unwrap_or(0);
    if shard_count == 0 || num_bands == 0 {
        return BucketPlan::default();
    }

    let per_band: Vec<Vec<(usize, Vec<NodeId>)>> = (0..num_bands)
        .into_par_iter()
        .map(|band| {
            band_buckets(documents, band)
                .into_iter()
                .map(|(value, members)| (bucket_shard(value, shard_count), members))
                .collect()
        })
        .collect();

    let mut plan = BucketPlan::default();
    for buckets in per_band {
        for (shard, members) in buckets {
            plan.buckets += 1;
            plan.members += members.len();
            plan.union_lists.entry(shard).or_default().push(members);
        }
    }
    plan
}
