//! # MinHash Signatures
//!
//! Seeded affine permutations over 32-bit shingle hashes, the per-permutation
//! minimum, and the split of the permutation vector into LSH bands.
//!
//! ## Band / row selection
//!
//! When `num_bands` and `num_rows_per_band` are not configured, they are
//! chosen by [`optimal_param`], which enumerates every `(b, r)` with
//! `b * r <= num_permutations` and minimizes the weighted sum of the
//! false-positive and false-negative areas under the LSH S-curve
//! `P(s) = 1 - (1 - s^r)^b`.

use crate::config::{
    DedupConfig, FALSE_NEGATIVE_WEIGHT, FALSE_POSITIVE_WEIGHT, INTEGRATION_STEPS, MAX_HASH,
    MERSENNE_PRIME,
};
use crate::error::{DedupError, StageFailure};
use crate::model::{BandValue, Signature};
use crate::tokenize::Shingler;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::FxHashSet;
use tracing::debug;
use xxhash_rust::xxh32::xxh32;

/// Resolved LSH shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LshParams {
    pub num_bands: usize,
    pub num_rows_per_band: usize,
}

impl LshParams {
    /// Use the configured shape, or derive one from the threshold.
    pub fn resolve(config: &DedupConfig) -> Self {
        match (config.num_bands, config.num_rows_per_band) {
            (Some(num_bands), Some(num_rows_per_band)) => Self {
                num_bands,
                num_rows_per_band,
            },
            _ => {
                let (num_bands, num_rows_per_band) =
                    optimal_param(config.jaccard_threshold, config.num_permutations);
                debug!(
                    num_bands,
                    num_rows_per_band,
                    threshold = config.jaccard_threshold,
                    "derived LSH parameters"
                );
                Self {
                    num_bands,
                    num_rows_per_band,
                }
            }
        }
    }

    /// Permutation index range covered by `band`.
    pub fn band_range(&self, band: usize) -> std::ops::Range<usize> {
        let start = band * self.num_rows_per_band;
        start..start + self.num_rows_per_band
    }
}

/// Composite Simpson's rule over `[a, b]`.
fn integrate<F: Fn(f64) -> f64>(f: F, a: f64, b: f64) -> f64 {
    if b <= a {
        return 0.0;
    }
    let n = INTEGRATION_STEPS;
    let h = (b - a) / n as f64;
    let mut sum = f(a) + f(b);
    for i in 1..n {
        let weight = if i % 2 == 1 { 4.0 } else { 2.0 };
        sum += weight * f(a + i as f64 * h);
    }
    sum * h / 3.0
}

fn false_positive_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(
        |s| 1.0 - (1.0 - s.powi(rows as i32)).powi(bands as i32),
        0.0,
        threshold,
    )
}

fn false_negative_area(threshold: f64, bands: usize, rows: usize) -> f64 {
    integrate(
        |s| (1.0 - s.powi(rows as i32)).powi(bands as i32),
        threshold,
        1.0,
    )
}

/// Band and row counts minimizing the weighted LSH error for `threshold`.
pub fn optimal_param(threshold: f64, num_permutations: usize) -> (usize, usize) {
    let mut min_error = f64::INFINITY;
    let mut best = (1, 1);
    for bands in 1..=num_permutations {
        let max_rows = num_permutations / bands;
        for rows in 1..=max_rows {
            let fp = false_positive_area(threshold, bands, rows);
            let fn_ = false_negative_area(threshold, bands, rows);
            let error = fp * FALSE_POSITIVE_WEIGHT + fn_ * FALSE_NEGATIVE_WEIGHT;
            if error < min_error {
                min_error = error;
                best = (bands, rows);
            }
        }
    }
    best
}

/// Computes banded MinHash signatures from document text.
#[derive(Debug)]
pub struct MinHasher {
    shingler: Shingler,
    params: LshParams,
    perm_a: Vec<u64>,
    perm_b: Vec<u64>,
}

impl MinHasher {
    pub fn from_config(config: &DedupConfig) -> Result<Self, DedupError> {
        let shingler = Shingler::from_config(config)?;
        let params = LshParams::resolve(config);
        Ok(Self::with_parts(
            shingler,
            params,
            config.num_permutations,
            config.seed,
        ))
    }

    pub fn with_parts(
        shingler: Shingler,
        params: LshParams,
        num_permutations: usize,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm_a = Vec::with_capacity(num_permutations);
        let mut perm_b = Vec::with_capacity(num_permutations);
        for _ in 0..num_permutations {
            perm_a.push(rng.random_range(1..MERSENNE_PRIME));
            perm_b.push(rng.random_range(0..MERSENNE_PRIME));
        }
        Self {
            shingler,
            params,
            perm_a,
            perm_b,
        }
    }

    pub fn params(&self) -> LshParams {
        self.params
    }

    pub fn num_permutations(&self) -> usize {
        self.perm_a.len()
    }

    /// Per-permutation minimum over the shingle set.
    ///
    /// An empty set yields all `MAX_HASH`, so every empty document
    /// shares every band.
    pub fn hash_values(&self, shingles: &FxHashSet<String>) -> Vec<u32> {
        let mut mins = vec![MAX_HASH; self.perm_a.len()];
        for shingle in shingles {
            let hv = xxh32(shingle.as_bytes(), 0) as u128;
            for (slot, (&a, &b)) in mins.iter_mut().zip(self.perm_a.iter().zip(&self.perm_b)) {
                let permuted = ((hv * a as u128 + b as u128) % MERSENNE_PRIME as u128) as u32;
                if permuted < *slot {
                    *slot = permuted;
                }
            }
        }
        mins
    }

    /// Slice hash values into bands; trailing permutations that do not
    /// fill a whole band are dropped.
    pub fn bands(&self, hash_values: &[u32]) -> Signature {
        let bands = (0..self.params.num_bands)
            .map(|band| BandValue::encode(band, &hash_values[self.params.band_range(band)]))
            .collect();
        Signature { bands }
    }

    pub fn signature(&self, text: &str) -> Result<Signature, StageFailure> {
        let shingles = self.shingler.shingles(text)?;
        Ok(self.bands(&self.hash_values(&shingles)))
    }
}
