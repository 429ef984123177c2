//! # bts-dedup
//!
//! Near-duplicate detection for large text corpora. Documents are fingerprinted
//! with MinHash/LSH, candidate-similar documents are linked through shared band
//! buckets, and the connected components of that graph are found by a sharded,
//! bulk-synchronous union-find. Each component keeps exactly one survivor: the
//! document with the smallest id.
//!
//! ```no_run
//! use bts_dedup::{DedupConfig, Deduplicator};
//!
//! # async fn demo(records: Vec<bts_dedup::Record>) -> Result<(), bts_dedup::DedupError> {
//! let dedup = Deduplicator::new(DedupConfig::default())?;
//! let outcome = dedup.run(records).await?;
//! println!("kept {} of {}", outcome.report.kept, outcome.report.documents);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod coordinator;
pub mod dsu;
pub mod error;
pub mod filter;
pub mod io;
pub mod lsh;
pub mod minhash;
pub mod model;
pub mod pipeline;
pub mod sharding;
pub mod test_support;
pub mod tokenize;

// Re-export main types for convenience
pub use config::{ConfigOverrides, DedupConfig, Tokenization};
pub use coordinator::{ConvergenceReport, MergeCoordinator};
pub use dsu::ShardUnionFind;
pub use error::{DedupError, ShardError, Stage, StageFailure};
pub use filter::DuplicateFilter;
pub use minhash::{optimal_param, LshParams, MinHasher};
pub use model::{BandValue, Edge, EdgeBatches, NodeId, Record, Signature, SignedDocument};
pub use pipeline::{Classification, DedupOutcome, DedupReport, Deduplicator, StageTimings};
pub use sharding::{ShardCommand, ShardDirectory, ShardHandle};
pub use tokenize::Shingler;
