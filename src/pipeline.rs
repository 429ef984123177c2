//! # Deduplication Pipeline
//!
//! Runs the four stages one after another, each fully materialized before the
//! next starts:
//!
//! 1. **signature**: mint ids, shingle and MinHash every record (rayon, on a
//!    blocking thread so the shard actors keep their runtime workers)
//! 2. **grouping**: bucket by band value, route union lists, initial unions
//! 3. **convergence**: sharded union-find rounds until fixpoint (tokio actors)
//! 4. **filter**: fetch node sets and keep non-duplicates
//!
//! A failure in any stage aborts the run and names the stage.

use crate::config::DedupConfig;
use crate::coordinator::MergeCoordinator;
use crate::error::{DedupError, Stage, StageFailure};
use crate::filter::DuplicateFilter;
use crate::lsh::group_buckets;
use crate::minhash::{LshParams, MinHasher};
use crate::model::{NodeId, Record, SignedDocument};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

/// Wall-clock time spent in each stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct StageTimings {
    pub signature: Duration,
    pub grouping: Duration,
    pub convergence: Duration,
    pub filter: Duration,
}

/// Summary of one deduplication run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DedupReport {
    pub documents: usize,
    pub kept: usize,
    pub removed: usize,
    pub num_bands: usize,
    pub num_rows_per_band: usize,
    /// Buckets with more than one member
    pub buckets: usize,
    pub rounds: usize,
    pub edges_exchanged: usize,
    pub timings: StageTimings,
}

/// Keep/drop decision for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub id: NodeId,
    pub duplicate: bool,
}

/// Surviving records plus the run report.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    pub kept: Vec<Record>,
    pub report: DedupReport,
}

struct Analysis {
    ids: Vec<NodeId>,
    filter: DuplicateFilter,
    report: DedupReport,
}

/// MinHash/LSH near-duplicate remover backed by sharded union-find.
#[derive(Debug)]
pub struct Deduplicator {
    config: DedupConfig,
    hasher: Arc<MinHasher>,
}

fn sign_records(
    hasher: &MinHasher,
    key: &str,
    ids: &[NodeId],
    records: &[Record],
) -> Result<Vec<SignedDocument>, DedupError> {
    records
        .par_iter()
        .zip(ids.par_iter())
        .enumerate()
        .map(|(index, (record, &id))| {
            let text = record
                .get(key)
                .and_then(|value| value.as_str())
                .ok_or_else(|| StageFailure::MissingText {
                    index,
                    key: key.to_string(),
                })?;
            let signature = hasher.signature(text)?;
            Ok(SignedDocument { id, signature })
        })
        .collect::<Result<Vec<_>, StageFailure>>()
        .map_err(|err| DedupError::stage(Stage::Signature, err))
}

impl Deduplicator {
    /// Validate the configuration and build the signature generator.
    pub fn new(config: DedupConfig) -> Result<Self, DedupError> {
        let hasher = Arc::new(MinHasher::from_config(&config)?);
        Ok(Self { config, hasher })
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }

    pub fn params(&self) -> LshParams {
        self.hasher.params()
    }

    /// One id per record, in input order, reproducible for a given seed.
    pub fn mint_ids(&self, count: usize) -> Vec<NodeId> {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        (0..count).map(|_| NodeId::mint(&mut rng)).collect()
    }

    /// Signature stage: id and banded signature for every record.
    pub fn sign(&self, records: &[Record]) -> Result<Vec<SignedDocument>, DedupError> {
        let ids = self.mint_ids(records.len());
        sign_records(&self.hasher, &self.config.text_key, &ids, records)
    }

    /// Runs every stage. The records are handed to the signing thread and
    /// come back alongside the analysis.
    async fn analyze(
        &self,
        records: Vec<Record>,
    ) -> Result<(Vec<Record>, Analysis), DedupError> {
        let params = self.params();
        let mut report = DedupReport {
            documents: records.len(),
            num_bands: params.num_bands,
            num_rows_per_band: params.num_rows_per_band,
            ..DedupReport::default()
        };

        let started = Instant::now();
        let ids = self.mint_ids(records.len());
        let hasher = Arc::clone(&self.hasher);
        let key = self.config.text_key.clone();
        let (records, documents) = tokio::task::spawn_blocking(move || {
            let documents = sign_records(&hasher, &key, &ids, &records);
            (records, documents)
        })
        .await
        .map_err(|err| DedupError::stage(Stage::Signature, err))?;
        let documents = documents?;
        let ids: Vec<NodeId> = documents.iter().map(|doc| doc.id).collect();
        report.timings.signature = started.elapsed();
        info!(
            documents = documents.len(),
            elapsed_ms = report.timings.signature.as_millis() as u64,
            "computed MinHash signatures"
        );

        let started = Instant::now();
        let plan = group_buckets(&documents, self.config.num_shards);
        drop(documents);
        report.buckets = plan.buckets;
        let coordinator =
            MergeCoordinator::spawn(self.config.num_shards, self.config.shard_queue_capacity);
        coordinator
            .dispatch_union_lists(plan.union_lists)
            .await
            .map_err(|err| DedupError::stage(Stage::Grouping, err))?;
        report.timings.grouping = started.elapsed();
        info!(
            buckets = plan.buckets,
            members = plan.members,
            elapsed_ms = report.timings.grouping.as_millis() as u64,
            "grouped candidate buckets"
        );

        let started = Instant::now();
        let convergence = coordinator
            .converge()
            .await
            .map_err(|err| DedupError::stage(Stage::Convergence, err))?;
        report.rounds = convergence.rounds;
        report.edges_exchanged = convergence.edges_exchanged;
        report.timings.convergence = started.elapsed();
        info!(
            rounds = convergence.rounds,
            edges = convergence.edges_exchanged,
            shards = coordinator.shard_count(),
            elapsed_ms = report.timings.convergence.as_millis() as u64,
            "union-find converged"
        );

        let started = Instant::now();
        let node_sets = coordinator
            .node_sets()
            .await
            .map_err(|err| DedupError::stage(Stage::Filter, err))?;
        let filter = DuplicateFilter::new(node_sets);
        report.removed = filter.duplicate_count();
        report.kept = report.documents.saturating_sub(report.removed);
        report.timings.filter = started.elapsed();

        Ok((
            records,
            Analysis {
                ids,
                filter,
                report,
            },
        ))
    }

    /// Decide keep/drop for every record without removing any.
    pub async fn classify(&self, records: &[Record]) -> Result<Vec<Classification>, DedupError> {
        let (_, analysis) = self.analyze(records.to_vec()).await?;
        Ok(analysis
            .ids
            .into_iter()
            .map(|id| Classification {
                id,
                duplicate: analysis.filter.is_duplicate(id),
            })
            .collect())
    }

    /// Remove near-duplicates, keeping the minimum-id record of each component.
    pub async fn run(&self, records: Vec<Record>) -> Result<DedupOutcome, DedupError> {
        let (
            records,
            Analysis {
                ids,
                filter,
                mut report,
            },
        ) = self.analyze(records).await?;

        let started = Instant::now();
        let kept = filter.retain(ids.into_iter().zip(records));
        report.timings.filter += started.elapsed();
        report.kept = kept.len();
        report.removed = report.documents - kept.len();
        info!(
            kept = report.kept,
            removed = report.removed,
            elapsed_ms = report.timings.filter.as_millis() as u64,
            "kept {} samples after MinHash dedup",
            report.kept
        );
        Ok(DedupOutcome { kept, report })
    }
}
