//! # Merge Coordinator
//!
//! Drives the shard actors through the bulk-synchronous convergence protocol.
//! Every step is a superstep: one command goes to every shard, and no command
//! of the next step is sent until all replies of this step are in.
//!
//! ```text
//!   union lists ─▶ rebalance ─▶ edge redistribution ─▶ exchange ─▶ balanced union-find
//!                                                                     │
//!            ┌───────────────────────────────────────────────────────┘
//!            ▼
//!        communicate ─▶ exchange ─▶ balanced union-find ─▶ any shard changed? ─ yes ─┐
//!            ▲                                                   │ no               │
//!            └───────────────────────────────────────────────────┼──────────────────┘
//!                                                                ▼
//!                                                        per-shard node sets
//! ```

use crate::error::ShardError;
use crate::lsh::UnionLists;
use crate::model::{merge_edge_batches, EdgeBatches, NodeId};
use crate::sharding::{ShardCommand, ShardDirectory};
use rustc_hash::FxHashSet;
use tokio::sync::oneshot;
use tracing::debug;

/// Counters from one convergence run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConvergenceReport {
    /// Communicate rounds until no shard reported a change.
    pub rounds: usize,
    /// Edges that crossed shard boundaries, over all exchanges.
    pub edges_exchanged: usize,
}

#[derive(Debug)]
pub struct MergeCoordinator {
    directory: ShardDirectory,
}

impl MergeCoordinator {
    pub fn new(directory: ShardDirectory) -> Self {
        Self { directory }
    }

    /// Spawn `shard_count` shard actors and coordinate them.
    pub fn spawn(shard_count: usize, queue_capacity: usize) -> Self {
        Self::new(ShardDirectory::spawn(shard_count, queue_capacity))
    }

    pub fn shard_count(&self) -> usize {
        self.directory.len()
    }

    pub fn directory(&self) -> &ShardDirectory {
        &self.directory
    }

    /// Send one command to every shard, then wait for every reply.
    async fn broadcast<T, F>(&self, build: F) -> Result<Vec<T>, ShardError>
    where
        F: Fn(oneshot::Sender<T>) -> ShardCommand,
    {
        let mut pending = Vec::with_capacity(self.directory.len());
        for handle in self.directory.iter() {
            pending.push((handle, handle.dispatch(&build).await?));
        }
        let mut replies = Vec::with_capacity(pending.len());
        for (handle, rx) in pending {
            replies.push(handle.reply(rx).await?);
        }
        Ok(replies)
    }

    /// Regroup batches by destination and deliver them. Returns the edge count.
    async fn exchange(&self, batches: Vec<EdgeBatches>) -> Result<usize, ShardError> {
        let merged = merge_edge_batches(batches);
        let mut destinations: Vec<(usize, _)> = merged.into_iter().collect();
        destinations.sort_unstable_by_key(|(shard, _)| *shard);

        let mut sent = 0;
        let mut pending = Vec::with_capacity(destinations.len());
        for (shard, edges) in destinations {
            sent += edges.len();
            let handle = self.directory.get(shard)?;
            let rx = handle
                .dispatch(|respond_to| ShardCommand::ReceiveEdges { edges, respond_to })
                .await?;
            pending.push((handle, rx));
        }
        for (handle, rx) in pending {
            handle.reply(rx).await?;
        }
        Ok(sent)
    }

    /// Hand each shard the union lists routed to it. Returns how many lists were applied.
    pub async fn dispatch_union_lists(&self, lists: UnionLists) -> Result<usize, ShardError> {
        let mut routed: Vec<(usize, Vec<Vec<NodeId>>)> = lists.into_iter().collect();
        routed.sort_unstable_by_key(|(shard, _)| *shard);

        let mut pending = Vec::with_capacity(routed.len());
        for (shard, lists) in routed {
            let handle = self.directory.get(shard)?;
            let rx = handle
                .dispatch(|respond_to| ShardCommand::UnionLists { lists, respond_to })
                .await?;
            pending.push((handle, rx));
        }
        let mut applied = 0;
        for (handle, rx) in pending {
            applied += handle.reply(rx).await?;
        }
        Ok(applied)
    }

    /// Run the protocol until a round passes in which no shard changed.
    pub async fn converge(&self) -> Result<ConvergenceReport, ShardError> {
        let mut report = ConvergenceReport::default();

        self.broadcast(|respond_to| ShardCommand::Rebalance { respond_to })
            .await?;
        let batches = self
            .broadcast(|respond_to| ShardCommand::EdgeRedistribution { respond_to })
            .await?;
        report.edges_exchanged += self.exchange(batches).await?;
        self.broadcast(|respond_to| ShardCommand::BalancedUnionFind { respond_to })
            .await?;

        loop {
            report.rounds += 1;
            let batches = self
                .broadcast(|respond_to| ShardCommand::Communicate { respond_to })
                .await?;
            let sent = self.exchange(batches).await?;
            report.edges_exchanged += sent;

            let changed = self
                .broadcast(|respond_to| ShardCommand::BalancedUnionFind { respond_to })
                .await?
                .into_iter()
                .filter(|&changed| changed)
                .count();
            debug!(round = report.rounds, edges = sent, changed, "convergence round");
            if changed == 0 {
                break;
            }
        }
        Ok(report)
    }

    /// Final duplicate node set of every shard, indexed by shard id.
    pub async fn node_sets(&self) -> Result<Vec<FxHashSet<NodeId>>, ShardError> {
        self.broadcast(|respond_to| ShardCommand::Nodes { respond_to })
            .await
    }

    /// Dispatch, converge, and collect node sets in one call.
    pub async fn run(
        &self,
        lists: UnionLists,
    ) -> Result<(ConvergenceReport, Vec<FxHashSet<NodeId>>), ShardError> {
        self.dispatch_union_lists(lists).await?;
        let report = self.converge().await?;
        let node_sets = self.node_sets().await?;
        Ok((report, node_sets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lists_on(shard: usize, lists: &[&[u128]]) -> UnionLists {
        let mut routed = UnionLists::default();
        routed.insert(
            shard,
            lists
                .iter()
                .map(|list| list.iter().map(|&id| NodeId(id)).collect())
                .collect(),
        );
        routed
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_shard_converges_immediately() {
        let coordinator = MergeCoordinator::spawn(1, 8);
        let (report, node_sets) = coordinator
            .run(lists_on(0, &[&[1, 2], &[2, 3]]))
            .await
            .unwrap();
        assert_eq!(report.rounds, 1);
        assert_eq!(report.edges_exchanged, 0);
        let expected: FxHashSet<NodeId> = [NodeId(2), NodeId(3)].into_iter().collect();
        assert_eq!(node_sets, vec![expected]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_lists_means_no_duplicates() {
        let coordinator = MergeCoordinator::spawn(4, 8);
        let (report, node_sets) = coordinator.run(UnionLists::default()).await.unwrap();
        assert_eq!(report.rounds, 1);
        assert!(node_sets.iter().all(|set| set.is_empty()));
    }

    #[tokio::test]
    async fn test_list_for_unknown_shard_fails() {
        let coordinator = MergeCoordinator::spawn(2, 8);
        let err = coordinator
            .dispatch_union_lists(lists_on(5, &[&[1, 2]]))
            .await
            .unwrap_err();
        assert!(matches!(err, ShardError::UnknownShard { shard: 5, count: 2 }));
    }
}
