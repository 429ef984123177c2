use bts_dedup::lsh::UnionLists;
use bts_dedup::model::merge_edge_batches;
use bts_dedup::{
    ConvergenceReport, DedupConfig, DuplicateFilter, EdgeBatches, MergeCoordinator, NodeId,
    ShardUnionFind,
};

pub const QUEUE_CAPACITY: usize = 16;

#[allow(dead_code)]
pub fn ids(raw: &[u128]) -> Vec<NodeId> {
    raw.iter().map(|&id| NodeId(id)).collect()
}

/// Route each list to the given shard.
#[allow(dead_code)]
pub fn route(lists: &[(usize, Vec<NodeId>)]) -> UnionLists {
    let mut routed = UnionLists::default();
    for (shard, list) in lists {
        routed.entry(*shard).or_default().push(list.clone());
    }
    routed
}

/// Spin up fresh shard actors, run the protocol, and build the filter.
#[allow(dead_code)]
pub async fn converge(
    shard_count: usize,
    lists: UnionLists,
) -> anyhow::Result<(ConvergenceReport, DuplicateFilter)> {
    let coordinator = MergeCoordinator::spawn(shard_count, QUEUE_CAPACITY);
    let (report, node_sets) = coordinator.run(lists).await?;
    Ok((report, DuplicateFilter::new(node_sets)))
}

#[allow(dead_code)]
pub fn config_with_shards(num_shards: usize) -> DedupConfig {
    DedupConfig {
        num_shards,
        ..DedupConfig::default()
    }
}

/// The coordinator's protocol driven directly over in-process shards,
/// without actors. Returns the communicate rounds and the filter.
#[allow(dead_code)]
pub fn converge_in_process(shard_count: usize, lists: &UnionLists) -> (usize, DuplicateFilter) {
    fn exchange(shards: &mut [ShardUnionFind], batches: Vec<EdgeBatches>) {
        for (shard, edges) in merge_edge_batches(batches) {
            shards[shard].receive_edges(edges);
        }
    }

    let mut shards: Vec<ShardUnionFind> = (0..shard_count)
        .map(|shard_id| ShardUnionFind::new(shard_id, shard_count))
        .collect();
    for (&shard, routed) in lists {
        for list in routed {
            shards[shard].union_list(list);
        }
    }
    shards.iter_mut().for_each(ShardUnionFind::rebalance);
    let batches = shards.iter_mut().map(|s| s.edge_redistribution()).collect();
    exchange(&mut shards, batches);
    shards.iter_mut().for_each(|s| {
        s.balanced_union_find();
    });

    let mut rounds = 0;
    loop {
        rounds += 1;
        assert!(rounds <= 64, "no fixpoint after 64 rounds");
        let batches = shards.iter_mut().map(|s| s.communicate()).collect();
        exchange(&mut shards, batches);
        let changed = shards
            .iter_mut()
            .map(|s| s.balanced_union_find())
            .fold(false, |any, changed| any | changed);
        if !changed {
            break;
        }
    }
    let node_sets = shards.iter().map(ShardUnionFind::nodes).collect();
    (rounds, DuplicateFilter::new(node_sets))
}
