//! # Sharded Union-Find
//!
//! One shard of the distributed disjoint-set forest. Each shard keeps a
//! partial parent relation (only non-root nodes are keys) and a buffer of
//! edges received from other shards. Shards never share memory; the only way
//! state moves between them is the edge batches returned by
//! [`ShardUnionFind::edge_redistribution`] and [`ShardUnionFind::communicate`].
//!
//! Roots are always the smallest id of a component: `union` attaches the
//! larger root under the smaller one, so after global convergence the
//! surviving representative of every component is its minimum id.

use crate::model::{Edge, EdgeBatches, NodeId};
use rustc_hash::{FxHashMap, FxHashSet};

/// Union-find state owned by a single shard.
#[derive(Debug, Clone)]
pub struct ShardUnionFind {
    shard_id: usize,
    shard_count: usize,
    /// Non-root nodes only
    parent: FxHashMap<NodeId, NodeId>,
    /// Parent relation as it was when `rebalance` last started
    old_parent: FxHashMap<NodeId, NodeId>,
    /// Parent relation at the end of the previous `balanced_union_find`
    settled: FxHashMap<NodeId, NodeId>,
    edge_buffer: Vec<Edge>,
    outbox: EdgeBatches,
}

impl ShardUnionFind {
    pub fn new(shard_id: usize, shard_count: usize) -> Self {
        debug_assert!(shard_id < shard_count);
        Self {
            shard_id,
            shard_count,
            parent: FxHashMap::default(),
            old_parent: FxHashMap::default(),
            settled: FxHashMap::default(),
            edge_buffer: Vec::new(),
            outbox: EdgeBatches::default(),
        }
    }

    pub fn shard_id(&self) -> usize {
        self.shard_id
    }

    pub fn shard_count(&self) -> usize {
        self.shard_count
    }

    #[inline]
    fn owns(&self, node: NodeId) -> bool {
        node.shard(self.shard_count) == self.shard_id
    }

    /// Root of `x`, compressing the whole path behind it.
    pub fn find(&mut self, x: NodeId) -> NodeId {
        let mut root = x;
        while let Some(&next) = self.parent.get(&root) {
            root = next;
        }
        let mut node = x;
        while node != root {
            match self.parent.insert(node, root) {
                Some(next) => node = next,
                None => break,
            }
        }
        root
    }

    /// Merge the components of `x` and `y`; the larger root goes under the smaller.
    pub fn union(&mut self, x: NodeId, y: NodeId) {
        let rx = self.find(x);
        let ry = self.find(y);
        if rx == ry {
            return;
        }
        let (small, large) = if rx < ry { (rx, ry) } else { (ry, rx) };
        self.parent.insert(large, small);
    }

    /// Merge every id in `ids` into one component rooted at the minimum root.
    pub fn union_list(&mut self, ids: &[NodeId]) {
        let roots: Vec<NodeId> = ids.iter().map(|&id| self.find(id)).collect();
        let Some(&min_root) = roots.iter().min() else {
            return;
        };
        for root in roots {
            if root != min_root {
                self.parent.insert(root, min_root);
            }
        }
    }

    pub fn receive_edges(&mut self, edges: Vec<Edge>) {
        if self.edge_buffer.is_empty() {
            self.edge_buffer = edges;
        } else {
            self.edge_buffer.extend(edges);
        }
    }

    /// Re-point every key at the smallest node sharing its root and owning shard.
    ///
    /// Roots are folded into the group they fall in as well, so a group whose
    /// owning shard also owns the root points straight at the root.
    pub fn rebalance(&mut self) {
        self.old_parent = self.parent.clone();

        let keys: Vec<NodeId> = self.parent.keys().copied().collect();
        let resolved: Vec<(NodeId, NodeId)> =
            keys.into_iter().map(|x| (x, self.find(x))).collect();

        let mut targets: FxHashMap<(NodeId, usize), NodeId> = FxHashMap::default();
        let mut keep_min = |root: NodeId, node: NodeId| {
            targets
                .entry((root, node.shard(self.shard_count)))
                .and_modify(|target| {
                    if node < *target {
                        *target = node;
                    }
                })
                .or_insert(node);
        };
        for &(x, root) in &resolved {
            keep_min(root, x);
        }
        let roots: FxHashSet<NodeId> = resolved.iter().map(|&(_, root)| root).collect();
        for root in roots {
            keep_min(root, root);
        }

        for (x, root) in resolved {
            if let Some(&target) = targets.get(&(root, x.shard(self.shard_count))) {
                if target != x {
                    self.parent.insert(x, target);
                }
            }
        }
    }

    /// Queue `(u, v)` for the owner of `u` and `(v, u)` for the owner of `v`.
    fn distribute_edge(&mut self, u: NodeId, v: NodeId) {
        let hu = u.shard(self.shard_count);
        let hv = v.shard(self.shard_count);
        self.outbox.entry(hu).or_default().push((u, v));
        if hu != hv {
            self.outbox.entry(hv).or_default().push((v, u));
        }
    }

    /// Move edges addressed to this shard from the outbox into the buffer.
    fn simplify(&mut self) {
        if let Some(own) = self.outbox.remove(&self.shard_id) {
            self.receive_edges(own);
        }
    }

    fn take_outbox(&mut self) -> EdgeBatches {
        std::mem::take(&mut self.outbox)
    }

    /// Hand every local `(node, parent)` pair to the owners of both ends and
    /// drop the local relation. Returns the batches bound for other shards.
    pub fn edge_redistribution(&mut self) -> EdgeBatches {
        self.outbox.clear();
        let pairs: Vec<Edge> = self.parent.iter().map(|(&u, &v)| (u, v)).collect();
        for (u, v) in pairs {
            self.distribute_edge(u, v);
        }
        self.simplify();
        self.parent.clear();
        self.take_outbox()
    }

    /// Send only what changed: owned pairs whose parent moved during the
    /// last rebalance, and every foreign pair. Foreign keys are dropped
    /// afterwards, so each one has to reach its owner first.
    pub fn communicate(&mut self) -> EdgeBatches {
        self.outbox.clear();
        let mut outgoing = Vec::new();
        let mut foreign = Vec::new();
        for (&u, &v) in &self.parent {
            let owned = self.owns(u);
            if !owned || self.old_parent.get(&u) != Some(&v) {
                outgoing.push((u, v));
            }
            if !owned {
                foreign.push(u);
            }
        }
        for (u, v) in outgoing {
            self.distribute_edge(u, v);
        }
        for u in foreign {
            self.parent.remove(&u);
        }
        self.simplify();
        self.take_outbox()
    }

    /// Fold buffered edges in, rebalance, and report whether the relation
    /// differs from where the previous call left it.
    pub fn balanced_union_find(&mut self) -> bool {
        let edges = std::mem::take(&mut self.edge_buffer);
        for (x, y) in edges {
            self.union(x, y);
        }
        self.rebalance();
        let changed = self.parent != self.settled;
        self.settled = self.parent.clone();
        changed
    }

    /// Keys of the parent relation: every node known here not to be a root.
    pub fn nodes(&self) -> FxHashSet<NodeId> {
        self.parent.keys().copied().collect()
    }

    pub fn parent(&self) -> &FxHashMap<NodeId, NodeId> {
        &self.parent
    }

    pub fn pending_edges(&self) -> usize {
        self.edge_buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[u128]) -> Vec<NodeId> {
        raw.iter().map(|&id| NodeId(id)).collect()
    }

    #[test]
    fn test_find_absent_is_root() {
        let mut dsu = ShardUnionFind::new(0, 1);
        assert_eq!(dsu.find(NodeId(9)), NodeId(9));
        assert!(dsu.parent().is_empty());
    }

    #[test]
    fn test_union_attaches_larger_root() {
        let mut dsu = ShardUnionFind::new(0, 1);
        dsu.union(NodeId(7), NodeId(3));
        assert_eq!(dsu.parent().get(&NodeId(7)), Some(&NodeId(3)));
        dsu.union(NodeId(3), NodeId(7));
        assert_eq!(dsu.parent().len(), 1);
    }

    #[test]
    fn test_find_compresses_path() {
        let mut dsu = ShardUnionFind::new(0, 1);
        dsu.union(NodeId(3), NodeId(4));
        dsu.union(NodeId(2), NodeId(3));
        dsu.union(NodeId(1), NodeId(2));
        assert_eq!(dsu.parent().get(&NodeId(4)), Some(&NodeId(3)));

        assert_eq!(dsu.find(NodeId(4)), NodeId(1));
        for id in 2..=4 {
            assert_eq!(dsu.parent().get(&NodeId(id)), Some(&NodeId(1)));
        }
    }

    #[test]
    fn test_union_list_uses_minimum_root() {
        let mut dsu = ShardUnionFind::new(0, 1);
        dsu.union(NodeId(2), NodeId(8));
        dsu.union_list(&ids(&[9, 8, 5]));
        for id in [5, 8, 9] {
            assert_eq!(dsu.find(NodeId(id)), NodeId(2));
        }
        dsu.union_list(&[]);
        assert_eq!(dsu.nodes().len(), 3);
    }

    #[test]
    fn test_rebalance_groups_by_root_and_shard() {
        let mut dsu = ShardUnionFind::new(0, 2);
        dsu.union_list(&ids(&[1, 2, 3, 4, 5, 6]));
        dsu.rebalance();

        let parent = dsu.parent();
        // Even ids live on shard 0 and hang off 2, which keeps root 1.
        assert_eq!(parent[&NodeId(2)], NodeId(1));
        assert_eq!(parent[&NodeId(4)], NodeId(2));
        assert_eq!(parent[&NodeId(6)], NodeId(2));
        // Odd ids share the root's shard and point at it directly.
        assert_eq!(parent[&NodeId(3)], NodeId(1));
        assert_eq!(parent[&NodeId(5)], NodeId(1));
    }

    #[test]
    fn test_edge_redistribution_routes_both_ends() {
        let mut dsu = ShardUnionFind::new(0, 2);
        dsu.union(NodeId(1), NodeId(4));
        dsu.rebalance();

        let batches = dsu.edge_redistribution();
        assert!(dsu.parent().is_empty());
        assert_eq!(dsu.pending_edges(), 1);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[&1], vec![(NodeId(1), NodeId(4))]);
    }

    #[test]
    fn test_balanced_union_find_reports_change_once() {
        let mut dsu = ShardUnionFind::new(0, 2);
        dsu.receive_edges(vec![(NodeId(4), NodeId(1))]);
        assert!(dsu.balanced_union_find());
        assert_eq!(dsu.parent().get(&NodeId(4)), Some(&NodeId(1)));
        assert_eq!(dsu.pending_edges(), 0);
        assert!(!dsu.balanced_union_find());
    }

    #[test]
    fn test_communicate_drops_foreign_keys() {
        let mut dsu = ShardUnionFind::new(0, 2);
        // 3 belongs to shard 1, 4 to shard 0.
        dsu.receive_edges(vec![(NodeId(3), NodeId(1)), (NodeId(4), NodeId(1))]);
        dsu.balanced_union_find();

        let batches = dsu.communicate();
        assert!(!dsu.nodes().contains(&NodeId(3)));
        assert!(dsu.nodes().contains(&NodeId(4)));
        assert_eq!(batches[&1], vec![(NodeId(3), NodeId(1))]);
    }

    #[test]
    fn test_communicate_forwards_foreign_chain_before_dropping() {
        // Shard 1 of 5 holds 103 -> 3 -> 1; 103 and 3 are owned by shard 3.
        let mut dsu = ShardUnionFind::new(1, 5);
        dsu.receive_edges(vec![(NodeId(103), NodeId(3)), (NodeId(3), NodeId(1))]);
        dsu.balanced_union_find();
        assert_eq!(dsu.parent().get(&NodeId(103)), Some(&NodeId(3)));

        let batches = dsu.communicate();
        // 103's parent is itself a local key, but the link still has to leave.
        let to_owner = &batches[&3];
        assert!(to_owner.contains(&(NodeId(103), NodeId(3))));
        assert!(to_owner.contains(&(NodeId(3), NodeId(1))));
        assert!(dsu.nodes().is_empty());
        assert_eq!(dsu.pending_edges(), 1);
    }

    #[test]
    fn test_communicate_is_quiet_when_stable() {
        let mut dsu = ShardUnionFind::new(0, 2);
        dsu.receive_edges(vec![(NodeId(4), NodeId(2))]);
        dsu.balanced_union_find();
        let batches = dsu.communicate();
        assert!(batches.is_empty());
        assert_eq!(dsu.pending_edges(), 0);
        assert!(!dsu.balanced_union_find());
    }
}
