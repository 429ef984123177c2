//! Duplicate classification from converged shard state.

use crate::model::NodeId;
use rustc_hash::FxHashSet;

/// Answers "is this id a duplicate?" from the per-shard node sets.
#[derive(Debug, Clone, Default)]
pub struct DuplicateFilter {
    node_sets: Vec<FxHashSet<NodeId>>,
}

impl DuplicateFilter {
    /// `node_sets[k]` must be the final node set of shard `k`.
    pub fn new(node_sets: Vec<FxHashSet<NodeId>>) -> Self {
        Self { node_sets }
    }

    pub fn shard_count(&self) -> usize {
        self.node_sets.len()
    }

    /// An id is a duplicate iff its owning shard holds it as a non-root key.
    pub fn is_duplicate(&self, id: NodeId) -> bool {
        if self.node_sets.is_empty() {
            return false;
        }
        self.node_sets
            .get(id.shard(self.node_sets.len()))
            .is_some_and(|nodes| nodes.contains(&id))
    }

    pub fn keeps(&self, id: NodeId) -> bool {
        !self.is_duplicate(id)
    }

    /// Number of duplicates held by their owning shard.
    pub fn duplicate_count(&self) -> usize {
        let shard_count = self.node_sets.len();
        self.node_sets
            .iter()
            .enumerate()
            .map(|(shard, nodes)| {
                nodes
                    .iter()
                    .filter(|id| id.shard(shard_count) == shard)
                    .count()
            })
            .sum()
    }

    /// Keep the items whose id is not a duplicate, preserving order.
    pub fn retain<T>(&self, items: impl IntoIterator<Item = (NodeId, T)>) -> Vec<T> {
        items
            .into_iter()
            .filter(|(id, _)| self.keeps(*id))
            .map(|(_, item)| item)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[u128]) -> FxHashSet<NodeId> {
        ids.iter().map(|&id| NodeId(id)).collect()
    }

    #[test]
    fn test_only_owning_shard_counts() {
        // 3 is held by shard 0 but owned by shard 1.
        let filter = DuplicateFilter::new(vec![set(&[2, 3]), set(&[5])]);
        assert!(filter.is_duplicate(NodeId(2)));
        assert!(filter.is_duplicate(NodeId(5)));
        assert!(!filter.is_duplicate(NodeId(3)));
        assert!(filter.keeps(NodeId(1)));
        assert_eq!(filter.duplicate_count(), 2);
    }

    #[test]
    fn test_retain_preserves_order() {
        let filter = DuplicateFilter::new(vec![set(&[4, 6])]);
        let kept = filter.retain((1..=6).map(|id| (NodeId(id), id)));
        assert_eq!(kept, vec![1, 2, 3, 5]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let filter = DuplicateFilter::default();
        assert!(filter.keeps(NodeId(42)));
        assert_eq!(filter.shard_count(), 0);
    }
}
