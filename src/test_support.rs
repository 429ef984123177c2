//! Seeded synthetic corpora and union-list generators shared by tests and benches.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::lsh::UnionLists;
use crate::model::{NodeId, Record};

/// A record whose only field is `text`.
pub fn record(text: &str) -> Record {
    let mut record = Record::new();
    record.insert(
        "text".to_string(),
        serde_json::Value::String(text.to_string()),
    );
    record
}

#[derive(Debug, Clone)]
pub struct GeneratedCorpus {
    pub records: Vec<Record>,
    /// Family of each record, in record order
    pub families: Vec<usize>,
}

impl GeneratedCorpus {
    pub fn family_count(&self) -> usize {
        self.families.iter().collect::<FxHashSet<_>>().len()
    }
}

/// Text of `words` tokens drawn from a vocabulary private to `family`.
///
/// Vocabularies never overlap between families, so two families share no
/// shingle.
fn family_text(rng: &mut StdRng, family: usize, words: usize) -> String {
    (0..words)
        .map(|_| format!("f{family}w{}", rng.random_range(0..1000u32)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// `families` groups of `copies` records each. Copies in a family have the
/// same shingle set but differ in case and spacing; records are shuffled.
pub fn generate_near_duplicates(
    families: usize,
    copies: usize,
    words: usize,
    seed: u64,
) -> GeneratedCorpus {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut rows = Vec::with_capacity(families * copies);
    for family in 0..families {
        let base = family_text(&mut rng, family, words);
        for copy in 0..copies {
            let text = match copy % 3 {
                0 => base.clone(),
                1 => base.to_uppercase(),
                _ => base.replace(' ', "  "),
            };
            rows.push((family, text));
        }
    }
    for i in (1..rows.len()).rev() {
        let j = rng.random_range(0..=i);
        rows.swap(i, j);
    }
    GeneratedCorpus {
        records: rows.iter().map(|(_, text)| record(text)).collect(),
        families: rows.iter().map(|(family, _)| *family).collect(),
    }
}

/// `count` records with pairwise disjoint vocabularies.
pub fn generate_distinct(count: usize, words: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|doc| record(&family_text(&mut rng, doc, words)))
        .collect()
}

/// Random candidate groups over ids `1..=nodes`, each routed to a random shard.
pub fn generate_union_lists(
    nodes: u128,
    lists: usize,
    max_len: usize,
    shard_count: usize,
    seed: u64,
) -> UnionLists {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut routed = UnionLists::default();
    for _ in 0..lists {
        let len = rng.random_range(2..=max_len.max(2));
        let list = (0..len)
            .map(|_| NodeId(rng.random_range(1..=nodes)))
            .collect();
        routed
            .entry(rng.random_range(0..shard_count))
            .or_default()
            .push(list);
    }
    routed
}

/// Every id that is not the minimum of its component, by a plain
/// single-threaded union-find over the same lists.
pub fn expected_duplicates(lists: &UnionLists) -> FxHashSet<NodeId> {
    let mut parent: FxHashMap<NodeId, NodeId> = FxHashMap::default();
    fn root(parent: &FxHashMap<NodeId, NodeId>, mut x: NodeId) -> NodeId {
        while let Some(&next) = parent.get(&x) {
            x = next;
        }
        x
    }
    for list in lists.values().flatten() {
        for pair in list.windows(2) {
            let a = root(&parent, pair[0]);
            let b = root(&parent, pair[1]);
            if a != b {
                parent.insert(a.max(b), a.min(b));
            }
        }
    }
    parent.keys().copied().collect()
}
