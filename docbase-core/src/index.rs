// src/index.rs
// B+ Tree Index Implementation
//
// One OrderedIndex per (collection, field). Keys are normalized field values,
// each key owns the set of ids of the documents carrying that value.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::ops::Bound;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Document, DocumentId};
use crate::error::{Result, StoreError};

/// Smallest fan-out that still lets a full node split into two non-empty halves
pub const MIN_BRANCHING_FACTOR: usize = 3;

/// Ids sharing one key, kept sorted for deterministic output
pub type DocIdSet = BTreeSet<DocumentId>;

/// f64 with a total order; `-0.0` is normalized to `0.0`
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderedFloat(f64);

impl OrderedFloat {
    pub fn new(value: f64) -> Self {
        if value == 0.0 {
            OrderedFloat(0.0)
        } else {
            OrderedFloat(value)
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

impl PartialEq for OrderedFloat {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for OrderedFloat {}

impl PartialOrd for OrderedFloat {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedFloat {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::hash::Hash for OrderedFloat {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Index key - the indexable subset of document values
///
/// Kinds order Bool < Number < String. Within a kind booleans order
/// false < true, numbers numerically and strings lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IndexKey {
    Bool(bool),
    Number(OrderedFloat),
    String(String),
}

impl IndexKey {
    /// Normalize a document value; null, lists and nested documents are not indexable
    pub fn from_value(value: &Value) -> Option<IndexKey> {
        match value {
            Value::Bool(b) => Some(IndexKey::Bool(*b)),
            Value::Number(n) => n.as_f64().map(|f| IndexKey::Number(OrderedFloat::new(f))),
            Value::String(s) => Some(IndexKey::String(s.clone())),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    pub fn number(value: f64) -> IndexKey {
        IndexKey::Number(OrderedFloat::new(value))
    }

    /// Smallest key of the same kind
    fn kind_lower(&self) -> Bound<IndexKey> {
        match self {
            IndexKey::Bool(_) => Bound::Included(IndexKey::Bool(false)),
            IndexKey::Number(_) => Bound::Included(IndexKey::number(f64::NEG_INFINITY)),
            IndexKey::String(_) => Bound::Included(IndexKey::String(String::new())),
        }
    }

    /// Largest key of the same kind
    fn kind_upper(&self) -> Bound<IndexKey> {
        match self {
            IndexKey::Bool(_) => Bound::Included(IndexKey::Bool(true)),
            IndexKey::Number(_) => Bound::Included(IndexKey::number(f64::INFINITY)),
            IndexKey::String(_) => Bound::Unbounded,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf(LeafNode),
    Internal(InternalNode),
}

/// Leaf node - keys with their id sets, sorted by key
#[derive(Debug, Clone, Default)]
struct LeafNode {
    keys: Vec<IndexKey>,
    doc_ids: Vec<DocIdSet>,
}

/// Internal node - `children[i]` holds keys in `[keys[i-1], keys[i])`
#[derive(Debug, Clone)]
struct InternalNode {
    keys: Vec<IndexKey>,
    children: Vec<Node>,
}

impl Node {
    fn empty() -> Node {
        Node::Leaf(LeafNode::default())
    }

    fn is_empty(&self) -> bool {
        match self {
            Node::Leaf(leaf) => leaf.keys.is_empty(),
            Node::Internal(internal) => internal.children.is_empty(),
        }
    }
}

impl LeafNode {
    fn split(&mut self) -> (IndexKey, Node) {
        let mid = self.keys.len() / 2;
        let keys = self.keys.split_off(mid);
        let doc_ids = self.doc_ids.split_off(mid);
        let separator = keys[0].clone();
        (separator, Node::Leaf(LeafNode { keys, doc_ids }))
    }
}

impl InternalNode {
    fn child_index(&self, key: &IndexKey) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    /// Left keeps `keys[..mid]`, `keys[mid]` moves up, right takes the rest
    fn split(&mut self) -> (IndexKey, Node) {
        let mid = self.keys.len() / 2;
        let mut keys = self.keys.split_off(mid);
        let separator = keys.remove(0);
        let children = self.children.split_off(mid + 1);
        (separator, Node::Internal(InternalNode { keys, children }))
    }

    fn remove_child(&mut self, index: usize) {
        self.children.remove(index);
        if !self.keys.is_empty() {
            self.keys.remove(index.saturating_sub(1));
        }
    }
}

struct InsertOutcome {
    new_key: bool,
    new_entry: bool,
    split: Option<(IndexKey, Node)>,
}

#[derive(Default)]
struct RemoveOutcome {
    removed: bool,
    key_removed: bool,
}

/// B+ tree secondary index over one document field
///
/// All lookups descend from the root, so their cost grows with the tree
/// height (logarithmic in the number of distinct keys) plus the result size.
#[derive(Debug, Clone)]
pub struct OrderedIndex {
    field: String,
    branching_factor: usize,
    root: Node,
    num_keys: usize,
    num_entries: usize,
}

impl OrderedIndex {
    /// Create an empty index; `branching_factor` is the maximum fan-out
    pub fn new(field: impl Into<String>, branching_factor: usize) -> Result<Self> {
        let field = field.into();
        if field.is_empty() {
            return Err(StoreError::Validation(
                "index field name must not be empty".to_string(),
            ));
        }
        if branching_factor < MIN_BRANCHING_FACTOR {
            return Err(StoreError::Validation(format!(
                "branching factor {} is below the minimum of {}",
                branching_factor, MIN_BRANCHING_FACTOR
            )));
        }
        Ok(OrderedIndex {
            field,
            branching_factor,
            root: Node::empty(),
            num_keys: 0,
            num_entries: 0,
        })
    }

    /// Build an index over a document set (full rebuild path)
    pub fn build<'a, I>(field: impl Into<String>, branching_factor: usize, docs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a DocumentId, &'a Document)>,
    {
        let mut index = OrderedIndex::new(field, branching_factor)?;
        let mut grouped: BTreeMap<IndexKey, DocIdSet> = BTreeMap::new();
        for (id, doc) in docs {
            if let Some(key) = index.extract_key(doc) {
                grouped.entry(key).or_default().insert(id.clone());
            }
        }
        index.bulk_load(grouped.into_iter().collect())?;
        Ok(index)
    }

    /// Rebuild from entries sorted by key (persisted snapshot path)
    pub fn from_sorted_entries(
        field: impl Into<String>,
        branching_factor: usize,
        entries: Vec<(IndexKey, DocIdSet)>,
    ) -> Result<Self> {
        let mut index = OrderedIndex::new(field, branching_factor)?;
        index.bulk_load(entries)?;
        Ok(index)
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn branching_factor(&self) -> usize {
        self.branching_factor
    }

    /// Number of (key, id) entries
    pub fn len(&self) -> usize {
        self.num_entries
    }

    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Number of distinct keys
    pub fn num_keys(&self) -> usize {
        self.num_keys
    }

    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut node = &self.root;
        while let Node::Internal(internal) = node {
            height += 1;
            match internal.children.first() {
                Some(child) => node = child,
                None => break,
            }
        }
        height
    }

    /// Key of `doc` for this index, if the field is present and indexable
    pub fn extract_key(&self, doc: &Document) -> Option<IndexKey> {
        doc.get(&self.field).and_then(IndexKey::from_value)
    }

    fn max_keys(&self) -> usize {
        self.branching_factor - 1
    }

    /// Add `doc_id` under `key`; returns false if the pair was already present
    pub fn insert(&mut self, key: IndexKey, doc_id: DocumentId) -> bool {
        let max_keys = self.max_keys();
        let outcome = Self::insert_into(&mut self.root, key, doc_id, max_keys);

        if let Some((separator, right)) = outcome.split {
            let left = std::mem::replace(&mut self.root, Node::empty());
            self.root = Node::Internal(InternalNode {
                keys: vec![separator],
                children: vec![left, right],
            });
        }
        if outcome.new_key {
            self.num_keys += 1;
        }
        if outcome.new_entry {
            self.num_entries += 1;
        }
        outcome.new_entry
    }

    fn insert_into(node: &mut Node, key: IndexKey, doc_id: DocumentId, max_keys: usize) -> InsertOutcome {
        match node {
            Node::Leaf(leaf) => match leaf.keys.binary_search(&key) {
                Ok(pos) => InsertOutcome {
                    new_key: false,
                    new_entry: leaf.doc_ids[pos].insert(doc_id),
                    split: None,
                },
                Err(pos) => {
                    leaf.keys.insert(pos, key);
                    leaf.doc_ids.insert(pos, DocIdSet::from([doc_id]));
                    let split = (leaf.keys.len() > max_keys).then(|| leaf.split());
                    InsertOutcome {
                        new_key: true,
                        new_entry: true,
                        split,
                    }
                }
            },
            Node::Internal(internal) => {
                let child = internal.child_index(&key);
                let mut outcome =
                    Self::insert_into(&mut internal.children[child], key, doc_id, max_keys);
                if let Some((separator, right)) = outcome.split.take() {
                    internal.keys.insert(child, separator);
                    internal.children.insert(child + 1, right);
                    if internal.keys.len() > max_keys {
                        outcome.split = Some(internal.split());
                    }
                }
                outcome
            }
        }
    }

    /// Remove `doc_id` from `key`; the key disappears with its last id
    pub fn remove(&mut self, key: &IndexKey, doc_id: &DocumentId) -> bool {
        let outcome = Self::remove_from(&mut self.root, key, doc_id);
        if !outcome.removed {
            return false;
        }
        self.num_entries -= 1;
        if outcome.key_removed {
            self.num_keys -= 1;
        }
        self.collapse_root();
        true
    }

    fn remove_from(node: &mut Node, key: &IndexKey, doc_id: &DocumentId) -> RemoveOutcome {
        match node {
            Node::Leaf(leaf) => {
                let pos = match leaf.keys.binary_search(key) {
                    Ok(pos) => pos,
                    Err(_) => return RemoveOutcome::default(),
                };
                if !leaf.doc_ids[pos].remove(doc_id) {
                    return RemoveOutcome::default();
                }
                let key_removed = leaf.doc_ids[pos].is_empty();
                if key_removed {
                    leaf.keys.remove(pos);
                    leaf.doc_ids.remove(pos);
                }
                RemoveOutcome {
                    removed: true,
                    key_removed,
                }
            }
            Node::Internal(internal) => {
                let child = internal.child_index(key);
                let outcome = Self::remove_from(&mut internal.children[child], key, doc_id);
                // Emptied subtrees are unlinked; leaves stay at equal depth
                if outcome.key_removed && internal.children[child].is_empty() {
                    internal.remove_child(child);
                }
                outcome
            }
        }
    }

    fn collapse_root(&mut self) {
        loop {
            match &mut self.root {
                Node::Internal(internal) if internal.children.len() <= 1 => {
                    let child = internal.children.pop().unwrap_or_else(Node::empty);
                    self.root = child;
                }
                _ => break,
            }
        }
    }

    /// Exact-match lookup
    pub fn search(&self, key: &IndexKey) -> Vec<DocumentId> {
        let mut node = &self.root;
        loop {
            match node {
                Node::Internal(internal) => node = &internal.children[internal.child_index(key)],
                Node::Leaf(leaf) => {
                    return match leaf.keys.binary_search(key) {
                        Ok(pos) => leaf.doc_ids[pos].iter().cloned().collect(),
                        Err(_) => Vec::new(),
                    };
                }
            }
        }
    }

    /// Ids under keys of the same kind strictly greater than `key`, in ascending key order
    pub fn search_greater_than(&self, key: &IndexKey) -> Vec<DocumentId> {
        let upper = key.kind_upper();
        self.search_range(Bound::Excluded(key), upper.as_ref())
    }

    /// Ids under keys of the same kind strictly less than `key`, in ascending key order
    pub fn search_less_than(&self, key: &IndexKey) -> Vec<DocumentId> {
        let lower = key.kind_lower();
        self.search_range(lower.as_ref(), Bound::Excluded(key))
    }

    /// Union of exact matches over `keys`, duplicates collapsed
    pub fn search_in(&self, keys: &[IndexKey]) -> Vec<DocumentId> {
        let mut sorted: Vec<&IndexKey> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut seen = HashSet::new();
        let mut results = Vec::new();
        for key in sorted {
            for id in self.search(key) {
                if seen.insert(id.clone()) {
                    results.push(id);
                }
            }
        }
        results
    }

    /// Ids under every key within the bounds, in ascending key order
    pub fn search_range(&self, lower: Bound<&IndexKey>, upper: Bound<&IndexKey>) -> Vec<DocumentId> {
        let mut sets = Vec::new();
        Self::collect_range(&self.root, lower, upper, &mut sets);
        sets.into_iter().flat_map(|ids| ids.iter().cloned()).collect()
    }

    fn collect_range<'a>(
        node: &'a Node,
        lower: Bound<&IndexKey>,
        upper: Bound<&IndexKey>,
        out: &mut Vec<&'a DocIdSet>,
    ) {
        match node {
            Node::Leaf(leaf) => {
                let start = match lower {
                    Bound::Included(k) => leaf.keys.partition_point(|x| x < k),
                    Bound::Excluded(k) => leaf.keys.partition_point(|x| x <= k),
                    Bound::Unbounded => 0,
                };
                let end = match upper {
                    Bound::Included(k) => leaf.keys.partition_point(|x| x <= k),
                    Bound::Excluded(k) => leaf.keys.partition_point(|x| x < k),
                    Bound::Unbounded => leaf.keys.len(),
                };
                if start < end {
                    out.extend(&leaf.doc_ids[start..end]);
                }
            }
            Node::Internal(internal) => {
                let first = match lower {
                    Bound::Included(k) | Bound::Excluded(k) => internal.child_index(k),
                    Bound::Unbounded => 0,
                };
                let last = match upper {
                    Bound::Included(k) => internal.child_index(k),
                    Bound::Excluded(k) => internal.keys.partition_point(|x| x < k),
                    Bound::Unbounded => internal.keys.len(),
                };
                if first > last {
                    return;
                }
                for child in &internal.children[first..=last] {
                    Self::collect_range(child, lower, upper, out);
                }
            }
        }
    }

    /// All entries in ascending key order
    pub fn entries(&self) -> Vec<(IndexKey, DocIdSet)> {
        let mut sets = Vec::new();
        Self::collect_entries(&self.root, &mut sets);
        sets
    }

    fn collect_entries(node: &Node, out: &mut Vec<(IndexKey, DocIdSet)>) {
        match node {
            Node::Leaf(leaf) => {
                for (key, ids) in leaf.keys.iter().zip(&leaf.doc_ids) {
                    out.push((key.clone(), ids.clone()));
                }
            }
            Node::Internal(internal) => {
                for child in &internal.children {
                    Self::collect_entries(child, out);
                }
            }
        }
    }

    /// Replace the tree with one packed from sorted entries, bottom-up
    fn bulk_load(&mut self, entries: Vec<(IndexKey, DocIdSet)>) -> Result<()> {
        for pair in entries.windows(2) {
            if pair[0].0 >= pair[1].0 {
                return Err(StoreError::Corruption(format!(
                    "index '{}' entries are not strictly ascending",
                    self.field
                )));
            }
        }
        if entries.iter().any(|(_, ids)| ids.is_empty()) {
            return Err(StoreError::Corruption(format!(
                "index '{}' contains a key without ids",
                self.field
            )));
        }

        self.num_keys = entries.len();
        self.num_entries = entries.iter().map(|(_, ids)| ids.len()).sum();

        let mut level: Vec<(IndexKey, Node)> = chunk_evenly(entries, self.max_keys())
            .into_iter()
            .map(|chunk| {
                let (keys, doc_ids): (Vec<IndexKey>, Vec<DocIdSet>) = chunk.into_iter().unzip();
                (keys[0].clone(), Node::Leaf(LeafNode { keys, doc_ids }))
            })
            .collect();

        while level.len() > 1 {
            level = chunk_evenly(level, self.branching_factor)
                .into_iter()
                .filter_map(|group| {
                    let mut min_key = None;
                    let mut keys = Vec::new();
                    let mut children = Vec::with_capacity(group.len());
                    for (key, node) in group {
                        if min_key.is_none() {
                            min_key = Some(key);
                        } else {
                            keys.push(key);
                        }
                        children.push(node);
                    }
                    min_key.map(|min| (min, Node::Internal(InternalNode { keys, children })))
                })
                .collect();
        }

        self.root = level.pop().map(|(_, node)| node).unwrap_or_else(Node::empty);
        Ok(())
    }
}

/// Split `items` into the fewest chunks of at most `max` items, sizes differing by at most one
fn chunk_evenly<T>(items: Vec<T>, max: usize) -> Vec<Vec<T>> {
    let total = items.len();
    if total == 0 {
        return Vec::new();
    }
    let groups = total.div_ceil(max);
    let base = total / groups;
    let extra = total % groups;

    let mut chunks = Vec::with_capacity(groups);
    let mut iter = items.into_iter();
    for i in 0..groups {
        let size = if i < extra { base + 1 } else { base };
        chunks.push(iter.by_ref().take(size).collect());
    }
    chunks
}
