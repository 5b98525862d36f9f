use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::lowlevel::{GridIndex, LowLevelNode, OpenOrderWrapper, QueueOrder};

/// Multiset of f-values, used to track the minimum f among focal states.
#[derive(Debug, Default, Clone)]
pub(crate) struct FValues(BTreeMap<usize, usize>);

impl FValues {
    pub(crate) fn insert(&mut self, f_cost: usize) {
        *self.0.entry(f_cost).or_default() += 1;
    }

    pub(crate) fn remove(&mut self, f_cost: usize) {
        if let Some(count) = self.0.get_mut(&f_cost) {
            *count -= 1;
            if *count == 0 {
                self.0.remove(&f_cost);
            }
        }
    }

    pub(crate) fn min(&self) -> Option<usize> {
        self.0.keys().next().copied()
    }

    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.0.values().sum()
    }
}

/// Open list indexed both by sort order and by the positional key of each
/// state. There is at most one live entry per positional key and the two
/// indexes always hold the same states.
#[derive(Debug)]
pub(crate) struct SearchQueue<W: QueueOrder> {
    index: GridIndex,
    sort_by_key: BTreeSet<W>,
    sort_by_index: HashMap<usize, LowLevelNode>,
}

impl<W: QueueOrder> SearchQueue<W> {
    pub(crate) fn new(index: GridIndex) -> Self {
        SearchQueue {
            index,
            sort_by_key: BTreeSet::new(),
            sort_by_index: HashMap::new(),
        }
    }

    /// Empties the queue and rekeys it for a new search space.
    pub(crate) fn reset(&mut self, index: GridIndex) {
        self.clear();
        self.index = index;
    }

    /// Inserts `node` unless a state with the same positional key is already
    /// queued and not worse. Returns whether the queue changed.
    pub(crate) fn insert(&mut self, node: LowLevelNode) -> bool {
        let key = self.index.convolution(&node);
        if let Some(old) = self.sort_by_index.get(&key) {
            if W::wrap(node) >= W::wrap(*old) {
                return false;
            }
            self.sort_by_key.remove(&W::wrap(*old));
        }
        self.sort_by_index.insert(key, node);
        self.sort_by_key.insert(W::wrap(node));
        true
    }

    /// Removes the queued state sharing `node`'s positional key.
    pub(crate) fn erase(&mut self, node: &LowLevelNode) -> bool {
        match self.sort_by_index.remove(&self.index.convolution(node)) {
            Some(old) => self.sort_by_key.remove(&W::wrap(old)),
            None => false,
        }
    }

    pub(crate) fn get_by_index(&self, node: &LowLevelNode) -> Option<&LowLevelNode> {
        self.sort_by_index.get(&self.index.convolution(node))
    }

    pub(crate) fn front(&self) -> Option<&LowLevelNode> {
        self.sort_by_key.first().map(W::node)
    }

    pub(crate) fn pop_front(&mut self) -> Option<LowLevelNode> {
        let node = *self.sort_by_key.pop_first()?.node();
        self.sort_by_index.remove(&self.index.convolution(&node));
        Some(node)
    }

    /// Moves every state with `f > threshold` into `other`, dropping their
    /// f-values from `f_values`.
    pub(crate) fn move_by_lower_bound<O: QueueOrder>(
        &mut self,
        other: &mut SearchQueue<O>,
        threshold: f64,
        f_values: &mut FValues,
    ) {
        let moved: Vec<LowLevelNode> = self
            .sort_by_key
            .iter()
            .map(W::node)
            .filter(|node| node.f_cost as f64 > threshold)
            .copied()
            .collect();
        for node in moved {
            self.erase(&node);
            f_values.remove(node.f_cost);
            other.insert(node);
        }
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = &LowLevelNode> {
        self.sort_by_key.iter().map(W::node)
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.sort_by_key.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.sort_by_key.len()
    }

    pub(crate) fn clear(&mut self) {
        self.sort_by_key.clear();
        self.sort_by_index.clear();
    }
}

impl SearchQueue<OpenOrderWrapper> {
    /// Moves every state with `f <= threshold` into `other`, recording their
    /// f-values in `other_f`. States are ordered by f, so only a prefix is
    /// scanned.
    pub(crate) fn move_by_upper_bound<O: QueueOrder>(
        &mut self,
        other: &mut SearchQueue<O>,
        threshold: f64,
        other_f: &mut FValues,
    ) {
        while let Some(front) = self.sort_by_key.first() {
            if front.0.f_cost as f64 > threshold {
                break;
            }
            if let Some(node) = self.pop_front() {
                if other.insert(node) {
                    other_f.insert(node.f_cost);
                }
            }
        }
    }
}
