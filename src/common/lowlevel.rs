use std::cmp::Ordering;

use super::INFINITY;

/// One agent at one cell at one time step during low-level search.
///
/// Equality compares the cell only, so a state can be looked up
/// independently of its cost.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LowLevelNode {
    pub(crate) position: (usize, usize),
    pub(crate) g_cost: usize,
    pub(crate) f_cost: usize,
    // Equals g_cost until the search horizon, then stays fixed.
    pub(crate) time_step: usize,
    // Index into the search arena of the expanded predecessor.
    pub(crate) parent: Option<usize>,
    pub(crate) conflicts_count: usize,
}

impl PartialEq for LowLevelNode {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
    }
}

impl Eq for LowLevelNode {}

impl LowLevelNode {
    pub(crate) fn new(
        position: (usize, usize),
        g_cost: usize,
        h_cost: usize,
        time_step: usize,
        parent: Option<usize>,
        conflicts_count: usize,
    ) -> Self {
        let f_cost = if g_cost == INFINITY || h_cost == INFINITY {
            INFINITY
        } else {
            g_cost + h_cost
        };
        LowLevelNode {
            position,
            g_cost,
            f_cost,
            time_step,
            parent,
            conflicts_count,
        }
    }
}

/// Dense positional key of a state: `(with_time ? width * height * t : 0) + i * width + j`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct GridIndex {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) with_time: bool,
}

impl GridIndex {
    pub(crate) fn convolution(&self, node: &LowLevelNode) -> usize {
        let time_offset = if self.with_time {
            self.width * self.height * node.time_step
        } else {
            0
        };
        time_offset + node.position.0 * self.width + node.position.1
    }
}

/// An ordering over queue entries; each wrapper gives the queue its sort key.
pub(crate) trait QueueOrder: Ord {
    fn wrap(node: LowLevelNode) -> Self;
    fn node(&self) -> &LowLevelNode;
}

// Open List Wrapper
#[derive(Debug)]
pub(crate) struct OpenOrderWrapper(pub(crate) LowLevelNode);

impl PartialEq for OpenOrderWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenOrderWrapper {}

impl PartialOrd for OpenOrderWrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenOrderWrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        let self_node = &self.0;
        let other_node = &other.0;

        self_node
            .f_cost
            .cmp(&other_node.f_cost)
            // Higher g cost (closer to goal) has higher priority
            .then_with(|| other_node.g_cost.cmp(&self_node.g_cost))
            .then_with(|| self_node.conflicts_count.cmp(&other_node.conflicts_count))
            .then_with(|| self_node.position.cmp(&other_node.position))
    }
}

impl QueueOrder for OpenOrderWrapper {
    fn wrap(node: LowLevelNode) -> Self {
        OpenOrderWrapper(node)
    }

    fn node(&self) -> &LowLevelNode {
        &self.0
    }
}

// Focal List Wrapper
#[derive(Debug)]
pub(crate) struct FocalOrderWrapper(pub(crate) LowLevelNode);

impl PartialEq for FocalOrderWrapper {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FocalOrderWrapper {}

impl PartialOrd for FocalOrderWrapper {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FocalOrderWrapper {
    fn cmp(&self, other: &Self) -> Ordering {
        let self_node = &self.0;
        let other_node = &other.0;

        self_node
            .conflicts_count
            .cmp(&other_node.conflicts_count)
            .then_with(|| self_node.f_cost.cmp(&other_node.f_cost))
            // Higher g cost has higher priority
            .then_with(|| other_node.g_cost.cmp(&self_node.g_cost))
            .then_with(|| self_node.position.cmp(&other_node.position))
    }
}

impl QueueOrder for FocalOrderWrapper {
    fn wrap(node: LowLevelNode) -> Self {
        FocalOrderWrapper(node)
    }

    fn node(&self) -> &LowLevelNode {
        &self.0
    }
}
