use std::collections::HashSet;

use crate::algorithm::SearchRequest;

/// Widths of an agent's multi-value decision diagram for one cost: how many
/// cells the agent may occupy at each time on some path of exactly that
/// cost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Mdd {
    layer_sizes: Vec<usize>,
}

impl Mdd {
    /// Builds the layers forward from the start, keeping cells that can
    /// still reach the goal in time, then prunes backward from the goal.
    /// Pruning uses the unweighted distance so no cell on an optimal path
    /// is dropped.
    pub(crate) fn new(request: &SearchRequest, cost: usize) -> Self {
        let map = request.map;
        let goal = request.agent.goal;

        let mut layers = vec![HashSet::from([request.agent.start])];
        for time in 0..cost.saturating_sub(1) {
            let remaining = cost - time - 1;
            let next: HashSet<(usize, usize)> = layers[time]
                .iter()
                .flat_map(|&position| request.moves(position, time + 1))
                .filter(|&next| map.distance(next, goal) <= remaining)
                .collect();
            layers.push(next);
        }

        let mut layer_sizes = vec![0; cost + 1];
        layer_sizes[cost] = 1;
        let mut last_layer = HashSet::from([goal]);
        for time in (0..cost).rev() {
            let layer: HashSet<(usize, usize)> = layers[time]
                .iter()
                .copied()
                .filter(|&position| {
                    request
                        .moves(position, time + 1)
                        .any(|next| last_layer.contains(&next))
                })
                .collect();
            layer_sizes[time] = layer.len();
            last_layer = layer;
        }

        Mdd { layer_sizes }
    }

    #[cfg(test)]
    pub(crate) fn from_layer_sizes(layer_sizes: Vec<usize>) -> Self {
        Mdd { layer_sizes }
    }

    /// Width at `time`. Past the cost the agent rests at its goal.
    pub(crate) fn layer_size(&self, time: usize) -> usize {
        self.layer_sizes.get(time).copied().unwrap_or(1)
    }
}
