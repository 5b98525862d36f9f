use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::Path;

type Cell = (usize, usize);

/// Soft occupancy of other agents' paths within one tree branch.
///
/// Every mutation is invertible: adding a path and removing it again leaves
/// the table unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictAvoidanceTable {
    // (cell, time) -> agents there.
    node_agents_count: BTreeMap<(Cell, usize), usize>,
    // (from, to, arrival time) -> agents traversing.
    edge_agents_count: HashMap<(Cell, Cell, usize), usize>,
    // goal cell -> (time agents start resting there -> agents).
    goal_node_agents_count: HashMap<Cell, BTreeMap<usize, usize>>,
}

fn increment<K: Ord>(map: &mut BTreeMap<K, usize>, key: K) {
    *map.entry(key).or_default() += 1;
}

fn decrement<K: Ord>(map: &mut BTreeMap<K, usize>, key: K) {
    if let Some(count) = map.get_mut(&key) {
        *count -= 1;
        if *count == 0 {
            map.remove(&key);
        }
    }
}

impl ConflictAvoidanceTable {
    pub fn from_paths<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut cat = ConflictAvoidanceTable::default();
        for path in paths {
            cat.add_agent_path(path);
        }
        cat
    }

    pub fn add_agent_path(&mut self, path: &Path) {
        for (time, &position) in path.iter().enumerate() {
            if time + 1 == path.len() {
                increment(
                    self.goal_node_agents_count.entry(position).or_default(),
                    time,
                );
            } else {
                increment(&mut self.node_agents_count, (position, time));
            }
            if time > 0 && path[time - 1] != position {
                *self
                    .edge_agents_count
                    .entry((path[time - 1], position, time))
                    .or_default() += 1;
            }
        }
    }

    pub fn remove_agent_path(&mut self, path: &Path) {
        for (time, &position) in path.iter().enumerate() {
            if time + 1 == path.len() {
                if let Some(waits) = self.goal_node_agents_count.get_mut(&position) {
                    decrement(waits, time);
                    if waits.is_empty() {
                        self.goal_node_agents_count.remove(&position);
                    }
                }
            } else {
                decrement(&mut self.node_agents_count, (position, time));
            }
            if time > 0 && path[time - 1] != position {
                let key = (path[time - 1], position, time);
                if let Some(count) = self.edge_agents_count.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        self.edge_agents_count.remove(&key);
                    }
                }
            }
        }
    }

    fn goal_agents_count(&self, position: Cell, time: usize) -> usize {
        self.goal_node_agents_count
            .get(&position)
            .map_or(0, |waits| waits.range(..=time).map(|(_, count)| count).sum())
    }

    /// Agents already at `position` at `time`, including those resting at
    /// their goal.
    pub fn get_node_agents_count(&self, position: Cell, time: usize) -> usize {
        self.node_agents_count
            .get(&(position, time))
            .copied()
            .unwrap_or(0)
            + self.goal_agents_count(position, time)
    }

    /// Agents moving `position -> prev_position` while we move the other way.
    pub fn get_edge_agents_count(
        &self,
        position: Cell,
        prev_position: Cell,
        time: usize,
    ) -> usize {
        self.edge_agents_count
            .get(&(position, prev_position, time))
            .copied()
            .unwrap_or(0)
    }

    /// Soft conflicts caused by moving from `prev_position` into `position`
    /// arriving at `time`.
    pub fn get_agents_count(&self, position: Cell, prev_position: Cell, time: usize) -> usize {
        self.get_node_agents_count(position, time)
            + self.get_edge_agents_count(position, prev_position, time)
    }

    /// Earliest time in `[start_time, end_time]` at which `position` is
    /// occupied by another agent.
    ///
    /// Query API for callers planning waits; the searches in this crate
    /// score moves with [`get_agents_count`](Self::get_agents_count).
    pub fn get_first_soft_conflict(
        &self,
        position: Cell,
        start_time: usize,
        end_time: usize,
    ) -> Option<usize> {
        if start_time > end_time {
            return None;
        }
        let node_time = self
            .node_agents_count
            .range((position, start_time)..=(position, end_time))
            .next()
            .map(|(&(_, time), _)| time);
        let goal_time = self
            .goal_node_agents_count
            .get(&position)
            .and_then(|waits| waits.keys().next())
            .map(|&time| time.max(start_time))
            .filter(|&time| time <= end_time);
        match (node_time, goal_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Splits `[start_time, end_time]` into runs of constant occupancy of
    /// `position`, returned as `(run start, agents)`. Agents resting at their
    /// goal count from their arrival onwards. With `binary` only
    /// free/occupied changes start a new run.
    ///
    /// Query API for callers reasoning about wait durations; not used by
    /// the searches in this crate.
    pub fn get_soft_conflict_intervals(
        &self,
        position: Cell,
        start_time: usize,
        end_time: usize,
        binary: bool,
    ) -> Vec<(usize, usize)> {
        let mut intervals: Vec<(usize, usize)> = Vec::new();
        if start_time > end_time {
            return intervals;
        }

        // Occupancy can only change at these times.
        let mut breakpoints = BTreeSet::from([start_time]);
        for (&(_, time), _) in self
            .node_agents_count
            .range((position, start_time)..=(position, end_time))
        {
            breakpoints.insert(time);
            if time < end_time {
                breakpoints.insert(time + 1);
            }
        }
        if let Some(waits) = self.goal_node_agents_count.get(&position) {
            breakpoints.extend(
                waits
                    .keys()
                    .filter(|&&time| time > start_time && time <= end_time),
            );
        }

        for time in breakpoints {
            let count = self.get_node_agents_count(position, time);
            let same_run = intervals.last().is_some_and(|&(_, last_count)| {
                if binary {
                    (last_count > 0) == (count > 0)
                } else {
                    last_count == count
                }
            });
            if !same_run {
                intervals.push((time, count));
            }
        }
        intervals
    }

    /// Latest time step the table says anything about.
    pub fn max_time(&self) -> usize {
        let node_time = self
            .node_agents_count
            .keys()
            .map(|&(_, time)| time)
            .max()
            .unwrap_or(0);
        let goal_time = self
            .goal_node_agents_count
            .values()
            .filter_map(|waits| waits.keys().next_back())
            .copied()
            .max()
            .unwrap_or(0);
        node_time.max(goal_time)
    }

    pub fn is_empty(&self) -> bool {
        self.node_agents_count.is_empty()
            && self.edge_agents_count.is_empty()
            && self.goal_node_agents_count.is_empty()
    }
}
