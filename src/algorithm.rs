mod astar;
mod focal;

pub(crate) use astar::Astar;
pub(crate) use focal::FocalSearch;

use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, trace};

use crate::common::{
    Agent, ConflictAvoidanceTable, ConstraintSet, GridIndex, LowLevelNode, Path, INFINITY,
};
use crate::error::SolveError;
use crate::map::Map;
use crate::stat::Stats;

// Expansions between two wall-clock polls.
const DEADLINE_POLL_INTERVAL: usize = 1024;

/// Everything one low-level call needs to plan a single agent.
pub(crate) struct SearchRequest<'a> {
    pub(crate) map: &'a Map,
    pub(crate) agent: &'a Agent,
    pub(crate) constraints: &'a ConstraintSet,
    pub(crate) cat: Option<&'a ConflictAvoidanceTable>,
    pub(crate) occupied: Option<&'a HashSet<(usize, usize)>>,
    pub(crate) with_time: bool,
    // Earliest time the agent may finish.
    pub(crate) goal_time: usize,
    pub(crate) max_time: Option<usize>,
    pub(crate) h_weight: f64,
    pub(crate) deadline: Option<Instant>,
    pub(crate) expansion_limit: usize,
}

impl<'a> SearchRequest<'a> {
    pub(crate) fn new(map: &'a Map, agent: &'a Agent, constraints: &'a ConstraintSet) -> Self {
        SearchRequest {
            map,
            agent,
            constraints,
            cat: None,
            occupied: None,
            with_time: true,
            goal_time: 0,
            max_time: None,
            h_weight: 1.0,
            deadline: None,
            expansion_limit: INFINITY,
        }
    }

    pub(crate) fn heuristic(&self, position: (usize, usize)) -> usize {
        self.map
            .weighted_distance(position, self.agent.goal, self.h_weight)
    }

    /// Last time step at which constraints, the CAT or the goal time can
    /// still tell two visits of a cell apart.
    pub(crate) fn horizon(&self) -> usize {
        self.constraints
            .max_time_step(self.agent.id)
            .max(self.cat.map_or(0, ConflictAvoidanceTable::max_time))
            .max(self.goal_time)
    }

    pub(crate) fn grid_index(&self) -> GridIndex {
        GridIndex {
            width: self.map.width,
            height: self.map.height,
            with_time: self.with_time,
        }
    }

    /// Cells the agent may move to from `position`, arriving at `time`.
    pub(crate) fn moves(
        &self,
        position: (usize, usize),
        time: usize,
    ) -> impl Iterator<Item = (usize, usize)> + '_ {
        let within_time = self.max_time.map_or(true, |max_time| time <= max_time);
        self.map
            .get_neighbors(position.0, position.1, self.with_time)
            .into_iter()
            .filter(move |&next| {
                within_time
                    && !self.occupied.is_some_and(|occupied| occupied.contains(&next))
                    && !self
                        .constraints
                        .is_move_forbidden(self.agent.id, position, next, time)
            })
    }

    pub(crate) fn is_goal(&self, node: &LowLevelNode) -> bool {
        node.position == self.agent.goal
            && node.g_cost >= self.goal_time
            && !self
                .constraints
                .must_leave_goal(self.agent.id, self.agent.goal, node.g_cost)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Frontier policy of a low-level search. The driver owns expansion,
/// successor generation and the closed set.
pub(crate) trait LowLevelSearch {
    /// Empties the frontier for a new search keyed by `index`.
    fn reset(&mut self, index: GridIndex);

    fn add_node(&mut self, node: LowLevelNode);

    /// Next state to expand together with the current lower bound on the
    /// optimal path cost.
    fn take_current(&mut self) -> Option<(LowLevelNode, usize)>;
}

/// Plans one agent.
///
/// Returns the path and the lower bound proven when it was found, or `None`
/// when the frontier runs dry. A spent expansion budget or a passed
/// deadline proves nothing about the agent and is an error.
pub(crate) fn run_search<S: LowLevelSearch>(
    search: &mut S,
    request: &SearchRequest,
    stats: &mut Stats,
) -> Result<Option<(Path, usize)>, SolveError> {
    if request.deadline_passed() {
        return Err(SolveError::TimeLimitExceeded);
    }
    stats.low_level_searches += 1;

    let agent = request.agent;
    let horizon = request.horizon();
    let index = request.grid_index();
    search.reset(index);

    let start_h = request.heuristic(agent.start);
    if start_h == INFINITY {
        debug!("goal unreachable from start");
        return Ok(None);
    }
    search.add_node(LowLevelNode::new(agent.start, 0, start_h, 0, None, 0));

    // Expanded states; parents point into this arena.
    let mut arena: Vec<LowLevelNode> = Vec::new();
    // Positional key -> lowest g expanded there. A state is reopened only
    // when reached with a strictly lower g.
    let mut closed: HashMap<usize, usize> = HashMap::new();
    let is_closed = |closed: &HashMap<usize, usize>, node: &LowLevelNode| {
        closed
            .get(&index.convolution(node))
            .is_some_and(|&g_cost| g_cost <= node.g_cost)
    };

    while let Some((current, lower_bound)) = search.take_current() {
        if is_closed(&closed, &current) {
            continue;
        }
        closed.insert(index.convolution(&current), current.g_cost);
        let id = arena.len();
        arena.push(current);
        stats.low_level_expand_nodes += 1;
        trace!("expand node: {current:?}");

        if request.is_goal(&current) {
            let path = construct_path(&arena, id);
            debug!("found path of cost {} with lower bound {lower_bound}", path.len() - 1);
            return Ok(Some((path, lower_bound)));
        }
        if arena.len() >= request.expansion_limit {
            debug!("expansion budget of {} spent", request.expansion_limit);
            return Err(SolveError::ExpansionBudgetExhausted { agent: agent.id });
        }
        if arena.len() % DEADLINE_POLL_INTERVAL == 0 && request.deadline_passed() {
            return Err(SolveError::TimeLimitExceeded);
        }

        let time = current.g_cost + 1;
        // Past the horizon every visit of a cell is the same state.
        let time_step = if request.with_time {
            time.min(horizon + 1)
        } else {
            0
        };
        for position in request.moves(current.position, time) {
            let h_cost = request.heuristic(position);
            if h_cost == INFINITY {
                continue;
            }
            let conflicts_count = current.conflicts_count
                + request.cat.map_or(0, |cat| {
                    cat.get_agents_count(position, current.position, time)
                });
            let node = LowLevelNode::new(position, time, h_cost, time_step, Some(id), conflicts_count);
            if is_closed(&closed, &node) {
                continue;
            }
            stats.low_level_generate_nodes += 1;
            search.add_node(node);
        }
    }

    debug!("cannot find solution");
    Ok(None)
}

fn construct_path(arena: &[LowLevelNode], mut current: usize) -> Path {
    let mut path = vec![arena[current].position];
    while let Some(parent) = arena[current].parent {
        path.push(arena[parent].position);
        current = parent;
    }
    path.reverse();
    path
}
