use super::{run_search, LowLevelSearch, SearchRequest};
use crate::common::{GridIndex, LowLevelNode, OpenOrderWrapper, Path, SearchQueue};
use crate::error::SolveError;
use crate::stat::Stats;

use tracing::instrument;

/// Time-expanded A*, ordered by (f, -g, soft conflicts).
#[derive(Debug)]
pub(crate) struct Astar {
    open: SearchQueue<OpenOrderWrapper>,
}

impl Default for Astar {
    fn default() -> Self {
        Astar {
            open: SearchQueue::new(GridIndex {
                width: 0,
                height: 0,
                with_time: true,
            }),
        }
    }
}

impl Astar {
    #[instrument(skip_all, name = "a_star", fields(agent = request.agent.id, start = ?request.agent.start, goal = ?request.agent.goal), level = "debug")]
    pub(crate) fn search(
        &mut self,
        request: &SearchRequest,
        stats: &mut Stats,
    ) -> Result<Option<(Path, usize)>, SolveError> {
        run_search(self, request, stats)
    }
}

impl LowLevelSearch for Astar {
    fn reset(&mut self, index: GridIndex) {
        self.open.reset(index);
    }

    fn add_node(&mut self, node: LowLevelNode) {
        self.open.insert(node);
    }

    fn take_current(&mut self) -> Option<(LowLevelNode, usize)> {
        let node = self.open.pop_front()?;
        Some((node, node.f_cost))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::tests::{assert_path_valid, brute_force_cost, init_tracing};
    use crate::common::{Agent, ConflictAvoidanceTable, Constraint, ConstraintSet, INFINITY};
    use crate::map::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::collections::HashSet;
    use tracing::debug;

    // Center cell blocked:
    // . . .
    // . @ .
    // . . .
    fn ring_map() -> Map {
        Map::from_rows(&["...", ".@.", "..."]).unwrap()
    }

    fn agent() -> Agent {
        Agent {
            id: 0,
            start: (2, 2),
            goal: (0, 0),
        }
    }

    fn plan(request: &SearchRequest) -> Option<Path> {
        let mut stats = Stats::default();
        Astar::default()
            .search(request, &mut stats)
            .unwrap()
            .map(|(path, _)| path)
    }

    // Ideal Path
    // [(2, 2), (1, 2), (0, 2), (0, 1), (0, 0)]
    // or
    // [(2, 2), (2, 1), (2, 0), (1, 0), (0, 0)]
    #[test]
    fn test_a_star_no_constraint() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let constraints = ConstraintSet::default();
        let request = SearchRequest::new(&map, &agent, &constraints);
        let mut stats = Stats::default();

        let (path, lower_bound) = Astar::default().search(&request, &mut stats).unwrap().unwrap();
        debug!("{path:?}");
        assert_eq!(path.len(), 5);
        assert_eq!(lower_bound, 4);
        assert_eq!(stats.low_level_searches, 1);
        assert!(stats.low_level_expand_nodes >= 5);
    }

    #[test]
    fn test_a_star_in_path_vertex_constraint_alternative_path() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let mut constraints = ConstraintSet::default();
        constraints.add(0, Constraint::vertex((0, 2), 2));
        let request = SearchRequest::new(&map, &agent, &constraints);

        let path = plan(&request).unwrap();
        assert_eq!(path, vec![(2, 2), (2, 1), (2, 0), (1, 0), (0, 0)]);
    }

    #[test]
    fn test_a_star_in_path_vertex_constraint() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let mut constraints = ConstraintSet::default();
        constraints.add(0, Constraint::vertex((0, 2), 2));
        constraints.add(0, Constraint::vertex((2, 0), 2));
        let request = SearchRequest::new(&map, &agent, &constraints);

        let path = plan(&request).unwrap();
        assert_eq!(path.len(), 6);
        assert_path_valid(&request, &path);
    }

    #[test]
    fn test_a_star_goal_constraint_forces_later_arrival() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let mut constraints = ConstraintSet::default();
        constraints.add(0, Constraint::vertex((0, 0), 4));
        let request = SearchRequest::new(&map, &agent, &constraints);

        let path = plan(&request).unwrap();
        assert_eq!(path.len(), 6);
        assert_path_valid(&request, &path);
    }

    #[test]
    fn test_a_star_edge_constraint() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let mut constraints = ConstraintSet::default();
        constraints.add(0, Constraint::edge((1, 2), (0, 2), 2));
        constraints.add(0, Constraint::edge((2, 0), (1, 0), 3));
        let request = SearchRequest::new(&map, &agent, &constraints);

        let path = plan(&request).unwrap();
        assert_eq!(path.len(), 6);
        assert_path_valid(&request, &path);
    }

    #[test]
    fn test_a_star_positive_constraint() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let mut constraints = ConstraintSet::default();
        // Detour: must be back at the start at time 2.
        constraints.add(0, Constraint::vertex((2, 2), 2).positive());
        let request = SearchRequest::new(&map, &agent, &constraints);

        let path = plan(&request).unwrap();
        assert_eq!(path.len(), 7);
        assert_eq!(path[2], (2, 2));
        assert_path_valid(&request, &path);
    }

    #[test]
    fn test_a_star_permanently_blocked_goal_fails() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let mut constraints = ConstraintSet::default();
        constraints.add(0, Constraint::vertex_range((0, 0), 3, INFINITY));
        let request = SearchRequest::new(&map, &agent, &constraints);

        assert!(plan(&request).is_none());
    }

    #[test]
    fn test_a_star_start_is_goal() {
        let map = ring_map();
        let agent = Agent {
            id: 0,
            start: (1, 0),
            goal: (1, 0),
        };
        let constraints = ConstraintSet::default();
        let mut request = SearchRequest::new(&map, &agent, &constraints);
        assert_eq!(plan(&request), Some(vec![(1, 0)]));

        // A minimum goal time makes the agent wait.
        request.goal_time = 2;
        let path = plan(&request).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path.last(), Some(&(1, 0)));
    }

    #[test]
    fn test_a_star_unreachable_goal() {
        let map = Map::from_rows(&["..@.", "..@."]).unwrap();
        let agent = Agent {
            id: 0,
            start: (0, 0),
            goal: (1, 3),
        };
        let constraints = ConstraintSet::default();
        let request = SearchRequest::new(&map, &agent, &constraints);
        assert!(plan(&request).is_none());

        let mut map = map;
        map.compute_perfect_heuristic(&[agent.clone()]);
        let request = SearchRequest::new(&map, &agent, &constraints);
        assert!(plan(&request).is_none());
    }

    #[test]
    fn test_a_star_expansion_budget() {
        let map = Map::from_rows(&["......", "......", "......"]).unwrap();
        let agent = Agent {
            id: 0,
            start: (0, 0),
            goal: (2, 5),
        };
        let constraints = ConstraintSet::default();
        let mut request = SearchRequest::new(&map, &agent, &constraints);
        request.expansion_limit = 3;
        let mut stats = Stats::default();
        assert_eq!(
            Astar::default().search(&request, &mut stats),
            Err(SolveError::ExpansionBudgetExhausted { agent: 0 })
        );
        assert_eq!(stats.low_level_expand_nodes, 3);

        request.expansion_limit = 100;
        assert_eq!(plan(&request).map(|path| path.len() - 1), Some(7));
    }

    #[test]
    fn test_a_star_deadline() {
        let map = ring_map();
        let agent = agent();
        let constraints = ConstraintSet::default();
        let mut request = SearchRequest::new(&map, &agent, &constraints);
        request.deadline = Some(std::time::Instant::now());
        let mut stats = Stats::default();
        assert_eq!(
            Astar::default().search(&request, &mut stats),
            Err(SolveError::TimeLimitExceeded)
        );
    }

    #[test]
    fn test_a_star_prefers_fewer_soft_conflicts() {
        init_tracing();
        let map = ring_map();
        let agent = agent();
        let constraints = ConstraintSet::default();
        // Another agent steps onto the upper route at time 1.
        let other: Path = vec![(0, 2), (1, 2), (0, 2)];
        let cat = ConflictAvoidanceTable::from_paths([&other]);
        let mut request = SearchRequest::new(&map, &agent, &constraints);
        request.cat = Some(&cat);

        let path = plan(&request).unwrap();
        assert_eq!(path, vec![(2, 2), (2, 1), (2, 0), (1, 0), (0, 0)]);
    }

    #[test]
    fn test_a_star_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..40 {
            let rows: Vec<String> = (0..4)
                .map(|_| {
                    (0..5)
                        .map(|_| if rng.gen_bool(0.2) { '@' } else { '.' })
                        .collect()
                })
                .collect();
            let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
            let map = Map::from_rows(&rows).unwrap();
            let free: Vec<(usize, usize)> = (0..4)
                .flat_map(|x| (0..5).map(move |y| (x, y)))
                .filter(|&(x, y)| map.is_passable(x, y))
                .collect();
            if free.len() < 2 {
                continue;
            }
            let agent = Agent {
                id: 0,
                start: free[rng.gen_range(0..free.len())],
                goal: free[rng.gen_range(0..free.len())],
            };

            let mut constraints = ConstraintSet::default();
            for _ in 0..rng.gen_range(0..6) {
                let cell = free[rng.gen_range(0..free.len())];
                let time = rng.gen_range(1..8);
                if rng.gen_bool(0.7) {
                    constraints.add(0, Constraint::vertex(cell, time));
                } else {
                    let to = map.get_neighbors(cell.0, cell.1, false);
                    if let Some(&to) = to.first() {
                        constraints.add(0, Constraint::edge(cell, to, time));
                    }
                }
            }

            let request = SearchRequest::new(&map, &agent, &constraints);
            let expected = brute_force_cost(&request, 40);
            let path = plan(&request);
            assert_eq!(path.as_ref().map(|path| path.len() - 1), expected);
            if let Some(path) = path {
                assert_path_valid(&request, &path);
            }
        }
    }

    #[test]
    fn test_a_star_without_time_axis() {
        let map = ring_map();
        let agent = agent();
        let constraints = ConstraintSet::default();
        let mut request = SearchRequest::new(&map, &agent, &constraints);
        request.with_time = false;
        let occupied = HashSet::from([(1, 2)]);
        request.occupied = Some(&occupied);

        let path = plan(&request).unwrap();
        assert_eq!(path, vec![(2, 2), (2, 1), (2, 0), (1, 0), (0, 0)]);
    }
}
