use super::{run_search, LowLevelSearch, SearchRequest};
use crate::common::{
    FValues, FocalOrderWrapper, GridIndex, LowLevelNode, OpenOrderWrapper, Path, SearchQueue,
};
use crate::error::SolveError;
use crate::stat::Stats;

use tracing::{instrument, trace};

/// Bounded-suboptimal search: expands the state with the fewest soft
/// conflicts among those with `f <= w * min_f`.
#[derive(Debug)]
pub(crate) struct FocalSearch {
    w: f64,
    open: SearchQueue<OpenOrderWrapper>,
    focal: SearchQueue<FocalOrderWrapper>,
    // f-values of the states in focal.
    focal_f: FValues,
    min_f: usize,
}

impl FocalSearch {
    pub(crate) fn new(w: f64) -> Self {
        let index = GridIndex {
            width: 0,
            height: 0,
            with_time: true,
        };
        FocalSearch {
            w,
            open: SearchQueue::new(index),
            focal: SearchQueue::new(index),
            focal_f: FValues::default(),
            min_f: 0,
        }
    }

    fn threshold(&self) -> f64 {
        self.min_f as f64 * self.w
    }

    #[instrument(skip_all, name = "focal_search", fields(agent = request.agent.id, start = ?request.agent.start, goal = ?request.agent.goal, w = self.w), level = "debug")]
    pub(crate) fn search(
        &mut self,
        request: &SearchRequest,
        stats: &mut Stats,
    ) -> Result<Option<(Path, usize)>, SolveError> {
        run_search(self, request, stats)
    }
}

impl LowLevelSearch for FocalSearch {
    fn reset(&mut self, index: GridIndex) {
        self.open.reset(index);
        self.focal.reset(index);
        self.focal_f.clear();
        self.min_f = 0;
    }

    fn add_node(&mut self, node: LowLevelNode) {
        let in_bound = node.f_cost as f64 <= self.threshold();

        if let Some(old) = self.focal.get_by_index(&node).copied() {
            if in_bound && self.focal.insert(node) {
                self.focal_f.remove(old.f_cost);
                self.focal_f.insert(node.f_cost);
            }
            return;
        }

        if self.open.get_by_index(&node).is_some() {
            if in_bound {
                // Everything left in open is beyond the bound, so this state
                // is strictly better than the queued one.
                self.open.erase(&node);
            } else {
                self.open.insert(node);
                return;
            }
        }

        if in_bound {
            self.focal.insert(node);
            self.focal_f.insert(node.f_cost);
        } else {
            self.open.insert(node);
        }
    }

    fn take_current(&mut self) -> Option<(LowLevelNode, usize)> {
        let open_min = self.open.front().map(|node| node.f_cost);
        let true_min = match (self.focal_f.min(), open_min) {
            (Some(a), Some(b)) => a.min(b),
            (a, b) => a.or(b)?,
        };

        if true_min > self.min_f {
            self.min_f = true_min;
            let threshold = self.threshold();
            self.open
                .move_by_upper_bound(&mut self.focal, threshold, &mut self.focal_f);
        } else if true_min < self.min_f {
            self.min_f = true_min;
            let threshold = self.threshold();
            self.focal
                .move_by_lower_bound(&mut self.open, threshold, &mut self.focal_f);
        }

        if self.focal.is_empty() {
            let threshold = self.open.front()?.f_cost as f64 * self.w;
            self.open
                .move_by_upper_bound(&mut self.focal, threshold, &mut self.focal_f);
        }

        let node = self.focal.pop_front()?;
        self.focal_f.remove(node.f_cost);
        trace!("focal {} open {} min f {}", self.focal.len(), self.open.len(), self.min_f);
        Some((node, self.min_f))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithm::tests::{assert_path_valid, brute_force_cost, init_tracing};
    use crate::algorithm::Astar;
    use crate::common::{Agent, ConflictAvoidanceTable, Constraint, ConstraintSet};
    use crate::map::Map;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn plan(search: &mut FocalSearch, request: &SearchRequest) -> Option<(Path, usize)> {
        search.search(request, &mut Stats::default()).unwrap()
    }

    #[test]
    fn test_focal_w1_is_optimal() {
        init_tracing();
        let map = Map::from_rows(&["...", ".@.", "..."]).unwrap();
        let agent = Agent {
            id: 0,
            start: (2, 2),
            goal: (0, 0),
        };
        let mut constraints = ConstraintSet::default();
        constraints.add(0, Constraint::vertex((0, 2), 2));
        constraints.add(0, Constraint::vertex((2, 0), 2));
        let request = SearchRequest::new(&map, &agent, &constraints);

        let (path, lower_bound) = plan(&mut FocalSearch::new(1.0), &request).unwrap();
        assert_eq!(path.len(), 6);
        assert_eq!(lower_bound, 5);
        assert_path_valid(&request, &path);
    }

    #[test]
    fn test_focal_trades_cost_for_fewer_conflicts() {
        init_tracing();
        // Direct route along the top row, detour through the bottom row.
        let map = Map::from_rows(&[".....", ".@@@.", "....."]).unwrap();
        let agent = Agent {
            id: 0,
            start: (0, 0),
            goal: (0, 4),
        };
        let constraints = ConstraintSet::default();
        // Another agent rests in the middle of the top row.
        let other: Path = vec![(0, 2)];
        let cat = ConflictAvoidanceTable::from_paths([&other]);
        let mut request = SearchRequest::new(&map, &agent, &constraints);
        request.cat = Some(&cat);

        let (path, lower_bound) = plan(&mut FocalSearch::new(3.0), &request).unwrap();
        assert_eq!(lower_bound, 4);
        assert!(path.len() - 1 <= 12);
        assert!(!path.contains(&(0, 2)));

        // With w = 1 it must take the optimal route through the other agent.
        let (path, _) = plan(&mut FocalSearch::new(1.0), &request).unwrap();
        assert_eq!(path.len() - 1, 4);
    }

    #[test]
    fn test_focal_respects_bound() {
        let mut rng = StdRng::seed_from_u64(5);
        let mut search = FocalSearch::new(1.5);
        for _ in 0..30 {
            let rows: Vec<String> = (0..5)
                .map(|_| {
                    (0..5)
                        .map(|_| if rng.gen_bool(0.2) { '@' } else { '.' })
                        .collect()
                })
                .collect();
            let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
            let map = Map::from_rows(&rows).unwrap();
            let free: Vec<(usize, usize)> = (0..5)
                .flat_map(|x| (0..5).map(move |y| (x, y)))
                .filter(|&(x, y)| map.is_passable(x, y))
                .collect();
            if free.len() < 3 {
                continue;
            }
            let agent = Agent {
                id: 0,
                start: free[rng.gen_range(0..free.len())],
                goal: free[rng.gen_range(0..free.len())],
            };
            let mut constraints = ConstraintSet::default();
            for _ in 0..rng.gen_range(0..4) {
                let cell = free[rng.gen_range(0..free.len())];
                constraints.add(0, Constraint::vertex(cell, rng.gen_range(1..6)));
            }
            let others: Vec<Path> = (0..2)
                .map(|_| {
                    let cell = free[rng.gen_range(0..free.len())];
                    vec![cell; rng.gen_range(1..6)]
                })
                .collect();
            let cat = ConflictAvoidanceTable::from_paths(&others);
            let mut request = SearchRequest::new(&map, &agent, &constraints);
            request.cat = Some(&cat);

            let optimal = brute_force_cost(&request, 40);
            let astar = Astar::default()
                .search(&request, &mut Stats::default())
                .unwrap()
                .map(|(path, _)| path.len() - 1);
            assert_eq!(astar, optimal);

            match (plan(&mut search, &request), optimal) {
                (Some((path, lower_bound)), Some(optimal)) => {
                    assert!(lower_bound <= optimal);
                    assert!((path.len() - 1) as f64 <= 1.5 * optimal as f64);
                    assert_path_valid(&request, &path);
                }
                (None, None) => {}
                (found, optimal) => panic!("focal found {found:?}, optimal {optimal:?}"),
            }
        }
    }
}
