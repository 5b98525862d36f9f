mod cat;
mod conflict;
mod constraint;
mod highlevel;
mod lowlevel;
mod mdd;
mod queue;

pub use cat::ConflictAvoidanceTable;
pub(crate) use conflict::{find_conflicts, Conflict, ConflictSet, ConflictType};
pub(crate) use constraint::{Constraint, ConstraintSet};
pub(crate) use highlevel::HighLevelNode;
pub(crate) use lowlevel::{FocalOrderWrapper, GridIndex, LowLevelNode, OpenOrderWrapper};
pub(crate) use mdd::Mdd;
pub(crate) use queue::{FValues, SearchQueue};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::error;

use crate::error::SolveError;
use crate::map::Map;
use crate::stat::Stats;

/// Sentinel cost for unreachable states.
pub const INFINITY: usize = usize::MAX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: usize,
    pub start: (usize, usize),
    pub goal: (usize, usize),
}

impl Agent {
    pub fn verify(&self, map: &Map) -> bool {
        map.is_passable(self.start.0, self.start.1) && map.is_passable(self.goal.0, self.goal.1)
    }
}

/// Cells indexed by time step; repeated cells are waits.
pub type Path = Vec<(usize, usize)>;

/// Cell occupied at `time`, agents rest at their last cell once done.
pub(crate) fn position_at(path: &Path, time: usize) -> (usize, usize) {
    path[time.min(path.len() - 1)]
}

/// Rejects agent sets the solver must never see: ids out of order, starts
/// or goals off the grid or on obstacles, and shared starts or goals.
pub fn validate_agents(map: &Map, agents: &[Agent]) -> Result<(), SolveError> {
    let mut starts = HashSet::new();
    let mut goals = HashSet::new();
    for (index, agent) in agents.iter().enumerate() {
        if agent.id != index {
            return Err(SolveError::MalformedInput(format!(
                "agent at position {index} has id {}",
                agent.id
            )));
        }
        if !agent.verify(map) {
            return Err(SolveError::MalformedInput(format!(
                "start or goal of agent {} is off the grid or blocked",
                agent.id
            )));
        }
        if !starts.insert(agent.start) {
            return Err(SolveError::MalformedInput(format!(
                "agent {} shares its start cell {:?}",
                agent.id, agent.start
            )));
        }
        if !goals.insert(agent.goal) {
            return Err(SolveError::MalformedInput(format!(
                "agent {} shares its goal cell {:?}",
                agent.id, agent.goal
            )));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize)]
pub struct Solution {
    pub paths: Vec<Path>,
    pub stats: Stats,
}

impl Solution {
    /// Longest individual path.
    pub fn makespan(&self) -> usize {
        self.paths
            .iter()
            .map(|path| path.len() - 1)
            .max()
            .unwrap_or(0)
    }

    /// Sum of the times of each agent's last move.
    pub fn flowtime(&self) -> usize {
        self.paths
            .iter()
            .map(|path| {
                let mut last_move = path.len() - 1;
                while last_move > 0 && path[last_move] == path[last_move - 1] {
                    last_move -= 1;
                }
                last_move
            })
            .sum()
    }

    /// Sum of individual path costs.
    pub fn sum_of_costs(&self) -> usize {
        self.paths.iter().map(|path| path.len() - 1).sum()
    }

    pub fn verify(&self, map: &Map, agents: &[Agent]) -> bool {
        if self.paths.len() != agents.len() {
            error!("Incorrect result: {} paths for {} agents", self.paths.len(), agents.len());
            return false;
        }

        for (agent, path) in agents.iter().zip(&self.paths) {
            if path.first() != Some(&agent.start) {
                error!("Incorrect result: agent {} path starts in wrong position", agent.id);
                return false;
            }
            if path.last() != Some(&agent.goal) {
                error!("Incorrect result: agent {} path ends in wrong position", agent.id);
                return false;
            }
            if path.iter().any(|&(x, y)| !map.is_passable(x, y)) {
                error!("Incorrect result: agent {} path goes through obstacle", agent.id);
                return false;
            }
            if path
                .windows(2)
                .any(|step| step[0].0.abs_diff(step[1].0) + step[0].1.abs_diff(step[1].1) > 1)
            {
                error!("Incorrect result: agent {} path has non-adjacent steps", agent.id);
                return false;
            }
        }

        if let Some(conflict) = find_conflicts(&self.paths, false).first() {
            match conflict.conflict_type {
                ConflictType::Edge { .. } => {
                    error!("Incorrect result: two agents swap positions: {conflict:?}")
                }
                ConflictType::Vertex { .. } => {
                    error!("Incorrect result: two agents occupy the same node: {conflict:?}")
                }
            }
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solution(paths: Vec<Path>) -> Solution {
        Solution {
            paths,
            stats: Stats::default(),
        }
    }

    #[test]
    fn test_solution_metrics() {
        let result = solution(vec![
            vec![(0, 0), (1, 0), (1, 1), (1, 1), (1, 2), (0, 2)],
            vec![(0, 2), (0, 1), (0, 0)],
            vec![(2, 2), (2, 1), (2, 1)],
        ]);
        assert_eq!(result.makespan(), 5);
        assert_eq!(result.sum_of_costs(), 5 + 2 + 2);
        // Trailing waits are not counted in flowtime.
        assert_eq!(result.flowtime(), 5 + 2 + 1);
    }

    #[test]
    fn test_verify_rejects_swap() {
        let map = Map::from_rows(&["...", "...", "..."]).unwrap();
        let agents = vec![
            Agent {
                id: 0,
                start: (0, 0),
                goal: (0, 1),
            },
            Agent {
                id: 1,
                start: (0, 1),
                goal: (0, 0),
            },
        ];
        let swap = solution(vec![vec![(0, 0), (0, 1)], vec![(0, 1), (0, 0)]]);
        assert!(!swap.verify(&map, &agents));

        let jump = solution(vec![vec![(0, 0), (0, 2), (0, 1)], vec![(0, 1), (1, 1), (1, 0), (0, 0)]]);
        assert!(!jump.verify(&map, &agents));

        // Agent 1 follows into the cell agent 0 just left.
        let valid = solution(vec![
            vec![(0, 0), (1, 0), (1, 1), (0, 1)],
            vec![(0, 1), (0, 0)],
        ]);
        assert!(valid.verify(&map, &agents));

        let wrong_goal = solution(vec![vec![(0, 0), (1, 0), (1, 1)], vec![(0, 1), (0, 0)]]);
        assert!(!wrong_goal.verify(&map, &agents));
    }

    #[test]
    fn test_validate_agents() {
        let map = Map::from_rows(&["..@", "..."]).unwrap();
        let agent = |id, start, goal| Agent { id, start, goal };

        assert!(validate_agents(&map, &[agent(0, (0, 0), (1, 2)), agent(1, (0, 1), (1, 1))]).is_ok());
        assert!(matches!(
            validate_agents(&map, &[agent(0, (0, 0), (0, 2))]),
            Err(SolveError::MalformedInput(_))
        ));
        assert!(matches!(
            validate_agents(&map, &[agent(0, (0, 0), (1, 2)), agent(1, (0, 0), (1, 1))]),
            Err(SolveError::MalformedInput(_))
        ));
        assert!(matches!(
            validate_agents(&map, &[agent(0, (0, 0), (1, 2)), agent(1, (0, 1), (1, 2))]),
            Err(SolveError::MalformedInput(_))
        ));
    }
}
