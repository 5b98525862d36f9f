use super::Solver;
use crate::algorithm::{Astar, FocalSearch, SearchRequest};
use crate::common::{
    validate_agents, Agent, Conflict, ConflictAvoidanceTable, ConflictType, Constraint,
    ConstraintSet, HighLevelNode, Mdd, Path, Solution,
};
use crate::config::Config;
use crate::error::SolveError;
use crate::map::Map;
use crate::stat::Stats;

use std::collections::BTreeSet;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument};

pub struct CBS {
    agents: Vec<Agent>,
    map: Map,
    stats: Stats,
}

impl CBS {
    pub fn new(agents: Vec<Agent>, map: &Map) -> Self {
        CBS {
            agents,
            map: map.clone(),
            stats: Stats::default(),
        }
    }

    /// Counters of the last solve.
    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}

impl Solver for CBS {
    #[instrument(skip_all, name = "cbs", fields(agents = self.agents.len()))]
    fn solve(&mut self, config: &Config) -> Result<Solution, SolveError> {
        let total_solve_start_time = Instant::now();
        config
            .validate()
            .map_err(|error| SolveError::MalformedInput(format!("{error:#}")))?;
        validate_agents(&self.map, &self.agents)?;
        if config.with_perfect_heuristic {
            self.map.compute_perfect_heuristic(&self.agents);
        }

        let mut search = HighLevelSearch {
            agents: &self.agents,
            map: &self.map,
            config,
            deadline: total_solve_start_time + Duration::from_millis(config.time_limit_ms),
            planner: LowLevelPlanner::new(config)?,
            stats: Stats::default(),
            next_id: 0,
        };
        let result = search.run();

        self.stats = search.stats;
        self.stats.time_us = total_solve_start_time.elapsed().as_micros() as usize;
        match result {
            Ok(paths) => {
                self.stats.print("CBS");
                Ok(Solution {
                    paths,
                    stats: self.stats.clone(),
                })
            }
            Err(error) => {
                info!("CBS failed after {} us: {error}", self.stats.time_us);
                Err(error)
            }
        }
    }
}

enum LowLevelPlanner {
    Astar(Astar),
    Focal(FocalSearch),
}

impl LowLevelPlanner {
    fn new(config: &Config) -> Result<Self, SolveError> {
        match config.low_level.as_str() {
            "astar" => Ok(LowLevelPlanner::Astar(Astar::default())),
            "focal" => Ok(LowLevelPlanner::Focal(FocalSearch::new(config.focal_w))),
            other => Err(SolveError::MalformedInput(format!(
                "unknown low-level search {other:?}"
            ))),
        }
    }

    fn plan(
        &mut self,
        request: &SearchRequest,
        stats: &mut Stats,
    ) -> Result<Option<Path>, SolveError> {
        let result = match self {
            LowLevelPlanner::Astar(search) => search.search(request, stats)?,
            LowLevelPlanner::Focal(search) => search.search(request, stats)?,
        };
        Ok(result.map(|(path, _)| path))
    }
}

/// State of one solve call.
struct HighLevelSearch<'a> {
    agents: &'a [Agent],
    map: &'a Map,
    config: &'a Config,
    deadline: Instant,
    planner: LowLevelPlanner,
    stats: Stats,
    next_id: usize,
}

impl HighLevelSearch<'_> {
    fn run(&mut self) -> Result<Vec<Path>, SolveError> {
        let mut open = BTreeSet::new();
        open.insert(self.root()?);

        while let Some(current_node) = open.pop_first() {
            if Instant::now() >= self.deadline {
                return Err(SolveError::TimeLimitExceeded);
            }

            let Some(conflict) = current_node.conflicts.best_conflict().cloned() else {
                debug!(
                    "solution at node {} with cost {}",
                    current_node.id, current_node.cost
                );
                self.stats.costs = current_node.cost;
                return Ok(current_node.paths);
            };
            self.stats.high_level_expand_nodes += 1;
            debug!(
                "expand node {} cost {} h {} conflicts {} ({} cardinal, {} agent pairs): {conflict:?}",
                current_node.id,
                current_node.cost,
                current_node.h,
                current_node.conflicts.conflict_count(),
                current_node.conflicts.cardinal_conflict_count(),
                current_node.conflicts.conflicting_pairs_count()
            );

            let mut children = Vec::new();
            let mut bypass = None;
            for added in self.branches(&current_node, &conflict) {
                let Some(child) = self.create_child(&current_node, added)? else {
                    continue;
                };
                if self.config.with_bypassing
                    && child.cost == current_node.cost
                    && child.conflicts.conflict_count() < current_node.conflicts.conflict_count()
                {
                    bypass = Some(child);
                    break;
                }
                children.push(child);
            }

            match bypass {
                Some(child) => {
                    debug!("bypass: node {} adopts paths of node {}", current_node.id, child.id);
                    open.insert(self.adopt_paths(current_node, &child));
                }
                None => open.extend(children),
            }
        }

        Err(SolveError::TreeExhausted)
    }

    fn root(&mut self) -> Result<HighLevelNode, SolveError> {
        let constraints = ConstraintSet::default();
        let use_cat = self.config.with_cat && self.config.use_cat_at_root;
        let mut cat = ConflictAvoidanceTable::default();

        let mut paths = Vec::with_capacity(self.agents.len());
        for agent in 0..self.agents.len() {
            let path = self
                .plan(agent, &constraints, use_cat.then_some(&cat))?
                .ok_or(SolveError::InfeasibleAgent { agent })?;
            if use_cat {
                cat.add_agent_path(&path);
            }
            paths.push(path);
        }

        let mut root = HighLevelNode::new(self.next_id(), paths, constraints);
        if self.config.with_cardinal_conflicts {
            for agent in 0..self.agents.len() {
                root.mdds[agent] = Some(self.mdd(&root, agent));
            }
        }
        root.detect_conflicts(self.config.store_conflicts);
        self.update_heuristic(&mut root);
        self.stats.high_level_generate_nodes += 1;
        debug!(
            "root cost {} conflicts {}",
            root.cost,
            root.conflicts.conflict_count()
        );
        Ok(root)
    }

    /// Constraint sets of the children resolving `conflict`, one per branch.
    fn branches(&self, node: &HighLevelNode, conflict: &Conflict) -> Vec<Vec<(usize, Constraint)>> {
        let (agent_1, agent_2) = (conflict.agent_1, conflict.agent_2);

        if !self.config.with_disjoint_splitting {
            return match conflict.conflict_type {
                ConflictType::Vertex {
                    position,
                    time_step,
                } => vec![
                    vec![(agent_1, Constraint::vertex(position, time_step))],
                    vec![(agent_2, Constraint::vertex(position, time_step))],
                ],
                ConflictType::Edge {
                    from,
                    to,
                    time_step,
                } => vec![
                    vec![(agent_1, Constraint::edge(from, to, time_step))],
                    vec![(agent_2, Constraint::edge(to, from, time_step))],
                ],
            };
        }

        // Split on the agent with fewer options at the conflict time.
        let time_step = conflict.time_step();
        let width = |agent: usize| {
            node.mdds[agent]
                .as_ref()
                .map_or(usize::MAX, |mdd| mdd.layer_size(time_step))
        };
        let agent = if width(agent_2) < width(agent_1) {
            agent_2
        } else {
            agent_1
        };
        let others = (0..self.agents.len()).filter(|&other| other != agent);

        let (negative, mut positive_branch) = match conflict.conflict_type {
            ConflictType::Vertex { position, .. } => {
                let negative = Constraint::vertex(position, time_step);
                let branch: Vec<_> = others.map(|other| (other, negative.clone())).collect();
                (negative, branch)
            }
            ConflictType::Edge { from, to, .. } => {
                let (from, to) = if agent == agent_1 { (from, to) } else { (to, from) };
                let mut branch = Vec::new();
                for other in others {
                    branch.push((other, Constraint::edge(to, from, time_step)));
                    branch.push((other, Constraint::vertex(to, time_step)));
                    branch.push((other, Constraint::vertex(from, time_step - 1)));
                }
                (Constraint::edge(from, to, time_step), branch)
            }
        };
        positive_branch.insert(0, (agent, negative.clone().positive()));

        vec![positive_branch, vec![(agent, negative)]]
    }

    /// Copies `parent`, adds the constraints and replans every agent whose
    /// path they break. `None` when one of them has no path left.
    fn create_child(
        &mut self,
        parent: &HighLevelNode,
        added: Vec<(usize, Constraint)>,
    ) -> Result<Option<HighLevelNode>, SolveError> {
        let mut child = parent.clone();
        child.id = self.next_id();
        let mut touched = BTreeSet::new();
        for (agent, constraint) in added {
            child.constraints.add(agent, constraint);
            touched.insert(agent);
        }

        let replanned: Vec<usize> = (0..self.agents.len())
            .filter(|&agent| child.constraints.is_path_violated(agent, &child.paths[agent]))
            .collect();

        for &agent in &replanned {
            let cat = self.config.with_cat.then(|| {
                let mut cat = ConflictAvoidanceTable::from_paths(&child.paths);
                cat.remove_agent_path(&child.paths[agent]);
                cat
            });
            let Some(path) = self.plan(agent, &child.constraints, cat.as_ref())? else {
                debug!("node {}: agent {agent} has no path, branch pruned", child.id);
                return Ok(None);
            };
            child.set_agent_path(agent, path);
        }

        // New constraints can narrow an MDD even when the path still holds.
        for agent in touched {
            self.refresh_agent(&mut child, agent);
        }
        self.update_heuristic(&mut child);
        self.stats.high_level_generate_nodes += 1;
        Ok(Some(child))
    }

    /// Takes over the paths of a child with the same cost and fewer
    /// conflicts, keeping the node's own constraints.
    fn adopt_paths(&self, mut node: HighLevelNode, child: &HighLevelNode) -> HighLevelNode {
        let changed: Vec<usize> = (0..self.agents.len())
            .filter(|&agent| node.paths[agent] != child.paths[agent])
            .collect();
        for &agent in &changed {
            node.set_agent_path(agent, child.paths[agent].clone());
        }
        for &agent in &changed {
            self.refresh_agent(&mut node, agent);
        }
        self.update_heuristic(&mut node);
        node
    }

    fn plan(
        &mut self,
        agent: usize,
        constraints: &ConstraintSet,
        cat: Option<&ConflictAvoidanceTable>,
    ) -> Result<Option<Path>, SolveError> {
        let mut request = SearchRequest::new(self.map, &self.agents[agent], constraints);
        request.cat = cat;
        request.h_weight = self.config.h_weight;
        request.deadline = Some(self.deadline);
        request.expansion_limit = self.config.low_level_restart_frequency;
        self.planner.plan(&request, &mut self.stats)
    }

    fn mdd(&self, node: &HighLevelNode, agent: usize) -> Mdd {
        let request = SearchRequest::new(self.map, &self.agents[agent], &node.constraints);
        Mdd::new(&request, node.paths[agent].len() - 1)
    }

    fn refresh_agent(&self, node: &mut HighLevelNode, agent: usize) {
        if self.config.with_cardinal_conflicts {
            node.mdds[agent] = Some(self.mdd(node, agent));
        }
        node.update_agent_conflicts(agent, self.config.store_conflicts);
    }

    fn update_heuristic(&self, node: &mut HighLevelNode) {
        node.h = if self.config.with_matching_heuristic {
            node.conflicts.matching_heuristic()
        } else {
            0
        };
    }

    fn next_id(&mut self) -> usize {
        self.next_id += 1;
        self.next_id - 1
    }
}
