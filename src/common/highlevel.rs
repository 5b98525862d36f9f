use super::conflict::find_agent_conflicts;
use super::{find_conflicts, ConflictSet, ConstraintSet, Mdd, Path};

use std::cmp::Ordering;

/// One node of the constraint tree: a full path assignment under the
/// constraints accumulated along its branch.
#[derive(Clone, Debug)]
pub(crate) struct HighLevelNode {
    pub(crate) id: usize,
    pub(crate) paths: Vec<Path>,
    pub(crate) constraints: ConstraintSet,
    pub(crate) conflicts: ConflictSet,
    // Present for every agent when conflicts are classified.
    pub(crate) mdds: Vec<Option<Mdd>>,
    pub(crate) cost: usize, // Sum of individual path costs
    pub(crate) h: usize,    // Admissible estimate of the extra cost still forced
}

impl HighLevelNode {
    pub(crate) fn new(id: usize, paths: Vec<Path>, constraints: ConstraintSet) -> Self {
        let cost = paths.iter().map(|path| path.len() - 1).sum();
        let agents = paths.len();
        HighLevelNode {
            id,
            paths,
            constraints,
            conflicts: ConflictSet::default(),
            mdds: vec![None; agents],
            cost,
            h: 0,
        }
    }

    pub(crate) fn f_cost(&self) -> usize {
        self.cost + self.h
    }

    pub(crate) fn set_agent_path(&mut self, agent: usize, path: Path) {
        self.cost = self.cost + path.len() - self.paths[agent].len();
        self.paths[agent] = path;
    }

    /// Recomputes every conflict from scratch.
    pub(crate) fn detect_conflicts(&mut self, store_all: bool) {
        let mut conflicts = find_conflicts(&self.paths, store_all);
        for conflict in &mut conflicts {
            conflict.classify(&self.mdds);
        }
        self.conflicts = ConflictSet::from_conflicts(conflicts);
    }

    /// Refreshes the conflicts involving `agent` after its path changed.
    pub(crate) fn update_agent_conflicts(&mut self, agent: usize, store_all: bool) {
        let mut conflicts = find_agent_conflicts(&self.paths, agent, store_all);
        for conflict in &mut conflicts {
            conflict.classify(&self.mdds);
        }
        self.conflicts.replace_agent_conflicts(agent, conflicts);
    }
}

impl Ord for HighLevelNode {
    fn cmp(&self, other: &Self) -> Ordering {
        self.f_cost()
            .cmp(&other.f_cost())
            .then_with(|| {
                self.conflicts
                    .conflict_count()
                    .cmp(&other.conflicts.conflict_count())
            })
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for HighLevelNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HighLevelNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HighLevelNode {}
