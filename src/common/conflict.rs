use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, HashSet};

use super::{position_at, Mdd, Path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum ConflictType {
    Vertex {
        position: (usize, usize),
        time_step: usize,
    },
    /// `agent_1` moves `from -> to` arriving at `time_step` while `agent_2`
    /// moves `to -> from`.
    Edge {
        from: (usize, usize),
        to: (usize, usize),
        time_step: usize,
    },
}

impl ConflictType {
    pub(crate) fn time_step(&self) -> usize {
        match *self {
            ConflictType::Vertex { time_step, .. } | ConflictType::Edge { time_step, .. } => {
                time_step
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) enum CardinalType {
    Cardinal,
    SemiCardinal,
    NonCardinal,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct Conflict {
    pub(crate) agent_1: usize,
    pub(crate) agent_2: usize,
    pub(crate) conflict_type: ConflictType,
    pub(crate) cardinal_type: CardinalType,
}

impl Conflict {
    pub(crate) fn time_step(&self) -> usize {
        self.conflict_type.time_step()
    }

    /// Tags the conflict from the agents' MDD widths: an agent whose MDD
    /// is a single cell wide at the conflict cannot avoid it at its current
    /// cost.
    pub(crate) fn classify(&mut self, mdds: &[Option<Mdd>]) {
        let is_forced = |agent: usize| -> Option<bool> {
            let mdd = mdds.get(agent)?.as_ref()?;
            Some(match self.conflict_type {
                ConflictType::Vertex { time_step, .. } => mdd.layer_size(time_step) == 1,
                ConflictType::Edge { time_step, .. } => {
                    mdd.layer_size(time_step - 1) == 1 && mdd.layer_size(time_step) == 1
                }
            })
        };

        self.cardinal_type = match (is_forced(self.agent_1), is_forced(self.agent_2)) {
            (None, None) => CardinalType::Unknown,
            (Some(true), Some(true)) => CardinalType::Cardinal,
            (Some(true), _) | (_, Some(true)) => CardinalType::SemiCardinal,
            _ => CardinalType::NonCardinal,
        };
    }
}

/// Conflicts between `agent_1` and `agent_2`, earliest first. Without
/// `store_all` only the earliest one is returned.
fn find_pair_conflicts(
    paths: &[Path],
    agent_1: usize,
    agent_2: usize,
    store_all: bool,
) -> Vec<Conflict> {
    let path_1 = &paths[agent_1];
    let path_2 = &paths[agent_2];
    let max_length = path_1.len().max(path_2.len());
    let mut conflicts = Vec::new();

    // Starts are distinct, so step 0 never conflicts.
    for step in 1..max_length {
        let position_1 = position_at(path_1, step);
        let position_2 = position_at(path_2, step);
        let prev_position_1 = position_at(path_1, step - 1);
        let prev_position_2 = position_at(path_2, step - 1);

        let conflict_type = if position_1 == position_2 {
            ConflictType::Vertex {
                position: position_1,
                time_step: step,
            }
        } else if prev_position_1 != position_1
            && prev_position_1 == position_2
            && prev_position_2 == position_1
        {
            ConflictType::Edge {
                from: prev_position_1,
                to: position_1,
                time_step: step,
            }
        } else {
            continue;
        };

        conflicts.push(Conflict {
            agent_1,
            agent_2,
            conflict_type,
            cardinal_type: CardinalType::Unknown,
        });
        if !store_all {
            break;
        }
    }
    conflicts
}

/// Pairwise conflicts across all `paths`.
pub(crate) fn find_conflicts(paths: &[Path], store_all: bool) -> Vec<Conflict> {
    let mut conflicts = Vec::new();
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            conflicts.extend(find_pair_conflicts(paths, i, j, store_all));
        }
    }
    conflicts
}

/// Conflicts between `agent` and every other agent.
pub(crate) fn find_agent_conflicts(paths: &[Path], agent: usize, store_all: bool) -> Vec<Conflict> {
    (0..paths.len())
        .filter(|&other| other != agent)
        .flat_map(|other| {
            find_pair_conflicts(paths, agent.min(other), agent.max(other), store_all)
        })
        .collect()
}

/// Conflicts of one tree node, bucketed by how hard they are to bypass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct ConflictSet {
    pub(crate) cardinal: Vec<Conflict>,
    pub(crate) semi_cardinal: Vec<Conflict>,
    pub(crate) non_cardinal: Vec<Conflict>,
}

impl ConflictSet {
    pub(crate) fn from_conflicts(conflicts: impl IntoIterator<Item = Conflict>) -> Self {
        let mut set = ConflictSet::default();
        for conflict in conflicts {
            set.add(conflict);
        }
        set
    }

    pub(crate) fn add(&mut self, conflict: Conflict) {
        match conflict.cardinal_type {
            CardinalType::Cardinal => self.cardinal.push(conflict),
            CardinalType::SemiCardinal => self.semi_cardinal.push(conflict),
            CardinalType::NonCardinal | CardinalType::Unknown => self.non_cardinal.push(conflict),
        }
    }

    /// Drops every conflict involving `agent` and adds `agent_conflicts`
    /// in their place.
    pub(crate) fn replace_agent_conflicts(
        &mut self,
        agent: usize,
        agent_conflicts: impl IntoIterator<Item = Conflict>,
    ) {
        for list in [
            &mut self.cardinal,
            &mut self.semi_cardinal,
            &mut self.non_cardinal,
        ] {
            list.retain(|conflict| conflict.agent_1 != agent && conflict.agent_2 != agent);
        }
        for conflict in agent_conflicts {
            self.add(conflict);
        }
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.cardinal
            .iter()
            .chain(&self.semi_cardinal)
            .chain(&self.non_cardinal)
    }

    pub(crate) fn conflict_count(&self) -> usize {
        self.cardinal.len() + self.semi_cardinal.len() + self.non_cardinal.len()
    }

    pub(crate) fn cardinal_conflict_count(&self) -> usize {
        self.cardinal.len()
    }

    pub(crate) fn cardinal_conflicts(&self) -> &[Conflict] {
        &self.cardinal
    }

    /// Conflict to branch on: the most constraining category first, then
    /// the earliest, then the one whose agents are involved in the most
    /// conflicts.
    pub(crate) fn best_conflict(&self) -> Option<&Conflict> {
        let list = [&self.cardinal, &self.semi_cardinal, &self.non_cardinal]
            .into_iter()
            .find(|list| !list.is_empty())?;

        let mut involvement: HashMap<usize, usize> = HashMap::new();
        for conflict in self.iter() {
            *involvement.entry(conflict.agent_1).or_default() += 1;
            *involvement.entry(conflict.agent_2).or_default() += 1;
        }

        list.iter().min_by_key(|conflict| {
            (
                conflict.time_step(),
                Reverse(involvement[&conflict.agent_1] + involvement[&conflict.agent_2]),
                conflict.agent_1,
                conflict.agent_2,
            )
        })
    }

    /// Size of a greedy maximal matching over the agent pairs of cardinal
    /// conflicts. Each matched pair costs at least one extra step, so this
    /// never overestimates.
    pub(crate) fn matching_heuristic(&self) -> usize {
        let pairs: BTreeSet<(usize, usize)> = self
            .cardinal_conflicts()
            .iter()
            .map(|conflict| (conflict.agent_1, conflict.agent_2))
            .collect();

        let mut matched = HashSet::new();
        let mut matching = 0;
        for (agent_1, agent_2) in pairs {
            if !matched.contains(&agent_1) && !matched.contains(&agent_2) {
                matched.insert(agent_1);
                matched.insert(agent_2);
                matching += 1;
            }
        }
        matching
    }

    pub(crate) fn conflicting_pairs_count(&self) -> usize {
        self.iter()
            .map(|conflict| (conflict.agent_1, conflict.agent_2))
            .collect::<HashSet<_>>()
            .len()
    }
}
