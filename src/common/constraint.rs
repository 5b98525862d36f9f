use std::collections::{BTreeMap, BTreeSet};

use super::{position_at, Path, INFINITY};

/// A hard rule for one agent, accumulated down a tree branch and never
/// removed.
///
/// Negative constraints forbid being somewhere; positive ones force it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Ord, PartialOrd)]
pub(crate) enum Constraint {
    /// Occupying `position` at any time in `[from_time_step, to_time_step]`.
    /// `to_time_step` may be [`INFINITY`].
    Vertex {
        position: (usize, usize),
        from_time_step: usize,
        to_time_step: usize,
        is_positive: bool,
    },
    /// Moving `from_position -> to_position`, arriving at `to_time_step`.
    Edge {
        from_position: (usize, usize),
        to_position: (usize, usize),
        to_time_step: usize,
        is_positive: bool,
    },
}

impl Constraint {
    pub(crate) fn vertex(position: (usize, usize), time_step: usize) -> Self {
        Constraint::vertex_range(position, time_step, time_step)
    }

    pub(crate) fn vertex_range(position: (usize, usize), from: usize, to: usize) -> Self {
        Constraint::Vertex {
            position,
            from_time_step: from,
            to_time_step: to,
            is_positive: false,
        }
    }

    pub(crate) fn edge(
        from_position: (usize, usize),
        to_position: (usize, usize),
        to_time_step: usize,
    ) -> Self {
        Constraint::Edge {
            from_position,
            to_position,
            to_time_step,
            is_positive: false,
        }
    }

    pub(crate) fn positive(self) -> Self {
        match self {
            Constraint::Vertex {
                position,
                from_time_step,
                to_time_step,
                ..
            } => Constraint::Vertex {
                position,
                from_time_step,
                to_time_step,
                is_positive: true,
            },
            Constraint::Edge {
                from_position,
                to_position,
                to_time_step,
                ..
            } => Constraint::Edge {
                from_position,
                to_position,
                to_time_step,
                is_positive: true,
            },
        }
    }

    #[cfg(test)]
    pub(crate) fn is_positive(&self) -> bool {
        match self {
            Constraint::Vertex { is_positive, .. } | Constraint::Edge { is_positive, .. } => {
                *is_positive
            }
        }
    }

    /// Whether moving `prev_position -> position` arriving at `time` breaks
    /// this constraint.
    pub(crate) fn is_violated(
        &self,
        prev_position: (usize, usize),
        position: (usize, usize),
        time: usize,
    ) -> bool {
        match *self {
            Constraint::Vertex {
                position: constrained,
                from_time_step,
                to_time_step,
                is_positive: false,
            } => position == constrained && from_time_step <= time && time <= to_time_step,
            Constraint::Edge {
                from_position,
                to_position,
                to_time_step,
                is_positive: false,
            } => time == to_time_step && prev_position == from_position && position == to_position,
            // Only single time steps are ever forced.
            Constraint::Vertex {
                position: constrained,
                from_time_step,
                is_positive: true,
                ..
            } => time == from_time_step && position != constrained,
            Constraint::Edge {
                from_position,
                to_position,
                to_time_step,
                is_positive: true,
            } => {
                (time + 1 == to_time_step && position != from_position)
                    || (time == to_time_step
                        && (prev_position != from_position || position != to_position))
            }
        }
    }

    /// Latest time step this constraint refers to, [`INFINITY`] if unbounded.
    pub(crate) fn last_time_step(&self) -> usize {
        match *self {
            Constraint::Vertex { to_time_step, .. } | Constraint::Edge { to_time_step, .. } => {
                to_time_step
            }
        }
    }

    fn first_time_step(&self) -> usize {
        match *self {
            Constraint::Vertex { from_time_step, .. } => from_time_step,
            Constraint::Edge { to_time_step, .. } => to_time_step.saturating_sub(1),
        }
    }
}

/// Constraints per agent along one tree branch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct ConstraintSet {
    constraints: BTreeMap<usize, BTreeSet<Constraint>>,
}

impl ConstraintSet {
    /// Adds `constraint` for `agent`; returns false if it was already there.
    pub(crate) fn add(&mut self, agent: usize, constraint: Constraint) -> bool {
        self.constraints.entry(agent).or_default().insert(constraint)
    }

    pub(crate) fn agent_constraints(&self, agent: usize) -> impl Iterator<Item = &Constraint> {
        self.constraints.get(&agent).into_iter().flatten()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.constraints.values().map(BTreeSet::len).sum()
    }

    pub(crate) fn is_move_forbidden(
        &self,
        agent: usize,
        prev_position: (usize, usize),
        position: (usize, usize),
        time: usize,
    ) -> bool {
        self.agent_constraints(agent)
            .any(|constraint| constraint.is_violated(prev_position, position, time))
    }

    /// Whether an agent reaching `goal` at `time` must still move on:
    /// it is forbidden from its goal later, or forced somewhere later that
    /// resting on the goal does not satisfy.
    pub(crate) fn must_leave_goal(&self, agent: usize, goal: (usize, usize), time: usize) -> bool {
        self.agent_constraints(agent).any(|constraint| match *constraint {
            Constraint::Vertex {
                position,
                to_time_step,
                is_positive: false,
                ..
            } => position == goal && to_time_step > time,
            Constraint::Vertex {
                position,
                from_time_step,
                is_positive: true,
                ..
            } => from_time_step > time && position != goal,
            Constraint::Edge {
                to_time_step,
                is_positive,
                ..
            } => is_positive && to_time_step > time,
        })
    }

    /// Latest finite time step referenced by `agent`'s constraints. Past it
    /// the constraints no longer depend on time.
    pub(crate) fn max_time_step(&self, agent: usize) -> usize {
        self.agent_constraints(agent)
            .map(|constraint| match constraint.last_time_step() {
                INFINITY => constraint.first_time_step(),
                time => time,
            })
            .max()
            .unwrap_or(0)
    }

    /// Whether `path` (resting at its last cell afterwards) breaks any of
    /// `agent`'s constraints.
    pub(crate) fn is_path_violated(&self, agent: usize, path: &Path) -> bool {
        let horizon = self.max_time_step(agent).max(path.len() - 1);
        (1..=horizon + 1).any(|time| {
            self.is_move_forbidden(
                agent,
                position_at(path, time - 1),
                position_at(path, time),
                time,
            )
        })
    }
}
