use thiserror::Error;

/// Typed outcome of a failed solve.
///
/// A single low-level search failing inside a tree branch is not an error:
/// the branch is pruned and the high-level search carries on with its
/// siblings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SolveError {
    #[error("agent {agent} has no path satisfying its constraints")]
    InfeasibleAgent { agent: usize },
    #[error("constraint tree exhausted, no conflict-free solution exists")]
    TreeExhausted,
    #[error("time limit exceeded before a solution was found")]
    TimeLimitExceeded,
    #[error("low-level search for agent {agent} spent its expansion budget, no solution found")]
    ExpansionBudgetExhausted { agent: usize },
    #[error("malformed input: {0}")]
    MalformedInput(String),
}
