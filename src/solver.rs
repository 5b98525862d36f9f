mod cbs;

pub use cbs::CBS;

use crate::common::Solution;
use crate::config::Config;
use crate::error::SolveError;

pub trait Solver {
    fn solve(&mut self, config: &Config) -> Result<Solution, SolveError>;
}
