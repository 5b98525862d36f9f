use serde::Serialize;
use tracing::info;

/// Search counters, threaded explicitly through every search call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub costs: usize,
    pub time_us: usize,
    pub high_level_expand_nodes: usize,
    pub high_level_generate_nodes: usize,
    pub low_level_searches: usize,
    pub low_level_expand_nodes: usize,
    pub low_level_generate_nodes: usize,
}

impl Stats {
    pub(crate) fn print(&self, solver: &str) {
        info!(
            "{solver}: Cost {:?} Time(microseconds) {:?} High level expand nodes number: {:?} High level generate nodes number: {:?} Low level searches: {:?} Low level expand nodes number {:?} Low level generate nodes number {:?}",
            self.costs,
            self.time_us,
            self.high_level_expand_nodes,
            self.high_level_generate_nodes,
            self.low_level_searches,
            self.low_level_expand_nodes,
            self.low_level_generate_nodes
        );
    }

    /// Average number of states expanded per low-level call.
    pub fn average_low_level_expansions(&self) -> f64 {
        if self.low_level_searches == 0 {
            return 0.0;
        }
        self.low_level_expand_nodes as f64 / self.low_level_searches as f64
    }
}
