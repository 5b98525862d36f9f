use anyhow::{anyhow, Context};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Default)]
#[command(
    name = "MAPF CBS",
    about = "Conflict-Based Search for multi-agent path finding on grids.",
    version = "1.0"
)]
pub struct Cli {
    #[arg(long, help = "Path to a YAML config file")]
    pub config: Option<String>,

    #[arg(long, help = "Path to the map file")]
    pub map_path: Option<String>,

    #[arg(long, help = "Path to the MovingAI scenario file")]
    pub scen_path: Option<String>,

    #[arg(long, help = "Path to a YAML agent list, used instead of the scenario")]
    pub agents_yaml_path: Option<String>,

    #[arg(long, help = "Path to the JSON result file")]
    pub output_path: Option<String>,

    #[arg(long, help = "Number of agents")]
    pub num_agents: Option<usize>,

    #[arg(long, help = "Scenario bucket of each agent", use_value_delimiter = true)]
    pub agents_dist: Vec<usize>,

    #[arg(long, help = "Seed for the random number generator")]
    pub seed: Option<u64>,

    #[arg(long, help = "Low-level search: astar or focal")]
    pub low_level: Option<String>,

    #[arg(long, help = "Focal sub-optimality bound")]
    pub focal_w: Option<f64>,

    #[arg(long, help = "Heuristic weight")]
    pub h_weight: Option<f64>,

    #[arg(long, help = "Time limit in milliseconds")]
    pub time_limit_ms: Option<u64>,

    #[arg(long, help = "Expansion budget of one low-level search")]
    pub low_level_restart_frequency: Option<usize>,

    #[arg(long, help = "Optimization: Conflict Avoidance Table")]
    pub with_cat: bool,

    #[arg(long, help = "Plan the root without the Conflict Avoidance Table")]
    pub no_cat_at_root: bool,

    #[arg(long, help = "Optimization: Perfect Heuristic")]
    pub with_perfect_heuristic: bool,

    #[arg(long, help = "Optimization: Prioritize Cardinal Conflicts")]
    pub with_cardinal_conflicts: bool,

    #[arg(long, help = "Optimization: Bypass Conflicts")]
    pub with_bypassing: bool,

    #[arg(long, help = "Optimization: Matching Heuristic")]
    pub with_matching_heuristic: bool,

    #[arg(long, help = "Optimization: Disjoint Splitting")]
    pub with_disjoint_splitting: bool,

    #[arg(long, help = "Keep every conflict of an agent pair")]
    pub store_conflicts: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub map_path: String,
    pub scen_path: Option<String>,
    pub agents_yaml_path: Option<String>,
    pub output_path: Option<String>,
    pub num_agents: usize,
    pub agents_dist: Vec<usize>,
    pub seed: u64,

    pub low_level: String,
    pub focal_w: f64,
    pub h_weight: f64,
    pub time_limit_ms: u64,
    pub low_level_restart_frequency: usize,

    pub with_cat: bool,
    pub use_cat_at_root: bool,
    pub with_perfect_heuristic: bool,
    pub with_cardinal_conflicts: bool,
    pub with_bypassing: bool,
    pub with_matching_heuristic: bool,
    pub with_disjoint_splitting: bool,
    pub store_conflicts: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            map_path: String::from("map_file/test/test.map"),
            scen_path: None,
            agents_yaml_path: None,
            output_path: None,
            num_agents: 10,
            agents_dist: Vec::new(),
            seed: 0,
            low_level: String::from("astar"),
            focal_w: 1.0,
            h_weight: 1.0,
            time_limit_ms: 60_000,
            low_level_restart_frequency: 10_000_000,
            with_cat: false,
            use_cat_at_root: true,
            with_perfect_heuristic: false,
            with_cardinal_conflicts: false,
            with_bypassing: false,
            with_matching_heuristic: false,
            with_disjoint_splitting: false,
            store_conflicts: false,
        }
    }
}

impl Config {
    pub fn from_yaml_str(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("invalid YAML config")
    }

    /// Applies every option given on the command line, then validates.
    pub fn override_from_command_line(mut self, cli: &Cli) -> anyhow::Result<Self> {
        if let Some(map_path) = &cli.map_path {
            self.map_path = map_path.clone();
        }
        if cli.scen_path.is_some() {
            self.scen_path = cli.scen_path.clone();
        }
        if cli.agents_yaml_path.is_some() {
            self.agents_yaml_path = cli.agents_yaml_path.clone();
        }
        if cli.output_path.is_some() {
            self.output_path = cli.output_path.clone();
        }
        if let Some(num_agents) = cli.num_agents {
            self.num_agents = num_agents;
        }
        if !cli.agents_dist.is_empty() {
            self.agents_dist = cli.agents_dist.clone();
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(low_level) = &cli.low_level {
            self.low_level = low_level.clone();
        }
        if let Some(focal_w) = cli.focal_w {
            self.focal_w = focal_w;
        }
        if let Some(h_weight) = cli.h_weight {
            self.h_weight = h_weight;
        }
        if let Some(time_limit_ms) = cli.time_limit_ms {
            self.time_limit_ms = time_limit_ms;
        }
        if let Some(frequency) = cli.low_level_restart_frequency {
            self.low_level_restart_frequency = frequency;
        }

        self.with_cat |= cli.with_cat;
        self.use_cat_at_root &= !cli.no_cat_at_root;
        self.with_perfect_heuristic |= cli.with_perfect_heuristic;
        self.with_cardinal_conflicts |= cli.with_cardinal_conflicts;
        self.with_bypassing |= cli.with_bypassing;
        self.with_matching_heuristic |= cli.with_matching_heuristic;
        self.with_disjoint_splitting |= cli.with_disjoint_splitting;
        self.store_conflicts |= cli.store_conflicts;

        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        match self.low_level.as_str() {
            "astar" | "focal" => {}
            other => return Err(anyhow!("Unknown low-level search {other:?}, expected astar or focal")),
        }
        if self.focal_w < 1.0 {
            return Err(anyhow!(
                "Focal sub-optimal value must be at least 1.0, got {}",
                self.focal_w
            ));
        }
        if self.h_weight < 1.0 {
            return Err(anyhow!(
                "Heuristic weight must be at least 1.0, got {}",
                self.h_weight
            ));
        }
        if self.with_matching_heuristic && !self.with_cardinal_conflicts {
            return Err(anyhow!(
                "Matching heuristic requires cardinal conflicts to be enabled"
            ));
        }
        if !self.agents_dist.is_empty() && self.agents_dist.len() != self.num_agents {
            return Err(anyhow!(
                "Agent distribution has {} entries for {} agents",
                self.agents_dist.len(),
                self.num_agents
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_from_yaml_fills_defaults() {
        let config = Config::from_yaml_str(
            "map_path: maps/empty-8-8.map\nlow_level: focal\nfocal_w: 1.5\nwith_cat: true\n",
        )
        .unwrap();
        assert_eq!(config.map_path, "maps/empty-8-8.map");
        assert_eq!(config.low_level, "focal");
        assert_eq!(config.focal_w, 1.5);
        assert!(config.with_cat);
        assert!(config.use_cat_at_root);
        assert_eq!(config.num_agents, 10);
        assert_eq!(config.time_limit_ms, 60_000);

        assert!(Config::from_yaml_str("focal_w: [1]").is_err());
    }

    #[test]
    fn test_command_line_overrides() {
        let cli = Cli::parse_from([
            "mapf_cbs",
            "--num-agents",
            "3",
            "--agents-dist",
            "0,1,2",
            "--with-cardinal-conflicts",
            "--with-matching-heuristic",
            "--no-cat-at-root",
            "--time-limit-ms",
            "500",
        ]);
        let config = Config::default().override_from_command_line(&cli).unwrap();
        assert_eq!(config.num_agents, 3);
        assert_eq!(config.agents_dist, vec![0, 1, 2]);
        assert!(config.with_matching_heuristic);
        assert!(!config.use_cat_at_root);
        assert_eq!(config.time_limit_ms, 500);
        assert_eq!(config.low_level, "astar");
    }

    #[test]
    fn test_validation_errors() {
        let invalid = [
            Config {
                focal_w: 0.5,
                ..Config::default()
            },
            Config {
                h_weight: 0.9,
                ..Config::default()
            },
            Config {
                with_matching_heuristic: true,
                ..Config::default()
            },
            Config {
                low_level: String::from("dijkstra"),
                ..Config::default()
            },
            Config {
                num_agents: 2,
                agents_dist: vec![0],
                ..Config::default()
            },
        ];
        for config in invalid {
            assert!(config.validate().is_err(), "{config:?}");
        }
    }
}
