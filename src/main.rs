use mapf_cbs::common::{validate_agents, Agent, Path, Solution};
use mapf_cbs::config::{Cli, Config};
use mapf_cbs::map::Map;
use mapf_cbs::scenario::Scenario;
use mapf_cbs::solver::{Solver, CBS};
use mapf_cbs::stat::Stats;

use anyhow::{bail, Context};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Serialize)]
struct Report<'a> {
    paths: &'a [Path],
    makespan: usize,
    flowtime: usize,
    sum_of_costs: usize,
    stats: &'a Stats,
}

fn load_agents(config: &Config, map: &Map) -> anyhow::Result<Vec<Agent>> {
    let agents = if let Some(agents_yaml_path) = &config.agents_yaml_path {
        Scenario::load_agents_from_yaml(agents_yaml_path)?
    } else if let Some(scen_path) = &config.scen_path {
        let scenario = Scenario::load_from_scen(scen_path)?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        if config.agents_dist.is_empty() {
            scenario.generate_agents_randomly(config.num_agents, &mut rng)?
        } else {
            scenario.generate_agents_by_buckets(config.num_agents, &config.agents_dist, &mut rng)?
        }
    } else {
        bail!("either a scenario file or a YAML agent list is required");
    };

    validate_agents(map, &agents)?;
    Ok(agents)
}

fn write_report(path: &str, solution: &Solution) -> anyhow::Result<()> {
    let report = Report {
        paths: &solution.paths,
        makespan: solution.makespan(),
        flowtime: solution.flowtime(),
        sum_of_costs: solution.sum_of_costs(),
        stats: &solution.stats,
    };
    let file = File::create(path).with_context(|| format!("cannot create result file {path}"))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report)
        .with_context(|| format!("cannot write result file {path}"))?;
    info!("Result written to {path}");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let cli = Cli::parse();

    let config = if let Some(config_file) = cli.config.as_ref() {
        let config_str = std::fs::read_to_string(config_file)
            .with_context(|| format!("cannot read config file {config_file}"))?;
        Config::from_yaml_str(&config_str)
            .with_context(|| format!("error with config file: {config_file}"))?
    } else {
        info!("No config file specified, using default config");
        Config::default()
    }
    .override_from_command_line(&cli)?;

    let map = Map::from_file(&config.map_path)?;
    let agents = load_agents(&config, &map)?;
    info!(
        "Solving {} agents on a {}x{} map ({} free cells) with {} low level",
        agents.len(),
        map.height,
        map.width,
        map.count_passable(),
        config.low_level
    );

    let mut solver = CBS::new(agents.clone(), &map);
    let solution = solver.solve(&config)?;
    if !solution.verify(&map, &agents) {
        error!("CBS returned an invalid solution");
        bail!("solution failed verification");
    }
    info!(
        "Makespan {} Flowtime {} SIC {} Average low level expansions {:.1}",
        solution.makespan(),
        solution.flowtime(),
        solution.sum_of_costs(),
        solution.stats.average_low_level_expansions()
    );

    if let Some(output_path) = &config.output_path {
        write_report(output_path, &solution)?;
    }
    Ok(())
}
